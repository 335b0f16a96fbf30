//! Symbolic differentiation with respect to named arguments.

mod engine;

use tracing::debug;

use crate::core::error::ShapeError;
use crate::{Argument, Expr};
use engine::Differentiator;

/// `∂expr/∂arg`, an expression of shape `expr.shape + arg.shape`.
///
/// Independence is detected structurally: if `expr` does not reference
/// `arg`, the result is a structural zero and no node is visited.
///
/// # Errors
///
/// `ShapeError::ArgumentConflict` if `expr` uses the argument's name with a
/// different shape.
///
/// # Example
///
/// ```
/// use femsym::{Argument, Expr, derivative, zeros_like};
///
/// let u = Argument::new("u", [3]);
/// let f = Expr::from(&u).pow(2.0).sum(0).unwrap();
/// let df = derivative(&f, &u).unwrap();
/// assert_eq!(df.shape().dims(), &[3]);
///
/// let v = Argument::new("v", [2]);
/// assert_eq!(derivative(&f, &v).unwrap(), zeros_like(&v));
/// ```
pub fn derivative(expr: &Expr, arg: &Argument) -> Result<Expr, ShapeError> {
    expr.arguments().check(arg)?;
    let mut engine = Differentiator::new(arg);
    let result = engine.derive(expr)?;
    debug!(
        argument = arg.name(),
        visited = engine.visited(),
        zero = result.is_zero(),
        "derivative"
    );
    Ok(result)
}

impl Expr {
    /// Method form of [`derivative`]
    pub fn derivative(&self, arg: &Argument) -> Result<Expr, ShapeError> {
        derivative(self, arg)
    }
}
