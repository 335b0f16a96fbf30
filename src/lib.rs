//! Array-Valued Symbolic Functions over Finite-Element Samples
//!
//! Build array-shaped expressions of the spatial coordinate and of named
//! arguments, then evaluate, integrate or differentiate them.
//!
//! # Features
//! - Shapes are fixed when an expression is built; incompatible operands
//!   fail with [`ShapeError`] immediately, never during evaluation
//! - Expressions form a shared DAG; a node used twice is evaluated once
//! - Symbolic derivatives with respect to [`Argument`]s, with a structural
//!   zero so `derivative(f, u) == zeros_like(&u)` is an exact check
//! - [`Sample`]s of points, weights and triangulation drive evaluation and
//!   quadrature; integrals stay lazy and composable until evaluated
//! - Chunked evaluation across points, parallel with the `parallel` feature
//!
//! # Usage Examples
//!
//! ## Integrating over a grid
//! ```
//! use femsym::mesh::{self, Domain};
//! use femsym::Expr;
//!
//! let (domain, _geom) = mesh::rectilinear(&[2, 1]);
//! let sample = domain.sample_rule("gauss", 2).unwrap();
//! let area = sample.integrate(&Expr::scalar(1.0)).unwrap();
//! assert!((area.sum() - 2.0).abs() < 1e-15);
//! ```
//!
//! ## Differentiating an energy
//! ```
//! use femsym::mesh::{self, Domain};
//! use femsym::{Argument, Eval, Expr, derivative, multiply};
//! use ndarray::arr1;
//!
//! let (domain, geom) = mesh::rectilinear(&[4, 4]);
//! let sample = domain.sample_rule("gauss", 2).unwrap();
//!
//! let u = Argument::new("u", [2]);
//! let field = multiply(&geom, &Expr::from(&u)).unwrap().sum(0).unwrap();
//! let energy = sample.integral(&field.pow(2.0));
//! let gradient = derivative(&energy, &u).unwrap();
//!
//! let residual = Eval::new(&sample)
//!     .arg("u", arr1(&[1.0, 0.0]))
//!     .integrate(&derivative(&field.pow(2.0), &u).unwrap())
//!     .unwrap();
//! assert_eq!(gradient.shape().dims(), &[2]);
//! assert_eq!(residual.shape(), &[2]);
//! ```

mod core;
mod diff;
mod evaluator;
pub mod mesh;
pub mod numeric;
mod sample;

#[cfg(feature = "parallel")]
mod parallel;

#[cfg(test)]
mod tests;

// Re-export key types for easier usage
pub use self::core::{
    Argument, ArgumentSet, BinaryOp, ConstructionError, Error, EvaluationError, Expr, ExprKind,
    PointData, Result, Shape, ShapeError, Shaped, UnaryOp, add, divide, dot, insert_axis,
    multiply, power, subtract, sum, take, transpose, zeros_like,
};
pub use diff::derivative;
pub use evaluator::{Bindings, DEFAULT_CHUNK_SIZE, Eval, EvalOptions};
pub use sample::{ElementPoints, Sample};
