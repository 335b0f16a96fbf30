//! Expression constructors.
//!
//! Smart constructors that lower broadcasting into explicit axis nodes,
//! propagate structural zeros and fold constant operands before handing
//! the node to [`Expr::build`].

use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

use ndarray::{Array, ArrayD, Axis, Dimension, IxDyn, Zip};

use super::{BinaryOp, Expr, ExprKind, PointData, UnaryOp};
use crate::core::argument::{Argument, ArgumentSet};
use crate::core::error::ShapeError;
use crate::core::shape::{Shape, Shaped};
use crate::sample::Sample;

impl Expr {
    // -------------------------------------------------------------------------
    // Leaves
    // -------------------------------------------------------------------------

    /// Literal array of any shape
    pub fn constant<D: Dimension>(array: Array<f64, D>) -> Expr {
        let array = array.into_dyn();
        let shape = Shape::from(array.shape());
        Expr::from_parts(
            ExprKind::Constant(Arc::new(array)),
            shape,
            ArgumentSet::empty(),
        )
    }

    /// Literal scalar
    #[must_use]
    pub fn scalar(value: f64) -> Expr {
        Expr::constant(ArrayD::from_elem(IxDyn(&[]), value))
    }

    /// Structural zero of the given shape
    pub fn zeros(shape: impl Into<Shape>) -> Expr {
        Expr::zero(shape.into())
    }

    /// Spatial coordinate of the evaluation point, shape `(ndims,)`
    #[must_use]
    pub fn coords(ndims: usize) -> Expr {
        Expr::from_parts(
            ExprKind::Coords(ndims),
            Shape::from([ndims]),
            ArgumentSet::empty(),
        )
    }

    /// Reference to a named argument
    #[must_use]
    pub fn argument(arg: &Argument) -> Expr {
        Expr::from_parts(
            ExprKind::Argument(arg.clone()),
            arg.shape().clone(),
            ArgumentSet::single(arg),
        )
    }

    /// Values of shape `(sample.npoints(), ...)` tied to `sample`.
    ///
    /// The leading length is checked by the callers, which report it as
    /// their own error kind.
    pub(crate) fn point_data(sample: &Sample, values: ArrayD<f64>, source: Option<Expr>) -> Expr {
        let shape = Shape::from(values.shape().get(1..).unwrap_or_default());
        let arguments = source
            .as_ref()
            .map_or_else(ArgumentSet::empty, |s| Arc::clone(&s.0.arguments));
        Expr::from_parts(
            ExprKind::PointData(Arc::new(PointData {
                sample: sample.clone(),
                values,
                source,
            })),
            shape,
            arguments,
        )
    }

    /// Lazy integral node; structural zeros are handled by [`Sample::integral`]
    pub(crate) fn integral_node(integrand: &Expr, sample: &Sample) -> Expr {
        Expr::from_parts(
            ExprKind::Integral {
                integrand: integrand.clone(),
                sample: sample.clone(),
            },
            integrand.shape().clone(),
            Arc::clone(&integrand.0.arguments),
        )
    }

    /// The literal value, if this node is a constant
    #[must_use]
    pub fn as_constant(&self) -> Option<&ArrayD<f64>> {
        match self.kind() {
            ExprKind::Constant(array) => Some(array),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Elementwise functions
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn unary(op: UnaryOp, x: &Expr) -> Expr {
        if x.is_zero() && op.preserves_zero() {
            return x.clone();
        }
        if let Some(array) = x.as_constant() {
            return Expr::constant(array.mapv(|v| op.apply(v)));
        }
        Expr::from_parts(
            ExprKind::Unary(op, x.clone()),
            x.shape().clone(),
            Arc::clone(&x.0.arguments),
        )
    }

    #[must_use]
    pub fn sin(&self) -> Expr {
        Expr::unary(UnaryOp::Sin, self)
    }

    #[must_use]
    pub fn cos(&self) -> Expr {
        Expr::unary(UnaryOp::Cos, self)
    }

    #[must_use]
    pub fn tan(&self) -> Expr {
        Expr::unary(UnaryOp::Tan, self)
    }

    #[must_use]
    pub fn exp(&self) -> Expr {
        Expr::unary(UnaryOp::Exp, self)
    }

    #[must_use]
    pub fn ln(&self) -> Expr {
        Expr::unary(UnaryOp::Ln, self)
    }

    #[must_use]
    pub fn sqrt(&self) -> Expr {
        Expr::unary(UnaryOp::Sqrt, self)
    }

    #[must_use]
    pub fn abs(&self) -> Expr {
        Expr::unary(UnaryOp::Abs, self)
    }

    #[must_use]
    pub fn sign(&self) -> Expr {
        Expr::unary(UnaryOp::Sign, self)
    }

    /// `self ** exponent`
    #[must_use]
    pub fn pow(&self, exponent: f64) -> Expr {
        if exponent == 1.0 {
            return self.clone();
        }
        self.with_scalar(BinaryOp::Power, exponent, false)
    }

    /// `op(self, value)` (or `op(value, self)`), where the scalar operand
    /// cannot introduce a shape or argument conflict.
    pub(crate) fn with_scalar(&self, op: BinaryOp, value: f64, scalar_first: bool) -> Expr {
        let constant = Expr::constant(ArrayD::from_elem(IxDyn(self.shape()), value));
        let (a, b) = if scalar_first {
            (&constant, self)
        } else {
            (self, &constant)
        };
        if let Some(folded) = fold_binary(op, a, b) {
            return folded;
        }
        Expr::from_parts(
            ExprKind::Binary(op, a.clone(), b.clone()),
            self.shape().clone(),
            Arc::clone(&self.0.arguments),
        )
    }

    // -------------------------------------------------------------------------
    // Axis operations
    // -------------------------------------------------------------------------

    /// Select entry `index` of the first axis
    pub fn get(&self, index: usize) -> Result<Expr, ShapeError> {
        take(self, 0, index)
    }

    pub fn sum(&self, axis: usize) -> Result<Expr, ShapeError> {
        sum(self, axis)
    }

    pub fn take(&self, axis: usize, index: usize) -> Result<Expr, ShapeError> {
        take(self, axis, index)
    }

    pub fn insert_axis(&self, axis: usize, length: usize) -> Result<Expr, ShapeError> {
        insert_axis(self, axis, length)
    }

    pub fn transpose(&self, axes: &[usize]) -> Result<Expr, ShapeError> {
        transpose(self, axes)
    }

    /// Broadcast to `target` under right-aligned numpy rules.
    ///
    /// Missing leading axes are inserted, unit axes are replaced by a
    /// repetition of their single entry.
    pub fn broadcast_to(&self, target: &Shape) -> Result<Expr, ShapeError> {
        if self.shape() == target {
            return Ok(self.clone());
        }
        let mismatch = || ShapeError::Broadcast {
            left: self.shape().clone(),
            right: target.clone(),
        };
        if self.ndim() > target.ndim() {
            return Err(mismatch());
        }
        let offset = target.ndim() - self.ndim();
        for (i, &dim) in self.shape().iter().enumerate() {
            if dim != 1 && dim != target[offset + i] {
                return Err(mismatch());
            }
        }
        if self.is_zero() {
            return Ok(Expr::zero(target.clone()));
        }
        if let Some(array) = self.as_constant() {
            let view = array.broadcast(IxDyn(target)).ok_or_else(mismatch)?;
            return Ok(Expr::constant(view.to_owned()));
        }
        let mut x = self.clone();
        for (i, &dim) in self.shape().iter().enumerate() {
            let length = target[offset + i];
            if dim != length {
                x = insert_axis(&take(&x, i, 0)?, i, length)?;
            }
        }
        for &length in target[..offset].iter().rev() {
            x = insert_axis(&x, 0, length)?;
        }
        Ok(x)
    }

    /// Append trailing axes of the given lengths, repeating the operand.
    pub(crate) fn append_axes(&self, dims: &[usize]) -> Result<Expr, ShapeError> {
        let mut x = self.clone();
        for &length in dims {
            x = insert_axis(&x, x.ndim(), length)?;
        }
        Ok(x)
    }
}

// -----------------------------------------------------------------------------
// Free composition functions
// -----------------------------------------------------------------------------

/// Structural zero with the shape of `x`
pub fn zeros_like(x: &impl Shaped) -> Expr {
    Expr::zero(x.shape().clone())
}

fn binary(op: BinaryOp, a: &Expr, b: &Expr) -> Result<Expr, ShapeError> {
    let shape = a.shape().broadcast(b.shape())?;
    let a = a.broadcast_to(&shape)?;
    let b = b.broadcast_to(&shape)?;
    if let Some(folded) = fold_binary(op, &a, &b) {
        return Ok(folded);
    }
    Expr::build(ExprKind::Binary(op, a, b))
}

/// Zero propagation and constant folding for operands of equal shape
fn fold_binary(op: BinaryOp, a: &Expr, b: &Expr) -> Option<Expr> {
    match op {
        BinaryOp::Add if a.is_zero() => return Some(b.clone()),
        BinaryOp::Add if b.is_zero() => return Some(a.clone()),
        BinaryOp::Multiply if a.is_zero() || b.is_zero() => {
            return Some(Expr::zero(a.shape().clone()));
        }
        BinaryOp::Divide if a.is_zero() => return Some(a.clone()),
        BinaryOp::Power if b.is_zero() => {
            return Some(Expr::constant(ArrayD::ones(IxDyn(a.shape()))));
        }
        _ => {}
    }
    let lhs = constant_value(a)?;
    let rhs = constant_value(b)?;
    let folded = Zip::from(&lhs)
        .and(&rhs)
        .map_collect(|&x, &y| op.apply(x, y));
    Some(Expr::constant(folded))
}

fn constant_value(x: &Expr) -> Option<ArrayD<f64>> {
    match x.kind() {
        ExprKind::Constant(array) => Some((**array).clone()),
        ExprKind::Zero => Some(ArrayD::zeros(IxDyn(x.shape()))),
        _ => None,
    }
}

pub fn add(a: &Expr, b: &Expr) -> Result<Expr, ShapeError> {
    binary(BinaryOp::Add, a, b)
}

pub fn subtract(a: &Expr, b: &Expr) -> Result<Expr, ShapeError> {
    binary(BinaryOp::Add, a, &-b)
}

pub fn multiply(a: &Expr, b: &Expr) -> Result<Expr, ShapeError> {
    binary(BinaryOp::Multiply, a, b)
}

pub fn divide(a: &Expr, b: &Expr) -> Result<Expr, ShapeError> {
    binary(BinaryOp::Divide, a, b)
}

pub fn power(base: &Expr, exponent: &Expr) -> Result<Expr, ShapeError> {
    binary(BinaryOp::Power, base, exponent)
}

/// Contract `a` and `b` over `axis` of their broadcast shape
pub fn dot(a: &Expr, b: &Expr, axis: usize) -> Result<Expr, ShapeError> {
    sum(&multiply(a, b)?, axis)
}

/// Build `kind`, or a structural zero of the same shape when `zero` holds
fn build_or_zero(kind: ExprKind, zero: bool) -> Result<Expr, ShapeError> {
    if zero {
        let shape = Expr::infer_shape(&kind)?;
        return Ok(Expr::zero(shape));
    }
    Expr::build(kind)
}

pub fn sum(x: &Expr, axis: usize) -> Result<Expr, ShapeError> {
    if let Some(array) = x.as_constant() {
        x.shape().check_axis(axis)?;
        return Ok(Expr::constant(array.sum_axis(Axis(axis))));
    }
    build_or_zero(
        ExprKind::Sum {
            arg: x.clone(),
            axis,
        },
        x.is_zero(),
    )
}

pub fn take(x: &Expr, axis: usize, index: usize) -> Result<Expr, ShapeError> {
    // Undo a repetition: take(insert_axis(y, axis, n), axis, i) == y
    if let ExprKind::InsertAxis {
        arg,
        axis: inserted,
        length,
    } = x.kind()
        && *inserted == axis
        && index < *length
    {
        return Ok(arg.clone());
    }
    build_or_zero(
        ExprKind::Take {
            arg: x.clone(),
            axis,
            index,
        },
        x.is_zero(),
    )
}

pub fn insert_axis(x: &Expr, axis: usize, length: usize) -> Result<Expr, ShapeError> {
    build_or_zero(
        ExprKind::InsertAxis {
            arg: x.clone(),
            axis,
            length,
        },
        x.is_zero(),
    )
}

pub fn transpose(x: &Expr, axes: &[usize]) -> Result<Expr, ShapeError> {
    if axes.len() == x.ndim() && axes.iter().enumerate().all(|(i, &a)| i == a) {
        return Ok(x.clone());
    }
    build_or_zero(
        ExprKind::Transpose {
            arg: x.clone(),
            axes: axes.to_vec(),
        },
        x.is_zero(),
    )
}

// -----------------------------------------------------------------------------
// Operator overloading (scalar operands only; these cannot fail)
// -----------------------------------------------------------------------------

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::scalar(value)
    }
}

impl From<&Argument> for Expr {
    fn from(arg: &Argument) -> Self {
        Expr::argument(arg)
    }
}

impl From<Argument> for Expr {
    fn from(arg: Argument) -> Self {
        Expr::argument(&arg)
    }
}

impl Neg for &Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        self.with_scalar(BinaryOp::Multiply, -1.0, true)
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        -&self
    }
}

macro_rules! scalar_ops {
    ($($trait:ident, $method:ident, $op:expr, $rhs:expr;)*) => {
        $(
            impl $trait<f64> for &Expr {
                type Output = Expr;
                fn $method(self, rhs: f64) -> Expr {
                    let (op, value) = ($op, $rhs(rhs));
                    self.with_scalar(op, value, false)
                }
            }

            impl $trait<f64> for Expr {
                type Output = Expr;
                fn $method(self, rhs: f64) -> Expr {
                    (&self).$method(rhs)
                }
            }
        )*
    };
}

scalar_ops! {
    Add, add, BinaryOp::Add, |v: f64| v;
    Sub, sub, BinaryOp::Add, |v: f64| -v;
    Mul, mul, BinaryOp::Multiply, |v: f64| v;
    Div, div, BinaryOp::Divide, |v: f64| v;
}

impl Mul<&Expr> for f64 {
    type Output = Expr;
    fn mul(self, rhs: &Expr) -> Expr {
        rhs.with_scalar(BinaryOp::Multiply, self, true)
    }
}

impl Add<&Expr> for f64 {
    type Output = Expr;
    fn add(self, rhs: &Expr) -> Expr {
        rhs.with_scalar(BinaryOp::Add, self, true)
    }
}
