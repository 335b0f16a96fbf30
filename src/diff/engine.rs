//! Differentiation engine - structural chain-rule rewriting of the DAG
//!
//! # Design Note: Sharing
//!
//! Derivatives are memoized per node id for the duration of one
//! `derivative` call. A node referenced by several parents is differentiated
//! once and the resulting expression is shared by all of them, so the
//! derivative of a DAG stays a DAG instead of unfolding into a tree.
//!
//! Nodes whose argument registry does not contain the target short-circuit
//! to a structural zero without being visited at all.

use ndarray::{Array2, IxDyn};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::core::error::ShapeError;
use crate::core::expr::{self, BinaryOp, Expr, ExprKind, UnaryOp};
use crate::{Argument, Shape, Shaped};

pub(crate) struct Differentiator<'a> {
    arg: &'a Argument,
    cache: FxHashMap<u64, Expr>,
}

impl<'a> Differentiator<'a> {
    pub(crate) fn new(arg: &'a Argument) -> Self {
        Self {
            arg,
            cache: FxHashMap::default(),
        }
    }

    pub(crate) fn visited(&self) -> usize {
        self.cache.len()
    }

    /// `d f / d arg`, of shape `f.shape + arg.shape`
    ///
    /// Nodes below `f` are differentiated first, in post-order with an
    /// explicit stack, so that `derive_node` only ever finds its children
    /// in the cache and deep graphs do not grow the call stack.
    pub(crate) fn derive(&mut self, f: &Expr) -> Result<Expr, ShapeError> {
        if let Some(d) = self.lookup(f) {
            return Ok(d);
        }
        let mut stack: Vec<(Expr, bool)> = vec![(f.clone(), false)];
        while let Some((node, expanded)) = stack.pop() {
            if self.lookup(&node).is_some() {
                continue;
            }
            if expanded {
                let d = self.derive_node(&node)?;
                trace!(node = node.id(), zero = d.is_zero(), "differentiated node");
                self.cache.insert(node.id(), d);
            } else {
                let pending: Vec<Expr> = differentiated_children(&node)
                    .into_iter()
                    .filter(|child| self.lookup(child).is_none())
                    .cloned()
                    .collect();
                stack.push((node, true));
                stack.extend(pending.into_iter().map(|child| (child, false)));
            }
        }
        self.lookup(f).ok_or_else(|| ShapeError::Mismatch {
            expected: f.shape().concat(self.arg.shape()),
            got: Shape::scalar(),
        })
    }

    /// Known derivative: cached, or a structural zero for independent nodes
    fn lookup(&self, f: &Expr) -> Option<Expr> {
        if !f.depends_on(self.arg) {
            return Some(self.zero_for(f));
        }
        self.cache.get(&f.id()).cloned()
    }

    fn zero_for(&self, f: &Expr) -> Expr {
        Expr::zeros(f.shape().concat(self.arg.shape()))
    }

    /// Repeat `x` along the argument's axes so it lines up with a derivative
    fn ext(&self, x: &Expr) -> Result<Expr, ShapeError> {
        x.append_axes(self.arg.shape())
    }

    fn derive_node(&mut self, f: &Expr) -> Result<Expr, ShapeError> {
        match f.kind() {
            // Base cases
            ExprKind::Zero | ExprKind::Constant(_) | ExprKind::Coords(_) => Ok(self.zero_for(f)),

            ExprKind::Argument(a) => {
                if a == self.arg {
                    identity(a.shape())
                } else {
                    Ok(self.zero_for(f))
                }
            }

            // Frozen values: the dependency lives in the recorded source
            ExprKind::PointData(data) => match &data.source {
                Some(source) => self.derive(source),
                None => Ok(self.zero_for(f)),
            },

            // Chain rule: g(x)' = g'(x) * x'
            ExprKind::Unary(op, x) => {
                let dx = self.derive(x)?;
                if dx.is_zero() {
                    return Ok(dx);
                }
                let outer = match op {
                    UnaryOp::Sin => x.cos(),
                    UnaryOp::Cos => -&x.sin(),
                    UnaryOp::Tan => x.cos().pow(-2.0),
                    UnaryOp::Exp => f.clone(),
                    UnaryOp::Ln => x.pow(-1.0),
                    UnaryOp::Sqrt => f.pow(-1.0) * 0.5,
                    UnaryOp::Abs => x.sign(),
                    UnaryOp::Sign => return Ok(self.zero_for(f)),
                };
                expr::multiply(&self.ext(&outer)?, &dx)
            }

            // Sum rule: (a + b)' = a' + b'
            ExprKind::Binary(BinaryOp::Add, a, b) => {
                let da = self.derive(a)?;
                let db = self.derive(b)?;
                expr::add(&da, &db)
            }

            // Product rule: (a * b)' = a' * b + a * b'
            ExprKind::Binary(BinaryOp::Multiply, a, b) => {
                let da = self.derive(a)?;
                let db = self.derive(b)?;
                let left = expr::multiply(&da, &self.ext(b)?)?;
                let right = expr::multiply(&self.ext(a)?, &db)?;
                expr::add(&left, &right)
            }

            // Quotient rule: (a / b)' = a' / b - (a / b^2) * b'
            ExprKind::Binary(BinaryOp::Divide, a, b) => {
                let da = self.derive(a)?;
                let db = self.derive(b)?;
                let left = expr::divide(&da, &self.ext(b)?)?;
                if db.is_zero() {
                    return Ok(left);
                }
                let ratio = expr::divide(f, b)?;
                let right = expr::multiply(&self.ext(&ratio)?, &db)?;
                expr::subtract(&left, &right)
            }

            // (a^b)' = b * a^(b-1) * a' + ln(a) * a^b * b'
            // The logarithmic term is only built when the exponent varies,
            // so negative bases with constant exponents stay well defined.
            ExprKind::Binary(BinaryOp::Power, a, b) => {
                let da = self.derive(a)?;
                let db = self.derive(b)?;
                let mut result = self.zero_for(f);
                if !da.is_zero() {
                    let lowered = expr::power(a, &(b - 1.0))?;
                    let outer = expr::multiply(b, &lowered)?;
                    let term = expr::multiply(&self.ext(&outer)?, &da)?;
                    result = expr::add(&result, &term)?;
                }
                if !db.is_zero() {
                    let outer = expr::multiply(&a.ln(), f)?;
                    let term = expr::multiply(&self.ext(&outer)?, &db)?;
                    result = expr::add(&result, &term)?;
                }
                Ok(result)
            }

            // Linear operations commute with differentiation; the argument
            // axes are appended at the end, after every axis of `f`.
            ExprKind::Sum { arg, axis } => expr::sum(&self.derive(arg)?, *axis),
            ExprKind::Take { arg, axis, index } => expr::take(&self.derive(arg)?, *axis, *index),
            ExprKind::InsertAxis { arg, axis, length } => {
                expr::insert_axis(&self.derive(arg)?, *axis, *length)
            }
            ExprKind::Transpose { arg, axes } => {
                let n = axes.len();
                let extended: Vec<usize> = axes
                    .iter()
                    .copied()
                    .chain(n..n + self.arg.shape().ndim())
                    .collect();
                expr::transpose(&self.derive(arg)?, &extended)
            }
            ExprKind::Integral { integrand, sample } => {
                Ok(sample.integral(&self.derive(integrand)?))
            }
        }
    }
}

/// Nodes whose derivatives `derive_node` needs for `f`
fn differentiated_children(f: &Expr) -> Vec<&Expr> {
    match f.kind() {
        ExprKind::PointData(data) => data.source.iter().collect(),
        ExprKind::Integral { integrand, .. } => vec![integrand],
        kind => kind.operands(),
    }
}

/// Kronecker delta of shape `shape + shape`
fn identity(shape: &Shape) -> Result<Expr, ShapeError> {
    let n = shape.size();
    let full = shape.concat(shape);
    let eye = Array2::<f64>::eye(n)
        .into_shape_with_order(IxDyn(&full))
        .map_err(|_| ShapeError::Mismatch {
            expected: full.clone(),
            got: Shape::from([n, n]),
        })?;
    Ok(Expr::constant(eye))
}
