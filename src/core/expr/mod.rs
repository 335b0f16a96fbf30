//! Array-valued expression graph.
//!
//! This module defines:
//! - `Expr` - a cheap, reference-counted handle to an immutable node
//! - `ExprKind` - the closed set of node kinds (leaves and compositions)
//!
//! # Architecture
//!
//! ## Shared DAG
//! Nodes are held in `Arc`s and referenced, never copied, by their parents.
//! Reusing one `Expr` in two places therefore produces a DAG, and every
//! engine walking the graph (evaluation, differentiation) memoizes on the
//! node's `id` so a shared node is processed once.
//!
//! ## Construction-time shapes
//! A node's shape is inferred from its kind and its children's shapes in
//! [`Expr::build`], the single entry point for node creation. Incompatible
//! shapes are rejected there and never reach evaluation.
//!
//! ## Structural hashing
//! Each node stores a structural hash computed at construction, so equality
//! checks reject mismatches in O(1) and only walk the graph on a hash match.
//!
//! ## Structural zero
//! `ExprKind::Zero` is a leaf carrying only a shape. Constructors propagate
//! it (`0 * x = 0`, `sum(0) = 0`, ...), which keeps derivatives sparse and
//! lets `derivative(f, arg) == zeros_like(arg)` be an exact structural check.

mod constructors;
mod hash;

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ndarray::ArrayD;
use rustc_hash::FxHashSet;

use super::argument::{Argument, ArgumentSet};
use super::error::ShapeError;
use super::shape::{Shape, Shaped};
use crate::sample::Sample;

pub use constructors::{
    add, divide, dot, insert_axis, multiply, power, subtract, sum, take, transpose, zeros_like,
};

static EXPR_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_id() -> u64 {
    EXPR_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

// =============================================================================
// EXPR - shared handle to an immutable node
// =============================================================================

/// An immutable, shape-typed symbolic array.
///
/// Cloning an `Expr` clones the handle, not the graph.
#[derive(Clone)]
pub struct Expr(Arc<Node>);

pub(crate) struct Node {
    /// Identity used for memoization; not part of equality
    id: u64,
    /// Structural hash for fast equality rejection
    hash: u64,
    shape: Shape,
    /// False when the value is the same at every point of every sample
    point_dependent: bool,
    arguments: Arc<ArgumentSet>,
    kind: ExprKind,
}

impl Deref for Expr {
    type Target = ExprKind;
    fn deref(&self) -> &ExprKind {
        &self.0.kind
    }
}

/// Elementwise functions of one operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Sqrt,
    Abs,
    Sign,
}

impl UnaryOp {
    #[inline]
    pub(crate) fn apply(self, x: f64) -> f64 {
        match self {
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Tan => x.tan(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Ln => x.ln(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Abs => x.abs(),
            UnaryOp::Sign => {
                if x == 0.0 {
                    0.0
                } else {
                    x.signum()
                }
            }
        }
    }

    /// Whether `f(0) == 0`, so that a structural zero passes straight through
    pub(crate) fn preserves_zero(self) -> bool {
        matches!(
            self,
            UnaryOp::Sin | UnaryOp::Tan | UnaryOp::Sqrt | UnaryOp::Abs | UnaryOp::Sign
        )
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
            UnaryOp::Exp => "exp",
            UnaryOp::Ln => "ln",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Abs => "abs",
            UnaryOp::Sign => "sign",
        }
    }
}

/// Elementwise functions of two operands of equal shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Multiply,
    Divide,
    Power,
}

impl BinaryOp {
    #[inline]
    pub(crate) fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => a / b,
            BinaryOp::Power => a.powf(b),
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Multiply => "multiply",
            BinaryOp::Divide => "divide",
            BinaryOp::Power => "power",
        }
    }
}

/// Values sampled at the points of one specific [`Sample`], wrapped as an expression.
#[derive(Debug)]
pub struct PointData {
    pub(crate) sample: Sample,
    /// Shape `(npoints, *valueshape)`
    pub(crate) values: ArrayD<f64>,
    /// Expression the values were computed from, if recorded
    pub(crate) source: Option<Expr>,
}

impl PointData {
    #[must_use]
    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    #[must_use]
    pub fn values(&self) -> &ArrayD<f64> {
        &self.values
    }

    #[must_use]
    pub fn source(&self) -> Option<&Expr> {
        self.source.as_ref()
    }
}

impl PartialEq for PointData {
    fn eq(&self, other: &Self) -> bool {
        self.sample.id() == other.sample.id()
            && self.values == other.values
            && self.source == other.source
    }
}

/// The kind (structure) of an expression node.
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Structural zero of the node's shape
    Zero,

    /// Literal array
    Constant(Arc<ArrayD<f64>>),

    /// Spatial coordinate of the evaluation point, shape `(ndims,)`
    Coords(usize),

    /// Named placeholder bound at evaluation time
    Argument(Argument),

    /// Values tied to one sample
    PointData(Arc<PointData>),

    Unary(UnaryOp, Expr),

    /// Operands always share one shape; broadcasting is lowered at construction
    Binary(BinaryOp, Expr, Expr),

    /// Reduction over `axis`
    Sum { arg: Expr, axis: usize },

    /// Select `index` along `axis`, removing the axis
    Take { arg: Expr, axis: usize, index: usize },

    /// New axis of `length` at position `axis`, repeating the operand
    InsertAxis { arg: Expr, axis: usize, length: usize },

    /// Result axis `i` is operand axis `axes[i]`
    Transpose { arg: Expr, axes: Vec<usize> },

    /// Lazy weighted sum of `integrand` over the points of `sample`
    Integral { integrand: Expr, sample: Sample },
}

impl Expr {
    /// Create a node, inferring and validating its shape.
    ///
    /// Apart from structural zeros, this is the only place nodes come into
    /// existence; the smart constructors simplify first and then call it.
    pub(crate) fn build(kind: ExprKind) -> Result<Expr, ShapeError> {
        let shape = Self::infer_shape(&kind)?;
        let arguments = Self::collect_arguments(&kind)?;
        Ok(Self::from_parts(kind, shape, arguments))
    }

    pub(crate) fn zero(shape: Shape) -> Expr {
        Self::from_parts(ExprKind::Zero, shape, ArgumentSet::empty())
    }

    fn from_parts(kind: ExprKind, shape: Shape, arguments: Arc<ArgumentSet>) -> Expr {
        let point_dependent = match &kind {
            ExprKind::Coords(_) | ExprKind::PointData(_) => true,
            ExprKind::Zero
            | ExprKind::Constant(_)
            | ExprKind::Argument(_)
            | ExprKind::Integral { .. } => false,
            _ => kind.operands().iter().any(|c| c.0.point_dependent),
        };
        let hash = hash::compute_hash(&kind, &shape);
        Expr(Arc::new(Node {
            id: next_id(),
            hash,
            shape,
            point_dependent,
            arguments,
            kind,
        }))
    }

    fn collect_arguments(kind: &ExprKind) -> Result<Arc<ArgumentSet>, ShapeError> {
        Ok(match kind {
            ExprKind::Zero | ExprKind::Constant(_) | ExprKind::Coords(_) => ArgumentSet::empty(),
            ExprKind::Argument(arg) => ArgumentSet::single(arg),
            ExprKind::PointData(data) => data
                .source
                .as_ref()
                .map_or_else(ArgumentSet::empty, |s| Arc::clone(&s.0.arguments)),
            ExprKind::Integral { integrand, .. } => Arc::clone(&integrand.0.arguments),
            ExprKind::Unary(_, a)
            | ExprKind::Sum { arg: a, .. }
            | ExprKind::Take { arg: a, .. }
            | ExprKind::InsertAxis { arg: a, .. }
            | ExprKind::Transpose { arg: a, .. } => Arc::clone(&a.0.arguments),
            ExprKind::Binary(_, a, b) => ArgumentSet::merge([&a.0.arguments, &b.0.arguments])?,
        })
    }

    fn infer_shape(kind: &ExprKind) -> Result<Shape, ShapeError> {
        Ok(match kind {
            ExprKind::Zero => Shape::scalar(),
            ExprKind::Constant(array) => Shape::from(array.shape()),
            ExprKind::Coords(ndims) => Shape::from([*ndims]),
            ExprKind::Argument(arg) => arg.shape().clone(),
            ExprKind::PointData(data) => Shape::from(&data.values.shape()[1..]),
            ExprKind::Unary(_, a) => a.shape().clone(),
            ExprKind::Binary(_, a, b) => {
                if a.shape() != b.shape() {
                    return Err(ShapeError::Mismatch {
                        expected: a.shape().clone(),
                        got: b.shape().clone(),
                    });
                }
                a.shape().clone()
            }
            ExprKind::Sum { arg, axis } => {
                arg.shape().check_axis(*axis)?;
                arg.shape().without_axis(*axis)
            }
            ExprKind::Take { arg, axis, index } => {
                arg.shape().check_axis(*axis)?;
                if *index >= arg.shape()[*axis] {
                    return Err(ShapeError::IndexOutOfBounds {
                        index: *index,
                        axis: *axis,
                        shape: arg.shape().clone(),
                    });
                }
                arg.shape().without_axis(*axis)
            }
            ExprKind::InsertAxis { arg, axis, length } => {
                if *axis > arg.ndim() {
                    return Err(ShapeError::AxisOutOfBounds {
                        axis: *axis,
                        shape: arg.shape().clone(),
                    });
                }
                arg.shape().with_axis(*axis, *length)
            }
            ExprKind::Transpose { arg, axes } => {
                let mut seen = vec![false; arg.ndim()];
                let valid = axes.len() == arg.ndim()
                    && axes
                        .iter()
                        .all(|&a| a < seen.len() && !std::mem::replace(&mut seen[a], true));
                if !valid {
                    return Err(ShapeError::InvalidPermutation {
                        axes: axes.clone(),
                        shape: arg.shape().clone(),
                    });
                }
                arg.shape().permuted(axes)
            }
            ExprKind::Integral { integrand, .. } => integrand.shape().clone(),
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Identity of this node, stable for its lifetime
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[inline]
    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        self.0.hash
    }

    #[inline]
    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.0.shape
    }

    #[inline]
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.0.shape.ndim()
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    /// Arguments this expression depends on
    #[must_use]
    pub fn arguments(&self) -> &ArgumentSet {
        &self.0.arguments
    }

    #[must_use]
    pub fn depends_on(&self, arg: &Argument) -> bool {
        self.0.arguments.contains(arg)
    }

    /// Whether the value varies between evaluation points
    #[inline]
    #[must_use]
    pub fn is_point_dependent(&self) -> bool {
        self.0.point_dependent
    }

    #[inline]
    #[must_use]
    pub fn is_zero(&self) -> bool {
        matches!(self.0.kind, ExprKind::Zero)
    }

    /// Same node, not merely an equal one
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl ExprKind {
    /// Children evaluated on the same sample as the node itself.
    ///
    /// The integrand of an `Integral` and the source of `PointData` are not
    /// operands: the former runs on its own sample, the latter is frozen.
    #[must_use]
    pub fn operands(&self) -> Vec<&Expr> {
        match self {
            ExprKind::Zero
            | ExprKind::Constant(_)
            | ExprKind::Coords(_)
            | ExprKind::Argument(_)
            | ExprKind::PointData(_)
            | ExprKind::Integral { .. } => Vec::new(),
            ExprKind::Unary(_, a)
            | ExprKind::Sum { arg: a, .. }
            | ExprKind::Take { arg: a, .. }
            | ExprKind::InsertAxis { arg: a, .. }
            | ExprKind::Transpose { arg: a, .. } => vec![a],
            ExprKind::Binary(_, a, b) => vec![a, b],
        }
    }
}

impl PartialEq for ExprKind {
    fn eq(&self, other: &Self) -> bool {
        shallow_eq(self, other)
            .is_some_and(|children| children.into_iter().all(|(a, b)| a == b))
    }
}

impl Shaped for Expr {
    fn shape(&self) -> &Shape {
        &self.0.shape
    }
}

// =============================================================================
// DROP IMPLEMENTATION - Iterative drop to prevent stack overflow
// =============================================================================

impl Drop for Node {
    fn drop(&mut self) {
        fn drain_children(kind: ExprKind, queue: &mut Vec<Expr>) {
            match kind {
                ExprKind::Unary(_, a)
                | ExprKind::Sum { arg: a, .. }
                | ExprKind::Take { arg: a, .. }
                | ExprKind::InsertAxis { arg: a, .. }
                | ExprKind::Transpose { arg: a, .. }
                | ExprKind::Integral { integrand: a, .. } => queue.push(a),
                ExprKind::Binary(_, a, b) => {
                    queue.push(a);
                    queue.push(b);
                }
                ExprKind::PointData(data) => {
                    if let Ok(data) = Arc::try_unwrap(data) {
                        queue.extend(data.source);
                    }
                }
                ExprKind::Zero
                | ExprKind::Constant(_)
                | ExprKind::Coords(_)
                | ExprKind::Argument(_) => {}
            }
        }

        let mut work_queue = Vec::new();
        drain_children(
            std::mem::replace(&mut self.kind, ExprKind::Zero),
            &mut work_queue,
        );

        // Only nodes we hold the last reference to are taken apart here;
        // the others just lose one count.
        while let Some(child) = work_queue.pop() {
            if let Ok(mut node) = Arc::try_unwrap(child.0) {
                drain_children(
                    std::mem::replace(&mut node.kind, ExprKind::Zero),
                    &mut work_queue,
                );
            }
        }
    }
}

// =============================================================================
// EQUALITY - structural, memoized per node pair
// =============================================================================

/// Node-local content equality; on success, the child pairs still to compare.
fn shallow_eq<'a>(a: &'a ExprKind, b: &'a ExprKind) -> Option<Vec<(&'a Expr, &'a Expr)>> {
    let children = match (a, b) {
        (ExprKind::Zero, ExprKind::Zero) => Vec::new(),
        (ExprKind::Constant(x), ExprKind::Constant(y)) => {
            if x != y {
                return None;
            }
            Vec::new()
        }
        (ExprKind::Coords(m), ExprKind::Coords(n)) if m == n => Vec::new(),
        (ExprKind::Argument(u), ExprKind::Argument(v)) if u == v => Vec::new(),
        (ExprKind::PointData(x), ExprKind::PointData(y)) => {
            if x.sample.id() != y.sample.id() || x.values != y.values {
                return None;
            }
            match (&x.source, &y.source) {
                (None, None) => Vec::new(),
                (Some(s), Some(t)) => vec![(s, t)],
                _ => return None,
            }
        }
        (ExprKind::Unary(p, x), ExprKind::Unary(q, y)) if p == q => vec![(x, y)],
        (ExprKind::Binary(p, x0, x1), ExprKind::Binary(q, y0, y1)) if p == q => {
            vec![(x0, y0), (x1, y1)]
        }
        (ExprKind::Sum { arg: x, axis: i }, ExprKind::Sum { arg: y, axis: j }) if i == j => {
            vec![(x, y)]
        }
        (
            ExprKind::Take { arg: x, axis: i, index: m },
            ExprKind::Take { arg: y, axis: j, index: n },
        ) if i == j && m == n => vec![(x, y)],
        (
            ExprKind::InsertAxis { arg: x, axis: i, length: m },
            ExprKind::InsertAxis { arg: y, axis: j, length: n },
        ) if i == j && m == n => vec![(x, y)],
        (ExprKind::Transpose { arg: x, axes: p }, ExprKind::Transpose { arg: y, axes: q })
            if p == q =>
        {
            vec![(x, y)]
        }
        (
            ExprKind::Integral { integrand: x, sample: s },
            ExprKind::Integral { integrand: y, sample: t },
        ) if s == t => vec![(x, y)],
        _ => return None,
    };
    Some(children)
}

// Structural equality with hash fast-reject; ids are ignored. Each pair of
// nodes is compared once, so shared subgraphs cost their size, not their
// number of paths.
impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        let mut visited: FxHashSet<(u64, u64)> = FxHashSet::default();
        let mut stack: Vec<(&Expr, &Expr)> = vec![(self, other)];
        while let Some((a, b)) = stack.pop() {
            if Arc::ptr_eq(&a.0, &b.0) || !visited.insert((a.0.id, b.0.id)) {
                continue;
            }
            if a.0.hash != b.0.hash || a.0.shape != b.0.shape {
                return false;
            }
            match shallow_eq(&a.0.kind, &b.0.kind) {
                Some(children) => stack.extend(children),
                None => return false,
            }
        }
        true
    }
}

impl std::hash::Hash for Expr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash.hash(state);
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expr#{}[{}] {}", self.0.id, self.0.shape, self)
    }
}
