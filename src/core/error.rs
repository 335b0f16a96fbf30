//! Error types for graph construction, evaluation and sample construction.
//!
//! Each failure class has its own enum so that signatures say exactly what
//! can go wrong: composing expressions only ever yields a [`ShapeError`],
//! evaluating only an [`EvaluationError`], building samples only a
//! [`ConstructionError`]. The umbrella [`Error`] lets callers mix them with `?`.

use thiserror::Error;

use crate::core::shape::Shape;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;

/// Incompatible operand shapes, raised while composing expressions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("cannot broadcast shapes {left} and {right}")]
    Broadcast { left: Shape, right: Shape },

    #[error("axis {axis} is out of bounds for shape {shape}")]
    AxisOutOfBounds { axis: usize, shape: Shape },

    #[error("index {index} is out of bounds for axis {axis} of shape {shape}")]
    IndexOutOfBounds {
        index: usize,
        axis: usize,
        shape: Shape,
    },

    #[error("invalid axis permutation {axes:?} for shape {shape}")]
    InvalidPermutation { axes: Vec<usize>, shape: Shape },

    #[error("argument '{name}' used with shapes {first} and {second}")]
    ArgumentConflict {
        name: String,
        first: Shape,
        second: Shape,
    },

    #[error("expected shape {expected}, got {got}")]
    Mismatch { expected: Shape, got: Shape },
}

/// Failure to evaluate an expression numerically
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("argument '{name}' is not bound")]
    UnboundArgument { name: String },

    #[error("binding for argument '{name}' has shape {got}, expected {expected}")]
    BindingShape {
        name: String,
        expected: Shape,
        got: Shape,
    },

    #[error("point data bound to sample #{bound} cannot be evaluated on sample #{target}")]
    ForeignSample { bound: u64, target: u64 },

    #[error("point data bound to sample #{bound} cannot be evaluated without a sample")]
    MissingSample { bound: u64 },

    #[error("coordinates cannot be evaluated without a sample")]
    CoordinatesWithoutSample,

    #[error("coordinates of dimension {expected} requested on a {got}-dimensional sample")]
    CoordinateDimension { expected: usize, got: usize },

    #[error("intermediate result of shape {got:?} does not match expected {expected:?}")]
    Internal {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
}

/// Internally inconsistent sample inputs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    #[error("{what} has length {got}, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("element {element} has {got}-dimensional points, expected {expected}")]
    DimensionMismatch {
        element: usize,
        expected: usize,
        got: usize,
    },

    #[error("simplex {simplex} of element {element} references point {point} of {npoints}")]
    SimplexIndex {
        element: usize,
        simplex: usize,
        point: usize,
        npoints: usize,
    },

    #[error("simplex {simplex} of element {element} has {got} vertices, expected {expected}")]
    SimplexSize {
        element: usize,
        simplex: usize,
        expected: usize,
        got: usize,
    },

    #[error("unknown point rule '{0}'")]
    UnknownRule(String),

    #[error("rule '{rule}' does not support degree {degree}")]
    UnsupportedDegree { rule: &'static str, degree: usize },

    #[error("invalid domain: {0}")]
    InvalidDomain(String),
}

/// Any error raised by this crate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Construction(#[from] ConstructionError),
}
