//! Core types for symbolic arrays
//!
//! This module contains the fundamental types:
//! - `Expr` / `ExprKind` - the expression DAG
//! - `Argument` / `ArgumentSet` - named placeholders and the per-node registry
//! - `Shape` - construction-time array shapes and broadcasting
//! - Error types
//! - Display formatting

mod display;
pub(crate) mod argument;
pub(crate) mod error;
pub(crate) mod expr;
pub(crate) mod shape;

pub use argument::{Argument, ArgumentSet};
pub use error::{ConstructionError, Error, EvaluationError, Result, ShapeError};
pub use expr::{
    BinaryOp, Expr, ExprKind, PointData, UnaryOp, add, divide, dot, insert_axis, multiply, power,
    subtract, sum, take, transpose, zeros_like,
};
pub use shape::{Shape, Shaped};
