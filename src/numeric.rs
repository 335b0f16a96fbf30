//! Lossy quantization of floats into signed integers.
//!
//! A value `a` is stored as the integer nearest to `asinh(a·rtol/atol)/rtol`.
//! The spacing between representable values is therefore about `atol` near
//! zero and about `|a|·rtol` for large magnitudes.
//!
//! # Reserved codes
//!
//! | code         | value       |
//! |--------------|-------------|
//! | `T::MIN`     | NaN         |
//! | `±T::MAX`    | ±infinity   |
//! | `0`          | 0           |
//!
//! Finite values whose code would reach `T::MAX` are clipped to the
//! infinity code; [`pack`] counts them and logs a warning.
//!
//! # Rounding
//!
//! Values exactly halfway between two adjacent codes encode to the lower
//! of the two, toward negative infinity: a tie at `1.5` gives `1`, a tie at
//! `-1.5` gives `-2`. Away from ties `pack(-a) == -pack(a)`.

use std::fmt;

use ndarray::{Array, ArrayBase, Data, Dimension};
use num_traits::{PrimInt, Signed};
use thiserror::Error;
use tracing::warn;

/// Integer types usable as codes
pub trait Code: PrimInt + Signed + fmt::Debug {}

impl<T: PrimInt + Signed + fmt::Debug> Code for T {}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum PackError {
    #[error("tolerances must be positive and finite, got atol={atol}, rtol={rtol}")]
    InvalidTolerance { atol: f64, rtol: f64 },
}

/// Absolute and relative tolerance of the codec
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    atol: f64,
    rtol: f64,
}

impl Tolerance {
    pub fn new(atol: f64, rtol: f64) -> Result<Self, PackError> {
        let valid = |t: f64| t.is_finite() && t > 0.0;
        if valid(atol) && valid(rtol) {
            Ok(Self { atol, rtol })
        } else {
            Err(PackError::InvalidTolerance { atol, rtol })
        }
    }

    /// Code of `a`, and whether a finite value had to be clipped
    pub fn encode<T: Code>(&self, a: f64) -> (T, bool) {
        if a.is_nan() {
            return (T::min_value(), false);
        }
        let max = T::max_value();
        if a.is_infinite() {
            return (if a > 0.0 { max } else { -max }, false);
        }
        let x = (a * self.rtol / self.atol).asinh() / self.rtol;
        // nearest integer, ties to the lower code
        let code = (x - 0.5).ceil();
        match <T as num_traits::NumCast>::from(code) {
            Some(n) if n < max && n > -max => (n, false),
            _ => (if x < 0.0 { -max } else { max }, true),
        }
    }

    pub fn decode<T: Code>(&self, n: T) -> f64 {
        let max = T::max_value();
        if n == T::min_value() {
            f64::NAN
        } else if n == max {
            f64::INFINITY
        } else if n == -max {
            f64::NEG_INFINITY
        } else {
            let n = n.to_f64().unwrap_or(f64::NAN);
            (n * self.rtol).sinh() * (self.atol / self.rtol)
        }
    }
}

/// Result of [`pack`]
#[derive(Debug, Clone, PartialEq)]
pub struct Packed<T, D: Dimension> {
    pub codes: Array<T, D>,
    /// Number of finite values stored as infinity
    pub clipped: usize,
}

/// Quantize every entry of `a`.
pub fn pack<T, S, D>(
    a: &ArrayBase<S, D>,
    atol: f64,
    rtol: f64,
) -> Result<Packed<T, D>, PackError>
where
    T: Code,
    S: Data<Elem = f64>,
    D: Dimension,
{
    let tolerance = Tolerance::new(atol, rtol)?;
    let mut clipped = 0;
    let codes = a.map(|&v| {
        let (n, clip) = tolerance.encode::<T>(v);
        clipped += usize::from(clip);
        n
    });
    if clipped > 0 {
        warn!(clipped, atol, rtol, "finite values clipped to the infinity code");
    }
    Ok(Packed { codes, clipped })
}

/// Inverse of [`pack`], up to the quantization error.
pub fn unpack<T, S, D>(n: &ArrayBase<S, D>, atol: f64, rtol: f64) -> Result<Array<f64, D>, PackError>
where
    T: Code,
    S: Data<Elem = T>,
    D: Dimension,
{
    let tolerance = Tolerance::new(atol, rtol)?;
    Ok(n.map(|&code| tolerance.decode(code)))
}
