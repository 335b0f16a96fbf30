//! Array shapes and broadcasting rules.

use std::fmt;
use std::ops::Deref;

use super::error::ShapeError;

/// Ordered tuple of dimension sizes, fixed when a node is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// The shape of a scalar, `()`
    #[must_use]
    pub const fn scalar() -> Self {
        Shape(Vec::new())
    }

    #[must_use]
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Shape(dims.into())
    }

    #[inline]
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Total number of entries
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.0.iter().product()
    }

    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// `self + other`, as used for derivative shapes
    #[must_use]
    pub fn concat(&self, other: &Shape) -> Shape {
        let mut dims = self.0.clone();
        dims.extend_from_slice(&other.0);
        Shape(dims)
    }

    /// Shape with the point axis prepended
    #[must_use]
    pub fn with_points(&self, npoints: usize) -> Vec<usize> {
        let mut dims = Vec::with_capacity(self.0.len() + 1);
        dims.push(npoints);
        dims.extend_from_slice(&self.0);
        dims
    }

    pub(crate) fn check_axis(&self, axis: usize) -> Result<(), ShapeError> {
        if axis < self.ndim() {
            Ok(())
        } else {
            Err(ShapeError::AxisOutOfBounds {
                axis,
                shape: self.clone(),
            })
        }
    }

    #[must_use]
    pub(crate) fn without_axis(&self, axis: usize) -> Shape {
        let mut dims = self.0.clone();
        dims.remove(axis);
        Shape(dims)
    }

    #[must_use]
    pub(crate) fn with_axis(&self, axis: usize, length: usize) -> Shape {
        let mut dims = self.0.clone();
        dims.insert(axis, length);
        Shape(dims)
    }

    #[must_use]
    pub(crate) fn permuted(&self, axes: &[usize]) -> Shape {
        Shape(axes.iter().map(|&a| self.0[a]).collect())
    }

    /// Common shape of two operands under right-aligned broadcasting.
    ///
    /// Dimensions must either agree or one of them must be 1.
    pub fn broadcast(&self, other: &Shape) -> Result<Shape, ShapeError> {
        let ndim = self.ndim().max(other.ndim());
        let mut dims = vec![0; ndim];
        for (i, dim) in dims.iter_mut().enumerate() {
            let a = self.dim_from_end(ndim - 1 - i);
            let b = other.dim_from_end(ndim - 1 - i);
            *dim = match (a, b) {
                (Some(a), Some(b)) if a == b => a,
                (Some(1), Some(b)) | (None, Some(b)) => b,
                (Some(a), Some(1)) | (Some(a), None) => a,
                _ => {
                    return Err(ShapeError::Broadcast {
                        left: self.clone(),
                        right: other.clone(),
                    });
                }
            };
        }
        Ok(Shape(dims))
    }

    fn dim_from_end(&self, k: usize) -> Option<usize> {
        self.0.len().checked_sub(k + 1).map(|i| self.0[i])
    }
}

impl Deref for Shape {
    type Target = [usize];
    fn deref(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        if self.0.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}

/// Anything with a fixed array shape; accepted by [`zeros_like`](crate::zeros_like).
pub trait Shaped {
    fn shape(&self) -> &Shape;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_right_aligned() {
        let a = Shape::from([2, 1, 3]);
        let b = Shape::from([4, 3]);
        assert_eq!(a.broadcast(&b).unwrap(), Shape::from([2, 4, 3]));
        assert_eq!(Shape::scalar().broadcast(&b).unwrap(), b);
    }

    #[test]
    fn broadcast_rejects_mismatch() {
        let err = Shape::from([2]).broadcast(&Shape::from([3])).unwrap_err();
        assert!(matches!(err, ShapeError::Broadcast { .. }));
    }

    #[test]
    fn display_matches_tuple_notation() {
        assert_eq!(Shape::scalar().to_string(), "()");
        assert_eq!(Shape::from([2]).to_string(), "(2,)");
        assert_eq!(Shape::from([2, 3]).to_string(), "(2, 3)");
    }
}
