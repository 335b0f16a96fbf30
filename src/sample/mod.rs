//! Point samples over a discretized domain.
//!
//! A [`Sample`] is an immutable set of evaluation points grouped by element,
//! with one quadrature weight per point and a triangulation derived from the
//! per-element point layouts. It is the only way expressions meet numbers:
//! [`Sample::eval`], [`Sample::integrate`] and the lazy [`Sample::integral`].
//!
//! Samples are cheap handles (`Arc`) and compare by value. Each one also
//! carries a unique identity, which is what point data produced by
//! [`Sample::asfunction`] is tied to.

mod connectivity;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ndarray::{Array1, Array2, ArrayD, Axis};
use tracing::debug;

use crate::core::error::{ConstructionError, EvaluationError};
use crate::evaluator::{Bindings, Eval};
use crate::Expr;

pub(crate) use connectivity::tensor_simplices;

static SAMPLE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Points of one element, with local connectivity.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementPoints {
    /// Shape `(npoints, ndims)`
    pub coords: Array2<f64>,
    /// Shape `(npoints,)`
    pub weights: Array1<f64>,
    /// Simplices of `ndims + 1` local point indices
    pub simplices: Vec<Vec<usize>>,
}

impl ElementPoints {
    #[must_use]
    pub fn npoints(&self) -> usize {
        self.coords.nrows()
    }
}

/// Immutable set of evaluation points with weights and connectivity.
#[derive(Clone)]
pub struct Sample(Arc<SampleInner>);

struct SampleInner {
    id: u64,
    ndims: usize,
    elements: Vec<ElementPoints>,
    /// Global index of each element's first point, plus the total
    offsets: Vec<usize>,
    coords: Array2<f64>,
    weights: Array1<f64>,
    tri: Vec<Vec<usize>>,
    hull: Vec<Vec<usize>>,
}

impl Sample {
    /// Assemble a sample from per-element point blocks of dimension `ndims`.
    ///
    /// Points are numbered globally in element order. The triangulation is
    /// the union of the element simplices, renumbered; the hull is derived
    /// from it.
    pub fn new(ndims: usize, elements: Vec<ElementPoints>) -> Result<Sample, ConstructionError> {
        let mut offsets = Vec::with_capacity(elements.len() + 1);
        let mut tri = Vec::new();
        let mut total = 0;
        for (e, element) in elements.iter().enumerate() {
            validate(e, ndims, element)?;
            offsets.push(total);
            tri.extend(
                element
                    .simplices
                    .iter()
                    .map(|s| s.iter().map(|&p| p + total).collect::<Vec<_>>()),
            );
            total += element.npoints();
        }
        offsets.push(total);

        let mut coords = Array2::zeros((total, ndims));
        let mut weights = Array1::zeros(total);
        for (element, bounds) in elements.iter().zip(offsets.windows(2)) {
            let range = bounds[0]..bounds[1];
            coords
                .slice_axis_mut(Axis(0), range.clone().into())
                .assign(&element.coords);
            weights
                .slice_axis_mut(Axis(0), range.into())
                .assign(&element.weights);
        }
        let hull = connectivity::hull(&tri);

        let id = SAMPLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        debug!(
            sample = id,
            nelems = elements.len(),
            npoints = total,
            simplices = tri.len(),
            hull = hull.len(),
            "constructed sample"
        );
        Ok(Sample(Arc::new(SampleInner {
            id,
            ndims,
            elements,
            offsets,
            coords,
            weights,
            tri,
            hull,
        })))
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Identity of this instance; equal samples may differ in id
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[must_use]
    pub fn npoints(&self) -> usize {
        self.0.weights.len()
    }

    #[must_use]
    pub fn nelems(&self) -> usize {
        self.0.elements.len()
    }

    #[must_use]
    pub fn ndims(&self) -> usize {
        self.0.ndims
    }

    /// Point coordinates, shape `(npoints, ndims)`
    #[must_use]
    pub fn coords(&self) -> &Array2<f64> {
        &self.0.coords
    }

    #[must_use]
    pub fn weights(&self) -> &Array1<f64> {
        &self.0.weights
    }

    /// Simplices of global point indices, element by element
    #[must_use]
    pub fn tri(&self) -> &[Vec<usize>] {
        &self.0.tri
    }

    /// Facets of [`tri`](Self::tri) not shared by two simplices
    #[must_use]
    pub fn hull(&self) -> &[Vec<usize>] {
        &self.0.hull
    }

    #[must_use]
    pub fn element_points(&self, element: usize) -> Option<&ElementPoints> {
        self.0.elements.get(element)
    }

    /// Global point indices of `element`
    #[must_use]
    pub fn element_range(&self, element: usize) -> Option<std::ops::Range<usize>> {
        let start = *self.0.offsets.get(element)?;
        let end = *self.0.offsets.get(element + 1)?;
        Some(start..end)
    }

    // -------------------------------------------------------------------------
    // Evaluation
    // -------------------------------------------------------------------------

    /// Values of `expr` at every point, shape `(npoints, *expr.shape)`.
    ///
    /// Fails if `expr` references an argument; use [`eval_with`](Self::eval_with)
    /// or [`Eval`] to bind one.
    pub fn eval(&self, expr: &Expr) -> Result<ArrayD<f64>, EvaluationError> {
        Eval::new(self).eval(expr)
    }

    pub fn eval_with(&self, expr: &Expr, bindings: &Bindings) -> Result<ArrayD<f64>, EvaluationError> {
        Eval::new(self).bindings(bindings.clone()).eval(expr)
    }

    /// `Σ_p weight[p] * expr[p]`, shape `expr.shape`
    pub fn integrate(&self, expr: &Expr) -> Result<ArrayD<f64>, EvaluationError> {
        Eval::new(self).integrate(expr)
    }

    pub fn integrate_with(
        &self,
        expr: &Expr,
        bindings: &Bindings,
    ) -> Result<ArrayD<f64>, EvaluationError> {
        Eval::new(self).bindings(bindings.clone()).integrate(expr)
    }

    /// Lazy form of [`integrate`](Self::integrate), composable and differentiable.
    #[must_use]
    pub fn integral(&self, expr: &Expr) -> Expr {
        if expr.is_zero() {
            return expr.clone();
        }
        Expr::integral_node(expr, self)
    }

    /// Wrap `values` (leading axis of length `npoints`) as an expression
    /// tied to this sample instance.
    ///
    /// The result evaluates to `values` unchanged on this sample and fails
    /// on any other. It records no dependency, so its derivative with
    /// respect to any argument is a structural zero.
    pub fn asfunction<D: ndarray::Dimension>(
        &self,
        values: ndarray::Array<f64, D>,
    ) -> Result<Expr, ConstructionError> {
        let values = values.into_dyn();
        let leading = values.shape().first().copied();
        if leading != Some(self.npoints()) {
            return Err(ConstructionError::LengthMismatch {
                what: "values",
                expected: self.npoints(),
                got: leading.unwrap_or(0),
            });
        }
        Ok(Expr::point_data(self, values, None))
    }

    /// Evaluate `expr` here and freeze the result, keeping `expr` as the
    /// recorded source for differentiation.
    pub fn bind(&self, expr: &Expr) -> Result<Expr, EvaluationError> {
        Eval::new(self).bind(expr)
    }

    // -------------------------------------------------------------------------
    // Subsets
    // -------------------------------------------------------------------------

    /// Restrict to the elements holding at least one point with nonzero mask.
    ///
    /// Retained elements are kept whole, with their connectivity.
    pub fn subset(&self, mask: &[f64]) -> Result<Sample, ConstructionError> {
        self.check_mask_len(mask.len())?;
        self.retain(|range| mask[range].iter().any(|&m| m != 0.0))
    }

    /// Boolean form of [`subset`](Self::subset)
    pub fn subset_where(&self, mask: &[bool]) -> Result<Sample, ConstructionError> {
        self.check_mask_len(mask.len())?;
        self.retain(|range| mask[range].iter().any(|&m| m))
    }

    fn check_mask_len(&self, len: usize) -> Result<(), ConstructionError> {
        if len == self.npoints() {
            Ok(())
        } else {
            Err(ConstructionError::LengthMismatch {
                what: "mask",
                expected: self.npoints(),
                got: len,
            })
        }
    }

    fn retain(
        &self,
        keep: impl Fn(std::ops::Range<usize>) -> bool,
    ) -> Result<Sample, ConstructionError> {
        let elements = self
            .0
            .elements
            .iter()
            .zip(self.0.offsets.windows(2))
            .filter(|(_, bounds)| keep(bounds[0]..bounds[1]))
            .map(|(element, _)| element.clone())
            .collect();
        Sample::new(self.0.ndims, elements)
    }
}

fn validate(e: usize, ndims: usize, element: &ElementPoints) -> Result<(), ConstructionError> {
    let npoints = element.npoints();
    if element.coords.ncols() != ndims {
        return Err(ConstructionError::DimensionMismatch {
            element: e,
            expected: ndims,
            got: element.coords.ncols(),
        });
    }
    if element.weights.len() != npoints {
        return Err(ConstructionError::LengthMismatch {
            what: "weights",
            expected: npoints,
            got: element.weights.len(),
        });
    }
    for (s, simplex) in element.simplices.iter().enumerate() {
        if simplex.len() != ndims + 1 {
            return Err(ConstructionError::SimplexSize {
                element: e,
                simplex: s,
                expected: ndims + 1,
                got: simplex.len(),
            });
        }
        if let Some(&point) = simplex.iter().find(|&&p| p >= npoints) {
            return Err(ConstructionError::SimplexIndex {
                element: e,
                simplex: s,
                point,
                npoints,
            });
        }
    }
    Ok(())
}

// Value equality: identity is ignored, derived connectivity follows from
// the elements.
impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.ndims == other.0.ndims && self.0.elements == other.0.elements)
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("id", &self.0.id)
            .field("ndims", &self.0.ndims)
            .field("nelems", &self.nelems())
            .field("npoints", &self.npoints())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    fn square() -> ElementPoints {
        ElementPoints {
            coords: arr2(&[[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]),
            weights: arr1(&[0.25; 4]),
            simplices: tensor_simplices(&[2, 2]),
        }
    }

    #[test]
    fn points_are_numbered_in_element_order() {
        let sample = Sample::new(2, vec![square(), square()]).unwrap();
        assert_eq!(sample.npoints(), 8);
        assert_eq!(sample.element_range(1), Some(4..8));
        assert_eq!(sample.tri()[2], vec![4, 6, 7]);
        assert!(sample.tri().iter().all(|s| s.iter().all(|&p| p < 8)));
    }

    #[test]
    fn rejects_inconsistent_elements() {
        let mut bad = square();
        bad.weights = arr1(&[1.0]);
        assert!(matches!(
            Sample::new(2, vec![bad]),
            Err(ConstructionError::LengthMismatch { what: "weights", .. })
        ));

        let mut bad = square();
        bad.simplices = vec![vec![0, 1, 9]];
        assert!(matches!(
            Sample::new(2, vec![bad]),
            Err(ConstructionError::SimplexIndex { point: 9, .. })
        ));

        assert!(matches!(
            Sample::new(3, vec![square()]),
            Err(ConstructionError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn equality_ignores_identity() {
        let a = Sample::new(2, vec![square()]).unwrap();
        let b = Sample::new(2, vec![square()]).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a, b);
    }

    #[test]
    fn mask_length_is_checked() {
        let sample = Sample::new(2, vec![square()]).unwrap();
        assert!(matches!(
            sample.subset(&[1.0; 3]),
            Err(ConstructionError::LengthMismatch { what: "mask", .. })
        ));
    }
}
