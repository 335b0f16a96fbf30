//! Execution of program steps on a range of sample points.
//!
//! Every step result carries a leading point axis. Its length is the number
//! of points in the current range for point-dependent steps, and 1 for
//! uniform steps, which broadcast against the former.

use std::ops::Range;
use std::sync::Arc;

use ndarray::{ArrayD, Axis, IxDyn, Zip};

use super::compiler::Step;
use super::{Evaluator, Slots};
use crate::core::error::EvaluationError;
use crate::{ExprKind, Shaped};

impl Evaluator<'_> {
    pub(super) fn execute(
        &self,
        step: &Step,
        slots: &Slots,
        points: &Range<usize>,
    ) -> Result<ArrayD<f64>, EvaluationError> {
        let operand = |i: usize| -> Result<&Arc<ArrayD<f64>>, EvaluationError> {
            slots[step.operands[i]]
                .as_ref()
                .ok_or_else(|| EvaluationError::Internal {
                    expected: step.expr.shape().with_points(points.len()),
                    got: Vec::new(),
                })
        };
        let expr = &step.expr;

        let result = match expr.kind() {
            ExprKind::Zero => ArrayD::zeros(IxDyn(&expr.shape().with_points(1))),

            ExprKind::Constant(array) => array.view().insert_axis(Axis(0)).to_owned(),

            ExprKind::Coords(ndims) => {
                let sample = self
                    .sample
                    .ok_or(EvaluationError::CoordinatesWithoutSample)?;
                if sample.ndims() != *ndims {
                    return Err(EvaluationError::CoordinateDimension {
                        expected: *ndims,
                        got: sample.ndims(),
                    });
                }
                sample
                    .coords()
                    .slice_axis(Axis(0), points.clone().into())
                    .to_owned()
                    .into_dyn()
            }

            ExprKind::Argument(arg) => {
                let value =
                    self.bindings
                        .get(arg.name())
                        .ok_or_else(|| EvaluationError::UnboundArgument {
                            name: arg.name().to_owned(),
                        })?;
                if value.shape() != arg.shape().dims() {
                    return Err(EvaluationError::BindingShape {
                        name: arg.name().to_owned(),
                        expected: arg.shape().clone(),
                        got: value.shape().into(),
                    });
                }
                value.view().insert_axis(Axis(0)).to_owned()
            }

            ExprKind::PointData(data) => {
                let sample = self.sample.ok_or(EvaluationError::MissingSample {
                    bound: data.sample.id(),
                })?;
                if sample.id() != data.sample.id() {
                    return Err(EvaluationError::ForeignSample {
                        bound: data.sample.id(),
                        target: sample.id(),
                    });
                }
                data.values
                    .slice_axis(Axis(0), points.clone().into())
                    .to_owned()
            }

            ExprKind::Unary(op, _) => operand(0)?.mapv(|v| op.apply(v)),

            ExprKind::Binary(op, _, _) => {
                let (a, b) = (operand(0)?, operand(1)?);
                let rows = a.shape()[0].max(b.shape()[0]);
                let dims = expr.shape().with_points(rows);
                let mismatch = || EvaluationError::Internal {
                    expected: dims.clone(),
                    got: a.shape().to_vec(),
                };
                let av = a.broadcast(IxDyn(&dims)).ok_or_else(mismatch)?;
                let bv = b.broadcast(IxDyn(&dims)).ok_or_else(mismatch)?;
                Zip::from(&av).and(&bv).map_collect(|&x, &y| op.apply(x, y))
            }

            ExprKind::Sum { axis, .. } => operand(0)?.sum_axis(Axis(axis + 1)),

            ExprKind::Take { axis, index, .. } => {
                operand(0)?.index_axis(Axis(axis + 1), *index).to_owned()
            }

            ExprKind::InsertAxis { axis, .. } => {
                let a = operand(0)?;
                let shape = IxDyn(&expr.shape().with_points(a.shape()[0]));
                a.view()
                    .insert_axis(Axis(axis + 1))
                    .broadcast(shape)
                    .ok_or_else(|| EvaluationError::Internal {
                        expected: expr.shape().with_points(a.shape()[0]),
                        got: a.shape().to_vec(),
                    })?
                    .to_owned()
            }

            ExprKind::Transpose { axes, .. } => {
                let permutation: Vec<usize> = std::iter::once(0)
                    .chain(axes.iter().map(|a| a + 1))
                    .collect();
                operand(0)?
                    .view()
                    .permuted_axes(IxDyn(&permutation))
                    .as_standard_layout()
                    .into_owned()
            }

            ExprKind::Integral { integrand, sample } => self
                .on_sample(sample)
                .integrate(integrand)?
                .insert_axis(Axis(0)),
        };
        Ok(result)
    }
}
