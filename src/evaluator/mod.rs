//! Numeric evaluation of expressions at the points of a sample.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐    ┌────────────┐    ┌──────────────────────┐
//! │    Expr     │ -> │  Compiler  │ -> │  Program (slots)     │
//! │   (DAG)     │    │ (topo sort)│    │  uniform | per-point │
//! └─────────────┘    └────────────┘    └──────────────────────┘
//!                                              │
//!                          ┌───────────────────┼───────────────────┐
//!                          ▼                   ▼                   ▼
//!                    ┌──────────┐       ┌──────────┐       ┌──────────┐
//!                    │ uniform  │       │  chunks  │       │ parallel │
//!                    │  (once)  │       │ (serial) │       │  (Rayon) │
//!                    └──────────┘       └──────────┘       └──────────┘
//! ```
//!
//! Uniform steps (constants, bound arguments, integrals, and anything built
//! only from them) run once; their results are shared read-only, through
//! `Arc`, with every chunk of points. Point-dependent steps then run per
//! chunk, each chunk computing every shared node exactly once.
//!
//! # Example
//!
//! ```
//! use femsym::mesh::{self, Domain};
//! use femsym::{Argument, Expr, multiply};
//! use ndarray::arr1;
//!
//! let (domain, geom) = mesh::rectilinear(&[2, 1]);
//! let sample = domain.sample_rule("gauss", 2).unwrap();
//!
//! let u = Argument::new("u", [2]);
//! let f = multiply(&geom, &Expr::from(&u)).unwrap().sum(0).unwrap();
//! let values = femsym::Eval::new(&sample)
//!     .arg("u", arr1(&[1.0, 0.0]))
//!     .eval(&f)
//!     .unwrap();
//! assert_eq!(values.shape(), &[sample.npoints()]);
//! ```

mod compiler;
mod execution;

use std::ops::Range;
use std::sync::Arc;

use ndarray::{ArrayD, Axis, IxDyn};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::core::error::EvaluationError;
use crate::{Expr, Sample};
use compiler::Program;

/// Default number of points evaluated together in one chunk
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

type Slots = Vec<Option<Arc<ArrayD<f64>>>>;

/// Concrete values for arguments, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Bindings(FxHashMap<String, Arc<ArrayD<f64>>>);

impl Bindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert)
    #[must_use]
    pub fn with<D: ndarray::Dimension>(
        mut self,
        name: impl Into<String>,
        value: ndarray::Array<f64, D>,
    ) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert<D: ndarray::Dimension>(
        &mut self,
        name: impl Into<String>,
        value: ndarray::Array<f64, D>,
    ) {
        self.0.insert(name.into(), Arc::new(value.into_dyn()));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<ArrayD<f64>>> {
        self.0.get(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Execution settings shared by every evaluation in one call tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalOptions {
    /// Points per chunk; at least 1
    pub chunk_size: usize,
    /// Run chunks on the rayon pool (with the `parallel` feature)
    pub parallel: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel: cfg!(feature = "parallel"),
        }
    }
}

/// Builder for evaluating expressions on a sample.
///
/// # Example
/// ```
/// use femsym::mesh::{self, Domain};
/// use femsym::{Argument, Eval, Expr, multiply};
/// use ndarray::arr1;
///
/// let (domain, geom) = mesh::rectilinear(&[2, 1]);
/// let sample = domain.sample_rule("gauss", 2).unwrap();
/// let dofs = Argument::new("dofs", [2]);
/// let expr = multiply(&geom, &Expr::from(&dofs)).unwrap();
///
/// let values = Eval::new(&sample)
///     .arg("dofs", arr1(&[2.0, -1.0]))
///     .chunk_size(3)
///     .eval(&expr)
///     .unwrap();
/// assert_eq!(values.shape(), &[sample.npoints(), 2]);
/// ```
#[derive(Debug, Clone)]
pub struct Eval<'a> {
    sample: &'a Sample,
    bindings: Bindings,
    options: EvalOptions,
}

impl<'a> Eval<'a> {
    #[must_use]
    pub fn new(sample: &'a Sample) -> Self {
        Self {
            sample,
            bindings: Bindings::new(),
            options: EvalOptions::default(),
        }
    }

    /// Bind argument `name` to `value`
    #[must_use]
    pub fn arg<D: ndarray::Dimension>(
        mut self,
        name: impl Into<String>,
        value: ndarray::Array<f64, D>,
    ) -> Self {
        self.bindings.insert(name, value);
        self
    }

    /// Replace all bindings
    #[must_use]
    pub fn bindings(mut self, bindings: Bindings) -> Self {
        self.bindings = bindings;
        self
    }

    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.options.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.options.parallel = parallel;
        self
    }

    #[must_use]
    pub fn options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }

    fn evaluator(&self) -> Evaluator<'_> {
        Evaluator {
            sample: Some(self.sample),
            bindings: &self.bindings,
            options: &self.options,
        }
    }

    /// Values of `expr` at every point, shape `(npoints, *expr.shape)`
    pub fn eval(&self, expr: &Expr) -> Result<ArrayD<f64>, EvaluationError> {
        self.evaluator().evaluate(expr)
    }

    /// Weighted sum of `expr` over the points, shape `expr.shape`
    pub fn integrate(&self, expr: &Expr) -> Result<ArrayD<f64>, EvaluationError> {
        self.evaluator().integrate(expr)
    }

    /// Evaluate `expr` and freeze the result as point data of this sample.
    ///
    /// Unlike [`Sample::asfunction`], the source expression is recorded, so
    /// the result differentiates like `expr` itself.
    pub fn bind(&self, expr: &Expr) -> Result<Expr, EvaluationError> {
        let values = self.eval(expr)?;
        Ok(Expr::point_data(self.sample, values, Some(expr.clone())))
    }
}

impl Expr {
    /// Evaluate an expression that does not vary between points, such as
    /// an integral. Returns an array of shape `self.shape`.
    pub fn eval(&self) -> Result<ArrayD<f64>, EvaluationError> {
        self.eval_with(&Bindings::new())
    }

    /// [`eval`](Self::eval) with argument bindings
    pub fn eval_with(&self, bindings: &Bindings) -> Result<ArrayD<f64>, EvaluationError> {
        let options = EvalOptions::default();
        let evaluator = Evaluator {
            sample: None,
            bindings,
            options: &options,
        };
        Ok(evaluator.evaluate(self)?.index_axis_move(Axis(0), 0))
    }
}

/// One evaluation pass: optional sample plus the bindings and settings in force.
pub(crate) struct Evaluator<'a> {
    sample: Option<&'a Sample>,
    bindings: &'a Bindings,
    options: &'a EvalOptions,
}

impl<'a> Evaluator<'a> {
    /// Same bindings and settings, different sample (for nested integrals)
    fn on_sample<'s>(&'s self, sample: &'s Sample) -> Evaluator<'s> {
        Evaluator {
            sample: Some(sample),
            bindings: self.bindings,
            options: self.options,
        }
    }

    fn npoints(&self) -> usize {
        self.sample.map_or(1, Sample::npoints)
    }

    pub(crate) fn evaluate(&self, expr: &Expr) -> Result<ArrayD<f64>, EvaluationError> {
        let program = Program::compile(expr);
        let npoints = self.npoints();
        let full_shape = expr.shape().with_points(npoints);

        // Uniform steps only ever read uniform operands, so they can all
        // run before any point-dependent step.
        let mut shared: Slots = vec![None; program.len()];
        for (i, step) in program.steps().iter().enumerate() {
            if step.uniform {
                let value = self.execute(step, &shared, &(0..1))?;
                shared[i] = Some(Arc::new(value));
            }
        }

        let output = program.output();
        if let Some(value) = &shared[output] {
            return broadcast_rows(value, &full_shape);
        }
        if npoints == 0 {
            return Ok(ArrayD::zeros(IxDyn(&full_shape)));
        }

        let chunks: Vec<Range<usize>> = (0..npoints)
            .step_by(self.options.chunk_size.max(1))
            .map(|start| start..(start + self.options.chunk_size.max(1)).min(npoints))
            .collect();
        let run = |points: &Range<usize>| self.run_chunk(&program, &shared, points);

        #[cfg(feature = "parallel")]
        let parts = if self.options.parallel && chunks.len() > 1 {
            crate::parallel::map_chunks(&chunks, run)?
        } else {
            chunks.iter().map(run).collect::<Result<Vec<_>, _>>()?
        };
        #[cfg(not(feature = "parallel"))]
        let parts = chunks.iter().map(run).collect::<Result<Vec<_>, _>>()?;

        if parts.len() == 1 {
            return Ok(parts.into_iter().next().unwrap_or_default());
        }
        let views: Vec<_> = parts.iter().map(ArrayD::view).collect();
        ndarray::concatenate(Axis(0), &views).map_err(|_| EvaluationError::Internal {
            expected: full_shape,
            got: parts.first().map(|p| p.shape().to_vec()).unwrap_or_default(),
        })
    }

    fn run_chunk(
        &self,
        program: &Program,
        shared: &Slots,
        points: &Range<usize>,
    ) -> Result<ArrayD<f64>, EvaluationError> {
        trace!(start = points.start, end = points.end, "evaluating chunk");
        let mut slots = shared.clone();
        for (i, step) in program.steps().iter().enumerate() {
            if !step.uniform {
                let value = self.execute(step, &slots, points)?;
                slots[i] = Some(Arc::new(value));
            }
        }
        let output = slots[program.output()].take();
        drop(slots);
        output
            .map(|value| Arc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone()))
            .ok_or_else(|| EvaluationError::Internal {
                expected: Vec::new(),
                got: Vec::new(),
            })
    }

    /// `sum_p weights[p] * values[p]`, accumulated in point order
    pub(crate) fn integrate(&self, expr: &Expr) -> Result<ArrayD<f64>, EvaluationError> {
        let values = self.evaluate(expr)?;
        let mut total = ArrayD::zeros(IxDyn(expr.shape()));
        match self.sample {
            Some(sample) => {
                for (weight, row) in sample.weights().iter().zip(values.outer_iter()) {
                    total.scaled_add(*weight, &row);
                }
            }
            None => total.assign(&values.index_axis(Axis(0), 0)),
        }
        Ok(total)
    }
}

/// Repeat a uniform `(1, *shape)` result for every point
fn broadcast_rows(
    value: &ArrayD<f64>,
    full_shape: &[usize],
) -> Result<ArrayD<f64>, EvaluationError> {
    value
        .broadcast(IxDyn(full_shape))
        .map(|view| view.to_owned())
        .ok_or_else(|| EvaluationError::Internal {
            expected: full_shape.to_vec(),
            got: value.shape().to_vec(),
        })
}
