//! Structured domains that produce samples.
//!
//! Only what is needed to obtain a [`Sample`] from a point rule lives here:
//! the [`Domain`] trait, the [`PointsRule`] names, and a tensor-product
//! [`Rectilinear`] grid.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2};

use crate::core::error::ConstructionError;
use crate::sample::{ElementPoints, Sample, tensor_simplices};
use crate::Expr;

/// Point generation rule for [`Domain::sample`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointsRule {
    /// Equispaced points including the element boundary, `degree` per axis
    Bezier,
    /// Gauss-Legendre points integrating polynomials up to `degree` exactly
    Gauss,
}

impl PointsRule {
    fn name(self) -> &'static str {
        match self {
            PointsRule::Bezier => "bezier",
            PointsRule::Gauss => "gauss",
        }
    }

    /// 1D points on `[0, 1]` with weights summing to one
    pub fn points_1d(self, degree: usize) -> Result<(Vec<f64>, Vec<f64>), ConstructionError> {
        match self {
            PointsRule::Bezier => bezier_1d(degree),
            PointsRule::Gauss => Ok(gauss_1d(degree / 2 + 1)),
        }
    }
}

impl FromStr for PointsRule {
    type Err = ConstructionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bezier" => Ok(PointsRule::Bezier),
            "gauss" => Ok(PointsRule::Gauss),
            other => Err(ConstructionError::UnknownRule(other.to_owned())),
        }
    }
}

impl fmt::Display for PointsRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn bezier_1d(degree: usize) -> Result<(Vec<f64>, Vec<f64>), ConstructionError> {
    if degree < 2 {
        return Err(ConstructionError::UnsupportedDegree {
            rule: "bezier",
            degree,
        });
    }
    let h = 1.0 / (degree - 1) as f64;
    let points = (0..degree).map(|i| i as f64 * h).collect();
    let weights = (0..degree)
        .map(|i| if i == 0 || i == degree - 1 { h / 2.0 } else { h })
        .collect();
    Ok((points, weights))
}

/// `n`-point Gauss-Legendre rule mapped to `[0, 1]`, ascending
fn gauss_1d(n: usize) -> (Vec<f64>, Vec<f64>) {
    // Small rules are tabulated so that weights sum to exactly one.
    match n {
        1 => return (vec![0.5], vec![1.0]),
        2 => {
            let d = 0.5 / 3f64.sqrt();
            return (vec![0.5 - d, 0.5 + d], vec![0.5, 0.5]);
        }
        3 => {
            let d = 0.5 * 0.6f64.sqrt();
            return (
                vec![0.5 - d, 0.5, 0.5 + d],
                vec![5.0 / 18.0, 4.0 / 9.0, 5.0 / 18.0],
            );
        }
        _ => {}
    }

    let mut points = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    for i in 0..n {
        // Newton iteration on P_n from the Chebyshev-like initial guess
        let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..100 {
            let dx = legendre_ratio(n, x);
            x -= dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let dp = legendre_slope(n, x);
        points.push((1.0 - x) / 2.0);
        weights.push(1.0 / ((1.0 - x * x) * dp * dp));
    }
    (points, weights)
}

/// `(P_n(x), P_{n-1}(x))` by Bonnet's recurrence
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let (mut p0, mut p1) = (1.0, x);
    for k in 2..=n {
        let k = k as f64;
        let p2 = ((2.0 * k - 1.0) * x * p1 - (k - 1.0) * p0) / k;
        p0 = p1;
        p1 = p2;
    }
    (p1, p0)
}

/// `P_n'(x)`, valid for `|x| < 1`
fn legendre_slope(n: usize, x: f64) -> f64 {
    let (p, p_prev) = legendre(n, x);
    n as f64 * (x * p - p_prev) / (x * x - 1.0)
}

/// Newton step `P_n(x) / P_n'(x)`
fn legendre_ratio(n: usize, x: f64) -> f64 {
    legendre(n, x).0 / legendre_slope(n, x)
}

/// A discretized domain that can produce samples.
pub trait Domain {
    fn ndims(&self) -> usize;

    fn nelems(&self) -> usize;

    /// Points of `rule` at `degree` on every element
    fn sample(&self, rule: PointsRule, degree: usize) -> Result<Sample, ConstructionError>;

    /// [`sample`](Self::sample) with the rule given by name
    fn sample_rule(&self, rule: &str, degree: usize) -> Result<Sample, ConstructionError> {
        self.sample(rule.parse()?, degree)
    }
}

/// Tensor-product grid of axis-aligned box elements.
///
/// Elements are numbered row-major over the cell grid, last axis fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct Rectilinear {
    nodes: Vec<Vec<f64>>,
}

impl Rectilinear {
    /// Grid with the given node coordinates per axis, each strictly increasing
    pub fn new(nodes: Vec<Vec<f64>>) -> Result<Self, ConstructionError> {
        for (axis, coords) in nodes.iter().enumerate() {
            if coords.len() < 2 {
                return Err(ConstructionError::InvalidDomain(format!(
                    "axis {axis} needs at least two nodes, got {}",
                    coords.len()
                )));
            }
            if coords.windows(2).any(|w| !(w[0] < w[1])) {
                return Err(ConstructionError::InvalidDomain(format!(
                    "nodes of axis {axis} are not strictly increasing"
                )));
            }
        }
        Ok(Self { nodes })
    }

    /// Element bounds `(lower, upper)` per axis, in element order
    fn cells(&self) -> Vec<Vec<(f64, f64)>> {
        self.nodes.iter().fold(vec![Vec::new()], |acc, coords| {
            acc.iter()
                .flat_map(|prefix| {
                    coords.windows(2).map(move |w| {
                        let mut cell = prefix.clone();
                        cell.push((w[0], w[1]));
                        cell
                    })
                })
                .collect()
        })
    }
}

impl Domain for Rectilinear {
    fn ndims(&self) -> usize {
        self.nodes.len()
    }

    fn nelems(&self) -> usize {
        self.nodes.iter().map(|n| n.len().saturating_sub(1)).product()
    }

    fn sample(&self, rule: PointsRule, degree: usize) -> Result<Sample, ConstructionError> {
        let ndims = self.ndims();
        let (points, weights) = rule.points_1d(degree)?;
        let counts = vec![points.len(); ndims];
        let simplices = tensor_simplices(&counts);
        let npoints: usize = counts.iter().product();

        let elements = self
            .cells()
            .into_iter()
            .map(|cell| {
                let mut coords = Array2::zeros((npoints, ndims));
                let mut w = Array1::ones(npoints);
                let mut index = vec![0; ndims];
                for p in 0..npoints {
                    // row-major decomposition of the local point number
                    let mut rest = p;
                    for axis in (0..ndims).rev() {
                        index[axis] = rest % counts[axis];
                        rest /= counts[axis];
                    }
                    for (axis, &(lo, hi)) in cell.iter().enumerate() {
                        let i = index[axis];
                        coords[[p, axis]] = lo + (hi - lo) * points[i];
                        w[p] *= (hi - lo) * weights[i];
                    }
                }
                ElementPoints {
                    coords,
                    weights: w,
                    simplices: simplices.clone(),
                }
            })
            .collect();
        Sample::new(ndims, elements)
    }
}

/// Unit-spaced grid with `shape[i]` elements along axis `i`, and its
/// geometry (the coordinate expression).
#[must_use]
pub fn rectilinear(shape: &[usize]) -> (Rectilinear, Expr) {
    let nodes = shape
        .iter()
        .map(|&n| (0..=n).map(|i| i as f64).collect())
        .collect();
    (Rectilinear { nodes }, Expr::coords(shape.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integrate_poly(rule: PointsRule, degree: usize, power: i32) -> f64 {
        let (x, w) = rule.points_1d(degree).unwrap();
        x.iter().zip(&w).map(|(x, w)| w * x.powi(power)).sum()
    }

    #[test]
    fn gauss_weights_sum_to_one() {
        for degree in 0..12 {
            let (_, w) = PointsRule::Gauss.points_1d(degree).unwrap();
            let total: f64 = w.iter().sum();
            assert!((total - 1.0).abs() < 1e-14, "degree {degree}: {total}");
        }
    }

    #[test]
    fn gauss_is_exact_up_to_degree() {
        for degree in 0..12 {
            for power in 0..=degree as i32 {
                let got = integrate_poly(PointsRule::Gauss, degree, power);
                let exact = 1.0 / f64::from(power + 1);
                assert!((got - exact).abs() < 1e-13, "degree {degree} x^{power}");
            }
        }
    }

    #[test]
    fn gauss_points_are_ascending_and_interior() {
        let (x, _) = PointsRule::Gauss.points_1d(9).unwrap();
        assert_eq!(x.len(), 5);
        assert!(x.windows(2).all(|w| w[0] < w[1]));
        assert!(x.iter().all(|&x| x > 0.0 && x < 1.0));
    }

    #[test]
    fn bezier_includes_boundary() {
        let (x, w) = PointsRule::Bezier.points_1d(3).unwrap();
        assert_eq!(x, vec![0.0, 0.5, 1.0]);
        assert_eq!(w, vec![0.25, 0.5, 0.25]);
        assert!(PointsRule::Bezier.points_1d(1).is_err());
    }

    #[test]
    fn rule_names_parse() {
        assert_eq!("gauss".parse(), Ok(PointsRule::Gauss));
        assert_eq!(PointsRule::Bezier.to_string(), "bezier");
        assert_eq!(
            "lobatto".parse::<PointsRule>(),
            Err(ConstructionError::UnknownRule("lobatto".into()))
        );
    }

    #[test]
    fn elements_are_row_major() {
        let (domain, _) = rectilinear(&[2, 3]);
        assert_eq!(domain.nelems(), 6);
        let sample = domain.sample(PointsRule::Gauss, 0).unwrap();
        let centers = sample.coords();
        assert_eq!(centers.row(0).to_vec(), vec![0.5, 0.5]);
        assert_eq!(centers.row(1).to_vec(), vec![0.5, 1.5]);
        assert_eq!(centers.row(3).to_vec(), vec![1.5, 0.5]);
    }

    #[test]
    fn invalid_nodes_are_rejected() {
        assert!(Rectilinear::new(vec![vec![0.0]]).is_err());
        assert!(Rectilinear::new(vec![vec![0.0, 1.0, 1.0]]).is_err());
        let domain = Rectilinear::new(vec![vec![0.0, 0.5, 2.0]]).unwrap();
        let sample = domain.sample(PointsRule::Gauss, 1).unwrap();
        let length: f64 = sample.weights().sum();
        assert!((length - 2.0).abs() < 1e-15);
    }
}
