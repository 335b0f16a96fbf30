//! Symbolic derivatives checked against central differences.

use ndarray::{ArrayD, IxDyn, arr1, arr2};

use crate::mesh::{self, Domain};
use crate::{
    Argument, Bindings, Eval, Expr, Shape, ShapeError, Shaped, derivative, divide, dot, multiply,
    power, zeros_like,
};

/// Evaluate `f` on `sample` with `u` bound to `value`
fn eval_at(f: &Expr, u: &Argument, value: &ArrayD<f64>) -> ArrayD<f64> {
    let bindings = Bindings::new().with(u.name(), value.clone());
    f.eval_with(&bindings).unwrap()
}

/// Central-difference check of `derivative(f, u)` at `u0`
fn check_derivative(f: &Expr, u: &Argument, u0: &ArrayD<f64>, tol: f64) {
    let df = derivative(f, u).unwrap();
    assert_eq!(df.shape(), &f.shape().concat(u.shape()));
    let exact = eval_at(&df, u, u0);
    let h = 1e-6;
    for (k, _) in u0.iter().enumerate() {
        let mut up = u0.clone();
        let mut down = u0.clone();
        up.as_slice_mut().unwrap()[k] += h;
        down.as_slice_mut().unwrap()[k] -= h;
        let fd = (eval_at(f, u, &up) - eval_at(f, u, &down)) / (2.0 * h);
        let column: Vec<f64> = exact
            .to_shape((f.shape().size(), u0.len()))
            .unwrap()
            .column(k)
            .to_vec();
        for (a, b) in column.iter().zip(fd.iter()) {
            assert!((a - b).abs() < tol, "entry {k}: {a} vs {b}");
        }
    }
}

#[test]
fn test_identity() {
    let u = Argument::new("u", [2, 3]);
    let du = derivative(&Expr::from(&u), &u).unwrap();
    assert_eq!(du.shape().dims(), &[2, 3, 2, 3]);
    let values = du.eval().unwrap();
    assert_eq!(values[[1, 2, 1, 2]], 1.0);
    assert_eq!(values[[1, 2, 0, 2]], 0.0);
    assert_eq!(values.sum(), 6.0);
}

#[test]
fn test_unrelated_argument_is_structural_zero() {
    let u = Argument::new("u", [3]);
    let v = Argument::new("v", [2]);
    let f = Expr::from(&u).sin().sum(0).unwrap();
    let df = derivative(&f, &v).unwrap();
    assert!(df.is_zero());
    assert_eq!(df, zeros_like(&v));
}

#[test]
fn test_coordinates_have_zero_derivative() {
    let (_, geom) = mesh::rectilinear(&[1, 1]);
    let u = Argument::new("u", [4]);
    let df = derivative(&geom.exp(), &u).unwrap();
    assert!(df.is_zero());
    assert_eq!(df.shape().dims(), &[2, 4]);
}

#[test]
fn test_argument_conflict() {
    let u = Argument::new("u", [3]);
    let f = Expr::from(&u).sum(0).unwrap();
    let wrong = Argument::new("u", [2]);
    assert!(matches!(
        derivative(&f, &wrong),
        Err(ShapeError::ArgumentConflict { .. })
    ));
}

#[test]
fn test_elementwise_functions() {
    let u = Argument::new("u", [3]);
    let x = Expr::from(&u);
    let u0 = arr1(&[0.3, 0.7, 1.1]).into_dyn();
    for f in [
        x.sin(),
        x.cos(),
        x.tan(),
        x.exp(),
        x.ln(),
        x.sqrt(),
        x.abs(),
        x.pow(3.0),
        -&x * 2.0 + 1.0,
    ] {
        check_derivative(&f, &u, &u0, 1e-6);
    }
}

#[test]
fn test_product_and_quotient() {
    let u = Argument::new("u", [2]);
    let x = Expr::from(&u);
    let a = x.get(0).unwrap();
    let b = x.get(1).unwrap();
    let u0 = arr1(&[1.3, 0.4]).into_dyn();
    check_derivative(&multiply(&a, &b.sin()).unwrap(), &u, &u0, 1e-6);
    check_derivative(&divide(&a.exp(), &b).unwrap(), &u, &u0, 1e-5);
    check_derivative(&power(&a, &b).unwrap(), &u, &u0, 1e-6);
}

#[test]
fn test_axis_operations() {
    let u = Argument::new("u", [2, 3]);
    let x = Expr::from(&u);
    let u0 = arr2(&[[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]).into_dyn();
    let m = Expr::constant(arr2(&[[1.0, -1.0], [2.0, 0.5], [0.0, 3.0]]));

    check_derivative(&x.pow(2.0).sum(1).unwrap(), &u, &u0, 1e-6);
    check_derivative(&x.transpose(&[1, 0]).unwrap().sin(), &u, &u0, 1e-6);
    check_derivative(&x.take(1, 2).unwrap().exp(), &u, &u0, 1e-6);
    check_derivative(&x.insert_axis(1, 4).unwrap().cos(), &u, &u0, 1e-6);

    // matrix product u @ m as a broadcast contraction
    let um = dot(
        &x.insert_axis(2, 2).unwrap(),
        &m.insert_axis(0, 2).unwrap(),
        1,
    )
    .unwrap();
    assert_eq!(um.shape().dims(), &[2, 2]);
    check_derivative(&um.pow(2.0), &u, &u0, 1e-5);
}

#[test]
fn test_broadcast_operands() {
    let u = Argument::new("u", [3]);
    let s = Argument::new("s", Shape::scalar());
    let x = Expr::from(&u);
    // scalar argument broadcast against a vector
    let f = multiply(&Expr::from(&s), &x.sin()).unwrap();
    let ds = derivative(&f, &s).unwrap();
    assert_eq!(ds.shape().dims(), &[3]);
    let bindings = Bindings::new()
        .with("s", ndarray::arr0(2.0))
        .with("u", arr1(&[0.0, 1.0, 2.0]));
    let values = ds.eval_with(&bindings).unwrap();
    assert!((values[[2]] - 2f64.sin()).abs() < 1e-15);
}

#[test]
fn test_shared_nodes_are_differentiated_once() {
    let u = Argument::new("u", [3]);
    let mut f = Expr::from(&u);
    // 2^40 paths through the DAG, 40 distinct nodes
    for _ in 0..40 {
        f = multiply(&f, &f).unwrap().sin();
    }
    let df = derivative(&f, &u).unwrap();
    assert_eq!(df.shape().dims(), &[3, 3]);
}

#[test]
fn test_integral_derivative() {
    let (domain, geom) = mesh::rectilinear(&[2, 2]);
    let sample = domain.sample_rule("gauss", 4).unwrap();
    let u = Argument::new("u", [2]);
    let field = dot(&geom, &Expr::from(&u), 0).unwrap();
    let energy = sample.integral(&field.pow(2.0));

    let gradient = derivative(&energy, &u).unwrap();
    assert!(matches!(gradient.kind(), crate::ExprKind::Integral { .. }));
    let hessian = derivative(&gradient, &u).unwrap();
    assert_eq!(hessian.shape().dims(), &[2, 2]);

    // ∫ 2 x_i x_j over [0,2]^2
    let bindings = Bindings::new().with("u", arr1(&[0.5, -1.0]));
    let h = hessian.eval_with(&bindings).unwrap();
    assert!((h[[0, 0]] - 2.0 * 16.0 / 3.0).abs() < 1e-12);
    assert!((h[[0, 1]] - 2.0 * 4.0).abs() < 1e-12);
    assert!((h[[1, 0]] - h[[0, 1]]).abs() < 1e-12);

    let g = gradient.eval_with(&bindings).unwrap();
    let direct = Eval::new(&sample)
        .arg("u", arr1(&[0.5, -1.0]))
        .integrate(&derivative(&field.pow(2.0), &u).unwrap())
        .unwrap();
    assert_eq!(g, direct);
}

#[test]
fn test_integral_of_zero_is_zero() {
    let (domain, geom) = mesh::rectilinear(&[1]);
    let sample = domain.sample_rule("gauss", 1).unwrap();
    let u = Argument::new("u", [5]);
    let integral = sample.integral(&geom.sin());
    let d = derivative(&integral, &u).unwrap();
    assert!(d.is_zero());
    assert_eq!(d.shape().dims(), &[1, 5]);
    assert_eq!(
        d.eval().unwrap(),
        ArrayD::<f64>::zeros(IxDyn(&[1, 5]))
    );
}

#[test]
fn test_deep_chain_derivative() {
    let u = Argument::new("u", [2]);
    let x = Expr::from(&u);
    let n = 20_000;
    let mut f = x.clone();
    for _ in 0..n {
        f = crate::add(&f, &x).unwrap();
    }
    let df = derivative(&f, &u).unwrap();
    let jac = df.eval().unwrap();
    let expected = (n + 1) as f64;
    assert_eq!(jac, arr2(&[[expected, 0.0], [0.0, expected]]).into_dyn());
    drop(f);
    drop(df);
}

#[test]
fn test_deep_nonlinear_chain_derivative() {
    let u = Argument::new("u", [2]);
    let x = Expr::from(&u);
    let mut f = x.clone();
    for _ in 0..20_000 {
        f = crate::add(&f.sin(), &x).unwrap();
    }
    let df = derivative(&f, &u).unwrap();
    let bindings = Bindings::new().with("u", arr1(&[0.1, -0.2]));
    let jac = df.eval_with(&bindings).unwrap();
    assert_eq!(jac.shape(), &[2, 2]);
    assert!(jac.iter().all(|v| v.is_finite()));
}

#[test]
fn test_shared_chains_compare_structurally() {
    let u = Argument::new("u", [3]);
    let v = Argument::new("v", [3]);
    let chain = |arg: &Argument| {
        let mut f = Expr::from(arg);
        for _ in 0..40 {
            f = multiply(&f, &f).unwrap().sin();
        }
        f
    };
    let (a, b) = (chain(&u), chain(&u));
    assert_ne!(a.id(), b.id());
    assert_eq!(a, b);
    assert_ne!(a, chain(&v));
}
