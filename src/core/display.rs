//! Compact functional rendering of expressions, for diagnostics.
//!
//! A node reached along more than one path is printed in full once, tagged
//! `#id=...`, and as `#id` at every later use, so the output stays linear
//! in the number of distinct nodes. The output is meant for error messages
//! and debugging, not for round-tripping.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::expr::{Expr, ExprKind};

/// Children printed inside a node's parentheses
fn printed_children(kind: &ExprKind) -> Vec<&Expr> {
    match kind {
        ExprKind::Integral { integrand, .. } => vec![integrand],
        _ => kind.operands(),
    }
}

/// Ids of nodes reachable from `root` along more than one path
fn shared_nodes(root: &Expr) -> FxHashSet<u64> {
    let mut uses: FxHashMap<u64, usize> = FxHashMap::default();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let count = uses.entry(node.id()).or_insert(0);
        *count += 1;
        if *count == 1 {
            stack.extend(printed_children(node.kind()));
        }
    }
    uses.into_iter()
        .filter(|&(_, count)| count > 1)
        .map(|(id, _)| id)
        .collect()
}

enum Piece<'a> {
    Node(&'a Expr),
    Text(String),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = shared_nodes(self);
        let mut printed: FxHashSet<u64> = FxHashSet::default();
        let mut pieces = vec![Piece::Node(self)];
        while let Some(piece) = pieces.pop() {
            let node = match piece {
                Piece::Text(text) => {
                    f.write_str(&text)?;
                    continue;
                }
                Piece::Node(node) => node,
            };
            if shared.contains(&node.id()) {
                if !printed.insert(node.id()) {
                    write!(f, "#{}", node.id())?;
                    continue;
                }
                write!(f, "#{}=", node.id())?;
            }

            let (head, args, tail) = match node.kind() {
                ExprKind::Zero => {
                    write!(f, "zeros{}", node.shape())?;
                    continue;
                }
                ExprKind::Constant(array) => {
                    if array.ndim() == 0 {
                        let value = array.iter().next().copied().unwrap_or(f64::NAN);
                        write!(f, "{value}")?;
                    } else {
                        write!(f, "const{}", node.shape())?;
                    }
                    continue;
                }
                ExprKind::Coords(_) => {
                    f.write_str("x")?;
                    continue;
                }
                ExprKind::Argument(arg) => {
                    write!(f, "{arg}")?;
                    continue;
                }
                ExprKind::PointData(data) => {
                    write!(f, "sampled#{}{}", data.sample.id(), node.shape())?;
                    continue;
                }
                ExprKind::Unary(op, a) => (op.name(), vec![a], String::new()),
                ExprKind::Binary(op, a, b) => (op.name(), vec![a, b], String::new()),
                ExprKind::Sum { arg, axis } => ("sum", vec![arg], format!(", {axis}")),
                ExprKind::Take { arg, axis, index } => {
                    ("take", vec![arg], format!(", {axis}, {index}"))
                }
                ExprKind::InsertAxis { arg, axis, length } => {
                    ("insertaxis", vec![arg], format!(", {axis}, {length}"))
                }
                ExprKind::Transpose { arg, axes } => {
                    ("transpose", vec![arg], format!(", {axes:?}"))
                }
                ExprKind::Integral { integrand, sample } => (
                    "integral",
                    vec![integrand],
                    format!(", sample#{}", sample.id()),
                ),
            };

            write!(f, "{head}(")?;
            pieces.push(Piece::Text(format!("{tail})")));
            for (i, arg) in args.into_iter().enumerate().rev() {
                pieces.push(Piece::Node(arg));
                if i > 0 {
                    pieces.push(Piece::Text(", ".to_string()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Argument, Expr, multiply};

    #[test]
    fn renders_nested_calls() {
        let u = Expr::from(Argument::new("u", [2]));
        let expr = u.sin().sum(0).unwrap();
        assert_eq!(expr.to_string(), "sum(sin(?u(2,)), 0)");
    }

    #[test]
    fn renders_scalars_and_zeros() {
        assert_eq!(Expr::scalar(2.5).to_string(), "2.5");
        assert_eq!(Expr::zeros([2, 3]).to_string(), "zeros(2, 3)");
    }

    #[test]
    fn renders_shared_nodes_once() {
        let s = Expr::from(Argument::new("u", [2])).sin();
        let expr = multiply(&s, &s).unwrap();
        let id = s.id();
        assert_eq!(expr.to_string(), format!("multiply(#{id}=sin(?u(2,)), #{id})"));
        assert!(format!("{expr:?}").ends_with(&expr.to_string()));
    }

    #[test]
    fn shared_chain_renders_linearly() {
        let mut f = Expr::from(Argument::new("u", [3]));
        for _ in 0..40 {
            f = multiply(&f, &f).unwrap().sin();
        }
        let text = f.to_string();
        assert!(text.len() < 40 * 64, "{} bytes", text.len());
        assert_eq!(text.matches("?u").count(), 1);
    }
}
