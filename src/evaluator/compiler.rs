//! Lowering of an expression DAG into a linear evaluation program.
//!
//! # Compilation Process
//!
//! 1. **Topological ordering**: an iterative post-order walk visits each
//!    distinct node (by id) once, so operands always precede their users.
//! 2. **Slot assignment**: every distinct node gets exactly one result slot.
//!    A node shared by several parents is therefore computed once per pass
//!    and read by all of them, the array analogue of CSE cache slots.
//! 3. **Uniformity marking**: steps whose value does not vary between points
//!    are flagged so the executor can run them once, up front, and share the
//!    result read-only with every point chunk.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::Expr;

/// One node of the program; `operands` index earlier steps
pub(crate) struct Step {
    pub expr: Expr,
    pub operands: Vec<usize>,
    pub uniform: bool,
}

pub(crate) struct Program {
    steps: Vec<Step>,
    output: usize,
}

impl Program {
    pub(crate) fn compile(root: &Expr) -> Program {
        let mut slots: FxHashMap<u64, usize> = FxHashMap::default();
        let mut steps: Vec<Step> = Vec::new();
        let mut uses: Vec<usize> = Vec::new();

        // (node, operands already pushed)
        let mut stack: Vec<(Expr, bool)> = vec![(root.clone(), false)];
        while let Some((expr, expanded)) = stack.pop() {
            if slots.contains_key(&expr.id()) {
                continue;
            }
            if expanded {
                let operands: Vec<usize> = expr
                    .operands()
                    .iter()
                    .map(|child| slots[&child.id()])
                    .collect();
                for &slot in &operands {
                    uses[slot] += 1;
                }
                slots.insert(expr.id(), steps.len());
                uses.push(0);
                steps.push(Step {
                    uniform: !expr.is_point_dependent(),
                    expr,
                    operands,
                });
            } else {
                let children: Vec<Expr> = expr
                    .operands()
                    .into_iter()
                    .filter(|child| !slots.contains_key(&child.id()))
                    .cloned()
                    .collect();
                stack.push((expr, true));
                stack.extend(children.into_iter().rev().map(|child| (child, false)));
            }
        }

        let output = slots[&root.id()];
        debug!(
            steps = steps.len(),
            shared = uses.iter().filter(|&&n| n > 1).count(),
            uniform = steps.iter().filter(|s| s.uniform).count(),
            "compiled evaluation program"
        );
        Program { steps, output }
    }

    pub(crate) fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub(crate) fn output(&self) -> usize {
        self.output
    }

    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Argument, multiply};

    #[test]
    fn shared_node_gets_one_slot() {
        let u = Expr::from(Argument::new("u", [3]));
        let s = u.sin();
        // s appears twice, u three times
        let expr = multiply(&multiply(&s, &s).unwrap(), &u).unwrap();
        let program = Program::compile(&expr);
        assert_eq!(program.len(), 4);
        assert_eq!(program.output(), 3);
        let mul = &program.steps()[2];
        assert_eq!(mul.operands, vec![1, 1]);
    }

    #[test]
    fn coordinates_are_not_uniform() {
        let x = Expr::coords(2);
        let expr = (&x * 2.0).sum(0).unwrap();
        let program = Program::compile(&expr);
        assert!(program.steps().iter().any(|s| s.uniform));
        assert!(!program.steps()[program.output()].uniform);
    }
}
