//! Structural properties of the topological sequencer and the backward pass over random DAGs.

use std::collections::HashMap;

use proptest::prelude::*;
use tapegrad::{Tape, TapeTerm};

/// Builds a random DAG on `tape`. Each op picks its operands among the terms built so far.
fn build<'a>(tape: &'a Tape, leaves: &[f64], ops: &[(u8, usize, usize)]) -> Vec<TapeTerm<'a>> {
    let mut terms: Vec<_> = leaves.iter().map(|&x| tape.value(x)).collect();
    for &(op, i, j) in ops {
        let lhs = terms[i % terms.len()];
        let rhs = terms[j % terms.len()];
        let term = match op {
            0 => lhs + rhs,
            1 => lhs * rhs,
            2 => lhs.pow(2.),
            _ => lhs.relu(),
        };
        terms.push(term);
    }
    terms
}

fn dag() -> impl Strategy<Value = (Vec<f64>, Vec<(u8, usize, usize)>)> {
    (
        prop::collection::vec(-3.0f64..3.0, 1..6),
        prop::collection::vec((0u8..4, 0usize..64, 0usize..64), 0..40),
    )
}

proptest! {
    #[test]
    fn operands_come_first((leaves, ops) in dag()) {
        let tape = Tape::new();
        let terms = build(&tape, &leaves, &ops);
        let root = *terms.last().unwrap();
        let order = root.topo_order();

        let position: HashMap<u32, usize> =
            order.iter().enumerate().map(|(i, term)| (term.idx(), i)).collect();
        prop_assert_eq!(position.len(), order.len(), "a node appears twice");
        prop_assert_eq!(order.last(), Some(&root));
        for term in &order {
            for operand in term.operands() {
                prop_assert!(position[&operand.idx()] < position[&term.idx()]);
            }
        }
    }

    #[test]
    fn only_reachable_nodes((leaves, ops) in dag()) {
        let tape = Tape::new();
        let terms = build(&tape, &leaves, &ops);
        let root = *terms.last().unwrap();
        let order = root.topo_order();

        let mut reachable = vec![root.idx()];
        let mut stack = vec![root];
        while let Some(term) = stack.pop() {
            for operand in term.operands() {
                if !reachable.contains(&operand.idx()) {
                    reachable.push(operand.idx());
                    stack.push(operand);
                }
            }
        }
        prop_assert_eq!(order.len(), reachable.len());
        for term in &order {
            prop_assert!(reachable.contains(&term.idx()));
        }
    }

    #[test]
    fn resequencing_is_idempotent((leaves, ops) in dag()) {
        let tape = Tape::new();
        let terms = build(&tape, &leaves, &ops);
        let root = *terms.last().unwrap();
        let first = root.topo_order();
        root.backward();
        prop_assert_eq!(first, root.topo_order());
    }

    #[test]
    fn backward_keeps_data((leaves, ops) in dag(), passes in 1usize..4) {
        let tape = Tape::new();
        let terms = build(&tape, &leaves, &ops);
        let root = *terms.last().unwrap();
        let before: Vec<u64> = terms.iter().map(|term| term.data().to_bits()).collect();
        for _ in 0..passes {
            root.backward();
        }
        let after: Vec<u64> = terms.iter().map(|term| term.data().to_bits()).collect();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn sum_of_leaves_has_unit_gradients(leaves in prop::collection::vec(-10.0f64..10.0, 1..20)) {
        let tape = Tape::new();
        let terms: Vec<_> = leaves.iter().map(|&x| tape.value(x)).collect();
        let sum = terms[1..].iter().fold(terms[0], |acc, &term| acc + term);
        sum.backward();
        for term in &terms {
            prop_assert_eq!(term.grad(), 1.);
        }
    }
}
