//! Join Kernel (§4.4): one launch per join bag.
//!
//! Both children of a join bag share the join bag's variable set in a
//! well-formed (nice) tree decomposition, so `id1`/`id2` are `id`
//! reordered into each child's own variable ordering. Output is always
//! dense array layout — joins rewrite the entire `2^|bag|` space.

use crate::bag::{bit, project_shared};
use crate::error::Error;
use crate::exponent::ExponentBookkeeper;
use crate::table::{ArrayTable, TreeTable, UNINITIALIZED};
use gpusat_types::{AssignmentId, Bag, Literal, SatFormula};
use portable_atomic::{AtomicU64, Ordering};
use std::ops::Range;

pub enum ChildRef<'a> {
    Array(&'a [ArrayTable]),
    Tree { table: &'a TreeTable, width: u32 },
}

impl<'a> ChildRef<'a> {
    fn lookup(&self, id: AssignmentId) -> Option<f64> {
        match self {
            ChildRef::Array(frags) => frags.iter().find(|f| f.in_range(id)).map(|f| f.get(id)),
            ChildRef::Tree { table, width } => Some(table.get_count(id, *width)),
        }
    }
}

/// Product of `weights[var*2 + ¬bit]` over the bag's variables (§4.4): the
/// *same*-literal weight at each position, already multiplied in once by
/// each child and so divided out here exactly once.
fn join_weight(formula: &SatFormula, variables: &[u32], id: AssignmentId) -> f64 {
    if !formula.is_weighted() {
        return 1.0;
    }
    variables
        .iter()
        .enumerate()
        .map(|(pos, &var)| {
            let truth = bit(id, pos);
            let literal = if truth { var as Literal } else { -(var as Literal) };
            formula.literal_weight(literal)
        })
        .product()
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    dest: &ArrayTable,
    ids: Range<AssignmentId>,
    bag: &Bag,
    left_bag: &Bag,
    left: &ChildRef,
    right_bag: &Bag,
    right: &ChildRef,
    formula: &SatFormula,
    correction: f64,
    exponent: &ExponentBookkeeper,
    satisfying_count: &AtomicU64,
) -> Result<(), Error> {
    for id in ids {
        let id1 = project_shared(id, &bag.variables, &left_bag.variables, 0);
        let id2 = project_shared(id, &bag.variables, &right_bag.variables, 0);
        let weight = join_weight(formula, &bag.variables, id);

        let tmp1 = left.lookup(id1);
        let tmp2 = right.lookup(id2);

        match (tmp1, tmp2) {
            (Some(v1), Some(v2)) => {
                let product = (v1 * v2) / correction / weight;
                dest.set(id, product);
                if product > 0.0 {
                    exponent.observe(product);
                    satisfying_count.fetch_add(1, Ordering::AcqRel);
                }
            }
            (Some(v1), None) => fold_single(dest, exponent, satisfying_count, id, v1, correction, weight),
            (None, Some(v2)) => fold_single(dest, exponent, satisfying_count, id, v2, correction, weight),
            (None, None) => {}
        }
    }
    Ok(())
}

/// Folds a single child's contribution into `dest` when the other child's
/// chunk did not cover `id` this launch. The first fold stores the raw
/// factor (awaiting the second); the second fold multiplies the two and
/// applies the division, matching §4.4's "fold in with the same division".
fn fold_single(
    dest: &ArrayTable,
    exponent: &ExponentBookkeeper,
    satisfying_count: &AtomicU64,
    id: AssignmentId,
    factor: f64,
    correction: f64,
    weight: f64,
) {
    let previous = dest.get(id);
    if previous == UNINITIALIZED {
        dest.set(id, factor);
        if factor > 0.0 {
            satisfying_count.fetch_add(1, Ordering::AcqRel);
        }
    } else {
        let combined = (previous * factor) / correction / weight;
        dest.set(id, combined);
        if combined > 0.0 {
            exponent.observe(combined);
        }
        if previous > 0.0 && combined == 0.0 {
            satisfying_count.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpusat_types::BagKind;

    fn bag(id: u32, vars: Vec<u32>) -> Bag {
        Bag { id, kind: BagKind::Join, variables: vars, children: vec![], max_table_size: None }
    }

    #[test]
    fn join_multiplies_fully_present_children() {
        let join_bag = bag(0, vec![1, 2]);
        let left_bag = bag(1, vec![1, 2]);
        let right_bag = bag(2, vec![1, 2]);

        let left_table = ArrayTable::zeroed(0, 4);
        left_table.set(0b01, 2.0);
        let right_table = ArrayTable::zeroed(0, 4);
        right_table.set(0b01, 3.0);

        let dest = ArrayTable::uninitialized(0, 4);
        let exponent = ExponentBookkeeper::new();
        let counter = AtomicU64::new(0);
        let formula = SatFormula::unweighted(2, vec![]);

        run(
            &dest,
            0..4,
            &join_bag,
            &left_bag,
            &ChildRef::Array(std::slice::from_ref(&left_table)),
            &right_bag,
            &ChildRef::Array(std::slice::from_ref(&right_table)),
            &formula,
            1.0,
            &exponent,
            &counter,
        )
        .unwrap();

        assert_eq!(dest.get(0b01), 6.0);
        assert_eq!(dest.get(0b00), 0.0);
        assert_eq!(counter.load(Ordering::Acquire), 1);
    }

    #[test]
    fn join_is_symmetric_under_child_swap() {
        let join_bag = bag(0, vec![1, 2]);
        let left_bag = bag(1, vec![1, 2]);
        let right_bag = bag(2, vec![1, 2]);

        let a = ArrayTable::zeroed(0, 4);
        a.set(0b10, 5.0);
        let b = ArrayTable::zeroed(0, 4);
        b.set(0b10, 7.0);

        let formula = SatFormula::unweighted(2, vec![]);
        let exponent = ExponentBookkeeper::new();
        let counter = AtomicU64::new(0);
        let forward = ArrayTable::uninitialized(0, 4);
        run(
            &forward, 0..4, &join_bag, &left_bag, &ChildRef::Array(std::slice::from_ref(&a)),
            &right_bag, &ChildRef::Array(std::slice::from_ref(&b)), &formula, 1.0, &exponent, &counter,
        )
        .unwrap();

        let exponent2 = ExponentBookkeeper::new();
        let counter2 = AtomicU64::new(0);
        let backward = ArrayTable::uninitialized(0, 4);
        run(
            &backward, 0..4, &join_bag, &right_bag, &ChildRef::Array(std::slice::from_ref(&b)),
            &left_bag, &ChildRef::Array(std::slice::from_ref(&a)), &formula, 1.0, &exponent2, &counter2,
        )
        .unwrap();

        assert_eq!(forward.get(0b10), backward.get(0b10));
    }

    #[test]
    fn fold_single_accumulates_across_two_partial_launches() {
        let dest = ArrayTable::uninitialized(0, 2);
        let exponent = ExponentBookkeeper::new();
        let counter = AtomicU64::new(0);

        fold_single(&dest, &exponent, &counter, 0, 4.0, 1.0, 1.0);
        assert_eq!(dest.get(0), 4.0);
        assert_eq!(counter.load(Ordering::Acquire), 1);

        fold_single(&dest, &exponent, &counter, 0, 2.0, 1.0, 1.0);
        assert_eq!(dest.get(0), 8.0);
        assert_eq!(counter.load(Ordering::Acquire), 1);
    }

    #[test]
    fn weighted_join_divides_out_the_same_literal_weight() {
        // 1 var, w(+1)=0.3, w(-1)=0.7; both children are leaves over {1} with
        // no clauses, so child(1) holds weight(1)=0.3 and child(0) holds
        // weight(-1)=0.7. Joining must divide out each id's own weight once
        // (not the opposite literal's), leaving 0.3 + 0.7 = 1.0 total.
        let join_bag = bag(0, vec![1]);
        let left_bag = bag(1, vec![1]);
        let right_bag = bag(2, vec![1]);

        let left_table = ArrayTable::zeroed(0, 2);
        left_table.set(0, 0.7);
        left_table.set(1, 0.3);
        let right_table = ArrayTable::zeroed(0, 2);
        right_table.set(0, 0.7);
        right_table.set(1, 0.3);

        let dest = ArrayTable::uninitialized(0, 2);
        let exponent = ExponentBookkeeper::new();
        let counter = AtomicU64::new(0);
        let mut formula = SatFormula::unweighted(1, vec![]);
        formula.weights = vec![0.3, 0.7];

        run(
            &dest,
            0..2,
            &join_bag,
            &left_bag,
            &ChildRef::Array(std::slice::from_ref(&left_table)),
            &right_bag,
            &ChildRef::Array(std::slice::from_ref(&right_table)),
            &formula,
            1.0,
            &exponent,
            &counter,
        )
        .unwrap();

        assert!((dest.get(0) + dest.get(1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn fold_single_decrements_when_second_factor_is_zero() {
        let dest = ArrayTable::uninitialized(0, 2);
        let exponent = ExponentBookkeeper::new();
        let counter = AtomicU64::new(0);

        fold_single(&dest, &exponent, &counter, 0, 3.0, 1.0, 1.0);
        fold_single(&dest, &exponent, &counter, 0, 0.0, 1.0, 1.0);
        assert_eq!(dest.get(0), 0.0);
        assert_eq!(counter.load(Ordering::Acquire), 0);
    }
}
