//! Bag-local arithmetic shared by the kernels: variable-ordering lookups,
//! the clause-check predicate (`checkBag`, §4.3), and id projection between
//! a bag's ordering and a child's ordering.

use gpusat_types::{AssignmentId, Bag, Clause, Literal, SatFormula, VarId};

/// Bit `pos` of `id`, counting from the bag's first variable at bit 0.
pub fn bit(id: AssignmentId, pos: usize) -> bool {
    (id >> pos) & 1 == 1
}

pub fn set_bit(id: AssignmentId, pos: usize, value: bool) -> AssignmentId {
    if value {
        id | (1 << pos)
    } else {
        id & !(1 << pos)
    }
}

fn position_of(variables: &[VarId], var: VarId) -> Option<usize> {
    variables.iter().position(|&v| v == var)
}

/// True iff literal `l` is satisfied given the truth bit at its position.
pub fn literal_satisfied(literal: Literal, truth: bool) -> bool {
    if literal > 0 {
        truth
    } else {
        !truth
    }
}

/// The clauses whose every variable appears in `variables` — the bag-local
/// clause set a bag is responsible for checking (§2, component 3).
pub fn clauses_fully_in_bag<'a>(formula: &'a SatFormula, variables: &[VarId]) -> Vec<&'a Clause> {
    formula
        .clauses
        .iter()
        .filter(|clause| clause.iter().all(|&lit| position_of(variables, lit.unsigned_abs()).is_some()))
        .collect()
}

/// `checkBag`: true iff every clause in `clauses` has at least one literal
/// satisfied under `id`'s bit pattern relative to `variables`' ordering.
pub fn check_bag(id: AssignmentId, variables: &[VarId], clauses: &[&Clause]) -> bool {
    'clause: for clause in clauses {
        for &lit in clause.iter() {
            if let Some(pos) = position_of(variables, lit.unsigned_abs()) {
                if literal_satisfied(lit, bit(id, pos)) {
                    continue 'clause;
                }
            }
        }
        return false;
    }
    true
}

/// Variables present in `a` but absent from `b`, in `a`'s order.
pub fn difference(a: &[VarId], b: &[VarId]) -> Vec<VarId> {
    a.iter().copied().filter(|v| !b.contains(v)).collect()
}

/// Builds the portion of a child-ordering assignment id contributed by
/// variables shared between `bag_vars` (source, `id`'s ordering) and
/// `child_vars` (destination ordering). Positions in the child id that
/// belong to variables absent from `bag_vars` are left as given by `base`
/// (the caller fills those from the extension being enumerated).
pub fn project_shared(
    id: AssignmentId,
    bag_vars: &[VarId],
    child_vars: &[VarId],
    base: AssignmentId,
) -> AssignmentId {
    let mut out = base;
    for (child_pos, &var) in child_vars.iter().enumerate() {
        if let Some(bag_pos) = position_of(bag_vars, var) {
            out = set_bit(out, child_pos, bit(id, bag_pos));
        }
    }
    out
}

/// Given the variables forgotten between a bag and its child (present in
/// the child, absent from the bag), sets the bits of `id`'s positions in
/// the child's ordering to the values of `extension` (one bit per
/// forgotten variable, ordered as `forgotten`).
pub fn apply_extension(
    child_vars: &[VarId],
    forgotten: &[VarId],
    extension: u64,
    base: AssignmentId,
) -> AssignmentId {
    let mut out = base;
    for (i, &var) in forgotten.iter().enumerate() {
        let truth = (extension >> i) & 1 == 1;
        if let Some(child_pos) = position_of(child_vars, var) {
            out = set_bit(out, child_pos, truth);
        }
    }
    out
}

/// The product of `formula`'s literal weights for `variables`, evaluated at
/// the truth values given by `id` (relative to `variables`' ordering).
pub fn weight_product(formula: &SatFormula, variables: &[VarId], id: AssignmentId) -> f64 {
    if !formula.is_weighted() {
        return 1.0;
    }
    variables
        .iter()
        .enumerate()
        .map(|(pos, &var)| {
            let literal = if bit(id, pos) { var as Literal } else { -(var as Literal) };
            formula.literal_weight(literal)
        })
        .product()
}

pub fn weight_product_subset(
    formula: &SatFormula,
    all_variables: &[VarId],
    subset: &[VarId],
    id: AssignmentId,
) -> f64 {
    if !formula.is_weighted() {
        return 1.0;
    }
    subset
        .iter()
        .map(|&var| {
            let pos = position_of(all_variables, var).expect("subset variable must be in bag");
            let literal = if bit(id, pos) { var as Literal } else { -(var as Literal) };
            formula.literal_weight(literal)
        })
        .product()
}

pub fn bag_forgotten(bag: &Bag, child: &Bag) -> Vec<VarId> {
    difference(&child.variables, &bag.variables)
}

pub fn bag_new(bag: &Bag, child: &Bag) -> Vec<VarId> {
    difference(&bag.variables, &child.variables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_bag_accepts_satisfied_clause() {
        let vars = vec![1, 2, 3];
        let clause: Clause = vec![1, -2];
        let clauses = vec![&clause];
        // id = 0b001 -> var1=true (satisfies literal 1)
        assert!(check_bag(0b001, &vars, &clauses));
    }

    #[test]
    fn check_bag_rejects_falsified_clause() {
        let vars = vec![1, 2];
        let clause: Clause = vec![-1, -2];
        let clauses = vec![&clause];
        // id = 0b11 -> var1=true, var2=true, falsifies both literals
        assert!(!check_bag(0b11, &vars, &clauses));
    }

    #[test]
    fn project_shared_copies_only_common_variables() {
        let bag_vars = vec![1, 2, 3];
        let child_vars = vec![2, 4];
        // id: bit0=var1=1, bit1=var2=0, bit2=var3=1
        let id = 0b101;
        let projected = project_shared(id, &bag_vars, &child_vars, 0);
        // child bit0 = var2 = 0, child bit1 = var4 untouched (base=0)
        assert_eq!(projected, 0);
    }

    #[test]
    fn apply_extension_sets_forgotten_variable_bits() {
        let child_vars = vec![5, 6];
        let forgotten = vec![6];
        let out = apply_extension(&child_vars, &forgotten, 1, 0);
        assert_eq!(out, 0b10);
    }

    #[test]
    fn clauses_fully_in_bag_filters_by_variable_membership() {
        let formula = SatFormula::unweighted(3, vec![vec![1, 2], vec![2, 3]]);
        let only_12 = clauses_fully_in_bag(&formula, &[1, 2]);
        assert_eq!(only_12.len(), 1);
        assert_eq!(*only_12[0], vec![1, 2]);
    }
}
