//! Data model shared between the host driver and the accelerator kernels.
//!
//! Everything here is plain data: no device handles, no kernel dispatch. A
//! collaborator (CNF parser, decomposition builder, test) constructs a
//! [`SatFormula`] and a [`TreeDecomposition`] directly; this crate only
//! enforces the structural invariants the engine relies on.

use serde::{Deserialize, Serialize};

/// A signed literal: positive selects the variable true, negative false.
/// Variable indices are 1-based, matching DIMACS convention.
pub type Literal = i32;

/// Variable id, 1-based.
pub type VarId = u32;

/// A non-negative assignment id, interpreted relative to a bag's variable
/// ordering (bit `a` is the truth value of the bag's `a`-th variable).
pub type AssignmentId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// A literal referenced a variable outside `1..=num_vars`.
    LiteralOutOfRange { literal: Literal, num_vars: u32 },
    /// The weight table's length did not equal `2 * num_vars`.
    WeightTableLength { expected: usize, actual: usize },
    /// A bag's variable list was not sorted ascending or contained duplicates.
    UnsortedBagVariables { bag_id: u32 },
    /// A bag referenced a child index outside the decomposition's arena.
    DanglingChild { bag_id: u32, child: u32 },
    /// The decomposition had no bags, or the declared root was out of range.
    InvalidRoot,
    /// A join bag did not have exactly two children.
    JoinArity { bag_id: u32, children: usize },
}

/// A CNF clause: an ordered list of literals. Storage here is per-clause
/// `Vec<Literal>` for ergonomic construction; [`SatFormula::flatten_clauses`]
/// produces the flat-array-plus-lengths layout the device buffers use.
pub type Clause = Vec<Literal>;

/// A (possibly weighted) Boolean formula in conjunctive normal form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatFormula {
    pub num_vars: u32,
    pub clauses: Vec<Clause>,
    /// `weights[2*v]` is the weight of the positive literal for variable
    /// `v+1`, `weights[2*v+1]` the negative literal's weight. Empty means
    /// every literal weighs 1.0 (the unweighted path).
    pub weights: Vec<f64>,
}

impl SatFormula {
    pub fn unweighted(num_vars: u32, clauses: Vec<Clause>) -> Self {
        Self { num_vars, clauses, weights: Vec::new() }
    }

    pub fn is_weighted(&self) -> bool {
        !self.weights.is_empty()
    }

    /// Weight of a literal under the weighted path; 1.0 when unweighted.
    pub fn literal_weight(&self, literal: Literal) -> f64 {
        if self.weights.is_empty() {
            return 1.0;
        }
        let var = literal.unsigned_abs() - 1;
        let idx = (var * 2) as usize + if literal > 0 { 0 } else { 1 };
        self.weights.get(idx).copied().unwrap_or(1.0)
    }

    /// Flattens clause storage into a literal array and a parallel
    /// per-clause length array, the layout device buffers expect.
    pub fn flatten_clauses(&self) -> (Vec<Literal>, Vec<u32>) {
        let mut literals = Vec::new();
        let mut lengths = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            lengths.push(clause.len() as u32);
            literals.extend_from_slice(clause);
        }
        (literals, lengths)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if !self.weights.is_empty() && self.weights.len() != 2 * self.num_vars as usize {
            return Err(ModelError::WeightTableLength {
                expected: 2 * self.num_vars as usize,
                actual: self.weights.len(),
            });
        }
        for clause in &self.clauses {
            for &literal in clause {
                let var = literal.unsigned_abs();
                if var == 0 || var > self.num_vars {
                    return Err(ModelError::LiteralOutOfRange { literal, num_vars: self.num_vars });
                }
            }
        }
        Ok(())
    }
}

/// The canonical decomposition node kinds. `IntroduceForget` is the compiled
/// form of an `Introduce` immediately followed by a `Forget` at one node,
/// the shape the traversal driver actually dispatches (see §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BagKind {
    Leaf,
    Introduce,
    Forget,
    Join,
    IntroduceForget,
}

/// A node of the tree decomposition. Children are indices into the owning
/// [`TreeDecomposition`]'s `bags` arena, not pointers — the decomposition is
/// an acyclic DAG with no parent pointers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bag {
    pub id: u32,
    pub kind: BagKind,
    /// Sorted ascending, no duplicates. Bit `a` of an assignment id
    /// corresponds to `variables[a]`.
    pub variables: Vec<VarId>,
    pub children: Vec<u32>,
    /// Memory-budget hint: if the caller already knows a bag must be
    /// chunked, this caps the per-fragment assignment count. `None` lets
    /// the driver derive it from `SolveConfig::max_memory_buffer`.
    pub max_table_size: Option<u64>,
}

impl Bag {
    pub fn width(&self) -> u32 {
        self.variables.len() as u32
    }
}

/// A rooted tree decomposition: an arena of bags plus the root's index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeDecomposition {
    pub bags: Vec<Bag>,
    pub root: u32,
}

impl TreeDecomposition {
    pub fn bag(&self, id: u32) -> &Bag {
        &self.bags[id as usize]
    }

    pub fn root_bag(&self) -> &Bag {
        self.bag(self.root)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.bags.is_empty() || self.root as usize >= self.bags.len() {
            return Err(ModelError::InvalidRoot);
        }
        for (idx, bag) in self.bags.iter().enumerate() {
            if bag.id as usize != idx {
                return Err(ModelError::InvalidRoot);
            }
            if !bag.variables.windows(2).all(|w| w[0] < w[1]) {
                return Err(ModelError::UnsortedBagVariables { bag_id: bag.id });
            }
            for &child in &bag.children {
                if child as usize >= self.bags.len() {
                    return Err(ModelError::DanglingChild { bag_id: bag.id, child });
                }
            }
            if bag.kind == BagKind::Join && bag.children.len() != 2 {
                return Err(ModelError::JoinArity { bag_id: bag.id, children: bag.children.len() });
            }
        }
        Ok(())
    }
}

/// The solution-table layout a bag (or the whole solve) prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableLayout {
    Array,
    Tree,
    /// No explicit operator preference: the driver estimates density from
    /// the child tables' nonzero counts and picks per bag (§10.6).
    Auto,
}

/// Configuration handed to the driver once, by value. There is no global
/// mutable configuration (§10.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveConfig {
    pub layout: TableLayout,
    pub weighted: bool,
    pub do_trace: bool,
    /// Bit-width cap: a bag wider than this is a capacity error rather than
    /// something the driver will try to chunk around.
    pub max_bag: u32,
    /// Bytes available per device-memory fragment; bags whose assignment
    /// space exceeds this are chunked (§4.6).
    pub max_memory_buffer: usize,
    /// Optional pin of `wgpu::Backends` bits for reproducible benchmarking;
    /// `None` means "probe all backends" (§10.6).
    pub backends_bits: Option<u32>,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            layout: TableLayout::Auto,
            weighted: false,
            do_trace: false,
            max_bag: 30,
            max_memory_buffer: 1 << 28,
            backends_bits: None,
        }
    }
}

/// Per-run counters and the final (possibly exponent-corrected) count,
/// returned by the driver alongside `isSat` (§6 Outputs).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolveReport {
    pub is_sat: bool,
    /// `value * 2^exponent` is the final model count.
    pub value: f64,
    pub exponent: i64,
    pub num_join: u64,
    pub num_introduce_forget: u64,
    pub max_table_size: u64,
}

impl SolveReport {
    pub fn count(&self) -> f64 {
        if !self.is_sat {
            return 0.0;
        }
        self.value * 2f64.powi(self.exponent as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_clauses_round_trips_lengths() {
        let formula = SatFormula::unweighted(3, vec![vec![1, 2], vec![-2, 3, 1]]);
        let (literals, lengths) = formula.flatten_clauses();
        assert_eq!(lengths, vec![2, 3]);
        assert_eq!(literals, vec![1, 2, -2, 3, 1]);
    }

    #[test]
    fn literal_weight_defaults_to_one_when_unweighted() {
        let formula = SatFormula::unweighted(2, vec![]);
        assert_eq!(formula.literal_weight(1), 1.0);
        assert_eq!(formula.literal_weight(-2), 1.0);
    }

    #[test]
    fn literal_weight_looks_up_weighted_table() {
        let mut formula = SatFormula::unweighted(1, vec![]);
        formula.weights = vec![0.3, 0.7];
        assert_eq!(formula.literal_weight(1), 0.3);
        assert_eq!(formula.literal_weight(-1), 0.7);
    }

    #[test]
    fn validate_rejects_out_of_range_literal() {
        let formula = SatFormula::unweighted(1, vec![vec![2]]);
        assert_eq!(
            formula.validate(),
            Err(ModelError::LiteralOutOfRange { literal: 2, num_vars: 1 })
        );
    }

    #[test]
    fn validate_rejects_bad_weight_table_length() {
        let mut formula = SatFormula::unweighted(2, vec![]);
        formula.weights = vec![1.0, 1.0, 1.0];
        assert_eq!(
            formula.validate(),
            Err(ModelError::WeightTableLength { expected: 4, actual: 3 })
        );
    }

    #[test]
    fn validate_rejects_unsorted_bag_variables() {
        let decomp = TreeDecomposition {
            bags: vec![Bag {
                id: 0,
                kind: BagKind::Leaf,
                variables: vec![2, 1],
                children: vec![],
                max_table_size: None,
            }],
            root: 0,
        };
        assert_eq!(
            decomp.validate(),
            Err(ModelError::UnsortedBagVariables { bag_id: 0 })
        );
    }

    #[test]
    fn validate_rejects_join_with_wrong_arity() {
        let decomp = TreeDecomposition {
            bags: vec![Bag {
                id: 0,
                kind: BagKind::Join,
                variables: vec![1],
                children: vec![],
                max_table_size: None,
            }],
            root: 0,
        };
        assert_eq!(
            decomp.validate(),
            Err(ModelError::JoinArity { bag_id: 0, children: 0 })
        );
    }

    #[test]
    fn solve_report_count_reflects_exponent_and_sat_flag() {
        let report = SolveReport {
            is_sat: true,
            value: 1.25,
            exponent: 3,
            num_join: 0,
            num_introduce_forget: 0,
            max_table_size: 0,
        };
        assert_eq!(report.count(), 10.0);

        let unsat = SolveReport { is_sat: false, ..report };
        assert_eq!(unsat.count(), 0.0);
    }
}
