//! Traversal Driver (§4.6, §5): single-threaded synchronous post-order walk
//! over the tree decomposition.
//!
//! Leaf/introduce/forget/introduce-forget bags are handled uniformly by the
//! Introduce-Forget Kernel — the kernel itself derives the forgotten/new
//! variable sets from the bag/child variable-list difference, so the
//! driver does not need to branch on which of those four kinds it is
//! looking at. Join bags are the only other shape.
//!
//! Exponent bookkeeping (§4.2) is threaded through the recursion as a
//! `baked_exponent`: the total power of two already divided out of a bag's
//! own stored values. A non-join bag's baked exponent is its child's baked
//! exponent plus the child's own bookkeeper reading (the correction this
//! bag's launch divided by); a join bag's is the sum of both children's
//! baked exponents plus the correction applied to the join itself.

use crate::error::Error;
use crate::exponent::ExponentBookkeeper;
use crate::kernels::{introduce_forget, join, tree_combine};
use crate::table::{ArrayTable, TreeTable};
use gpusat_types::{Bag, BagKind, SatFormula, SolveConfig, SolveReport, TableLayout, TreeDecomposition};
use portable_atomic::AtomicU64;
use std::ops::Range;
use tracing::{debug, info, info_span};

#[derive(Debug, Default)]
struct Counters {
    num_join: u64,
    num_introduce_forget: u64,
    max_table_size: u64,
}

impl Counters {
    fn note_table_size(&mut self, size: u64) {
        self.max_table_size = self.max_table_size.max(size);
    }
}

enum BagTable {
    Array(Vec<ArrayTable>),
    Tree(TreeTable, u32),
}

struct BagOutcome {
    table: BagTable,
    /// This bag's own bookkeeper reading: the magnitude of its stored
    /// values, used by its parent as the next correction factor.
    local_exponent: i64,
    /// The total power of two already divided out of this bag's stored
    /// values, relative to the true subtree count.
    baked_exponent: i64,
}

fn clamp_nonnegative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

fn total_count(table: &BagTable) -> f64 {
    match table {
        BagTable::Array(frags) => frags.iter().flat_map(|f| f.snapshot()).map(clamp_nonnegative).sum(),
        BagTable::Tree(tree, width) => (0..(1u64 << *width)).map(|id| tree.get_count(id, *width)).sum(),
    }
}

fn density_of(table: &BagTable) -> f64 {
    match table {
        BagTable::Array(frags) => {
            let total: u64 = frags.iter().map(|f| f.len() as u64).sum();
            if total == 0 {
                return 0.0;
            }
            let nonzero: u64 = frags
                .iter()
                .map(|f| f.snapshot().iter().filter(|v| **v > 0.0).count() as u64)
                .sum();
            nonzero as f64 / total as f64
        }
        BagTable::Tree(tree, width) => {
            let total = 1u64 << *width;
            if total == 0 {
                0.0
            } else {
                tree.tree_size() as f64 / total as f64
            }
        }
    }
}

fn select_layout(preference: TableLayout, width: u32, density: Option<f64>) -> TableLayout {
    match preference {
        TableLayout::Array => TableLayout::Array,
        TableLayout::Tree => TableLayout::Tree,
        TableLayout::Auto => match density {
            Some(d) if width >= 12 && d < 0.25 => TableLayout::Tree,
            _ => TableLayout::Array,
        },
    }
}

/// Splits `[0, 2^width)` into chunks whose array-layout byte footprint
/// stays within `max_memory_buffer` (§4.6).
fn chunk_ranges(width: u32, max_memory_buffer: usize) -> Vec<Range<u64>> {
    let total: u64 = 1u64 << width;
    let per_chunk = ((max_memory_buffer / std::mem::size_of::<f64>()).max(1) as u64).min(total.max(1));
    let mut out = Vec::new();
    let mut start = 0u64;
    if total == 0 {
        return vec![0..0];
    }
    while start < total {
        let end = (start + per_chunk).min(total);
        out.push(start..end);
        start = end;
    }
    out
}

fn tree_capacity_estimate(width: u32, chunk_len: usize) -> usize {
    chunk_len.saturating_mul(width as usize + 2).max(16)
}

fn to_if_child_ref(table: &BagTable) -> introduce_forget::ChildRef<'_> {
    match table {
        BagTable::Array(frags) => introduce_forget::ChildRef::Array(frags),
        BagTable::Tree(tree, width) => introduce_forget::ChildRef::Tree { table: tree, width: *width },
    }
}

fn to_join_child_ref(table: &BagTable) -> join::ChildRef<'_> {
    match table {
        BagTable::Array(frags) => join::ChildRef::Array(frags),
        BagTable::Tree(tree, width) => join::ChildRef::Tree { table: tree, width: *width },
    }
}

/// Runs the full dynamic program over `decomposition` for `formula` and
/// returns the outputs named in §6.
pub fn solve(
    formula: &SatFormula,
    decomposition: &TreeDecomposition,
    config: &SolveConfig,
) -> Result<SolveReport, Error> {
    let _span = info_span!("solve", num_vars = formula.num_vars, num_bags = decomposition.bags.len()).entered();

    formula.validate().map_err(|e| Error::InvalidInput(format!("{e:?}")))?;
    decomposition.validate().map_err(|e| Error::InvalidInput(format!("{e:?}")))?;

    let mut counters = Counters::default();
    let outcome = solve_bag(formula, decomposition, config, decomposition.root, &mut counters)?;

    let total = total_count(&outcome.table);
    let is_sat = total > 0.0;
    info!(is_sat, num_join = counters.num_join, num_introduce_forget = counters.num_introduce_forget, "solve complete");

    Ok(SolveReport {
        is_sat,
        value: if is_sat { total } else { 0.0 },
        exponent: outcome.baked_exponent,
        num_join: counters.num_join,
        num_introduce_forget: counters.num_introduce_forget,
        max_table_size: counters.max_table_size,
    })
}

fn solve_bag(
    formula: &SatFormula,
    decomposition: &TreeDecomposition,
    config: &SolveConfig,
    bag_id: u32,
    counters: &mut Counters,
) -> Result<BagOutcome, Error> {
    let bag = decomposition.bag(bag_id);
    let width = bag.width();
    if width > config.max_bag {
        return Err(Error::CapacityExhausted { bag_id, needed: width as u64, allocated: config.max_bag as u64 });
    }

    match bag.kind {
        BagKind::Join => solve_join_bag(formula, decomposition, config, bag, counters),
        _ => solve_if_bag(formula, decomposition, config, bag, counters),
    }
}

fn solve_if_bag(
    formula: &SatFormula,
    decomposition: &TreeDecomposition,
    config: &SolveConfig,
    bag: &Bag,
    counters: &mut Counters,
) -> Result<BagOutcome, Error> {
    let _span = info_span!("introduce_forget_bag", bag_id = bag.id, width = bag.width()).entered();

    let child_outcome = match bag.children.first() {
        Some(&cid) => Some(solve_bag(formula, decomposition, config, cid, counters)?),
        None => None,
    };
    let child_bag = bag.children.first().map(|&cid| decomposition.bag(cid));

    let correction = child_outcome.as_ref().map(|o| 2f64.powi(o.local_exponent as i32)).unwrap_or(1.0);
    let density_hint = child_outcome.as_ref().map(|o| density_of(&o.table));
    let layout = select_layout(config.layout, bag.width(), density_hint);
    debug!(?layout, correction, "bag variant selected");

    let width = bag.width();
    let ranges = chunk_ranges(width, config.max_memory_buffer);
    let exponent = ExponentBookkeeper::new();

    let table = match layout {
        TableLayout::Array => {
            let mut frags = Vec::with_capacity(ranges.len());
            for range in &ranges {
                let frag = ArrayTable::zeroed(range.start, (range.end - range.start) as usize);
                let child_ref = child_outcome
                    .as_ref()
                    .map(|o| to_if_child_ref(&o.table))
                    .unwrap_or(introduce_forget::ChildRef::None);
                introduce_forget::run(&frag, range.clone(), bag, child_bag, &child_ref, formula, correction, &exponent)?;
                counters.note_table_size(frag.len() as u64);
                frags.push(frag);
            }
            BagTable::Array(frags)
        }
        TableLayout::Tree => {
            let mut fragments: Vec<TreeTable> = Vec::with_capacity(ranges.len());
            for range in &ranges {
                let chunk_len = (range.end - range.start) as usize;
                let mut capacity = tree_capacity_estimate(width, chunk_len);
                let fragment = loop {
                    let candidate = TreeTable::with_capacity(capacity);
                    let child_ref = child_outcome
                        .as_ref()
                        .map(|o| to_if_child_ref(&o.table))
                        .unwrap_or(introduce_forget::ChildRef::None);
                    let dest = introduce_forget::TreeDestination { table: &candidate, width };
                    match introduce_forget::run(&dest, range.clone(), bag, child_bag, &child_ref, formula, correction, &exponent) {
                        Ok(()) => break candidate,
                        Err(Error::CapacityExhausted { .. }) if capacity < (1 << 20) => {
                            capacity *= 2;
                            continue;
                        }
                        Err(e) => return Err(e),
                    }
                };
                counters.note_table_size(fragment.tree_size());
                fragments.push(fragment);
            }

            // Combining all fragments into one trie needs room for the union
            // of their nodes; unlike a single fragment's build, a capacity
            // shortfall here can't be retried in place (the destination is
            // left partially written), so grow-and-rebuild from scratch
            // against all fragments, mirroring the per-fragment retry above.
            let total_len: usize = ranges.iter().map(|r| (r.end - r.start) as usize).sum();
            let mut capacity = fragments
                .iter()
                .map(|f| f.tree_size() as usize)
                .sum::<usize>()
                .max(tree_capacity_estimate(width, total_len));
            let combined = loop {
                let acc = TreeTable::with_capacity(capacity);
                let result: Result<(), Error> = fragments
                    .iter()
                    .zip(&ranges)
                    .try_for_each(|(fragment, range)| tree_combine::run(&acc, fragment, range.clone(), width, bag.id));
                match result {
                    Ok(()) => break acc,
                    Err(Error::CapacityExhausted { .. }) if capacity < (1 << 20) => {
                        capacity *= 2;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            };
            counters.note_table_size(combined.tree_size());
            BagTable::Tree(combined, width)
        }
        TableLayout::Auto => unreachable!("select_layout never returns Auto"),
    };
    counters.num_introduce_forget += 1;

    let local_exponent = exponent.exponent();
    let baked_exponent = child_outcome.map(|o| o.baked_exponent + o.local_exponent).unwrap_or(0);

    Ok(BagOutcome { table, local_exponent, baked_exponent })
}

fn solve_join_bag(
    formula: &SatFormula,
    decomposition: &TreeDecomposition,
    config: &SolveConfig,
    bag: &Bag,
    counters: &mut Counters,
) -> Result<BagOutcome, Error> {
    let _span = info_span!("join_bag", bag_id = bag.id, width = bag.width()).entered();

    if bag.children.len() != 2 {
        return Err(Error::InvalidInput(format!("join bag {} must have exactly two children", bag.id)));
    }
    let left_id = bag.children[0];
    let right_id = bag.children[1];
    let left_outcome = solve_bag(formula, decomposition, config, left_id, counters)?;
    let right_outcome = solve_bag(formula, decomposition, config, right_id, counters)?;
    let left_bag = decomposition.bag(left_id);
    let right_bag = decomposition.bag(right_id);

    let correction_exponent = left_outcome.local_exponent.max(right_outcome.local_exponent);
    let correction = 2f64.powi(correction_exponent as i32);

    let width = bag.width();
    let ranges = chunk_ranges(width, config.max_memory_buffer);
    let exponent = ExponentBookkeeper::new();
    let satisfying_count = AtomicU64::new(0);

    let mut frags = Vec::with_capacity(ranges.len());
    for range in &ranges {
        let frag = ArrayTable::uninitialized(range.start, (range.end - range.start) as usize);
        let left_ref = to_join_child_ref(&left_outcome.table);
        let right_ref = to_join_child_ref(&right_outcome.table);
        join::run(
            &frag,
            range.clone(),
            bag,
            left_bag,
            &left_ref,
            right_bag,
            &right_ref,
            formula,
            correction,
            &exponent,
            &satisfying_count,
        )?;
        counters.note_table_size(frag.len() as u64);
        frags.push(frag);
    }
    counters.num_join += 1;
    debug!(satisfying = satisfying_count.load(portable_atomic::Ordering::Acquire), "join bag done");

    let local_exponent = exponent.exponent();
    let baked_exponent = left_outcome.baked_exponent + right_outcome.baked_exponent + correction_exponent;

    Ok(BagOutcome { table: BagTable::Array(frags), local_exponent, baked_exponent })
}
