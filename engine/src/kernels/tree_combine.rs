//! Tree-Combine Kernel (§4.5): merges a second trie fragment's populated
//! assignments into a first, used when a tree-layout bag is built across
//! multiple chunks. Associative and commutative over disjoint id ranges,
//! idempotent when the source holds only zeros.

use crate::error::Error;
use crate::table::TreeTable;
use gpusat_types::AssignmentId;
use std::ops::Range;

pub fn run(
    dest: &TreeTable,
    source: &TreeTable,
    ids: Range<AssignmentId>,
    width: u32,
    bag_id: u32,
) -> Result<(), Error> {
    for id in ids {
        let value = source.get_count(id, width);
        if value > 0.0 {
            dest.set_count(id, width, value, bag_id)?;
        }
    }
    Ok(())
}
