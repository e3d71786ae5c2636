//! Solution Table (§4.1): the two interchangeable per-bag layouts.
//!
//! Both layouts store counts as `f64` bit patterns inside `AtomicU64` words
//! so that a join kernel's read-modify-write can be expressed as a genuine
//! compare-and-swap, exactly as the reference dispatch framework updates
//! its shared memory words.

use crate::error::Error;
use gpusat_types::AssignmentId;
use portable_atomic::{AtomicU64, Ordering};

/// Sentinel for "no assignment has touched this array slot yet", distinct
/// from a computed count of zero (§4.4: join must tell "uninitialised"
/// apart from "both children agree the count is zero").
pub const UNINITIALIZED: f64 = f64::MIN;

/// Dense table: one `f64` per assignment in `[start_id, start_id + len)`.
pub struct ArrayTable {
    words: Vec<AtomicU64>,
    pub start_id: u64,
}

impl ArrayTable {
    pub fn zeroed(start_id: u64, len: usize) -> Self {
        Self { words: (0..len).map(|_| AtomicU64::new(0)).collect(), start_id }
    }

    pub fn uninitialized(start_id: u64, len: usize) -> Self {
        let bits = UNINITIALIZED.to_bits();
        Self { words: (0..len).map(|_| AtomicU64::new(bits)).collect(), start_id }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn end_id(&self) -> u64 {
        self.start_id + self.words.len() as u64
    }

    pub fn in_range(&self, id: AssignmentId) -> bool {
        id >= self.start_id && id < self.end_id()
    }

    fn local(&self, id: AssignmentId) -> usize {
        (id - self.start_id) as usize
    }

    pub fn get(&self, id: AssignmentId) -> f64 {
        f64::from_bits(self.words[self.local(id)].load(Ordering::Acquire))
    }

    /// Plain store: used by the introduce-forget kernel, where every
    /// assignment is written by exactly one lane (no CAS required, §4.1).
    pub fn set(&self, id: AssignmentId, value: f64) {
        let idx = self.local(id);
        self.words[idx].store(value.to_bits(), Ordering::Release);
    }

    /// Read-modify-write via CAS, for the join kernel's shared slots.
    pub fn cas_update<F: Fn(f64) -> f64>(&self, id: AssignmentId, f: F) {
        let idx = self.local(id);
        let word = &self.words[idx];
        let mut current = word.load(Ordering::Acquire);
        loop {
            let next = f(f64::from_bits(current)).to_bits();
            match word.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Snapshot as plain `f64`s, e.g. for density estimation or handing the
    /// root's single entry back to the driver.
    pub fn snapshot(&self) -> Vec<f64> {
        self.words.iter().map(|w| f64::from_bits(w.load(Ordering::Acquire))).collect()
    }
}

/// Bit-trie over an assignment's binary expansion. Each node is a 64-bit
/// word: either two packed 32-bit child indices (lower half = child for
/// bit 0, upper half = child for bit 1), or, at `depth == width`, an `f64`
/// bit pattern. Node 0 is always the root. Child index 0 means "absent".
pub struct TreeTable {
    nodes: Vec<AtomicU64>,
    size: AtomicU64,
    capacity: usize,
}

impl TreeTable {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let nodes = (0..capacity).map(|_| AtomicU64::new(0)).collect();
        Self { nodes, size: AtomicU64::new(1), capacity }
    }

    pub fn tree_size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    fn child(word: u64, bit: u64) -> u32 {
        if bit == 0 {
            (word & 0xffff_ffff) as u32
        } else {
            (word >> 32) as u32
        }
    }

    fn with_child(word: u64, bit: u64, child: u32) -> u64 {
        if bit == 0 {
            (word & 0xffff_ffff_0000_0000) | child as u64
        } else {
            (word & 0x0000_0000_ffff_ffff) | ((child as u64) << 32)
        }
    }

    pub fn get_count(&self, id: AssignmentId, width: u32) -> f64 {
        if width == 0 {
            return f64::from_bits(self.nodes[0].load(Ordering::Acquire));
        }
        let mut node = 0usize;
        for i in 0..width {
            let bit = (id >> (width - i - 1)) & 1;
            let word = self.nodes[node].load(Ordering::Acquire);
            let child = Self::child(word, bit);
            if child == 0 {
                return 0.0;
            }
            node = child as usize;
        }
        f64::from_bits(self.nodes[node].load(Ordering::Acquire))
    }

    /// Allocates a fresh node via bump-style atomic increment, failing with
    /// `CapacityExhausted` if the preallocated arena is full (§4.1).
    fn allocate(&self, bag_id: u32) -> Result<u32, Error> {
        let idx = self.size.fetch_add(1, Ordering::AcqRel);
        if idx as usize >= self.capacity {
            return Err(Error::CapacityExhausted {
                bag_id,
                needed: idx + 1,
                allocated: self.capacity as u64,
            });
        }
        Ok(idx as u32)
    }

    pub fn set_count(
        &self,
        id: AssignmentId,
        width: u32,
        value: f64,
        bag_id: u32,
    ) -> Result<(), Error> {
        if width == 0 {
            self.nodes[0].store(value.to_bits(), Ordering::Release);
            return Ok(());
        }
        let mut node = 0usize;
        for i in 0..width {
            let bit = (id >> (width - i - 1)) & 1;
            loop {
                let word = self.nodes[node].load(Ordering::Acquire);
                let existing = Self::child(word, bit);
                if existing != 0 {
                    node = existing as usize;
                    break;
                }
                let new_child = self.allocate(bag_id)?;
                let updated = Self::with_child(word, bit, new_child);
                match self.nodes[node].compare_exchange(
                    word,
                    updated,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        node = new_child as usize;
                        break;
                    }
                    Err(_) => continue,
                }
            }
        }
        self.nodes[node].store(value.to_bits(), Ordering::Release);
        Ok(())
    }
}
