//! The memory trait and its two implementations.
//!
//! The block allocator is the production store: every allocation gets a
//! fresh block, bounds are tracked per block, and deallocation kills a
//! byte range for good. The flat arena is the test mock: one growable
//! cell array carved out by a bump pointer. Both sit behind [`Memory`]
//! so the executor and the trace subsystem never depend on which one
//! they run against.

use std::collections::BTreeMap;

use crate::mem::chunk::{decode_val, encode_val, Chunk, MemVal};
use crate::value::{Block, Value};

/// Byte-addressed memory with chunked access, allocation, and range
/// deallocation.
///
/// `load`/`store` are provided in terms of the byte-level primitives so
/// that wrappers (notably the event recorder) see every access exactly
/// once.
pub trait Memory: Clone {
    /// Allocate a fresh block with bounds `[lo, hi)`. Never fails.
    fn alloc(&mut self, lo: i64, hi: i64) -> Block;

    /// Deallocate `[lo, hi)` of `b`. False if any byte of the range is
    /// not currently live. An empty range always succeeds.
    fn free(&mut self, b: Block, lo: i64, hi: i64) -> bool;

    /// Read `len` cells at `b[ofs..]`. `None` on any dead or
    /// out-of-bounds byte. A non-positive length reads nothing.
    fn loadbytes(&self, b: Block, ofs: i64, len: i64) -> Option<Vec<MemVal>>;

    /// Overwrite cells at `b[ofs..]`. False on any dead or
    /// out-of-bounds byte.
    fn storebytes(&mut self, b: Block, ofs: i64, cells: &[MemVal]) -> bool;

    /// Whether the byte at `(b, ofs)` is live. This is the liveness
    /// predicate unsigned pointer comparison consults.
    fn valid_ptr(&self, b: Block, ofs: u32) -> bool;

    /// Valid, or one past a valid byte (so one-past-the-end pointers
    /// still compare within their block).
    fn weak_valid_ptr(&self, b: Block, ofs: u32) -> bool {
        self.valid_ptr(b, ofs) || self.valid_ptr(b, ofs.wrapping_sub(1))
    }

    /// Deallocate several ranges; all must succeed.
    fn free_list(&mut self, ranges: &[(Block, i64, i64)]) -> bool {
        ranges.iter().all(|&(b, lo, hi)| self.free(b, lo, hi))
    }

    /// Load one value at a pointer address under a chunk.
    fn load(&self, chunk: Chunk, addr: &Value) -> Option<Value> {
        let (b, ofs) = addr.as_ptr()?;
        let cells = self.loadbytes(b, ofs as i64, chunk.size() as i64)?;
        Some(decode_val(chunk, &cells))
    }

    /// Store one value at a pointer address under a chunk.
    fn store(&mut self, chunk: Chunk, addr: &Value, v: &Value) -> bool {
        match addr.as_ptr() {
            Some((b, ofs)) => self.storebytes(b, ofs as i64, &encode_val(chunk, v)),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct BlockData {
    lo: i64,
    hi: i64,
    cells: Vec<MemVal>,
    live: Vec<bool>,
}

impl BlockData {
    /// Index of `[ofs, ofs+len)` into the cell array, provided the whole
    /// range is in bounds and live.
    fn live_range(&self, ofs: i64, len: i64) -> Option<usize> {
        if ofs < self.lo || len < 0 || ofs.checked_add(len)? > self.hi {
            return None;
        }
        let start = (ofs - self.lo) as usize;
        let end = start + len as usize;
        if self.live[start..end].iter().all(|&l| l) {
            Some(start)
        } else {
            None
        }
    }
}

/// Production memory: a map from block identifiers to bounded, growable
/// sets of cells. Allocation hands out strictly increasing identifiers,
/// so a block is never reused.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockMemory {
    next: u32,
    blocks: BTreeMap<u32, BlockData>,
}

impl BlockMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks ever allocated.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

impl Memory for BlockMemory {
    fn alloc(&mut self, lo: i64, hi: i64) -> Block {
        let size = (hi - lo).max(0) as usize;
        let id = self.next;
        self.next += 1;
        self.blocks.insert(
            id,
            BlockData {
                lo,
                hi: lo + size as i64,
                cells: vec![MemVal::Undef; size],
                live: vec![true; size],
            },
        );
        Block(id)
    }

    fn free(&mut self, b: Block, lo: i64, hi: i64) -> bool {
        if lo >= hi {
            return true;
        }
        let Some(data) = self.blocks.get_mut(&b.0) else {
            return false;
        };
        if data.lo > lo || hi > data.hi {
            return false;
        }
        let start = (lo - data.lo) as usize;
        let end = (hi - data.lo) as usize;
        if !data.live[start..end].iter().all(|&l| l) {
            return false;
        }
        data.live[start..end].fill(false);
        true
    }

    fn loadbytes(&self, b: Block, ofs: i64, len: i64) -> Option<Vec<MemVal>> {
        if len <= 0 {
            return Some(Vec::new());
        }
        let data = self.blocks.get(&b.0)?;
        let start = data.live_range(ofs, len)?;
        Some(data.cells[start..start + len as usize].to_vec())
    }

    fn storebytes(&mut self, b: Block, ofs: i64, cells: &[MemVal]) -> bool {
        let Some(data) = self.blocks.get_mut(&b.0) else {
            return false;
        };
        match data.live_range(ofs, cells.len() as i64) {
            Some(start) => {
                data.cells[start..start + cells.len()].clone_from_slice(cells);
                true
            }
            None => false,
        }
    }

    fn valid_ptr(&self, b: Block, ofs: u32) -> bool {
        let ofs = ofs as i64;
        match self.blocks.get(&b.0) {
            Some(data) => {
                ofs >= data.lo && ofs < data.hi && data.live[(ofs - data.lo) as usize]
            }
            None => false,
        }
    }
}

/// Test mock: one flat, growable arena carved into blocks by a bump
/// pointer. Same observable contract as [`BlockMemory`], wildly
/// different representation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatMemory {
    cells: Vec<MemVal>,
    live: Vec<bool>,
    /// Per block: (arena base for offset 0, lo, hi).
    blocks: Vec<(i64, i64, i64)>,
}

impl FlatMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, b: Block, ofs: i64) -> Option<usize> {
        let &(base, lo, hi) = self.blocks.get(b.0 as usize)?;
        if ofs < lo || ofs >= hi {
            return None;
        }
        Some((base + ofs) as usize)
    }
}

impl Memory for FlatMemory {
    fn alloc(&mut self, lo: i64, hi: i64) -> Block {
        let size = (hi - lo).max(0) as usize;
        let base = self.cells.len() as i64 - lo;
        self.cells.extend(std::iter::repeat(MemVal::Undef).take(size));
        self.live.extend(std::iter::repeat(true).take(size));
        self.blocks.push((base, lo, lo + size as i64));
        Block(self.blocks.len() as u32 - 1)
    }

    fn free(&mut self, b: Block, lo: i64, hi: i64) -> bool {
        if lo >= hi {
            return true;
        }
        let (Some(start), Some(last)) = (self.slot(b, lo), self.slot(b, hi - 1)) else {
            return false;
        };
        if !self.live[start..=last].iter().all(|&l| l) {
            return false;
        }
        self.live[start..=last].fill(false);
        true
    }

    fn loadbytes(&self, b: Block, ofs: i64, len: i64) -> Option<Vec<MemVal>> {
        if len <= 0 {
            return Some(Vec::new());
        }
        let start = self.slot(b, ofs)?;
        let last = self.slot(b, ofs + len - 1)?;
        if self.live[start..=last].iter().all(|&l| l) {
            Some(self.cells[start..=last].to_vec())
        } else {
            None
        }
    }

    fn storebytes(&mut self, b: Block, ofs: i64, cells: &[MemVal]) -> bool {
        if cells.is_empty() {
            return true;
        }
        let (Some(start), Some(last)) = (self.slot(b, ofs), self.slot(b, ofs + cells.len() as i64 - 1))
        else {
            return false;
        };
        if !self.live[start..=last].iter().all(|&l| l) {
            return false;
        }
        self.cells[start..=last].clone_from_slice(cells);
        true
    }

    fn valid_ptr(&self, b: Block, ofs: u32) -> bool {
        match self.slot(b, ofs as i64) {
            Some(i) => self.live[i],
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The same behavioral suite runs against both implementations.
    enum TestMem {
        Blocks(BlockMemory),
        Flat(FlatMemory),
    }

    impl TestMem {
        fn all() -> Vec<TestMem> {
            vec![
                TestMem::Blocks(BlockMemory::new()),
                TestMem::Flat(FlatMemory::new()),
            ]
        }
    }

    macro_rules! with_each {
        ($m:ident, $body:block) => {
            for mem in TestMem::all() {
                match mem {
                    TestMem::Blocks(mut $m) => $body,
                    TestMem::Flat(mut $m) => $body,
                }
            }
        };
    }

    #[test]
    fn test_store_load_roundtrip() {
        with_each!(m, {
            let b = m.alloc(0, 16);
            let addr = Value::Ptr(b, 4);
            assert!(m.store(Chunk::I32, &addr, &Value::Int(77)));
            assert_eq!(m.load(Chunk::I32, &addr), Some(Value::Int(77)));
        });
    }

    #[test]
    fn test_fresh_cells_read_undef() {
        with_each!(m, {
            let b = m.alloc(0, 8);
            assert_eq!(m.load(Chunk::I32, &Value::Ptr(b, 0)), Some(Value::Undef));
        });
    }

    #[test]
    fn test_out_of_bounds() {
        with_each!(m, {
            let b = m.alloc(0, 8);
            assert_eq!(m.load(Chunk::I32, &Value::Ptr(b, 6)), None);
            assert!(!m.store(Chunk::I32, &Value::Ptr(b, 6), &Value::Int(0)));
            assert!(!m.store(Chunk::I32, &Value::Int(3), &Value::Int(0)));
        });
    }

    #[test]
    fn test_free_kills_range() {
        with_each!(m, {
            let b = m.alloc(0, 16);
            assert!(m.free(b, 0, 8));
            assert_eq!(m.load(Chunk::I32, &Value::Ptr(b, 0)), None);
            assert_eq!(m.load(Chunk::I32, &Value::Ptr(b, 8)), Some(Value::Undef));
            assert!(m.valid_ptr(b, 8));
            assert!(!m.valid_ptr(b, 7));
            // Double free of the same range fails.
            assert!(!m.free(b, 0, 8));
            // Empty range is trivially freeable.
            assert!(m.free(b, 4, 4));
        });
    }

    #[test]
    fn test_blocks_are_disjoint() {
        with_each!(m, {
            let b1 = m.alloc(0, 4);
            let b2 = m.alloc(0, 4);
            assert_ne!(b1, b2);
            assert!(m.store(Chunk::I32, &Value::Ptr(b1, 0), &Value::Int(1)));
            assert!(m.store(Chunk::I32, &Value::Ptr(b2, 0), &Value::Int(2)));
            assert_eq!(m.load(Chunk::I32, &Value::Ptr(b1, 0)), Some(Value::Int(1)));
        });
    }

    #[test]
    fn test_weak_validity_one_past_end() {
        with_each!(m, {
            let b = m.alloc(0, 8);
            assert!(!m.valid_ptr(b, 8));
            assert!(m.weak_valid_ptr(b, 8));
            assert!(!m.weak_valid_ptr(b, 9));
        });
    }

    #[test]
    fn test_nonzero_lower_bound() {
        let mut m = BlockMemory::new();
        let b = m.alloc(-4, 4);
        assert!(m.store(Chunk::I32, &Value::Ptr(b, 0), &Value::Int(5)));
        assert_eq!(m.loadbytes(b, -4, 4), Some(vec![MemVal::Undef; 4]));
    }

    #[test]
    fn test_spill_reload_preserves_pointer() {
        with_each!(m, {
            let b = m.alloc(0, 8);
            let target = m.alloc(0, 4);
            let p = Value::Ptr(target, 2);
            assert!(m.store(Chunk::Any32, &Value::Ptr(b, 0), &p));
            assert_eq!(m.load(Chunk::Any32, &Value::Ptr(b, 0)), Some(p));
        });
    }
}
