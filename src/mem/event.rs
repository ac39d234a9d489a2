//! The memory-event trace subsystem.
//!
//! Every memory side effect of a step can be captured as pure data: a
//! write with its cells, a read with the cells it returned, an
//! allocation with its bounds, a batch of deallocated ranges. A recorded
//! trace can then be replayed against *any* memory implementing the four
//! primitives ([`eliminate`]), and the least access permission the trace
//! demanded of each byte can be computed after the fact
//! ([`required_perm`]).

use serde::{Deserialize, Serialize};

use crate::mem::chunk::MemVal;
use crate::mem::memory::Memory;
use crate::value::Block;

/// One abstract memory action. An event fully determines its effect on
/// any memory that can perform it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemEvent {
    /// `len` cells were read at `block[ofs..]` and came back as `cells`.
    Read {
        block: Block,
        ofs: i64,
        len: i64,
        cells: Vec<MemVal>,
    },
    /// `cells` were written at `block[ofs..]`. An empty payload is
    /// ill-formed and never replays.
    Write {
        block: Block,
        ofs: i64,
        cells: Vec<MemVal>,
    },
    /// A fresh block with bounds `[lo, hi)` came into existence.
    Alloc { block: Block, lo: i64, hi: i64 },
    /// The listed `(block, lo, hi)` ranges were deallocated together.
    Free { ranges: Vec<(Block, i64, i64)> },
}

impl std::fmt::Display for MemEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemEvent::Read { block, ofs, len, .. } => {
                write!(f, "read  {}[{}..{}]", block, ofs, ofs + len)
            }
            MemEvent::Write { block, ofs, cells } => {
                write!(f, "write {}[{}..{}]", block, ofs, ofs + cells.len() as i64)
            }
            MemEvent::Alloc { block, lo, hi } => write!(f, "alloc {} [{}, {})", block, lo, hi),
            MemEvent::Free { ranges } => {
                write!(f, "free ")?;
                for (i, (b, lo, hi)) in ranges.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}[{}, {})", b, lo, hi)?;
                }
                Ok(())
            }
        }
    }
}

/// Replay a trace against a memory, threading the memory through each
/// event's direct effect. `None` as soon as any event cannot be
/// performed: a read that returns different cells, a write or free on a
/// dead range, an allocation that does not produce the recorded block.
pub fn eliminate<M: Memory>(mem: &M, events: &[MemEvent]) -> Option<M> {
    let mut m = mem.clone();
    for ev in events {
        match ev {
            MemEvent::Read { block, ofs, len, cells } => {
                if m.loadbytes(*block, *ofs, *len)? != *cells {
                    return None;
                }
            }
            MemEvent::Write { block, ofs, cells } => {
                if cells.is_empty() || !m.storebytes(*block, *ofs, cells) {
                    return None;
                }
            }
            MemEvent::Alloc { block, lo, hi } => {
                if m.alloc(*lo, *hi) != *block {
                    return None;
                }
            }
            MemEvent::Free { ranges } => {
                if !m.free_list(ranges) {
                    return None;
                }
            }
        }
    }
    Some(m)
}

/// An access right, totally ordered: freeing demands more than writing,
/// writing more than reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Perm {
    Readable,
    Writable,
    Freeable,
}

/// The least permission that must hold at `(b, ofs)` for every event of
/// the trace touching that byte to be valid. `None` means the trace
/// demands nothing there.
///
/// An `Alloc` of the same block drops everything accumulated for it so
/// far: requirements on a block that the trace itself brings into
/// existence are not requirements on the pre-trace memory.
pub fn required_perm(b: Block, ofs: i64, events: &[MemEvent]) -> Option<Perm> {
    let mut req: Option<Perm> = None;
    for ev in events {
        match ev {
            MemEvent::Read { block, ofs: o, len, .. } => {
                if *block == b && (*o..o + len).contains(&ofs) {
                    req = req.max(Some(Perm::Readable));
                }
            }
            MemEvent::Write { block, ofs: o, cells } => {
                if *block == b && (*o..o + cells.len() as i64).contains(&ofs) {
                    req = req.max(Some(Perm::Writable));
                }
            }
            MemEvent::Alloc { block, .. } => {
                if *block == b {
                    req = None;
                }
            }
            MemEvent::Free { ranges } => {
                if ranges.iter().any(|(rb, lo, hi)| *rb == b && (*lo..*hi).contains(&ofs)) {
                    req = req.max(Some(Perm::Freeable));
                }
            }
        }
    }
    req
}

/// Whether any event of the trace mentions the byte at `(b, ofs)`.
pub fn touches(b: Block, ofs: i64, events: &[MemEvent]) -> bool {
    events.iter().any(|ev| match ev {
        MemEvent::Read { block, ofs: o, len, .. } => *block == b && (*o..o + len).contains(&ofs),
        MemEvent::Write { block, ofs: o, cells } => {
            *block == b && (*o..o + cells.len() as i64).contains(&ofs)
        }
        MemEvent::Alloc { block, lo, hi } => *block == b && (*lo..*hi).contains(&ofs),
        MemEvent::Free { ranges } => {
            ranges.iter().any(|(rb, lo, hi)| *rb == b && (*lo..*hi).contains(&ofs))
        }
    })
}
