//! Event-recording memory wrapper.
//!
//! `Recorder` interposes on every primitive of an inner memory and
//! appends one [`MemEvent`] per successful operation. Failed operations
//! record nothing: a step that gets stuck leaves no trace.

use std::cell::RefCell;

use crate::mem::chunk::MemVal;
use crate::mem::event::MemEvent;
use crate::mem::memory::Memory;
use crate::value::Block;

/// Wraps a memory and records each operation as an event.
///
/// Reads go through `&self`, so the log lives in a `RefCell`; the
/// recorder is still `Clone`, and a cloned recorder carries a snapshot
/// of the log (discarding a clone discards the events of an abandoned
/// partial step along with its memory effects).
#[derive(Debug, Clone, PartialEq)]
pub struct Recorder<M> {
    inner: M,
    log: RefCell<Vec<MemEvent>>,
}

impl<M: Memory> Recorder<M> {
    pub fn new(inner: M) -> Self {
        Self { inner, log: RefCell::new(Vec::new()) }
    }

    /// Drain the events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<MemEvent> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    /// Events recorded so far, without draining.
    pub fn events(&self) -> Vec<MemEvent> {
        self.log.borrow().clone()
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn into_inner(self) -> M {
        self.inner
    }
}

impl<M: Memory> Memory for Recorder<M> {
    fn alloc(&mut self, lo: i64, hi: i64) -> Block {
        let block = self.inner.alloc(lo, hi);
        self.log.borrow_mut().push(MemEvent::Alloc { block, lo, hi });
        block
    }

    fn free(&mut self, b: Block, lo: i64, hi: i64) -> bool {
        if !self.inner.free(b, lo, hi) {
            return false;
        }
        self.log.borrow_mut().push(MemEvent::Free { ranges: vec![(b, lo, hi)] });
        true
    }

    fn free_list(&mut self, ranges: &[(Block, i64, i64)]) -> bool {
        if !self.inner.free_list(ranges) {
            return false;
        }
        self.log.borrow_mut().push(MemEvent::Free { ranges: ranges.to_vec() });
        true
    }

    fn loadbytes(&self, b: Block, ofs: i64, len: i64) -> Option<Vec<MemVal>> {
        let cells = self.inner.loadbytes(b, ofs, len)?;
        self.log.borrow_mut().push(MemEvent::Read {
            block: b,
            ofs,
            len,
            cells: cells.clone(),
        });
        Some(cells)
    }

    fn storebytes(&mut self, b: Block, ofs: i64, cells: &[MemVal]) -> bool {
        if !self.inner.storebytes(b, ofs, cells) {
            return false;
        }
        self.log.borrow_mut().push(MemEvent::Write { block: b, ofs, cells: cells.to_vec() });
        true
    }

    fn valid_ptr(&self, b: Block, ofs: u32) -> bool {
        // Consulting liveness is not a memory effect.
        self.inner.valid_ptr(b, ofs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::chunk::Chunk;
    use crate::mem::event::eliminate;
    use crate::mem::memory::BlockMemory;
    use crate::value::Value;

    #[test]
    fn test_records_each_operation() {
        let mut m = Recorder::new(BlockMemory::new());
        let b = m.alloc(0, 8);
        assert!(m.store(Chunk::I32, &Value::Ptr(b, 0), &Value::Int(3)));
        assert_eq!(m.load(Chunk::I32, &Value::Ptr(b, 0)), Some(Value::Int(3)));
        assert!(m.free(b, 0, 8));

        let events = m.take_events();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], MemEvent::Alloc { lo: 0, hi: 8, .. }));
        assert!(matches!(events[1], MemEvent::Write { ofs: 0, .. }));
        assert!(matches!(events[2], MemEvent::Read { len: 4, .. }));
        assert!(matches!(events[3], MemEvent::Free { .. }));
        assert!(m.take_events().is_empty());
    }

    #[test]
    fn test_failed_operations_leave_no_trace() {
        let mut m = Recorder::new(BlockMemory::new());
        let b = m.alloc(0, 4);
        m.take_events();

        assert!(!m.store(Chunk::I32, &Value::Ptr(b, 2), &Value::Int(0)));
        assert_eq!(m.load(Chunk::I32, &Value::Ptr(b, 2)), None);
        assert!(!m.free(b, 0, 8));
        assert!(m.take_events().is_empty());
    }

    #[test]
    fn test_recorded_trace_replays_on_pristine_copy() {
        let mut base = BlockMemory::new();
        let scratch = base.alloc(0, 16);
        base.store(Chunk::I32, &Value::Ptr(scratch, 0), &Value::Int(41));

        let mut rec = Recorder::new(base.clone());
        let v = rec.load(Chunk::I32, &Value::Ptr(scratch, 0)).unwrap();
        rec.store(Chunk::I32, &Value::Ptr(scratch, 4), &v);
        let b2 = rec.alloc(0, 4);
        rec.free(b2, 0, 4);

        let events = rec.take_events();
        let replayed = eliminate(&base, &events).expect("trace replays on the original memory");
        assert_eq!(replayed, rec.into_inner());
    }
}
