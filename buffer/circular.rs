// Circular log: fixed-capacity FIFO of committed records with logical-offset addressing
use crate::error::InvalidSeek;
use aesd_core::{LogicalPosition, Record, SeekTo};

/// Ring of `capacity` optional owned records.
///
/// `in_offs` is the next slot to fill, `out_offs` the oldest live slot.
/// When `full` is set both point at the same slot and the next commit
/// evicts the oldest record before installing the new one.
#[derive(Debug)]
pub struct CircularLog {
    slots: Box<[Option<Record>]>,
    in_offs: usize,
    out_offs: usize,
    full: bool,
    total_bytes: u64,
}

impl CircularLog {
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "circular log capacity must be non-zero");
        CircularLog {
            slots: (0..capacity).map(|_| None).collect(),
            in_offs: 0,
            out_offs: 0,
            full: false,
            total_bytes: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn live_count(&self) -> usize {
        if self.full {
            self.capacity()
        } else {
            (self.in_offs + self.capacity() - self.out_offs) % self.capacity()
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Install `record` at the write cursor, handing back the evicted
    /// oldest record when the log was already full.
    pub fn commit(&mut self, record: Record) -> Option<Record> {
        let capacity = self.capacity();

        let evicted = if self.full {
            let old = self.slots[self.out_offs].take();
            self.out_offs = (self.out_offs + 1) % capacity;
            old
        } else {
            None
        };
        if let Some(ref old) = evicted {
            self.total_bytes -= old.len() as u64;
        }

        self.total_bytes += record.len() as u64;
        self.slots[self.in_offs] = Some(record);
        self.in_offs = (self.in_offs + 1) % capacity;
        self.full = self.in_offs == self.out_offs;

        debug_assert_eq!(self.total_bytes, self.recompute_total_bytes());
        evicted
    }

    /// Live record at FIFO index `index` (0 = oldest).
    pub fn get(&self, index: usize) -> Option<&Record> {
        if index >= self.live_count() {
            return None;
        }
        self.slots[(self.out_offs + index) % self.capacity()].as_ref()
    }

    /// Live records, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Record> + '_ {
        (0..self.live_count()).filter_map(move |i| self.get(i))
    }

    /// Record containing byte `position` and the offset inside it.
    pub fn resolve(&self, position: LogicalPosition) -> Option<(&Record, usize)> {
        let mut start: u64 = 0;
        for record in self.iter() {
            let end = start + record.len() as u64;
            if position < end {
                return Some((record, (position - start) as usize));
            }
            start = end;
        }
        None
    }

    pub fn seek_by_command(&self, seek: SeekTo) -> Result<LogicalPosition, InvalidSeek> {
        let live = self.live_count();
        let index = seek.write_cmd as usize;
        let record = match self.get(index) {
            Some(record) => record,
            None => return Err(InvalidSeek::CommandOutOfRange { write_cmd: seek.write_cmd, live }),
        };
        if seek.write_cmd_offset as usize >= record.len() {
            return Err(InvalidSeek::OffsetOutOfRange {
                write_cmd: seek.write_cmd,
                offset: seek.write_cmd_offset,
                len: record.len(),
            });
        }

        let preceding: u64 = self.iter().take(index).map(|r| r.len() as u64).sum();
        Ok(preceding + seek.write_cmd_offset as u64)
    }

    pub fn recompute_total_bytes(&self) -> u64 {
        self.iter().map(|r| r.len() as u64).sum()
    }
}
