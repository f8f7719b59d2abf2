// Device-style handle: positioned read/write/lseek plus the seek-to control op
use crate::error::StoreError;
use crate::store::SharedStore;
use aesd_core::{LogicalPosition, SeekTo};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

/// An open file over the shared store, like a descriptor on the char device.
///
/// Writes go through the store's own pending assembly, so partial lines
/// from all handles share one context. Writes never move the cursor.
pub struct DeviceHandle {
    store: Arc<SharedStore>,
    pos: LogicalPosition,
}

impl DeviceHandle {
    pub fn open(store: Arc<SharedStore>) -> Self {
        DeviceHandle { store, pos: 0 }
    }

    pub fn position(&self) -> LogicalPosition {
        self.pos
    }

    /// AESDCHAR_IOCSEEKTO: move the cursor to `(write_cmd, write_cmd_offset)`.
    pub fn seek_to(&mut self, seek: SeekTo) -> Result<LogicalPosition, StoreError> {
        let pos = self.store.seek(seek)?;
        self.pos = pos;
        Ok(pos)
    }

    pub fn llseek(&mut self, from: SeekFrom) -> Result<LogicalPosition, StoreError> {
        let pos = self.store.resolve_seek(from, self.pos)?;
        self.pos = pos;
        Ok(pos)
    }

    /// Copy up to `count` bytes from the cursor into `sink`, advancing the
    /// cursor by what was copied.
    pub fn read_to<W: Write>(&mut self, sink: &mut W, count: usize) -> Result<usize, StoreError> {
        let copied = self.store.read_from(self.pos).write_to(sink, count)?;
        self.pos += copied as u64;
        Ok(copied)
    }

    /// Take exactly `count` bytes from `source` and write them to the store.
    pub fn write_from<R: Read>(&mut self, source: &mut R, count: usize) -> Result<usize, StoreError> {
        let mut staged = Vec::new();
        staged.try_reserve_exact(count)?;
        staged.resize(count, 0);
        source.read_exact(&mut staged).map_err(StoreError::Transfer)?;
        self.store.append_stream(&staged)?;
        Ok(count)
    }
}

impl Read for DeviceHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let copied = self.store.read_from(self.pos).copy_into(buf);
        self.pos += copied as u64;
        Ok(copied)
    }
}

impl Write for DeviceHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.store.append_stream(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for DeviceHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(self.llseek(pos)?)
    }
}
