// Shared store: circular log + device-stream pending assembly behind one lock
use crate::assembler::RecordAssembler;
use crate::circular::CircularLog;
use crate::error::{InvalidSeek, StoreError};
use aesd_core::{LogicalPosition, Record, SeekTo};
use parking_lot::{Mutex, MutexGuard};
use std::fs::{File, OpenOptions};
use std::fmt;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of an `append_stream` call
#[derive(Debug, PartialEq, Eq)]
pub enum Commit {
    /// No delimiter yet, bytes were buffered
    Pending,
    /// A record was committed; `evicted` is the record it displaced
    Committed { evicted: Option<Record> },
}

// Append target of the backing file; can be cut back after a short write
trait BackingSink: Write + Seek + Send {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl BackingSink for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Write all of `bytes` at the end of `sink`, or nothing at all.
fn append_whole<S: BackingSink + ?Sized>(sink: &mut S, bytes: &[u8]) -> io::Result<()> {
    let start = sink.seek(SeekFrom::End(0))?;
    if let Err(e) = sink.write_all(bytes) {
        // drop the partial tail, the file holds whole records only
        let undo = sink
            .truncate_to(start)
            .and_then(|_| sink.seek(SeekFrom::Start(start)).map(|_| ()));
        if let Err(undo) = undo {
            warn!(start, "backing file rollback failed: {}", undo);
        }
        return Err(e);
    }
    Ok(())
}

// Ephemeral file mirroring every committed record (file-backed deployment)
struct BackingFile {
    path: PathBuf,
    file: Box<dyn BackingSink>,
}

impl fmt::Debug for BackingFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BackingFile").field("path", &self.path).finish()
    }
}

impl BackingFile {
    fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(BackingFile { path: path.to_path_buf(), file: Box::new(file) })
    }

    fn append(&mut self, record: &Record) -> io::Result<()> {
        append_whole(self.file.as_mut(), record.as_bytes())
    }

    /// Sync, close and delete. A failed sync still deletes the file.
    fn remove(mut self) -> io::Result<PathBuf> {
        if let Err(e) = self.file.sync() {
            warn!(path = %self.path.display(), "backing file sync failed: {}", e);
        }
        drop(self.file);
        std::fs::remove_file(&self.path)?;
        Ok(self.path)
    }
}

#[derive(Debug)]
struct StoreState {
    log: CircularLog,
    pending: RecordAssembler,
    backing: Option<BackingFile>,
}

impl StoreState {
    fn commit(&mut self, record: Record) -> Result<Option<Record>, StoreError> {
        // backing first: a failed write must leave the log untouched
        if let Some(backing) = self.backing.as_mut() {
            backing.append(&record).map_err(StoreError::Backing)?;
        }
        let len = record.len();
        let evicted = self.log.commit(record);
        debug!(
            len,
            evicted = evicted.as_ref().map(|r| r.len()),
            total = self.log.total_bytes(),
            "record committed"
        );
        Ok(evicted)
    }
}

/// The unit of atomicity for every mutation and every length-dependent read.
#[derive(Debug)]
pub struct SharedStore {
    state: Mutex<StoreState>,
}

impl SharedStore {
    pub fn with_capacity(capacity: usize) -> Self {
        SharedStore {
            state: Mutex::new(StoreState {
                log: CircularLog::new(capacity),
                pending: RecordAssembler::new(),
                backing: None,
            }),
        }
    }

    /// Store whose commits are also appended to an ephemeral file at `path`.
    pub fn with_backing_file(capacity: usize, path: &Path) -> Result<Self, StoreError> {
        let backing = BackingFile::create(path).map_err(StoreError::Backing)?;
        Ok(SharedStore {
            state: Mutex::new(StoreState {
                log: CircularLog::new(capacity),
                pending: RecordAssembler::new(),
                backing: Some(backing),
            }),
        })
    }

    #[cfg(test)]
    fn with_backing_sink(capacity: usize, path: &Path, sink: Box<dyn BackingSink>) -> Self {
        SharedStore {
            state: Mutex::new(StoreState {
                log: CircularLog::new(capacity),
                pending: RecordAssembler::new(),
                backing: Some(BackingFile { path: path.to_path_buf(), file: sink }),
            }),
        }
    }

    pub fn backing_path(&self) -> Option<PathBuf> {
        self.state.lock().backing.as_ref().map(|b| b.path.clone())
    }

    /// Feed bytes to the device-stream assembly context and commit a
    /// completed record.
    pub fn append_stream(&self, bytes: &[u8]) -> Result<Commit, StoreError> {
        let mut state = self.state.lock();
        match state.pending.feed(bytes)? {
            Some(record) => {
                let evicted = state.commit(record)?;
                Ok(Commit::Committed { evicted })
            }
            None => Ok(Commit::Pending),
        }
    }

    /// Commit an already-assembled record.
    pub fn commit(&self, record: Record) -> Result<Option<Record>, StoreError> {
        self.state.lock().commit(record)
    }

    /// Lock-held view of `[position, total_bytes)`.
    pub fn read_from(&self, position: LogicalPosition) -> StreamView<'_> {
        StreamView { state: self.state.lock(), start: position }
    }

    /// Copy of `[position, total_bytes)` taken under the lock.
    pub fn snapshot(&self, position: LogicalPosition) -> Vec<u8> {
        self.read_from(position).to_vec()
    }

    pub fn seek(&self, seek: SeekTo) -> Result<LogicalPosition, StoreError> {
        Ok(self.state.lock().log.seek_by_command(seek)?)
    }

    /// Resolve an lseek-style request against the current total length.
    pub fn resolve_seek(&self, from: SeekFrom, current: LogicalPosition) -> Result<LogicalPosition, StoreError> {
        let total = self.state.lock().log.total_bytes();
        let target: i128 = match from {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => current as i128 + delta as i128,
            SeekFrom::End(delta) => total as i128 + delta as i128,
        };
        if target < 0 || target > total as i128 {
            return Err(InvalidSeek::PositionOutOfRange { position: target, total }.into());
        }
        Ok(target as LogicalPosition)
    }

    pub fn total_bytes(&self) -> u64 {
        self.state.lock().log.total_bytes()
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().log.live_count()
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().log.capacity()
    }

    /// Live records, oldest first.
    pub fn records(&self) -> Vec<Record> {
        self.state.lock().log.iter().cloned().collect()
    }

    /// Release ephemeral state: drop unterminated device input and
    /// delete the backing file, if any.
    pub fn close(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let dropped = state.pending.discard();
        if dropped > 0 {
            warn!(dropped, "discarding unterminated input at close");
        }
        if let Some(backing) = state.backing.take() {
            let path = backing.remove().map_err(StoreError::Backing)?;
            info!("Deleted {}", path.display());
        }
        Ok(())
    }
}

/// Lazy, restartable sequence of slices covering `[start, total_bytes)`.
/// Holds the store lock for its whole lifetime.
pub struct StreamView<'a> {
    state: MutexGuard<'a, StoreState>,
    start: LogicalPosition,
}

impl<'a> StreamView<'a> {
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks { log: &self.state.log, position: self.start }
    }

    pub fn len(&self) -> usize {
        self.state.log.total_bytes().saturating_sub(self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for chunk in self.chunks() {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// Copy as much as fits into `buf`.
    pub fn copy_into(&self, buf: &mut [u8]) -> usize {
        let mut copied = 0;
        for chunk in self.chunks() {
            if copied == buf.len() {
                break;
            }
            let n = chunk.len().min(buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&chunk[..n]);
            copied += n;
        }
        copied
    }

    /// Copy up to `limit` bytes into `sink`.
    pub fn write_to<W: Write>(&self, sink: &mut W, limit: usize) -> Result<usize, StoreError> {
        let mut written = 0;
        for chunk in self.chunks() {
            if written == limit {
                break;
            }
            let n = chunk.len().min(limit - written);
            sink.write_all(&chunk[..n]).map_err(StoreError::Transfer)?;
            written += n;
        }
        Ok(written)
    }
}

pub struct Chunks<'v> {
    log: &'v CircularLog,
    position: LogicalPosition,
}

impl<'v> Iterator for Chunks<'v> {
    type Item = &'v [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let (record, offset) = self.log.resolve(self.position)?;
        let slice = &record.as_bytes()[offset..];
        self.position += slice.len() as u64;
        Some(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn scenario_capacity_three_keeps_newest() {
        let store = SharedStore::with_capacity(3);
        for line in ["a\n", "bb\n", "ccc\n", "dddd\n"] {
            store.append_stream(line.as_bytes()).unwrap();
        }
        assert_eq!(store.live_count(), 3);
        assert_eq!(store.snapshot(0), b"bb\nccc\ndddd\n");
    }

    #[test]
    fn append_stream_reports_commits_and_evictions() {
        let store = SharedStore::with_capacity(1);
        assert_eq!(store.append_stream(b"foo").unwrap(), Commit::Pending);
        assert_eq!(store.live_count(), 0);
        assert_eq!(store.append_stream(b"bar\n").unwrap(), Commit::Committed { evicted: None });
        assert_eq!(store.snapshot(0), b"foobar\n");
        assert_eq!(
            store.append_stream(b"baz\n").unwrap(),
            Commit::Committed { evicted: Some(Record::from("foobar\n")) }
        );
    }

    #[test]
    fn stream_view_is_restartable() {
        let store = SharedStore::with_capacity(4);
        store.commit(Record::from("one\n")).unwrap();
        store.commit(Record::from("two\n")).unwrap();

        let view = store.read_from(2);
        let first: Vec<&[u8]> = view.chunks().collect();
        let second: Vec<&[u8]> = view.chunks().collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![&b"e\n"[..], &b"two\n"[..]]);
        assert_eq!(view.len(), 6);

        let mut small = [0u8; 3];
        assert_eq!(view.copy_into(&mut small), 3);
        assert_eq!(&small, b"e\nt");
    }

    #[test]
    fn read_from_end_is_empty() {
        let store = SharedStore::with_capacity(2);
        store.commit(Record::from("x\n")).unwrap();
        let view = store.read_from(2);
        assert!(view.is_empty());
        assert_eq!(view.chunks().count(), 0);
    }

    #[test]
    fn seek_failure_leaves_state() {
        let store = SharedStore::with_capacity(5);
        for line in ["1234\n", "123456\n", "12\n"] {
            store.commit(Record::from(line)).unwrap();
        }
        assert_eq!(store.seek(SeekTo::new(1, 2)).unwrap(), 7);
        assert!(matches!(
            store.seek(SeekTo::new(5, 0)),
            Err(StoreError::InvalidSeek(InvalidSeek::CommandOutOfRange { .. }))
        ));
        assert_eq!(store.total_bytes(), 15);
    }

    #[test]
    fn resolve_seek_clamps_to_total() {
        let store = SharedStore::with_capacity(2);
        store.commit(Record::from("hello\n")).unwrap();
        assert_eq!(store.resolve_seek(SeekFrom::End(0), 0).unwrap(), 6);
        assert_eq!(store.resolve_seek(SeekFrom::Current(-2), 5).unwrap(), 3);
        assert!(store.resolve_seek(SeekFrom::Start(7), 0).is_err());
        assert!(store.resolve_seek(SeekFrom::Current(-1), 0).is_err());
    }

    #[test]
    fn concurrent_writers_never_tear_records() {
        let store = Arc::new(SharedStore::with_capacity(64));
        let handles: Vec<_> = (0..4)
            .map(|writer| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..16 {
                        let line = format!("writer{}-{}\n", writer, i);
                        store.commit(Record::new(line.into_bytes())).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let records = store.records();
        assert_eq!(records.len(), 64);
        for writer in 0..4 {
            let own: Vec<String> = records
                .iter()
                .map(|r| r.to_string())
                .filter(|s| s.starts_with(&format!("writer{}-", writer)))
                .collect();
            let expected: Vec<String> = (0..16).map(|i| format!("writer{}-{}", writer, i)).collect();
            // per-writer program order is preserved
            assert_eq!(own, expected);
        }
    }

    #[test]
    fn backing_file_mirrors_commits_and_is_deleted_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aesdsocketdata");
        let store = SharedStore::with_backing_file(2, &path).unwrap();
        store.append_stream(b"one\n").unwrap();
        store.append_stream(b"two\n").unwrap();
        store.append_stream(b"three\n").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"one\ntwo\nthree\n");
        assert_eq!(store.snapshot(0), b"two\nthree\n");

        store.close().unwrap();
        assert!(!path.exists());
        assert!(store.backing_path().is_none());
    }

    // In-memory backing target that refuses bytes past `limit`
    struct LimitedSink {
        data: Arc<Mutex<Vec<u8>>>,
        pos: u64,
        limit: usize,
        fail_sync: bool,
    }

    impl LimitedSink {
        fn new(limit: usize) -> (Self, Arc<Mutex<Vec<u8>>>) {
            let data = Arc::new(Mutex::new(Vec::new()));
            let sink = LimitedSink { data: Arc::clone(&data), pos: 0, limit, fail_sync: false };
            (sink, data)
        }
    }

    impl Write for LimitedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut data = self.data.lock();
            let room = self.limit.saturating_sub(data.len());
            if room == 0 && !buf.is_empty() {
                return Err(io::Error::new(io::ErrorKind::Other, "file size limit exceeded"));
            }
            let n = buf.len().min(room);
            data.extend_from_slice(&buf[..n]);
            self.pos = data.len() as u64;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for LimitedSink {
        fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
            let len = self.data.lock().len() as i64;
            self.pos = match from {
                SeekFrom::Start(n) => n,
                SeekFrom::End(d) => (len + d) as u64,
                SeekFrom::Current(d) => (self.pos as i64 + d) as u64,
            };
            Ok(self.pos)
        }
    }

    impl BackingSink for LimitedSink {
        fn truncate_to(&mut self, len: u64) -> io::Result<()> {
            self.data.lock().truncate(len as usize);
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            if self.fail_sync {
                return Err(io::Error::new(io::ErrorKind::Other, "sync failed"));
            }
            Ok(())
        }
    }

    #[test]
    fn short_backing_write_is_rolled_back() {
        let (mut sink, data) = LimitedSink::new(8);
        append_whole(&mut sink, b"abc\n").unwrap();
        assert!(append_whole(&mut sink, b"defgh\n").is_err());
        assert_eq!(*data.lock(), b"abc\n");
        assert_eq!(sink.seek(SeekFrom::Current(0)).unwrap(), 4);
    }

    #[test]
    fn failed_backing_write_leaves_file_and_log_unchanged() {
        let (sink, data) = LimitedSink::new(16);
        let store = SharedStore::with_backing_sink(4, Path::new("aesdsocketdata"), Box::new(sink));

        store.commit(Record::from("0123456789\n")).unwrap();
        assert!(matches!(
            store.commit(Record::from("abcdefghij\n")),
            Err(StoreError::Backing(_))
        ));
        assert_eq!(*data.lock(), b"0123456789\n");
        assert_eq!(store.snapshot(0), b"0123456789\n");
        assert_eq!(store.live_count(), 1);

        // the next record lands right after the last whole one
        store.commit(Record::from("next\n")).unwrap();
        assert_eq!(*data.lock(), b"0123456789\nnext\n");
        assert_eq!(store.snapshot(0), b"0123456789\nnext\n");
    }

    #[test]
    fn backing_file_is_deleted_even_if_sync_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aesdsocketdata");
        std::fs::write(&path, b"stale\n").unwrap();

        let (mut sink, _) = LimitedSink::new(64);
        sink.fail_sync = true;
        let store = SharedStore::with_backing_sink(2, &path, Box::new(sink));
        store.commit(Record::from("one\n")).unwrap();

        store.close().unwrap();
        assert!(!path.exists());
    }
}
