// Record assembler: turns arbitrary-sized writes into newline-terminated records
use crate::error::StoreError;
use aesd_core::{Record, DELIMITER};

/// Bytes received but not yet terminated by a delimiter.
///
/// Each `feed` emits at most one record: the prefix up to the first
/// delimiter of the whole accumulated buffer. Anything after it stays
/// pending, even when it already holds another delimiter, until the
/// next `feed` call (an empty one is enough).
#[derive(Debug, Default)]
pub struct RecordAssembler {
    pending: Vec<u8>,
}

impl RecordAssembler {
    pub fn new() -> Self {
        RecordAssembler { pending: Vec::new() }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Result<Option<Record>, StoreError> {
        // reserve first so a failed grow leaves pending intact
        self.pending.try_reserve(bytes.len())?;
        self.pending.extend_from_slice(bytes);
        Ok(self.take_record())
    }

    fn take_record(&mut self) -> Option<Record> {
        let end = self.pending.iter().position(|&b| b == DELIMITER)?;
        let rest = self.pending.split_off(end + 1);
        let line = std::mem::replace(&mut self.pending, rest);
        Some(Record::new(line))
    }

    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop unterminated input, returning how many bytes were discarded.
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending = Vec::new();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_write_yields_one_record() {
        let mut asm = RecordAssembler::new();
        assert_eq!(asm.feed(b"foo").unwrap(), None);
        assert_eq!(asm.pending(), b"foo");
        assert_eq!(asm.feed(b"bar\n").unwrap(), Some(Record::from("foobar\n")));
        assert!(asm.is_empty());
    }

    #[test]
    fn one_record_per_feed_call() {
        let mut asm = RecordAssembler::new();
        assert_eq!(asm.feed(b"a\nb\nc").unwrap(), Some(Record::from("a\n")));
        // the second line is held back even though it is complete
        assert_eq!(asm.pending(), b"b\nc");
        assert_eq!(asm.feed(b"").unwrap(), Some(Record::from("b\n")));
        assert_eq!(asm.pending(), b"c");
        assert_eq!(asm.feed(b"").unwrap(), None);
        assert_eq!(asm.feed(b"\n").unwrap(), Some(Record::from("c\n")));
    }

    #[test]
    fn emitted_records_follow_first_delimiter_rule() {
        let chunks: [&[u8]; 6] = [b"ab", b"c\nde", b"\n\nf", b"", b"g", b"\nh"];
        let mut asm = RecordAssembler::new();
        let mut emitted = Vec::new();
        // reference model: accumulate, cut at first delimiter once per call
        let mut model: Vec<u8> = Vec::new();
        let mut expected = Vec::new();
        for chunk in chunks {
            model.extend_from_slice(chunk);
            if let Some(k) = model.iter().position(|&b| b == b'\n') {
                let rest = model.split_off(k + 1);
                expected.push(std::mem::replace(&mut model, rest));
            }
            if let Some(record) = asm.feed(chunk).unwrap() {
                emitted.push(record.into_bytes());
            }
        }
        assert_eq!(emitted, expected);
        assert_eq!(asm.pending(), model.as_slice());
        assert_eq!(emitted, vec![b"abc\n".to_vec(), b"de\n".to_vec(), b"\n".to_vec(), b"fg\n".to_vec()]);
        assert_eq!(asm.pending(), b"h");
    }

    #[test]
    fn discard_clears_partial_input() {
        let mut asm = RecordAssembler::new();
        asm.feed(b"partial").unwrap();
        assert_eq!(asm.discard(), 7);
        assert!(asm.is_empty());
    }
}
