// Core types shared by the store, the daemon and the client
use std::fmt;
use std::str::FromStr;

/// Record delimiter
pub const DELIMITER: u8 = b'\n';

/// Number of records retained by default (AESDCHAR_MAX_WRITE_OPERATIONS_SUPPORTED)
pub const DEFAULT_CAPACITY: usize = 10;

/// Byte offset into the concatenation of all live records
pub type LogicalPosition = u64;

// One committed, delimiter-terminated byte sequence
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record(Box<[u8]>);

impl Record {
    pub fn new(bytes: Vec<u8>) -> Self {
        Record(bytes.into_boxed_slice())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0.into_vec()
    }
}

impl AsRef<[u8]> for Record {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Record {
    fn from(bytes: &[u8]) -> Self {
        Record(bytes.into())
    }
}

impl From<&str> for Record {
    fn from(s: &str) -> Self {
        Record(s.as_bytes().into())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0).trim_end_matches('\n'))
    }
}

// Command-indexed seek target (struct aesd_seekto)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekTo {
    /// Index of the live record, 0 = oldest
    pub write_cmd: u32,
    /// Offset inside that record
    pub write_cmd_offset: u32,
}

impl SeekTo {
    pub fn new(write_cmd: u32, write_cmd_offset: u32) -> Self {
        SeekTo { write_cmd, write_cmd_offset }
    }
}

impl fmt::Display for SeekTo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{},{}", self.write_cmd, self.write_cmd_offset)
    }
}

/// Client response policy of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// Every commit is answered with the whole logical stream (file-backed deployment)
    FullEcho,
    /// Seek commands reposition a per-session cursor; answers start at that cursor
    #[default]
    Positioned,
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResponseMode::FullEcho => write!(f, "echo"),
            ResponseMode::Positioned => write!(f, "positioned"),
        }
    }
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "echo" | "full-echo" | "file" => Ok(ResponseMode::FullEcho),
            "positioned" | "device" | "seek" => Ok(ResponseMode::Positioned),
            other => Err(format!("unknown response mode '{}', expected echo or positioned", other)),
        }
    }
}
