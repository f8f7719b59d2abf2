// Line protocol - pure parsing/encoding, no I/O
use crate::types::{SeekTo, DELIMITER};
use thiserror::Error;

/// Reserved prefix of a seek command line
pub const SEEK_PREFIX: &[u8] = b"AESDCHAR_IOCSEEKTO:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed seek command: {0}")]
    MalformedSeek(String),
}

/// Classification of one completed line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    /// Ordinary data, stored as a record
    Data(&'a [u8]),
    /// Seek command, never stored
    Seek(SeekTo),
}

pub fn is_seek_command(line: &[u8]) -> bool {
    line.starts_with(SEEK_PREFIX)
}

/// Classify a delimiter-terminated line.
pub fn parse_line(line: &[u8]) -> Result<Line<'_>, ProtocolError> {
    if !is_seek_command(line) {
        return Ok(Line::Data(line));
    }

    let body = &line[SEEK_PREFIX.len()..];
    let body = body.strip_suffix(&[DELIMITER]).unwrap_or(body);
    let text = std::str::from_utf8(body)
        .map_err(|_| ProtocolError::MalformedSeek(String::from_utf8_lossy(body).into_owned()))?;
    let text = text.trim_end_matches('\r');

    let (cmd, offset) = text
        .split_once(',')
        .ok_or_else(|| ProtocolError::MalformedSeek(text.to_string()))?;
    let write_cmd = cmd
        .trim()
        .parse::<u32>()
        .map_err(|_| ProtocolError::MalformedSeek(text.to_string()))?;
    let write_cmd_offset = offset
        .trim()
        .parse::<u32>()
        .map_err(|_| ProtocolError::MalformedSeek(text.to_string()))?;

    Ok(Line::Seek(SeekTo::new(write_cmd, write_cmd_offset)))
}

/// Encode a seek command as it travels on the wire.
pub fn encode_seek(seek: SeekTo) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(SEEK_PREFIX.len() + 24);
    bytes.extend_from_slice(SEEK_PREFIX);
    bytes.extend_from_slice(seek.to_string().as_bytes());
    bytes.push(DELIMITER);
    bytes
}
