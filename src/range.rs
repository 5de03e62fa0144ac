use crate::core::{Result, StreamError};

/// Inclusive byte interval `[from, until]` of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub from: u64,
    pub until: u64,
}

impl ByteRange {
    pub fn new(from: u64, until: u64) -> Self {
        Self { from, until }
    }

    /// Number of bytes covered, always at least one.
    pub fn byte_count(&self) -> u64 {
        self.until - self.from + 1
    }
}

/// Whether the client asked for a slice or for the whole file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeKind {
    Full,
    Partial,
}

/// Resolve an optional `Range` header against a file of `total_size` bytes.
///
/// Only the single-interval `bytes=<from>-[until]` form is accepted. Ranges
/// that end at or past the end of the file are rejected, never clamped.
pub fn parse_range(header: Option<&str>, total_size: u64) -> Result<(ByteRange, RangeKind)> {
    let Some(header) = header else {
        if total_size == 0 {
            return Err(StreamError::MalformedRange(
                "file is empty, no byte range exists".into(),
            ));
        }
        return Ok((ByteRange::new(0, total_size - 1), RangeKind::Full));
    };

    let malformed = || StreamError::MalformedRange(header.to_string());

    let spec = header.trim().strip_prefix("bytes=").ok_or_else(malformed)?;
    let (from_str, until_str) = spec.split_once('-').ok_or_else(malformed)?;
    let from = parse_number(from_str).ok_or_else(malformed)?;

    let until_str = until_str.trim();
    let until = if until_str.is_empty() {
        total_size.checked_sub(1).ok_or_else(malformed)?
    } else {
        parse_number(until_str).ok_or_else(malformed)?
    };

    if from > until {
        return Err(StreamError::MalformedRange(format!(
            "{header}: start {from} is after end {until}"
        )));
    }
    if until >= total_size {
        return Err(StreamError::MalformedRange(format!(
            "{header}: end {until} is outside a file of {total_size} bytes"
        )));
    }

    Ok((ByteRange::new(from, until), RangeKind::Partial))
}

fn parse_number(s: &str) -> Option<u64> {
    let s = s.trim();
    // u64::from_str would accept a leading '+'
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
