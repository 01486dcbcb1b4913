use std::str;

use memchr::memchr;
use thiserror::Error;

/// One decoded `key;value` line, borrowing its key from the chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record<'a> {
    pub key: &'a str,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordErrorKind {
    MissingSeparator,
    InvalidValue,
    InvalidUtf8,
}

/// A line that could not be decoded. The tokenizer skips it and moves on.
#[derive(Debug, Clone, Error)]
#[error("{kind:?} in line '{line}'")]
pub struct RecordError {
    pub kind: RecordErrorKind,
    pub line: String,
}

impl RecordError {
    fn new(kind: RecordErrorKind, line: &[u8]) -> Self {
        Self {
            kind,
            line: String::from_utf8_lossy(line).into_owned(),
        }
    }
}

/// Lazy line-by-line decoder over one chunk.
///
/// Surrounding whitespace (including a `\r` before the terminator) is trimmed
/// and blank lines are skipped without being reported.
pub struct Tokenizer<'a> {
    rest: &'a [u8],
}

impl<'a> Tokenizer<'a> {
    pub fn new(chunk: &'a [u8]) -> Self {
        Self { rest: chunk }
    }

    fn next_line(&mut self) -> Option<&'a [u8]> {
        if self.rest.is_empty() {
            return None;
        }
        let line = match memchr(b'\n', self.rest) {
            Some(pos) => {
                let (line, tail) = self.rest.split_at(pos);
                self.rest = &tail[1..];
                line
            }
            None => std::mem::take(&mut self.rest),
        };
        Some(line)
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Record<'a>, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.next_line()?.trim_ascii();
            if line.is_empty() {
                continue;
            }
            return Some(parse_line(line));
        }
    }
}

/// Splits a trimmed line on its first `;` and parses the value.
pub fn parse_line(line: &[u8]) -> Result<Record<'_>, RecordError> {
    let Some(sep) = memchr(b';', line) else {
        return Err(RecordError::new(RecordErrorKind::MissingSeparator, line));
    };
    let (key, value) = (&line[..sep], &line[sep + 1..]);
    let key = str::from_utf8(key).map_err(|_| RecordError::new(RecordErrorKind::InvalidUtf8, line))?;
    let value = str::from_utf8(value)
        .ok()
        .and_then(|v| v.trim_ascii().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or_else(|| RecordError::new(RecordErrorKind::InvalidValue, line))?;
    Ok(Record { key, value })
}
