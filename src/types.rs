//! Core types for lsmkv

use crate::{LsmError, Result};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Sentinel value marking a logical deletion. Keys whose current value is the
/// tombstone are reported as absent to clients but occupy a record until
/// bottom-level compaction removes them.
pub const TOMBSTONE: &str = "__TOMBSTONE__";

/// A single key-value entry. A deletion is an entry whose value is
/// [`TOMBSTONE`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub value: String,
}

impl Entry {
    /// Create a new entry
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Whether this entry marks a deletion
    pub fn is_tombstone(&self) -> bool {
        self.value == TOMBSTONE
    }

    /// Byte size of the entry (key length + value length)
    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// Validate a user-supplied key.
///
/// Keys may not be empty and may not contain the WAL field delimiter `|` or
/// line terminators, which would corrupt recovery.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(LsmError::InvalidArgument("empty key".into()));
    }
    if key.contains('|') {
        return Err(LsmError::InvalidArgument(format!(
            "key {key:?} contains reserved delimiter '|'"
        )));
    }
    if key.contains('\n') || key.contains('\r') {
        return Err(LsmError::InvalidArgument(format!(
            "key {key:?} contains a line terminator"
        )));
    }
    Ok(())
}

/// Validate a user-supplied value. Values may contain `|` but not line
/// terminators.
pub fn validate_value(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(LsmError::InvalidArgument("empty value".into()));
    }
    if value.contains('\n') || value.contains('\r') {
        return Err(LsmError::InvalidArgument(
            "value contains a line terminator".into(),
        ));
    }
    Ok(())
}

/// Milliseconds since the Unix epoch
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Mint a table timestamp that is strictly greater than the last one, so two
/// flushes within the same clock millisecond never collide on a filename.
pub(crate) fn next_timestamp(last: &mut u64) -> u64 {
    *last = now_millis().max(*last + 1);
    *last
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_size() {
        let entry = Entry::new("name", "Alice");
        assert_eq!(entry.size(), 9);
        assert!(!entry.is_tombstone());

        let deleted = Entry::new("name", TOMBSTONE);
        assert!(deleted.is_tombstone());
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("fruit:apple").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("a|b").is_err());
        assert!(validate_key("a\nb").is_err());
        assert!(validate_key("a\rb").is_err());
    }

    #[test]
    fn test_validate_value() {
        assert!(validate_value("red").is_ok());
        assert!(validate_value("a|b|c").is_ok());
        assert!(validate_value("").is_err());
        assert!(validate_value("a\nb").is_err());
    }
}
