//! WAL record types and line serialization

use crate::types::now_millis;

/// WAL operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalOp {
    /// Insert or update a key
    Put,
    /// Mark a key as deleted
    Delete,
}

impl WalOp {
    /// Wire name of the operation
    pub fn as_str(&self) -> &'static str {
        match self {
            WalOp::Put => "PUT",
            WalOp::Delete => "DELETE",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "PUT" => Some(WalOp::Put),
            "DELETE" => Some(WalOp::Delete),
            _ => None,
        }
    }
}

/// A single WAL record.
///
/// Line format: `<timestamp_millis>|<op>|<key>|<value>\n`. The first three
/// `|` characters delimit the fields; the value keeps any further `|`
/// verbatim. Timestamps are informational and need not be monotonic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    pub timestamp: u64,
    pub op: WalOp,
    pub key: String,
    pub value: String,
}

impl WalRecord {
    /// Create a record stamped with the current wall clock
    pub fn new(op: WalOp, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            timestamp: now_millis(),
            op,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Encode as one newline-terminated line
    pub fn encode(&self) -> String {
        format!(
            "{}|{}|{}|{}\n",
            self.timestamp,
            self.op.as_str(),
            self.key,
            self.value
        )
    }

    /// Decode a line (without trailing newline). Returns `None` for malformed
    /// lines, which correspond to torn tails from a crash mid-append.
    pub fn decode(line: &str) -> Option<Self> {
        let mut fields = line.splitn(4, '|');
        let timestamp = fields.next()?.parse().ok()?;
        let op = WalOp::parse(fields.next()?)?;
        let key = fields.next()?;
        let value = fields.next()?;
        if key.is_empty() {
            return None;
        }
        Some(Self {
            timestamp,
            op,
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trip() {
        let record = WalRecord::new(WalOp::Put, "name", "Alice");
        let line = record.encode();
        assert!(line.ends_with('\n'));

        let decoded = WalRecord::decode(line.trim_end_matches('\n')).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_value_keeps_delimiters() {
        let record = WalRecord::new(WalOp::Put, "k", "a|b|c");
        let line = record.encode();
        let decoded = WalRecord::decode(line.trim_end_matches('\n')).unwrap();
        assert_eq!(decoded.value, "a|b|c");
    }

    #[test]
    fn test_decode_malformed() {
        // Fewer than three delimiters
        assert!(WalRecord::decode("123|PUT|key-only").is_none());
        assert!(WalRecord::decode("123|PUT").is_none());
        assert!(WalRecord::decode("").is_none());
        // Garbage fields
        assert!(WalRecord::decode("not-a-ts|PUT|k|v").is_none());
        assert!(WalRecord::decode("123|UPSERT|k|v").is_none());
        assert!(WalRecord::decode("123|PUT||v").is_none());
    }

    #[test]
    fn test_decode_delete() {
        let decoded = WalRecord::decode("17|DELETE|k|__TOMBSTONE__").unwrap();
        assert_eq!(decoded.op, WalOp::Delete);
        assert_eq!(decoded.key, "k");
    }
}
