//! Write-Ahead Log (WAL) implementation
//!
//! The WAL provides durability by writing every mutation to disk before it
//! becomes observable in the MemTable. After a crash the log is replayed to
//! recover the unflushed portion of the database state.
//!
//! The log is a single line-oriented text file; see [`WalRecord`] for the
//! record format.

mod record;

pub use record::{WalOp, WalRecord};

use crate::Result;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// WAL sync policy
#[derive(Debug, Clone, Copy, Default)]
pub enum SyncPolicy {
    /// Sync after every append (safest, slowest)
    #[default]
    Immediate,
    /// Sync after N appends
    EveryN(usize),
    /// Never sync (OS decides, fastest, least safe)
    Never,
}

/// Handle to the single active WAL file
pub struct Wal {
    path: PathBuf,
    sync_policy: SyncPolicy,
    inner: Mutex<WalInner>,
}

struct WalInner {
    file: BufWriter<File>,
    writes_since_sync: usize,
}

impl Wal {
    /// Open or create the WAL file at `path`
    pub fn open(path: impl Into<PathBuf>, sync_policy: SyncPolicy) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            sync_policy,
            inner: Mutex::new(WalInner {
                file: BufWriter::new(file),
                writes_since_sync: 0,
            }),
        })
    }

    /// Path of the WAL file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Under the default policy the record has reached
    /// durable storage when this returns.
    pub fn append(&self, op: WalOp, key: &str, value: &str) -> Result<()> {
        let record = WalRecord::new(op, key, value);
        let mut inner = self.inner.lock();

        inner.file.write_all(record.encode().as_bytes())?;
        inner.writes_since_sync += 1;

        if self.should_sync(&inner) {
            inner.file.flush()?;
            inner.file.get_ref().sync_all()?;
            inner.writes_since_sync = 0;
        }

        Ok(())
    }

    /// Read back every record in append order. Malformed lines are skipped:
    /// they are torn tails from a crash mid-append.
    pub fn recover(&self) -> Result<Vec<WalRecord>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for line in contents.lines() {
            if line.is_empty() {
                continue;
            }
            match WalRecord::decode(line) {
                Some(record) => records.push(record),
                None => debug!(line, "skipping malformed WAL line"),
            }
        }

        Ok(records)
    }

    /// Truncate the log to zero length. Called only after the corresponding
    /// MemTable flush has reached disk.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        // Push any buffered bytes into the file so the truncation drops them
        // together with the already-synced contents.
        inner.file.flush()?;
        inner.file.get_ref().set_len(0)?;
        inner.file.get_ref().sync_all()?;
        inner.writes_since_sync = 0;
        Ok(())
    }

    fn should_sync(&self, inner: &WalInner) -> bool {
        match self.sync_policy {
            SyncPolicy::Immediate => true,
            SyncPolicy::EveryN(n) => inner.writes_since_sync >= n,
            SyncPolicy::Never => false,
        }
    }
}
