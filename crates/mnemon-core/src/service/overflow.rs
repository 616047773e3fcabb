//! Durable overflow log
//!
//! Newline-delimited JSON, one record per line, written only when every tier
//! refuses a write. Single-writer: all file access happens under an
//! exclusive advisory lock. The maintenance cycle drains oldest-first.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use fs2::FileExt;

use crate::error::{MemoryError, Result};
use crate::memory::MemoryRecord;

/// Append-only overflow log with advisory locking
pub struct OverflowLog {
    path: PathBuf,
}

impl OverflowLog {
    /// Open (or create the parent of) the log at `path`
    ///
    /// `None` resolves to the platform data directory.
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(p) => p,
            None => {
                let proj_dirs = directories::ProjectDirs::from("ai", "mnemon", "core")
                    .ok_or_else(|| {
                        MemoryError::Internal("could not determine project directories".into())
                    })?;
                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                data_dir.join("overflow.ndjson")
            }
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    fn open_locked(&self) -> Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;
        Ok(file)
    }

    /// Append one record as a JSON line
    pub fn append(&self, record: &MemoryRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut file = self.open_locked()?;
        writeln!(file, "{line}")?;
        file.flush()?;
        let _ = FileExt::unlock(&file);
        tracing::warn!(id = %record.id, "write routed to overflow log");
        Ok(())
    }

    /// Lines currently queued
    pub fn depth(&self) -> u64 {
        let Ok(file) = File::open(&self.path) else {
            return 0;
        };
        BufReader::new(file)
            .lines()
            .map_while(|l| l.ok())
            .filter(|l| !l.trim().is_empty())
            .count() as u64
    }

    /// Drain queued records oldest-first
    ///
    /// `deliver` returns true when the record reached a tier; undelivered
    /// records (and unparseable lines) stay queued. Returns the number
    /// delivered.
    pub fn drain(&self, mut deliver: impl FnMut(MemoryRecord) -> bool) -> Result<usize> {
        let mut file = self.open_locked()?;

        let mut contents = String::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_string(&mut contents)?;

        let mut remaining: Vec<&str> = Vec::new();
        let mut delivered = 0usize;
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<MemoryRecord>(line) {
                Ok(record) => {
                    if deliver(record) {
                        delivered += 1;
                    } else {
                        remaining.push(line);
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "unparseable overflow line retained");
                    remaining.push(line);
                }
            }
        }

        if delivered > 0 {
            let mut rewritten = remaining.join("\n");
            if !rewritten.is_empty() {
                rewritten.push('\n');
            }
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(rewritten.as_bytes())?;
            file.flush()?;
            tracing::info!(delivered, remaining = remaining.len(), "overflow log drained");
        }
        let _ = FileExt::unlock(&file);
        Ok(delivered)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryType;
    use chrono::Utc;

    fn log() -> (tempfile::TempDir, OverflowLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = OverflowLog::new(Some(dir.path().join("overflow.ndjson"))).unwrap();
        (dir, log)
    }

    fn record(content: &str) -> MemoryRecord {
        MemoryRecord::new(content, MemoryType::Episodic, Utc::now())
    }

    #[test]
    fn test_append_and_depth() {
        let (_dir, log) = log();
        assert_eq!(log.depth(), 0);

        log.append(&record("one")).unwrap();
        log.append(&record("two")).unwrap();
        assert_eq!(log.depth(), 2);
    }

    #[test]
    fn test_drain_delivers_oldest_first() {
        let (_dir, log) = log();
        let a = record("first");
        let b = record("second");
        log.append(&a).unwrap();
        log.append(&b).unwrap();

        let mut seen = Vec::new();
        let delivered = log
            .drain(|r| {
                seen.push(r.id.clone());
                true
            })
            .unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(seen, vec![a.id, b.id]);
        assert_eq!(log.depth(), 0);
    }

    #[test]
    fn test_undelivered_records_stay_queued() {
        let (_dir, log) = log();
        let a = record("deliverable");
        let b = record("stuck");
        log.append(&a).unwrap();
        log.append(&b).unwrap();

        let a_id = a.id.clone();
        let delivered = log.drain(|r| r.id == a_id).unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(log.depth(), 1);

        // The stuck record is retried on the next drain
        let delivered = log.drain(|_| true).unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(log.depth(), 0);
    }

    #[test]
    fn test_garbage_lines_are_retained_not_lost() {
        let (_dir, log) = log();
        log.append(&record("good")).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&log.path)
            .unwrap()
            .write_all(b"not json\n")
            .unwrap();

        let delivered = log.drain(|_| true).unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(log.depth(), 1);
    }

    #[test]
    fn test_depth_of_missing_file_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let log = OverflowLog::new(Some(dir.path().join("never-created.ndjson"))).unwrap();
        assert_eq!(log.depth(), 0);
    }
}
