//! Per-symbol record store: one JSON file per key under the results directory.
//!
//! Writes go through a temp file in the same directory and are renamed over
//! the target, so a reader sees either the old record or the new one.

use crate::collector::FetchOutcome;
use crate::error::StoreError;
use crate::models::{PersistedRecord, StockRecord, SymbolRef, is_path_unsafe};
use crate::scoring;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RECORD_EXT: &str = "json";

// ── Encoding ──────────────────────────────────────────────────────────────────

/// `{}` (or an empty file) is the sentinel; anything else must be a `StockRecord`.
pub fn decode_record(content: &str) -> Result<PersistedRecord, serde_json::Error> {
    if content.trim().is_empty() {
        return Ok(PersistedRecord::Empty);
    }
    let value: serde_json::Value = serde_json::from_str(content)?;
    if value.as_object().is_some_and(|o| o.is_empty()) {
        return Ok(PersistedRecord::Empty);
    }
    let record: StockRecord = serde_json::from_value(value)?;
    Ok(PersistedRecord::Stock(Box::new(record)))
}

pub fn encode_record(record: &PersistedRecord) -> Result<String, serde_json::Error> {
    match record {
        PersistedRecord::Empty => Ok("{}".to_string()),
        PersistedRecord::Stock(r) => serde_json::to_string(r),
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys are plain file names: no separators, no `.`/`..`.
    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key == "." || key == ".." || key.chars().any(is_path_unsafe) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.{RECORD_EXT}")))
    }

    /// Stored record for `key`. A file that cannot be read or parsed is
    /// reported as absent.
    pub fn get(&self, key: &str) -> Option<PersistedRecord> {
        let path = match self.path_for(key) {
            Ok(p) => p,
            Err(e) => {
                warn!("{}", e);
                return None;
            }
        };
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("{}: unreadable record {:?}: {}", key, path, e);
                return None;
            }
        };
        match decode_record(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("{}: malformed record {:?}, treating as absent: {}", key, path, e);
                None
            }
        }
    }

    /// Replace the record for `key` atomically.
    pub fn put(&self, key: &str, record: &PersistedRecord) -> Result<(), StoreError> {
        let body = encode_record(record)?;
        write_atomic(&self.dir, &self.path_for(key)?, body.as_bytes())?;
        debug!("{}: stored ({})", key, if record.is_empty() { "sentinel" } else { "record" });
        Ok(())
    }

    /// Every stored key, sorted ascending.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().is_none_or(|e| e != RECORD_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Count stored records by kind.
    pub fn summarize(&self) -> Result<StoreSummary, StoreError> {
        let mut summary = StoreSummary::default();
        for key in self.keys()? {
            match self.get(&key) {
                Some(PersistedRecord::Stock(r)) if r.scores.is_some() => summary.scored += 1,
                Some(PersistedRecord::Stock(_)) => summary.unscored += 1,
                Some(PersistedRecord::Empty) => summary.sentinels += 1,
                None => summary.unreadable += 1,
            }
        }
        Ok(summary)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreSummary {
    pub scored: usize,
    pub unscored: usize,
    pub sentinels: usize,
    pub unreadable: usize,
}

/// Write to a temp file next to `target`, fsync, then rename over it.
pub fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .suffix(".part")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target)?;
    Ok(())
}

// ── Merge ─────────────────────────────────────────────────────────────────────

/// Recompute scores from the record's own raw fields.
pub fn rescore(mut record: StockRecord) -> StockRecord {
    record.scores = Some(scoring::score(&record.raw));
    record
}

/// Combine the stored baseline with the collector's outcome for one symbol.
///
/// Fresh data replaces the raw fields wholesale and refreshes the symbol.
/// On a miss or failure the baseline survives, rescored if it holds data.
/// With neither, the result is the empty sentinel.
pub fn merge(
    symbol: &SymbolRef,
    baseline: Option<PersistedRecord>,
    outcome: FetchOutcome,
) -> PersistedRecord {
    match (outcome, baseline) {
        (FetchOutcome::Found(raw), _) => {
            let record = StockRecord {
                stock: Some(symbol.clone()),
                raw,
                scores: None,
                updated_at: Some(Utc::now().naive_utc()),
            };
            PersistedRecord::Stock(Box::new(rescore(record)))
        }
        (_, Some(PersistedRecord::Stock(record))) => {
            PersistedRecord::Stock(Box::new(rescore(*record)))
        }
        (_, Some(PersistedRecord::Empty) | None) => PersistedRecord::Empty,
    }
}
