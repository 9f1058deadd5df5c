// src/notify/push_record.rs
//! One JSON file per Shanghai calendar day recording that the digest went out.
//!
//! Precondition: a single process instance writes the directory at a time.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::clock::{date_key, format_timestamp, parse_date_key};

pub const DEFAULT_RECORDS_DIR: &str = "output/.push_records";
const FILE_PREFIX: &str = "push_record_";
const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRecord {
    pub pushed: bool,
    /// `YYYY-MM-DD HH:MM:SS`, Shanghai local time.
    pub push_time: String,
    pub report_type: String,
}

#[derive(Debug, Clone)]
pub struct PushRecordStore {
    dir: PathBuf,
}

impl PushRecordStore {
    /// Creates the directory if needed and purges expired records.
    pub fn open(dir: impl Into<PathBuf>, retention_days: u32, now: DateTime<FixedOffset>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating push record dir {}", dir.display()))?;
        let store = Self { dir };
        store.sweep(now, retention_days);
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}{}{FILE_SUFFIX}", date_key(date)))
    }

    /// `None` when absent or unreadable.
    pub fn load(&self, date: NaiveDate) -> Option<PushRecord> {
        let path = self.path_for(date);
        let raw = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<PushRecord>(&raw) {
            Ok(rec) => Some(rec),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt push record ignored");
                None
            }
        }
    }

    pub fn has_pushed_on(&self, date: NaiveDate) -> bool {
        self.load(date).map(|r| r.pushed).unwrap_or(false)
    }

    /// Writes (or overwrites) the record for `now`'s date via temp file + rename.
    pub fn record(&self, now: DateTime<FixedOffset>, report_type: &str) -> Result<PathBuf> {
        let path = self.path_for(now.date_naive());
        let rec = PushRecord {
            pushed: true,
            push_time: format_timestamp(&now),
            report_type: report_type.to_string(),
        };
        let json = serde_json::to_string_pretty(&rec).context("serialize push record")?;
        let tmp = path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(json.as_bytes())
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("renaming into {}", path.display()))?;
        tracing::info!(path = %path.display(), report_type, "push record written");
        Ok(path)
    }

    /// Deletes records whose embedded date is more than `retention_days` whole days
    /// before `now`. Files with malformed names are left alone. Returns the number removed.
    pub fn sweep(&self, now: DateTime<FixedOffset>, retention_days: u32) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "push record sweep skipped");
                return 0;
            }
        };

        let today = now.date_naive();
        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(date) = name
                .strip_prefix(FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
                .and_then(parse_date_key)
            else {
                continue;
            };

            let age_days = (today - date).num_days();
            if age_days <= i64::from(retention_days) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    removed += 1;
                    tracing::info!(file = name, age_days, "expired push record removed");
                }
                Err(e) => tracing::warn!(file = name, error = %e, "failed to remove push record"),
            }
        }
        if removed > 0 {
            metrics::counter!("push_records_purged_total").increment(removed as u64);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::shanghai_offset;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<FixedOffset> {
        shanghai_offset().with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn record_then_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PushRecordStore::open(tmp.path().join("records"), 7, at(2025, 5, 1, 9)).unwrap();
        assert!(!store.has_pushed_on(at(2025, 5, 1, 9).date_naive()));

        let path = store.record(at(2025, 5, 1, 9), "daily").unwrap();
        assert!(path.ends_with("push_record_20250501.json"));
        let rec = store.load(at(2025, 5, 1, 9).date_naive()).unwrap();
        assert!(rec.pushed);
        assert_eq!(rec.push_time, "2025-05-01 09:00:00");
        assert_eq!(rec.report_type, "daily");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_record_reads_as_not_pushed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PushRecordStore::open(tmp.path(), 7, at(2025, 5, 1, 9)).unwrap();
        let day = at(2025, 5, 1, 9).date_naive();
        fs::write(store.path_for(day), "{not json").unwrap();
        assert!(!store.has_pushed_on(day));
    }

    #[test]
    fn sweep_uses_whole_day_difference() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        for name in [
            "push_record_20250420.json", // 11 days old
            "push_record_20250423.json", // 8 days old
            "push_record_20250424.json", // 7 days old, kept
            "push_record_20250501.json",
            "push_record_garbage.json",
            "notes.txt",
        ] {
            fs::write(dir.join(name), "{}").unwrap();
        }

        let store = PushRecordStore { dir: dir.to_path_buf() };
        let removed = store.sweep(at(2025, 5, 1, 23), 7);
        assert_eq!(removed, 2);
        assert!(!dir.join("push_record_20250420.json").exists());
        assert!(!dir.join("push_record_20250423.json").exists());
        assert!(dir.join("push_record_20250424.json").exists());
        assert!(dir.join("push_record_20250501.json").exists());
        assert!(dir.join("push_record_garbage.json").exists());
        assert!(dir.join("notes.txt").exists());
    }
}
