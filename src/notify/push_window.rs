// src/notify/push_window.rs
//! Daily push window: a time-of-day range plus an optional once-per-day latch.
//!
//! Evaluated fresh on each run from configuration, the injected `now` and the
//! on-disk record. Range bounds are inclusive and compared as zero-padded
//! `HH:MM` strings, so a range must not cross midnight.

use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::path::PathBuf;

use crate::clock::time_of_day;
use crate::config::PushWindowConfig;
use crate::notify::push_record::PushRecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateState {
    ClosedByTime,
    ClosedAlreadySent,
    Open,
}

impl GateState {
    pub fn is_open(self) -> bool {
        matches!(self, GateState::Open)
    }
}

#[derive(Debug)]
pub struct PushWindowGate {
    cfg: PushWindowConfig,
    store: Option<PushRecordStore>,
}

impl PushWindowGate {
    /// With the window enabled this opens the record store, which runs the retention sweep.
    pub fn new(cfg: &PushWindowConfig, records_dir: impl Into<PathBuf>, now: DateTime<FixedOffset>) -> Result<Self> {
        let store = if cfg.enabled {
            Some(PushRecordStore::open(
                records_dir,
                cfg.push_record_retention_days,
                now,
            )?)
        } else {
            None
        };
        Ok(Self {
            cfg: cfg.clone(),
            store,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.cfg.enabled
    }

    pub fn store(&self) -> Option<&PushRecordStore> {
        self.store.as_ref()
    }

    pub fn check(&self, now: DateTime<FixedOffset>) -> GateState {
        let Some(store) = &self.store else {
            return GateState::Open;
        };

        let hhmm = time_of_day(&now);
        let range = &self.cfg.time_range;
        if hhmm.as_str() < range.start.as_str() || hhmm.as_str() > range.end.as_str() {
            tracing::info!(now = %hhmm, start = %range.start, end = %range.end, "outside push window");
            return GateState::ClosedByTime;
        }

        if self.cfg.once_per_day && store.has_pushed_on(now.date_naive()) {
            tracing::info!(date = %now.date_naive(), "digest already pushed today");
            return GateState::ClosedAlreadySent;
        }

        GateState::Open
    }

    /// Whether a dispatch attempt must be followed by [`record`](Self::record).
    pub fn records_pushes(&self) -> bool {
        self.cfg.enabled && self.cfg.once_per_day
    }

    /// Marks today as pushed. No-op unless the window and once-per-day are enabled.
    pub fn record(&self, now: DateTime<FixedOffset>, report_type: &str) -> Result<()> {
        if !self.records_pushes() {
            return Ok(());
        }
        if let Some(store) = &self.store {
            store.record(now, report_type)?;
        }
        Ok(())
    }
}
