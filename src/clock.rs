// src/clock.rs
//! Wall-clock helpers pinned to Asia/Shanghai.
//!
//! Shanghai has had no DST since 1991, so a fixed UTC+08:00 offset is exact for
//! every date the push-record store can see.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

const SHANGHAI_OFFSET_SECS: i32 = 8 * 3600;

pub fn shanghai_offset() -> FixedOffset {
    // east_opt only fails outside +/-24h
    FixedOffset::east_opt(SHANGHAI_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Current time in Asia/Shanghai.
pub fn beijing_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&shanghai_offset())
}

/// `HH:MM`, zero padded. Used for push-window comparison.
pub fn time_of_day(now: &DateTime<FixedOffset>) -> String {
    now.format("%H:%M").to_string()
}

/// `YYYYMMDD` key used in push-record file names.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    if key.len() != 8 || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(key, "%Y%m%d").ok()
}

/// `YYYY-MM-DD HH:MM:SS`, the format stored in push records.
pub fn format_timestamp(now: &DateTime<FixedOffset>) -> String {
    now.format("%Y-%m-%d %H:%M:%S").to_string()
}
