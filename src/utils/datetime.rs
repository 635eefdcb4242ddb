//! Datetime parsing and formatting shared across the crate.
//!
//! All timestamps are stored in SQLite as UTC text in the fixed-width
//! `YYYY-MM-DD HH:MM:SS` format so that lexicographic comparison in SQL
//! matches chronological order. Parsing is tolerant of RFC3339 input so
//! rows written by other tooling still load.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DateTimeError {
    #[error("invalid datetime format: '{input}' - expected RFC3339 (2023-01-01T12:00:00Z) or SQLite (2023-01-01 12:00:00)")]
    InvalidFormat { input: String },
}

/// Centralized datetime parsing and formatting.
pub struct DateTimeParser;

impl DateTimeParser {
    /// Parse a datetime from the formats that appear in storage and on the API.
    ///
    /// Accepts RFC3339 with any offset, and naive `YYYY-MM-DD HH:MM:SS`
    /// (with optional fractional seconds) which is assumed to be UTC.
    pub fn parse_flexible(datetime_str: &str) -> Result<DateTime<Utc>, DateTimeError> {
        let trimmed = datetime_str.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(dt.with_timezone(&Utc));
        }

        let naive_formats = [
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%dT%H:%M:%S%.f",
        ];

        for format in &naive_formats {
            if let Ok(naive_dt) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(DateTime::from_naive_utc_and_offset(naive_dt, Utc));
            }
        }

        Err(DateTimeError::InvalidFormat {
            input: datetime_str.to_string(),
        })
    }

    /// Format a datetime for SQLite storage: `YYYY-MM-DD HH:MM:SS`.
    pub fn format_for_storage(dt: &DateTime<Utc>) -> String {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Format the UTC calendar date of a datetime: `YYYY-MM-DD`.
    ///
    /// Daily quota windows are keyed on this string.
    pub fn format_date(dt: &DateTime<Utc>) -> String {
        dt.format("%Y-%m-%d").to_string()
    }
}
