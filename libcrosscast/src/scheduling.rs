//! Schedule time parsing
//!
//! Turns the human-readable times accepted by the CLIs into UTC timestamps.
//! Three formats, tried in order: absolute ("2026-09-20 15:00"), relative
//! durations ("30m", "2h", "1 hour"), and natural language ("tomorrow 3pm").

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::{CrosscastError, Result};

const ABSOLUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Parse a schedule string into a UTC time.
///
/// # Errors
///
/// Returns `InvalidInput` when the string is empty or matches none of the
/// supported formats.
pub fn parse_schedule(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CrosscastError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(input, ABSOLUTE_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(offset) = humantime::parse_duration(input) {
        let delta = chrono::Duration::try_seconds(offset.as_secs() as i64).ok_or_else(|| {
            CrosscastError::InvalidInput(format!("Duration out of range: {}", input))
        })?;
        return Ok(Utc::now() + delta);
    }

    chrono_english::parse_date_string(input, Utc::now(), chrono_english::Dialect::Us).map_err(
        |_| CrosscastError::InvalidInput(format!("Unrecognized schedule time: {}", input)),
    )
}
