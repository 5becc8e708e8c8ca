//! Repositories over the translation schema

pub mod keys;
pub mod migrations;
pub mod values;

use chrono::{DateTime, NaiveDateTime, Utc};
use lexsync_common::{Error, Result};

/// Column encoding of an optional group: '' means no group
pub(crate) fn group_to_db(group: Option<&str>) -> &str {
    group.unwrap_or("")
}

pub(crate) fn group_from_db(raw: String) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw)
    }
}

/// Parse a stored timestamp
///
/// Rows written by this service carry RFC 3339; rows from SQLite's
/// CURRENT_TIMESTAMP default carry `YYYY-MM-DD HH:MM:SS`.
pub(crate) fn parse_db_time(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::Internal(format!("unparseable timestamp '{}': {}", raw, e)))
}
