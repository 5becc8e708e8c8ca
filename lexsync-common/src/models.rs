//! Translation domain models

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Interfaces served when the configuration does not name any
pub const DEFAULT_INTERFACES: [&str; 3] = ["mobile", "web_financer", "web_beneficiary"];

/// Lifecycle states of a tracked migration
///
/// Transitions: pending -> processing -> completed | failed,
/// completed -> rolled_back. Terminal states are never re-entered by the
/// apply pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    RolledBack,
}

impl MigrationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MigrationStatus::Pending => "pending",
            MigrationStatus::Processing => "processing",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Failed => "failed",
            MigrationStatus::RolledBack => "rolled_back",
        }
    }
}

impl FromStr for MigrationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(MigrationStatus::Pending),
            "processing" => Ok(MigrationStatus::Processing),
            "completed" => Ok(MigrationStatus::Completed),
            "failed" => Ok(MigrationStatus::Failed),
            "rolled_back" => Ok(MigrationStatus::RolledBack),
            other => Err(Error::Validation(format!(
                "unknown migration status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A translation key scoped to one interface
///
/// `group` is `None` for ungrouped keys; the store encodes that as an empty
/// string so the (key, group, interface_origin) UNIQUE constraint holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationKey {
    pub id: i64,
    pub key: String,
    pub group: Option<String>,
    pub interface_origin: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TranslationKey {
    /// Dotted form consumers address this key by
    pub fn full_key(&self) -> String {
        join_full_key(self.group.as_deref(), &self.key)
    }
}

/// One locale's text for a translation key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationValue {
    pub id: i64,
    pub translation_key_id: i64,
    pub locale: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A key with its locale/value rows, as loaded for diffing and export
#[derive(Debug, Clone)]
pub struct KeyWithValues {
    pub id: i64,
    pub key: String,
    pub group: Option<String>,
    pub values: BTreeMap<String, String>,
}

impl KeyWithValues {
    pub fn full_key(&self) -> String {
        join_full_key(self.group.as_deref(), &self.key)
    }
}

/// A migration file tracked against the object archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationMigration {
    pub id: i64,
    pub filename: String,
    pub interface_origin: String,
    pub version: String,
    pub checksum: String,
    pub status: MigrationStatus,
    pub batch_number: Option<i64>,
    pub metadata: Option<serde_json::Value>,
    pub applied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TranslationMigration {
    /// Full archive path of the tracked file
    pub fn archive_path(&self) -> String {
        format!("migrations/{}/{}", self.interface_origin, self.filename)
    }
}

/// Compose the dotted full key from an optional group and the final segment
pub fn join_full_key(group: Option<&str>, key: &str) -> String {
    match group {
        Some(g) if !g.is_empty() => format!("{}.{}", g, key),
        _ => key.to_string(),
    }
}

/// Split a dotted full key into (group, key)
///
/// The last segment is the key, everything before it the group. Empty and
/// literal "0" groups normalize to no group.
pub fn split_full_key(full_key: &str) -> (Option<String>, String) {
    match full_key.rsplit_once('.') {
        Some((group, key)) if !matches!(group, "" | "0") => {
            (Some(group.to_string()), key.to_string())
        }
        Some((_, key)) => (None, key.to_string()),
        None => (None, full_key.to_string()),
    }
}
