//! Export of stored translations back into the flat JSON shape
//!
//! The output is the inverse of what the import pipeline consumes, so an
//! export fed straight back into an import classifies everything unchanged.

use chrono::{DateTime, Utc};
use lexsync_common::time::{Clock, SystemClock};
use lexsync_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::db;

/// Flat snapshot of one interface's translations
#[derive(Debug, Clone, Serialize)]
pub struct ExportDocument {
    pub interface: String,
    pub exported_at: DateTime<Utc>,
    pub total_keys: usize,
    pub locales: Vec<String>,
    pub translations: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Clone)]
pub struct ExportEngine {
    pool: SqlitePool,
    fallback_locales: BTreeMap<String, String>,
    clock: Arc<dyn Clock>,
}

impl ExportEngine {
    pub fn new(pool: SqlitePool, fallback_locales: BTreeMap<String, String>) -> Self {
        Self::with_clock(pool, fallback_locales, Arc::new(SystemClock))
    }

    pub fn with_clock(
        pool: SqlitePool,
        fallback_locales: BTreeMap<String, String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            fallback_locales,
            clock,
        }
    }

    /// Export all translations for an interface, optionally narrowed to one
    /// locale.
    ///
    /// With a locale filter, a key lacking that locale falls back to the
    /// configured substitute locale and emits the value under the substitute's
    /// name. Keys resolving no value at all are omitted.
    pub async fn execute(
        &self,
        interface: &str,
        locale: Option<&str>,
    ) -> Result<ExportDocument> {
        let keys = db::keys::load_keys_with_values(&self.pool, interface).await?;

        let present: BTreeSet<String> = keys
            .iter()
            .flat_map(|k| k.values.keys().cloned())
            .collect();
        let selected: Vec<&str> = match locale {
            Some(wanted) if present.contains(wanted) => vec![wanted],
            Some(_) => Vec::new(),
            None => present.iter().map(String::as_str).collect(),
        };

        let mut translations: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for key in &keys {
            let mut resolved: BTreeMap<String, String> = BTreeMap::new();
            for sel in &selected {
                if let Some(value) = key.values.get(*sel) {
                    resolved.insert((*sel).to_string(), value.clone());
                } else if let Some(fallback) = self.fallback_locales.get(*sel) {
                    if let Some(value) = key.values.get(fallback) {
                        resolved.insert(fallback.clone(), value.clone());
                    }
                }
            }
            if !resolved.is_empty() {
                translations.insert(key.full_key(), resolved);
            }
        }

        let document = ExportDocument {
            interface: interface.to_string(),
            exported_at: self.clock.now(),
            total_keys: translations.len(),
            locales: present.into_iter().collect(),
            translations,
        };
        tracing::debug!(
            interface = %interface,
            total_keys = document.total_keys,
            "Exported translations"
        );
        Ok(document)
    }
}
