//! Change detection between stored translations and an incoming snapshot
//!
//! Classification is pure: no database access, no clock. Callers load the
//! current keys for an interface, hand over the flat payload map, and get
//! back four buckets describing what an import would do.

use lexsync_common::models::{join_full_key, split_full_key, KeyWithValues};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// A key the store has never seen, with every locale value it arrived with
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewKey {
    pub key: String,
    pub group: Option<String>,
    pub full_key: String,
    pub locales: BTreeMap<String, String>,
}

/// An existing value whose incoming text differs from the stored text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatedValue {
    pub key_id: i64,
    pub key: String,
    pub group: Option<String>,
    pub locale: String,
    pub old_value: String,
    pub new_value: String,
}

/// A locale the key exists for but has no stored value yet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewValue {
    pub key_id: i64,
    pub key: String,
    pub group: Option<String>,
    pub locale: String,
    pub value: String,
}

/// A value identical on both sides
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnchangedValue {
    pub key: String,
    pub group: Option<String>,
    pub locale: String,
    pub value: String,
}

/// Everything an import would create, update, or leave alone
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeSet {
    pub new_keys: Vec<NewKey>,
    pub updated_values: Vec<UpdatedValue>,
    pub new_values: Vec<NewValue>,
    pub unchanged: Vec<UnchangedValue>,
}

impl ChangeSet {
    /// Reclassify every update as unchanged, keeping the stored value.
    ///
    /// Applied before a non-destructive import so existing translations
    /// survive even when the payload carries different text.
    pub fn keep_existing_values(&mut self) {
        for updated in self.updated_values.drain(..) {
            self.unchanged.push(UnchangedValue {
                key: updated.key,
                group: updated.group,
                locale: updated.locale,
                value: updated.old_value,
            });
        }
    }
}

/// Classify a flat `full_key -> locale -> value` snapshot against stored keys.
///
/// A full key absent from the store lands in `new_keys` exactly once with
/// its whole locale map; a full key with an empty locale map produces no
/// entry anywhere. Group segments `""` and `"0"` mean ungrouped.
pub fn detect_changes(
    existing: &[KeyWithValues],
    incoming: &BTreeMap<String, BTreeMap<String, String>>,
) -> ChangeSet {
    let by_full_key: HashMap<String, &KeyWithValues> =
        existing.iter().map(|k| (k.full_key(), k)).collect();

    let mut changes = ChangeSet::default();
    for (full_key, locale_values) in incoming {
        classify_key(full_key, locale_values, &by_full_key, &mut changes);
    }
    changes
}

fn classify_key(
    full_key: &str,
    locale_values: &BTreeMap<String, String>,
    by_full_key: &HashMap<String, &KeyWithValues>,
    changes: &mut ChangeSet,
) {
    let (group, key) = split_full_key(full_key);
    // Lookup must use the canonical form so "0.welcome" hits the stored "welcome"
    let canonical = join_full_key(group.as_deref(), &key);
    let mut key_added = false;

    for (locale, value) in locale_values {
        match by_full_key.get(&canonical) {
            Some(existing) => match existing.values.get(locale) {
                Some(stored) if stored != value => changes.updated_values.push(UpdatedValue {
                    key_id: existing.id,
                    key: key.to_string(),
                    group: group.clone(),
                    locale: locale.clone(),
                    old_value: stored.clone(),
                    new_value: value.clone(),
                }),
                Some(stored) => changes.unchanged.push(UnchangedValue {
                    key: key.to_string(),
                    group: group.clone(),
                    locale: locale.clone(),
                    value: stored.clone(),
                }),
                None => changes.new_values.push(NewValue {
                    key_id: existing.id,
                    key: key.to_string(),
                    group: group.clone(),
                    locale: locale.clone(),
                    value: value.clone(),
                }),
            },
            None if !key_added => {
                changes.new_keys.push(NewKey {
                    key: key.to_string(),
                    group: group.clone(),
                    full_key: canonical.clone(),
                    locales: locale_values.clone(),
                });
                key_added = true;
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(id: i64, key: &str, group: Option<&str>, values: &[(&str, &str)]) -> KeyWithValues {
        KeyWithValues {
            id,
            key: key.to_string(),
            group: group.map(str::to_string),
            values: values
                .iter()
                .map(|(l, v)| (l.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn payload(entries: &[(&str, &[(&str, &str)])]) -> BTreeMap<String, BTreeMap<String, String>> {
        entries
            .iter()
            .map(|(full_key, locales)| {
                (
                    full_key.to_string(),
                    locales
                        .iter()
                        .map(|(l, v)| (l.to_string(), v.to_string()))
                        .collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_unknown_key_recorded_once_with_all_locales() {
        let incoming = payload(&[(
            "auth.login",
            &[("en-GB", "Login"), ("fr-FR", "Connexion")],
        )]);
        let changes = detect_changes(&[], &incoming);

        assert_eq!(changes.new_keys.len(), 1);
        let new_key = &changes.new_keys[0];
        assert_eq!(new_key.key, "login");
        assert_eq!(new_key.group.as_deref(), Some("auth"));
        assert_eq!(new_key.full_key, "auth.login");
        assert_eq!(new_key.locales.len(), 2);
        assert!(changes.new_values.is_empty());
        assert!(changes.updated_values.is_empty());
        assert!(changes.unchanged.is_empty());
    }

    #[test]
    fn test_unknown_key_without_locales_is_dropped() {
        let incoming = payload(&[("auth.login", &[])]);
        let changes = detect_changes(&[], &incoming);

        assert!(changes.new_keys.is_empty());
        assert!(changes.unchanged.is_empty());
    }

    #[test]
    fn test_matching_value_is_unchanged() {
        let existing = vec![stored(7, "login", Some("auth"), &[("en-GB", "Login")])];
        let incoming = payload(&[("auth.login", &[("en-GB", "Login")])]);
        let changes = detect_changes(&existing, &incoming);

        assert_eq!(changes.unchanged.len(), 1);
        assert_eq!(changes.unchanged[0].key, "login");
        assert_eq!(changes.unchanged[0].value, "Login");
        assert!(changes.updated_values.is_empty());
    }

    #[test]
    fn test_differing_value_carries_old_and_new() {
        let existing = vec![stored(7, "login", Some("auth"), &[("en-GB", "Login")])];
        let incoming = payload(&[("auth.login", &[("en-GB", "Sign in")])]);
        let changes = detect_changes(&existing, &incoming);

        assert_eq!(changes.updated_values.len(), 1);
        let updated = &changes.updated_values[0];
        assert_eq!(updated.key_id, 7);
        assert_eq!(updated.old_value, "Login");
        assert_eq!(updated.new_value, "Sign in");
    }

    #[test]
    fn test_missing_locale_on_existing_key_is_new_value() {
        let existing = vec![stored(7, "login", Some("auth"), &[("en-GB", "Login")])];
        let incoming = payload(&[(
            "auth.login",
            &[("en-GB", "Login"), ("fr-FR", "Connexion")],
        )]);
        let changes = detect_changes(&existing, &incoming);

        assert_eq!(changes.new_values.len(), 1);
        assert_eq!(changes.new_values[0].key_id, 7);
        assert_eq!(changes.new_values[0].locale, "fr-FR");
        assert_eq!(changes.new_values[0].value, "Connexion");
        assert_eq!(changes.unchanged.len(), 1);
    }

    #[test]
    fn test_zero_group_segment_means_ungrouped() {
        let existing = vec![stored(3, "welcome", None, &[("en-GB", "Welcome")])];
        let incoming = payload(&[("0.welcome", &[("en-GB", "Welcome back")])]);
        let changes = detect_changes(&existing, &incoming);

        // "0." resolves to the ungrouped key, so this is an update, not a new key
        assert!(changes.new_keys.is_empty());
        assert_eq!(changes.updated_values.len(), 1);
        assert_eq!(changes.updated_values[0].group, None);
    }

    #[test]
    fn test_nested_group_keeps_all_but_last_segment() {
        let incoming = payload(&[("auth.errors.invalid", &[("en-GB", "Invalid")])]);
        let changes = detect_changes(&[], &incoming);

        assert_eq!(changes.new_keys[0].group.as_deref(), Some("auth.errors"));
        assert_eq!(changes.new_keys[0].key, "invalid");
    }

    #[test]
    fn test_keep_existing_values_moves_updates_to_unchanged() {
        let existing = vec![stored(7, "login", Some("auth"), &[("en-GB", "Login")])];
        let incoming = payload(&[("auth.login", &[("en-GB", "Sign in")])]);
        let mut changes = detect_changes(&existing, &incoming);

        changes.keep_existing_values();

        assert!(changes.updated_values.is_empty());
        assert_eq!(changes.unchanged.len(), 1);
        assert_eq!(changes.unchanged[0].value, "Login");
    }

    #[test]
    fn test_serialized_shape_uses_snake_case_fields() {
        let existing = vec![stored(7, "login", Some("auth"), &[("en-GB", "Login")])];
        let incoming = payload(&[("auth.login", &[("en-GB", "Sign in")])]);
        let changes = detect_changes(&existing, &incoming);

        let json = serde_json::to_value(&changes).unwrap();
        assert_eq!(json["updated_values"][0]["key_id"], 7);
        assert_eq!(json["updated_values"][0]["old_value"], "Login");
        assert_eq!(json["updated_values"][0]["new_value"], "Sign in");
    }
}
