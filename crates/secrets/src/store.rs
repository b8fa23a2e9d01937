//! Per-project secret vault.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;

use nx_domain::error::{Error, Result};
use nx_domain::id::ProjectId;

use crate::cipher::{Sealed, SecretCipher};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct SecretRow {
    sealed: Sealed,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Metadata-only view of a secret. Values are never listed.
#[derive(Debug, Clone, Serialize)]
pub struct SecretMeta {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Thread-safe vault keyed by `(project, key)`.
///
/// `get` is the only path that produces plaintext; callers use it
/// inside a single function scope and drop the value immediately.
pub struct SecretStore {
    cipher: SecretCipher,
    rows: RwLock<HashMap<(ProjectId, String), SecretRow>>,
    key_pattern: Regex,
}

impl SecretStore {
    pub fn new(cipher: SecretCipher) -> Self {
        Self {
            cipher,
            rows: RwLock::new(HashMap::new()),
            key_pattern: Regex::new(r"^[A-Z0-9_]{1,128}$").expect("static regex"),
        }
    }

    /// Encrypt and store a value. Replaces any previous value for the
    /// same key, preserving `created_at`.
    pub fn set(
        &self,
        project: &ProjectId,
        key: &str,
        value: &str,
        description: Option<String>,
    ) -> Result<()> {
        self.validate_key(key)?;
        let sealed = self.cipher.seal(value)?;
        let now = Utc::now();

        let mut rows = self.rows.write();
        match rows.entry((project.clone(), key.to_owned())) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                let row = e.get_mut();
                row.sealed = sealed;
                row.updated_at = now;
                if description.is_some() {
                    row.description = description;
                }
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(SecretRow {
                    sealed,
                    description,
                    created_at: now,
                    updated_at: now,
                });
            }
        }
        tracing::debug!(project = %project, key, "secret stored");
        Ok(())
    }

    /// Decrypt and return the plaintext.
    pub fn get(&self, project: &ProjectId, key: &str) -> Result<String> {
        let rows = self.rows.read();
        let row = rows
            .get(&(project.clone(), key.to_owned()))
            .ok_or_else(|| Error::SecretNotFound(key.to_owned()))?;
        self.cipher.open(&row.sealed)
    }

    pub fn exists(&self, project: &ProjectId, key: &str) -> bool {
        self.rows
            .read()
            .contains_key(&(project.clone(), key.to_owned()))
    }

    /// Remove a secret. Returns `false` (not an error) when absent.
    pub fn delete(&self, project: &ProjectId, key: &str) -> bool {
        self.rows
            .write()
            .remove(&(project.clone(), key.to_owned()))
            .is_some()
    }

    /// List metadata for one project's secrets, sorted by key.
    pub fn list(&self, project: &ProjectId) -> Vec<SecretMeta> {
        let rows = self.rows.read();
        let mut out: Vec<SecretMeta> = rows
            .iter()
            .filter(|((p, _), _)| p == project)
            .map(|((_, key), row)| SecretMeta {
                key: key.clone(),
                description: row.description.clone(),
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    fn validate_key(&self, key: &str) -> Result<()> {
        if self.key_pattern.is_match(key) {
            Ok(())
        } else {
            Err(Error::validation(
                "key",
                "must match ^[A-Z0-9_]+$ and be 1..128 characters",
            ))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::MasterKey;

    fn store() -> SecretStore {
        let key = MasterKey::from_hex(&"11".repeat(32)).unwrap();
        SecretStore::new(SecretCipher::new(&key))
    }

    fn project(id: &str) -> ProjectId {
        ProjectId::from(id)
    }

    #[test]
    fn set_get_round_trip() {
        let s = store();
        let p = project("p1");
        s.set(&p, "API", "tvly-123", None).unwrap();
        assert_eq!(s.get(&p, "API").unwrap(), "tvly-123");
    }

    #[test]
    fn get_missing_is_not_found() {
        let s = store();
        let err = s.get(&project("p1"), "NOPE").unwrap_err();
        assert_eq!(err.code(), "SECRET_NOT_FOUND");
    }

    #[test]
    fn projects_are_isolated() {
        let s = store();
        s.set(&project("p1"), "API", "value-a", None).unwrap();
        assert!(s.get(&project("p2"), "API").is_err());
        assert!(!s.exists(&project("p2"), "API"));
    }

    #[test]
    fn delete_returns_false_when_absent() {
        let s = store();
        let p = project("p1");
        assert!(!s.delete(&p, "API"));
        s.set(&p, "API", "v", None).unwrap();
        assert!(s.delete(&p, "API"));
        assert!(!s.delete(&p, "API"));
    }

    #[test]
    fn invalid_key_names_rejected() {
        let s = store();
        let p = project("p1");
        for bad in ["lowercase", "HAS SPACE", "DASH-KEY", "", "ünïcode"] {
            let err = s.set(&p, bad, "v", None).unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR", "key {bad:?} should fail");
        }
        let long = "A".repeat(129);
        assert!(s.set(&p, &long, "v", None).is_err());
    }

    #[test]
    fn overwrite_preserves_created_at() {
        let s = store();
        let p = project("p1");
        s.set(&p, "TOKEN", "first", Some("a token".into())).unwrap();
        let before = s.list(&p)[0].created_at;
        s.set(&p, "TOKEN", "second", None).unwrap();
        let metas = s.list(&p);
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].created_at, before);
        assert_eq!(metas[0].description.as_deref(), Some("a token"));
        assert_eq!(s.get(&p, "TOKEN").unwrap(), "second");
    }

    #[test]
    fn list_never_contains_values() {
        let s = store();
        let p = project("p1");
        s.set(&p, "API_KEY", "super-secret-value", None).unwrap();
        let json = serde_json::to_string(&s.list(&p)).unwrap();
        assert!(!json.contains("super-secret-value"));
    }

    #[test]
    fn list_is_sorted_by_key() {
        let s = store();
        let p = project("p1");
        s.set(&p, "ZED", "1", None).unwrap();
        s.set(&p, "ALPHA", "2", None).unwrap();
        let keys: Vec<String> = s.list(&p).into_iter().map(|m| m.key).collect();
        assert_eq!(keys, vec!["ALPHA", "ZED"]);
    }
}
