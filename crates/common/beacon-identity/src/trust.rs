//! Trusted-key allowlist with atomic hot reload.
//!
//! The allowlist lives in a JSON file:
//!
//! ```json
//! [{"kid":"main-2025-q3","public_key":"<base64>","status":"active",
//!   "not_before":"2025-08-01T00:00:00Z","not_after":"2026-08-01T00:00:00Z"}]
//! ```
//!
//! Readers take an `Arc` of the current snapshot, so a reload never changes the
//! view of a verification that is already in progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Errors raised while loading the allowlist. Any of these rejects the whole file.
#[derive(Debug, Error)]
pub enum TrustRegistryError {
    #[error("trusted keys: read file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("trusted keys: parse json: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("trusted keys: entry {index} missing {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("trusted keys: entry {index} invalid status {status:?} (kid={kid})")]
    InvalidStatus { index: usize, status: String, kid: String },

    #[error("trusted keys: entry {index} invalid {field} (kid={kid})")]
    InvalidTimestamp { index: usize, field: &'static str, kid: String },

    #[error("trusted keys: entry {index} not_before after not_after (kid={kid})")]
    InvertedWindow { index: usize, kid: String },

    #[error("trusted keys: entry {index} invalid base64 public_key (kid={kid})")]
    InvalidPublicKey { index: usize, kid: String },

    #[error("trusted keys: duplicate kid {0:?}")]
    DuplicateKid(String),

    #[error("trusted keys: duplicate public_key for kid {0:?}")]
    DuplicatePublicKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedKey {
    pub kid: String,
    pub public_key: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrustStatus {
    Trusted,
    Revoked,
    Expired,
    NotYetValid,
    Unknown,
}

impl TrustStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TrustStatus::Trusted => "trusted",
            TrustStatus::Revoked => "revoked",
            TrustStatus::Expired => "expired",
            TrustStatus::NotYetValid => "not_yet_valid",
            TrustStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TrustStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: TrustedKey,
    not_before: Option<DateTime<Utc>>,
    not_after: Option<DateTime<Utc>>,
}

/// Immutable view of the allowlist at one point in time.
#[derive(Debug, Default)]
pub struct TrustSnapshot {
    by_public_key: HashMap<String, Entry>,
    by_kid: HashMap<String, String>,
}

impl TrustSnapshot {
    pub fn from_entries(entries: Vec<TrustedKey>) -> Result<Self, TrustRegistryError> {
        let mut snapshot = TrustSnapshot::default();
        let mut seen_pk = HashSet::new();

        for (index, key) in entries.into_iter().enumerate() {
            if key.kid.is_empty() {
                return Err(TrustRegistryError::MissingField { index, field: "kid" });
            }
            if key.public_key.is_empty() {
                return Err(TrustRegistryError::MissingField { index, field: "public_key" });
            }
            if !key.status.is_empty() && key.status != "active" && key.status != "revoked" {
                return Err(TrustRegistryError::InvalidStatus {
                    index,
                    status: key.status.clone(),
                    kid: key.kid.clone(),
                });
            }
            let not_before = parse_bound(key.not_before.as_deref(), index, "not_before", &key.kid)?;
            let not_after = parse_bound(key.not_after.as_deref(), index, "not_after", &key.kid)?;
            if let (Some(nb), Some(na)) = (not_before, not_after) {
                if nb > na {
                    return Err(TrustRegistryError::InvertedWindow { index, kid: key.kid.clone() });
                }
            }
            if beacon_crypto::decode_public_key(&key.public_key).is_err() {
                return Err(TrustRegistryError::InvalidPublicKey { index, kid: key.kid.clone() });
            }
            if snapshot.by_kid.contains_key(&key.kid) {
                return Err(TrustRegistryError::DuplicateKid(key.kid.clone()));
            }
            if !seen_pk.insert(key.public_key.clone()) {
                return Err(TrustRegistryError::DuplicatePublicKey(key.kid.clone()));
            }

            snapshot.by_kid.insert(key.kid.clone(), key.public_key.clone());
            snapshot.by_public_key.insert(
                key.public_key.clone(),
                Entry { key, not_before, not_after },
            );
        }
        Ok(snapshot)
    }

    pub fn by_public_key(&self, public_key: &str) -> Option<&TrustedKey> {
        self.by_public_key.get(public_key).map(|e| &e.key)
    }

    pub fn by_kid(&self, kid: &str) -> Option<&TrustedKey> {
        self.by_kid.get(kid).and_then(|pk| self.by_public_key(pk))
    }

    /// Evaluates a public key against the allowlist at `now`.
    pub fn evaluate(&self, public_key: &str, now: DateTime<Utc>) -> TrustStatus {
        let Some(entry) = self.by_public_key.get(public_key) else {
            return TrustStatus::Unknown;
        };
        if entry.key.status == "revoked" {
            return TrustStatus::Revoked;
        }
        if entry.not_before.map_or(false, |nb| now < nb) {
            return TrustStatus::NotYetValid;
        }
        if entry.not_after.map_or(false, |na| now > na) {
            return TrustStatus::Expired;
        }
        TrustStatus::Trusted
    }

    pub fn len(&self) -> usize {
        self.by_public_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_public_key.is_empty()
    }
}

fn parse_bound(
    raw: Option<&str>,
    index: usize,
    field: &'static str,
    kid: &str,
) -> Result<Option<DateTime<Utc>>, TrustRegistryError> {
    match raw.filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| TrustRegistryError::InvalidTimestamp {
                index,
                field,
                kid: kid.to_string(),
            }),
    }
}

/// Process-wide allowlist service.
#[derive(Debug)]
pub struct TrustedKeyRegistry {
    path: Option<PathBuf>,
    current: RwLock<Arc<TrustSnapshot>>,
}

impl TrustedKeyRegistry {
    /// Registry with no backing file; always empty unless replaced.
    pub fn empty() -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(TrustSnapshot::default())),
        }
    }

    pub fn from_snapshot(snapshot: TrustSnapshot) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Loads the allowlist from `path`. A missing file yields an empty registry.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, TrustRegistryError> {
        let path = path.into();
        let snapshot = read_snapshot(&path)?;
        tracing::info!("Loaded {} trusted keys from {:?}", snapshot.len(), path);
        Ok(Self {
            path: Some(path),
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Current snapshot. Cheap; holds the read lock only to clone the `Arc`.
    pub fn snapshot(&self) -> Arc<TrustSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn evaluate(&self, public_key: &str, now: DateTime<Utc>) -> TrustStatus {
        self.snapshot().evaluate(public_key, now)
    }

    pub fn replace(&self, snapshot: TrustSnapshot) {
        let next = Arc::new(snapshot);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Re-reads the backing file. On error the previous snapshot stays active.
    pub fn reload(&self) -> Result<usize, TrustRegistryError> {
        let Some(path) = &self.path else {
            return Ok(self.snapshot().len());
        };
        let snapshot = read_snapshot(path)?;
        let count = snapshot.len();
        self.replace(snapshot);
        Ok(count)
    }

    /// Spawns a task reloading the allowlist every `interval` until `shutdown`
    /// flips to `true` or its sender is dropped. `on_reload` sees every outcome.
    pub fn spawn_reloader<F>(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
        on_reload: F,
    ) -> JoinHandle<()>
    where
        F: Fn(&Result<usize, TrustRegistryError>) + Send + Sync + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let result = self.reload();
                        match &result {
                            Ok(count) => tracing::debug!("Reloaded trusted keys ({} entries)", count),
                            Err(e) => tracing::warn!("Trusted key reload failed, keeping previous set: {}", e),
                        }
                        on_reload(&result);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!("Trusted key reloader stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}

fn read_snapshot(path: &Path) -> Result<TrustSnapshot, TrustRegistryError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Trusted keys file {:?} not found; allowlist is empty", path);
            return Ok(TrustSnapshot::default());
        }
        Err(source) => {
            return Err(TrustRegistryError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let entries: Vec<TrustedKey> = serde_json::from_slice(&bytes)?;
    TrustSnapshot::from_entries(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;
    use assert_matches::assert_matches;
    use chrono::Duration as ChronoDuration;

    fn key(kid: &str, pk: &str) -> TrustedKey {
        TrustedKey {
            kid: kid.into(),
            public_key: pk.into(),
            status: "active".into(),
            not_before: None,
            not_after: None,
        }
    }

    #[test]
    fn evaluate_covers_every_status() {
        let now = Utc::now();
        let a = KeyPair::generate().public_key_base64();
        let b = KeyPair::generate().public_key_base64();
        let c = KeyPair::generate().public_key_base64();
        let d = KeyPair::generate().public_key_base64();
        let mut revoked = key("b", &b);
        revoked.status = "revoked".into();
        let mut future = key("c", &c);
        future.not_before = Some((now + ChronoDuration::days(1)).to_rfc3339());
        let mut past = key("d", &d);
        past.not_after = Some((now - ChronoDuration::days(1)).to_rfc3339());

        let snap = TrustSnapshot::from_entries(vec![key("a", &a), revoked, future, past]).unwrap();
        assert_eq!(snap.evaluate(&a, now), TrustStatus::Trusted);
        assert_eq!(snap.evaluate(&b, now), TrustStatus::Revoked);
        assert_eq!(snap.evaluate(&c, now), TrustStatus::NotYetValid);
        assert_eq!(snap.evaluate(&d, now), TrustStatus::Expired);
        assert_eq!(snap.evaluate("nope", now), TrustStatus::Unknown);
        assert_eq!(snap.by_kid("a").map(|k| k.public_key.as_str()), Some(a.as_str()));
    }

    #[test]
    fn rejects_invalid_entries() {
        let a = KeyPair::generate().public_key_base64();
        assert_matches!(
            TrustSnapshot::from_entries(vec![key("a", &a), key("a", &KeyPair::generate().public_key_base64())]),
            Err(TrustRegistryError::DuplicateKid(_))
        );
        assert_matches!(
            TrustSnapshot::from_entries(vec![key("a", &a), key("b", &a)]),
            Err(TrustRegistryError::DuplicatePublicKey(_))
        );
        let mut bad = key("a", &a);
        bad.status = "maybe".into();
        assert_matches!(
            TrustSnapshot::from_entries(vec![bad]),
            Err(TrustRegistryError::InvalidStatus { .. })
        );
        let mut inverted = key("a", &a);
        inverted.not_before = Some("2026-01-01T00:00:00Z".into());
        inverted.not_after = Some("2025-01-01T00:00:00Z".into());
        assert_matches!(
            TrustSnapshot::from_entries(vec![inverted]),
            Err(TrustRegistryError::InvertedWindow { .. })
        );
        assert_matches!(
            TrustSnapshot::from_entries(vec![key("a", "%%%")]),
            Err(TrustRegistryError::InvalidPublicKey { .. })
        );
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TrustedKeyRegistry::load(dir.path().join("absent.json")).unwrap();
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn reload_keeps_previous_snapshot_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let a = KeyPair::generate().public_key_base64();
        std::fs::write(&path, serde_json::to_vec(&vec![key("a", &a)]).unwrap()).unwrap();

        let registry = TrustedKeyRegistry::load(&path).unwrap();
        let held = registry.snapshot();
        assert_eq!(registry.evaluate(&a, Utc::now()), TrustStatus::Trusted);

        std::fs::write(&path, b"not json").unwrap();
        assert!(registry.reload().is_err());
        assert_eq!(registry.evaluate(&a, Utc::now()), TrustStatus::Trusted);

        let mut revoked = key("a", &a);
        revoked.status = "revoked".into();
        std::fs::write(&path, serde_json::to_vec(&vec![revoked]).unwrap()).unwrap();
        assert_eq!(registry.reload().unwrap(), 1);
        assert_eq!(registry.evaluate(&a, Utc::now()), TrustStatus::Revoked);
        // a snapshot taken before the reload is unaffected
        assert_eq!(held.evaluate(&a, Utc::now()), TrustStatus::Trusted);
    }
}
