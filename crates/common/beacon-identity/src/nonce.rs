use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Single-use nonce set keyed by `(public_key, nonce)`.
///
/// `check_and_insert` runs under one lock, so two concurrent requests carrying the
/// same pair can never both succeed.
#[derive(Debug)]
pub struct NonceStore {
    retention: Duration,
    seen: Mutex<HashMap<(String, String), DateTime<Utc>>>,
}

impl NonceStore {
    pub fn new(retention: std::time::Duration) -> Self {
        Self {
            retention: Duration::from_std(retention).unwrap_or_else(|_| Duration::minutes(15)),
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Records the pair and returns `true` if it was not already live.
    pub fn check_and_insert(&self, public_key: &str, nonce: &str, now: DateTime<Utc>) -> bool {
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let key = (public_key.to_string(), nonce.to_string());
        if let Some(recorded) = seen.get(&key) {
            if now - *recorded < self.retention {
                return false;
            }
        }
        seen.insert(key, now);
        if seen.len() % 1024 == 0 {
            let cutoff = now - self.retention;
            seen.retain(|_, t| *t >= cutoff);
        }
        true
    }

    /// Drops every entry older than the retention window.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = seen.len();
        let cutoff = now - self.retention;
        seen.retain(|_, t| *t >= cutoff);
        before - seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
