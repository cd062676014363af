// Nonce replay protection

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long a used nonce is remembered
pub const NONCE_TTL: Duration = Duration::from_secs(60 * 60);

pub trait NonceStore: Send + Sync {
    fn seen(&self, nonce: &str) -> bool;
    fn remember(&self, nonce: &str, ttl: Duration);
}

/// Process-local nonce store; expired entries are pruned on write
#[derive(Default)]
pub struct MemoryNonceStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instant>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl NonceStore for MemoryNonceStore {
    fn seen(&self, nonce: &str) -> bool {
        self.lock()
            .get(nonce)
            .map(|expires| *expires > Instant::now())
            .unwrap_or(false)
    }

    fn remember(&self, nonce: &str, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.lock();
        entries.retain(|_, expires| *expires > now);
        entries.insert(nonce.to_string(), now + ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_until_expiry() {
        let store = MemoryNonceStore::new();
        assert!(!store.seen("abc"));
        store.remember("abc", NONCE_TTL);
        assert!(store.seen("abc"));
        assert!(!store.seen("def"));
    }

    #[test]
    fn expired_entries_are_forgotten() {
        let store = MemoryNonceStore::new();
        store.remember("old", Duration::from_millis(0));
        assert!(!store.seen("old"));
        store.remember("new", NONCE_TTL);
        assert_eq!(store.len(), 1);
    }
}
