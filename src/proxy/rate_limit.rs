// Fixed-window rate limiting for console executions

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

#[derive(Debug)]
struct Window {
    started: Instant,
    hits: u32,
}

/// Per-key counters; each key has its own lock
pub struct RateLimiter {
    max: u32,
    window: Duration,
    windows: RwLock<HashMap<String, Arc<Mutex<Window>>>>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max, Duration::from_secs(config.window_minutes.max(1) * 60))
    }

    /// Count one hit for `key`; `Err(seconds)` until the window resets when over the limit
    pub fn hit(&self, key: &str) -> Result<(), u64> {
        self.hit_at(key, Instant::now())
    }

    pub fn hit_at(&self, key: &str, now: Instant) -> Result<(), u64> {
        if self.max == 0 {
            return Ok(());
        }
        let slot = self.slot(key, now);
        let mut window = match slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let elapsed = now.saturating_duration_since(window.started);
        if elapsed >= self.window {
            window.started = now;
            window.hits = 0;
        }
        if window.hits >= self.max {
            let remaining = self.window.saturating_sub(now.saturating_duration_since(window.started));
            return Err(remaining.as_secs().max(1));
        }
        window.hits += 1;
        Ok(())
    }

    /// Number of tracked caller windows
    pub fn tracked(&self) -> usize {
        match self.windows.read() {
            Ok(windows) => windows.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn expired(&self, slot: &Mutex<Window>, now: Instant) -> bool {
        match slot.lock() {
            Ok(window) => now.saturating_duration_since(window.started) >= self.window,
            Err(_) => true,
        }
    }

    fn slot(&self, key: &str, now: Instant) -> Arc<Mutex<Window>> {
        if let Ok(windows) = self.windows.read() {
            if let Some(slot) = windows.get(key) {
                return Arc::clone(slot);
            }
        }
        let mut windows = match self.windows.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // only slots nobody else holds; clones are taken under this lock
        windows.retain(|_, slot| Arc::strong_count(slot) > 1 || !self.expired(slot, now));
        Arc::clone(windows.entry(key.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(Window {
                started: now,
                hits: 0,
            }))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_per_key() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.hit_at("10.0.0.1", now).is_ok());
        assert!(limiter.hit_at("10.0.0.1", now).is_ok());
        assert!(limiter.hit_at("10.0.0.1", now).is_err());
        assert!(limiter.hit_at("10.0.0.2", now).is_ok());
    }

    #[test]
    fn window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.hit_at("a", now).is_ok());
        assert_eq!(limiter.hit_at("a", now + Duration::from_secs(20)), Err(40));
        assert!(limiter.hit_at("a", now + Duration::from_secs(61)).is_ok());
    }

    #[test]
    fn expired_windows_are_evicted() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let now = Instant::now();
        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            assert!(limiter.hit_at(ip, now).is_ok());
        }
        assert_eq!(limiter.tracked(), 3);

        let later = now + Duration::from_secs(61);
        assert!(limiter.hit_at("10.0.0.4", later).is_ok());
        assert_eq!(limiter.tracked(), 1);

        // a live window survives the next insert
        assert!(limiter.hit_at("10.0.0.5", later + Duration::from_secs(1)).is_ok());
        assert_eq!(limiter.tracked(), 2);
    }

    #[test]
    fn zero_means_unlimited() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60));
        for _ in 0..100 {
            assert!(limiter.hit("a").is_ok());
        }
    }
}
