use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Sliding-window attempt counter, kept in process memory.
/// Used to throttle repeated failed logins for the same account.
pub struct RateLimiter {
    max_attempts: usize,
    window: Duration,
    entries: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        RateLimiter {
            max_attempts: max_attempts.max(1),
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Vec<Instant>>> {
        // a poisoned map only holds timestamps, keep using it
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True while `key` has attempts left in the current window.
    pub fn allows(&self, key: &str) -> bool {
        let cutoff = Instant::now() - self.window;
        let mut map = self.entries();
        let Some(attempts) = map.get_mut(key) else {
            return true;
        };
        attempts.retain(|t| *t > cutoff);
        if attempts.is_empty() {
            map.remove(key);
            return true;
        }
        attempts.len() < self.max_attempts
    }

    pub fn record_failure(&self, key: &str) {
        self.cleanup();
        let mut map = self.entries();
        map.entry(key.to_string()).or_default().push(Instant::now());
    }

    /// Drop every key whose attempts have all left the window.
    pub fn cleanup(&self) {
        let cutoff = Instant::now() - self.window;
        self.entries().retain(|_, attempts| {
            attempts.retain(|t| *t > cutoff);
            !attempts.is_empty()
        });
    }

    #[cfg(test)]
    pub fn tracked_keys(&self) -> usize {
        self.entries().len()
    }

    pub fn reset(&self, key: &str) {
        self.entries().remove(key);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        RateLimiter::new(5, Duration::from_secs(15 * 60))
    }
}
