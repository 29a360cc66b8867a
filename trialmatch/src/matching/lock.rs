use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

/// Lock key shared by every engine instance in this process.
pub const MATCHING_RUN_LOCK_KEY: &str = "matching-run";

/// Mutual exclusion for full matching cycles. `try_acquire` never blocks,
/// `release` is idempotent, and `is_free` probes without holding.
pub trait RunLock: Send + Sync {
    fn try_acquire(&self) -> bool;
    fn release(&self);
    fn is_free(&self) -> bool;
}

static LOCK_REGISTRY: Lazy<Mutex<HashMap<String, bool>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Process-wide named lock. A crashed process frees it implicitly while its
/// `running` row survives, which is exactly what stale-run reconciliation
/// keys off.
pub struct ProcessLock {
    key: String,
}

impl ProcessLock {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Default for ProcessLock {
    fn default() -> Self {
        Self::new(MATCHING_RUN_LOCK_KEY)
    }
}

impl RunLock for ProcessLock {
    fn try_acquire(&self) -> bool {
        let mut registry = LOCK_REGISTRY.lock().expect("lock registry poisoned");
        let held = registry.entry(self.key.clone()).or_insert(false);
        if *held {
            false
        } else {
            *held = true;
            true
        }
    }

    fn release(&self) {
        let mut registry = LOCK_REGISTRY.lock().expect("lock registry poisoned");
        registry.insert(self.key.clone(), false);
    }

    fn is_free(&self) -> bool {
        let registry = LOCK_REGISTRY.lock().expect("lock registry poisoned");
        !registry.get(&self.key).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_acquire_and_release() {
        let lock = ProcessLock::new("test-lock-exclusive");
        assert!(lock.is_free());
        assert!(lock.try_acquire());
        assert!(!lock.is_free());
        assert!(!lock.try_acquire());

        lock.release();
        assert!(lock.is_free());
        assert!(lock.try_acquire());
        lock.release();
    }

    #[test]
    fn test_release_is_idempotent() {
        let lock = ProcessLock::new("test-lock-idempotent");
        lock.release();
        lock.release();
        assert!(lock.try_acquire());
        lock.release();
        lock.release();
        assert!(lock.is_free());
    }

    #[test]
    fn test_independent_keys() {
        let a = ProcessLock::new("test-lock-a");
        let b = ProcessLock::new("test-lock-b");
        assert!(a.try_acquire());
        assert!(b.try_acquire());
        a.release();
        b.release();
    }

    #[test]
    fn test_same_key_shares_state() {
        let a = ProcessLock::new("test-lock-shared");
        let b = ProcessLock::new("test-lock-shared");
        assert!(a.try_acquire());
        assert!(!b.try_acquire());
        assert!(!b.is_free());
        b.release();
        assert!(a.is_free());
    }
}
