//! Per-id async mutual exclusion.
//!
//! Every mutating flow holds the target id's lock across the whole
//! read → transition → persist sequence, so the persisted row always
//! matches the transition that produced it. Acquisition waits behind the
//! current holder instead of failing. Entries are interned on first use and
//! never evicted; the id space is bounded by live sessions and attempts.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Interning map of `id → async mutex`.
///
/// Session flows key one map by session id; attempt flows key a separate
/// map by attempt id, so the two scopes serialize independently.
#[derive(Default)]
pub struct LockMap {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `id`, waiting behind any current holder.
    pub async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Number of ids interned so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no id has been interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
