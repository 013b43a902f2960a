//! Failure and latency injection shared by the in-memory adapters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Controller for forcing failures and slowness in the adapters.
///
/// Every failure setting is a countdown, e.g. `fail_writes(2)` fails the next two writes and
/// lets the third through.
#[derive(Debug, Default)]
pub struct ErrorInjector {
    /// Fail the next N commits.
    fail_next_commits: AtomicUsize,
    /// Fail the next N sink writes.
    fail_next_writes: AtomicUsize,
    /// Fail the next N store gets.
    fail_next_gets: AtomicUsize,
    /// Fail the next N store sets.
    fail_next_sets: AtomicUsize,
    /// Fail the next N store deletes.
    fail_next_deletes: AtomicUsize,
    commit_latency_ms: AtomicU64,
    write_latency_ms: AtomicU64,
    set_latency_ms: AtomicU64,
}

impl ErrorInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_commits(&self, count: usize) {
        self.fail_next_commits.store(count, Ordering::Relaxed);
    }

    pub fn fail_writes(&self, count: usize) {
        self.fail_next_writes.store(count, Ordering::Relaxed);
    }

    pub fn fail_gets(&self, count: usize) {
        self.fail_next_gets.store(count, Ordering::Relaxed);
    }

    pub fn fail_sets(&self, count: usize) {
        self.fail_next_sets.store(count, Ordering::Relaxed);
    }

    pub fn fail_deletes(&self, count: usize) {
        self.fail_next_deletes.store(count, Ordering::Relaxed);
    }

    pub fn set_commit_latency(&self, ms: u64) {
        self.commit_latency_ms.store(ms, Ordering::Relaxed);
    }

    pub fn set_write_latency(&self, ms: u64) {
        self.write_latency_ms.store(ms, Ordering::Relaxed);
    }

    pub fn set_set_latency(&self, ms: u64) {
        self.set_latency_ms.store(ms, Ordering::Relaxed);
    }

    pub(crate) fn should_fail_commit(&self) -> bool {
        Self::decrement_counter(&self.fail_next_commits)
    }

    pub(crate) fn should_fail_write(&self) -> bool {
        Self::decrement_counter(&self.fail_next_writes)
    }

    pub(crate) fn should_fail_get(&self) -> bool {
        Self::decrement_counter(&self.fail_next_gets)
    }

    pub(crate) fn should_fail_set(&self) -> bool {
        Self::decrement_counter(&self.fail_next_sets)
    }

    pub(crate) fn should_fail_delete(&self) -> bool {
        Self::decrement_counter(&self.fail_next_deletes)
    }

    /// Returns true and decrements if the counter was above zero.
    fn decrement_counter(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| c.checked_sub(1))
            .is_ok()
    }

    pub(crate) async fn apply_commit_latency(&self) {
        Self::apply_latency(&self.commit_latency_ms).await;
    }

    pub(crate) async fn apply_write_latency(&self) {
        Self::apply_latency(&self.write_latency_ms).await;
    }

    pub(crate) async fn apply_set_latency(&self) {
        Self::apply_latency(&self.set_latency_ms).await;
    }

    async fn apply_latency(latency_ms: &AtomicU64) {
        let ms = latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}
