// Copyright 2026 Docflux Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::snapshot::BackendMetrics;

/// Per-backend counter storage.
#[derive(Debug)]
struct BackendStats {
    requests: AtomicU64,
    errors: AtomicU64,
    last_response_time_ms: AtomicU64,
    active_connections: AtomicU64,
    /// Unix-epoch milliseconds of the last failure; 0 means never.
    last_error_at_ms: AtomicU64,
}

impl BackendStats {
    fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_response_time_ms: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            last_error_at_ms: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> BackendMetrics {
        let last_error_at_ms = self.last_error_at_ms.load(Ordering::Relaxed);
        BackendMetrics {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            last_response_time_ms: self.last_response_time_ms.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            last_error_at_ms: if last_error_at_ms == 0 {
                None
            } else {
                Some(last_error_at_ms)
            },
        }
    }
}

#[derive(Debug)]
struct RegistryInner {
    backends: Vec<BackendStats>,
}

/// Thread-safe metrics registry, one slot per pool backend.
///
/// Counters are lock-free atomics; callers read through getters or take a
/// full [`snapshot`](MetricsRegistry::snapshot). The raw slots are never
/// exposed. Clone is cheap - the counters live behind an `Arc`, so every
/// clone observes and updates the same slots.
///
/// In-flight accounting goes exclusively through [`acquire`]: the
/// returned [`ActiveGuard`] decrements on drop, so every increment is
/// paired with exactly one decrement on every exit path, panics included.
///
/// [`acquire`]: MetricsRegistry::acquire
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    inner: Arc<RegistryInner>,
}

impl MetricsRegistry {
    /// Creates a registry with one zeroed slot per backend.
    pub fn new(pool_size: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                backends: (0..pool_size).map(|_| BackendStats::new()).collect(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.backends.is_empty()
    }

    /// Records a completed successful attempt.
    pub fn record_success(&self, index: usize, elapsed: Duration) {
        let stats = &self.inner.backends[index];
        stats.requests.fetch_add(1, Ordering::Relaxed);
        stats
            .last_response_time_ms
            .store(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    /// Records a completed failed attempt. Failures count as requests.
    pub fn record_failure(&self, index: usize) {
        let stats = &self.inner.backends[index];
        stats.requests.fetch_add(1, Ordering::Relaxed);
        stats.errors.fetch_add(1, Ordering::Relaxed);
        stats.last_error_at_ms.store(epoch_ms(), Ordering::Relaxed);
    }

    /// Claims an in-flight slot on `index`; released when the guard drops.
    pub fn acquire(&self, index: usize) -> ActiveGuard {
        self.inner.backends[index]
            .active_connections
            .fetch_add(1, Ordering::Relaxed);
        ActiveGuard {
            registry: Arc::clone(&self.inner),
            index,
        }
    }

    pub fn requests(&self, index: usize) -> u64 {
        self.inner.backends[index].requests.load(Ordering::Relaxed)
    }

    pub fn errors(&self, index: usize) -> u64 {
        self.inner.backends[index].errors.load(Ordering::Relaxed)
    }

    pub fn active_connections(&self, index: usize) -> u64 {
        self.inner.backends[index]
            .active_connections
            .load(Ordering::Relaxed)
    }

    pub fn last_response_time_ms(&self, index: usize) -> u64 {
        self.inner.backends[index]
            .last_response_time_ms
            .load(Ordering::Relaxed)
    }

    /// Time since the last recorded failure, `None` if never failed.
    pub fn last_error_age(&self, index: usize) -> Option<Duration> {
        let at = self.inner.backends[index]
            .last_error_at_ms
            .load(Ordering::Relaxed);
        if at == 0 {
            return None;
        }
        Some(Duration::from_millis(epoch_ms().saturating_sub(at)))
    }

    /// Copies out the current metrics, in pool order.
    pub fn snapshot(&self) -> Vec<BackendMetrics> {
        self.inner
            .backends
            .iter()
            .map(BackendStats::snapshot)
            .collect()
    }
}

/// RAII handle for one in-flight attempt.
///
/// Holds the registry alive and decrements the backend's
/// `active_connections` exactly once when dropped.
#[derive(Debug)]
pub struct ActiveGuard {
    registry: Arc<RegistryInner>,
    index: usize,
}

impl ActiveGuard {
    /// The backend this guard is counting against.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.registry.backends[self.index]
            .active_connections
            .fetch_sub(1, Ordering::Relaxed);
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_success_updates_requests_and_latency() {
        let registry = MetricsRegistry::new(2);
        registry.record_success(0, Duration::from_millis(42));
        registry.record_success(0, Duration::from_millis(17));

        assert_eq!(registry.requests(0), 2);
        assert_eq!(registry.errors(0), 0);
        assert_eq!(registry.last_response_time_ms(0), 17);
        assert_eq!(registry.requests(1), 0);
    }

    #[test]
    fn test_failure_counts_as_request() {
        let registry = MetricsRegistry::new(1);
        registry.record_failure(0);
        registry.record_failure(0);
        registry.record_success(0, Duration::from_millis(5));

        assert_eq!(registry.requests(0), 3);
        assert_eq!(registry.errors(0), 2);
        assert!(registry.last_error_age(0).is_some());
    }

    #[test]
    fn test_last_error_age_none_before_any_failure() {
        let registry = MetricsRegistry::new(1);
        assert!(registry.last_error_age(0).is_none());
    }

    #[test]
    fn test_guard_pairs_increment_with_decrement() {
        let registry = MetricsRegistry::new(1);

        let guard = registry.acquire(0);
        assert_eq!(registry.active_connections(0), 1);
        {
            let _inner = registry.acquire(0);
            assert_eq!(registry.active_connections(0), 2);
        }
        assert_eq!(registry.active_connections(0), 1);
        drop(guard);
        assert_eq!(registry.active_connections(0), 0);
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let registry = MetricsRegistry::new(1);
        let cloned = registry.clone();

        let result = thread::spawn(move || {
            let _guard = cloned.acquire(0);
            panic!("attempt blew up");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(registry.active_connections(0), 0);
    }

    #[test]
    fn test_snapshot_copies_all_fields() {
        let registry = MetricsRegistry::new(2);
        registry.record_success(0, Duration::from_millis(10));
        registry.record_failure(1);
        let _guard = registry.acquire(1);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].requests, 1);
        assert_eq!(snapshot[0].last_response_time_ms, 10);
        assert_eq!(snapshot[0].active_connections, 0);
        assert!(snapshot[0].last_error_at_ms.is_none());
        assert_eq!(snapshot[1].errors, 1);
        assert_eq!(snapshot[1].active_connections, 1);
        assert!(snapshot[1].last_error_at_ms.is_some());
    }

    #[test]
    fn test_thread_safety() {
        let registry = MetricsRegistry::new(1);
        let mut handles = vec![];

        for _ in 0..10 {
            let registry = registry.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let _guard = registry.acquire(0);
                    registry.record_success(0, Duration::from_millis(1));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.requests(0), 10_000);
        assert_eq!(registry.active_connections(0), 0);
        assert!(registry.errors(0) <= registry.requests(0));
    }
}
