use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use docflux_client::ConverterClient;
use docflux_common::transport::TransportTimeouts;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::Pool;

/// Circuit state of one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Mutable health record for one backend.
///
/// Written by the sampler and by the balancer after live traffic; read
/// during selection. All mutation happens under the monitor's lock.
#[derive(Debug, Clone)]
pub struct HealthState {
    pub status: HealthStatus,
    pub failure_count: u32,
    pub last_failure_at: Option<Instant>,
    pub last_check_at: Option<Instant>,
    pub last_response_time: Option<Duration>,
}

impl HealthState {
    fn new() -> Self {
        Self {
            status: HealthStatus::Healthy,
            failure_count: 0,
            last_failure_at: None,
            last_check_at: None,
            last_response_time: None,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Pause between probe rounds.
    pub check_interval: Duration,
    /// Time allowed for one probe, applied to every socket phase.
    pub probe_timeout: Duration,
    /// Consecutive failures before a backend turns Unhealthy.
    pub failure_threshold: u32,
    /// How long after the last failure an Unhealthy backend becomes
    /// selectable again (the reprobe window).
    pub retry_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_millis(2000),
            failure_threshold: 3,
            retry_timeout: Duration::from_secs(30),
        }
    }
}

struct MonitorInner {
    pool: Arc<Pool>,
    clients: Vec<ConverterClient>,
    states: RwLock<Vec<HealthState>>,
    config: HealthConfig,
    running: AtomicBool,
    sampler: Mutex<Option<JoinHandle<()>>>,
}

/// Background health monitor for the pool.
///
/// Owns the per-backend [`HealthState`] vector. A sampler task probes
/// every backend each tick; the balancer feeds live-traffic outcomes
/// through [`mark_success`]/[`mark_failed`] so the circuit tracks real
/// evidence, not just probes. Probe errors never propagate to callers.
///
/// Clone is cheap - the state lives behind an `Arc`, so every clone
/// observes the same circuit.
///
/// [`mark_success`]: HealthMonitor::mark_success
/// [`mark_failed`]: HealthMonitor::mark_failed
#[derive(Clone)]
pub struct HealthMonitor {
    inner: Arc<MonitorInner>,
}

impl HealthMonitor {
    pub fn new(pool: Arc<Pool>, config: HealthConfig) -> Self {
        let probe_timeouts = TransportTimeouts {
            connect: config.probe_timeout,
            write: config.probe_timeout,
            read: config.probe_timeout,
        };
        let clients = pool
            .iter()
            .map(|backend| {
                ConverterClient::with_timeouts(
                    backend.host.clone(),
                    backend.port,
                    probe_timeouts.clone(),
                )
            })
            .collect();
        let states = RwLock::new(vec![HealthState::new(); pool.len()]);

        Self {
            inner: Arc::new(MonitorInner {
                pool,
                clients,
                states,
                config,
                running: AtomicBool::new(false),
                sampler: Mutex::new(None),
            }),
        }
    }

    pub fn pool(&self) -> &Arc<Pool> {
        &self.inner.pool
    }

    pub fn config(&self) -> &HealthConfig {
        &self.inner.config
    }

    /// Starts the background sampler. Idempotent.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut sampler = self.inner.sampler.lock().unwrap();
        if sampler.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            // A stop() was signalled but the old sampler has not reached
            // its scheduling boundary yet; the raised flag re-adopts it.
            return;
        }

        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            info!(
                interval_ms = monitor.inner.config.check_interval.as_millis() as u64,
                backends = monitor.inner.pool.len(),
                "health sampler started"
            );
            while monitor.inner.running.load(Ordering::SeqCst) {
                // Fire this tick's probes without awaiting them; slow
                // backends must not stretch the sampling period.
                let tick = monitor.clone();
                tokio::spawn(async move {
                    tick.run_health_checks().await;
                });
                tokio::time::sleep(monitor.inner.config.check_interval).await;
            }
            debug!("health sampler exited");
        });
        *sampler = Some(handle);
    }

    /// Signals the sampler to exit at its next scheduling boundary.
    /// Idempotent; does not wait for the task.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }

    /// Probes every backend concurrently and applies the outcomes.
    pub async fn run_health_checks(&self) {
        let probes = (0..self.inner.pool.len()).map(|index| self.probe(index));
        join_all(probes).await;
    }

    async fn probe(&self, index: usize) {
        let started = Instant::now();
        let alive = self.inner.clients[index].ping().await;
        let elapsed = started.elapsed();

        {
            let mut states = self.inner.states.write().unwrap();
            if let Some(state) = states.get_mut(index) {
                state.last_check_at = Some(Instant::now());
                state.last_response_time = Some(elapsed);
            }
        }

        if alive {
            self.mark_success(index);
        } else {
            self.mark_failed(index);
        }
    }

    /// Records a successful probe or live attempt: any success closes the
    /// circuit and clears the failure count.
    pub fn mark_success(&self, index: usize) {
        let mut states = self.inner.states.write().unwrap();
        if let Some(state) = states.get_mut(index) {
            if state.status == HealthStatus::Unhealthy {
                info!(backend = %self.addr_of(index), "backend recovered");
            }
            state.status = HealthStatus::Healthy;
            state.failure_count = 0;
        }
    }

    /// Records a failed probe or live attempt. Crossing the failure
    /// threshold opens the circuit.
    pub fn mark_failed(&self, index: usize) {
        let mut states = self.inner.states.write().unwrap();
        if let Some(state) = states.get_mut(index) {
            state.failure_count += 1;
            state.last_failure_at = Some(Instant::now());
            if state.status == HealthStatus::Healthy
                && state.failure_count >= self.inner.config.failure_threshold
            {
                state.status = HealthStatus::Unhealthy;
                warn!(
                    backend = %self.addr_of(index),
                    failures = state.failure_count,
                    "backend marked unhealthy"
                );
            }
        }
    }

    /// Selection predicate.
    ///
    /// Healthy backends are available. An Unhealthy backend whose reprobe
    /// window has elapsed is speculatively reopened - flipped back to
    /// Healthy with a cleared failure count, under the same lock as every
    /// other status mutation - so traffic itself confirms recovery.
    /// Unknown indices are unavailable.
    pub fn is_available(&self, index: usize) -> bool {
        let mut states = self.inner.states.write().unwrap();
        let state = match states.get_mut(index) {
            Some(state) => state,
            None => return false,
        };

        match state.status {
            HealthStatus::Healthy => true,
            HealthStatus::Unhealthy => {
                let window_elapsed = state
                    .last_failure_at
                    .map(|at| at.elapsed() > self.inner.config.retry_timeout)
                    .unwrap_or(true);
                if window_elapsed {
                    state.status = HealthStatus::Healthy;
                    state.failure_count = 0;
                    info!(backend = %self.addr_of(index), "reprobe window elapsed, backend selectable again");
                }
                window_elapsed
            }
        }
    }

    /// Indices currently available for selection. Applies the same
    /// speculative reopen as [`is_available`](HealthMonitor::is_available).
    pub fn healthy_set(&self) -> HashSet<usize> {
        (0..self.inner.pool.len())
            .filter(|&index| self.is_available(index))
            .collect()
    }

    pub fn state(&self, index: usize) -> Option<HealthState> {
        self.inner.states.read().unwrap().get(index).cloned()
    }

    pub fn all_states(&self) -> Vec<HealthState> {
        self.inner.states.read().unwrap().clone()
    }

    fn addr_of(&self, index: usize) -> String {
        self.inner
            .pool
            .get(index)
            .map(|backend| backend.addr())
            .unwrap_or_else(|| format!("#{}", index))
    }
}
