use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use docflux_client::{ConvertJob, ConverterClient};
use docflux_common::protocol::{ConvertError, Result};
use docflux_metrics::{ActiveGuard, BackendMetrics, MetricsRegistry};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::backend::Pool;
use crate::health::HealthMonitor;
use crate::request::ConvertRequest;

/// Attempts per request, counting the first.
const MAX_RETRIES: u32 = 3;
/// Sleeps before the second and third attempts.
const RETRY_DELAYS: [Duration; 2] = [Duration::from_millis(100), Duration::from_millis(500)];
/// How long an enqueue may wait for queue room.
const QUEUE_PUSH_TIMEOUT: Duration = Duration::from_secs(1);
/// Dispatcher poll granularity; also how often shutdown is noticed.
const POLL_TIMEOUT: Duration = Duration::from_secs(2);
/// More errors than this inside the window take a backend out of the walk.
const RECENT_ERROR_THRESHOLD: u64 = 5;
/// Window for the recent-error filter.
const RECENT_ERROR_WINDOW: Duration = Duration::from_secs(300);

/// Balancer configuration.
#[derive(Debug, Clone)]
pub struct BalancerConfig {
    /// Per-backend cap on in-flight attempts, enforced by the selection
    /// walk. Also sizes the request queue at twice this.
    pub concurrency: usize,
    /// End-to-end deadline for [`ConvertBalancer::convert`], enqueue to
    /// reply.
    pub request_timeout: Duration,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            request_timeout: Duration::from_secs(30),
        }
    }
}

struct BalancerInner {
    pool: Arc<Pool>,
    monitor: HealthMonitor,
    metrics: MetricsRegistry,
    clients: Vec<ConverterClient>,
    config: BalancerConfig,
    queue_tx: Mutex<Option<mpsc::Sender<ConvertRequest>>>,
    queue_rx: Mutex<Option<mpsc::Receiver<ConvertRequest>>>,
    cursor: AtomicUsize,
    running: AtomicBool,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// Load- and health-aware dispatcher for conversion requests.
///
/// Requests flow caller -> bounded queue -> dispatcher -> attempt task ->
/// backend, with the result handed back through a single-slot promise.
/// The dispatcher is the only queue consumer, so requests leave the queue
/// in FIFO order; completion order is up to the attempt tasks.
///
/// Clone is cheap and every clone drives the same balancer.
///
/// # Backpressure
///
/// The dispatcher never waits for attempts to finish; the only brake is
/// the bounded queue (capacity `2 * concurrency`). Once it fills,
/// further enqueues fail with [`ConvertError::QueueUnavailable`] after
/// the push timeout. `concurrency` itself is enforced per backend: the
/// selection walk skips any backend already carrying that many in-flight
/// attempts, so a pool of `N` healthy backends can run up to
/// `N * concurrency` attempts at once.
///
/// # Retry
///
/// Each request gets up to [`MAX_RETRIES`] attempts with re-selection
/// before every retry; a retry may legitimately land on the same backend.
/// The health monitor is told about every outcome so live traffic and
/// probes drive the same circuit.
#[derive(Clone)]
pub struct ConvertBalancer {
    inner: Arc<BalancerInner>,
}

impl ConvertBalancer {
    pub fn new(monitor: HealthMonitor, config: BalancerConfig) -> Self {
        let pool = Arc::clone(monitor.pool());
        let concurrency = config.concurrency.max(1);
        let config = BalancerConfig {
            concurrency,
            ..config
        };

        let metrics = MetricsRegistry::new(pool.len());
        let clients = pool
            .iter()
            .map(|backend| ConverterClient::new(backend.host.clone(), backend.port))
            .collect();
        let (queue_tx, queue_rx) = mpsc::channel(concurrency * 2);

        Self {
            inner: Arc::new(BalancerInner {
                pool,
                monitor,
                metrics,
                clients,
                config,
                queue_tx: Mutex::new(Some(queue_tx)),
                queue_rx: Mutex::new(Some(queue_rx)),
                cursor: AtomicUsize::new(0),
                running: AtomicBool::new(false),
                dispatcher: Mutex::new(None),
            }),
        }
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.inner.monitor
    }

    /// Spawns the dispatcher task. Idempotent.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let receiver = self.inner.queue_rx.lock().unwrap().take();
        let receiver = match receiver {
            Some(receiver) => receiver,
            // A stopped balancer cannot be restarted; its queue is gone.
            None => return,
        };

        let balancer = self.clone();
        let handle = tokio::spawn(async move {
            balancer.dispatch_loop(receiver).await;
        });
        *self.inner.dispatcher.lock().unwrap() = Some(handle);
    }

    /// Flips the running flag and closes the request queue. In-flight
    /// attempts drain best-effort; the dispatcher exits once the flag is
    /// down and the queue is empty.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let closed = self.inner.queue_tx.lock().unwrap().take();
        if closed.is_some() {
            info!("balancer stopping, request queue closed");
        }
    }

    /// Converts through the queue with the configured end-to-end deadline.
    ///
    /// Fails with `QueueUnavailable` when the balancer is stopped or the
    /// queue stays full past the push timeout, with `Timeout` when the
    /// deadline expires first, and otherwise yields the worker's terminal
    /// result: the conversion payload (raw base64 in Stream mode, the
    /// acknowledged output path in FilePath mode) or its terminal error.
    pub async fn convert(&self, job: ConvertJob) -> Result<String> {
        if !self.inner.running.load(Ordering::SeqCst) {
            return Err(ConvertError::QueueUnavailable(
                "balancer is not running".to_string(),
            ));
        }
        let sender = match self.inner.queue_tx.lock().unwrap().as_ref() {
            Some(sender) => sender.clone(),
            None => {
                return Err(ConvertError::QueueUnavailable(
                    "request queue is closed".to_string(),
                ))
            }
        };

        let (request, reply) = ConvertRequest::new(job);
        let id = request.id;
        match timeout(QUEUE_PUSH_TIMEOUT, sender.send(request)).await {
            Ok(Ok(())) => debug!(request = id, "enqueued"),
            Ok(Err(_)) => {
                return Err(ConvertError::QueueUnavailable(
                    "request queue is closed".to_string(),
                ))
            }
            Err(_) => {
                return Err(ConvertError::QueueUnavailable(
                    "request queue is full".to_string(),
                ))
            }
        }

        match timeout(self.inner.config.request_timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConvertError::QueueUnavailable(
                "balancer dropped the request".to_string(),
            )),
            Err(_) => Err(ConvertError::Timeout(
                self.inner.config.request_timeout.as_millis() as u64,
            )),
        }
    }

    /// Converts without going through the queue.
    ///
    /// For callers that already bound their own concurrency. Selection,
    /// retry and bookkeeping are identical to the queued path; no
    /// end-to-end deadline is applied.
    pub async fn convert_direct(&self, job: ConvertJob) -> Result<String> {
        let index = self.select_backend();
        let guard = self.inner.metrics.acquire(index);
        self.run_attempts(&job, index, guard).await
    }

    /// Point-in-time copy of the per-backend metrics, in pool order.
    pub fn server_metrics(&self) -> Vec<BackendMetrics> {
        self.inner.metrics.snapshot()
    }

    async fn dispatch_loop(self, mut receiver: mpsc::Receiver<ConvertRequest>) {
        info!(
            concurrency = self.inner.config.concurrency,
            backends = self.inner.pool.len(),
            "dispatcher started"
        );

        loop {
            match timeout(POLL_TIMEOUT, receiver.recv()).await {
                Ok(Some(request)) => {
                    // Spawn and move on; attempts are never awaited here.
                    // Backpressure is the bounded queue behind us.
                    let index = self.select_backend();
                    let guard = self.inner.metrics.acquire(index);
                    debug!(request = request.id, backend = index, "dispatching");

                    let balancer = self.clone();
                    tokio::spawn(async move {
                        let result = balancer.run_attempts(&request.job, index, guard).await;
                        request.resolve(result);
                    });
                }
                Ok(None) => break,
                Err(_) => {
                    if self.should_exit(&receiver) {
                        break;
                    }
                }
            }
        }

        info!("dispatcher exited");
    }

    fn should_exit(&self, receiver: &mpsc::Receiver<ConvertRequest>) -> bool {
        !self.inner.running.load(Ordering::SeqCst) && receiver.is_empty()
    }

    /// Runs up to [`MAX_RETRIES`] attempts, re-selecting before each
    /// retry. The active-connection guard travels with the attempt: when
    /// a retry moves to another backend the old slot is released and a
    /// new one claimed, keeping increments paired per backend.
    async fn run_attempts(
        &self,
        job: &ConvertJob,
        first_choice: usize,
        mut guard: ActiveGuard,
    ) -> Result<String> {
        let mut index = first_choice;
        let mut last_error: Option<ConvertError> = None;

        for attempt in 1..=MAX_RETRIES {
            if attempt > 1 {
                sleep(RETRY_DELAYS[(attempt - 2) as usize]).await;
                let next = self.select_backend();
                if next != index {
                    guard = self.inner.metrics.acquire(next);
                    index = next;
                }
            }

            let started = Instant::now();
            match self.inner.clients[index].convert(job).await {
                Ok(output) => {
                    self.inner.monitor.mark_success(index);
                    self.inner.metrics.record_success(index, started.elapsed());
                    if attempt > 1 {
                        info!(backend = index, attempt, "conversion succeeded after retry");
                    }
                    return Ok(output.into_inner());
                }
                Err(e) => {
                    self.inner.monitor.mark_failed(index);
                    self.inner.metrics.record_failure(index);
                    warn!(backend = index, attempt, error = %e, "conversion attempt failed");
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(ConvertError::ExhaustedRetries {
            attempts: MAX_RETRIES,
            source: Box::new(last_error.unwrap_or_else(|| {
                ConvertError::MalformedResponse("no attempt was executed".to_string())
            })),
        })
    }

    /// Round-robin with health and load filters.
    ///
    /// Walks up to `2 * |pool|` positions from the shared cursor, skipping
    /// backends inside their recent-error window, at the per-backend
    /// in-flight cap, or not currently available. A fruitless walk falls
    /// back to the best-scoring backend so selection always yields an
    /// index.
    fn select_backend(&self) -> usize {
        let healthy = self.inner.monitor.healthy_set();
        let pool_size = self.inner.pool.len();

        for _ in 0..(2 * pool_size) {
            let candidate = self.inner.cursor.fetch_add(1, Ordering::Relaxed) % pool_size;
            if self.recent_error_window_active(candidate) {
                continue;
            }
            if self.inner.metrics.active_connections(candidate)
                >= self.inner.config.concurrency as u64
            {
                continue;
            }
            if !healthy.contains(&candidate) {
                continue;
            }
            return candidate;
        }

        warn!("no backend passed the selection filters, falling back to best score");
        self.select_best()
    }

    fn recent_error_window_active(&self, index: usize) -> bool {
        self.inner.metrics.errors(index) > RECENT_ERROR_THRESHOLD
            && self
                .inner
                .metrics
                .last_error_age(index)
                .map(|age| age < RECENT_ERROR_WINDOW)
                .unwrap_or(false)
    }

    /// Lowest `active * 10 + last_response_ms + errors * 100` wins, ties
    /// to the lowest index. Valid whenever the pool is non-empty.
    fn select_best(&self) -> usize {
        let mut best = 0;
        let mut best_score = u64::MAX;
        for index in 0..self.inner.pool.len() {
            let score = self.inner.metrics.active_connections(index) * 10
                + self.inner.metrics.last_response_time_ms(index)
                + self.inner.metrics.errors(index) * 100;
            if score < best_score {
                best_score = score;
                best = index;
            }
        }
        best
    }
}
