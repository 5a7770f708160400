//! docflux conversion balancer
//!
//! This crate provides the load-balancing core of docflux: a
//! health-aware dispatcher that multiplexes document-conversion requests
//! across a fixed pool of XML-RPC conversion backends.
//!
//! # Architecture
//!
//! Three pieces cooperate around shared per-backend state:
//!
//! 1. **[`Pool`]**: the fixed, validated backend set, identified by index
//! 2. **[`HealthMonitor`]**: background sampler plus a failure-threshold
//!    circuit per backend, with a speculative reopen after the retry
//!    window so traffic confirms recovery on its own
//! 3. **[`ConvertBalancer`]**: bounded request queue, single FIFO
//!    dispatcher that spawns attempts without waiting on them,
//!    round-robin selection filtered by health and per-backend load, and
//!    a retry driver that re-selects across backends
//!
//! Live traffic reports every outcome back to the health monitor through
//! `mark_success`/`mark_failed`, so probes and real requests drive one
//! circuit. Per-backend metrics (requests, errors, latency, in-flight)
//! are kept in a `docflux_metrics::MetricsRegistry` and exposed as
//! snapshots.
//!
//! # Example
//!
//! ```no_run
//! use docflux_balancer::{
//!     Backend, BalancerConfig, ConvertBalancer, ConvertJob, HealthConfig, HealthMonitor, Pool,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Arc::new(Pool::new(vec![
//!     Backend::new("127.0.0.1", 2003),
//!     Backend::new("127.0.0.1", 2004),
//! ])?);
//!
//! let monitor = HealthMonitor::new(pool, HealthConfig::default());
//! monitor.start();
//!
//! let balancer = ConvertBalancer::new(monitor.clone(), BalancerConfig::default());
//! balancer.start();
//!
//! let payload = balancer
//!     .convert(ConvertJob::stream(b"Hello".to_vec(), "pdf"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod balancer;
pub mod health;
pub mod request;

pub use backend::{Backend, Pool};
pub use balancer::{BalancerConfig, ConvertBalancer};
pub use health::{HealthConfig, HealthMonitor, HealthState, HealthStatus};
pub use request::{ConvertRequest, RequestId};

pub use docflux_client::{ConvertJob, ConvertOutput, JobBody};
