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

//! docflux metrics collection
//!
//! Thread-safe per-backend metrics for the conversion balancer: request
//! and error counters, last-observed latency, in-flight attempt counts
//! and failure timestamps.
//!
//! # Architecture
//!
//! - [`MetricsRegistry`]: one atomic-counter slot per pool backend
//! - [`ActiveGuard`]: RAII in-flight accounting - every increment gets
//!   exactly one decrement, on success, error and panic paths alike
//! - [`BackendMetrics`]: serializable point-in-time snapshot
//!
//! The registry never hands out its raw counters; observers take
//! snapshots, and the selection logic reads through narrow getters.
//!
//! # Usage
//!
//! ```
//! use docflux_metrics::MetricsRegistry;
//! use std::time::Duration;
//!
//! let registry = MetricsRegistry::new(2);
//!
//! let guard = registry.acquire(0);
//! // ... run the attempt ...
//! registry.record_success(0, Duration::from_millis(12));
//! drop(guard);
//!
//! assert_eq!(registry.snapshot()[0].requests, 1);
//! ```

mod registry;
mod snapshot;

pub use registry::{ActiveGuard, MetricsRegistry};
pub use snapshot::BackendMetrics;
