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

use serde::{Deserialize, Serialize};

/// Point-in-time metrics for one backend.
///
/// Backends are identified by their index in the pool; snapshots are
/// returned in pool order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendMetrics {
    /// Completed attempts, success and failure alike.
    pub requests: u64,
    /// Failed attempts. Always `<= requests`.
    pub errors: u64,
    /// Latency of the most recent successful attempt, in milliseconds.
    pub last_response_time_ms: u64,
    /// Attempts currently in flight against this backend.
    pub active_connections: u64,
    /// Unix-epoch milliseconds of the most recent failure, if any.
    pub last_error_at_ms: Option<u64>,
}

impl BackendMetrics {
    pub fn new() -> Self {
        Self {
            requests: 0,
            errors: 0,
            last_response_time_ms: 0,
            active_connections: 0,
            last_error_at_ms: None,
        }
    }
}

impl Default for BackendMetrics {
    fn default() -> Self {
        Self::new()
    }
}
