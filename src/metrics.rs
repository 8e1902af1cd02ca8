//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of FileFlow.
//! The FileFlow project belongs to the Dunimd project team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! you may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Per-job throughput counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FlowTransferMetrics {
    pub rows_read: usize,
    pub rows_written: usize,
    pub chunks_committed: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
}

impl FlowTransferMetrics {
    pub fn start() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn record_read(&mut self, rows: usize) {
        self.rows_read += rows;
    }

    pub fn record_chunk(&mut self, rows: usize) {
        self.rows_written += rows;
        self.chunks_committed += 1;
    }

    pub fn finish(&mut self) {
        let finished = Utc::now();
        if let Some(started) = self.started_at {
            self.elapsed_ms = (finished - started).num_milliseconds().max(0) as u64;
        }
        self.finished_at = Some(finished);
    }

    /// Written rows per second, zero before any time has elapsed.
    pub fn rows_per_second(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return 0.0;
        }
        self.rows_written as f64 * 1000.0 / self.elapsed_ms as f64
    }

    pub fn as_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert("rows_per_second".into(), Value::from(self.rows_per_second()));
        }
        value
    }
}
