// SPDX-License-Identifier: MIT OR Apache-2.0
//! Serializable metric snapshots.

use chrono::{DateTime, Utc};
use mgx_error::{ErrorCode, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregated statistics for one error code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorStat {
    /// The error code.
    pub code: ErrorCode,
    /// Occurrences in the current window.
    pub count: u64,
    /// When the code was first recorded.
    pub first_seen: DateTime<Utc>,
    /// When the code was last recorded.
    pub last_seen: DateTime<Utc>,
    /// `count` over the first-to-last span in seconds; 0 when the span is empty.
    pub avg_rate: f64,
}

/// Point-in-time view of a [`MetricsCollector`](crate::MetricsCollector).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    /// Errors recorded through `record_error`.
    pub total_errors: u64,
    /// `total_errors` per second since the window started.
    pub error_rate: f64,
    /// Start of the collection window.
    pub start_time: DateTime<Utc>,
    /// Milliseconds since the window started.
    pub elapsed_ms: u64,
    /// Occurrences per code (deterministic ordering).
    pub by_code: BTreeMap<ErrorCode, u64>,
    /// Occurrences per severity; severities never seen are omitted.
    pub by_severity: BTreeMap<Severity, u64>,
    /// Most frequent codes, highest count first.
    pub top_errors: Vec<ErrorStat>,
}

impl MetricsSummary {
    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty() && self.total_errors == 0
    }
}
