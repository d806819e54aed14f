// SPDX-License-Identifier: MIT OR Apache-2.0
//! Exporters for [`MetricsSummary`] snapshots.

use crate::MetricsSummary;
use tracing::info;

/// Trait for exporting collected metrics.
pub trait TelemetryExporter: Send + Sync {
    /// Export the given summary. Returns the serialized output on success.
    fn export(&self, summary: &MetricsSummary) -> Result<String, String>;
}

/// Exports metrics as pretty-printed JSON to a string.
#[derive(Debug, Default)]
pub struct JsonExporter;

impl TelemetryExporter for JsonExporter {
    fn export(&self, summary: &MetricsSummary) -> Result<String, String> {
        serde_json::to_string_pretty(summary).map_err(|e| e.to_string())
    }
}

/// Emits the summary as a single `info!` event on `mgx.metrics` and returns
/// the compact JSON it logged.
#[derive(Debug, Default)]
pub struct LogExporter;

impl TelemetryExporter for LogExporter {
    fn export(&self, summary: &MetricsSummary) -> Result<String, String> {
        let json = serde_json::to_string(summary).map_err(|e| e.to_string())?;
        info!(
            target: "mgx.metrics",
            total_errors = summary.total_errors,
            error_rate = summary.error_rate,
            distinct_codes = summary.by_code.len(),
            summary = %json,
            "metrics summary"
        );
        Ok(json)
    }
}
