// SPDX-License-Identifier: MIT OR Apache-2.0
//! mgx-telemetry
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Error metrics keyed by code and severity.
//!
//! [`MetricsCollector`] counts occurrences with atomics. The code map is
//! write-locked only the first time a code is seen, so steady-state
//! recording never waits on it. Snapshots come out as [`ErrorStat`] and
//! [`MetricsSummary`], which any [`TelemetryExporter`] can serialize.

mod collector;
mod export;
mod summary;

pub use collector::{DEFAULT_TOP_ERRORS, MetricsCollector};
pub use export::{JsonExporter, LogExporter, TelemetryExporter};
pub use summary::{ErrorStat, MetricsSummary};
