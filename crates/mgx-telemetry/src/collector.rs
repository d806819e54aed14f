// SPDX-License-Identifier: MIT OR Apache-2.0
//! The metrics collector.

use crate::{ErrorStat, MetricsSummary};
use chrono::{DateTime, Utc};
use mgx_error::{ErrorCode, Failure, Severity, StructuredError};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Number of codes included in [`MetricsCollector::get_summary`] by default.
pub const DEFAULT_TOP_ERRORS: usize = 10;

const UNSET: i64 = i64::MIN;

fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Per-code counter
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CodeCounter {
    count: AtomicU64,
    first_seen: AtomicI64,
    last_seen: AtomicI64,
}

impl CodeCounter {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            first_seen: AtomicI64::new(UNSET),
            last_seen: AtomicI64::new(UNSET),
        }
    }

    fn record(&self, now: i64) {
        // Only the first recorder sets first_seen.
        let _ = self
            .first_seen
            .compare_exchange(UNSET, now, Ordering::AcqRel, Ordering::Acquire);
        self.last_seen.store(now, Ordering::Release);
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    fn stat(&self, code: &ErrorCode) -> Option<ErrorStat> {
        let count = self.count();
        if count == 0 {
            return None;
        }
        let last = self.last_seen.load(Ordering::Acquire);
        let first = match self.first_seen.load(Ordering::Acquire) {
            UNSET => last,
            n => n,
        };
        let span_secs = last.saturating_sub(first) as f64 / 1e9;
        let avg_rate = if span_secs > 0.0 {
            count as f64 / span_secs
        } else {
            0.0
        };
        Some(ErrorStat {
            code: code.clone(),
            count,
            first_seen: DateTime::from_timestamp_nanos(first),
            last_seen: DateTime::from_timestamp_nanos(last),
            avg_rate,
        })
    }
}

// ---------------------------------------------------------------------------
// Collection window
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Window {
    codes: RwLock<HashMap<ErrorCode, Arc<CodeCounter>>>,
    severities: [AtomicU64; Severity::ALL.len()],
    total: AtomicU64,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl Window {
    fn new() -> Self {
        Self {
            codes: RwLock::new(HashMap::new()),
            severities: std::array::from_fn(|_| AtomicU64::new(0)),
            total: AtomicU64::new(0),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Read-lock probe, then write-lock insert-if-absent.
    fn counter(&self, code: &ErrorCode) -> Arc<CodeCounter> {
        {
            let codes = self.codes.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(counter) = codes.get(code) {
                return Arc::clone(counter);
            }
        }
        let mut codes = self.codes.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(codes.entry(code.clone()).or_insert_with(|| {
            debug!(target: "mgx.metrics", code = %code, "tracking new error code");
            Arc::new(CodeCounter::new())
        }))
    }

    fn find(&self, code: &ErrorCode) -> Option<Arc<CodeCounter>> {
        let codes = self.codes.read().unwrap_or_else(PoisonError::into_inner);
        codes.get(code).cloned()
    }

    fn record(&self, code: &ErrorCode, severity: Severity) {
        self.counter(code).record(now_nanos());
        self.severities[severity.as_index()].fetch_add(1, Ordering::AcqRel);
    }

    fn stats(&self) -> Vec<ErrorStat> {
        let codes = self.codes.read().unwrap_or_else(PoisonError::into_inner);
        codes
            .iter()
            .filter_map(|(code, counter)| counter.stat(code))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

/// Thread-safe error metrics.
///
/// Clones share the same counters. [`reset`](Self::reset) swaps in a fresh
/// window, so recordings racing with a reset land in one window or the
/// other, never half in each.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    window: Arc<RwLock<Arc<Window>>>,
    top_errors: usize,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a collector whose window starts now.
    pub fn new() -> Self {
        Self {
            window: Arc::new(RwLock::new(Arc::new(Window::new()))),
            top_errors: DEFAULT_TOP_ERRORS,
        }
    }

    /// Set how many codes [`get_summary`](Self::get_summary) lists. Zero
    /// restores the default.
    pub fn with_top_errors(mut self, limit: usize) -> Self {
        self.top_errors = if limit == 0 { DEFAULT_TOP_ERRORS } else { limit };
        self
    }

    fn current(&self) -> Arc<Window> {
        Arc::clone(&self.window.read().unwrap_or_else(PoisonError::into_inner))
    }

    // ── Recording ──────────────────────────────────────────────────────

    /// Record one failure and bump the global total.
    ///
    /// Foreign errors count under [`ErrorCode::UNKNOWN`] at
    /// [`Severity::Error`].
    pub fn record_error(&self, err: &Failure) {
        let window = self.current();
        match err.as_structured() {
            Some(s) => window.record(s.code(), s.severity()),
            None => window.record(&ErrorCode::UNKNOWN, Severity::Error),
        }
        window.total.fetch_add(1, Ordering::AcqRel);
    }

    /// Record a structured error by code and severity. The global total is
    /// left alone.
    pub fn record_structured(&self, err: &StructuredError) {
        self.current().record(err.code(), err.severity());
    }

    /// Record the error of a failed result; `Ok` is ignored.
    pub fn record_result<T>(&self, result: &Result<T, Failure>) {
        if let Err(err) = result {
            self.record_error(err);
        }
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// Occurrences of `code`, 0 if never recorded.
    pub fn get_count(&self, code: &ErrorCode) -> u64 {
        self.current().find(code).map_or(0, |c| c.count())
    }

    /// Occurrences at `severity`.
    pub fn get_count_by_severity(&self, severity: Severity) -> u64 {
        self.current().severities[severity.as_index()].load(Ordering::Acquire)
    }

    /// Calls to [`record_error`](Self::record_error) since the window started.
    pub fn get_total_errors(&self) -> u64 {
        self.current().total.load(Ordering::Acquire)
    }

    /// Occurrences of `code` per second over `min(window, elapsed)`.
    pub fn get_rate(&self, code: &ErrorCode, window: Duration) -> f64 {
        let current = self.current();
        let count = current.find(code).map_or(0, |c| c.count());
        if count == 0 {
            return 0.0;
        }
        let secs = window.min(current.started.elapsed()).as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        count as f64 / secs
    }

    /// Global total per second since the window started.
    pub fn get_error_rate(&self) -> f64 {
        let current = self.current();
        error_rate(&current)
    }

    /// Codes with at least one occurrence, highest count first. Equal counts
    /// are ordered by code. A `limit` of 0 returns all of them.
    pub fn get_top_errors(&self, limit: usize) -> Vec<ErrorStat> {
        top_errors(&self.current(), limit)
    }

    /// Snapshot of the whole window.
    pub fn get_summary(&self) -> MetricsSummary {
        let current = self.current();
        let stats = current.stats();

        let by_code: BTreeMap<ErrorCode, u64> =
            stats.iter().map(|s| (s.code.clone(), s.count)).collect();
        let by_severity: BTreeMap<Severity, u64> = Severity::ALL
            .iter()
            .map(|sev| (*sev, current.severities[sev.as_index()].load(Ordering::Acquire)))
            .filter(|(_, n)| *n > 0)
            .collect();

        MetricsSummary {
            total_errors: current.total.load(Ordering::Acquire),
            error_rate: error_rate(&current),
            start_time: current.started_at,
            elapsed_ms: u64::try_from(current.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            by_code,
            by_severity,
            top_errors: rank(stats, self.top_errors),
        }
    }

    /// When the current window started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.current().started_at
    }

    /// Time since the current window started.
    pub fn elapsed(&self) -> Duration {
        self.current().started.elapsed()
    }

    /// Discard every counter and restart the window.
    pub fn reset(&self) {
        let fresh = Arc::new(Window::new());
        let mut window = self.window.write().unwrap_or_else(PoisonError::into_inner);
        *window = fresh;
        info!(target: "mgx.metrics", "metrics reset");
    }
}

fn error_rate(window: &Window) -> f64 {
    let total = window.total.load(Ordering::Acquire);
    let secs = window.started.elapsed().as_secs_f64();
    if total == 0 || secs <= 0.0 {
        return 0.0;
    }
    total as f64 / secs
}

fn top_errors(window: &Window, limit: usize) -> Vec<ErrorStat> {
    rank(window.stats(), limit)
}

fn rank(mut stats: Vec<ErrorStat>, limit: usize) -> Vec<ErrorStat> {
    stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code.cmp(&b.code)));
    if limit > 0 {
        stats.truncate(limit);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn structured(code: ErrorCode, sev: Severity) -> StructuredError {
        StructuredError::new("boom").with_code(code).with_severity(sev)
    }

    fn record_n(c: &MetricsCollector, code: ErrorCode, n: usize) {
        for _ in 0..n {
            c.record_error(&structured(code.clone(), Severity::Error).into());
        }
    }

    #[test]
    fn new_collector_is_empty() {
        let c = MetricsCollector::new();
        assert_eq!(c.get_total_errors(), 0);
        assert_eq!(c.get_count(&ErrorCode::TIMEOUT), 0);
        assert_eq!(c.get_count_by_severity(Severity::Fatal), 0);
        assert_eq!(c.get_error_rate(), 0.0);
        assert!(c.get_top_errors(0).is_empty());
    }

    #[test]
    fn record_error_counts_code_severity_and_total() {
        let c = MetricsCollector::new();
        c.record_error(&structured(ErrorCode::BUILD_FAILED, Severity::Critical).into());
        assert_eq!(c.get_count(&ErrorCode::BUILD_FAILED), 1);
        assert_eq!(c.get_count_by_severity(Severity::Critical), 1);
        assert_eq!(c.get_total_errors(), 1);
    }

    #[test]
    fn foreign_error_counts_as_unknown() {
        let c = MetricsCollector::new();
        let io = std::io::Error::other("disk");
        c.record_error(&Failure::from(io));
        assert_eq!(c.get_count(&ErrorCode::UNKNOWN), 1);
        assert_eq!(c.get_count_by_severity(Severity::Error), 1);
        assert_eq!(c.get_total_errors(), 1);
    }

    #[test]
    fn record_structured_skips_total() {
        let c = MetricsCollector::new();
        c.record_structured(&structured(ErrorCode::TIMEOUT, Severity::Warning));
        assert_eq!(c.get_count(&ErrorCode::TIMEOUT), 1);
        assert_eq!(c.get_count_by_severity(Severity::Warning), 1);
        assert_eq!(c.get_total_errors(), 0);
    }

    #[test]
    fn record_result_ignores_ok() {
        let c = MetricsCollector::new();
        c.record_result(&Ok::<_, Failure>(5));
        assert_eq!(c.get_total_errors(), 0);
        c.record_result(&Err::<(), _>(Failure::from(std::io::Error::other("x"))));
        assert_eq!(c.get_total_errors(), 1);
    }

    #[test]
    fn first_seen_is_fixed_and_last_seen_moves() {
        let c = MetricsCollector::new();
        record_n(&c, ErrorCode::TIMEOUT, 1);
        let first = c.get_top_errors(0)[0].clone();
        thread::sleep(Duration::from_millis(5));
        record_n(&c, ErrorCode::TIMEOUT, 1);
        let second = c.get_top_errors(0)[0].clone();
        assert_eq!(first.first_seen, second.first_seen);
        assert!(second.last_seen > first.last_seen);
        assert_eq!(second.count, 2);
        assert!(second.avg_rate > 0.0);
    }

    #[test]
    fn single_occurrence_has_zero_avg_rate() {
        let c = MetricsCollector::new();
        record_n(&c, ErrorCode::TIMEOUT, 1);
        assert_eq!(c.get_top_errors(0)[0].avg_rate, 0.0);
    }

    #[test]
    fn top_errors_sorted_and_limited() {
        let c = MetricsCollector::new();
        record_n(&c, ErrorCode::TIMEOUT, 2);
        record_n(&c, ErrorCode::BUILD_FAILED, 5);
        record_n(&c, ErrorCode::NOT_FOUND, 1);

        let all = c.get_top_errors(0);
        let codes: Vec<_> = all.iter().map(|s| s.code.clone()).collect();
        assert_eq!(
            codes,
            vec![ErrorCode::BUILD_FAILED, ErrorCode::TIMEOUT, ErrorCode::NOT_FOUND]
        );
        assert_eq!(c.get_top_errors(2).len(), 2);
        assert_eq!(c.get_top_errors(10).len(), 3);
    }

    #[test]
    fn rate_for_unrecorded_code_is_zero() {
        let c = MetricsCollector::new();
        assert_eq!(c.get_rate(&ErrorCode::TIMEOUT, Duration::from_secs(60)), 0.0);
    }

    #[test]
    fn rate_uses_smaller_of_window_and_elapsed() {
        let c = MetricsCollector::new();
        record_n(&c, ErrorCode::TIMEOUT, 10);
        thread::sleep(Duration::from_millis(20));
        // Elapsed is far below an hour, so the divisor is elapsed time.
        let long = c.get_rate(&ErrorCode::TIMEOUT, Duration::from_secs(3600));
        assert!(long > 10.0 / 3600.0 * 100.0);
        // A tiny window bounds the divisor instead.
        let short = c.get_rate(&ErrorCode::TIMEOUT, Duration::from_millis(1));
        assert!((short - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn error_rate_is_positive_after_recording() {
        let c = MetricsCollector::new();
        record_n(&c, ErrorCode::TIMEOUT, 3);
        thread::sleep(Duration::from_millis(2));
        assert!(c.get_error_rate() > 0.0);
    }

    #[test]
    fn summary_contains_maps_and_top_ten() {
        let c = MetricsCollector::new();
        for i in 0..12 {
            record_n(&c, ErrorCode::new(format!("CODE_{i:02}")), i + 1);
        }
        c.record_error(&structured(ErrorCode::TIMEOUT, Severity::Fatal).into());

        let s = c.get_summary();
        assert_eq!(s.total_errors, 79);
        assert_eq!(s.by_code.len(), 13);
        assert_eq!(s.by_code[&ErrorCode::new("CODE_11")], 12);
        assert_eq!(s.by_severity[&Severity::Error], 78);
        assert_eq!(s.by_severity[&Severity::Fatal], 1);
        assert!(!s.by_severity.contains_key(&Severity::Debug));
        assert_eq!(s.top_errors.len(), DEFAULT_TOP_ERRORS);
        assert_eq!(s.top_errors[0].code, ErrorCode::new("CODE_11"));
        assert_eq!(s.start_time, c.started_at());
    }

    #[test]
    fn summary_top_n_is_configurable() {
        let c = MetricsCollector::new().with_top_errors(2);
        record_n(&c, ErrorCode::TIMEOUT, 1);
        record_n(&c, ErrorCode::NOT_FOUND, 2);
        record_n(&c, ErrorCode::INTERNAL, 3);
        assert_eq!(c.get_summary().top_errors.len(), 2);
    }

    #[test]
    fn reset_clears_everything() {
        let c = MetricsCollector::new();
        record_n(&c, ErrorCode::TIMEOUT, 4);
        let before = c.started_at();
        thread::sleep(Duration::from_millis(2));
        c.reset();
        assert_eq!(c.get_total_errors(), 0);
        assert_eq!(c.get_count(&ErrorCode::TIMEOUT), 0);
        assert_eq!(c.get_count_by_severity(Severity::Error), 0);
        assert!(c.get_summary().is_empty());
        assert!(c.started_at() > before);
    }

    #[test]
    fn clones_share_counters() {
        let c = MetricsCollector::new();
        let other = c.clone();
        record_n(&other, ErrorCode::TIMEOUT, 2);
        assert_eq!(c.get_count(&ErrorCode::TIMEOUT), 2);
        c.reset();
        assert_eq!(other.get_count(&ErrorCode::TIMEOUT), 0);
    }

    #[test]
    fn concurrent_recording_loses_nothing() {
        let c = MetricsCollector::new();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cc = c.clone();
                thread::spawn(move || {
                    let code = if t % 2 == 0 {
                        ErrorCode::TIMEOUT
                    } else {
                        ErrorCode::NOT_FOUND
                    };
                    record_n(&cc, code, 250);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.get_total_errors(), 2000);
        assert_eq!(c.get_count(&ErrorCode::TIMEOUT), 1000);
        assert_eq!(c.get_count(&ErrorCode::NOT_FOUND), 1000);
        assert_eq!(c.get_count_by_severity(Severity::Error), 2000);
    }
}
