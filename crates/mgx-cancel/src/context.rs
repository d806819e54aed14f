// SPDX-License-Identifier: MIT OR Apache-2.0
//! Operation context: a cancellation token plus propagated values.

use crate::{CancellationReason, CancellationToken};
use mgx_error::{ErrorBuilder, ErrorCode, StructuredError};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Key for the propagated request id.
pub const REQUEST_ID: &str = "request_id";
/// Key for the propagated user id.
pub const USER_ID: &str = "user_id";
/// Key for the propagated trace id.
pub const TRACE_ID: &str = "trace_id";

/// Keys that dispatch copies from an [`OpContext`] into error fields.
pub const RECOGNIZED_KEYS: [&str; 3] = [REQUEST_ID, USER_ID, TRACE_ID];

/// Cancellation signal and string values that travel with one operation.
///
/// Clones share cancellation state and reason; values are copied.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    token: CancellationToken,
    reason: Arc<Mutex<Option<CancellationReason>>>,
    values: BTreeMap<String, String>,
}

impl OpContext {
    /// Fresh, uncancelled context with no values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context observing an existing token.
    #[must_use]
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            ..Self::default()
        }
    }

    /// Copy with `key` set to `value`.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Value for `key`, if set.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// All values, ordered by key.
    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Recognized values (request, user, and trace ids) that are set.
    pub fn recognized_values(&self) -> impl Iterator<Item = (&'static str, &str)> {
        RECOGNIZED_KEYS
            .into_iter()
            .filter_map(|k| self.value(k).map(|v| (k, v)))
    }

    /// The underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel with `reason`. Only the first reason is recorded.
    pub fn cancel(&self, reason: CancellationReason) {
        {
            let mut guard = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.is_none() {
                *guard = Some(reason);
            }
        }
        debug!(target: "mgx.context", reason = reason.description(), "context cancelled");
        self.token.cancel();
    }

    /// Whether the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Recorded reason. A token cancelled directly reports
    /// [`CancellationReason::UserRequested`].
    pub fn reason(&self) -> Option<CancellationReason> {
        if !self.is_cancelled() {
            return None;
        }
        let guard = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
        Some(guard.unwrap_or(CancellationReason::UserRequested))
    }

    /// Completes once the context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Cancel with [`CancellationReason::DeadlineExceeded`] after `after`.
    ///
    /// Must be called from within a tokio runtime. Dropping the returned
    /// handle does not stop the timer; abort it to disarm.
    pub fn cancel_after(&self, after: Duration) -> tokio::task::JoinHandle<()> {
        let ctx = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            ctx.cancel(CancellationReason::DeadlineExceeded);
        })
    }

    /// Error describing why the context ended, or `None` while it is live.
    ///
    /// Deadline expiry maps to `TIMEOUT`; every other reason to `CANCELED`.
    pub fn err(&self) -> Option<StructuredError> {
        let reason = self.reason()?;
        let code = match reason {
            CancellationReason::DeadlineExceeded => ErrorCode::TIMEOUT,
            _ => ErrorCode::CANCELED,
        };
        Some(
            ErrorBuilder::new()
                .code(code)
                .message(reason.description())
                .field("reason", reason)
                .build(),
        )
    }
}
