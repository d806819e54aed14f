// SPDX-License-Identifier: MIT OR Apache-2.0
//! Recovery and retry for fallible, possibly panicking work.
//!
//! [`RecoveryEngine::recover`] converts panics into [`Failure`](mgx_error::Failure)s.
//! The retry strategies build on it:
//!
//! - [`RecoveryEngine::recover_with_fallback`]: hand a failure to a fallback.
//! - [`RecoveryEngine::recover_with_retry`]: fixed delay between attempts.
//! - [`RecoveryEngine::recover_with_backoff`]: jittered exponential backoff
//!   with an optional retry predicate.
//! - [`RecoveryEngine::recover_with_context`]: race the work against an
//!   [`OpContext`](mgx_cancel::OpContext) on the tokio blocking pool.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backoff;
mod engine;

pub use backoff::{
    BackoffConfig, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES,
    DEFAULT_MULTIPLIER, RetryPredicate, all_of, retry_if_not_critical, retry_if_retryable,
    retry_if_timeout,
};
pub use engine::RecoveryEngine;
