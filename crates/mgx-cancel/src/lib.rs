// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cancellation primitives and per-operation context.
//!
//! [`CancellationToken`] is the raw signal; [`OpContext`] bundles a token
//! with the reason it fired and the identifiers (request, user, trace) that
//! error dispatch copies into structured errors.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod context;
mod token;

pub use context::{OpContext, RECOGNIZED_KEYS, REQUEST_ID, TRACE_ID, USER_ID};
pub use token::{CancellationReason, CancellationToken};
