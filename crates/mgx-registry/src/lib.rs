// SPDX-License-Identifier: MIT OR Apache-2.0
//! Catalogue of error-code definitions.
//!
//! The recovery engine only needs [`DefinitionLookup`] to decide whether a
//! code is retryable; [`ErrorRegistry`] adds the CRUD surface on top.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod definition;
mod registry;

pub use definition::{ErrorDefinition, RETRYABLE_CODES};
pub use registry::{DefinitionLookup, ErrorRegistry, RegistryError};
