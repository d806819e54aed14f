// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured context carried by every [`StructuredError`](crate::StructuredError).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value bag describing where and under what circumstances a failure
/// happened.
///
/// The field map is always present (possibly empty). `Clone` is a deep
/// copy, so two errors never alias each other's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Name of the operation that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Identifier of the resource involved (a path, a target name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// User on whose behalf the operation ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Correlation id of the originating request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Deployment environment (`ci`, `local`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Version of the tool that produced the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// When the context was created.
    pub timestamp: DateTime<Utc>,
    /// Captured call stack, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// Open-ended structured fields.
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            operation: None,
            resource: None,
            user: None,
            request_id: None,
            environment: None,
            version: None,
            timestamp: Utc::now(),
            stack_trace: None,
            fields: BTreeMap::new(),
        }
    }
}

impl ErrorContext {
    /// Empty context stamped with the current time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the operation name.
    #[must_use]
    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Set the resource identifier.
    #[must_use]
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Set the user.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the request id.
    #[must_use]
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Set the environment.
    #[must_use]
    pub fn environment(mut self, env: impl Into<String>) -> Self {
        self.environment = Some(env.into());
        self
    }

    /// Set the version.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Add a field. Values that fail to serialize are skipped.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.fields.insert(key.into(), v);
        }
        self
    }

    /// Copy every aspect that is set in `other` over `self`.
    ///
    /// Identity values (`operation`, `resource`, `user`, `request_id`,
    /// `environment`, `version`, `stack_trace`) are replaced only when
    /// `other` has them; fields are merged key by key with `other`
    /// winning. The original timestamp is kept.
    pub fn overlay(&mut self, other: &ErrorContext) {
        fn take(slot: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        take(&mut self.operation, &other.operation);
        take(&mut self.resource, &other.resource);
        take(&mut self.user, &other.user);
        take(&mut self.request_id, &other.request_id);
        take(&mut self.environment, &other.environment);
        take(&mut self.version, &other.version);
        take(&mut self.stack_trace, &other.stack_trace);
        for (k, v) in &other.fields {
            self.fields.insert(k.clone(), v.clone());
        }
    }
}
