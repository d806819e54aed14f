// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error-code definitions.

use mgx_error::{ErrorCode, Severity};
use serde::{Deserialize, Serialize};

/// Codes that are retryable unless a definition says otherwise.
pub const RETRYABLE_CODES: [ErrorCode; 7] = [
    ErrorCode::INTERNAL,
    ErrorCode::TIMEOUT,
    ErrorCode::RESOURCE_EXHAUSTED,
    ErrorCode::UNAVAILABLE,
    ErrorCode::BUILD_FAILED,
    ErrorCode::TEST_FAILED,
    ErrorCode::COMMAND_TIMEOUT,
];

/// Metadata describing one error code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDefinition {
    /// The code being described.
    pub code: ErrorCode,
    /// What the code means.
    pub description: String,
    /// Default severity for errors with this code.
    pub severity: Severity,
    /// Family the code belongs to.
    pub category: String,
    /// Whether operations failing with this code may be retried.
    pub retryable: bool,
    /// Message suitable for end users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    /// Link to further help.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_url: Option<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ErrorDefinition {
    /// Definition with category, retryability, and tags derived from the
    /// code itself.
    pub fn new(code: ErrorCode, description: impl Into<String>, severity: Severity) -> Self {
        let category = code.category();
        let retryable = RETRYABLE_CODES.contains(&code);
        let tags = derive_tags(&code);
        Self {
            code,
            description: description.into(),
            severity,
            category,
            retryable,
            user_message: None,
            help_url: None,
            tags,
        }
    }

    /// Override the category.
    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Override retryability.
    #[must_use]
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Set the end-user message.
    #[must_use]
    pub fn user_message(mut self, msg: impl Into<String>) -> Self {
        self.user_message = Some(msg.into());
        self
    }

    /// Set the help link.
    #[must_use]
    pub fn help_url(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }
}

fn derive_tags(code: &ErrorCode) -> Vec<String> {
    let text = code.as_str();
    let mut tags = vec![code.category()];
    for (needle, tag) in [
        ("FAILED", "failure"),
        ("TIMEOUT", "timeout"),
        ("INVALID", "validation"),
        ("NOT_FOUND", "missing"),
    ] {
        if text.contains(needle) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Definitions every new registry starts with.
pub(crate) fn builtin_definitions() -> Vec<ErrorDefinition> {
    use ErrorCode as C;
    use Severity as S;
    vec![
        ErrorDefinition::new(C::UNKNOWN, "Unknown error occurred", S::Error),
        ErrorDefinition::new(C::INTERNAL, "Internal error", S::Error),
        ErrorDefinition::new(C::INVALID_ARGUMENT, "Invalid argument provided", S::Warning),
        ErrorDefinition::new(C::NOT_FOUND, "Resource not found", S::Warning),
        ErrorDefinition::new(C::TIMEOUT, "Operation timed out", S::Error),
        ErrorDefinition::new(C::UNAVAILABLE, "Dependency unavailable", S::Error),
        ErrorDefinition::new(C::RESOURCE_EXHAUSTED, "Resource exhausted", S::Error),
        ErrorDefinition::new(C::CANCELED, "Operation canceled", S::Info),
        ErrorDefinition::new(C::BUILD_FAILED, "Build process failed", S::Error),
        ErrorDefinition::new(C::TEST_FAILED, "Test execution failed", S::Error),
        ErrorDefinition::new(C::LINT_FAILED, "Lint checks failed", S::Error),
        ErrorDefinition::new(C::FILE_NOT_FOUND, "File not found", S::Error),
        ErrorDefinition::new(C::FILE_ACCESS_DENIED, "File access denied", S::Error),
        ErrorDefinition::new(C::CONFIG_NOT_FOUND, "Configuration not found", S::Error),
        ErrorDefinition::new(C::CONFIG_INVALID, "Invalid configuration", S::Error),
        ErrorDefinition::new(C::COMMAND_FAILED, "Command failed", S::Error),
        ErrorDefinition::new(C::COMMAND_TIMEOUT, "Command timed out", S::Error),
        ErrorDefinition::new(C::new("DEPLOY_FAILED"), "Deployment process failed", S::Error),
        ErrorDefinition::new(C::new("DEPLOY_ROLLBACK"), "Deployment rolled back", S::Warning),
        ErrorDefinition::new(C::new("SECURITY_VIOLATION"), "Security violation detected", S::Critical),
        ErrorDefinition::new(C::new("AUTH_FAILED"), "Authentication failed", S::Error),
    ]
}
