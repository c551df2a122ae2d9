//! Claim and failure payload strategies
//!
//! A work unit either uses the built-in status payload (identifier plus a
//! status column set to a fixed value) or supplies its own builder function.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::job::JobError;
use super::row::Row;

/// Status written by the default claim payload
pub const CLAIMED_STATUS: &str = "in progress";

/// Status written by the default failure payload
pub const FAILED_STATUS: &str = "error";

/// Custom claim payload builder
pub type ClaimFn = dyn Fn(&Row) -> Row + Send + Sync;

/// Custom failure payload builder
pub type FailureFn = dyn Fn(&Row, &JobError) -> Row + Send + Sync;

/// Payload setting one status column on the row named by its identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPayload {
    pub identifier_field: String,
    pub status_field: String,
    pub value: String,
}

impl StatusPayload {
    pub fn new(
        identifier_field: impl Into<String>,
        status_field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            identifier_field: identifier_field.into(),
            status_field: status_field.into(),
            value: value.into(),
        }
    }

    /// Builds `{identifier: row[identifier], status: value}`
    pub fn build(&self, row: &Row) -> Row {
        let id = row
            .identifier(&self.identifier_field)
            .cloned()
            .unwrap_or(Value::Null);
        let mut payload = Row::with_identifier(&self.identifier_field, id);
        payload.insert(self.status_field.clone(), self.value.clone());
        payload
    }
}

/// How a unit builds the mutation that claims a row
#[derive(Clone)]
pub enum ClaimPayload {
    Status(StatusPayload),
    Custom(Arc<ClaimFn>),
}

impl ClaimPayload {
    /// The default: status column set to "in progress"
    pub fn in_progress(identifier_field: &str, status_field: &str) -> Self {
        Self::Status(StatusPayload::new(
            identifier_field,
            status_field,
            CLAIMED_STATUS,
        ))
    }

    pub fn custom(f: impl Fn(&Row) -> Row + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn build(&self, row: &Row) -> Row {
        match self {
            Self::Status(status) => status.build(row),
            Self::Custom(f) => f(row),
        }
    }
}

impl fmt::Debug for ClaimPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => f.debug_tuple("Status").field(status).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How a unit builds the mutation that marks a row as failed
#[derive(Clone)]
pub enum FailurePayload {
    Status(StatusPayload),
    Custom(Arc<FailureFn>),
}

impl FailurePayload {
    /// The default: status column set to "error"
    ///
    /// The error itself is not part of the payload, so reporting the same row
    /// twice always lands on the same terminal value.
    pub fn error(identifier_field: &str, status_field: &str) -> Self {
        Self::Status(StatusPayload::new(
            identifier_field,
            status_field,
            FAILED_STATUS,
        ))
    }

    pub fn custom(f: impl Fn(&Row, &JobError) -> Row + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn build(&self, row: &Row, error: &JobError) -> Row {
        match self {
            Self::Status(status) => status.build(row),
            Self::Custom(f) => f(row, error),
        }
    }
}

impl fmt::Debug for FailurePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => f.debug_tuple("Status").field(status).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
