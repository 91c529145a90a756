//! Flow error types.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::Record;

/// Result type for flow operations.
pub type FlowResult<T> = Result<T, FlowError>;

/// Errors that can occur while composing or running a flow.
///
/// `MissingField` and `Execution` are per-record failures and carry the
/// fields visible to the failing step. `Composition` errors are raised
/// before any record is processed.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// A required parameter has no matching field in the incoming record.
    #[error("step '{step}' is missing required field '{field}'")]
    MissingField {
        /// Name of the step that declared the parameter.
        step: String,
        /// Name of the missing field.
        field: String,
        /// Fields that were visible to the step.
        record: Record,
    },

    /// The wrapped step function failed.
    #[error("step '{step}' failed: {source}")]
    Execution {
        /// Name of the failed step.
        step: String,
        /// Fields that were visible to the step.
        record: Record,
        /// Error raised by the step function.
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// The flow has an invalid shape.
    #[error("invalid flow composition: {0}")]
    Composition(String),

    /// A value could not be converted into a record.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// The run configuration is invalid.
    #[error("invalid run configuration: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FlowError {
    /// Creates a missing field error.
    pub fn missing_field(step: impl fmt::Display, field: impl fmt::Display, record: Record) -> Self {
        Self::MissingField {
            step: step.to_string(),
            field: field.to_string(),
            record,
        }
    }

    /// Creates an execution error wrapping the error raised by a step function.
    pub fn execution(step: impl fmt::Display, record: Record, source: anyhow::Error) -> Self {
        let source: Box<dyn std::error::Error + Send + Sync> = source.into();
        Self::Execution {
            step: step.to_string(),
            record,
            source: Arc::from(source),
        }
    }

    /// Creates a composition error.
    pub fn composition(message: impl fmt::Display) -> Self {
        Self::Composition(message.to_string())
    }

    /// Creates an invalid record error.
    pub fn invalid_record(message: impl fmt::Display) -> Self {
        Self::InvalidRecord(message.to_string())
    }

    /// Creates a run configuration error.
    pub fn config(message: impl fmt::Display) -> Self {
        Self::Config(message.to_string())
    }

    /// Creates an internal error.
    pub fn internal(message: impl fmt::Display) -> Self {
        Self::Internal(message.to_string())
    }

    /// Returns the name of the step this error is attributed to, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::MissingField { step, .. } | Self::Execution { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Returns the fields visible to the failing step, if any.
    pub fn record(&self) -> Option<&Record> {
        match self {
            Self::MissingField { record, .. } | Self::Execution { record, .. } => Some(record),
            _ => None,
        }
    }

    /// Returns true if this error affects a single record rather than the run.
    pub fn is_record_failure(&self) -> bool {
        matches!(self, Self::MissingField { .. } | Self::Execution { .. })
    }
}
