//! Custom error types for the equity processing pipeline.
//!
//! This module provides the error hierarchy using `thiserror`.
//! Structural problems (missing columns, bad configuration) are errors;
//! individual bad values are excluded and counted by the stages instead.
//!
//! Errors are serializable so a presentation layer can display them
//! as a `{code, message}` pair.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the equity pipeline.
#[derive(Error, Debug)]
pub enum EquityError {
    /// A required column is missing from the table.
    #[error("Required column '{column}' not found in table")]
    Schema { column: String },

    /// A value could not be parsed and strict handling was requested.
    #[error("Invalid value '{value}' in column '{column}': {reason}")]
    Data {
        column: String,
        value: String,
        reason: String,
    },

    /// A referenced sensitive-attribute group has no rows.
    #[error("Group '{0}' has no rows in the metrics table")]
    EmptyGroup(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input file type the record source cannot parse.
    #[error("Unsupported file type: '{0}'")]
    UnsupportedFormat(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EquityError>,
    },
}

impl EquityError {
    /// Shorthand for a [`EquityError::Schema`] error.
    pub fn missing_column(column: impl Into<String>) -> Self {
        EquityError::Schema {
            column: column.into(),
        }
    }

    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EquityError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get error code for frontend handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "SCHEMA_ERROR",
            Self::Data { .. } => "DATA_ERROR",
            Self::EmptyGroup(_) => "EMPTY_GROUP",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Name of the offending column, if the error is about one.
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::Schema { column } | Self::Data { column, .. } => Some(column),
            Self::WithContext { source, .. } => source.column(),
            _ => None,
        }
    }

    /// Check if this error is structural, i.e. fatal for the whole run.
    pub fn is_structural(&self) -> bool {
        match self {
            Self::Schema { .. } | Self::InvalidConfig(_) | Self::EmptyGroup(_) => true,
            Self::WithContext { source, .. } => source.is_structural(),
            _ => false,
        }
    }
}

impl From<crate::config::ConfigValidationError> for EquityError {
    fn from(e: crate::config::ConfigValidationError) -> Self {
        EquityError::InvalidConfig(e.to_string())
    }
}

impl Serialize for EquityError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("EquityError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for equity pipeline operations.
pub type Result<T> = std::result::Result<T, EquityError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| EquityError::Polars(e).with_context(context))
    }
}
