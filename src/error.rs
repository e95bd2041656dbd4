//! Error types for datarepair.

use std::path::PathBuf;

/// Result type alias for datarepair operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, scoring, or repairing a dataset.
///
/// Only configuration and I/O errors ever reach the caller of a search.
/// Step failures and scoring failures are absorbed by the search loop.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        /// The path where the error occurred, if known.
        path: Option<PathBuf>,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Arrow error during data processing.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error during file operations.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON error while reading configuration or rule files.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Column not found in schema.
    #[error("Column '{name}' not found in schema")]
    ColumnNotFound {
        /// The name of the missing column.
        name: String,
    },

    /// Invalid configuration. Always fatal at setup time.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Unsupported file format.
    #[error("Unsupported format: {format}")]
    UnsupportedFormat {
        /// The unsupported format name or extension.
        format: String,
    },

    /// Empty dataset error.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// Schema mismatch between datasets or batches.
    #[error("Schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of the schema mismatch.
        message: String,
    },

    /// A step could not be applied to a dataset.
    #[error("Transform error: {message}")]
    Transform {
        /// Description of the transform error.
        message: String,
    },

    /// A value does not fit the Arrow type of its column.
    #[error("Type mismatch in column '{column}': cannot store {value} as {data_type}")]
    TypeMismatch {
        /// Column being rebuilt.
        column: String,
        /// Rendered offending value.
        value: String,
        /// Target Arrow data type.
        data_type: String,
    },

    /// A quality function failed or produced an invalid score vector.
    #[error("Evaluation error: {message}")]
    Evaluation {
        /// Description of the evaluation failure.
        message: String,
    },

    /// Parameter binding does not match an operation template's schema.
    #[error("Invalid binding for '{template}': {message}")]
    InvalidBinding {
        /// Template identifier.
        template: String,
        /// What is wrong with the binding.
        message: String,
    },
}

impl Error {
    /// Create an I/O error with a path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            path: Some(path.into()),
            source,
        }
    }

    /// Create a column not found error.
    pub fn column_not_found(name: impl Into<String>) -> Self {
        Self::ColumnNotFound { name: name.into() }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an unsupported format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Create a schema mismatch error.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Create a transform error.
    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform {
            message: message.into(),
        }
    }

    /// Create an evaluation error.
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }

    /// Create an invalid binding error.
    pub fn invalid_binding(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidBinding {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors that indicate a setup mistake rather than a
    /// data condition.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::InvalidBinding { .. } | Self::ColumnNotFound { .. }
        )
    }
}
