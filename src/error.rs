// Typed errors for the record source, ingestion, export and store.

use std::path::PathBuf;

/// Failure decoding one log record.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A required field is absent or unset. The record is skipped; the unit continues.
    #[error("missing field: {0}")]
    MissingField(String),

    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    pub fn is_missing_field(&self) -> bool {
        matches!(self, DecodeError::MissingField(_))
    }

    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        DecodeError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failure processing one input unit (file).
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    /// Stopped because another file in the same run failed.
    #[error("{}: cancelled", path.display())]
    Cancelled { path: PathBuf },

    #[error("aggregation task failed: {0}")]
    Task(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("write: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
