//! Error types for the reconciliation engine.
//!
//! Only environment-level failures are errors. Missing yearly files,
//! unparsable lines and unmatched mentions are data and travel in the
//! stage results instead.

use std::path::PathBuf;

/// Fatal errors: the run cannot continue.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The directory holding the yearly registry files does not exist.
    #[error("base directory not found: {path:?}")]
    MissingBaseDir { path: PathBuf },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A legacy-charset table that does not decode cleanly.
    #[error("invalid encoding in {path:?}")]
    Encoding { path: PathBuf },

    /// A required column is absent from a tabular source.
    #[error("column {column:?} not found in {path:?}")]
    MissingColumn { path: PathBuf, column: String },

    /// Tabular read or write failure.
    #[error("CSV error at {path:?}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    /// JSON read or write failure (config file, run report).
    #[error("JSON error at {path:?}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReconcileError>;

impl ReconcileError {
    /// Wrap a `std::io::Error` with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a `csv::Error` with the path it happened at.
    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    /// Wrap a `serde_json::Error` with the path it happened at.
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let err = ReconcileError::config("year_start after year_end");
        assert_eq!(err.to_string(), "config error: year_start after year_end");

        let err = ReconcileError::MissingBaseDir {
            path: PathBuf::from("source"),
        };
        assert!(err.to_string().contains("source"));
    }
}
