use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a [`crate::store::GraphStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Neo4j(#[from] neo4rs::Error),

    /// The backend refused the operation.
    #[error("store rejected the operation: {0}")]
    Rejected(String),

    #[error("unexpected store response: {0}")]
    UnexpectedResponse(String),
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("cannot connect to graph store at {uri}: {reason}")]
    Connection { uri: String, reason: String },

    #[error("file not found: {} (also tried {})", .path.display(), .fallback.display())]
    FileNotFound { path: PathBuf, fallback: PathBuf },

    #[error("malformed input in {}{}: {reason}", .path.display(), line_suffix(.line))]
    MalformedInput {
        path: PathBuf,
        line: Option<u64>,
        reason: String,
    },

    #[error("{step}: batch {batch} failed after {attempts} attempt(s)")]
    WriteFailure {
        step: String,
        batch: usize,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("{operation} failed")]
    Store {
        operation: String,
        #[source]
        source: StoreError,
    },

    #[error("invalid import plan: {0}")]
    Plan(String),
}

fn line_suffix(line: &Option<u64>) -> String {
    line.map(|l| format!(" (line {l})")).unwrap_or_default()
}

impl ImportError {
    pub fn malformed(path: impl Into<PathBuf>, line: Option<u64>, reason: impl Into<String>) -> Self {
        ImportError::MalformedInput {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Short machine-readable kind, used in the run report.
    pub fn kind(&self) -> &'static str {
        match self {
            ImportError::Connection { .. } => "connection",
            ImportError::FileNotFound { .. } => "file_not_found",
            ImportError::MalformedInput { .. } => "malformed_input",
            ImportError::WriteFailure { .. } => "write_failure",
            ImportError::Store { .. } => "store",
            ImportError::Plan(_) => "plan",
        }
    }
}

pub type Result<T, E = ImportError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_message_includes_line() {
        let err = ImportError::malformed("data/tag.csv", Some(7), "expected 3 fields, found 2");
        assert_eq!(
            err.to_string(),
            "malformed input in data/tag.csv (line 7): expected 3 fields, found 2"
        );
        assert_eq!(err.kind(), "malformed_input");
    }

    #[test]
    fn write_failure_keeps_source() {
        let err = ImportError::WriteFailure {
            step: "Person nodes".into(),
            batch: 1,
            attempts: 4,
            source: StoreError::Rejected("disk full".into()),
        };
        assert_eq!(err.to_string(), "Person nodes: batch 1 failed after 4 attempt(s)");
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("disk full"));
    }
}
