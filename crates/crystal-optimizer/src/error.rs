use std::path::PathBuf;

/// Errors that can occur when exporting a performance report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Failed to write the report file.
    #[error("failed to write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
