use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for the card generation pipeline.
///
/// Input errors are reported before a batch enters its per-row phase.
/// Per-row render failures are logged and skipped by the orchestrator;
/// they never abort a batch. Missing font assets are a silent
/// degradation and have no variant here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported card type: {0:?}")]
    UnsupportedCardType(String),

    #[error("failed to read workbook {path}: {source}")]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    #[error("workbook {0} has no usable sheet")]
    EmptyWorkbook(PathBuf),

    #[error("failed to open template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },

    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("font asset {path}: {message}")]
    Font { path: PathBuf, message: String },

    #[error("output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("a batch is already running for session {0}")]
    BatchActive(String),

    #[error("worker pool: {0}")]
    Pool(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
