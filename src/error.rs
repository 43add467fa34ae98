//! Error types for the aggregation pipeline

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// What was wrong with a record that could not be folded into a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFault {
    InvalidNumber,
    MissingDelimiter,
    ExtraDelimiter,
    InvalidUtf8Key,
}

impl fmt::Display for LineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            LineFault::InvalidNumber => "value is not a number",
            LineFault::MissingDelimiter => "missing ';' delimiter",
            LineFault::ExtraDelimiter => "more than one ';' delimiter",
            LineFault::InvalidUtf8Key => "key is not valid UTF-8",
        };
        f.write_str(msg)
    }
}

/// Pipeline errors. Every variant is fatal.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read failed at byte offset {offset}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to memory-map {}: {source}", path.display())]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed record {record:?}: {fault}")]
    Malformed { fault: LineFault, record: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to spawn reader thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("a pipeline thread panicked")]
    WorkerPanicked,

    #[error("{produced} chunks were read but {merged} partial tables were merged")]
    Incomplete { produced: usize, merged: usize },
}

impl PipelineError {
    pub(crate) fn malformed(fault: LineFault, record: &[u8]) -> Self {
        PipelineError::Malformed {
            fault,
            record: String::from_utf8_lossy(record).into_owned(),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
