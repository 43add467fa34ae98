//! Parallel min/mean/max aggregation of `key;value` lines.
//!
//! The input is read in line-aligned chunks, each chunk is parsed into its
//! own partial table on a worker thread, and the partial tables are merged
//! into one final table as they arrive.
//!
//! ```no_run
//! let report = brc_pipeline::run("measurements.txt")?;
//! print!("{report}");
//! # Ok::<(), brc_pipeline::PipelineError>(())
//! ```

pub mod aggregate;
pub mod chunk;
pub mod config;
pub mod error;
pub mod merger;
pub mod parser;
pub mod pipeline;
pub mod report;

pub use aggregate::{PartialTable, StationAggregate};
pub use config::{IngestMode, PipelineConfig, Rounding};
pub use error::{LineFault, PipelineError, Result};
pub use pipeline::{aggregate_file, run, run_with};
pub use report::{Report, ReportRow};
