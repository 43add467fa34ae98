//! Pipeline tuning knobs.

use std::fmt;
use std::str::FromStr;
use std::thread;

use crate::error::{PipelineError, Result};

/// Reference block size for the splitter: 4 MiB.
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// How the input file is brought into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// Sequential fixed-size reads; every chunk is a freshly owned buffer.
    #[default]
    Buffered,
    /// Memory-map the whole file; chunks are line-aligned ranges of the map.
    Mapped,
}

/// One-decimal rounding rule used when rendering the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rounding {
    /// Round the exact binary value to the nearest tenth, ties to even.
    /// This is what `{:.1}` does.
    #[default]
    HalfEven,
    /// `floor(x * 10 + 0.5) / 10`. Ties go toward positive infinity and
    /// negative zero is printed as `0.0`.
    HalfUp,
}

impl fmt::Display for Rounding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rounding::HalfEven => f.write_str("half-even"),
            Rounding::HalfUp => f.write_str("half-up"),
        }
    }
}

impl FromStr for Rounding {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "half-even" => Ok(Rounding::HalfEven),
            "half-up" => Ok(Rounding::HalfUp),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown rounding mode '{other}' (expected half-even or half-up)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub block_size: usize,
    pub workers: usize,
    pub queue_capacity: usize,
    pub ingest: IngestMode,
    pub rounding: Rounding,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            workers,
            queue_capacity: workers,
            ingest: IngestMode::default(),
            rounding: Rounding::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the pool size. The queue capacity follows it.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self.queue_capacity = workers;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_ingest(mut self, ingest: IngestMode) -> Self {
        self.ingest = ingest;
        self
    }

    pub fn with_rounding(mut self, rounding: Rounding) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "block size must be at least 1 byte".into(),
            ));
        }
        if self.workers == 0 {
            return Err(PipelineError::InvalidConfig(
                "worker count must be at least 1".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "queue capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert!(config.workers >= 1);
        assert_eq!(config.queue_capacity, config.workers);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let base = PipelineConfig::default();
        for config in [
            base.clone().with_block_size(0),
            base.clone().with_workers(0),
            base.with_queue_capacity(0),
        ] {
            assert!(matches!(
                config.validate(),
                Err(PipelineError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn rounding_parses_from_cli_names() {
        assert_eq!("half-even".parse::<Rounding>().unwrap(), Rounding::HalfEven);
        assert_eq!("half-up".parse::<Rounding>().unwrap(), Rounding::HalfUp);
        assert!("nearest".parse::<Rounding>().is_err());
        assert_eq!(Rounding::HalfUp.to_string(), "half-up");
    }
}
