use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use brc_pipeline::{IngestMode, PipelineConfig, Rounding};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "brc")]
#[command(author, version, about = "Per-key min/mean/max over a `key;value` file")]
struct Cli {
    /// Input file
    #[arg(default_value = "measurements.txt")]
    path: PathBuf,

    /// Bytes per read of the input
    #[arg(long)]
    block_size: Option<usize>,

    /// Worker threads (default: one per logical CPU)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Capacity of the hand-off queues (default: worker count)
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Memory-map the input instead of reading it in blocks
    #[arg(long)]
    mmap: bool,

    /// half-even or half-up
    #[arg(long, default_value_t = Rounding::HalfEven)]
    rounding: Rounding,

    /// Do not print the elapsed-time line
    #[arg(long)]
    no_timing: bool,
}

impl Cli {
    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default().with_rounding(self.rounding);
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(block_size) = self.block_size {
            config = config.with_block_size(block_size);
        }
        if let Some(capacity) = self.queue_capacity {
            config = config.with_queue_capacity(capacity);
        }
        if self.mmap {
            config = config.with_ingest(IngestMode::Mapped);
        }
        config
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    let start = Instant::now();
    let report = brc_pipeline::run_with(&cli.path, &config)
        .with_context(|| format!("failed to aggregate {}", cli.path.display()))?;

    let mut out = io::stdout().lock();
    write!(out, "{report}")?;
    if !cli.no_timing {
        writeln!(
            out,
            "Time it took since start: {:.3} seconds",
            start.elapsed().as_secs_f64()
        )?;
    }
    out.flush()?;
    Ok(())
}
