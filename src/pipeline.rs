//! Wires the splitter, the worker pool and the merger together.
//!
//! ```text
//! file -> reader thread -> [chunk queue] -> N workers -> [event queue] -> merger
//! ```
//!
//! Both queues are bounded so the reader cannot run far ahead of the
//! workers. Each worker owns its partial table and hands it over by value.
//! The first fatal error raises a shared stop flag and is returned to the
//! caller; no partial result escapes.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::ThreadPoolBuilder;
use tracing::{debug, error, info};

use crate::aggregate::PartialTable;
use crate::chunk::{ByteChunk, ChunkSource};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::merger::Merger;
use crate::parser::parse_chunk;
use crate::report::Report;

/// Messages flowing from the reader and the workers to the merger.
enum Event {
    Partial(PartialTable),
    WorkerDone { worker: usize, chunks: usize },
    Failed(PipelineError),
}

/// Aggregates `path` with the default configuration.
pub fn run(path: impl AsRef<Path>) -> Result<Report> {
    run_with(path, &PipelineConfig::default())
}

pub fn run_with(path: impl AsRef<Path>, config: &PipelineConfig) -> Result<Report> {
    let table = aggregate_file(path.as_ref(), config)?;
    Ok(Report::from_table(&table, config.rounding))
}

/// Runs the whole pipeline and returns the final, unsorted table.
pub fn aggregate_file(path: &Path, config: &PipelineConfig) -> Result<PartialTable> {
    config.validate()?;
    let source = ChunkSource::open(path, config)?;
    info!(
        path = %path.display(),
        workers = config.workers,
        block_size = config.block_size,
        ingest = ?config.ingest,
        "starting aggregation"
    );
    let table = drive(source, parse_chunk, config)?;
    info!(keys = table.len(), "aggregation finished");
    Ok(table)
}

/// Pumps `source` through `config.workers` copies of `parse` and merges
/// what comes back.
fn drive<S, P>(source: S, parse: P, config: &PipelineConfig) -> Result<PartialTable>
where
    S: Iterator<Item = Result<ByteChunk>> + Send + 'static,
    P: Fn(&[u8]) -> Result<PartialTable> + Send + Sync + 'static,
{
    let pool = ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .thread_name(|i| format!("brc-worker-{i}"))
        .panic_handler(|_| error!("worker panicked"))
        .build()?;

    let (chunk_tx, chunk_rx) = bounded::<ByteChunk>(config.queue_capacity);
    let (event_tx, event_rx) = bounded::<Event>(config.queue_capacity);
    let stop = Arc::new(AtomicBool::new(false));
    let parse = Arc::new(parse);

    let reader = {
        let events = event_tx.clone();
        let stop = Arc::clone(&stop);
        thread::Builder::new()
            .name("brc-reader".into())
            .spawn(move || split_into(source, chunk_tx, events, stop))
            .map_err(PipelineError::Spawn)?
    };

    for worker in 0..config.workers {
        let chunks = chunk_rx.clone();
        let events = event_tx.clone();
        let stop = Arc::clone(&stop);
        let parse = Arc::clone(&parse);
        pool.spawn(move || work(worker, &*parse, chunks, events, stop));
    }
    // Only the pipeline threads may hold queue ends from here on, so the
    // event queue disconnects once they have all exited.
    drop(chunk_rx);
    drop(event_tx);

    let mut merger = Merger::new();
    let outcome = merge_events(&event_rx, &mut merger, config.workers);

    if outcome.is_err() {
        stop.store(true, Ordering::Relaxed);
    }
    // Unblocks any worker parked on a send.
    drop(event_rx);
    let produced = reader.join().map_err(|_| PipelineError::WorkerPanicked);

    outcome?;
    let produced = produced?;
    check_complete(produced, merger.tables_merged())?;
    debug!(chunks = produced, "all partial tables merged");
    Ok(merger.finish())
}

fn check_complete(produced: usize, merged: usize) -> Result<()> {
    if produced != merged {
        return Err(PipelineError::Incomplete { produced, merged });
    }
    Ok(())
}

fn merge_events(events: &Receiver<Event>, merger: &mut Merger, workers: usize) -> Result<()> {
    let mut finished = 0;
    while finished < workers {
        match events.recv() {
            Ok(Event::Partial(table)) => merger.absorb(table),
            Ok(Event::WorkerDone { worker, chunks }) => {
                debug!(worker, chunks, "worker finished");
                finished += 1;
            }
            Ok(Event::Failed(e)) => return Err(e),
            // Every sender is gone but some worker never reported back.
            Err(_) => return Err(PipelineError::WorkerPanicked),
        }
    }
    Ok(())
}

/// Reader side: feeds chunks into the queue until the source is exhausted
/// or the pipeline is stopped. Returns the number of chunks handed off.
fn split_into<S>(
    mut source: S,
    chunks: Sender<ByteChunk>,
    events: Sender<Event>,
    stop: Arc<AtomicBool>,
) -> usize
where
    S: Iterator<Item = Result<ByteChunk>>,
{
    let mut produced = 0;
    // The flag is checked before pulling so no read happens after a failure.
    while !stop.load(Ordering::Relaxed) {
        let Some(chunk) = source.next() else {
            break;
        };
        match chunk {
            Ok(chunk) => {
                debug!(seq = produced, bytes = chunk.len(), "chunk ready");
                if chunks.send(chunk).is_err() {
                    break;
                }
                produced += 1;
            }
            Err(e) => {
                debug!(error = %e, "reading input failed");
                stop.store(true, Ordering::Relaxed);
                let _ = events.send(Event::Failed(e));
                break;
            }
        }
    }
    produced
}

fn work<P>(
    worker: usize,
    parse: &P,
    chunks: Receiver<ByteChunk>,
    events: Sender<Event>,
    stop: Arc<AtomicBool>,
) where
    P: Fn(&[u8]) -> Result<PartialTable>,
{
    let mut processed = 0;
    for chunk in chunks.iter() {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let parsed = panic::catch_unwind(AssertUnwindSafe(|| parse(&chunk[..])));
        drop(chunk);
        let failure = match parsed {
            Ok(Ok(table)) => {
                if events.send(Event::Partial(table)).is_err() {
                    return;
                }
                processed += 1;
                continue;
            }
            Ok(Err(e)) => e,
            Err(_) => PipelineError::WorkerPanicked,
        };
        debug!(worker, error = %failure, "parsing chunk failed");
        stop.store(true, Ordering::Relaxed);
        let _ = events.send(Event::Failed(failure));
        return;
    }
    let _ = events.send(Event::WorkerDone {
        worker,
        chunks: processed,
    });
}
