//! Reader -> bounded queue -> worker pool -> store, then drain and sort.
//!
//! The calling thread drives the [`ChunkReader`] and feeds a bounded
//! `crossbeam-channel` queue, so a slow worker pool stalls reading instead of
//! growing memory. Workers are scoped threads borrowing the store; the scope
//! exit is the barrier after which the registry is drained and sorted.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::ThreadPoolBuilder;
use rustc_hash::FxHashMap;
use tracing::{debug, info, trace, warn};

use crate::chunk::{Chunk, ChunkReader};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::report;
use crate::sort::parallel_sort_merge;
use crate::store::{AggregateStore, Measurement};
use crate::tokenizer::{RecordError, Tokenizer};

/// Malformed lines logged individually before the rest are only counted.
const MALFORMED_LOG_LIMIT: u64 = 10;

/// A chunk starting with this makes its worker panic.
#[cfg(test)]
const PANIC_MARKER: &[u8] = b"!panic";

/// Counters collected over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub chunks: u64,
    pub bytes: u64,
    pub records: u64,
    pub malformed: u64,
}

#[derive(Default)]
struct Counters {
    chunks: AtomicU64,
    bytes: AtomicU64,
    records: AtomicU64,
    malformed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> IngestStats {
        IngestStats {
            chunks: self.chunks.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }

    fn skip(&self, err: &RecordError) {
        let seen = self.malformed.fetch_add(1, Ordering::Relaxed);
        if seen < MALFORMED_LOG_LIMIT {
            warn!(kind = ?err.kind, line = %err.line, "skipping malformed record");
        } else if seen == MALFORMED_LOG_LIMIT {
            warn!("further malformed records will be counted but not logged");
        }
    }
}

/// Result of a completed run: the filled store plus its keys in sorted order.
pub struct Outcome {
    store: AggregateStore,
    keys: Vec<String>,
    stats: IngestStats,
}

impl Outcome {
    pub fn store(&self) -> &AggregateStore {
        &self.store
    }

    /// Every distinct key in ascending byte-wise order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// `(key, measurement)` pairs in sorted key order.
    pub fn entries(&self) -> Result<Vec<(&str, Measurement)>> {
        report::collect_entries(&self.keys, &self.store)
    }

    /// The `{key=min/max/mean, ...}` report.
    pub fn report(&self) -> Result<String> {
        Ok(report::format_report(self.entries()?))
    }
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run_file(&self, path: impl AsRef<Path>) -> Result<Outcome> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "reading source file");
        self.run(file)
    }

    /// Runs ingestion to completion, then drains and sorts the key set.
    pub fn run<R: Read>(&self, source: R) -> Result<Outcome> {
        let store = AggregateStore::new(self.config.shards);
        let counters = Counters::default();

        let started = Instant::now();
        info!(
            workers = self.config.workers,
            chunk_size = self.config.chunk_size,
            queue_depth = self.config.queue_depth,
            shards = store.shard_count(),
            "starting ingestion"
        );
        self.ingest(source, &store, &counters)?;
        store.verify()?;

        let stats = counters.snapshot();
        info!(
            elapsed = ?started.elapsed(),
            chunks = stats.chunks,
            bytes = stats.bytes,
            records = stats.records,
            malformed = stats.malformed,
            keys = store.len(),
            "ingestion finished"
        );
        if stats.malformed > 0 {
            warn!(malformed = stats.malformed, "skipped malformed records");
        }

        let started = Instant::now();
        let keys = store.registry().drain();
        let keys = self.sort_keys(keys)?;
        info!(elapsed = ?started.elapsed(), keys = keys.len(), "keys sorted");

        Ok(Outcome { store, keys, stats })
    }

    fn ingest<R: Read>(&self, source: R, store: &AggregateStore, counters: &Counters) -> Result<()> {
        let abort = AtomicBool::new(false);
        let preaggregate = self.config.preaggregate;

        thread::scope(|scope| -> Result<()> {
            let (tx, rx) = bounded::<Chunk>(self.config.queue_depth);
            let handles: Vec<_> = (0..self.config.workers)
                .map(|id| {
                    let rx = rx.clone();
                    let abort = &abort;
                    thread::Builder::new()
                        .name(format!("ingest-{id}"))
                        .spawn_scoped(scope, move || {
                            ingest_worker(id, rx, store, counters, abort, preaggregate)
                        })
                })
                .collect::<std::io::Result<_>>()
                .map_err(Error::Spawn)?;
            drop(rx);

            let produced = produce(ChunkReader::new(source, self.config.chunk_size), &tx, counters);
            if produced.is_err() {
                abort.store(true, Ordering::Relaxed);
            }
            // Closing the queue lets the workers run dry and exit.
            drop(tx);

            let panicked = handles
                .into_iter()
                .map(|handle| handle.join())
                .filter(|joined| joined.is_err())
                .count();
            produced?;
            if panicked > 0 {
                return Err(Error::WorkerPanicked("ingestion worker"));
            }
            Ok(())
        })
    }

    fn sort_keys(&self, keys: Vec<String>) -> Result<Vec<String>> {
        let workers = self.config.sort_workers;
        if keys.len() <= 1 || workers <= 1 {
            return Ok(parallel_sort_merge(keys, workers));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("sort-{i}"))
            .build()
            .map_err(|err| Error::Config(format!("failed to build sort pool: {err}")))?;
        Ok(pool.install(|| parallel_sort_merge(keys, workers)))
    }
}

fn produce<R: Read>(reader: ChunkReader<R>, tx: &Sender<Chunk>, counters: &Counters) -> Result<()> {
    for chunk in reader {
        let chunk = chunk?;
        counters.chunks.fetch_add(1, Ordering::Relaxed);
        counters.bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        trace!(len = chunk.len(), "queueing chunk");
        if tx.send(chunk).is_err() {
            // Every worker is gone; the join below reports why.
            break;
        }
    }
    Ok(())
}

fn ingest_worker(
    id: usize,
    rx: Receiver<Chunk>,
    store: &AggregateStore,
    counters: &Counters,
    abort: &AtomicBool,
    preaggregate: bool,
) {
    let mut chunks = 0u64;
    for chunk in rx.iter() {
        if abort.load(Ordering::Relaxed) {
            break;
        }
        #[cfg(test)]
        if chunk.starts_with(PANIC_MARKER) {
            panic!("ingest-{id} hit a panic marker");
        }
        let records = if preaggregate {
            ingest_preaggregated(&chunk, store, counters)
        } else {
            ingest_direct(&chunk, store, counters)
        };
        counters.records.fetch_add(records, Ordering::Relaxed);
        chunks += 1;
    }
    debug!(worker = id, chunks, "ingestion worker done");
}

/// Applies every record of the chunk straight to the shared store.
fn ingest_direct(chunk: &[u8], store: &AggregateStore, counters: &Counters) -> u64 {
    let mut records = 0;
    for record in Tokenizer::new(chunk) {
        match record {
            Ok(record) => {
                store.apply(record.key, record.value);
                records += 1;
            }
            Err(err) => counters.skip(&err),
        }
    }
    records
}

/// Folds the chunk into a local map first, then merges one partial per key.
fn ingest_preaggregated(chunk: &[u8], store: &AggregateStore, counters: &Counters) -> u64 {
    let mut local: FxHashMap<&str, Measurement> = FxHashMap::with_capacity_and_hasher(1024, Default::default());
    let mut records = 0;
    for record in Tokenizer::new(chunk) {
        match record {
            Ok(record) => {
                local
                    .entry(record.key)
                    .and_modify(|m| m.fold(record.value))
                    .or_insert_with(|| Measurement::new(record.value));
                records += 1;
            }
            Err(err) => counters.skip(&err),
        }
    }
    for (key, partial) in &local {
        store.merge(key, partial);
    }
    records
}
