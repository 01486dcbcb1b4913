use std::num::NonZeroUsize;
use std::thread;

use crate::error::{Error, Result};

/// Default raw block size handed to the chunk reader (32MB).
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024 * 1024;

/// Default number of lock shards in the aggregate store.
pub const DEFAULT_SHARDS: usize = 256;

/// Configuration for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Raw block size read from the source per chunk (default: 32MB)
    pub chunk_size: usize,

    /// Number of ingestion worker threads (default: available parallelism)
    pub workers: usize,

    /// Capacity of the bounded chunk queue (default: 2 x workers)
    pub queue_depth: usize,

    /// Number of lock shards in the aggregate store, rounded up to a power of two (default: 256)
    pub shards: usize,

    /// Number of slices sorted in parallel before merging (default: workers)
    pub sort_workers: usize,

    /// Fold each chunk into a worker-local map before merging it into the
    /// shared store (default: true)
    pub preaggregate: bool,
}

fn available_workers() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let workers = available_workers();
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers,
            queue_depth: workers * 2,
            shards: DEFAULT_SHARDS,
            sort_workers: workers,
            preaggregate: true,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the raw block size
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Set the ingestion worker count. Queue depth and sort workers follow
    /// unless set explicitly afterwards.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self.queue_depth = workers.saturating_mul(2);
        self.sort_workers = workers;
        self
    }

    /// Set the chunk queue capacity
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Set the store shard count
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Set the number of parallel sort slices
    pub fn sort_workers(mut self, workers: usize) -> Self {
        self.sort_workers = workers;
        self
    }

    /// Enable or disable worker-local pre-aggregation
    pub fn preaggregate(mut self, enabled: bool) -> Self {
        self.preaggregate = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("chunk_size", self.chunk_size),
            ("workers", self.workers),
            ("queue_depth", self.queue_depth),
            ("shards", self.shards),
            ("sort_workers", self.sort_workers),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }
}
