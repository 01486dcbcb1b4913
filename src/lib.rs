//! Parallel min/max/mean aggregation over `key;value` lines.
//!
//! ```no_run
//! use brc_pipeline::{Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::new(PipelineConfig::default().chunk_size(64 * 1024 * 1024))?;
//! let outcome = pipeline.run_file("measurements.txt")?;
//! println!("{}", outcome.report()?);
//! # Ok::<(), brc_pipeline::Error>(())
//! ```

pub mod chunk;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod sort;
pub mod store;
pub mod tokenizer;

pub use chunk::{Chunk, ChunkReader};
pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use pipeline::{IngestStats, Outcome, Pipeline};
pub use registry::KeyRegistry;
pub use sort::parallel_sort_merge;
pub use store::{AggregateStore, Applied, Measurement};
pub use tokenizer::{Record, RecordError, RecordErrorKind, Tokenizer};
