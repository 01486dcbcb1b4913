use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal failures of a pipeline run.
///
/// Per-line parse failures are not represented here, they are
/// [`crate::tokenizer::RecordError`] and are skipped and counted instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open '{}': {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("failed to read source: {0}")]
    Read(#[from] io::Error),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("internal invariant violated: {0}")]
    Invariant(String),
    #[error("{0} panicked")]
    WorkerPanicked(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn test_spawn_failure_is_not_a_read_error() {
        let err = Error::Spawn(io::Error::new(ErrorKind::OutOfMemory, "no threads left"));
        assert_eq!(err.to_string(), "failed to spawn worker thread: no threads left");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_io_conversion_means_read_failure() {
        let err: Error = io::Error::new(ErrorKind::UnexpectedEof, "truncated").into();
        assert!(matches!(err, Error::Read(_)));
        assert_eq!(err.to_string(), "failed to read source: truncated");
    }
}
