//! Startup and persistence error taxonomy.
//!
//! Startup errors are returned synchronously from `Controller::start` before any frame is
//! processed. Per-iteration errors are logged by the loop and never stop it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapwatchError {
    /// `start` was called without a model selection.
    #[error("no detection model selected")]
    NoModelSelected,

    /// The detector could not be constructed. Fatal for startup.
    #[error("failed to load model '{model}': {source}")]
    ModelLoad {
        model: String,
        #[source]
        source: anyhow::Error,
    },

    /// The frame source could not be opened. Fatal for startup.
    #[error("failed to open frame source '{url}': {source}")]
    Device {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("detection loop already running")]
    AlreadyRunning,

    /// The detection worker thread could not be spawned.
    #[error("failed to start detection worker: {0}")]
    Worker(#[source] std::io::Error),

    /// A snapshot write failed. Logged; the loop continues.
    #[error("failed to persist snapshot: {0}")]
    Persistence(#[source] anyhow::Error),
}

pub type SnapwatchResult<T> = std::result::Result<T, SnapwatchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn worker_error_keeps_the_io_cause() {
        let err = SnapwatchError::Worker(io::Error::new(io::ErrorKind::WouldBlock, "no threads"));
        assert_eq!(
            err.to_string(),
            "failed to start detection worker: no threads"
        );
        let cause = err
            .source()
            .and_then(|source| source.downcast_ref::<io::Error>())
            .map(io::Error::kind);
        assert_eq!(cause, Some(io::ErrorKind::WouldBlock));
    }
}
