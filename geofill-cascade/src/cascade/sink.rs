//! Resolution sink seam
//!
//! The fold hands each resolved record to a sink before committing it to
//! folder state. Only an accepted record updates last known and the
//! similarity cache.

use crate::record::ResolutionRecord;
use async_trait::async_trait;
use thiserror::Error;

/// Sink failures
#[derive(Debug, Error)]
pub enum SinkError {
    /// Metadata tool exited unsuccessfully
    #[error("{0}")]
    Tool(String),

    /// Metadata tool could not be spawned or the file could not be touched
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persists resolved coordinates
#[async_trait]
pub trait ResolutionSink: Send + Sync {
    async fn apply(&self, record: &ResolutionRecord) -> Result<(), SinkError>;
}

/// Accepts every record, writes nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunSink;

#[async_trait]
impl ResolutionSink for DryRunSink {
    async fn apply(&self, record: &ResolutionRecord) -> Result<(), SinkError> {
        tracing::debug!(
            file = %record.path.display(),
            action = %record.action,
            "Dry run: not writing"
        );
        Ok(())
    }
}
