//! Bus and publish error types.

use thiserror::Error;

/// Failure of a bus operation.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus cannot accept operations right now.
    #[error("bus unavailable: {0}")]
    Unavailable(String),
    /// The bus has been shut down.
    #[error("bus closed")]
    Closed,
}

/// Failure of [`Publisher::publish`](crate::Publisher::publish).
#[derive(Debug, Error)]
pub enum PublishError {
    /// The envelope could not be serialized.
    #[error("failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The bus rejected the message.
    #[error(transparent)]
    Bus(#[from] BusError),
}
