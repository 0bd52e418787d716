//! Error types for the poll loop.

use kiosk_hardware::HardwareError;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Conditions that end the poll loop with an error.
///
/// Hardware faults and delivery failures never show up here: the loop
/// absorbs them.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The reader was lost and every re-initialization attempt failed.
    #[error("Reader lost: {0}")]
    ReaderLost(#[source] HardwareError),
}
