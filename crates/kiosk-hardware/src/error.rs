//! Error types for reader operations.
//!
//! "No card present" is not an error: it is reported as
//! [`ReadOutcome::Absent`](crate::types::ReadOutcome::Absent). Everything in
//! [`HardwareError`] except [`HardwareError::Unavailable`] is a transient
//! hardware fault that the poll loop absorbs and retries.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during reader operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Reader is not connected or has been unplugged.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// No usable reader: fatal at startup or after re-init is exhausted.
    #[error("Reader unavailable: {message}")]
    Unavailable { message: String },

    /// Device communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Malformed response received from the reader.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout {
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Create a new reader unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Whether this error means no reader can be used at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Whether this error is a transient hardware fault that polling absorbs.
    ///
    /// A read that fails with anything else means the reader needs a full
    /// re-initialization.
    pub fn is_fault(&self) -> bool {
        !self.is_unavailable()
    }

    /// Convert any error raised during initialization into `Unavailable`.
    pub(crate) fn into_unavailable(self) -> Self {
        match self {
            Self::Unavailable { .. } => self,
            other => Self::unavailable(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for HardwareError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::communication(format!("reader task failed: {err}"))
    }
}
