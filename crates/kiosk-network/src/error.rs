//! Error types for the network layer.
//!
//! Delivery failures are not errors here: the dispatcher reports them as a
//! [`DeliveryResult`](kiosk_core::DeliveryResult). [`NetworkError`] covers
//! setting up the HTTP client and running the serving surface.

use std::net::SocketAddr;
use thiserror::Error;

/// Result type alias for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Debug, Error)]
pub enum NetworkError {
    /// Failed to bind the serving surface.
    #[error("Failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    /// The webhook client could not be configured.
    #[error("Webhook client error: {0}")]
    Client(String),

    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl NetworkError {
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
