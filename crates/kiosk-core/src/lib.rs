//! Domain types shared by every crate of the NFC kiosk daemon.
//!
//! The kiosk turns raw reader polls into distinct scan events, forwards each
//! event to a business-system webhook and broadcasts the outcome to display
//! clients. The types in this crate describe the data flowing through that
//! pipeline:
//!
//! - [`CardIdentifier`]: the canonical (uppercase hex) card UID.
//! - [`ScanEvent`]: an accepted, de-duplicated card presentation.
//! - [`DeliveryResult`]: the classified outcome of a webhook delivery.
//! - [`ScanResultMessage`]: the `scan_result` payload sent to subscribers.
//!
//! Configuration lives in [`config`], tunable defaults in [`constants`].

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::KioskConfig;
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
