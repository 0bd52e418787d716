//! Reader hardware layer for the NFC kiosk.
//!
//! This crate turns a physical NFC reader into the single polling contract
//! the kiosk pipeline depends on: initialize once, then attempt bounded reads
//! that yield a card identifier or "no card present".
//!
//! # Design Philosophy
//!
//! - **Async-first**: all reader operations are native `async fn` in traits
//!   (Rust 1.90 + Edition 2024 RPITIT). Blocking driver calls run on the
//!   blocking thread pool under a timeout.
//! - **One loop, many backends**: the contact and proximity readers share one
//!   poll loop through [`CardReader`] and the [`AnyCardReader`] wrapper.
//! - **Absent is not an error**: an empty field is [`ReadOutcome::Absent`].
//!   Everything in [`HardwareError`] is either a transient fault or, for
//!   [`HardwareError::Unavailable`], fatal.
//!
//! # Backends
//!
//! | Backend | Module | Feature |
//! |---------|--------|---------|
//! | USB reader over PC/SC (ACR122U, ACR1252U) | [`contact`] | `hardware-pcsc` |
//! | PN532 over I2C with optional reset GPIO | [`proximity`] | `hardware-i2c` |
//! | Scripted mock | [`mock`] | always |
//!
//! The protocol parsing of the hardware backends is always compiled, so it
//! is tested without devices attached.
//!
//! # Example
//!
//! ```
//! use kiosk_hardware::{CardReader, ReadOutcome};
//! use kiosk_hardware::mock::MockReader;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> kiosk_hardware::Result<()> {
//!     let (mut reader, handle) = MockReader::new();
//!     reader.init(Duration::from_secs(3)).await?;
//!
//!     assert_eq!(reader.attempt_read(Duration::from_millis(250)).await?, ReadOutcome::Absent);
//!
//!     handle.present_card("04A1B2C3".parse().unwrap()).await;
//!     let outcome = reader.attempt_read(Duration::from_millis(250)).await?;
//!     assert_eq!(outcome.card().map(|id| id.to_hex()), Some("04A1B2C3".to_string()));
//!     Ok(())
//! }
//! ```

pub mod contact;
pub mod devices;
pub mod error;
pub mod lifecycle;
pub mod mock;
pub mod proximity;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use devices::{AnyCardReader, build_reader};
pub use error::{HardwareError, Result};
pub use lifecycle::{LifecycleConfig, ReaderLifecycle, Recovery};
pub use traits::CardReader;
pub use types::{ReadOutcome, ReaderInfo};
