//! Reader adapter trait definition.
//!
//! [`CardReader`] is the single polling contract shared by every reader
//! backend. The poll loop only ever talks to a reader through this trait, so
//! the contact (PC/SC) and proximity (PN532) variants share one loop instead
//! of duplicating it.
//!
//! All methods use native `async fn` (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::types::{ReadOutcome, ReaderInfo};
use std::time::Duration;

/// Card reader abstraction.
///
/// # Contract
///
/// - [`init`](CardReader::init) runs once before polling starts (and again on
///   re-initialization). It must detect an absent reader deterministically
///   within `timeout` and report it as
///   [`HardwareError::Unavailable`](crate::HardwareError::Unavailable).
///   Backends that need a physical reset sequence perform it here.
/// - [`attempt_read`](CardReader::attempt_read) performs one bounded read.
///   "No card present" is [`ReadOutcome::Absent`], never an error. Unplugged
///   readers, timeouts and malformed responses are errors (hardware faults).
/// - [`release`](CardReader::release) frees bus handles and reset lines on
///   shutdown.
///
/// # Object Safety and Dynamic Dispatch
///
/// **NOTE**: This trait is NOT object-safe because `async fn` methods return
/// `impl Future`. Use generic type parameters, or the enum wrapper
/// [`AnyCardReader`](crate::devices::AnyCardReader) for runtime selection.
///
/// # Examples
///
/// ```no_run
/// use kiosk_hardware::traits::CardReader;
/// use kiosk_hardware::types::ReadOutcome;
/// use kiosk_hardware::error::Result;
/// use std::time::Duration;
///
/// async fn wait_for_card<R: CardReader>(reader: &mut R) -> Result<String> {
///     loop {
///         if let ReadOutcome::Card(id) = reader.attempt_read(Duration::from_millis(250)).await? {
///             return Ok(id.to_hex());
///         }
///         tokio::time::sleep(Duration::from_millis(500)).await;
///     }
/// }
/// ```
pub trait CardReader: Send + Sync {
    /// Initialize the reader.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Unavailable` if no reader answers within
    /// `timeout`.
    async fn init(&mut self, timeout: Duration) -> Result<ReaderInfo>;

    /// Attempt a single card read bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The reader is disconnected or was never initialized
    /// - The read does not complete within `timeout`
    /// - The reader returns a malformed response
    async fn attempt_read(&mut self, timeout: Duration) -> Result<ReadOutcome>;

    /// Release hardware resources held by the reader.
    ///
    /// # Errors
    ///
    /// Returns an error if a handle could not be closed cleanly. The
    /// resources are considered released either way.
    async fn release(&mut self) -> Result<()>;
}
