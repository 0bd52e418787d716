//! Scan pipeline of the NFC kiosk.
//!
//! This crate contains the debounce state machine and the poll loop that
//! ties the reader, the webhook dispatcher and the event broadcaster
//! together.
//!
//! ```text
//! ReaderLifecycle::start ─► PollLoop::run
//!                             │
//!                             ├─ CardReader::attempt_read
//!                             ├─ ScanDebouncer
//!                             ├─ Dispatch::deliver
//!                             └─ EventBroadcaster::publish
//! ```

pub mod debouncer;
pub mod error;
pub mod poll_loop;

pub use debouncer::{DebounceState, Decision, ReaderState, ScanDebouncer};
pub use error::{PipelineError, Result};
pub use poll_loop::{PollConfig, PollLoop, PollStats, Step};
