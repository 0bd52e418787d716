//! Tunable defaults for the NFC kiosk daemon.
//!
//! Every value in this module is only a *default*: all of them can be
//! overridden through the configuration file, environment variables or CLI
//! flags (see [`crate::config`]). Timing values are expressed in
//! milliseconds, matching the `*_ms` fields of the configuration.
//!
//! # Timing Model
//!
//! ```text
//!  poll ──► read (≤ read timeout) ──► debounce ──► deliver (≤ delivery timeout)
//!   ▲                                                            │
//!   └──────────────── sleep(poll interval) ◄─────────────────────┘
//! ```
//!
//! The debounce purpose is to avoid re-emitting the same physical card
//! presentation across fast poll cycles: a sub-second poll interval paired
//! with a cooldown of a few seconds.
//!
//! # Usage
//!
//! ```
//! use kiosk_core::constants::*;
//! use std::time::Duration;
//!
//! let poll = Duration::from_millis(DEFAULT_POLL_INTERVAL_MS);
//! let cooldown = Duration::from_millis(DEFAULT_COOLDOWN_MS);
//! assert!(poll < cooldown);
//! ```

// ============================================================================
// Polling & Debounce
// ============================================================================

/// Default delay between two reader polls, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default bound for a single read attempt, in milliseconds.
///
/// A read that takes longer is abandoned and counted as a hardware fault.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 250;

/// Default cooldown after an accepted scan, in milliseconds.
///
/// The contact (USB) reader historically used 3s and the proximity (I2C)
/// reader 2s. Neither value is semantically meaningful; both are defaults.
pub const DEFAULT_COOLDOWN_MS: u64 = 3000;

/// Historical cooldown of the proximity (PN532) reader, in milliseconds.
pub const PROXIMITY_COOLDOWN_MS: u64 = 2000;

/// Default number of consecutive hardware faults before the reader is
/// reported as lost.
pub const DEFAULT_FAULT_THRESHOLD: u32 = 10;

/// Default extra wait after a hardware fault, in milliseconds.
pub const DEFAULT_FAULT_BACKOFF_MS: u64 = 1000;

// ============================================================================
// Hardware Lifecycle
// ============================================================================

/// Default bound for reader initialization, in milliseconds.
pub const DEFAULT_INIT_TIMEOUT_MS: u64 = 3000;

/// Default number of re-initialization attempts after the reader is lost.
pub const DEFAULT_MAX_REINIT_ATTEMPTS: u32 = 3;

/// Default wait between two re-initialization attempts, in milliseconds.
pub const DEFAULT_REINIT_BACKOFF_MS: u64 = 2000;

/// Default I2C bus device for the PN532 module.
pub const DEFAULT_I2C_BUS: &str = "/dev/i2c-1";

/// Default 7-bit I2C address of the PN532 module.
pub const DEFAULT_PN532_ADDRESS: u16 = 0x24;

// ============================================================================
// Card Identifier
// ============================================================================

/// Minimum UID length in bytes (ISO/IEC 14443).
pub const MIN_UID_LENGTH: usize = 4;

/// Maximum UID length in bytes (ISO/IEC 14443).
pub const MAX_UID_LENGTH: usize = 10;

// ============================================================================
// Webhook Delivery
// ============================================================================

/// Default bound for one webhook delivery, in milliseconds.
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 5000;

/// Header carrying the shared secret on webhook requests.
pub const SECRET_HEADER: &str = "X-Kiosk-Key";

/// Development-only fallback secret.
///
/// Used when no secret is configured. Insecure for production: the daemon
/// logs a warning whenever this value is in effect.
pub const DEV_FALLBACK_SECRET: &str = "dev-insecure-secret";

// ============================================================================
// Serving Surface
// ============================================================================

/// Default bind address of the kiosk UI and subscriber endpoint.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// Default capacity of the broadcast channel feeding subscribers.
///
/// A subscriber that falls further behind than this skips the missed
/// messages instead of slowing down the poll loop.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// Name of the message broadcast to subscribers after every delivery.
pub const SCAN_RESULT_EVENT: &str = "scan_result";
