//! Common types shared across reader backends.

use kiosk_core::CardIdentifier;
use serde::{Deserialize, Serialize};

/// Outcome of a single read attempt.
///
/// "No card present" is the dominant, expected outcome of polling and is
/// represented here rather than as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A card is in the field; its identifier was read.
    Card(CardIdentifier),

    /// No card in the field.
    Absent,
}

impl ReadOutcome {
    /// Get the identifier if a card was read.
    pub fn card(&self) -> Option<&CardIdentifier> {
        match self {
            Self::Card(id) => Some(id),
            Self::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Reader information reported by a successful initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderInfo {
    /// Reader name (e.g., "ACS ACR122U PICC Interface 00 00").
    pub name: String,

    /// Backend that drives the reader ("pcsc", "pn532", "mock").
    pub backend: String,

    /// Optional firmware version string.
    pub firmware: Option<String>,
}

impl ReaderInfo {
    /// Create a new ReaderInfo with required fields.
    pub fn new(name: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: backend.into(),
            firmware: None,
        }
    }

    /// Set the firmware version.
    pub fn with_firmware(mut self, firmware: impl Into<String>) -> Self {
        self.firmware = Some(firmware.into());
        self
    }
}
