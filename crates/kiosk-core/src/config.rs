//! Kiosk configuration.
//!
//! Configuration is layered, lowest to highest precedence:
//!
//! 1. Built-in defaults from [`crate::constants`].
//! 2. An optional TOML file (see [`KioskConfig::from_file`]).
//! 3. Environment variables and CLI flags, applied by the binary.
//!
//! ```toml
//! [reader]
//! backend = "pn532"
//! i2c_bus = "/dev/i2c-1"
//!
//! [debounce]
//! poll_interval_ms = 500
//! cooldown_ms = 2000
//!
//! [webhook]
//! url = "https://erp.example.com/nfc/scan"
//! secret = "change-me"
//!
//! [server]
//! bind = "0.0.0.0:5000"
//! ```

use crate::constants::*;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Reader backend selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderBackend {
    /// USB PC/SC contact-style reader (ACR122U, ACR1252U, ...).
    #[default]
    Pcsc,
    /// PN532 proximity module on an I2C bus.
    Pn532,
    /// Scripted reader for development without hardware.
    Mock,
}

impl fmt::Display for ReaderBackend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Pcsc => write!(f, "pcsc"),
            Self::Pn532 => write!(f, "pn532"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

impl std::str::FromStr for ReaderBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pcsc" | "usb" => Ok(Self::Pcsc),
            "pn532" | "i2c" => Ok(Self::Pn532),
            "mock" => Ok(Self::Mock),
            other => Err(Error::Config(format!(
                "Unknown reader backend '{other}' (expected pcsc, pn532 or mock)"
            ))),
        }
    }
}

/// Reader and hardware lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub backend: ReaderBackend,

    /// Bound for one read attempt.
    pub read_timeout_ms: u64,

    /// Bound for reader initialization.
    pub init_timeout_ms: u64,

    /// Substring of the PC/SC reader name to use. First reader when unset.
    pub pcsc_reader: Option<String>,

    /// I2C bus device of the PN532 module.
    pub i2c_bus: String,

    /// 7-bit I2C address of the PN532 module.
    pub i2c_address: u16,

    /// GPIO chip holding the PN532 reset line, e.g. `/dev/gpiochip0`.
    pub reset_chip: Option<String>,

    /// Offset of the PN532 reset line on `reset_chip`.
    pub reset_line: Option<u32>,

    /// Re-initialization attempts after the reader is lost.
    pub max_reinit_attempts: u32,

    /// Wait between two re-initialization attempts.
    pub reinit_backoff_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            backend: ReaderBackend::default(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            init_timeout_ms: DEFAULT_INIT_TIMEOUT_MS,
            pcsc_reader: None,
            i2c_bus: DEFAULT_I2C_BUS.to_string(),
            i2c_address: DEFAULT_PN532_ADDRESS,
            reset_chip: None,
            reset_line: None,
            max_reinit_attempts: DEFAULT_MAX_REINIT_ATTEMPTS,
            reinit_backoff_ms: DEFAULT_REINIT_BACKOFF_MS,
        }
    }
}

impl ReaderConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn reinit_backoff(&self) -> Duration {
        Duration::from_millis(self.reinit_backoff_ms)
    }
}

/// Poll loop and debounce tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    pub poll_interval_ms: u64,

    /// Cooldown after an accepted scan. Falls back to a per-backend default.
    pub cooldown_ms: Option<u64>,

    /// Consecutive faults before the reader is reported lost.
    pub fault_threshold: u32,

    /// Extra wait after each fault.
    pub fault_backoff_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            cooldown_ms: None,
            fault_threshold: DEFAULT_FAULT_THRESHOLD,
            fault_backoff_ms: DEFAULT_FAULT_BACKOFF_MS,
        }
    }
}

impl DebounceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fault_backoff(&self) -> Duration {
        Duration::from_millis(self.fault_backoff_ms)
    }

    /// Effective cooldown for the given backend.
    pub fn cooldown_for(&self, backend: ReaderBackend) -> Duration {
        let ms = self.cooldown_ms.unwrap_or(match backend {
            ReaderBackend::Pn532 => PROXIMITY_COOLDOWN_MS,
            ReaderBackend::Pcsc | ReaderBackend::Mock => DEFAULT_COOLDOWN_MS,
        });
        Duration::from_millis(ms)
    }
}

/// Webhook delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub secret: Option<String>,
    pub timeout_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            secret: None,
            timeout_ms: DEFAULT_DELIVERY_TIMEOUT_MS,
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Configured secret, or the development fallback.
    ///
    /// The boolean is `true` when the insecure fallback is in effect.
    pub fn effective_secret(&self) -> (&str, bool) {
        match self.secret.as_deref() {
            Some(secret) if !secret.is_empty() => (secret, false),
            _ => (DEV_FALLBACK_SECRET, true),
        }
    }
}

/// Serving surface settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND_ADDR.to_string(),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Parse the bind address.
    ///
    /// # Errors
    /// Returns `Error::Config` if `bind` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address '{}': {e}", self.bind)))
    }
}

/// Complete kiosk configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    pub reader: ReaderConfig,
    pub debounce: DebounceConfig,
    pub webhook: WebhookConfig,
    pub server: ServerConfig,
}

impl KioskConfig {
    /// Parse a configuration from TOML text. Missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns `Error::ConfigParse` on malformed TOML or unknown values.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load a configuration from a TOML file.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be read and
    /// `Error::ConfigParse` if it is not valid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Effective cooldown for the configured backend.
    pub fn cooldown(&self) -> Duration {
        self.debounce.cooldown_for(self.reader.backend)
    }

    /// Check the configuration before anything is started.
    ///
    /// # Errors
    /// - `Error::MissingConfig` if the webhook URL is not set.
    /// - `Error::Config` on a non-http(s) URL, a zero interval or timeout,
    ///   a zero fault threshold or an invalid bind address.
    pub fn validate(&self) -> Result<()> {
        let url = self
            .webhook
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Error::MissingConfig("webhook.url".to_string()))?;

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "Webhook URL must use http or https, got '{url}'"
            )));
        }

        let non_zero = [
            ("debounce.poll_interval_ms", self.debounce.poll_interval_ms),
            ("reader.read_timeout_ms", self.reader.read_timeout_ms),
            ("reader.init_timeout_ms", self.reader.init_timeout_ms),
            ("webhook.timeout_ms", self.webhook.timeout_ms),
        ];
        for (key, value) in non_zero {
            if value == 0 {
                return Err(Error::Config(format!("{key} must be greater than zero")));
            }
        }

        if self.cooldown().is_zero() {
            return Err(Error::Config(
                "debounce.cooldown_ms must be greater than zero".to_string(),
            ));
        }

        if self.debounce.fault_threshold == 0 {
            return Err(Error::Config(
                "debounce.fault_threshold must be at least 1".to_string(),
            ));
        }

        if self.server.broadcast_capacity == 0 {
            return Err(Error::Config(
                "server.broadcast_capacity must be at least 1".to_string(),
            ));
        }

        self.server.bind_addr()?;
        Ok(())
    }
}
