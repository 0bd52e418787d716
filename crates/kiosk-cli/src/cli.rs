//! Command line and environment configuration.
//!
//! Settings are layered: built-in defaults, then the optional TOML file, then
//! flags or their environment variables. The result is validated before any
//! hardware or socket is touched.

use clap::Parser;
use kiosk_core::{KioskConfig, Result, config::ReaderBackend};
use std::path::PathBuf;

const BACKENDS_HELP: &str = "\
Reader backends are compiled in through cargo features:
  pcsc   --features hardware-pcsc   USB readers (ACR122U, ACR1252U) via PC/SC
  pn532  --features hardware-i2c    PN532 module on an I2C bus
  mock   always available           card ids typed on stdin

The default backend is pcsc. A build without hardware-pcsc needs
--reader mock or --reader pn532, otherwise startup fails.";

#[derive(Debug, Parser)]
#[command(
    name = "nfc-kiosk",
    version,
    about = "NFC kiosk scan forwarder",
    after_help = BACKENDS_HELP
)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "KIOSK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Webhook that receives `{"card_id": "<HEX>"}` for every accepted scan
    #[arg(long, env = "ODOO_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Shared secret sent in the X-Kiosk-Key header
    #[arg(long, env = "APP_SECRET_KEY", hide_env_values = true)]
    pub secret: Option<String>,

    /// Reader backend: pcsc, pn532 or mock
    #[arg(long, env = "KIOSK_READER")]
    pub reader: Option<ReaderBackend>,

    /// Delay between two read attempts
    #[arg(long, env = "KIOSK_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    /// Window during which the same card is not reported again
    #[arg(long, env = "KIOSK_COOLDOWN_MS")]
    pub cooldown_ms: Option<u64>,

    /// Upper bound on one webhook delivery
    #[arg(long, env = "KIOSK_DELIVERY_TIMEOUT_MS")]
    pub delivery_timeout_ms: Option<u64>,

    /// Address of the display server
    #[arg(long, env = "KIOSK_BIND")]
    pub bind: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "KIOSK_LOG_JSON")]
    pub log_json: bool,

    /// Debug logging for the kiosk crates
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Build the effective configuration.
    ///
    /// # Errors
    /// Returns the file loading error or the first validation failure.
    pub fn load_config(&self) -> Result<KioskConfig> {
        let mut config = match &self.config {
            Some(path) => KioskConfig::from_file(path)?,
            None => KioskConfig::default(),
        };

        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut KioskConfig) {
        if let Some(url) = &self.webhook_url {
            config.webhook.url = Some(url.clone());
        }
        if let Some(secret) = &self.secret {
            config.webhook.secret = Some(secret.clone());
        }
        if let Some(backend) = self.reader {
            config.reader.backend = backend;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.debounce.poll_interval_ms = ms;
        }
        if let Some(ms) = self.cooldown_ms {
            config.debounce.cooldown_ms = Some(ms);
        }
        if let Some(ms) = self.delivery_timeout_ms {
            config.webhook.timeout_ms = ms;
        }
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
    }
}
