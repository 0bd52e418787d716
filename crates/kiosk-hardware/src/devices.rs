//! Enum wrapper for reader backend dispatch.
//!
//! Native `async fn` in traits (RPITIT, Edition 2024) is not object-safe, so
//! `Box<dyn CardReader>` is not an option. [`AnyCardReader`] gives the poll
//! loop one concrete type for whichever backend the configuration selects,
//! with hardware variants compiled in only when their feature is enabled.
//!
//! # Examples
//!
//! ```
//! use kiosk_hardware::devices::AnyCardReader;
//! use kiosk_hardware::mock::MockReader;
//!
//! let (reader, _handle) = MockReader::new();
//! let any_reader = AnyCardReader::Mock(reader);
//! assert_eq!(any_reader.backend(), "mock");
//! ```

use crate::mock::{MockReader, MockReaderHandle};
use crate::traits::CardReader;
use crate::types::{ReadOutcome, ReaderInfo};
use crate::{HardwareError, Result};
use kiosk_core::config::{ReaderBackend, ReaderConfig};
use std::time::Duration;

#[cfg(feature = "hardware-pcsc")]
use crate::contact::PcscReader;
#[cfg(feature = "hardware-i2c")]
use crate::proximity::{GpioResetLine, LinuxI2cBus, Pn532, Pn532Reader};

/// Enum wrapper for card reader dispatch.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::devices::AnyCardReader;
/// use kiosk_hardware::traits::CardReader;
/// use kiosk_hardware::mock::MockReader;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> kiosk_hardware::Result<()> {
///     let (reader, _handle) = MockReader::new();
///     let mut any_reader = AnyCardReader::Mock(reader);
///
///     // Use through trait interface
///     let info = any_reader.init(Duration::from_secs(1)).await?;
///     println!("Reader: {}", info.name);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyCardReader {
    /// Mock reader for development and testing.
    Mock(MockReader),

    /// USB reader driven through PC/SC.
    #[cfg(feature = "hardware-pcsc")]
    Pcsc(PcscReader),

    /// PN532 on the Linux I2C bus.
    #[cfg(feature = "hardware-i2c")]
    Pn532(Pn532Reader<LinuxI2cBus>),
}

impl AnyCardReader {
    /// Backend name used in logs and reader info.
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Mock(_) => "mock",
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(_) => "pcsc",
            #[cfg(feature = "hardware-i2c")]
            Self::Pn532(_) => "pn532",
        }
    }
}

impl CardReader for AnyCardReader {
    async fn init(&mut self, timeout: Duration) -> Result<ReaderInfo> {
        match self {
            Self::Mock(device) => device.init(timeout).await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(device) => device.init(timeout).await,
            #[cfg(feature = "hardware-i2c")]
            Self::Pn532(device) => device.init(timeout).await,
        }
    }

    async fn attempt_read(&mut self, timeout: Duration) -> Result<ReadOutcome> {
        match self {
            Self::Mock(device) => device.attempt_read(timeout).await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(device) => device.attempt_read(timeout).await,
            #[cfg(feature = "hardware-i2c")]
            Self::Pn532(device) => device.attempt_read(timeout).await,
        }
    }

    async fn release(&mut self) -> Result<()> {
        match self {
            Self::Mock(device) => device.release().await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(device) => device.release().await,
            #[cfg(feature = "hardware-i2c")]
            Self::Pn532(device) => device.release().await,
        }
    }
}

/// Build the reader selected by `config`.
///
/// Nothing is opened here; hardware is only touched by
/// [`CardReader::init`]. The mock backend also returns its control handle.
///
/// # Errors
///
/// Returns `HardwareError::Unavailable` if the selected backend was not
/// compiled into this build.
pub fn build_reader(config: &ReaderConfig) -> Result<(AnyCardReader, Option<MockReaderHandle>)> {
    match config.backend {
        ReaderBackend::Mock => {
            let (reader, handle) = MockReader::new();
            Ok((AnyCardReader::Mock(reader), Some(handle)))
        }
        ReaderBackend::Pcsc => build_pcsc(config),
        ReaderBackend::Pn532 => build_pn532(config),
    }
}

#[cfg(feature = "hardware-pcsc")]
fn build_pcsc(config: &ReaderConfig) -> Result<(AnyCardReader, Option<MockReaderHandle>)> {
    let reader = PcscReader::new(config.pcsc_reader.clone());
    Ok((AnyCardReader::Pcsc(reader), None))
}

#[cfg(not(feature = "hardware-pcsc"))]
fn build_pcsc(_config: &ReaderConfig) -> Result<(AnyCardReader, Option<MockReaderHandle>)> {
    Err(HardwareError::unavailable(
        "USB reader support not compiled in (enable the hardware-pcsc feature)",
    ))
}

#[cfg(feature = "hardware-i2c")]
fn build_pn532(config: &ReaderConfig) -> Result<(AnyCardReader, Option<MockReaderHandle>)> {
    let bus = LinuxI2cBus::new(config.i2c_bus.clone(), config.i2c_address);
    let mut driver = Pn532::new(bus);

    match (&config.reset_chip, config.reset_line) {
        (Some(chip), Some(line)) => {
            driver = driver.with_reset_line(Box::new(GpioResetLine::new(chip.clone(), line)));
        }
        (None, None) => {}
        _ => {
            return Err(HardwareError::unavailable(
                "reader.reset_chip and reader.reset_line must be set together",
            ));
        }
    }

    let name = format!("PN532 {}@0x{:02X}", config.i2c_bus, config.i2c_address);
    Ok((AnyCardReader::Pn532(Pn532Reader::new(driver, name)), None))
}

#[cfg(not(feature = "hardware-i2c"))]
fn build_pn532(_config: &ReaderConfig) -> Result<(AnyCardReader, Option<MockReaderHandle>)> {
    Err(HardwareError::unavailable(
        "I2C reader support not compiled in (enable the hardware-i2c feature)",
    ))
}
