//! Proximity (PN532) reader support.
//!
//! The PN532 sits on the I2C bus (default `/dev/i2c-1`, address `0x24`) with
//! its RSTPDN pin optionally wired to a GPIO line. Initialization pulses the
//! reset line, reads the firmware version, configures the SAM and bounds the
//! passive activation retries. Each read is one `InListPassiveTarget`
//! exchange for a single ISO 14443 type A target.
//!
//! The frame codec and driver engine are always compiled and tested against
//! an in-memory bus. The Linux bus and reset line need the `hardware-i2c`
//! feature.

pub mod bus;
mod driver;
pub mod frame;

pub use bus::{Pn532Bus, ResetLine};
pub use driver::{Pn532, Pn532Reader};

#[cfg(feature = "hardware-i2c")]
pub use bus::{GpioResetLine, LinuxI2cBus};
