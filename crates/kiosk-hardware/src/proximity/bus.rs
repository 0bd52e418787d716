//! Transport seams for the PN532 driver.
//!
//! The driver only needs raw byte writes and reads on the host interface plus
//! an optional reset line. Keeping these behind small synchronous traits lets
//! the frame handling run against an in-memory bus in tests.

use crate::Result;

/// Host interface of a PN532 (I2C on the kiosk hardware).
///
/// Both calls block. The driver runs them on the blocking thread pool.
pub trait Pn532Bus: Send + 'static {
    /// Write a complete frame.
    fn write(&mut self, frame: &[u8]) -> Result<()>;

    /// Fill `buf` from the device. On I2C the first byte is the ready status.
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Close the underlying handle.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Output line wired to the PN532 RSTPDN pin.
pub trait ResetLine: Send + 'static {
    fn set_level(&mut self, high: bool) -> Result<()>;

    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(feature = "hardware-i2c")]
pub use linux::{GpioResetLine, LinuxI2cBus};

#[cfg(feature = "hardware-i2c")]
mod linux {
    use super::{Pn532Bus, ResetLine};
    use crate::{HardwareError, Result};
    use gpio_cdev::{Chip, LineHandle, LineRequestFlags};
    use i2cdev::core::I2CDevice;
    use i2cdev::linux::LinuxI2CDevice;
    use tracing::debug;

    /// Linux `/dev/i2c-N` character device.
    ///
    /// The device node is opened lazily and dropped after any transfer
    /// error, so the next call after a re-init reopens it.
    pub struct LinuxI2cBus {
        path: String,
        address: u16,
        device: Option<LinuxI2CDevice>,
    }

    impl LinuxI2cBus {
        pub fn new(path: impl Into<String>, address: u16) -> Self {
            Self {
                path: path.into(),
                address,
                device: None,
            }
        }

        fn device(&mut self) -> Result<&mut LinuxI2CDevice> {
            if self.device.is_none() {
                let device = LinuxI2CDevice::new(&self.path, self.address).map_err(|e| {
                    HardwareError::disconnected(format!(
                        "{} @ 0x{:02X}: {e}",
                        self.path, self.address
                    ))
                })?;
                debug!(bus = %self.path, address = self.address, "Opened I2C device");
                self.device = Some(device);
            }

            self.device
                .as_mut()
                .ok_or_else(|| HardwareError::disconnected(self.path.clone()))
        }
    }

    impl std::fmt::Debug for LinuxI2cBus {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("LinuxI2cBus")
                .field("path", &self.path)
                .field("address", &self.address)
                .field("open", &self.device.is_some())
                .finish()
        }
    }

    impl Pn532Bus for LinuxI2cBus {
        fn write(&mut self, frame: &[u8]) -> Result<()> {
            let result = self.device()?.write(frame);
            result.map_err(|e| {
                self.device = None;
                HardwareError::communication(format!("I2C write failed: {e}"))
            })
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            let result = self.device()?.read(buf);
            result.map_err(|e| {
                self.device = None;
                HardwareError::communication(format!("I2C read failed: {e}"))
            })
        }

        fn release(&mut self) -> Result<()> {
            self.device = None;
            Ok(())
        }
    }

    /// Reset line driven through the GPIO character device.
    pub struct GpioResetLine {
        chip: String,
        offset: u32,
        handle: Option<LineHandle>,
    }

    impl GpioResetLine {
        pub fn new(chip: impl Into<String>, offset: u32) -> Self {
            Self {
                chip: chip.into(),
                offset,
                handle: None,
            }
        }

        fn handle(&mut self) -> Result<&LineHandle> {
            if self.handle.is_none() {
                let describe =
                    |e: gpio_cdev::Error| HardwareError::unavailable(format!("{} line {}: {e}", self.chip, self.offset));
                let mut chip = Chip::new(&self.chip).map_err(describe)?;
                let line = chip.get_line(self.offset).map_err(describe)?;
                let handle = line
                    .request(LineRequestFlags::OUTPUT, 1, "nfc-kiosk")
                    .map_err(describe)?;
                self.handle = Some(handle);
            }

            self.handle
                .as_ref()
                .ok_or_else(|| HardwareError::unavailable(self.chip.clone()))
        }
    }

    impl std::fmt::Debug for GpioResetLine {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("GpioResetLine")
                .field("chip", &self.chip)
                .field("offset", &self.offset)
                .field("requested", &self.handle.is_some())
                .finish()
        }
    }

    impl ResetLine for GpioResetLine {
        fn set_level(&mut self, high: bool) -> Result<()> {
            self.handle()?
                .set_value(u8::from(high))
                .map_err(|e| HardwareError::communication(format!("GPIO write failed: {e}")))
        }

        fn release(&mut self) -> Result<()> {
            self.handle = None;
            Ok(())
        }
    }
}
