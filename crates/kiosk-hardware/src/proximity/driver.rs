//! PN532 command engine and async reader adapter.

use super::bus::{Pn532Bus, ResetLine};
use super::frame::{self, command};
use crate::{
    HardwareError, Result,
    traits::CardReader,
    types::{ReadOutcome, ReaderInfo},
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Status byte reported by the PN532 when a frame is ready to be read.
const STATUS_READY: u8 = 0x01;

/// Read buffer for responses. The longest response used here (a single
/// type A target with a 10 byte UID) is well below this.
const RESPONSE_BUFFER_LEN: usize = 64;

/// Low time of the reset pulse on RSTPDN.
const RESET_PULSE: Duration = Duration::from_millis(100);

/// Time the chip needs after reset before it accepts commands.
const RESET_SETTLE: Duration = Duration::from_millis(10);

/// Default delay between ready-status polls.
const DEFAULT_POLL_STEP: Duration = Duration::from_millis(5);

/// Retries the PN532 makes per InListPassiveTarget before reporting no
/// target. Bounded so a read attempt stays within its timeout.
const PASSIVE_ACTIVATION_RETRIES: u8 = 0x10;

/// Synchronous PN532 driver over a [`Pn532Bus`].
pub struct Pn532<B> {
    bus: B,
    reset: Option<Box<dyn ResetLine>>,
    poll_step: Duration,
}

impl<B: Pn532Bus> Pn532<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            reset: None,
            poll_step: DEFAULT_POLL_STEP,
        }
    }

    /// Attach the GPIO line wired to RSTPDN.
    pub fn with_reset_line(mut self, line: Box<dyn ResetLine>) -> Self {
        self.reset = Some(line);
        self
    }

    pub fn with_poll_step(mut self, step: Duration) -> Self {
        self.poll_step = step;
        self
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Pulse the reset line. No-op without a reset line.
    pub fn reset(&mut self) -> Result<()> {
        if let Some(line) = self.reset.as_mut() {
            debug!("Pulsing PN532 reset line");
            line.set_level(false)?;
            std::thread::sleep(RESET_PULSE);
            line.set_level(true)?;
            std::thread::sleep(RESET_SETTLE);
        }
        Ok(())
    }

    fn wait_ready(&mut self, deadline: Instant, timeout: Duration) -> Result<()> {
        let mut status = [0u8; 1];
        loop {
            self.bus.read(&mut status)?;
            if status[0] == STATUS_READY {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(HardwareError::timeout(timeout));
            }
            std::thread::sleep(self.poll_step);
        }
    }

    /// Send a command, wait for the ACK and return the response data.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Timeout` if the chip does not become ready in
    /// time, and a communication or invalid data error on a missing ACK or a
    /// malformed response.
    pub fn command(&mut self, code: u8, params: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let request = frame::encode_command(code, params)?;
        self.bus.write(&request)?;

        self.wait_ready(deadline, timeout)?;
        let mut ack = [0u8; 1 + frame::ACK_FRAME.len()];
        self.bus.read(&mut ack)?;
        if !frame::is_ack(&ack[1..]) {
            return Err(HardwareError::communication(format!(
                "PN532 did not acknowledge command 0x{code:02X}"
            )));
        }

        self.wait_ready(deadline, timeout)?;
        let mut response = [0u8; 1 + RESPONSE_BUFFER_LEN];
        self.bus.read(&mut response)?;
        frame::decode_response(code, &response[1..])
    }

    pub fn firmware_version(&mut self, timeout: Duration) -> Result<String> {
        let data = self.command(command::GET_FIRMWARE_VERSION, &[], timeout)?;
        frame::parse_firmware_version(&data)
    }

    /// Put the SAM in normal mode and bound the passive activation retries.
    pub fn configure(&mut self, timeout: Duration) -> Result<()> {
        // Normal mode, 1 s virtual card timeout, use IRQ
        self.command(command::SAM_CONFIGURATION, &[0x01, 0x14, 0x01], timeout)?;
        // MaxRetries: ATR_REQ, PSL_REQ, passive activation
        self.command(
            command::RF_CONFIGURATION,
            &[0x05, 0xFF, 0x01, PASSIVE_ACTIVATION_RETRIES],
            timeout,
        )?;
        Ok(())
    }

    /// Look for one ISO 14443 type A target at 106 kbps.
    pub fn read_passive_target(&mut self, timeout: Duration) -> Result<ReadOutcome> {
        let data = self.command(command::IN_LIST_PASSIVE_TARGET, &[0x01, 0x00], timeout)?;
        frame::parse_passive_target(&data)
    }

    /// Release the reset line and the bus handle.
    pub fn release(&mut self) -> Result<()> {
        let line = match self.reset.as_mut() {
            Some(line) => line.release(),
            None => Ok(()),
        };
        let bus = self.bus.release();
        line.and(bus)
    }
}

impl<B> std::fmt::Debug for Pn532<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pn532")
            .field("reset_line", &self.reset.is_some())
            .field("poll_step", &self.poll_step)
            .finish_non_exhaustive()
    }
}

/// Proximity reader backed by a PN532.
///
/// Every operation runs the blocking driver on the blocking thread pool under
/// a timeout. A timed out operation may still hold the driver lock; the next
/// operation then waits for it inside its own timeout.
#[derive(Debug)]
pub struct Pn532Reader<B> {
    driver: Arc<Mutex<Pn532<B>>>,
    name: String,
}

impl<B: Pn532Bus> Pn532Reader<B> {
    pub fn new(driver: Pn532<B>, name: impl Into<String>) -> Self {
        Self {
            driver: Arc::new(Mutex::new(driver)),
            name: name.into(),
        }
    }

    async fn run<T, F>(&self, timeout: Duration, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Pn532<B>) -> Result<T> + Send + 'static,
    {
        let driver = Arc::clone(&self.driver);
        let task = tokio::task::spawn_blocking(move || {
            let mut driver = driver
                .lock()
                .map_err(|_| HardwareError::communication("PN532 driver lock poisoned"))?;
            op(&mut driver)
        });

        tokio::time::timeout(timeout, task)
            .await
            .map_err(|_| HardwareError::timeout(timeout))??
    }
}

impl<B: Pn532Bus> CardReader for Pn532Reader<B> {
    async fn init(&mut self, timeout: Duration) -> Result<ReaderInfo> {
        let firmware = self
            .run(timeout, move |driver| {
                driver.reset()?;
                let firmware = driver.firmware_version(timeout)?;
                driver.configure(timeout)?;
                Ok(firmware)
            })
            .await
            .map_err(HardwareError::into_unavailable)?;

        info!(reader = %self.name, %firmware, "Found I2C reader");
        Ok(ReaderInfo::new(self.name.clone(), "pn532").with_firmware(firmware))
    }

    async fn attempt_read(&mut self, timeout: Duration) -> Result<ReadOutcome> {
        self.run(timeout, move |driver| driver.read_passive_target(timeout))
            .await
    }

    async fn release(&mut self) -> Result<()> {
        self.run(Duration::from_secs(1), |driver| driver.release())
            .await
    }
}
