//! Mock card reader implementation for testing and development.
//!
//! This module provides a simulated reader that can be controlled
//! programmatically for testing without requiring physical hardware.

use crate::{
    HardwareError, Result,
    traits::CardReader,
    types::{ReadOutcome, ReaderInfo},
};
use kiosk_core::CardIdentifier;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Mock card reader for testing and development.
///
/// Unlike a queue of one-shot events, the mock keeps a *field state*: a card
/// presented through the handle stays on the reader, and every poll reads it
/// again until it is removed. This is what a real reader does and what the
/// debouncer has to cope with.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::mock::MockReader;
/// use kiosk_hardware::traits::CardReader;
/// use kiosk_hardware::types::ReadOutcome;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> kiosk_hardware::Result<()> {
///     let (mut reader, handle) = MockReader::new();
///     reader.init(Duration::from_secs(1)).await?;
///
///     handle.present_card("04ABCDEF".parse().unwrap()).await;
///
///     let outcome = reader.attempt_read(Duration::from_millis(250)).await?;
///     assert_eq!(outcome.card().unwrap().to_hex(), "04ABCDEF");
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockReader {
    /// State shared with the handle
    state: Arc<Mutex<MockState>>,

    /// Device name
    name: String,
}

#[derive(Debug, Default)]
struct MockState {
    /// Card currently in the field
    current_card: Option<CardIdentifier>,

    /// Number of upcoming reads that fail with a fault
    pending_faults: u32,

    /// Number of upcoming inits that report no reader
    pending_init_failures: u32,

    /// Simulated latency of each read
    read_delay: Option<Duration>,

    /// Reads report the reader as unusable until the next init
    service_stopped: bool,

    initialized: bool,
    stats: MockReaderStats,
}

/// Counters exposed for assertions in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockReaderStats {
    pub inits: u32,
    pub reads: u32,
    pub releases: u32,
}

impl MockReader {
    /// Create a new mock reader with the default name.
    ///
    /// Returns a tuple of (MockReader, MockReaderHandle) where the handle
    /// can be used to simulate card presentations and failures.
    pub fn new() -> (Self, MockReaderHandle) {
        Self::with_name("Mock NFC Reader".to_string())
    }

    /// Create a new mock reader with a custom name.
    pub fn with_name(name: String) -> (Self, MockReaderHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));

        let reader = Self {
            state: Arc::clone(&state),
            name: name.clone(),
        };

        let handle = MockReaderHandle { state, name };

        (reader, handle)
    }
}

impl CardReader for MockReader {
    async fn init(&mut self, _timeout: Duration) -> Result<ReaderInfo> {
        let mut state = self.state.lock().await;
        state.stats.inits += 1;

        if state.pending_init_failures > 0 {
            state.pending_init_failures -= 1;
            state.initialized = false;
            return Err(HardwareError::unavailable(format!(
                "{} not found",
                self.name
            )));
        }

        state.initialized = true;
        state.service_stopped = false;
        Ok(ReaderInfo::new(self.name.clone(), "mock").with_firmware("mock-1.0"))
    }

    async fn attempt_read(&mut self, timeout: Duration) -> Result<ReadOutcome> {
        let delay = {
            let mut state = self.state.lock().await;
            state.stats.reads += 1;
            state.read_delay
        };

        if let Some(delay) = delay {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(HardwareError::timeout(timeout));
            }
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;

        if state.service_stopped {
            return Err(HardwareError::unavailable(format!(
                "{} service stopped",
                self.name
            )));
        }

        if !state.initialized {
            return Err(HardwareError::disconnected(self.name.clone()));
        }

        if state.pending_faults > 0 {
            state.pending_faults -= 1;
            return Err(HardwareError::communication("injected fault"));
        }

        Ok(match &state.current_card {
            Some(id) => ReadOutcome::Card(id.clone()),
            None => ReadOutcome::Absent,
        })
    }

    async fn release(&mut self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.stats.releases += 1;
        state.initialized = false;
        Ok(())
    }
}

/// Handle for controlling a mock reader.
///
/// Clones share the same reader state.
#[derive(Debug, Clone)]
pub struct MockReaderHandle {
    state: Arc<Mutex<MockState>>,
    name: String,
}

impl MockReaderHandle {
    /// Place a card in the reader field. It stays until removed.
    pub async fn present_card(&self, id: CardIdentifier) {
        self.state.lock().await.current_card = Some(id);
    }

    /// Remove the current card from the reader field.
    pub async fn remove_card(&self) {
        self.state.lock().await.current_card = None;
    }

    /// Get the card currently in the field, if any.
    pub async fn current_card(&self) -> Option<CardIdentifier> {
        self.state.lock().await.current_card.clone()
    }

    /// Make the next `count` reads fail with a hardware fault.
    pub async fn inject_faults(&self, count: u32) {
        self.state.lock().await.pending_faults += count;
    }

    /// Make the next `count` initializations report the reader as absent.
    pub async fn fail_next_inits(&self, count: u32) {
        self.state.lock().await.pending_init_failures += count;
    }

    /// Simulate the reader being unplugged until it is initialized again.
    pub async fn unplug(&self) {
        self.state.lock().await.initialized = false;
    }

    /// Make reads fail as unavailable until the reader is initialized again,
    /// like a PC/SC service restart.
    pub async fn stop_service(&self) {
        self.state.lock().await.service_stopped = true;
    }

    /// Delay every read by `delay` (reads longer than their timeout fail).
    pub async fn set_read_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.read_delay = delay;
    }

    pub async fn stats(&self) -> MockReaderStats {
        self.state.lock().await.stats
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(250);

    fn card(hex: &str) -> CardIdentifier {
        hex.parse().unwrap()
    }

    #[tokio::test]
    async fn test_mock_reader_absent_by_default() {
        let (mut reader, _handle) = MockReader::new();
        reader.init(TIMEOUT).await.unwrap();

        let outcome = reader.attempt_read(TIMEOUT).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Absent);
    }

    #[tokio::test]
    async fn test_mock_reader_card_stays_until_removed() {
        let (mut reader, handle) = MockReader::new();
        reader.init(TIMEOUT).await.unwrap();

        handle.present_card(card("04ABCDEF")).await;
        for _ in 0..3 {
            let outcome = reader.attempt_read(TIMEOUT).await.unwrap();
            assert_eq!(outcome, ReadOutcome::Card(card("04ABCDEF")));
        }

        handle.remove_card().await;
        assert!(reader.attempt_read(TIMEOUT).await.unwrap().is_absent());
        assert_eq!(handle.current_card().await, None);
    }

    #[tokio::test]
    async fn test_mock_reader_injected_faults() {
        let (mut reader, handle) = MockReader::new();
        reader.init(TIMEOUT).await.unwrap();

        handle.inject_faults(2).await;
        assert!(reader.attempt_read(TIMEOUT).await.is_err());
        assert!(reader.attempt_read(TIMEOUT).await.is_err());
        assert!(reader.attempt_read(TIMEOUT).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_reader_init_failure() {
        let (mut reader, handle) = MockReader::new();
        handle.fail_next_inits(1).await;

        let err = reader.init(TIMEOUT).await.unwrap_err();
        assert!(err.is_unavailable());

        // Reads before a successful init are faults
        assert!(matches!(
            reader.attempt_read(TIMEOUT).await,
            Err(HardwareError::Disconnected { .. })
        ));

        reader.init(TIMEOUT).await.unwrap();
        assert!(reader.attempt_read(TIMEOUT).await.is_ok());
        assert_eq!(handle.stats().await.inits, 2);
    }

    #[tokio::test]
    async fn test_mock_reader_unplug_and_release() {
        let (mut reader, handle) = MockReader::with_name("Test Reader".to_string());
        let info = reader.init(TIMEOUT).await.unwrap();
        assert_eq!(info.name, "Test Reader");
        assert_eq!(handle.name(), "Test Reader");

        handle.unplug().await;
        assert!(reader.attempt_read(TIMEOUT).await.is_err());

        reader.release().await.unwrap();
        assert_eq!(handle.stats().await.releases, 1);
    }

    #[tokio::test]
    async fn test_mock_reader_stopped_service() {
        let (mut reader, handle) = MockReader::new();
        reader.init(TIMEOUT).await.unwrap();

        handle.stop_service().await;
        let err = reader.attempt_read(TIMEOUT).await.unwrap_err();
        assert!(err.is_unavailable());

        reader.init(TIMEOUT).await.unwrap();
        assert!(reader.attempt_read(TIMEOUT).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_reader_slow_read_times_out() {
        let (mut reader, handle) = MockReader::new();
        reader.init(TIMEOUT).await.unwrap();

        handle.set_read_delay(Some(Duration::from_secs(5))).await;
        let err = reader.attempt_read(TIMEOUT).await.unwrap_err();
        assert!(matches!(err, HardwareError::Timeout { duration_ms: 250 }));

        handle.set_read_delay(Some(Duration::from_millis(10))).await;
        assert!(reader.attempt_read(TIMEOUT).await.is_ok());
    }
}
