//! Hardware lifecycle management.
//!
//! [`ReaderLifecycle`] owns the reader adapter for the whole life of the
//! process: it runs the startup probe, re-initializes the reader when the
//! poll loop reports it lost, and releases the hardware exactly once on
//! shutdown. Nothing else ever calls [`CardReader::init`] or
//! [`CardReader::release`].
//!
//! Recovery watches the same shutdown channel as the poll loop, so a stop
//! request never waits for the remaining backoffs and init timeouts.

use crate::devices::AnyCardReader;
use crate::traits::CardReader;
use crate::types::ReaderInfo;
use crate::{HardwareError, Result};
use kiosk_core::config::ReaderConfig;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Timing and retry settings of the lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Upper bound for one `init()` call.
    pub init_timeout: Duration,

    /// Re-initialization attempts before the reader is given up.
    pub max_reinit_attempts: u32,

    /// Wait before each re-initialization attempt.
    pub reinit_backoff: Duration,
}

impl From<&ReaderConfig> for LifecycleConfig {
    fn from(config: &ReaderConfig) -> Self {
        Self {
            init_timeout: config.init_timeout(),
            max_reinit_attempts: config.max_reinit_attempts,
            reinit_backoff: config.reinit_backoff(),
        }
    }
}

/// How a call to [`ReaderLifecycle::recover`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The reader answered again and can be polled.
    Restored,
    /// Shutdown was requested before the reader came back.
    Interrupted,
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender counts as a stop request
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Owner of the reader adapter.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::lifecycle::{LifecycleConfig, ReaderLifecycle};
/// use kiosk_hardware::mock::MockReader;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> kiosk_hardware::Result<()> {
///     let (reader, _handle) = MockReader::new();
///     let config = LifecycleConfig {
///         init_timeout: Duration::from_secs(3),
///         max_reinit_attempts: 3,
///         reinit_backoff: Duration::from_secs(2),
///     };
///
///     let mut lifecycle = ReaderLifecycle::new(reader, config);
///     let info = lifecycle.start().await?;
///     assert_eq!(info.backend, "mock");
///
///     lifecycle.shutdown().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct ReaderLifecycle<R = AnyCardReader> {
    reader: R,
    config: LifecycleConfig,
    info: Option<ReaderInfo>,
    released: bool,
}

impl<R: CardReader> ReaderLifecycle<R> {
    pub fn new(reader: R, config: LifecycleConfig) -> Self {
        Self {
            reader,
            config,
            info: None,
            released: false,
        }
    }

    /// Reader reported by the last successful initialization.
    pub fn info(&self) -> Option<&ReaderInfo> {
        self.info.as_ref()
    }

    /// The managed reader, for the poll loop's read attempts.
    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    async fn init_once(&mut self) -> Result<ReaderInfo> {
        let timeout = self.config.init_timeout;
        match tokio::time::timeout(timeout, self.reader.init(timeout)).await {
            Ok(result) => result.map_err(HardwareError::into_unavailable),
            Err(_) => Err(HardwareError::unavailable(format!(
                "reader did not answer within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Run the startup probe.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Unavailable` if the reader is absent or does
    /// not initialize within the init timeout. The poll loop must not start
    /// in that case.
    pub async fn start(&mut self) -> Result<&ReaderInfo> {
        match self.init_once().await {
            Ok(info) => {
                info!(
                    reader = %info.name,
                    backend = %info.backend,
                    firmware = info.firmware.as_deref().unwrap_or("-"),
                    "Reader initialized"
                );
                self.released = false;
                Ok(&*self.info.insert(info))
            }
            Err(e) => {
                error!(error = %e, "Reader initialization failed");
                Err(e)
            }
        }
    }

    /// Try to bring a lost reader back.
    ///
    /// The current handles are released first, then up to
    /// `max_reinit_attempts` initializations are made, each preceded by the
    /// re-init backoff. A stop request on `shutdown` ends the attempts at
    /// once with [`Recovery::Interrupted`].
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Unavailable` once every attempt has failed.
    pub async fn recover(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<Recovery> {
        if let Err(e) = self.reader.release().await {
            debug!(error = %e, "Releasing lost reader failed");
        }
        self.info = None;

        let attempts = self.config.max_reinit_attempts;
        let backoff = self.config.reinit_backoff;
        let mut last_error = None;

        for attempt in 1..=attempts {
            tokio::select! {
                biased;
                () = shutdown_requested(shutdown) => {
                    info!(attempt, "Re-initialization interrupted by shutdown");
                    return Ok(Recovery::Interrupted);
                }
                () = tokio::time::sleep(backoff) => {}
            }
            info!(attempt, max = attempts, "Re-initializing reader");

            let result = tokio::select! {
                biased;
                () = shutdown_requested(shutdown) => {
                    info!(attempt, "Re-initialization interrupted by shutdown");
                    return Ok(Recovery::Interrupted);
                }
                result = self.init_once() => result,
            };

            match result {
                Ok(info) => {
                    info!(reader = %info.name, attempt, "Reader recovered");
                    self.released = false;
                    self.info = Some(info);
                    return Ok(Recovery::Restored);
                }
                Err(e) => {
                    warn!(attempt, max = attempts, error = %e, "Re-initialization failed");
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error.map_or_else(|| "no attempts allowed".to_string(), |e| e.to_string());
        error!(attempts, "Reader lost for good");
        Err(HardwareError::unavailable(format!(
            "reader still unavailable after {attempts} re-initialization attempts: {reason}"
        )))
    }

    /// Release the reader. Only the first call touches the hardware.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the release itself failed.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.info = None;

        info!("Releasing reader");
        self.reader.release().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockReader, MockReaderHandle};

    fn config(attempts: u32) -> LifecycleConfig {
        LifecycleConfig {
            init_timeout: Duration::from_secs(3),
            max_reinit_attempts: attempts,
            reinit_backoff: Duration::from_secs(2),
        }
    }

    fn running() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    fn lifecycle(attempts: u32) -> (ReaderLifecycle<MockReader>, MockReaderHandle) {
        let (reader, handle) = MockReader::new();
        (ReaderLifecycle::new(reader, config(attempts)), handle)
    }

    #[test]
    fn test_config_from_reader_config() {
        let reader = ReaderConfig {
            init_timeout_ms: 1500,
            max_reinit_attempts: 5,
            reinit_backoff_ms: 250,
            ..ReaderConfig::default()
        };

        let config = LifecycleConfig::from(&reader);
        assert_eq!(config.init_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_reinit_attempts, 5);
        assert_eq!(config.reinit_backoff, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_start_success() {
        let (mut lifecycle, _handle) = lifecycle(3);

        let info = lifecycle.start().await.unwrap();
        assert_eq!(info.name, "Mock NFC Reader");
        assert!(lifecycle.info().is_some());
    }

    #[tokio::test]
    async fn test_start_absent_reader_is_unavailable() {
        let (mut lifecycle, handle) = lifecycle(3);
        handle.fail_next_inits(1).await;

        let err = lifecycle.start().await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(lifecycle.info().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recover_after_failed_attempts() {
        let (mut lifecycle, handle) = lifecycle(3);
        lifecycle.start().await.unwrap();

        handle.unplug().await;
        handle.fail_next_inits(2).await;

        let (_tx, mut shutdown) = running();
        let started = tokio::time::Instant::now();
        assert_eq!(
            lifecycle.recover(&mut shutdown).await.unwrap(),
            Recovery::Restored
        );
        assert!(lifecycle.info().is_some());

        // Three attempts, each after one backoff
        assert_eq!(started.elapsed(), Duration::from_secs(6));
        let stats = handle.stats().await;
        assert_eq!(stats.inits, 4);
        assert_eq!(stats.releases, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recover_gives_up_after_max_attempts() {
        let (mut lifecycle, handle) = lifecycle(2);
        lifecycle.start().await.unwrap();
        handle.fail_next_inits(10).await;

        let (_tx, mut shutdown) = running();
        let err = lifecycle.recover(&mut shutdown).await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("after 2 re-initialization attempts"));
        assert_eq!(handle.stats().await.inits, 3);
    }

    #[tokio::test]
    async fn test_recover_with_no_attempts_fails_immediately() {
        let (mut lifecycle, _handle) = lifecycle(0);
        lifecycle.start().await.unwrap();
        let (_tx, mut shutdown) = running();
        assert!(lifecycle.recover(&mut shutdown).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recover_stops_on_shutdown_during_backoff() {
        let (mut lifecycle, handle) = lifecycle(3);
        lifecycle.start().await.unwrap();
        handle.fail_next_inits(10).await;

        let (tx, mut shutdown) = running();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            tx.send(true).unwrap();
        });

        let started = tokio::time::Instant::now();
        let recovery = lifecycle.recover(&mut shutdown).await.unwrap();

        assert_eq!(recovery, Recovery::Interrupted);
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        // Only the startup init ran
        assert_eq!(handle.stats().await.inits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recover_with_pending_shutdown_returns_at_once() {
        let (mut lifecycle, _handle) = lifecycle(3);
        lifecycle.start().await.unwrap();

        let (tx, mut shutdown) = running();
        tx.send(true).unwrap();

        let started = tokio::time::Instant::now();
        let recovery = lifecycle.recover(&mut shutdown).await.unwrap();
        assert_eq!(recovery, Recovery::Interrupted);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(lifecycle.info().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_releases_once() {
        let (mut lifecycle, handle) = lifecycle(3);
        lifecycle.start().await.unwrap();

        lifecycle.shutdown().await.unwrap();
        lifecycle.shutdown().await.unwrap();
        assert_eq!(handle.stats().await.releases, 1);
    }
}
