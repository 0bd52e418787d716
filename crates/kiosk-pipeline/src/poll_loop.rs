//! The poll loop.
//!
//! One task drives the whole pipeline:
//!
//! ```text
//! sleep(poll_interval) ─► attempt_read(read_timeout) ─► debouncer
//!        ▲                                                 │
//!        │        Accept ─► deliver(delivery_timeout) ─► debouncer ─► publish
//!        │        Fault ──► sleep(fault_backoff)
//!        │        ReaderLost ─► lifecycle.recover()
//!        └─────────────────────────────────────────────────┘
//! ```
//!
//! Every suspension point is bounded. Shutdown is observed between
//! iterations, during the sleeps and during recovery, never in the middle of
//! a read or a delivery, and the reader is released on the way out.

use crate::debouncer::{Decision, ScanDebouncer};
use crate::error::{PipelineError, Result};
use kiosk_core::{DeliveryOutcome, DeliveryResult, KioskConfig, ScanEvent};
use kiosk_hardware::{
    AnyCardReader, CardReader, HardwareError, ReadOutcome, ReaderLifecycle, Recovery,
};
use kiosk_network::{Dispatch, EventBroadcaster, WebhookDispatcher};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, trace, warn};

/// Timing of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub poll_interval: Duration,
    pub read_timeout: Duration,
    pub cooldown: Duration,
    pub fault_threshold: u32,
    pub fault_backoff: Duration,

    /// Outer bound on a delivery, whatever the dispatcher does.
    pub delivery_timeout: Duration,
}

impl From<&KioskConfig> for PollConfig {
    fn from(config: &KioskConfig) -> Self {
        Self {
            poll_interval: config.debounce.poll_interval(),
            read_timeout: config.reader.read_timeout(),
            cooldown: config.cooldown(),
            fault_threshold: config.debounce.fault_threshold,
            fault_backoff: config.debounce.fault_backoff(),
            delivery_timeout: config.webhook.timeout(),
        }
    }
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub reads: u64,
    pub accepted: u64,
    pub suppressed: u64,
    pub faults: u64,
    pub delivered: u64,
    pub rejected: u64,
    pub unreachable: u64,
    pub reinits: u64,
}

/// Result of a single iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    NoCard,
    Suppressed,
    Delivered(DeliveryResult),
    Fault,
    Recovered,
    /// Shutdown arrived while the reader was being re-initialized.
    Interrupted,
}

/// Resolve once shutdown is requested or the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Sleep for `duration` unless shutdown comes first. Returns `false` on
/// shutdown.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = shutdown_requested(shutdown) => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// The scan pipeline for one reader.
#[derive(Debug)]
pub struct PollLoop<R = AnyCardReader, D = WebhookDispatcher> {
    lifecycle: ReaderLifecycle<R>,
    dispatcher: D,
    broadcaster: EventBroadcaster,
    debouncer: ScanDebouncer,
    config: PollConfig,
    stats: PollStats,
}

impl<R: CardReader, D: Dispatch> PollLoop<R, D> {
    /// Create the loop around an initialized reader.
    pub fn new(
        lifecycle: ReaderLifecycle<R>,
        dispatcher: D,
        broadcaster: EventBroadcaster,
        config: PollConfig,
    ) -> Self {
        Self {
            lifecycle,
            dispatcher,
            broadcaster,
            debouncer: ScanDebouncer::new(config.cooldown, config.fault_threshold),
            config,
            stats: PollStats::default(),
        }
    }

    pub fn stats(&self) -> PollStats {
        self.stats
    }

    pub fn debouncer(&self) -> &ScanDebouncer {
        &self.debouncer
    }

    async fn read_once(&mut self) -> std::result::Result<ReadOutcome, HardwareError> {
        let timeout = self.config.read_timeout;
        match tokio::time::timeout(timeout, self.lifecycle.reader_mut().attempt_read(timeout)).await {
            Ok(result) => result,
            Err(_) => Err(HardwareError::timeout(timeout)),
        }
    }

    async fn deliver(&mut self, event: ScanEvent) -> DeliveryResult {
        let timeout = self.config.delivery_timeout;
        let result = match tokio::time::timeout(timeout, self.dispatcher.deliver(&event)).await {
            Ok(result) => result,
            Err(_) => DeliveryResult::unreachable(
                &event,
                format!("no response within {}ms", timeout.as_millis()),
            ),
        };

        match result.outcome() {
            DeliveryOutcome::Delivered => self.stats.delivered += 1,
            DeliveryOutcome::Rejected => self.stats.rejected += 1,
            DeliveryOutcome::Unreachable => self.stats.unreachable += 1,
        }
        result
    }

    /// Run one iteration: read, debounce, and deliver and publish an
    /// accepted scan. `shutdown` is only watched while the reader is being
    /// re-initialized.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ReaderLost` if the fault threshold was reached
    /// and the reader could not be re-initialized.
    pub async fn tick(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<Step> {
        self.stats.reads += 1;

        let decision = match self.read_once().await {
            Ok(ReadOutcome::Card(card)) => self.debouncer.on_card(&card, Instant::now()),
            Ok(ReadOutcome::Absent) => self.debouncer.on_absent(),
            Err(e) if !e.is_fault() => {
                self.stats.faults += 1;
                warn!(error = %e, "Reader unusable");
                self.debouncer.on_unavailable()
            }
            Err(e) => {
                self.stats.faults += 1;
                let decision = self.debouncer.on_fault();
                if let Decision::Fault { consecutive } = decision {
                    warn!(
                        error = %e,
                        consecutive,
                        threshold = self.debouncer.fault_threshold(),
                        "Reader fault"
                    );
                }
                decision
            }
        };

        match decision {
            Decision::NoCard => {
                trace!("No card present");
                Ok(Step::NoCard)
            }
            Decision::Suppressed => {
                self.stats.suppressed += 1;
                trace!("Card still in cooldown");
                Ok(Step::Suppressed)
            }
            Decision::Accept(event) => {
                self.stats.accepted += 1;
                info!(card_id = %event.identifier(), "Card scanned");

                let result = self.deliver(event).await;
                self.debouncer.on_delivery(result.outcome(), Instant::now());
                self.broadcaster.publish(&result);
                Ok(Step::Delivered(result))
            }
            Decision::Fault { .. } => Ok(Step::Fault),
            Decision::ReaderLost { consecutive } => {
                error!(consecutive, "Reader lost, re-initializing");
                let recovery = self
                    .lifecycle
                    .recover(shutdown)
                    .await
                    .map_err(PipelineError::ReaderLost)?;
                self.debouncer.reset_faults();
                match recovery {
                    Recovery::Restored => {
                        self.stats.reinits += 1;
                        Ok(Step::Recovered)
                    }
                    Recovery::Interrupted => Ok(Step::Interrupted),
                }
            }
        }
    }

    /// Poll until shutdown is requested, then release the reader.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ReaderLost` if the reader could not be brought
    /// back. The reader is released in that case too.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<PollStats> {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            cooldown_ms = self.config.cooldown.as_millis() as u64,
            "Poll loop started"
        );

        let outcome = loop {
            if !sleep_or_shutdown(self.config.poll_interval, &mut shutdown).await {
                break Ok(());
            }

            match self.tick(&mut shutdown).await {
                Ok(Step::Interrupted) => break Ok(()),
                Ok(Step::Fault) => {
                    if !sleep_or_shutdown(self.config.fault_backoff, &mut shutdown).await {
                        break Ok(());
                    }
                }
                Ok(step) => trace!(?step, "Poll iteration finished"),
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = self.lifecycle.shutdown().await {
            warn!(error = %e, "Failed to release reader");
        }

        let stats = self.stats;
        info!(
            reads = stats.reads,
            accepted = stats.accepted,
            delivered = stats.delivered,
            faults = stats.faults,
            reinits = stats.reinits,
            "Poll loop stopped"
        );
        outcome.map(|()| stats)
    }
}
