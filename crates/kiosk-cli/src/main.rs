//! `nfc-kiosk`: polls an NFC reader, forwards each new card to the business
//! webhook and pushes the outcome to the kiosk display.
//!
//! Exit codes: `0` after a requested shutdown, `1` when the configuration is
//! invalid or the reader cannot be initialized, `2` when the reader is lost
//! and cannot be brought back.

mod cli;
mod logger;
mod mock_input;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use kiosk_hardware::{LifecycleConfig, ReaderLifecycle, build_reader};
use kiosk_network::{EventBroadcaster, KioskServer, WebhookDispatcher};
use kiosk_pipeline::{PipelineError, PollConfig, PollLoop};
use std::pin::pin;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info, warn};

const EXIT_STARTUP_FAILED: u8 = 1;
const EXIT_READER_LOST: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(cli.log_json, cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "NFC kiosk stopped");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::ReaderLost(_)) => EXIT_READER_LOST,
        None => EXIT_STARTUP_FAILED,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.load_config().context("invalid configuration")?;

    info!(
        version = kiosk_core::VERSION,
        reader = %config.reader.backend,
        webhook = config.webhook.url.as_deref().unwrap_or_default(),
        "Starting NFC kiosk"
    );

    let dispatcher = WebhookDispatcher::from_config(&config.webhook)
        .context("cannot create webhook client")?;
    let broadcaster = EventBroadcaster::new(config.server.broadcast_capacity);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = KioskServer::bind(
        config.server.bind_addr()?,
        broadcaster.clone(),
        shutdown_rx.clone(),
    )
    .await?;

    let (reader, mock_handle) = build_reader(&config.reader)
        .context("cannot create the reader (see --help for the backends in this build)")?;
    let mut lifecycle = ReaderLifecycle::new(reader, LifecycleConfig::from(&config.reader));
    lifecycle
        .start()
        .await
        .context("reader initialization failed")?;

    if let Some(handle) = mock_handle {
        tokio::spawn(mock_input::drive(handle));
    }

    let server_task = tokio::spawn(server.serve());

    let poll = PollLoop::new(
        lifecycle,
        dispatcher,
        broadcaster,
        PollConfig::from(&config),
    );
    let mut polling = pin!(poll.run(shutdown_rx));

    let outcome = tokio::select! {
        outcome = &mut polling => outcome,
        () = shutdown_signal() => {
            info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
            polling.await
        }
    };

    let _ = shutdown_tx.send(true);
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Kiosk server failed"),
        Err(e) => warn!(error = %e, "Kiosk server task panicked"),
    }

    let stats = outcome?;
    info!(
        delivered = stats.delivered,
        rejected = stats.rejected,
        unreachable = stats.unreachable,
        "NFC kiosk stopped cleanly"
    );
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
