//! Drives the mock reader from standard input.
//!
//! Each line is one command:
//!
//! ```text
//! 04A1B2C3     present the card and leave it on the reader
//! <empty>      remove the card
//! fault [n]    fail the next n reads (default 1)
//! unplug       disconnect the reader until it is re-initialized
//! ```

use kiosk_core::CardIdentifier;
use kiosk_hardware::mock::MockReaderHandle;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Present(CardIdentifier),
    Remove,
    Fault(u32),
    Unplug,
}

fn parse_line(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return Ok(Command::Remove);
    };

    match first.to_ascii_lowercase().as_str() {
        "fault" => match words.next() {
            None => Ok(Command::Fault(1)),
            Some(n) => n
                .parse()
                .map(Command::Fault)
                .map_err(|_| format!("invalid fault count '{n}'")),
        },
        "unplug" => Ok(Command::Unplug),
        _ => first
            .parse::<CardIdentifier>()
            .map(Command::Present)
            .map_err(|e| e.to_string()),
    }
}

/// Read commands until stdin closes.
pub async fn drive(handle: MockReaderHandle) {
    info!(
        reader = handle.name(),
        "Mock reader ready: type a card id to present it, an empty line removes it"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Cannot read mock commands from stdin");
                break;
            }
        };

        match parse_line(&line) {
            Ok(Command::Present(id)) => {
                info!(card_id = %id, "Mock card presented");
                handle.present_card(id).await;
            }
            Ok(Command::Remove) => {
                if handle.current_card().await.is_some() {
                    info!("Mock card removed");
                }
                handle.remove_card().await;
            }
            Ok(Command::Fault(count)) => {
                info!(count, "Injecting mock read faults");
                handle.inject_faults(count).await;
            }
            Ok(Command::Unplug) => {
                info!("Mock reader unplugged");
                handle.unplug().await;
            }
            Err(e) => warn!(line = %line.trim(), error = %e, "Ignoring mock command"),
        }
    }
}
