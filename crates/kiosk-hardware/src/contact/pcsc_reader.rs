//! PC/SC reader driver.

use super::{GET_UID_APDU, parse_uid_response};
use crate::{
    HardwareError, Result,
    traits::CardReader,
    types::{ReadOutcome, ReaderInfo},
};
use pcsc::{Context, Protocols, Scope, ShareMode};
use std::ffi::CString;
use std::time::Duration;
use tracing::{debug, info};

/// USB contact-style reader driven through PC/SC.
///
/// The PC/SC calls block, so each one runs on the blocking thread pool under
/// a timeout. A fresh card connection is made per read attempt, mirroring how
/// the reader reports presence: connecting fails with `NoSmartcard` when the
/// field is empty.
pub struct PcscReader {
    /// Substring of the reader name to select, first reader when `None`.
    reader_filter: Option<String>,

    context: Option<Context>,
    reader_name: Option<CString>,
}

impl std::fmt::Debug for PcscReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcscReader")
            .field("reader_filter", &self.reader_filter)
            .field("established", &self.context.is_some())
            .field("reader_name", &self.reader_name)
            .finish()
    }
}

impl PcscReader {
    pub fn new(reader_filter: Option<String>) -> Self {
        Self {
            reader_filter,
            context: None,
            reader_name: None,
        }
    }

    fn select_reader(readers: Vec<CString>, filter: Option<&str>) -> Option<CString> {
        readers.into_iter().find(|name| match filter {
            Some(filter) => name.to_string_lossy().contains(filter),
            None => true,
        })
    }
}

/// Map a PC/SC error raised while polling to a read outcome or fault.
fn classify(err: pcsc::Error, reader: &str) -> Result<ReadOutcome> {
    match err {
        pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard => Ok(ReadOutcome::Absent),
        pcsc::Error::NoReadersAvailable
        | pcsc::Error::ReaderUnavailable
        | pcsc::Error::UnknownReader => Err(HardwareError::disconnected(reader)),
        // The context is dead, only a new one helps
        pcsc::Error::NoService | pcsc::Error::ServiceStopped => Err(HardwareError::unavailable(
            format!("PC/SC service stopped while polling {reader}"),
        )),
        other => Err(HardwareError::communication(format!("PC/SC error: {other}"))),
    }
}

impl CardReader for PcscReader {
    async fn init(&mut self, timeout: Duration) -> Result<ReaderInfo> {
        let filter = self.reader_filter.clone();

        let task = tokio::task::spawn_blocking(move || {
            let context = Context::establish(Scope::User).map_err(|e| {
                HardwareError::unavailable(format!("PC/SC service not available: {e}"))
            })?;

            let readers = match context.list_readers_owned() {
                Ok(readers) => readers,
                Err(pcsc::Error::NoReadersAvailable) => Vec::new(),
                Err(e) => {
                    return Err(HardwareError::unavailable(format!(
                        "cannot list PC/SC readers: {e}"
                    )));
                }
            };
            debug!(count = readers.len(), "PC/SC readers found");

            let name = Self::select_reader(readers, filter.as_deref()).ok_or_else(|| {
                match filter.as_deref() {
                    Some(filter) => HardwareError::unavailable(format!(
                        "no USB NFC reader matching '{filter}' found"
                    )),
                    None => HardwareError::unavailable("no USB NFC reader found"),
                }
            })?;

            Ok((context, name))
        });

        let (context, name) = tokio::time::timeout(timeout, task)
            .await
            .map_err(|_| HardwareError::timeout(timeout))???;

        let info = ReaderInfo::new(name.to_string_lossy(), "pcsc");
        info!(reader = %info.name, "Found USB reader");

        self.context = Some(context);
        self.reader_name = Some(name);
        Ok(info)
    }

    async fn attempt_read(&mut self, timeout: Duration) -> Result<ReadOutcome> {
        let (Some(context), Some(name)) = (self.context.clone(), self.reader_name.clone()) else {
            return Err(HardwareError::disconnected("PC/SC reader not initialized"));
        };

        let task = tokio::task::spawn_blocking(move || {
            let display = name.to_string_lossy().into_owned();

            let card = match context.connect(&name, ShareMode::Shared, Protocols::ANY) {
                Ok(card) => card,
                Err(e) => return classify(e, &display),
            };

            let mut buffer = [0u8; pcsc::MAX_BUFFER_SIZE];
            let response = match card.transmit(&GET_UID_APDU, &mut buffer) {
                Ok(response) => response,
                Err(e) => return classify(e, &display),
            };

            parse_uid_response(response).map(ReadOutcome::Card)
        });

        tokio::time::timeout(timeout, task)
            .await
            .map_err(|_| HardwareError::timeout(timeout))?
            .map_err(HardwareError::from)?
    }

    async fn release(&mut self) -> Result<()> {
        self.reader_name = None;

        if let Some(context) = self.context.take() {
            context
                .release()
                .map_err(|(_, e)| HardwareError::communication(format!("PC/SC release: {e}")))?;
        }
        Ok(())
    }
}
