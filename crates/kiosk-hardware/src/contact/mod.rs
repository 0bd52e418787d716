//! Contact-style (PC/SC) reader support.
//!
//! USB readers such as the ACR122U and ACR1252U are driven through the PC/SC
//! smartcard API. Reading a contactless card UID is a single pseudo-APDU
//! exchange:
//!
//! ```text
//! Host ──► FF CA 00 00 00          (GET DATA: UID)
//! Host ◄── <UID bytes> 90 00       (success)
//! Host ◄── 63 00 | 6A 81           (operation failed / not supported)
//! ```
//!
//! The response parsing lives here and is always compiled; the PC/SC driver
//! itself (`PcscReader`) needs the `hardware-pcsc` feature.

use crate::{HardwareError, Result};
use kiosk_core::CardIdentifier;

#[cfg(feature = "hardware-pcsc")]
mod pcsc_reader;

#[cfg(feature = "hardware-pcsc")]
pub use pcsc_reader::PcscReader;

/// GET DATA pseudo-APDU returning the UID of the card in the field.
pub const GET_UID_APDU: [u8; 5] = [0xFF, 0xCA, 0x00, 0x00, 0x00];

/// Status word of a successful command.
pub const SW_SUCCESS: (u8, u8) = (0x90, 0x00);

/// Parse the response to [`GET_UID_APDU`].
///
/// # Errors
///
/// Returns `HardwareError::InvalidData` if the response is too short, carries
/// a non-success status word, or the UID length is out of range.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::contact::parse_uid_response;
///
/// let id = parse_uid_response(&[0x04, 0xA1, 0xB2, 0xC3, 0x90, 0x00]).unwrap();
/// assert_eq!(id.to_hex(), "04A1B2C3");
///
/// assert!(parse_uid_response(&[0x63, 0x00]).is_err());
/// ```
pub fn parse_uid_response(response: &[u8]) -> Result<CardIdentifier> {
    let Some((status, data)) = response
        .len()
        .checked_sub(2)
        .map(|split| (&response[split..], &response[..split]))
    else {
        return Err(HardwareError::invalid_data(format!(
            "APDU response too short: {} bytes",
            response.len()
        )));
    };

    let (sw1, sw2) = (status[0], status[1]);
    if (sw1, sw2) != SW_SUCCESS {
        return Err(HardwareError::invalid_data(format!(
            "GET UID failed with status {sw1:02X}{sw2:02X}"
        )));
    }

    CardIdentifier::new(data.to_vec()).map_err(|e| HardwareError::invalid_data(e.to_string()))
}
