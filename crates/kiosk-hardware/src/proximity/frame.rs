//! PN532 frame codec.
//!
//! Normal information frames:
//!
//! ```text
//! 00 00 FF LEN LCS TFI CMD DATA.. DCS 00
//!          │   │   │           │
//!          │   │   │           └─ DCS: TFI + CMD + DATA + DCS ≡ 0 (mod 256)
//!          │   │   └─ D4 host → PN532, D5 PN532 → host
//!          │   └─ LCS: LEN + LCS ≡ 0 (mod 256)
//!          └─ LEN: TFI + CMD + DATA byte count
//! ```
//!
//! The PN532 acknowledges every command with the ACK frame
//! `00 00 FF 00 FF 00` before sending its response, and signals syntax
//! errors with the application error frame `00 00 FF 01 FF 7F 81 00`.

use crate::types::ReadOutcome;
use crate::{HardwareError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use kiosk_core::CardIdentifier;

pub const PREAMBLE: u8 = 0x00;
pub const START_CODE: [u8; 2] = [0x00, 0xFF];
pub const POSTAMBLE: u8 = 0x00;

/// Frame identifier for host to PN532 frames.
pub const TFI_HOST_TO_PN532: u8 = 0xD4;

/// Frame identifier for PN532 to host frames.
pub const TFI_PN532_TO_HOST: u8 = 0xD5;

/// Acknowledge frame sent by the PN532 after a valid command.
pub const ACK_FRAME: [u8; 6] = [0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00];

/// Payload of the application error frame.
const ERROR_FRAME_PAYLOAD: u8 = 0x7F;

/// Largest LEN value of a normal information frame.
const MAX_FRAME_LEN: usize = 0xFF;

/// Command codes used by the kiosk.
pub mod command {
    pub const GET_FIRMWARE_VERSION: u8 = 0x02;
    pub const SAM_CONFIGURATION: u8 = 0x14;
    pub const RF_CONFIGURATION: u8 = 0x32;
    pub const IN_LIST_PASSIVE_TARGET: u8 = 0x4A;
}

fn checksum(bytes: impl IntoIterator<Item = u8>) -> u8 {
    bytes
        .into_iter()
        .fold(0u8, |acc, b| acc.wrapping_add(b))
        .wrapping_neg()
}

/// Encode a host command into a normal information frame.
///
/// # Errors
///
/// Returns `HardwareError::InvalidData` if the parameters do not fit in a
/// normal frame.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::proximity::frame::{command, encode_command};
///
/// let frame = encode_command(command::GET_FIRMWARE_VERSION, &[]).unwrap();
/// assert_eq!(&frame[..], &[0x00, 0x00, 0xFF, 0x02, 0xFE, 0xD4, 0x02, 0x2A, 0x00]);
/// ```
pub fn encode_command(command: u8, params: &[u8]) -> Result<Bytes> {
    let len = params.len() + 2;
    if len > MAX_FRAME_LEN {
        return Err(HardwareError::invalid_data(format!(
            "PN532 command 0x{command:02X} too long: {} parameter bytes",
            params.len()
        )));
    }
    let len = len as u8;

    let mut frame = BytesMut::with_capacity(usize::from(len) + 7);
    frame.put_u8(PREAMBLE);
    frame.put_slice(&START_CODE);
    frame.put_u8(len);
    frame.put_u8(len.wrapping_neg());
    frame.put_u8(TFI_HOST_TO_PN532);
    frame.put_u8(command);
    frame.put_slice(params);
    frame.put_u8(checksum(
        [TFI_HOST_TO_PN532, command]
            .into_iter()
            .chain(params.iter().copied()),
    ));
    frame.put_u8(POSTAMBLE);

    Ok(frame.freeze())
}

/// Check whether `buf` starts with the ACK frame.
pub fn is_ack(buf: &[u8]) -> bool {
    buf.starts_with(&ACK_FRAME)
}

/// Decode the response frame to `command` and return its data bytes.
///
/// Leading bytes before the start code (preamble, padding) are skipped.
///
/// # Errors
///
/// Returns `HardwareError::InvalidData` on a missing start code, a truncated
/// frame, a checksum mismatch or an unexpected response code, and
/// `HardwareError::CommunicationError` on an application error frame.
pub fn decode_response(command: u8, buf: &[u8]) -> Result<Vec<u8>> {
    let start = buf
        .windows(START_CODE.len())
        .position(|w| w == START_CODE)
        .ok_or_else(|| HardwareError::invalid_data("PN532 response without start code"))?;

    let body = &buf[start + START_CODE.len()..];
    let (&len, &lcs) = match body {
        [len, lcs, ..] => (len, lcs),
        _ => return Err(HardwareError::invalid_data("PN532 response truncated")),
    };

    if len.wrapping_add(lcs) != 0 {
        return Err(HardwareError::invalid_data(format!(
            "PN532 length checksum mismatch (LEN {len:02X}, LCS {lcs:02X})"
        )));
    }

    let len = usize::from(len);
    let Some(payload) = body.get(2..2 + len) else {
        return Err(HardwareError::invalid_data("PN532 response truncated"));
    };
    let Some(&dcs) = body.get(2 + len) else {
        return Err(HardwareError::invalid_data("PN532 response truncated"));
    };

    if payload.iter().fold(dcs, |acc, b| acc.wrapping_add(*b)) != 0 {
        return Err(HardwareError::invalid_data("PN532 data checksum mismatch"));
    }

    match payload {
        [ERROR_FRAME_PAYLOAD] => Err(HardwareError::communication(format!(
            "PN532 rejected command 0x{command:02X} (application error frame)"
        ))),
        [TFI_PN532_TO_HOST, code, data @ ..] if *code == command.wrapping_add(1) => {
            Ok(data.to_vec())
        }
        [TFI_PN532_TO_HOST, code, ..] => Err(HardwareError::invalid_data(format!(
            "PN532 answered 0x{code:02X} to command 0x{command:02X}"
        ))),
        _ => Err(HardwareError::invalid_data("PN532 response with wrong frame identifier")),
    }
}

/// Format the GetFirmwareVersion response (`IC VER REV SUPPORT`).
///
/// # Errors
///
/// Returns `HardwareError::InvalidData` if the response is shorter than four
/// bytes.
pub fn parse_firmware_version(data: &[u8]) -> Result<String> {
    match data {
        [ic, ver, rev, _support, ..] => Ok(format!("PN5{ic:02X} v{ver}.{rev}")),
        _ => Err(HardwareError::invalid_data(format!(
            "PN532 firmware response too short: {} bytes",
            data.len()
        ))),
    }
}

/// Parse the InListPassiveTarget response for a 106 kbps type A target.
///
/// ```text
/// NbTg [Tg SENS_RES(2) SEL_RES NFCIDLength NFCID1...]
/// ```
///
/// # Errors
///
/// Returns `HardwareError::InvalidData` on a truncated target description or
/// an out-of-range UID length.
pub fn parse_passive_target(data: &[u8]) -> Result<ReadOutcome> {
    let Some(&targets) = data.first() else {
        return Err(HardwareError::invalid_data("empty InListPassiveTarget response"));
    };

    if targets == 0 {
        return Ok(ReadOutcome::Absent);
    }

    let Some(&uid_len) = data.get(5) else {
        return Err(HardwareError::invalid_data("truncated target description"));
    };

    let uid = data
        .get(6..6 + usize::from(uid_len))
        .ok_or_else(|| HardwareError::invalid_data("truncated target UID"))?;

    CardIdentifier::new(uid.to_vec())
        .map(ReadOutcome::Card)
        .map_err(|e| HardwareError::invalid_data(e.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rstest::rstest;

    /// Build a PN532 → host response frame (test helper).
    pub(crate) fn response_frame(command: u8, data: &[u8]) -> Vec<u8> {
        let len = (data.len() + 2) as u8;
        let mut frame = vec![PREAMBLE, 0x00, 0xFF, len, len.wrapping_neg()];
        frame.push(TFI_PN532_TO_HOST);
        frame.push(command + 1);
        frame.extend_from_slice(data);
        frame.push(checksum(
            [TFI_PN532_TO_HOST, command + 1]
                .into_iter()
                .chain(data.iter().copied()),
        ));
        frame.push(POSTAMBLE);
        frame
    }

    #[test]
    fn test_encode_sam_configuration() {
        let frame = encode_command(command::SAM_CONFIGURATION, &[0x01, 0x14, 0x01]).unwrap();
        assert_eq!(
            &frame[..],
            &[0x00, 0x00, 0xFF, 0x05, 0xFB, 0xD4, 0x14, 0x01, 0x14, 0x01, 0x02, 0x00]
        );
    }

    #[test]
    fn test_encode_in_list_passive_target() {
        let frame = encode_command(command::IN_LIST_PASSIVE_TARGET, &[0x01, 0x00]).unwrap();
        assert_eq!(
            &frame[..],
            &[0x00, 0x00, 0xFF, 0x04, 0xFC, 0xD4, 0x4A, 0x01, 0x00, 0xE1, 0x00]
        );
    }

    #[test]
    fn test_encode_rejects_oversized() {
        assert!(encode_command(0x40, &[0u8; 300]).is_err());
    }

    #[test]
    fn test_is_ack() {
        assert!(is_ack(&ACK_FRAME));
        assert!(is_ack(&[0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0x00, 0x00]));
        assert!(!is_ack(&[0x00, 0x00, 0xFF, 0x01, 0xFF, 0x7F, 0x81, 0x00]));
    }

    #[test]
    fn test_decode_firmware_response() {
        let frame = response_frame(command::GET_FIRMWARE_VERSION, &[0x32, 0x01, 0x06, 0x07]);
        let data = decode_response(command::GET_FIRMWARE_VERSION, &frame).unwrap();
        assert_eq!(data, vec![0x32, 0x01, 0x06, 0x07]);
        assert_eq!(parse_firmware_version(&data).unwrap(), "PN532 v1.6");
    }

    #[test]
    fn test_decode_skips_leading_padding() {
        let mut buf = vec![0x00, 0x00];
        buf.extend(response_frame(command::SAM_CONFIGURATION, &[]));
        buf.extend([0x00; 8]);
        assert!(decode_response(command::SAM_CONFIGURATION, &buf).unwrap().is_empty());
    }

    #[test]
    fn test_decode_error_frame() {
        let frame = [0x00, 0x00, 0xFF, 0x01, 0xFF, 0x7F, 0x81, 0x00];
        let err = decode_response(command::IN_LIST_PASSIVE_TARGET, &frame).unwrap_err();
        assert!(matches!(err, HardwareError::CommunicationError { .. }));
    }

    #[rstest]
    #[case::no_start_code(vec![0x00, 0x00, 0x00, 0x00])]
    #[case::truncated_header(vec![0x00, 0x00, 0xFF, 0x04])]
    #[case::bad_length_checksum(vec![0x00, 0x00, 0xFF, 0x04, 0xFD, 0xD5, 0x4B, 0x00, 0xE0, 0x00])]
    #[case::truncated_payload(vec![0x00, 0x00, 0xFF, 0x04, 0xFC, 0xD5, 0x4B])]
    fn test_decode_malformed(#[case] frame: Vec<u8>) {
        let err = decode_response(command::IN_LIST_PASSIVE_TARGET, &frame).unwrap_err();
        assert!(matches!(err, HardwareError::InvalidData { .. }));
    }

    #[test]
    fn test_decode_bad_data_checksum() {
        let mut frame = response_frame(command::IN_LIST_PASSIVE_TARGET, &[0x00]);
        let dcs = frame.len() - 2;
        frame[dcs] ^= 0xFF;
        assert!(decode_response(command::IN_LIST_PASSIVE_TARGET, &frame).is_err());
    }

    #[test]
    fn test_decode_unexpected_response_code() {
        let frame = response_frame(command::GET_FIRMWARE_VERSION, &[0x32, 0x01, 0x06, 0x07]);
        let err = decode_response(command::IN_LIST_PASSIVE_TARGET, &frame).unwrap_err();
        assert!(err.to_string().contains("0x03"));
    }

    #[test]
    fn test_parse_passive_target_absent() {
        assert_eq!(parse_passive_target(&[0x00]).unwrap(), ReadOutcome::Absent);
    }

    #[test]
    fn test_parse_passive_target_card() {
        let data = [0x01, 0x01, 0x00, 0x04, 0x08, 0x04, 0x04, 0xA1, 0xB2, 0xC3];
        let outcome = parse_passive_target(&data).unwrap();
        assert_eq!(outcome.card().unwrap().to_hex(), "04A1B2C3");
    }

    #[rstest]
    #[case::empty(&[])]
    #[case::truncated_description(&[0x01, 0x01, 0x00])]
    #[case::truncated_uid(&[0x01, 0x01, 0x00, 0x04, 0x08, 0x07, 0x04, 0xA1])]
    #[case::short_uid(&[0x01, 0x01, 0x00, 0x04, 0x08, 0x02, 0x04, 0xA1])]
    fn test_parse_passive_target_malformed(#[case] data: &[u8]) {
        assert!(parse_passive_target(data).is_err());
    }
}
