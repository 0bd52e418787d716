use crate::{
    Result,
    constants::{MAX_UID_LENGTH, MIN_UID_LENGTH},
    error::Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Card identifier read from a presented NFC/RFID card.
///
/// Immutable sequence of UID bytes (4-10 bytes per ISO 14443). The canonical
/// rendering used for transport and comparison is uppercase hexadecimal
/// without separators, e.g. `04A1B2C3`.
///
/// # Examples
///
/// ```
/// use kiosk_core::CardIdentifier;
///
/// let id = CardIdentifier::new(vec![0x04, 0xA1, 0xB2, 0xC3]).unwrap();
/// assert_eq!(id.to_string(), "04A1B2C3");
///
/// let parsed: CardIdentifier = "04a1b2c3".parse().unwrap();
/// assert_eq!(parsed, id);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CardIdentifier(Vec<u8>);

impl CardIdentifier {
    /// Create a new identifier from raw UID bytes.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardIdentifier` if the UID length is outside
    /// the 4-10 byte range.
    pub fn new(uid: Vec<u8>) -> Result<Self> {
        let len = uid.len();
        if !(MIN_UID_LENGTH..=MAX_UID_LENGTH).contains(&len) {
            return Err(Error::InvalidCardIdentifier(format!(
                "UID must be {MIN_UID_LENGTH}-{MAX_UID_LENGTH} bytes, got {len}"
            )));
        }
        Ok(CardIdentifier(uid))
    }

    /// Parse an identifier from its hexadecimal rendering.
    ///
    /// Accepts either case and ignores spaces and colons, so reader-style
    /// renderings like `04 A1 B2 C3` or `04:a1:b2:c3` are normalized.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardIdentifier` on non-hex characters, an odd
    /// number of digits or an out-of-range length.
    pub fn from_hex(s: &str) -> Result<Self> {
        let digits: Vec<u8> = s
            .bytes()
            .filter(|b| !matches!(b, b' ' | b':'))
            .collect();

        if digits.len() % 2 != 0 {
            return Err(Error::InvalidCardIdentifier(format!(
                "Odd number of hex digits in '{s}'"
            )));
        }

        let uid = digits
            .chunks(2)
            .map(|pair| {
                let hi = hex_value(pair[0]);
                let lo = hex_value(pair[1]);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
                    _ => Err(Error::InvalidCardIdentifier(format!(
                        "Non-hex character in '{s}'"
                    ))),
                }
            })
            .collect::<Result<Vec<u8>>>()?;

        CardIdentifier::new(uid)
    }

    /// Get the raw UID bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the canonical uppercase hexadecimal rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02X}", b)).collect()
    }
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for CardIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for CardIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CardIdentifier::from_hex(s)
    }
}

impl From<CardIdentifier> for String {
    fn from(id: CardIdentifier) -> Self {
        id.to_hex()
    }
}

impl TryFrom<String> for CardIdentifier {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        CardIdentifier::from_hex(&s)
    }
}

/// A distinct, accepted card presentation.
///
/// Created by the debouncer the instant a read is accepted and consumed
/// synchronously by the dispatcher. Never retained afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanEvent {
    identifier: CardIdentifier,
    observed_at: DateTime<Utc>,
}

impl ScanEvent {
    /// Create a scan event observed now.
    #[must_use]
    pub fn new(identifier: CardIdentifier) -> Self {
        Self::observed_at(identifier, Utc::now())
    }

    /// Create a scan event with an explicit observation time.
    #[must_use]
    pub fn observed_at(identifier: CardIdentifier, observed_at: DateTime<Utc>) -> Self {
        Self {
            identifier,
            observed_at,
        }
    }

    #[must_use]
    pub fn identifier(&self) -> &CardIdentifier {
        &self.identifier
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.observed_at
    }
}

/// Classified outcome of one webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The endpoint answered with a success status.
    Delivered,
    /// The endpoint answered, but with a non-success status.
    Rejected,
    /// No answer: connection failure or timeout.
    Unreachable,
}

impl DeliveryOutcome {
    #[must_use]
    pub fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Delivered => write!(f, "delivered"),
            Self::Rejected => write!(f, "rejected"),
            Self::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Result of delivering one [`ScanEvent`].
///
/// The identifier is always taken from the event that produced it, so a
/// result can only be built through [`DeliveryResult::delivered`],
/// [`DeliveryResult::rejected`] or [`DeliveryResult::unreachable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    identifier: CardIdentifier,
    outcome: DeliveryOutcome,
    detail: Option<String>,
}

impl DeliveryResult {
    #[must_use]
    pub fn delivered(event: &ScanEvent) -> Self {
        Self {
            identifier: event.identifier().clone(),
            outcome: DeliveryOutcome::Delivered,
            detail: None,
        }
    }

    #[must_use]
    pub fn rejected(event: &ScanEvent, detail: impl Into<String>) -> Self {
        Self {
            identifier: event.identifier().clone(),
            outcome: DeliveryOutcome::Rejected,
            detail: Some(detail.into()),
        }
    }

    #[must_use]
    pub fn unreachable(event: &ScanEvent, detail: impl Into<String>) -> Self {
        Self {
            identifier: event.identifier().clone(),
            outcome: DeliveryOutcome::Unreachable,
            detail: Some(detail.into()),
        }
    }

    #[must_use]
    pub fn identifier(&self) -> &CardIdentifier {
        &self.identifier
    }

    #[must_use]
    pub fn outcome(&self) -> DeliveryOutcome {
        self.outcome
    }

    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

/// Status field of the `scan_result` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Success,
    Error,
}

/// Payload of the `scan_result` message broadcast to display clients.
///
/// Serializes as `{"status": "success"|"error", "card_id": "<HEX>", "msg": "..."}`
/// with `msg` omitted when there is nothing to explain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResultMessage {
    pub status: ScanStatus,
    pub card_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub msg: Option<String>,
}

impl From<&DeliveryResult> for ScanResultMessage {
    fn from(result: &DeliveryResult) -> Self {
        let card_id = result.identifier().to_hex();
        match result.outcome() {
            DeliveryOutcome::Delivered => Self {
                status: ScanStatus::Success,
                card_id,
                msg: None,
            },
            DeliveryOutcome::Rejected => Self {
                status: ScanStatus::Error,
                card_id,
                msg: Some(format!(
                    "Card was rejected by the server ({})",
                    result.detail().unwrap_or("no details")
                )),
            },
            DeliveryOutcome::Unreachable => Self {
                status: ScanStatus::Error,
                card_id,
                msg: Some(format!(
                    "Server could not be reached ({})",
                    result.detail().unwrap_or("no details")
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(vec![0x04, 0xA1, 0xB2, 0xC3], "04A1B2C3")]
    #[case(vec![0x00, 0x01, 0x0A, 0xFF], "00010AFF")]
    #[case(vec![0x04, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC], "04123456789ABC")]
    fn test_card_identifier_hex(#[case] uid: Vec<u8>, #[case] expected: &str) {
        let id = CardIdentifier::new(uid).unwrap();
        assert_eq!(id.to_hex(), expected);
        assert_eq!(id.to_string(), expected);
    }

    #[rstest]
    #[case("04a1b2c3", "04A1B2C3")]
    #[case("04 A1 B2 C3", "04A1B2C3")]
    #[case("04:a1:b2:c3", "04A1B2C3")]
    fn test_card_identifier_parse_normalizes(#[case] input: &str, #[case] expected: &str) {
        let id: CardIdentifier = input.parse().unwrap();
        assert_eq!(id.to_hex(), expected);
    }

    #[rstest]
    #[case("04A1B2C")] // odd digits
    #[case("04A1B2ZZ")] // non-hex
    #[case("04A1B2")] // too short
    #[case("0102030405060708090A0B")] // too long
    #[case("")]
    fn test_card_identifier_parse_invalid(#[case] input: &str) {
        assert!(CardIdentifier::from_hex(input).is_err());
    }

    #[test]
    fn test_card_identifier_length_bounds() {
        assert!(CardIdentifier::new(vec![0x01; 3]).is_err());
        assert!(CardIdentifier::new(vec![0x01; 4]).is_ok());
        assert!(CardIdentifier::new(vec![0x01; 10]).is_ok());
        assert!(CardIdentifier::new(vec![0x01; 11]).is_err());
    }

    #[test]
    fn test_card_identifier_serializes_as_hex() {
        let id = CardIdentifier::new(vec![0x04, 0xA1, 0xB2, 0xC3]).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"04A1B2C3\"");

        let back: CardIdentifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    fn sample_event() -> ScanEvent {
        ScanEvent::new("04A1B2C3".parse().unwrap())
    }

    #[test]
    fn test_delivery_result_keeps_event_identifier() {
        let event = sample_event();

        for result in [
            DeliveryResult::delivered(&event),
            DeliveryResult::rejected(&event, "HTTP 500"),
            DeliveryResult::unreachable(&event, "timed out"),
        ] {
            assert_eq!(result.identifier(), event.identifier());
        }
    }

    #[test]
    fn test_scan_result_message_success_omits_msg() {
        let event = sample_event();
        let message = ScanResultMessage::from(&DeliveryResult::delivered(&event));

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "success", "card_id": "04A1B2C3"})
        );
    }

    #[test]
    fn test_scan_result_message_rejected() {
        let event = sample_event();
        let message = ScanResultMessage::from(&DeliveryResult::rejected(&event, "HTTP 500"));

        assert_eq!(message.status, ScanStatus::Error);
        assert_eq!(message.card_id, "04A1B2C3");
        assert!(message.msg.as_deref().unwrap().contains("HTTP 500"));
    }

    #[test]
    fn test_scan_result_message_unreachable() {
        let event = sample_event();
        let message =
            ScanResultMessage::from(&DeliveryResult::unreachable(&event, "connection refused"));

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json["msg"].as_str().unwrap().contains("connection refused"));
    }

    #[test]
    fn test_delivery_outcome_display() {
        assert_eq!(DeliveryOutcome::Delivered.to_string(), "delivered");
        assert_eq!(DeliveryOutcome::Rejected.to_string(), "rejected");
        assert_eq!(DeliveryOutcome::Unreachable.to_string(), "unreachable");
        assert!(DeliveryOutcome::Delivered.is_delivered());
        assert!(!DeliveryOutcome::Rejected.is_delivered());
    }
}
