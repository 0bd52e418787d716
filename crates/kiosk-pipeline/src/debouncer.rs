//! Scan debouncer.
//!
//! Turns the raw stream of read attempts into distinct scan events.
//!
//! # States
//!
//! - `Idle`: no recent accepted scan
//! - `Cooldown(until)`: a scan was delivered; the same card is ignored
//!   until `until`
//! - `Held`: the last delivery failed; the same card is ignored while it
//!   stays in the field
//!
//! # Transitions
//!
//! - Card read in `Idle` → emit a [`ScanEvent`], enter `Cooldown(now + cooldown)`
//! - Delivery finished → [`on_delivery`](ScanDebouncer::on_delivery) re-arms
//!   the cooldown from the completion time when the webhook accepted the
//!   card, or moves to `Held` when it did not
//! - Same card read in `Cooldown` before `until`, or in `Held` → discarded
//! - Different card read in `Cooldown` or `Held` → emit, restart the cooldown
//! - `now ≥ until` → back to `Idle` before the read is evaluated
//! - No card → no state change, except that it ends `Held`
//! - Fault → count it; after `fault_threshold` consecutive faults report
//!   [`Decision::ReaderLost`] once and start counting again
//!
//! A card left on the reader is reported again once the cooldown expires.
//! Time, not the identifier, decides what is a new presentation; the
//! identifier only recognizes the card that is still in the field. A failed
//! delivery does not start a cooldown: lifting the card and tapping it again
//! is accepted right away, while a card that simply stays put is not sent
//! twice.
//!
//! Two cards held in the field together can be read alternately by the
//! reader. Each read then looks like a different card and is emitted; the
//! debouncer cannot tell that apart from two quick taps.
//!
//! # Examples
//!
//! ```
//! use kiosk_pipeline::debouncer::{Decision, ScanDebouncer};
//! use std::time::Duration;
//! use tokio::time::Instant;
//!
//! let mut debouncer = ScanDebouncer::new(Duration::from_secs(3), 10);
//! let card = "04A1B2C3".parse().unwrap();
//! let now = Instant::now();
//!
//! assert!(matches!(debouncer.on_card(&card, now), Decision::Accept(_)));
//! assert_eq!(
//!     debouncer.on_card(&card, now + Duration::from_millis(500)),
//!     Decision::Suppressed
//! );
//! assert!(matches!(
//!     debouncer.on_card(&card, now + Duration::from_secs(3)),
//!     Decision::Accept(_)
//! ));
//! ```

use kiosk_core::{CardIdentifier, DeliveryOutcome, ScanEvent};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Debouncer state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Cooldown { until: Instant },
    Held,
}

impl fmt::Display for DebounceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Cooldown { .. } => write!(f, "cooldown"),
            Self::Held => write!(f, "held"),
        }
    }
}

/// What the poll loop should do with one read attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// A new presentation: deliver and publish it.
    Accept(ScanEvent),

    /// Same card still on the reader within the cooldown.
    Suppressed,

    /// Nothing in the field.
    NoCard,

    /// Hardware fault below the threshold.
    Fault { consecutive: u32 },

    /// `fault_threshold` consecutive faults: the reader should be
    /// re-initialized.
    ReaderLost { consecutive: u32 },
}

/// Mutable state owned by the poll loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderState {
    last_accepted: Option<CardIdentifier>,
    cooldown_until: Option<Instant>,
    awaiting_removal: bool,
    consecutive_errors: u32,
}

impl ReaderState {
    pub fn last_accepted(&self) -> Option<&CardIdentifier> {
        self.last_accepted.as_ref()
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }

    /// Set after a failed delivery until the card leaves the field.
    pub fn awaiting_removal(&self) -> bool {
        self.awaiting_removal
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }
}

/// Debounce state machine for one reader.
#[derive(Debug, Clone)]
pub struct ScanDebouncer {
    cooldown: Duration,
    fault_threshold: u32,
    state: ReaderState,
}

impl ScanDebouncer {
    /// Create a debouncer. A zero threshold is treated as one.
    pub fn new(cooldown: Duration, fault_threshold: u32) -> Self {
        Self {
            cooldown,
            fault_threshold: fault_threshold.max(1),
            state: ReaderState::default(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn fault_threshold(&self) -> u32 {
        self.fault_threshold
    }

    pub fn reader_state(&self) -> &ReaderState {
        &self.state
    }

    /// State at `now`, with an elapsed cooldown reported as `Idle`.
    pub fn state_at(&self, now: Instant) -> DebounceState {
        match self.state.cooldown_until {
            Some(until) if now < until => DebounceState::Cooldown { until },
            _ if self.state.awaiting_removal => DebounceState::Held,
            _ => DebounceState::Idle,
        }
    }

    fn holds(&self, card: &CardIdentifier) -> bool {
        (self.state.cooldown_until.is_some() || self.state.awaiting_removal)
            && self.state.last_accepted.as_ref() == Some(card)
    }

    fn expire(&mut self, now: Instant) {
        if matches!(self.state.cooldown_until, Some(until) if now >= until) {
            self.state.cooldown_until = None;
            self.state.last_accepted = None;
        }
    }

    /// Evaluate a successful read of `card` at `now`.
    ///
    /// Any card other than the last accepted one is a new presentation, even
    /// inside the cooldown.
    pub fn on_card(&mut self, card: &CardIdentifier, now: Instant) -> Decision {
        self.expire(now);
        self.state.consecutive_errors = 0;

        if self.holds(card) {
            return Decision::Suppressed;
        }

        self.state.last_accepted = Some(card.clone());
        self.state.cooldown_until = Some(now + self.cooldown);
        self.state.awaiting_removal = false;
        Decision::Accept(ScanEvent::new(card.clone()))
    }

    /// Record how the delivery of the last accepted scan ended, at `now`.
    ///
    /// A delivered scan starts its cooldown here, so a slow webhook cannot
    /// use it up. A rejected or unreachable scan starts none: the card is
    /// only held until it leaves the field.
    pub fn on_delivery(&mut self, outcome: DeliveryOutcome, now: Instant) {
        if self.state.last_accepted.is_none() {
            return;
        }

        if outcome.is_delivered() {
            self.state.cooldown_until = Some(now + self.cooldown);
            self.state.awaiting_removal = false;
        } else {
            self.state.cooldown_until = None;
            self.state.awaiting_removal = true;
        }
    }

    /// Evaluate an empty field.
    pub fn on_absent(&mut self) -> Decision {
        self.state.consecutive_errors = 0;
        if self.state.awaiting_removal {
            self.state.awaiting_removal = false;
            self.state.last_accepted = None;
        }
        Decision::NoCard
    }

    /// Evaluate a hardware fault. Never touches the cooldown.
    pub fn on_fault(&mut self) -> Decision {
        self.state.consecutive_errors += 1;
        let consecutive = self.state.consecutive_errors;

        if consecutive >= self.fault_threshold {
            self.state.consecutive_errors = 0;
            Decision::ReaderLost { consecutive }
        } else {
            Decision::Fault { consecutive }
        }
    }

    /// Evaluate a read that found no usable reader at all. Skips the fault
    /// threshold and asks for re-initialization right away.
    pub fn on_unavailable(&mut self) -> Decision {
        let consecutive = self.state.consecutive_errors + 1;
        self.state.consecutive_errors = 0;
        Decision::ReaderLost { consecutive }
    }

    /// Clear the fault counter after the reader was re-initialized.
    pub fn reset_faults(&mut self) {
        self.state.consecutive_errors = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const COOLDOWN: Duration = Duration::from_millis(3000);

    fn card(hex: &str) -> CardIdentifier {
        hex.parse().unwrap()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn is_accept(decision: &Decision) -> bool {
        matches!(decision, Decision::Accept(_))
    }

    #[test]
    fn test_accept_enters_cooldown() {
        let mut debouncer = ScanDebouncer::new(COOLDOWN, 10);
        let t0 = Instant::now();
        assert_eq!(debouncer.state_at(t0), DebounceState::Idle);

        let Decision::Accept(event) = debouncer.on_card(&card("04A1B2C3"), t0) else {
            panic!("first read must be accepted");
        };
        assert_eq!(event.identifier().to_hex(), "04A1B2C3");
        assert_eq!(
            debouncer.state_at(t0),
            DebounceState::Cooldown { until: t0 + COOLDOWN }
        );
        assert_eq!(debouncer.reader_state().last_accepted(), Some(&card("04A1B2C3")));
    }

    #[rstest]
    #[case::just_before(2999, false)]
    #[case::at_boundary(3000, true)]
    #[case::after(4500, true)]
    fn test_cooldown_boundary(#[case] offset_ms: u64, #[case] accepts: bool) {
        let mut debouncer = ScanDebouncer::new(COOLDOWN, 10);
        let t0 = Instant::now();
        debouncer.on_card(&card("04A1B2C3"), t0);

        let decision = debouncer.on_card(&card("04A1B2C3"), t0 + ms(offset_ms));
        assert_eq!(is_accept(&decision), accepts);
    }

    #[test]
    fn test_cooldown_expires_to_idle() {
        let mut debouncer = ScanDebouncer::new(COOLDOWN, 10);
        let t0 = Instant::now();
        debouncer.on_card(&card("04A1B2C3"), t0);
        assert_eq!(debouncer.state_at(t0 + COOLDOWN), DebounceState::Idle);
        assert_eq!(debouncer.state_at(t0 + COOLDOWN).to_string(), "idle");
    }

    #[test]
    fn test_absent_does_not_change_cooldown() {
        let mut debouncer = ScanDebouncer::new(COOLDOWN, 10);
        let t0 = Instant::now();
        debouncer.on_card(&card("04A1B2C3"), t0);
        let before = debouncer.reader_state().clone();

        assert_eq!(debouncer.on_absent(), Decision::NoCard);
        assert_eq!(debouncer.reader_state(), &before);

        // Lifting and re-presenting within the cooldown is still suppressed
        assert_eq!(
            debouncer.on_card(&card("04A1B2C3"), t0 + ms(1500)),
            Decision::Suppressed
        );
    }

    #[test]
    fn test_distinct_card_during_cooldown_is_accepted() {
        let mut debouncer = ScanDebouncer::new(COOLDOWN, 10);
        let t0 = Instant::now();
        debouncer.on_card(&card("04A1B2C3"), t0);

        assert!(is_accept(&debouncer.on_card(&card("04D5E6F7"), t0 + ms(500))));
        // The cooldown restarted for the new card
        assert_eq!(
            debouncer.state_at(t0 + ms(500)),
            DebounceState::Cooldown { until: t0 + ms(3500) }
        );
        // And the first card counts as a new presentation again
        assert!(is_accept(&debouncer.on_card(&card("04A1B2C3"), t0 + ms(1000))));
    }

    #[test]
    fn test_delivery_restarts_cooldown_from_completion() {
        let mut debouncer = ScanDebouncer::new(COOLDOWN, 10);
        let t0 = Instant::now();
        debouncer.on_card(&card("04A1B2C3"), t0);

        // Webhook took longer than the cooldown itself
        let done = t0 + ms(3500);
        debouncer.on_delivery(DeliveryOutcome::Delivered, done);
        assert_eq!(
            debouncer.state_at(done),
            DebounceState::Cooldown { until: done + COOLDOWN }
        );
        assert_eq!(debouncer.on_card(&card("04A1B2C3"), done + ms(500)), Decision::Suppressed);
        assert!(is_accept(&debouncer.on_card(&card("04A1B2C3"), done + COOLDOWN)));
    }

    #[rstest]
    #[case::rejected(DeliveryOutcome::Rejected)]
    #[case::unreachable(DeliveryOutcome::Unreachable)]
    fn test_failed_delivery_holds_card_until_lifted(#[case] outcome: DeliveryOutcome) {
        let mut debouncer = ScanDebouncer::new(COOLDOWN, 10);
        let t0 = Instant::now();
        debouncer.on_card(&card("04A1B2C3"), t0);
        debouncer.on_delivery(outcome, t0 + ms(100));

        assert_eq!(debouncer.state_at(t0 + ms(100)), DebounceState::Held);
        assert_eq!(debouncer.state_at(t0 + ms(100)).to_string(), "held");

        // Still resting on the reader, even long after a cooldown would end
        assert_eq!(debouncer.on_card(&card("04A1B2C3"), t0 + ms(600)), Decision::Suppressed);
        assert_eq!(debouncer.on_card(&card("04A1B2C3"), t0 + ms(9000)), Decision::Suppressed);

        // Lifted and tapped again: no cooldown applies
        debouncer.on_absent();
        assert_eq!(debouncer.state_at(t0 + ms(9500)), DebounceState::Idle);
        assert!(is_accept(&debouncer.on_card(&card("04A1B2C3"), t0 + ms(9500))));
    }

    #[test]
    fn test_fault_does_not_end_hold() {
        let mut debouncer = ScanDebouncer::new(COOLDOWN, 10);
        let t0 = Instant::now();
        debouncer.on_card(&card("04A1B2C3"), t0);
        debouncer.on_delivery(DeliveryOutcome::Unreachable, t0);

        debouncer.on_fault();
        assert_eq!(debouncer.on_card(&card("04A1B2C3"), t0 + ms(500)), Decision::Suppressed);
        assert!(is_accept(&debouncer.on_card(&card("04D5E6F7"), t0 + ms(1000))));
        assert!(!debouncer.reader_state().awaiting_removal());
    }

    #[test]
    fn test_alternating_cards_are_each_accepted() {
        let mut debouncer = ScanDebouncer::new(COOLDOWN, 10);
        let t0 = Instant::now();

        // Two cards on the reader at once, read in turn
        let accepted = (0..6)
            .map(|i| {
                let hex = if i % 2 == 0 { "04A1B2C3" } else { "04D5E6F7" };
                debouncer.on_card(&card(hex), t0 + ms(500 * i))
            })
            .filter(is_accept)
            .count();
        assert_eq!(accepted, 6);
    }

    #[test]
    fn test_unavailable_skips_threshold() {
        let mut debouncer = ScanDebouncer::new(COOLDOWN, 10);
        debouncer.on_fault();
        assert_eq!(debouncer.on_unavailable(), Decision::ReaderLost { consecutive: 2 });
        assert_eq!(debouncer.reader_state().consecutive_errors(), 0);
    }

    #[test]
    fn test_faults_never_enter_cooldown() {
        let mut debouncer = ScanDebouncer::new(COOLDOWN, 3);
        let t0 = Instant::now();

        assert_eq!(debouncer.on_fault(), Decision::Fault { consecutive: 1 });
        assert_eq!(debouncer.on_fault(), Decision::Fault { consecutive: 2 });
        assert_eq!(debouncer.state_at(t0), DebounceState::Idle);
        assert!(is_accept(&debouncer.on_card(&card("04A1B2C3"), t0)));
    }

    #[test]
    fn test_threshold_reports_reader_lost_once() {
        let mut debouncer = ScanDebouncer::new(COOLDOWN, 3);

        debouncer.on_fault();
        debouncer.on_fault();
        assert_eq!(debouncer.on_fault(), Decision::ReaderLost { consecutive: 3 });
        assert_eq!(debouncer.reader_state().consecutive_errors(), 0);
        assert_eq!(debouncer.on_fault(), Decision::Fault { consecutive: 1 });
    }

    #[test]
    fn test_successful_reads_reset_fault_counter() {
        let mut debouncer = ScanDebouncer::new(COOLDOWN, 3);

        debouncer.on_fault();
        debouncer.on_fault();
        debouncer.on_absent();
        assert_eq!(debouncer.on_fault(), Decision::Fault { consecutive: 1 });

        debouncer.on_fault();
        debouncer.on_card(&card("04A1B2C3"), Instant::now());
        assert_eq!(debouncer.on_fault(), Decision::Fault { consecutive: 1 });

        debouncer.reset_faults();
        assert_eq!(debouncer.reader_state().consecutive_errors(), 0);
    }

    #[test]
    fn test_zero_threshold_treated_as_one() {
        let mut debouncer = ScanDebouncer::new(COOLDOWN, 0);
        assert_eq!(debouncer.fault_threshold(), 1);
        assert_eq!(debouncer.on_fault(), Decision::ReaderLost { consecutive: 1 });
    }

    fn uid() -> impl Strategy<Value = CardIdentifier> {
        prop::collection::vec(any::<u8>(), 4..=10).prop_map(|bytes| CardIdentifier::new(bytes).unwrap())
    }

    proptest! {
        /// Property: the same card read any number of times within the
        /// cooldown yields exactly one event.
        #[test]
        fn prop_repeated_reads_within_cooldown_emit_once(
            id in uid(),
            cooldown_ms in 100u64..10_000,
            mut offsets in prop::collection::vec(0u64..10_000, 1..50),
        ) {
            let mut debouncer = ScanDebouncer::new(ms(cooldown_ms), 10);
            let t0 = Instant::now();
            offsets.iter_mut().for_each(|o| *o %= cooldown_ms);
            offsets.sort_unstable();

            let accepted_count = offsets
                .iter()
                .filter(|offset| is_accept(&debouncer.on_card(&id, t0 + ms(**offset))))
                .count();
            prop_assert_eq!(accepted_count, 1);
        }

        /// Property: the same card after the cooldown yields a second event.
        #[test]
        fn prop_reappearance_after_cooldown_emits_again(
            id in uid(),
            cooldown_ms in 1u64..10_000,
            extra_ms in 0u64..10_000,
        ) {
            let mut debouncer = ScanDebouncer::new(ms(cooldown_ms), 10);
            let t0 = Instant::now();

            prop_assert!(is_accept(&debouncer.on_card(&id, t0)));
            let later = t0 + ms(cooldown_ms + extra_ms);
            prop_assert!(is_accept(&debouncer.on_card(&id, later)));
        }

        /// Property: two distinct cards in immediate succession both yield
        /// an event.
        #[test]
        fn prop_distinct_cards_both_emit(a in uid(), b in uid(), gap_ms in 0u64..3000) {
            prop_assume!(a != b);
            let mut debouncer = ScanDebouncer::new(COOLDOWN, 10);
            let t0 = Instant::now();

            prop_assert!(is_accept(&debouncer.on_card(&a, t0)));
            prop_assert!(is_accept(&debouncer.on_card(&b, t0 + ms(gap_ms))));
        }

        /// Property: a card resting on the reader is emitted once per
        /// cooldown measured from the end of its delivery, however long the
        /// delivery took.
        #[test]
        fn prop_resting_card_waits_for_slow_delivery(
            id in uid(),
            delivery_ms in 0u64..10_000,
            poll_ms in 100u64..1000,
        ) {
            let mut debouncer = ScanDebouncer::new(COOLDOWN, 10);
            let t0 = Instant::now();

            prop_assert!(is_accept(&debouncer.on_card(&id, t0)));
            let done = t0 + ms(delivery_ms);
            debouncer.on_delivery(DeliveryOutcome::Delivered, done);

            let mut now = done + ms(poll_ms);
            while now < done + COOLDOWN {
                prop_assert_eq!(debouncer.on_card(&id, now), Decision::Suppressed);
                now += ms(poll_ms);
            }
            prop_assert!(is_accept(&debouncer.on_card(&id, now)));
        }

        /// Property: every `threshold` uninterrupted faults produce exactly
        /// one `ReaderLost`.
        #[test]
        fn prop_reader_lost_every_threshold_faults(threshold in 1u32..20, faults in 0u32..200) {
            let mut debouncer = ScanDebouncer::new(COOLDOWN, threshold);

            let lost = (0..faults)
                .filter(|_| matches!(debouncer.on_fault(), Decision::ReaderLost { .. }))
                .count() as u32;
            prop_assert_eq!(lost, faults / threshold);
        }
    }
}
