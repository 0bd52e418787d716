//! Fan-out of delivery results to display clients.
//!
//! Built on `tokio::sync::broadcast`: publishing never awaits, a slow client
//! only loses its own backlog, and a client sees only what was published
//! after it subscribed.

use kiosk_core::{DeliveryResult, ScanResultMessage};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Publisher side of the `scan_result` channel.
///
/// Clones share the same subscriber set.
///
/// # Examples
///
/// ```
/// use kiosk_core::{DeliveryResult, ScanEvent, ScanStatus};
/// use kiosk_network::EventBroadcaster;
///
/// # #[tokio::main]
/// # async fn main() {
/// let broadcaster = EventBroadcaster::new(16);
/// let mut subscription = broadcaster.subscribe();
///
/// let event = ScanEvent::new("04A1B2C3".parse().unwrap());
/// broadcaster.publish(&DeliveryResult::delivered(&event));
///
/// let message = subscription.recv().await.unwrap();
/// assert_eq!(message.status, ScanStatus::Success);
/// assert_eq!(message.card_id, "04A1B2C3");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<ScanResultMessage>,
}

impl EventBroadcaster {
    /// Create a broadcaster buffering up to `capacity` messages per
    /// subscriber (at least one).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a delivery result to every current subscriber.
    ///
    /// Returns the number of subscribers the message was queued for.
    pub fn publish(&self, result: &DeliveryResult) -> usize {
        let message = ScanResultMessage::from(result);
        match self.sender.send(message) {
            Ok(receivers) => {
                debug!(card_id = %result.identifier(), receivers, "Published scan result");
                receivers
            }
            Err(_) => {
                trace!(card_id = %result.identifier(), "No subscribers for scan result");
                0
            }
        }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiving side of one subscriber.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<ScanResultMessage>,
}

impl Subscription {
    /// Wait for the next message.
    ///
    /// Messages lost to lag are skipped. Returns `None` once the broadcaster
    /// and all its clones are gone.
    pub async fn recv(&mut self) -> Option<ScanResultMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagging, skipped scan results");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_core::{ScanEvent, ScanStatus};

    fn event(hex: &str) -> ScanEvent {
        ScanEvent::new(hex.parse().unwrap())
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let broadcaster = EventBroadcaster::new(4);
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert_eq!(broadcaster.publish(&DeliveryResult::delivered(&event("04A1B2C3"))), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let broadcaster = EventBroadcaster::new(4);
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        let result = DeliveryResult::rejected(&event("04A1B2C3"), "HTTP 500");
        assert_eq!(broadcaster.publish(&result), 2);

        for subscription in [&mut first, &mut second] {
            let message = subscription.recv().await.unwrap();
            assert_eq!(message.status, ScanStatus::Error);
            assert_eq!(message.card_id, "04A1B2C3");
            assert!(message.msg.unwrap().contains("HTTP 500"));
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_no_replay() {
        let broadcaster = EventBroadcaster::new(4);
        let mut early = broadcaster.subscribe();
        broadcaster.publish(&DeliveryResult::delivered(&event("04000001")));

        let mut late = broadcaster.subscribe();
        broadcaster.publish(&DeliveryResult::delivered(&event("04000002")));

        assert_eq!(early.recv().await.unwrap().card_id, "04000001");
        assert_eq!(early.recv().await.unwrap().card_id, "04000002");
        assert_eq!(late.recv().await.unwrap().card_id, "04000002");
    }

    #[tokio::test]
    async fn test_lagging_subscriber_keeps_receiving() {
        let broadcaster = EventBroadcaster::new(2);
        let mut slow = broadcaster.subscribe();

        for n in 1..=5u8 {
            let id = format!("040000{n:02X}");
            broadcaster.publish(&DeliveryResult::delivered(&event(&id)));
        }

        // Oldest messages were overwritten, the newest two remain
        assert_eq!(slow.recv().await.unwrap().card_id, "04000004");
        assert_eq!(slow.recv().await.unwrap().card_id, "04000005");
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_counted_out() {
        let broadcaster = EventBroadcaster::new(4);
        let subscription = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_when_broadcaster_dropped() {
        let broadcaster = EventBroadcaster::new(4);
        let mut subscription = broadcaster.subscribe();
        drop(broadcaster);
        assert!(subscription.recv().await.is_none());
    }
}
