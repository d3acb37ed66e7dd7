use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Domain events emitted by the services. Consumed by a background logger
/// task; the channel is fire-and-forget from the emitter's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated {
        order_id: Uuid,
        order_number: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Payment reconciliation events
    PaymentSucceeded {
        order_id: Uuid,
    },
    PaymentFailed {
        order_id: Uuid,
    },
    OrderRefunded {
        order_id: Uuid,
        full: bool,
    },

    // Cart mirror events
    CartSynced(Uuid),
    CartMerged(Uuid),
    CartCleared(Uuid),

    // Notification events
    ConfirmationEmailSent(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    /// Event delivery is never load-bearing for request handling.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(err) = self.send(event.clone()).await {
            warn!(?event, "Dropping event: {}", err);
        }
    }
}

/// Background task draining the event channel. Events currently only feed
/// structured logs; the channel boundary keeps emitters decoupled from
/// whatever consumes them next.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("Event processor started");
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                order_number,
            } => {
                info!(%order_id, %order_number, "Order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "Order status changed");
            }
            Event::PaymentSucceeded { order_id } => {
                info!(%order_id, "Payment succeeded");
            }
            Event::PaymentFailed { order_id } => {
                info!(%order_id, "Payment failed");
            }
            Event::OrderRefunded { order_id, full } => {
                info!(%order_id, full, "Order refunded");
            }
            _ => debug!(?event, "Event processed"),
        }
    }
    info!("Event processor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        let order_id = Uuid::new_v4();
        sender
            .send(Event::PaymentSucceeded { order_id })
            .await
            .expect("send should succeed");

        match rx.recv().await {
            Some(Event::PaymentSucceeded { order_id: got }) => assert_eq!(got, order_id),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        // Must not panic or error out
        sender.send_or_log(Event::CartCleared(Uuid::new_v4())).await;
    }
}
