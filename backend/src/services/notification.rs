//! Station notification fan-out
//!
//! ```text
//! OrderService (create / edit)
//!       │ OrderNotification
//!       ▼
//! NotificationHub
//!   └── topics: (branch, station) → broadcast::Sender
//!         │
//!         ▼
//!   station WS sessions (subscribe → forward)
//! ```
//!
//! Delivery is best-effort: publishing never fails the write that triggered it.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use shared::{station_notifications, NewOrderItem, OrderNotification, StationTopic};

/// Per-topic broadcast channels for the food and beverage stations
#[derive(Clone)]
pub struct NotificationHub {
    topics: Arc<DashMap<StationTopic, broadcast::Sender<OrderNotification>>>,
    capacity: usize,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to one station of one branch
    pub fn subscribe(&self, topic: StationTopic) -> broadcast::Receiver<OrderNotification> {
        self.sender(topic).subscribe()
    }

    /// Push a message to a topic. Returns the number of subscribers reached.
    pub fn publish(&self, topic: StationTopic, notification: OrderNotification) -> usize {
        let Some(tx) = self.topics.get(&topic).map(|tx| tx.clone()) else {
            tracing::debug!(topic = %topic, "No station listening");
            return 0;
        };
        match tx.send(notification) {
            Ok(reached) => reached,
            // No receivers left; drop the channel so the map does not grow
            Err(_) => {
                self.topics
                    .remove_if(&topic, |_, tx| tx.receiver_count() == 0);
                tracing::debug!(topic = %topic, "No station listening");
                0
            }
        }
    }

    /// Notify every station that receives at least one of `items`
    pub fn notify_stations(
        &self,
        branch_id: Uuid,
        order_number: &str,
        table_number: i32,
        items: &[NewOrderItem],
    ) {
        for (station, notification) in station_notifications(order_number, table_number, items) {
            let message = notification.message();
            let reached = self.publish(StationTopic::new(branch_id, station), notification);
            tracing::debug!(
                order_number = %order_number,
                station = station.as_str(),
                reached,
                "{}",
                message
            );
        }
    }

    /// Number of live subscribers on a topic
    pub fn subscriber_count(&self, topic: StationTopic) -> usize {
        self.topics
            .get(&topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    fn sender(&self, topic: StationTopic) -> broadcast::Sender<OrderNotification> {
        self.topics
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}
