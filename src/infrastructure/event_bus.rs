//! Per-topic bounded event bus. Generalizes the teacher's flat
//! `Vec<Arc<dyn EventListener>>` fan-out into topic-scoped
//! `tokio::sync::broadcast` channels (the teacher already reaches for
//! `broadcast` in `BinanceWebSocketManager`), so a slow subscriber to
//! `ticker.*` can never back up `pending_order` delivery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, broadcast};
use tracing::warn;

use crate::domain::events::TradingEvent;

const DEFAULT_BACKLOG: usize = 256;

pub struct EventBus {
    backlog: usize,
    topics: RwLock<HashMap<String, broadcast::Sender<TradingEvent>>>,
    dropped: AtomicU64,
}

impl EventBus {
    pub fn new(backlog: usize) -> Self {
        Self {
            backlog: if backlog == 0 { DEFAULT_BACKLOG } else { backlog },
            topics: RwLock::new(HashMap::new()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Subscribes to one topic string (see `TradingEvent::topic`). Creates
    /// the channel on first subscription; it is torn down only when the
    /// process exits, so a transiently-empty topic doesn't lose events
    /// published between subscribers.
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<TradingEvent> {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.backlog).0)
            .subscribe()
    }

    /// Publishes to the topic derived from the event itself. A topic with no
    /// subscribers is a silent no-op; a full channel drops the oldest event
    /// for the slowest subscriber and this is counted, never panicked on.
    pub async fn publish(&self, event: TradingEvent) {
        let topic = event.topic();
        let sender = {
            let topics = self.topics.read().await;
            topics.get(&topic).cloned()
        };

        let Some(sender) = sender else {
            return;
        };

        if let Err(broadcast::error::SendError(_)) = sender.send(event) {
            // No active receivers; nothing dropped, just unheard.
            return;
        }

        if sender.len() >= self.backlog {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(topic, "event bus topic near backlog capacity");
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BACKLOG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade::TradeStatus;

    #[tokio::test]
    async fn subscriber_receives_published_event_on_its_topic() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe("pending_order").await;

        bus.publish(TradingEvent::PendingOrder {
            trade_id: "t1".into(),
            order_id: "o1".into(),
            bot_id: "b1".into(),
        })
        .await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, TradingEvent::PendingOrder { .. }));
    }

    #[tokio::test]
    async fn publish_to_topic_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.publish(TradingEvent::SyncIssue {
            trade_id: "t1".into(),
            reason: "test".into(),
        })
        .await;
    }

    #[tokio::test]
    async fn different_topics_are_isolated() {
        let bus = EventBus::new(16);
        let mut ticker_rx = bus.subscribe("ticker.BTC-USD").await;

        bus.publish(TradingEvent::TradeStatus {
            trade_id: "t1".into(),
            order_id: None,
            bot_id: "b1".into(),
            status: TradeStatus::Completed,
        })
        .await;

        assert!(ticker_rx.try_recv().is_err());
    }
}
