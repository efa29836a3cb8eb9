//! Streaming ticker feed. Generalizes the teacher's
//! `BinanceWebSocketManager` (subscribe-by-symbol, broadcast fan-out,
//! exponential reconnect backoff) into this spec's `StartStreaming`
//! operation: every tick is written into a shared ticker cache AND
//! published on the event bus so bot evaluation can react to market data
//! arrival instead of waiting on the periodic safety net.
//!
//! Backoff is refined over the teacher's plain 60s-capped doubling: after
//! 60s of sustained connection the backoff resets to the 1s floor, so a
//! transient blip doesn't leave the client waiting tens of seconds to
//! reconnect after the network already recovered.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::domain::events::TradingEvent;
use crate::domain::market::Ticker;
use crate::infrastructure::event_bus::EventBus;

const INITIAL_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 30;
const SUSTAINED_CONNECTION_RESET: Duration = Duration::from_secs(60);

pub fn denormalize_pair(pair: &str) -> String {
    pair.replace('-', "").to_uppercase()
}

pub fn normalize_pair(exchange_symbol: &str) -> Option<String> {
    for quote in ["USDT", "USD"] {
        if let Some(base) = exchange_symbol.strip_suffix(quote) {
            if !base.is_empty() {
                return Some(format!("{base}-{quote}"));
            }
        }
    }
    None
}

pub struct StreamingManager {
    ws_url: String,
    tickers: Arc<RwLock<HashMap<String, Ticker>>>,
    subscribed: Arc<RwLock<Vec<String>>>,
    task_handle: Arc<tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl StreamingManager {
    pub fn new(ws_url: String) -> Self {
        Self {
            ws_url,
            tickers: Arc::new(RwLock::new(HashMap::new())),
            subscribed: Arc::new(RwLock::new(Vec::new())),
            task_handle: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub fn tickers(&self) -> Arc<RwLock<HashMap<String, Ticker>>> {
        self.tickers.clone()
    }

    pub async fn update_subscription(&self, pairs: Vec<String>, event_bus: Arc<EventBus>) {
        *self.subscribed.write().await = pairs.clone();

        let mut handle_guard = self.task_handle.lock().await;
        if let Some(handle) = handle_guard.take() {
            handle.abort();
        }

        if pairs.is_empty() {
            return;
        }

        let ws_url = self.ws_url.clone();
        let tickers = self.tickers.clone();
        let handle = tokio::spawn(async move {
            Self::run(ws_url, pairs, tickers, event_bus).await;
        });
        *handle_guard = Some(handle);
    }

    pub async fn stop(&self) {
        let mut handle_guard = self.task_handle.lock().await;
        if let Some(handle) = handle_guard.take() {
            handle.abort();
        }
    }

    async fn run(
        ws_url: String,
        pairs: Vec<String>,
        tickers: Arc<RwLock<HashMap<String, Ticker>>>,
        event_bus: Arc<EventBus>,
    ) {
        let mut backoff = INITIAL_BACKOFF_SECS;
        loop {
            let connected_at = tokio::time::Instant::now();
            match Self::connect_and_stream(&ws_url, &pairs, &tickers, &event_bus).await {
                Ok(()) => info!("exchange websocket closed gracefully"),
                Err(e) => error!(error = %e, "exchange websocket error"),
            }

            if connected_at.elapsed() >= SUSTAINED_CONNECTION_RESET {
                backoff = INITIAL_BACKOFF_SECS;
            }
            warn!(backoff_secs = backoff, "reconnecting to exchange websocket");
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
        }
    }

    async fn connect_and_stream(
        ws_url: &str,
        pairs: &[String],
        tickers: &Arc<RwLock<HashMap<String, Ticker>>>,
        event_bus: &Arc<EventBus>,
    ) -> anyhow::Result<()> {
        let streams: Vec<String> = pairs
            .iter()
            .map(|p| format!("{}@trade", denormalize_pair(p).to_lowercase()))
            .collect();

        let url = format!("{}/stream?streams={}", ws_url.trim_end_matches('/'), streams.join("/"));
        info!(url, "connecting to exchange websocket");

        let (ws_stream, _) = connect_async(&url).await?;
        let (mut write, mut read) = ws_stream.split();

        let (tx, mut rx) = tokio::sync::mpsc::channel::<Message>(100);
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let mut ping_interval = tokio::time::interval(Duration::from_secs(180));
        let tx_ping = tx.clone();
        tokio::spawn(async move {
            loop {
                ping_interval.tick().await;
                if tx_ping.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        });

        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    if let Err(e) = Self::handle_message(&text, tickers, event_bus).await {
                        debug!(error = %e, "ignoring unparseable websocket message");
                    }
                }
                Ok(Message::Ping(_)) => {
                    let _ = tx.send(Message::Pong(Vec::new().into())).await;
                }
                Ok(Message::Close(_)) => break,
                Err(e) => return Err(e.into()),
                _ => {}
            }
        }
        Ok(())
    }

    async fn handle_message(
        text: &str,
        tickers: &Arc<RwLock<HashMap<String, Ticker>>>,
        event_bus: &Arc<EventBus>,
    ) -> anyhow::Result<()> {
        #[derive(Deserialize)]
        struct StreamMessage {
            stream: String,
            data: serde_json::Value,
        }
        #[derive(Deserialize)]
        struct TradeData {
            #[serde(rename = "s")]
            symbol: String,
            #[serde(rename = "p")]
            price: String,
        }

        let msg: StreamMessage = serde_json::from_str(text)?;
        if !msg.stream.ends_with("@trade") {
            return Ok(());
        }
        let trade: TradeData = serde_json::from_value(msg.data)?;
        let Some(pair) = normalize_pair(&trade.symbol) else {
            return Ok(());
        };
        let price = trade.price.parse::<f64>().ok().and_then(Decimal::from_f64_retain).unwrap_or(Decimal::ZERO);
        let timestamp = Utc::now();

        tickers.write().await.insert(pair.clone(), Ticker { price, timestamp });
        event_bus.publish(TradingEvent::Ticker { pair, price, timestamp }).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_round_trips_through_denormalize_normalize() {
        assert_eq!(denormalize_pair("BTC-USD"), "BTCUSD");
        assert_eq!(normalize_pair("BTCUSDT"), Some("BTC-USDT".to_string()));
        assert_eq!(normalize_pair("ETHUSD"), Some("ETH-USD".to_string()));
    }
}
