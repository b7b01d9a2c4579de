//! Live trade stream over WebSocket, with reconnect backoff and a
//! stability window that forgives long-lived connections their past
//! failures.

use futures_util::{SinkExt, StreamExt};
use polymarket_core::config::MonitorConfig;
use polymarket_core::types::TradeEvent;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Connection lifecycle. Transitions are logged; the stream task owns the
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Backoff,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    /// Market slugs to subscribe to; empty subscribes to all activity.
    pub markets: Vec<String>,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_multiplier: f64,
    pub stability_window: Duration,
}

impl StreamConfig {
    pub fn from_monitor(url: String, markets: Vec<String>, config: &MonitorConfig) -> Self {
        Self {
            url,
            markets,
            backoff_base_ms: config.backoff_base_ms,
            backoff_max_ms: config.backoff_max_ms,
            backoff_multiplier: config.backoff_multiplier,
            stability_window: Duration::from_secs(config.stability_window_secs),
        }
    }
}

/// Reconnect delay for the given consecutive-failure count.
pub fn backoff_delay(config: &StreamConfig, attempt: u32) -> Duration {
    let exp = config
        .backoff_multiplier
        .powi(attempt.saturating_sub(1) as i32);
    let ms = (config.backoff_base_ms as f64 * exp) as u64;
    Duration::from_millis(ms.min(config.backoff_max_ms))
}

/// Handle to a running stream task.
pub struct LiveTradeStream {
    shutdown_tx: watch::Sender<bool>,
}

impl LiveTradeStream {
    /// Spawn the stream task. Events arrive on the returned channel in
    /// arrival order; the channel closing means the task exited.
    pub fn spawn(config: StreamConfig) -> (Self, mpsc::Receiver<TradeEvent>) {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            stream_loop(config, event_tx, shutdown_rx).await;
        });

        (Self { shutdown_tx }, event_rx)
    }

    /// Ask the stream task to release its connection and exit.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn stream_loop(
    config: StreamConfig,
    event_tx: mpsc::Sender<TradeEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    let mut state;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        state = ConnectionState::Connecting;
        debug!(url = %config.url, ?state, "connecting to trade stream");

        let connected = tokio::select! {
            result = connect_async(&config.url) => result,
            _ = shutdown_rx.changed() => break,
        };

        match connected {
            Ok((ws, _)) => {
                state = ConnectionState::Connected;
                info!(?state, "trade stream connected");
                let connected_at = Instant::now();

                let reset =
                    run_connection(ws, &config, &event_tx, &mut shutdown_rx, connected_at).await;
                if *shutdown_rx.borrow() {
                    break;
                }
                if reset {
                    attempt = 0;
                }
                state = ConnectionState::Reconnecting;
                info!(?state, attempt, "trade stream lost");
            }
            Err(err) => {
                warn!(error = %err, "trade stream connect failed");
            }
        }

        attempt += 1;
        state = ConnectionState::Backoff;
        let delay = backoff_delay(&config, attempt);
        debug!(?state, attempt, ?delay, "waiting before reconnect");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => break,
        }
    }

    info!("trade stream shut down");
}

/// Drive one connection until it drops. Returns whether it stayed up long
/// enough to reset the reconnect counter.
async fn run_connection(
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    config: &StreamConfig,
    event_tx: &mpsc::Sender<TradeEvent>,
    shutdown_rx: &mut watch::Receiver<bool>,
    connected_at: Instant,
) -> bool {
    let (mut write, mut read) = ws.split();

    let mut subscription = json!({
        "action": "subscribe",
        "subscriptions": [{ "topic": "activity", "type": "trades" }]
    });
    if !config.markets.is_empty() {
        subscription["subscriptions"][0]["filters"] = json!({ "event_slug": config.markets });
    }
    if let Err(err) = write.send(Message::Text(subscription.to_string().into())).await {
        warn!(error = %err, "subscribe failed");
        return false;
    }
    info!(markets = config.markets.len(), "subscribed to trade activity");

    loop {
        let message = tokio::select! {
            message = read.next() => message,
            _ = shutdown_rx.changed() => return false,
        };

        match message {
            Some(Ok(Message::Text(text))) => {
                for event in parse_events(&text) {
                    if event_tx.send(event).await.is_err() {
                        debug!("event receiver dropped; closing stream");
                        return false;
                    }
                }
            }
            Some(Ok(Message::Ping(data))) => {
                if write.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => {
                debug!("stream closed by server");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                warn!(error = %err, "stream read error");
                break;
            }
        }
    }

    connected_at.elapsed() >= config.stability_window
}

/// The stream delivers single events and batched arrays; non-trade frames
/// parse to nothing.
fn parse_events(text: &str) -> Vec<TradeEvent> {
    if let Ok(event) = serde_json::from_str::<TradeEvent>(text) {
        return vec![event];
    }
    if let Ok(events) = serde_json::from_str::<Vec<TradeEvent>>(text) {
        return events;
    }
    debug!("ignoring non-trade stream frame");
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StreamConfig {
        StreamConfig {
            url: "wss://example.invalid".into(),
            markets: Vec::new(),
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
            backoff_multiplier: 2.0,
            stability_window: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = config();
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(4_000));
        assert_eq!(backoff_delay(&config, 20), Duration::from_millis(60_000));
    }

    #[test]
    fn test_parse_events_accepts_single_and_batch() {
        let single = r#"{
            "asset": "1", "conditionId": "c", "outcomeIndex": 0, "price": 0.5,
            "proxyWallet": "0xw", "side": "BUY", "size": 10,
            "timestamp": 1700000000, "transactionHash": "0xtx"
        }"#;
        assert_eq!(parse_events(single).len(), 1);

        let batch = format!("[{single}, {single}]");
        assert_eq!(parse_events(&batch).len(), 2);

        assert!(parse_events(r#"{"type": "heartbeat"}"#).is_empty());
    }
}
