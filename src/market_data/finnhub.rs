// =============================================================================
// Finnhub WebSocket provider
// =============================================================================
//
// Wire protocol (wss://ws.finnhub.io?token=<TOKEN>):
//
//   client -> server, one per symbol:
//     {"type":"subscribe","symbol":"AAPL"}
//
//   server -> client:
//     {"type":"trade","data":[{"s":"AAPL","p":175.42,"v":100,"t":1699372845123,"c":["T","F"]}]}
//     {"type":"ping"}
//     {"type":"error","msg":"..."}
//
// `t` is epoch milliseconds. Pings are ignored, error frames are logged and
// the stream continues, malformed JSON is logged and dropped. Only a
// transport error or a Close frame ends the stream.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::error::ProviderError;
use crate::market_data::{classify_connect_error, MarketDataProvider, TradeStream, WsStream};
use crate::types::{Symbol, TradeRecord};

pub const DEFAULT_WS_URL: &str = "wss://ws.finnhub.io";

pub struct FinnhubProvider {
    ws_url: String,
    token: String,
    socket: Option<WsStream>,
}

impl FinnhubProvider {
    pub fn new(token: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            token: token.into(),
            socket: None,
        }
    }
}

#[async_trait]
impl MarketDataProvider for FinnhubProvider {
    async fn authenticate(&mut self) -> Result<(), ProviderError> {
        let url = format!("{}?token={}", self.ws_url, self.token);
        info!(url = %self.ws_url, "connecting to finnhub");

        let (socket, _response) = connect_async(&url).await.map_err(classify_connect_error)?;
        self.socket = Some(socket);
        info!("finnhub WebSocket connected");
        Ok(())
    }

    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<TradeStream, ProviderError> {
        let mut socket = self.socket.take().ok_or_else(|| {
            ProviderError::Subscribe("subscribe() requires a successful authenticate()".into())
        })?;

        for symbol in symbols {
            let frame =
                serde_json::json!({ "type": "subscribe", "symbol": symbol.as_str() }).to_string();
            socket
                .send(Message::Text(frame))
                .await
                .map_err(|e| ProviderError::Subscribe(e.to_string()))?;
        }
        info!(count = symbols.len(), "finnhub symbol subscriptions sent");

        Ok(decode_stream(socket))
    }
}

/// Turn the raw WebSocket frames into a stream of validated trades.
///
/// A transport error or Close frame terminates the stream (`scan` returning
/// `None`); every other frame maps to zero or more trades.
fn decode_stream(socket: WsStream) -> TradeStream {
    let trades = socket
        .scan((), |_, frame| {
            let step = match frame {
                Ok(Message::Text(text)) => Some(decode_text(&text)),
                Ok(Message::Close(_)) => {
                    info!("finnhub sent Close — ending trade stream");
                    None
                }
                Ok(_) => Some(Vec::new()), // ping/pong/binary frames carry no trades
                Err(e) => {
                    error!(error = %e, "finnhub transport error — ending trade stream");
                    None
                }
            };
            futures_util::future::ready(step)
        })
        .flat_map(futures_util::stream::iter);

    Box::pin(trades)
}

// =============================================================================
// Frame decoding
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum FinnhubFrame {
    Trade { data: Vec<FinnhubTrade> },
    Ping,
    Error { msg: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct FinnhubTrade {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: f64,
    #[serde(rename = "v")]
    volume: f64,
    /// Epoch milliseconds.
    #[serde(rename = "t")]
    timestamp: i64,
    #[serde(rename = "c", default)]
    conditions: Option<Vec<String>>,
}

/// Decode one text frame into validated trades. Never fails: malformed
/// payloads are logged and produce nothing.
fn decode_text(text: &str) -> Vec<TradeRecord> {
    match serde_json::from_str::<FinnhubFrame>(text) {
        Ok(FinnhubFrame::Trade { data }) => {
            let received = Utc::now().timestamp_millis();
            data.into_iter()
                .filter_map(|raw| convert(raw, received))
                .collect()
        }
        Ok(FinnhubFrame::Ping) => Vec::new(),
        Ok(FinnhubFrame::Error { msg }) => {
            warn!(msg = %msg, "finnhub error frame");
            Vec::new()
        }
        Ok(FinnhubFrame::Unknown) => {
            debug!(frame = %text, "ignoring unknown finnhub frame type");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, "failed to decode finnhub frame");
            Vec::new()
        }
    }
}

fn convert(raw: FinnhubTrade, received_ms: i64) -> Option<TradeRecord> {
    let symbol = match Symbol::new(&raw.symbol) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "dropping finnhub trade with invalid symbol");
            return None;
        }
    };

    // Exchange clocks can run slightly ahead of ours; clamp instead of
    // dropping the trade.
    let received = received_ms.max(raw.timestamp);

    match TradeRecord::new(symbol, raw.price, raw.volume, raw.timestamp, received, raw.conditions)
    {
        Ok(trade) => Some(trade),
        Err(e) => {
            warn!(error = %e, "dropping invalid finnhub trade");
            None
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_trade_frame() {
        let text = r#"{"type":"trade","data":[
            {"s":"AAPL","p":175.42,"v":100,"t":1699372845123,"c":["T","F"]},
            {"s":"MSFT","p":350.0,"v":50,"t":1699372845124}
        ]}"#;
        let trades = decode_text(text);
        assert_eq!(trades.len(), 2);

        assert_eq!(trades[0].symbol.as_str(), "AAPL");
        assert!((trades[0].price - 175.42).abs() < 1e-10);
        assert!((trades[0].volume - 100.0).abs() < 1e-10);
        assert_eq!(trades[0].source_timestamp, 1_699_372_845_123);
        assert!(trades[0].latency_ms >= 0);
        assert_eq!(
            trades[0].conditions.as_deref(),
            Some(&["T".to_string(), "F".to_string()][..])
        );

        assert_eq!(trades[1].symbol.as_str(), "MSFT");
        assert!(trades[1].conditions.is_none());
    }

    #[test]
    fn ping_frame_is_ignored() {
        assert!(decode_text(r#"{"type":"ping"}"#).is_empty());
    }

    #[test]
    fn error_frame_is_logged_not_fatal() {
        assert!(decode_text(r#"{"type":"error","msg":"too many symbols"}"#).is_empty());
    }

    #[test]
    fn unknown_frame_type_is_ignored() {
        assert!(decode_text(r#"{"type":"news","data":[]}"#).is_empty());
    }

    #[test]
    fn malformed_json_is_dropped() {
        assert!(decode_text("{not json").is_empty());
        assert!(decode_text(r#"{"type":"trade","data":"oops"}"#).is_empty());
    }

    #[test]
    fn invalid_trades_are_filtered_out_of_valid_frame() {
        // Negative price and empty symbol are dropped; the valid one survives.
        let text = r#"{"type":"trade","data":[
            {"s":"AAPL","p":-1.0,"v":100,"t":1699372845123},
            {"s":"","p":10.0,"v":1,"t":1699372845123},
            {"s":"GOOGL","p":2800.0,"v":10,"t":1699372845123}
        ]}"#;
        let trades = decode_text(text);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].symbol.as_str(), "GOOGL");
    }

    #[test]
    fn future_source_timestamp_clamps_latency_to_zero() {
        // Source timestamp far in the future relative to our clock.
        let future_ms = Utc::now().timestamp_millis() + 60_000;
        let text = format!(
            r#"{{"type":"trade","data":[{{"s":"AAPL","p":1.0,"v":1,"t":{future_ms}}}]}}"#
        );
        let trades = decode_text(&text);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].latency_ms, 0);
    }
}
