// =============================================================================
// Polygon WebSocket provider
// =============================================================================
//
// Equivalent contract to the Finnhub provider with Polygon's handshake:
//
//   client -> server after connect:
//     {"action":"auth","params":"<API_KEY>"}
//     {"action":"subscribe","params":"T.AAPL,T.MSFT"}
//
//   server -> client, events batched in JSON arrays:
//     [{"ev":"status","status":"auth_success","message":"authenticated"}]
//     [{"ev":"T","sym":"AAPL","p":175.42,"s":100,"t":1699372845123000000}]
//
// Trade timestamps arrive in nanoseconds and are converted to milliseconds.
// Status events are informational, except the auth outcome which resolves
// `authenticate()`.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::error::ProviderError;
use crate::market_data::{classify_connect_error, MarketDataProvider, TradeStream, WsStream};
use crate::types::{Symbol, TradeRecord};

pub const DEFAULT_WS_URL: &str = "wss://socket.polygon.io/stocks";

const NANOS_PER_MILLI: i64 = 1_000_000;

pub struct PolygonProvider {
    ws_url: String,
    api_key: String,
    socket: Option<WsStream>,
}

impl PolygonProvider {
    pub fn new(api_key: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_key: api_key.into(),
            socket: None,
        }
    }

    /// Read status frames until the venue acknowledges or rejects the auth
    /// request.
    async fn await_auth_outcome(socket: &mut WsStream) -> Result<(), ProviderError> {
        while let Some(frame) = socket.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => {
                    return Err(ProviderError::ConnectFailed(
                        "connection closed during authentication".into(),
                    ))
                }
                Ok(_) => continue,
                Err(e) => return Err(ProviderError::ConnectFailed(e.to_string())),
            };

            for event in decode_events(&text) {
                if let PolygonEvent::Status { status, message } = event {
                    debug!(status = %status, message = %message, "polygon status");
                    match status.as_str() {
                        "auth_success" => return Ok(()),
                        "auth_failed" => return Err(ProviderError::Unauthenticated(message)),
                        _ => {} // "connected" and friends — keep waiting
                    }
                }
            }
        }
        Err(ProviderError::ConnectFailed(
            "stream ended before authentication completed".into(),
        ))
    }
}

#[async_trait]
impl MarketDataProvider for PolygonProvider {
    async fn authenticate(&mut self) -> Result<(), ProviderError> {
        info!(url = %self.ws_url, "connecting to polygon");
        let (mut socket, _response) =
            connect_async(&self.ws_url).await.map_err(classify_connect_error)?;

        let auth = serde_json::json!({ "action": "auth", "params": self.api_key }).to_string();
        socket
            .send(Message::Text(auth))
            .await
            .map_err(|e| ProviderError::ConnectFailed(e.to_string()))?;

        Self::await_auth_outcome(&mut socket).await?;
        info!("polygon authenticated");
        self.socket = Some(socket);
        Ok(())
    }

    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<TradeStream, ProviderError> {
        let mut socket = self.socket.take().ok_or_else(|| {
            ProviderError::Subscribe("subscribe() requires a successful authenticate()".into())
        })?;

        let params = symbols
            .iter()
            .map(|s| format!("T.{s}"))
            .collect::<Vec<_>>()
            .join(",");
        let frame = serde_json::json!({ "action": "subscribe", "params": params }).to_string();
        socket
            .send(Message::Text(frame))
            .await
            .map_err(|e| ProviderError::Subscribe(e.to_string()))?;
        info!(params = %params, "polygon subscription sent");

        Ok(decode_stream(socket))
    }
}

fn decode_stream(socket: WsStream) -> TradeStream {
    let trades = socket
        .scan((), |_, frame| {
            let step = match frame {
                Ok(Message::Text(text)) => Some(decode_text(&text)),
                Ok(Message::Close(_)) => {
                    info!("polygon sent Close — ending trade stream");
                    None
                }
                Ok(_) => Some(Vec::new()),
                Err(e) => {
                    error!(error = %e, "polygon transport error — ending trade stream");
                    None
                }
            };
            futures_util::future::ready(step)
        })
        .flat_map(futures_util::stream::iter);

    Box::pin(trades)
}

// =============================================================================
// Event decoding
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "ev")]
enum PolygonEvent {
    #[serde(rename = "T")]
    Trade {
        sym: String,
        /// Price.
        p: f64,
        /// Size.
        s: f64,
        /// SIP timestamp, nanoseconds since epoch.
        t: i64,
        /// Condition codes.
        #[serde(default)]
        c: Option<Vec<i64>>,
    },
    #[serde(rename = "status")]
    Status {
        status: String,
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

/// Parse one frame into its events; malformed JSON yields nothing.
fn decode_events(text: &str) -> Vec<PolygonEvent> {
    match serde_json::from_str::<Vec<PolygonEvent>>(text) {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "failed to decode polygon frame");
            Vec::new()
        }
    }
}

/// Decode one text frame into validated trades.
fn decode_text(text: &str) -> Vec<TradeRecord> {
    let received = Utc::now().timestamp_millis();
    decode_events(text)
        .into_iter()
        .filter_map(|event| match event {
            PolygonEvent::Trade { sym, p, s, t, c } => convert(sym, p, s, t, c, received),
            PolygonEvent::Status { status, message } => {
                debug!(status = %status, message = %message, "polygon status event");
                None
            }
            PolygonEvent::Unknown => None,
        })
        .collect()
}

fn convert(
    sym: String,
    price: f64,
    size: f64,
    timestamp_ns: i64,
    conditions: Option<Vec<i64>>,
    received_ms: i64,
) -> Option<TradeRecord> {
    let symbol = match Symbol::new(&sym) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "dropping polygon trade with invalid symbol");
            return None;
        }
    };

    let source_ms = timestamp_ns / NANOS_PER_MILLI;
    let received = received_ms.max(source_ms);
    let conditions = conditions.map(|codes| codes.iter().map(ToString::to_string).collect());

    match TradeRecord::new(symbol, price, size, source_ms, received, conditions) {
        Ok(trade) => Some(trade),
        Err(e) => {
            warn!(error = %e, "dropping invalid polygon trade");
            None
        }
    }
}
