// =============================================================================
// Market data providers
// =============================================================================
//
// The provider abstraction: authenticate against an external market-data
// venue, then subscribe to a set of symbols and receive an unbounded lazy
// stream of validated trades. The stream is finite only on terminal transport
// error or scope close, and is not restartable — reopening requires a fresh
// subscribe. Reconnection policy belongs to the caller; none is built in.

pub mod finnhub;
pub mod polygon;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use tokio_tungstenite::tungstenite;

use crate::error::ProviderError;
use crate::types::{Symbol, TradeRecord};

pub use finnhub::FinnhubProvider;
pub use polygon::PolygonProvider;

/// Unbounded lazy sequence of validated trades.
pub type TradeStream = Pin<Box<dyn Stream<Item = TradeRecord> + Send>>;

/// WebSocket transport shared by the provider implementations.
pub(crate) type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A source of real-time trades.
#[async_trait]
pub trait MarketDataProvider: Send {
    /// Establish and authenticate the connection.
    ///
    /// Fails with [`ProviderError::Unauthenticated`] (non-retryable) when the
    /// venue rejects the credentials, or [`ProviderError::ConnectFailed`]
    /// (retryable) on transport problems.
    async fn authenticate(&mut self) -> Result<(), ProviderError>;

    /// Subscribe to `symbols` and return the live trade stream.
    ///
    /// Transport errors surface as end-of-stream, never as stream items.
    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<TradeStream, ProviderError>;
}

/// Map a WebSocket connect failure onto the provider error taxonomy: an HTTP
/// 401/403 during the upgrade is an authentication rejection, anything else
/// is a (retryable) connect failure.
pub(crate) fn classify_connect_error(err: tungstenite::Error) -> ProviderError {
    match err {
        tungstenite::Error::Http(response)
            if response.status() == tungstenite::http::StatusCode::UNAUTHORIZED
                || response.status() == tungstenite::http::StatusCode::FORBIDDEN =>
        {
            ProviderError::Unauthenticated(format!("handshake rejected: {}", response.status()))
        }
        other => ProviderError::ConnectFailed(other.to_string()),
    }
}
