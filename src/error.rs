// =============================================================================
// Error taxonomy for the tickfan pipeline
// =============================================================================
//
// Typed errors live at the library seams; the application layer (main, task
// bodies) wraps them in `anyhow` with context. Recovery policy:
//   - Validation / parse errors are recovered locally (record dropped, frame
//     logged) and never terminate a stream.
//   - Provider connection errors terminate the trade stream; end-of-stream
//     cascades through the broker to every subscriber as a normal terminal
//     condition, not an error.

use thiserror::Error;

/// A field of a domain value failed its construction-time constraint.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("symbol must be non-empty")]
    EmptySymbol,

    #[error("price must be a finite number >= 0, got {0}")]
    Price(f64),

    #[error("volume must be a finite number >= 0, got {0}")]
    Volume(f64),

    #[error("timestamp must be a positive epoch-millisecond value, got {0}")]
    Timestamp(i64),

    #[error("received timestamp {received} precedes source timestamp {source_ts}")]
    NegativeLatency { source_ts: i64, received: i64 },
}

/// Errors surfaced by a market-data provider.
///
/// `Unauthenticated` is non-retryable (bad credentials stay bad);
/// `ConnectFailed` is retryable at the caller's discretion. Mid-stream
/// transport failures do not use this type — they end the trade stream.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider rejected credentials: {0}")]
    Unauthenticated(String),

    #[error("failed to connect to provider: {0}")]
    ConnectFailed(String),

    #[error("subscription request failed: {0}")]
    Subscribe(String),
}

/// Publishing attempted against a broker that has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("trade broker is closed")]
pub struct BrokerClosed;

/// A window configuration violated its invariants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidWindowConfig {
    #[error("event window size must be > 0")]
    ZeroSize,

    #[error("time window duration must be > 0 ms, got {0}")]
    NonPositiveDuration(i64),
}

/// A derived metric was requested through a `try_` accessor with too few
/// retained points. The plain accessors return a neutral 0 instead.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("insufficient data: have {have} points, need {need}")]
pub struct InsufficientData {
    pub have: usize,
    pub need: usize,
}
