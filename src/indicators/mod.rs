// =============================================================================
// Indicator plugin framework
// =============================================================================
//
// Each indicator is a lazy stateful stream transformer: it owns a private
// accumulator (price ring, gain/loss averages, cumulative PV, ...) and maps
// trades for its configured symbol to at most one public `IndicatorState`
// snapshot per trade. During warm-up (fewer than `period` observations) it
// emits nothing; once ready it emits at least one state per matching trade.
//
// `signal` maps a state to Buy/Sell/Hold with a strength in [0, 1] and a
// human-readable reason; `check_trigger` evaluates a condition against the
// state's current observation.

pub mod bollinger;
pub mod ema;
pub mod rsi;
pub mod sma;
pub mod volatility;
pub mod vwap;

use std::collections::HashMap;

use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::signals::{Signal, TriggerCondition};
use crate::types::{Symbol, TradeRecord};

pub use bollinger::BollingerIndicator;
pub use ema::EmaIndicator;
pub use rsi::RsiIndicator;
pub use sma::SmaIndicator;
pub use volatility::{VolatilityIndicator, VolatilityMethod};
pub use vwap::VwapIndicator;

// =============================================================================
// IndicatorState
// =============================================================================

/// Public snapshot emitted downstream; the indicator's private accumulator
/// never escapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorState {
    pub id: String,
    pub name: String,
    pub symbol: Symbol,
    /// Source timestamp of the trade that produced this state, epoch ms.
    pub last_update: i64,
    /// The indicator's primary value (SMA level, RSI, VWAP, ...).
    pub value: f64,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl IndicatorState {
    /// Base state carrying the observed trade's price and volume, which the
    /// default trigger evaluation reads.
    pub fn new(
        id: &str,
        name: &str,
        symbol: Symbol,
        trade: &TradeRecord,
        value: f64,
    ) -> Self {
        let mut state = Self {
            id: id.to_string(),
            name: name.to_string(),
            symbol,
            last_update: trade.source_timestamp,
            value,
            metadata: HashMap::new(),
        };
        state.insert_num("price", trade.price);
        state.insert_num("volume", trade.volume);
        state
    }

    pub fn insert_num(&mut self, key: &str, value: f64) {
        self.metadata
            .insert(key.to_string(), serde_json::json!(value));
    }

    pub fn insert_flag(&mut self, key: &str, value: bool) {
        self.metadata
            .insert(key.to_string(), serde_json::json!(value));
    }

    pub fn get_num(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(serde_json::Value::as_f64)
    }

    /// Price of the trade that produced this state.
    pub fn observed_price(&self) -> f64 {
        self.get_num("price").unwrap_or_default()
    }

    /// Volume of the trade that produced this state.
    pub fn observed_volume(&self) -> f64 {
        self.get_num("volume").unwrap_or_default()
    }
}

// =============================================================================
// Indicator trait
// =============================================================================

pub trait Indicator: Send {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    /// The symbol this indicator is configured for; trades for other symbols
    /// are skipped.
    fn symbol(&self) -> &Symbol;

    /// Fold one trade into the private accumulator. Returns `None` for
    /// foreign symbols and during warm-up.
    fn update(&mut self, trade: &TradeRecord) -> Option<IndicatorState>;

    /// Map an emitted state to a directional signal.
    fn signal(&self, state: &IndicatorState) -> Signal;

    /// Evaluate a trigger condition against the state's observation.
    ///
    /// `CrossOver` needs two moving-average periods and is false unless the
    /// indicator overrides it.
    fn check_trigger(&self, state: &IndicatorState, condition: &TriggerCondition) -> bool {
        match condition {
            TriggerCondition::PriceAbove { threshold } => state.observed_price() > *threshold,
            TriggerCondition::PriceBelow { threshold } => state.observed_price() < *threshold,
            TriggerCondition::VolumeAbove { threshold } => state.observed_volume() > *threshold,
            TriggerCondition::VolatilityAbove { threshold } => state
                .get_num("volatility")
                .is_some_and(|v| v > *threshold),
            TriggerCondition::CrossOver { .. } => false,
        }
    }
}

// =============================================================================
// Stream drivers
// =============================================================================

/// Drive an indicator over a trade stream: the lazy stateful scan producing
/// one state per matching, warmed-up trade.
pub fn process(
    mut indicator: Box<dyn Indicator>,
    trades: impl Stream<Item = TradeRecord>,
) -> impl Stream<Item = IndicatorState> {
    trades.filter_map(move |trade| futures_util::future::ready(indicator.update(&trade)))
}

/// Consumer-task body: fold the trade stream through the indicator and send
/// the signal for every emitted state. Returns when the trade stream ends or
/// the signal channel is closed.
pub async fn run_indicator(
    mut indicator: Box<dyn Indicator>,
    trades: impl Stream<Item = TradeRecord>,
    signals: mpsc::Sender<(Symbol, Signal)>,
) {
    futures_util::pin_mut!(trades);
    while let Some(trade) = trades.next().await {
        if let Some(state) = indicator.update(&trade) {
            let signal = indicator.signal(&state);
            if signals.send((state.symbol, signal)).await.is_err() {
                break;
            }
        }
    }
    debug!(indicator = indicator.id(), "indicator stream ended");
}
