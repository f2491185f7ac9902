// =============================================================================
// Volatility
// =============================================================================
//
// Annualised volatility over the simple-return series of the last `period`
// prices: stddev(returns) * sqrt(252) * 100. The ATR and Parkinson methods
// need OHLC bars; from a pure trade stream they reduce to the same stddev
// estimator.
//
// Signal: Sell when volatility exceeds the threshold while rising; Buy when
// it sits below half the threshold while falling; Hold otherwise.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::indicators::sma::BAND_SIGNAL_STRENGTH;
use crate::indicators::{Indicator, IndicatorState};
use crate::signals::Signal;
use crate::types::{Symbol, TradeRecord};

/// Sessions per trading year, the annualisation base.
const TRADING_DAYS: f64 = 252.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityMethod {
    StdDev,
    Atr,
    Parkinson,
}

pub struct VolatilityIndicator {
    id: String,
    name: String,
    symbol: Symbol,
    period: usize,
    method: VolatilityMethod,
    high_threshold: f64,
    ring: VecDeque<f64>,
    prev_volatility: Option<f64>,
}

impl VolatilityIndicator {
    /// `period` must be > 1 (at least one return). Every `method` computes
    /// the stddev estimator here; the configured method is echoed in the
    /// emitted metadata.
    pub fn new(
        period: usize,
        symbol: Symbol,
        method: VolatilityMethod,
        high_threshold: f64,
    ) -> Self {
        assert!(period > 1, "volatility period must be > 1");
        Self {
            id: format!("volatility-{period}-{symbol}"),
            name: format!("Volatility({period})"),
            symbol,
            period,
            method,
            high_threshold,
            ring: VecDeque::with_capacity(period),
            prev_volatility: None,
        }
    }

    fn annualised_volatility(&self) -> f64 {
        let returns: Vec<f64> = self
            .ring
            .iter()
            .zip(self.ring.iter().skip(1))
            .filter(|(prev, _)| **prev != 0.0)
            .map(|(prev, next)| next / prev - 1.0)
            .collect();
        if returns.is_empty() {
            return 0.0;
        }

        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance =
            returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
        variance.sqrt() * TRADING_DAYS.sqrt() * 100.0
    }
}

impl Indicator for VolatilityIndicator {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    fn update(&mut self, trade: &TradeRecord) -> Option<IndicatorState> {
        if trade.symbol != self.symbol {
            return None;
        }

        self.ring.push_back(trade.price);
        while self.ring.len() > self.period {
            self.ring.pop_front();
        }
        if self.ring.len() < self.period {
            return None;
        }

        let volatility = self.annualised_volatility();
        let rising = self
            .prev_volatility
            .is_some_and(|prev| volatility > prev);
        let falling = self
            .prev_volatility
            .is_some_and(|prev| volatility < prev);
        self.prev_volatility = Some(volatility);

        let mut state = IndicatorState::new(
            &self.id,
            &self.name,
            self.symbol.clone(),
            trade,
            volatility,
        );
        state.insert_num("volatility", volatility);
        state.insert_flag("rising", rising);
        state.insert_flag("falling", falling);
        state
            .metadata
            .insert("method".to_string(), serde_json::json!(self.method));
        Some(state)
    }

    fn signal(&self, state: &IndicatorState) -> Signal {
        let volatility = state.value;
        let rising = state
            .metadata
            .get("rising")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        let falling = state
            .metadata
            .get("falling")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        if volatility > self.high_threshold && rising {
            Signal::sell(
                BAND_SIGNAL_STRENGTH,
                state.last_update,
                format!(
                    "volatility {volatility:.1}% above {:.1}% and rising",
                    self.high_threshold
                ),
            )
        } else if volatility < self.high_threshold / 2.0 && falling {
            Signal::buy(
                BAND_SIGNAL_STRENGTH,
                state.last_update,
                format!(
                    "volatility {volatility:.1}% below {:.1}% and falling",
                    self.high_threshold / 2.0
                ),
            )
        } else {
            Signal::hold(state.last_update)
        }
    }
}
