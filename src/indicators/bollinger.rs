// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Centerline is the SMA of the last `period` prices; the bands sit k standard
// deviations either side. %B locates the price within the bands
// ((p - lower) / (upper - lower)) and bandwidth is the normalised band
// spread ((upper - lower) / sma * 100).
//
// Signal: Buy at or below the lower band, Sell at or above the upper band,
// with strength taken from |%B| (capped at 1).

use std::collections::VecDeque;

use crate::indicators::{Indicator, IndicatorState};
use crate::signals::Signal;
use crate::types::{Symbol, TradeRecord};

pub const DEFAULT_BAND_WIDTH: f64 = 2.0;

pub struct BollingerIndicator {
    id: String,
    name: String,
    symbol: Symbol,
    period: usize,
    k: f64,
    ring: VecDeque<f64>,
}

impl BollingerIndicator {
    /// `period` must be > 0; `k` is the band width in standard deviations.
    pub fn new(period: usize, symbol: Symbol) -> Self {
        Self::with_band_width(period, symbol, DEFAULT_BAND_WIDTH)
    }

    pub fn with_band_width(period: usize, symbol: Symbol, k: f64) -> Self {
        assert!(period > 0, "Bollinger period must be > 0");
        Self {
            id: format!("bollinger-{period}-{symbol}"),
            name: format!("Bollinger({period},{k})"),
            symbol,
            period,
            k,
            ring: VecDeque::with_capacity(period),
        }
    }
}

impl Indicator for BollingerIndicator {
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

        let sma = self.ring.iter().sum::<f64>() / self.period as f64;
        let variance = self
            .ring
            .iter()
            .map(|p| (p - sma).powi(2))
            .sum::<f64>()
            / self.period as f64;
        let sigma = variance.sqrt();

        let upper = sma + self.k * sigma;
        let lower = sma - self.k * sigma;
        // Degenerate flat window: collapse %B to the midpoint.
        let percent_b = if upper > lower {
            (trade.price - lower) / (upper - lower)
        } else {
            0.5
        };
        let bandwidth = if sma != 0.0 {
            (upper - lower) / sma * 100.0
        } else {
            0.0
        };

        let mut state = IndicatorState::new(
            &self.id,
            &self.name,
            self.symbol.clone(),
            trade,
            sma,
        );
        state.insert_num("upper", upper);
        state.insert_num("lower", lower);
        state.insert_num("percent_b", percent_b);
        state.insert_num("bandwidth", bandwidth);
        Some(state)
    }

    fn signal(&self, state: &IndicatorState) -> Signal {
        let price = state.observed_price();
        let upper = state.get_num("upper").unwrap_or_default();
        let lower = state.get_num("lower").unwrap_or_default();
        let percent_b = state.get_num("percent_b").unwrap_or(0.5);

        if upper <= lower {
            // Flat window — bands carry no information.
            return Signal::hold(state.last_update);
        }

        if price <= lower {
            Signal::buy(
                percent_b.abs().min(1.0),
                state.last_update,
                format!("price {price:.2} at/below lower band {lower:.2}"),
            )
        } else if price >= upper {
            Signal::sell(
                percent_b.min(1.0),
                state.last_update,
                format!("price {price:.2} at/above upper band {upper:.2}"),
            )
        } else {
            Signal::hold(state.last_update)
        }
    }
}
