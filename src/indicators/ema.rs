// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// alpha = 2 / (period + 1); ema' = price * alpha + ema * (1 - alpha).
// The first value is seeded with the SMA of the first `period` prices, and
// nothing is emitted before that seed exists. Signal bands match the SMA's.

use crate::indicators::sma::BAND_SIGNAL_STRENGTH;
use crate::indicators::{Indicator, IndicatorState};
use crate::signals::Signal;
use crate::types::{Symbol, TradeRecord};

pub struct EmaIndicator {
    id: String,
    name: String,
    symbol: Symbol,
    period: usize,
    alpha: f64,
    /// Prices collected during warm-up, drained into the SMA seed.
    seed: Vec<f64>,
    ema: Option<f64>,
}

impl EmaIndicator {
    /// `period` must be > 0.
    pub fn new(period: usize, symbol: Symbol) -> Self {
        assert!(period > 0, "EMA period must be > 0");
        Self {
            id: format!("ema-{period}-{symbol}"),
            name: format!("EMA({period})"),
            symbol,
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            seed: Vec::with_capacity(period),
            ema: None,
        }
    }
}

impl Indicator for EmaIndicator {
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

        let ema = match self.ema {
            Some(prev) => {
                let next = trade.price * self.alpha + prev * (1.0 - self.alpha);
                self.ema = Some(next);
                next
            }
            None => {
                self.seed.push(trade.price);
                if self.seed.len() < self.period {
                    return None; // warm-up
                }
                let sma = self.seed.iter().sum::<f64>() / self.period as f64;
                self.seed.clear();
                self.ema = Some(sma);
                sma
            }
        };

        Some(IndicatorState::new(
            &self.id,
            &self.name,
            self.symbol.clone(),
            trade,
            ema,
        ))
    }

    fn signal(&self, state: &IndicatorState) -> Signal {
        let price = state.observed_price();
        let ema = state.value;

        if price > ema * 1.02 {
            Signal::buy(
                BAND_SIGNAL_STRENGTH,
                state.last_update,
                format!("price {price:.2} above {} {ema:.2} by >2%", self.name),
            )
        } else if price < ema * 0.98 {
            Signal::sell(
                BAND_SIGNAL_STRENGTH,
                state.last_update,
                format!("price {price:.2} below {} {ema:.2} by >2%", self.name),
            )
        } else {
            Signal::hold(state.last_update)
        }
    }
}
