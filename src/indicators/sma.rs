// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// Ring of the last `period` prices; value is their arithmetic mean. Emits
// nothing until the ring is full. Signals fire when price strays more than
// 2% from the average.

use std::collections::VecDeque;

use crate::indicators::{Indicator, IndicatorState};
use crate::signals::Signal;
use crate::types::{Symbol, TradeRecord};

/// Directional confidence for the fixed-band SMA/EMA/VWAP signals.
pub(crate) const BAND_SIGNAL_STRENGTH: f64 = 0.6;

pub struct SmaIndicator {
    id: String,
    name: String,
    symbol: Symbol,
    period: usize,
    ring: VecDeque<f64>,
}

impl SmaIndicator {
    /// `period` must be > 0.
    pub fn new(period: usize, symbol: Symbol) -> Self {
        assert!(period > 0, "SMA period must be > 0");
        Self {
            id: format!("sma-{period}-{symbol}"),
            name: format!("SMA({period})"),
            symbol,
            period,
            ring: VecDeque::with_capacity(period),
        }
    }
}

impl Indicator for SmaIndicator {
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
            return None; // warm-up
        }

        let sma = self.ring.iter().sum::<f64>() / self.period as f64;
        Some(IndicatorState::new(
            &self.id,
            &self.name,
            self.symbol.clone(),
            trade,
            sma,
        ))
    }

    fn signal(&self, state: &IndicatorState) -> Signal {
        let price = state.observed_price();
        let sma = state.value;

        if price > sma * 1.02 {
            Signal::buy(
                BAND_SIGNAL_STRENGTH,
                state.last_update,
                format!("price {price:.2} above {} {sma:.2} by >2%", self.name),
            )
        } else if price < sma * 0.98 {
            Signal::sell(
                BAND_SIGNAL_STRENGTH,
                state.last_update,
                format!("price {price:.2} below {} {sma:.2} by >2%", self.name),
            )
        } else {
            Signal::hold(state.last_update)
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::tests::feed;

    fn sym() -> Symbol {
        Symbol::new("AAPL").unwrap()
    }

    #[test]
    fn warms_up_then_emits_mean() {
        let mut sma = SmaIndicator::new(3, sym());
        let states = feed(&mut sma, "AAPL", &[100.0, 110.0, 120.0, 130.0]);
        assert_eq!(states.len(), 2);
        assert!((states[0].value - 110.0).abs() < 1e-10);
        assert!((states[1].value - 120.0).abs() < 1e-10);
    }

    #[test]
    fn ignores_foreign_symbols() {
        let mut sma = SmaIndicator::new(1, sym());
        assert!(feed(&mut sma, "MSFT", &[100.0, 110.0]).is_empty());
    }

    #[test]
    fn signal_bands_at_two_percent() {
        let mut sma = SmaIndicator::new(1, sym());
        // period 1: SMA == last price, so craft states directly off updates.
        let state = feed(&mut sma, "AAPL", &[100.0]).pop().unwrap();

        // Same price — inside the band.
        assert!(sma.signal(&state).is_hold());

        // Fake a price 3% above the average.
        let mut above = state.clone();
        above.insert_num("price", 103.0);
        let signal = sma.signal(&above);
        assert!(signal.is_buy());
        assert_eq!(signal.strength(), BAND_SIGNAL_STRENGTH);

        let mut below = state;
        below.insert_num("price", 97.0);
        assert!(sma.signal(&below).is_sell());
    }

    #[test]
    fn id_and_name_encode_configuration() {
        let sma = SmaIndicator::new(20, sym());
        assert_eq!(sma.id(), "sma-20-AAPL");
        assert_eq!(sma.name(), "SMA(20)");
    }
}
