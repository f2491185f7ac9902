// =============================================================================
// Relative Strength Index (RSI) — Wilder's smoothing
// =============================================================================
//
// The first `period` deltas seed the average gain / average loss with simple
// means; afterwards Wilder's smoothing applies:
//   avg_gain' = (avg_gain * (period - 1) + gain) / period   (likewise loss)
//   RSI       = 100 - 100 / (1 + avg_gain / avg_loss)
// When the average loss is zero the RSI saturates at 100.
//
// Signal strengths scale with how deep the RSI sits in the oversold /
// overbought zone.

use crate::indicators::{Indicator, IndicatorState};
use crate::signals::Signal;
use crate::types::{Symbol, TradeRecord};

pub const DEFAULT_OVERSOLD: f64 = 30.0;
pub const DEFAULT_OVERBOUGHT: f64 = 70.0;

pub struct RsiIndicator {
    id: String,
    name: String,
    symbol: Symbol,
    period: usize,
    oversold: f64,
    overbought: f64,
    prev_price: Option<f64>,
    /// Deltas folded so far (saturates at `period` once Wilder mode starts).
    deltas_seen: usize,
    sum_gain: f64,
    sum_loss: f64,
    avg_gain: f64,
    avg_loss: f64,
}

impl RsiIndicator {
    /// `period` must be > 0. Thresholds follow the conventional 30/70.
    pub fn new(period: usize, symbol: Symbol) -> Self {
        Self::with_thresholds(period, symbol, DEFAULT_OVERSOLD, DEFAULT_OVERBOUGHT)
    }

    pub fn with_thresholds(
        period: usize,
        symbol: Symbol,
        oversold: f64,
        overbought: f64,
    ) -> Self {
        assert!(period > 0, "RSI period must be > 0");
        assert!(
            oversold < overbought,
            "oversold threshold must sit below overbought"
        );
        Self {
            id: format!("rsi-{period}-{symbol}"),
            name: format!("RSI({period})"),
            symbol,
            period,
            oversold,
            overbought,
            prev_price: None,
            deltas_seen: 0,
            sum_gain: 0.0,
            sum_loss: 0.0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }

    fn rsi(&self) -> f64 {
        if self.avg_loss == 0.0 {
            return 100.0;
        }
        let rs = self.avg_gain / self.avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

impl Indicator for RsiIndicator {
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

        let prev = match self.prev_price.replace(trade.price) {
            Some(prev) => prev,
            None => return None, // first price carries no delta
        };

        let delta = trade.price - prev;
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);

        if self.deltas_seen < self.period {
            // Warm-up: simple means of the first `period` deltas.
            self.sum_gain += gain;
            self.sum_loss += loss;
            self.deltas_seen += 1;
            if self.deltas_seen < self.period {
                return None;
            }
            self.avg_gain = self.sum_gain / self.period as f64;
            self.avg_loss = self.sum_loss / self.period as f64;
        } else {
            let period = self.period as f64;
            self.avg_gain = (self.avg_gain * (period - 1.0) + gain) / period;
            self.avg_loss = (self.avg_loss * (period - 1.0) + loss) / period;
        }

        let mut state = IndicatorState::new(
            &self.id,
            &self.name,
            self.symbol.clone(),
            trade,
            self.rsi(),
        );
        state.insert_num("avg_gain", self.avg_gain);
        state.insert_num("avg_loss", self.avg_loss);
        Some(state)
    }

    fn signal(&self, state: &IndicatorState) -> Signal {
        let rsi = state.value;

        if rsi < self.oversold {
            let strength = ((self.oversold - rsi) / self.oversold).min(1.0);
            Signal::buy(
                strength,
                state.last_update,
                format!("{} at {rsi:.1}: oversold", self.name),
            )
        } else if rsi > self.overbought {
            let strength = ((rsi - self.overbought) / (100.0 - self.overbought)).min(1.0);
            Signal::sell(
                strength,
                state.last_update,
                format!("{} at {rsi:.1}: overbought", self.name),
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
    fn monotonic_rise_saturates_at_100_and_sells() {
        // 15 strictly increasing prices = 14 deltas for RSI(14).
        let mut rsi = RsiIndicator::new(14, sym());
        let prices: Vec<f64> = (1..=15).map(|x| 100.0 + x as f64).collect();
        let states = feed(&mut rsi, "AAPL", &prices);

        assert_eq!(states.len(), 1);
        assert!((states[0].value - 100.0).abs() < 1e-10);

        let signal = rsi.signal(&states[0]);
        match &signal {
            Signal::Sell {
                strength, reason, ..
            } => {
                assert!((strength - 1.0).abs() < 1e-10);
                assert!(reason.contains("overbought"));
            }
            other => panic!("expected Sell, got {other:?}"),
        }
    }

    #[test]
    fn monotonic_fall_hits_zero_and_buys_full_strength() {
        let mut rsi = RsiIndicator::new(14, sym());
        let prices: Vec<f64> = (1..=20).rev().map(|x| 100.0 + x as f64).collect();
        let states = feed(&mut rsi, "AAPL", &prices);

        let last = states.last().unwrap();
        assert!(last.value.abs() < 1e-10);
        let signal = rsi.signal(last);
        assert!(signal.is_buy());
        assert!((signal.strength() - 1.0).abs() < 1e-10);
        assert!(signal.reason().unwrap().contains("oversold"));
    }

    #[test]
    fn warm_up_consumes_period_deltas() {
        let mut rsi = RsiIndicator::new(14, sym());
        // 14 prices = 13 deltas: still warming up.
        let prices: Vec<f64> = (1..=14).map(|x| x as f64).collect();
        assert!(feed(&mut rsi, "AAPL", &prices).is_empty());
    }

    #[test]
    fn rsi_stays_in_range_and_neutral_holds() {
        let mut rsi = RsiIndicator::new(3, sym());
        let states = feed(
            &mut rsi,
            "AAPL",
            &[100.0, 101.0, 99.5, 100.5, 99.8, 100.2, 100.0],
        );
        assert!(!states.is_empty());
        for state in &states {
            assert!((0.0..=100.0).contains(&state.value), "RSI out of range");
        }
        // Mixed small moves land between the thresholds.
        assert!(rsi.signal(states.last().unwrap()).is_hold());
    }

    #[test]
    fn wilder_smoothing_after_warmup() {
        // period 2, prices 10, 11, 12, 11:
        //   deltas: +1, +1, -1
        //   warm-up means after 2 deltas: gain 1.0, loss 0.0
        //   wilder on -1: gain (1*1+0)/2 = 0.5, loss (0*1+1)/2 = 0.5 => RSI 50.
        let mut rsi = RsiIndicator::new(2, sym());
        let states = feed(&mut rsi, "AAPL", &[10.0, 11.0, 12.0, 11.0]);
        assert_eq!(states.len(), 2);
        assert!((states[0].value - 100.0).abs() < 1e-10);
        assert!((states[1].value - 50.0).abs() < 1e-10);
    }
}
