// =============================================================================
// Volume-Weighted Average Price (VWAP)
// =============================================================================
//
// Accumulates cumulative price*volume and volume. With daily reset enabled
// the accumulators clear when the UTC date of the trade's source timestamp
// rolls over. Emits from the first matching trade — there is no warm-up.
// When no volume has accumulated the VWAP falls back to the current price.
//
// Signal: Buy when price runs more than 1.5% above the VWAP, Sell when more
// than 1.5% below.

use chrono::{NaiveDate, TimeZone, Utc};

use crate::indicators::sma::BAND_SIGNAL_STRENGTH;
use crate::indicators::{Indicator, IndicatorState};
use crate::signals::Signal;
use crate::types::{Symbol, TradeRecord};

pub struct VwapIndicator {
    id: String,
    name: String,
    symbol: Symbol,
    reset_daily: bool,
    cumulative_pv: f64,
    cumulative_volume: f64,
    last_date: Option<NaiveDate>,
}

impl VwapIndicator {
    pub fn new(symbol: Symbol, reset_daily: bool) -> Self {
        Self {
            id: format!("vwap-{symbol}"),
            name: "VWAP".to_string(),
            symbol,
            reset_daily,
            cumulative_pv: 0.0,
            cumulative_volume: 0.0,
            last_date: None,
        }
    }

    fn trade_date(timestamp_ms: i64) -> Option<NaiveDate> {
        Utc.timestamp_millis_opt(timestamp_ms)
            .single()
            .map(|dt| dt.date_naive())
    }
}

impl Indicator for VwapIndicator {
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

        if self.reset_daily {
            let date = Self::trade_date(trade.source_timestamp);
            if self.last_date.is_some() && self.last_date != date {
                self.cumulative_pv = 0.0;
                self.cumulative_volume = 0.0;
            }
            self.last_date = date;
        }

        self.cumulative_pv += trade.price * trade.volume;
        self.cumulative_volume += trade.volume;

        let vwap = if self.cumulative_volume > 0.0 {
            self.cumulative_pv / self.cumulative_volume
        } else {
            trade.price
        };

        let mut state = IndicatorState::new(
            &self.id,
            &self.name,
            self.symbol.clone(),
            trade,
            vwap,
        );
        state.insert_num("cumulative_volume", self.cumulative_volume);
        Some(state)
    }

    fn signal(&self, state: &IndicatorState) -> Signal {
        let price = state.observed_price();
        let vwap = state.value;

        if price > vwap * 1.015 {
            Signal::buy(
                BAND_SIGNAL_STRENGTH,
                state.last_update,
                format!("price {price:.2} above VWAP {vwap:.2} by >1.5%"),
            )
        } else if price < vwap * 0.985 {
            Signal::sell(
                BAND_SIGNAL_STRENGTH,
                state.last_update,
                format!("price {price:.2} below VWAP {vwap:.2} by >1.5%"),
            )
        } else {
            Signal::hold(state.last_update)
        }
    }
}
