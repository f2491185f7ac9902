// =============================================================================
// ViewModel — UI-facing snapshot of recent trades and per-symbol statistics
// =============================================================================
//
// The view-model task combines two inputs into one state by a scan:
//   - each broker trade is prepended to the capped newest-first trade list;
//   - a periodic tick (100 ms default) re-snapshots the stats collector map.
// Every step publishes the updated snapshot on a watch channel; the UI
// adapter renders whatever it last observed. The task ends when the trade
// subscription ends.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::stats::{StatsCollector, StatsState};
use crate::types::{Symbol, TradeRecord};

pub const DEFAULT_MAX_TRADES: usize = 20;
pub const DEFAULT_REFRESH: Duration = Duration::from_millis(100);

/// Immutable snapshot handed to the UI layer.
#[derive(Debug, Clone, Serialize)]
pub struct ViewModel {
    pub symbols: Vec<Symbol>,
    /// Newest first, capped at `max_trades`.
    pub recent_trades: VecDeque<TradeRecord>,
    pub statistics: HashMap<Symbol, StatsState>,
    pub max_trades: usize,
}

impl ViewModel {
    pub fn new(symbols: Vec<Symbol>, max_trades: usize) -> Self {
        Self {
            symbols,
            recent_trades: VecDeque::with_capacity(max_trades + 1),
            statistics: HashMap::new(),
            max_trades,
        }
    }

    /// Prepend a trade; evict the oldest beyond the cap.
    pub fn apply_trade(&mut self, trade: TradeRecord) {
        self.recent_trades.push_front(trade);
        self.recent_trades.truncate(self.max_trades);
    }

    /// Replace the statistics map with a fresh collector snapshot.
    pub fn apply_statistics(&mut self, statistics: HashMap<Symbol, StatsState>) {
        self.statistics = statistics;
    }
}

/// Scan-loop task: fold trades and stats ticks into the view model and
/// publish each step on `updates`.
pub async fn run_view_model(
    trades: impl Stream<Item = TradeRecord>,
    collector: Arc<StatsCollector>,
    mut view: ViewModel,
    updates: watch::Sender<ViewModel>,
    refresh: Duration,
) {
    futures_util::pin_mut!(trades);
    let mut ticker = tokio::time::interval(refresh);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            maybe_trade = trades.next() => {
                match maybe_trade {
                    Some(trade) => {
                        view.apply_trade(trade);
                        let _ = updates.send(view.clone());
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                view.apply_statistics(collector.snapshot());
                let _ = updates.send(view.clone());
            }
        }
    }
    debug!("view model trade stream ended");
}
