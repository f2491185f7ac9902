// =============================================================================
// StatsCollector — shared per-symbol statistics map
// =============================================================================
//
// Subscribes to the trade broker and folds each trade into the per-symbol
// rolling state. The map is the only cross-task mutable state in the
// pipeline; every update is a single read-modify-write critical section, so
// concurrent readers (the view-model sampler) always observe a consistent
// state for any given symbol.

use std::collections::HashMap;

use futures_util::{Stream, StreamExt};
use parking_lot::RwLock;
use tracing::debug;

use crate::stats::rolling::StatsState;
use crate::stats::window::WindowConfig;
use crate::types::{Symbol, TradeRecord};

pub struct StatsCollector {
    window: WindowConfig,
    stats: RwLock<HashMap<Symbol, StatsState>>,
}

impl StatsCollector {
    pub fn new(window: WindowConfig) -> Self {
        Self {
            window,
            stats: RwLock::new(HashMap::new()),
        }
    }

    /// Fold one trade into the state for its symbol.
    pub fn apply(&self, trade: &TradeRecord) {
        let mut map = self.stats.write();
        let entry = map
            .entry(trade.symbol.clone())
            .or_insert_with(|| StatsState::new(self.window));
        let state = std::mem::replace(entry, StatsState::new(self.window));
        *entry = state.update(trade.price, trade.volume, trade.source_timestamp);
    }

    /// Clone the full per-symbol map.
    pub fn snapshot(&self) -> HashMap<Symbol, StatsState> {
        self.stats.read().clone()
    }

    /// Clone the state for one symbol, if any trades have been seen for it.
    pub fn get(&self, symbol: &Symbol) -> Option<StatsState> {
        self.stats.read().get(symbol).cloned()
    }
}

/// Drain a broker subscription into the collector. Returns when the
/// subscription ends (broker closed or pipeline cancelled).
pub async fn run_stats_collector(
    collector: std::sync::Arc<StatsCollector>,
    trades: impl Stream<Item = TradeRecord>,
) {
    futures_util::pin_mut!(trades);
    while let Some(trade) = trades.next().await {
        collector.apply(&trade);
    }
    debug!("stats collector stream ended");
}
