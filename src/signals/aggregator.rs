// =============================================================================
// Signal aggregator — weighted consensus across indicator signals
// =============================================================================
//
// Scores a batch of signals by summing Buy and Sell strengths. The winning
// side must beat the other and clear 0.3 × batch-size to produce a
// directional consensus; anything weaker is a Hold. Consensus strength is
// min(1, score / batch-size) and the reason concatenates the contributing
// indicators' reasons.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::signals::Signal;
use crate::types::Symbol;

/// Fraction of the batch size a side's score must exceed to win.
const MIN_SCORE_FRACTION: f64 = 0.3;

/// Combine a batch of indicator signals into one consensus signal.
///
/// An empty batch is a Hold.
pub fn aggregate(signals: &[Signal]) -> Signal {
    if signals.is_empty() {
        return Signal::hold(Utc::now().timestamp_millis());
    }

    let latest = signals
        .iter()
        .map(Signal::timestamp)
        .max()
        .unwrap_or_default();
    let n = signals.len() as f64;
    let threshold = MIN_SCORE_FRACTION * n;

    let buy_score: f64 = signals
        .iter()
        .filter(|s| s.is_buy())
        .map(Signal::strength)
        .sum();
    let sell_score: f64 = signals
        .iter()
        .filter(|s| s.is_sell())
        .map(Signal::strength)
        .sum();

    if buy_score > sell_score && buy_score > threshold {
        Signal::buy(buy_score / n, latest, join_reasons(signals, Signal::is_buy))
    } else if sell_score > buy_score && sell_score > threshold {
        Signal::sell(sell_score / n, latest, join_reasons(signals, Signal::is_sell))
    } else {
        Signal::hold(latest)
    }
}

fn join_reasons(signals: &[Signal], side: impl Fn(&Signal) -> bool) -> String {
    signals
        .iter()
        .filter(|s| side(s))
        .filter_map(Signal::reason)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Aggregation-task body: collect per-symbol signal batches and emit a
/// consensus every `cadence`. Ends when every signal sender is gone; any
/// remaining batch is flushed on the way out.
pub async fn run_signal_aggregation(
    mut signals: mpsc::Receiver<(Symbol, Signal)>,
    cadence: Duration,
) {
    let mut pending: HashMap<Symbol, Vec<Signal>> = HashMap::new();
    let mut ticker = tokio::time::interval(cadence);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            maybe = signals.recv() => match maybe {
                Some((symbol, signal)) => pending.entry(symbol).or_default().push(signal),
                None => break,
            },
            _ = ticker.tick() => flush(&mut pending),
        }
    }
    flush(&mut pending);
    debug!("signal aggregation ended");
}

fn flush(pending: &mut HashMap<Symbol, Vec<Signal>>) {
    for (symbol, batch) in pending.drain() {
        let consensus = aggregate(&batch);
        match &consensus {
            Signal::Hold { .. } => {
                debug!(symbol = %symbol, signals = batch.len(), "consensus HOLD")
            }
            directional => info!(
                symbol = %symbol,
                consensus = %directional,
                reason = directional.reason().unwrap_or_default(),
                "signal consensus"
            ),
        }
    }
}
