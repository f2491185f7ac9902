// =============================================================================
// tickfan — Main Entry Point
// =============================================================================
//
// Composition root for the pipeline:
//
//   provider -> broker -> { stats collector -> view model,
//                           indicator engines -> signal aggregation,
//                           snapshot logger }
//
// One task owns the provider WebSocket loop, one task per consumer drives its
// logic, and everything past the broker is mutually independent. Ctrl-C (or
// the provider stream ending) closes the broker, which cascades end-of-stream
// to every consumer; there is no built-in reconnection.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod broker;
mod config;
mod error;
mod indicators;
mod market_data;
mod signals;
mod stats;
mod types;
mod view_model;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::broker::{BrokerConfig, TradeBroker};
use crate::config::{AppConfig, Cli, ProviderKind};
use crate::indicators::{
    run_indicator, BollingerIndicator, EmaIndicator, Indicator, RsiIndicator, SmaIndicator,
    VolatilityIndicator, VolatilityMethod, VwapIndicator,
};
use crate::market_data::{FinnhubProvider, MarketDataProvider, PolygonProvider};
use crate::signals::run_signal_aggregation;
use crate::stats::{run_stats_collector, StatsCollector};
use crate::types::Symbol;
use crate::view_model::{run_view_model, ViewModel, DEFAULT_REFRESH};

/// How often the aggregator emits a per-symbol consensus.
const CONSENSUS_CADENCE: Duration = Duration::from_secs(1);
/// How often the snapshot logger prints the per-symbol stats line.
const SNAPSHOT_CADENCE: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_cli(Cli::parse()).context("invalid configuration")?;
    info!(
        provider = %config.provider,
        symbols = ?config.symbols.iter().map(Symbol::as_str).collect::<Vec<_>>(),
        window = ?config.window,
        enhanced = config.enhanced_metrics,
        "starting tickfan"
    );

    // ── 2. Connect the provider ──────────────────────────────────────────
    let mut provider = build_provider(&config);
    provider
        .authenticate()
        .await
        .context("provider authentication failed")?;
    let trades = provider
        .subscribe(&config.symbols)
        .await
        .context("trade subscription failed")?;

    // ── 3. Broker and consumers (subscribe before the first publish) ─────
    let broker = Arc::new(TradeBroker::new(BrokerConfig::default()));

    let collector = Arc::new(StatsCollector::new(config.window));
    let stats_task = tokio::spawn(run_stats_collector(
        collector.clone(),
        broker.subscribe().into_stream(),
    ));

    let (signal_tx, signal_rx) = mpsc::channel(256);
    let mut consumer_tasks = vec![stats_task];
    for symbol in &config.symbols {
        for indicator in build_indicators(symbol, &config) {
            let sub = broker.subscribe().filter_symbol(symbol.clone());
            consumer_tasks.push(tokio::spawn(run_indicator(indicator, sub, signal_tx.clone())));
        }
    }
    // The aggregator must see the channel close once every indicator is done.
    drop(signal_tx);
    consumer_tasks.push(tokio::spawn(run_signal_aggregation(
        signal_rx,
        CONSENSUS_CADENCE,
    )));

    let (view_tx, view_rx) =
        watch::channel(ViewModel::new(config.symbols.clone(), config.max_trades));
    consumer_tasks.push(tokio::spawn(run_view_model(
        broker.subscribe().into_stream(),
        collector.clone(),
        ViewModel::new(config.symbols.clone(), config.max_trades),
        view_tx,
        DEFAULT_REFRESH,
    )));
    consumer_tasks.push(tokio::spawn(run_snapshot_logger(view_rx)));

    // ── 4. Ingest loop ───────────────────────────────────────────────────
    let ingest_broker = broker.clone();
    let mut ingest_task = tokio::spawn(async move {
        let mut trades = trades;
        let mut published: u64 = 0;
        while let Some(trade) = trades.next().await {
            if ingest_broker.publish(trade).await.is_err() {
                break;
            }
            published += 1;
        }
        ingest_broker.close();
        info!(published, "trade stream ended");
    });

    // ── 5. Run until interrupt or stream end ─────────────────────────────
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received — shutting down");
            ingest_task.abort();
            broker.close();
        }
        _ = &mut ingest_task => {
            info!("provider stream finished — shutting down");
        }
    }

    // Idempotent: covers the path where the ingest task died without closing.
    broker.close();

    // End-of-stream has cascaded; let every consumer drain and exit.
    for task in consumer_tasks {
        let _ = task.await;
    }
    info!("tickfan stopped");
    Ok(())
}

// =============================================================================
// Wiring helpers
// =============================================================================

fn build_provider(config: &AppConfig) -> Box<dyn MarketDataProvider> {
    match config.provider {
        ProviderKind::Finnhub => Box::new(FinnhubProvider::new(
            config.token.clone(),
            config.ws_url.clone(),
        )),
        ProviderKind::Polygon => Box::new(PolygonProvider::new(
            config.token.clone(),
            config.ws_url.clone(),
        )),
    }
}

/// The indicator set per symbol: SMA/EMA/RSI always, the heavier trio behind
/// `--enhanced-metrics`.
fn build_indicators(symbol: &Symbol, config: &AppConfig) -> Vec<Box<dyn Indicator>> {
    let mut set: Vec<Box<dyn Indicator>> = vec![
        Box::new(SmaIndicator::new(20, symbol.clone())),
        Box::new(EmaIndicator::new(12, symbol.clone())),
        Box::new(RsiIndicator::new(14, symbol.clone())),
    ];
    if config.enhanced_metrics {
        set.push(Box::new(BollingerIndicator::new(20, symbol.clone())));
        set.push(Box::new(VwapIndicator::new(symbol.clone(), true)));
        set.push(Box::new(VolatilityIndicator::new(
            20,
            symbol.clone(),
            VolatilityMethod::StdDev,
            60.0,
        )));
    }
    set
}

/// UI adapter: log a compact per-symbol stats line from the latest view-model
/// snapshot. Ends when the view-model task drops the sender.
async fn run_snapshot_logger(mut updates: watch::Receiver<ViewModel>) {
    let mut ticker = tokio::time::interval(SNAPSHOT_CADENCE);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if updates.has_changed().is_err() {
            break; // view-model task is gone
        }

        let view = updates.borrow_and_update().clone();
        for symbol in &view.symbols {
            let Some(state) = view.statistics.get(symbol) else {
                continue; // no trades for this symbol yet
            };
            info!(
                symbol = %symbol,
                trades = state.count(),
                mean = format!("{:.2}", state.mean()),
                vwap = format!("{:.2}", state.vwap()),
                momentum = format!("{:+.2}%", state.momentum()),
                volatility = format!("{:.1}%", state.volatility()),
                velocity = format!("{:.1}/s", state.trade_velocity()),
                "stats"
            );
        }
        if let Some(latest) = view.recent_trades.front() {
            debug!(
                symbol = %latest.symbol,
                price = latest.price,
                latency_ms = latest.latency_ms,
                "latest trade"
            );
        }
    }
    debug!("snapshot logger ended");
}
