// =============================================================================
// TradeBroker — in-process broadcast fan-out with bounded subscriber queues
// =============================================================================
//
// Every live subscriber owns an independent bounded queue (default capacity
// 1024). `publish` enqueues onto all of them and completes only once each
// active subscriber has accepted, so a full queue backpressures the publisher
// rather than dropping trades. Total memory is O(capacity × subscribers).
//
// Subscription semantics:
//   - subscribe-before-publish: a subscriber observes exactly the publishes
//     made after its subscribe completed; there is no replay.
//   - within one subscriber the sequence is in publish order; there is no
//     ordering guarantee across subscribers.
//   - dropping a `Subscription` deregisters its queue; only that subscriber
//     loses any in-flight item.
//
// Closing the broker (publisher done or failed) drops every queue's sender,
// so all live subscriptions end with normal end-of-stream.

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::BrokerClosed;
use crate::types::{Symbol, TradeRecord};

// =============================================================================
// Configuration
// =============================================================================

/// Tunables for the broker's queues and optional chronological re-ordering.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Per-subscriber queue capacity.
    pub capacity: usize,
    /// Best-effort chronological delivery: buffer small chunks and sort each
    /// chunk by `source_timestamp`. Ordering holds within a chunk only.
    pub sort_by_timestamp: bool,
    /// Maximum trades per sort chunk.
    pub sort_chunk_size: usize,
    /// Deadline after which a partial sort chunk is flushed.
    pub sort_chunk_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            sort_by_timestamp: false,
            sort_chunk_size: 64,
            sort_chunk_timeout: Duration::from_millis(50),
        }
    }
}

// =============================================================================
// Broker
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrokerState {
    Open,
    Closed,
}

struct BrokerInner {
    state: BrokerState,
    subscribers: HashMap<Uuid, mpsc::Sender<TradeRecord>>,
}

pub struct TradeBroker {
    config: BrokerConfig,
    inner: Arc<RwLock<BrokerInner>>,
    /// Serialises concurrent publishers so every subscriber observes one
    /// global publish order.
    publish_lock: tokio::sync::Mutex<()>,
}

impl TradeBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            inner: Arc::new(RwLock::new(BrokerInner {
                state: BrokerState::Open,
                subscribers: HashMap::new(),
            })),
            publish_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Broadcast one trade to every live subscriber.
    ///
    /// Suspends while any subscriber's queue is full — this is the pipeline's
    /// backpressure primitive. Subscribers whose receiving end is gone are
    /// pruned; the trade is lost only for them.
    pub async fn publish(&self, trade: TradeRecord) -> Result<(), BrokerClosed> {
        let _serial = self.publish_lock.lock().await;

        // Snapshot the senders, then release the registry lock before any
        // await point.
        let targets: Vec<(Uuid, mpsc::Sender<TradeRecord>)> = {
            let inner = self.inner.read();
            if inner.state == BrokerState::Closed {
                return Err(BrokerClosed);
            }
            inner
                .subscribers
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };

        let mut stale = Vec::new();
        for (id, tx) in targets {
            if tx.send(trade.clone()).await.is_err() {
                stale.push(id);
            }
        }

        if !stale.is_empty() {
            let mut inner = self.inner.write();
            for id in &stale {
                inner.subscribers.remove(id);
            }
            debug!(pruned = stale.len(), "removed stale subscribers");
        }

        Ok(())
    }

    /// Attach a new subscriber. The returned [`Subscription`] yields every
    /// trade published after this call, in publish order, and releases its
    /// queue when dropped.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.config.capacity.max(1));
        let id = Uuid::new_v4();

        {
            let mut inner = self.inner.write();
            if inner.state == BrokerState::Open {
                inner.subscribers.insert(id, tx);
            }
            // On a closed broker `tx` is dropped here and the subscription
            // yields end-of-stream immediately.
        }

        Subscription {
            id,
            rx: ReceiverStream::new(rx),
            inner: Arc::clone(&self.inner),
            sort: self.config.sort_by_timestamp.then(|| SortWindow {
                chunk_size: self.config.sort_chunk_size,
                timeout: self.config.sort_chunk_timeout,
            }),
        }
    }

    /// Flip the broker to Closed. Every live subscription ends with normal
    /// end-of-stream; subsequent `publish` calls fail with [`BrokerClosed`].
    pub fn close(&self) {
        let mut inner = self.inner.write();
        if inner.state == BrokerState::Closed {
            return;
        }
        inner.state = BrokerState::Closed;
        let dropped = inner.subscribers.len();
        inner.subscribers.clear();
        info!(subscribers = dropped, "trade broker closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().state == BrokerState::Closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.read().subscribers.len()
    }
}

// =============================================================================
// Subscription
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct SortWindow {
    chunk_size: usize,
    timeout: Duration,
}

/// A scoped subscriber handle. Implements `Stream<Item = TradeRecord>`;
/// deregisters its queue from the broker on drop.
pub struct Subscription {
    id: Uuid,
    rx: ReceiverStream<TradeRecord>,
    inner: Arc<RwLock<BrokerInner>>,
    sort: Option<SortWindow>,
}

impl Stream for Subscription {
    type Item = TradeRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.write().subscribers.remove(&self.id);
    }
}

impl Subscription {
    /// Keep only trades for one symbol.
    pub fn filter_symbol(self, symbol: Symbol) -> impl Stream<Item = TradeRecord> {
        self.filter(move |t| futures_util::future::ready(t.symbol == symbol))
    }

    /// Keep only trades whose symbol is in `symbols`.
    pub fn filter_symbols(self, symbols: HashSet<Symbol>) -> impl Stream<Item = TradeRecord> {
        self.filter(move |t| futures_util::future::ready(symbols.contains(&t.symbol)))
    }

    /// Observe each trade without consuming it.
    pub fn tap(self, mut observe: impl FnMut(&TradeRecord)) -> impl Stream<Item = TradeRecord> {
        self.inspect(move |t| observe(t))
    }

    /// Finalise into the stream consumers iterate. When the broker was built
    /// with `sort_by_timestamp`, trades are batched into small chunks and
    /// each chunk is sorted by `source_timestamp`; cross-chunk order follows
    /// publish order.
    pub fn into_stream(self) -> Pin<Box<dyn Stream<Item = TradeRecord> + Send>> {
        match self.sort {
            None => Box::pin(self),
            Some(sort) => {
                let chunks =
                    tokio_stream::StreamExt::chunks_timeout(self, sort.chunk_size, sort.timeout);
                Box::pin(chunks.flat_map(|mut chunk: Vec<TradeRecord>| {
                    chunk.sort_by_key(|t| t.source_timestamp);
                    futures_util::stream::iter(chunk)
                }))
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn trade(symbol: &str, price: f64, ts: i64) -> TradeRecord {
        TradeRecord::new(Symbol::new(symbol).unwrap(), price, 10.0, ts, ts, None).unwrap()
    }

    fn symbols(trades: &[TradeRecord]) -> Vec<&str> {
        trades.iter().map(|t| t.symbol.as_str()).collect()
    }

    async fn take(stream: &mut (impl Stream<Item = TradeRecord> + Unpin), n: usize) -> Vec<TradeRecord> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            match stream.next().await {
                Some(t) => out.push(t),
                None => break,
            }
        }
        out
    }

    #[tokio::test]
    async fn broadcasts_to_all_subscribers_in_publish_order() {
        let broker = TradeBroker::new(BrokerConfig::default());
        let mut a = broker.subscribe();
        let mut b = broker.subscribe();

        broker.publish(trade("AAPL", 150.0, 1)).await.unwrap();
        broker.publish(trade("GOOGL", 2_800.0, 2)).await.unwrap();
        broker.publish(trade("MSFT", 350.0, 3)).await.unwrap();

        let got_a = take(&mut a, 3).await;
        let got_b = take(&mut b, 3).await;
        assert_eq!(symbols(&got_a), vec!["AAPL", "GOOGL", "MSFT"]);
        assert_eq!(symbols(&got_b), vec!["AAPL", "GOOGL", "MSFT"]);
    }

    #[tokio::test]
    async fn filter_by_symbol_set() {
        let broker = TradeBroker::new(BrokerConfig::default());
        let wanted: HashSet<Symbol> = ["AAPL", "GOOGL"]
            .iter()
            .map(|s| Symbol::new(s).unwrap())
            .collect();
        let mut filtered = Box::pin(broker.subscribe().filter_symbols(wanted));

        for (sym, ts) in [("AAPL", 1), ("MSFT", 2), ("GOOGL", 3), ("TSLA", 4), ("AAPL", 5)] {
            broker.publish(trade(sym, 100.0, ts)).await.unwrap();
        }
        broker.close();

        let got: Vec<TradeRecord> = filtered.as_mut().collect().await;
        assert_eq!(symbols(&got), vec!["AAPL", "GOOGL", "AAPL"]);
    }

    #[tokio::test]
    async fn filter_single_symbol() {
        let broker = TradeBroker::new(BrokerConfig::default());
        let mut filtered = Box::pin(
            broker
                .subscribe()
                .filter_symbol(Symbol::new("AAPL").unwrap()),
        );

        broker.publish(trade("MSFT", 1.0, 1)).await.unwrap();
        broker.publish(trade("AAPL", 2.0, 2)).await.unwrap();
        broker.close();

        let got: Vec<TradeRecord> = filtered.as_mut().collect().await;
        assert_eq!(symbols(&got), vec!["AAPL"]);
    }

    #[tokio::test]
    async fn late_subscriber_sees_only_later_publishes() {
        let broker = TradeBroker::new(BrokerConfig::default());
        let mut early = broker.subscribe();

        broker.publish(trade("AAPL", 1.0, 1)).await.unwrap();

        let mut late = broker.subscribe();
        broker.publish(trade("MSFT", 2.0, 2)).await.unwrap();
        broker.close();

        // Both streams have ended; take() stops at end-of-stream.
        let got_early = take(&mut early, 3).await;
        let got_late = take(&mut late, 3).await;
        assert_eq!(symbols(&got_early), vec!["AAPL", "MSFT"]);
        assert_eq!(symbols(&got_late), vec!["MSFT"]);
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned_and_others_unaffected() {
        let broker = TradeBroker::new(BrokerConfig::default());
        let mut kept = broker.subscribe();
        let dropped = broker.subscribe();
        assert_eq!(broker.subscriber_count(), 2);

        drop(dropped);
        assert_eq!(broker.subscriber_count(), 1);

        broker.publish(trade("AAPL", 1.0, 1)).await.unwrap();
        let got = take(&mut kept, 1).await;
        assert_eq!(symbols(&got), vec!["AAPL"]);
    }

    #[tokio::test]
    async fn close_ends_streams_and_rejects_publish() {
        let broker = TradeBroker::new(BrokerConfig::default());
        let mut sub = broker.subscribe();

        broker.publish(trade("AAPL", 1.0, 1)).await.unwrap();
        broker.close();

        assert_eq!(take(&mut sub, 5).await.len(), 1); // buffered trade, then end
        assert_eq!(broker.publish(trade("AAPL", 2.0, 2)).await, Err(BrokerClosed));
        assert!(broker.is_closed());
    }

    #[tokio::test]
    async fn subscribe_after_close_yields_empty_stream() {
        let broker = TradeBroker::new(BrokerConfig::default());
        broker.close();
        let mut sub = broker.subscribe();
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn full_queue_backpressures_publisher() {
        let broker = TradeBroker::new(BrokerConfig {
            capacity: 1,
            ..BrokerConfig::default()
        });
        let mut slow = broker.subscribe();

        broker.publish(trade("AAPL", 1.0, 1)).await.unwrap();

        // Queue is full; the next publish must suspend until the subscriber
        // drains one item.
        let stalled = timeout(Duration::from_millis(50), broker.publish(trade("AAPL", 2.0, 2))).await;
        assert!(stalled.is_err(), "publish should block on a full queue");

        let first = slow.next().await.unwrap();
        assert_eq!(first.source_timestamp, 1);
        timeout(Duration::from_millis(200), broker.publish(trade("AAPL", 3.0, 3)))
            .await
            .expect("publish should proceed after drain")
            .unwrap();
    }

    #[tokio::test]
    async fn tap_observes_without_consuming() {
        let broker = TradeBroker::new(BrokerConfig::default());
        let seen = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen_in_tap = seen.clone();
        let mut tapped = Box::pin(broker.subscribe().tap(move |_| {
            seen_in_tap.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }));

        broker.publish(trade("AAPL", 1.0, 1)).await.unwrap();
        broker.publish(trade("AAPL", 2.0, 2)).await.unwrap();
        broker.close();

        let got: Vec<TradeRecord> = tapped.as_mut().collect().await;
        assert_eq!(got.len(), 2);
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn sort_by_timestamp_orders_within_chunk() {
        let broker = TradeBroker::new(BrokerConfig {
            sort_by_timestamp: true,
            sort_chunk_size: 3,
            ..BrokerConfig::default()
        });
        let mut ordered = broker.subscribe().into_stream();

        // Published out of source order; one full chunk.
        broker.publish(trade("AAPL", 1.0, 30)).await.unwrap();
        broker.publish(trade("AAPL", 2.0, 10)).await.unwrap();
        broker.publish(trade("AAPL", 3.0, 20)).await.unwrap();
        broker.close();

        let got: Vec<TradeRecord> = ordered.as_mut().collect().await;
        let timestamps: Vec<i64> = got.iter().map(|t| t.source_timestamp).collect();
        assert_eq!(timestamps, vec![10, 20, 30]);
    }
}
