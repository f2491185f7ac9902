// =============================================================================
// Rolling statistics — per-symbol state and derived metrics
// =============================================================================
//
// `StatsState::update` is a pure by-value transition: it consumes the old
// state and returns the new one, so the collector can hold states behind a
// lock without interior mutation leaking out.
//
// Derived metrics are computed on demand from the retained ring and are never
// stored. The running `sum` / `sum_squares` / all-time `min` / `max` fields
// are maintained incrementally but not consulted by the derived accessors;
// they exist for debugging and a future O(1) mean/stddev path.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::InsufficientData;
use crate::stats::window::WindowConfig;

/// One trading year in milliseconds (252 sessions), used to annualise
/// volatility measured over the window's elapsed span.
const TRADING_YEAR_MS: f64 = 252.0 * 24.0 * 60.0 * 60.0 * 1000.0;

/// A single retained observation in the rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub volume: f64,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Per-symbol rolling statistics under one [`WindowConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsState {
    window: WindowConfig,
    /// Total updates ever applied. Monotonic; never shrinks on eviction.
    count: u64,
    /// Running sum of all prices ever seen (not consulted by accessors).
    sum: f64,
    /// Running sum of squared prices ever seen (not consulted by accessors).
    sum_squares: f64,
    /// All-time extremes (not consulted by accessors; the public min/max read
    /// the ring).
    all_time_min: f64,
    all_time_max: f64,
    price_points: VecDeque<PricePoint>,
    /// Timestamp of the newest update, epoch milliseconds. 0 before the
    /// first update.
    last_update_time: i64,
}

impl StatsState {
    pub fn new(window: WindowConfig) -> Self {
        Self {
            window,
            count: 0,
            sum: 0.0,
            sum_squares: 0.0,
            all_time_min: f64::INFINITY,
            all_time_max: f64::NEG_INFINITY,
            price_points: VecDeque::new(),
            last_update_time: 0,
        }
    }

    /// Fold one observation into the state, applying the window's retention
    /// policy, and return the successor state.
    pub fn update(mut self, price: f64, volume: f64, timestamp: i64) -> Self {
        self.count += 1;
        self.sum += price;
        self.sum_squares += price * price;
        self.all_time_min = self.all_time_min.min(price);
        self.all_time_max = self.all_time_max.max(price);

        self.price_points.push_back(PricePoint {
            price,
            volume,
            timestamp,
        });
        self.window.retain(&mut self.price_points, timestamp);
        self.last_update_time = timestamp;
        self
    }

    // ── Raw access ──────────────────────────────────────────────────────

    pub fn window(&self) -> WindowConfig {
        self.window
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn last_update_time(&self) -> i64 {
        self.last_update_time
    }

    pub fn price_points(&self) -> &VecDeque<PricePoint> {
        &self.price_points
    }

    /// Retained prices in append order (oldest first).
    pub fn recent_prices(&self) -> Vec<f64> {
        self.price_points.iter().map(|p| p.price).collect()
    }

    fn len(&self) -> usize {
        self.price_points.len()
    }

    /// Milliseconds between the oldest and newest retained points.
    fn elapsed_ms(&self) -> i64 {
        match (self.price_points.front(), self.price_points.back()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0,
        }
    }

    // ── Derived metrics (0 on empty / degenerate input) ─────────────────

    /// Arithmetic mean of retained prices.
    pub fn mean(&self) -> f64 {
        if self.price_points.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.price_points.iter().map(|p| p.price).sum();
        sum / self.len() as f64
    }

    /// Population standard deviation of retained prices.
    pub fn stddev(&self) -> f64 {
        if self.price_points.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .price_points
            .iter()
            .map(|p| (p.price - mean).powi(2))
            .sum::<f64>()
            / self.len() as f64;
        variance.sqrt()
    }

    /// Minimum retained price (window, not all-time).
    pub fn window_min(&self) -> f64 {
        let min = self
            .price_points
            .iter()
            .map(|p| p.price)
            .fold(f64::INFINITY, f64::min);
        if min.is_finite() {
            min
        } else {
            0.0
        }
    }

    /// Maximum retained price (window, not all-time).
    pub fn window_max(&self) -> f64 {
        let max = self
            .price_points
            .iter()
            .map(|p| p.price)
            .fold(f64::NEG_INFINITY, f64::max);
        if max.is_finite() {
            max
        } else {
            0.0
        }
    }

    /// Annualised volatility in percent: the standard deviation of
    /// consecutive log-returns, scaled by sqrt(trading-year / elapsed).
    /// 0 when fewer than two points are retained or no time has elapsed.
    pub fn volatility(&self) -> f64 {
        let elapsed = self.elapsed_ms();
        if self.len() < 2 || elapsed <= 0 {
            return 0.0;
        }

        let returns: Vec<f64> = self
            .price_points
            .iter()
            .zip(self.price_points.iter().skip(1))
            .filter(|(prev, next)| prev.price > 0.0 && next.price > 0.0)
            .map(|(prev, next)| (next.price / prev.price).ln())
            .collect();
        if returns.is_empty() {
            return 0.0;
        }

        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance =
            returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;

        variance.sqrt() * (TRADING_YEAR_MS / elapsed as f64).sqrt() * 100.0
    }

    /// Percent rate-of-change across the window: (last - first) / first * 100.
    pub fn momentum(&self) -> f64 {
        match (self.price_points.front(), self.price_points.back()) {
            (Some(first), Some(last)) if first.price != 0.0 => {
                (last.price - first.price) / first.price * 100.0
            }
            _ => 0.0,
        }
    }

    /// Retained points per second of elapsed window time.
    pub fn trade_velocity(&self) -> f64 {
        let elapsed = self.elapsed_ms();
        if elapsed <= 0 {
            return 0.0;
        }
        self.len() as f64 / elapsed as f64 * 1000.0
    }

    /// Volume-weighted average price over the window; 0 when no volume.
    pub fn vwap(&self) -> f64 {
        let total_volume: f64 = self.price_points.iter().map(|p| p.volume).sum();
        if total_volume == 0.0 {
            return 0.0;
        }
        let pv: f64 = self
            .price_points
            .iter()
            .map(|p| p.price * p.volume)
            .sum();
        pv / total_volume
    }

    /// Window spread proxy in percent: (max - min) / mid * 100.
    pub fn spread_pct(&self) -> f64 {
        if self.price_points.is_empty() {
            return 0.0;
        }
        let min = self.window_min();
        let max = self.window_max();
        let mid = (min + max) / 2.0;
        if mid == 0.0 {
            return 0.0;
        }
        (max - min) / mid * 100.0
    }

    // ── Safe accessors (typed error instead of the neutral 0) ───────────

    pub fn try_mean(&self) -> Result<f64, InsufficientData> {
        self.require(1)?;
        Ok(self.mean())
    }

    pub fn try_stddev(&self) -> Result<f64, InsufficientData> {
        self.require(1)?;
        Ok(self.stddev())
    }

    pub fn try_volatility(&self) -> Result<f64, InsufficientData> {
        self.require(2)?;
        Ok(self.volatility())
    }

    pub fn try_momentum(&self) -> Result<f64, InsufficientData> {
        self.require(2)?;
        Ok(self.momentum())
    }

    pub fn try_vwap(&self) -> Result<f64, InsufficientData> {
        self.require(1)?;
        Ok(self.vwap())
    }

    fn require(&self, need: usize) -> Result<(), InsufficientData> {
        if self.len() < need {
            return Err(InsufficientData {
                have: self.len(),
                need,
            });
        }
        Ok(())
    }
}
