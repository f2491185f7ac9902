// =============================================================================
// Window policies — retention of the rolling price-point ring
// =============================================================================
//
// Three policies govern how many price points the statistics engine keeps:
//   EventBased(N)  — last N points.
//   TimeBased(D)   — points no older than D milliseconds before the newest
//                    update.
//   Hybrid(N, D)   — time filter first, then tail-truncate to N.
//
// Construction goes through the validated constructors so a `WindowConfig`
// held anywhere downstream satisfies size > 0 and duration > 0.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::InvalidWindowConfig;
use crate::stats::rolling::PricePoint;

/// Retention policy for the rolling statistics ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowConfig {
    EventBased { size: usize },
    TimeBased { duration_ms: i64 },
    Hybrid { size: usize, duration_ms: i64 },
}

impl WindowConfig {
    /// Keep the last `size` points.
    pub fn event_based(size: usize) -> Result<Self, InvalidWindowConfig> {
        if size == 0 {
            return Err(InvalidWindowConfig::ZeroSize);
        }
        Ok(Self::EventBased { size })
    }

    /// Keep points no older than `duration_ms` before the newest update.
    pub fn time_based(duration_ms: i64) -> Result<Self, InvalidWindowConfig> {
        if duration_ms <= 0 {
            return Err(InvalidWindowConfig::NonPositiveDuration(duration_ms));
        }
        Ok(Self::TimeBased { duration_ms })
    }

    /// Time filter first, then tail-truncate to `size`.
    pub fn hybrid(size: usize, duration_ms: i64) -> Result<Self, InvalidWindowConfig> {
        if size == 0 {
            return Err(InvalidWindowConfig::ZeroSize);
        }
        if duration_ms <= 0 {
            return Err(InvalidWindowConfig::NonPositiveDuration(duration_ms));
        }
        Ok(Self::Hybrid { size, duration_ms })
    }

    /// Apply the retention policy in place. `now_ms` is the timestamp of the
    /// update that just landed (the ring's newest point).
    pub(crate) fn retain(&self, ring: &mut VecDeque<PricePoint>, now_ms: i64) {
        match *self {
            Self::EventBased { size } => Self::truncate_front(ring, size),
            Self::TimeBased { duration_ms } => Self::drop_stale(ring, now_ms - duration_ms),
            Self::Hybrid { size, duration_ms } => {
                Self::drop_stale(ring, now_ms - duration_ms);
                Self::truncate_front(ring, size);
            }
        }
    }

    /// Drop from the front until at most `size` points remain.
    fn truncate_front(ring: &mut VecDeque<PricePoint>, size: usize) {
        while ring.len() > size {
            ring.pop_front();
        }
    }

    /// Drop leading points strictly older than `cutoff_ms`. The ring is in
    /// append order, so a single front scan suffices.
    fn drop_stale(ring: &mut VecDeque<PricePoint>, cutoff_ms: i64) {
        while ring.front().is_some_and(|p| p.timestamp < cutoff_ms) {
            ring.pop_front();
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn ring_of(points: &[(f64, i64)]) -> VecDeque<PricePoint> {
        points
            .iter()
            .map(|&(price, timestamp)| PricePoint {
                price,
                volume: 1.0,
                timestamp,
            })
            .collect()
    }

    fn prices(ring: &VecDeque<PricePoint>) -> Vec<f64> {
        ring.iter().map(|p| p.price).collect()
    }

    // ---- constructors ----------------------------------------------------

    #[test]
    fn event_based_rejects_zero_size() {
        assert_eq!(
            WindowConfig::event_based(0),
            Err(InvalidWindowConfig::ZeroSize)
        );
    }

    #[test]
    fn time_based_rejects_non_positive_duration() {
        assert_eq!(
            WindowConfig::time_based(0),
            Err(InvalidWindowConfig::NonPositiveDuration(0))
        );
        assert_eq!(
            WindowConfig::time_based(-5),
            Err(InvalidWindowConfig::NonPositiveDuration(-5))
        );
    }

    #[test]
    fn hybrid_validates_both_bounds() {
        assert!(WindowConfig::hybrid(0, 1_000).is_err());
        assert!(WindowConfig::hybrid(3, 0).is_err());
        assert!(WindowConfig::hybrid(3, 1_000).is_ok());
    }

    // ---- retention -------------------------------------------------------

    #[test]
    fn event_based_drops_oldest_first() {
        let window = WindowConfig::event_based(3).unwrap();
        let mut ring = ring_of(&[(100.0, 0), (110.0, 1_000), (120.0, 2_000), (130.0, 3_000)]);
        window.retain(&mut ring, 3_000);
        assert_eq!(prices(&ring), vec![110.0, 120.0, 130.0]);
    }

    #[test]
    fn time_based_drops_points_outside_duration() {
        let window = WindowConfig::time_based(5_000).unwrap();
        let mut ring = ring_of(&[(100.0, 0), (110.0, 2_000), (120.0, 6_000)]);
        window.retain(&mut ring, 6_000);
        assert_eq!(prices(&ring), vec![110.0, 120.0]);
    }

    #[test]
    fn time_based_keeps_point_exactly_at_cutoff() {
        let window = WindowConfig::time_based(5_000).unwrap();
        let mut ring = ring_of(&[(100.0, 1_000), (110.0, 6_000)]);
        window.retain(&mut ring, 6_000);
        // 1_000 == 6_000 - 5_000: at the cutoff, retained.
        assert_eq!(prices(&ring), vec![100.0, 110.0]);
    }

    #[test]
    fn hybrid_applies_time_filter_then_count() {
        let window = WindowConfig::hybrid(2, 10_000).unwrap();
        let mut ring = ring_of(&[
            (100.0, 0),
            (110.0, 5_000),
            (120.0, 8_000),
            (130.0, 12_000),
        ]);
        window.retain(&mut ring, 12_000);
        // Time filter keeps 5_000/8_000/12_000; count bound keeps the last 2.
        assert_eq!(prices(&ring), vec![120.0, 130.0]);
    }
}
