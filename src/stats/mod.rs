// =============================================================================
// Rolling statistics engine
// =============================================================================
//
// - Window retention policies (event-count, time-duration, hybrid).
// - Pure per-symbol state transitions with on-demand derived metrics.
// - The shared collector that folds the broker's trade stream into a map.

pub mod collector;
pub mod rolling;
pub mod window;

pub use collector::{run_stats_collector, StatsCollector};
pub use rolling::{PricePoint, StatsState};
pub use window::WindowConfig;
