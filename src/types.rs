// =============================================================================
// Shared domain types — canonical validated trade values
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A validated, upper-cased ticker symbol.
///
/// Construction through [`Symbol::new`] is the only way to obtain one, so a
/// `Symbol` held anywhere downstream is guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Trim, upper-case and validate a raw symbol string.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single executed trade as reported by the venue, validated at the decode
/// boundary. Immutable once constructed — malformed payloads never enter a
/// downstream queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: Symbol,
    /// Execution price. Finite, >= 0.
    pub price: f64,
    /// Executed quantity. Finite, >= 0.
    pub volume: f64,
    /// Exchange wall-clock, epoch milliseconds.
    pub source_timestamp: i64,
    /// Local wall-clock when the record left the decoder, epoch milliseconds.
    pub received_timestamp: i64,
    /// `received_timestamp - source_timestamp`, >= 0.
    pub latency_ms: i64,
    /// Venue-supplied trade-condition codes, in reported order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<String>>,
}

impl TradeRecord {
    /// Validate every field and construct the record.
    ///
    /// Providers observing an exchange clock ahead of local time should clamp
    /// `received_timestamp` up to `source_timestamp` before calling this;
    /// a genuinely negative latency is rejected here.
    pub fn new(
        symbol: Symbol,
        price: f64,
        volume: f64,
        source_timestamp: i64,
        received_timestamp: i64,
        conditions: Option<Vec<String>>,
    ) -> Result<Self, ValidationError> {
        if !price.is_finite() || price < 0.0 {
            return Err(ValidationError::Price(price));
        }
        if !volume.is_finite() || volume < 0.0 {
            return Err(ValidationError::Volume(volume));
        }
        if source_timestamp <= 0 {
            return Err(ValidationError::Timestamp(source_timestamp));
        }
        if received_timestamp <= 0 {
            return Err(ValidationError::Timestamp(received_timestamp));
        }
        if received_timestamp < source_timestamp {
            return Err(ValidationError::NegativeLatency {
                source_ts: source_timestamp,
                received: received_timestamp,
            });
        }

        Ok(Self {
            symbol,
            price,
            volume,
            source_timestamp,
            received_timestamp,
            latency_ms: received_timestamp - source_timestamp,
            conditions,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    // ---- Symbol ----------------------------------------------------------

    #[test]
    fn symbol_uppercases_and_trims() {
        assert_eq!(sym(" aapl ").as_str(), "AAPL");
    }

    #[test]
    fn symbol_rejects_empty() {
        assert_eq!(Symbol::new("   "), Err(ValidationError::EmptySymbol));
    }

    // ---- TradeRecord -----------------------------------------------------

    #[test]
    fn trade_record_valid() {
        let t = TradeRecord::new(sym("AAPL"), 175.42, 100.0, 1_000, 1_025, None).unwrap();
        assert_eq!(t.latency_ms, 25);
        assert!(t.conditions.is_none());
    }

    #[test]
    fn trade_record_rejects_negative_price() {
        let err = TradeRecord::new(sym("AAPL"), -1.0, 100.0, 1_000, 1_025, None).unwrap_err();
        assert_eq!(err, ValidationError::Price(-1.0));
    }

    #[test]
    fn trade_record_rejects_non_finite_price() {
        assert!(TradeRecord::new(sym("AAPL"), f64::NAN, 1.0, 1_000, 1_025, None).is_err());
        assert!(TradeRecord::new(sym("AAPL"), f64::INFINITY, 1.0, 1_000, 1_025, None).is_err());
    }

    #[test]
    fn trade_record_rejects_negative_volume() {
        assert!(TradeRecord::new(sym("AAPL"), 1.0, -0.5, 1_000, 1_025, None).is_err());
    }

    #[test]
    fn trade_record_rejects_zero_timestamp() {
        let err = TradeRecord::new(sym("AAPL"), 1.0, 1.0, 0, 1_025, None).unwrap_err();
        assert_eq!(err, ValidationError::Timestamp(0));
    }

    #[test]
    fn trade_record_rejects_negative_latency() {
        let err = TradeRecord::new(sym("AAPL"), 1.0, 1.0, 2_000, 1_000, None).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NegativeLatency {
                source_ts: 2_000,
                received: 1_000
            }
        );
    }

    #[test]
    fn trade_record_zero_price_and_volume_allowed() {
        // Odd-lot / correction prints can carry zeroes — valid per contract.
        let t = TradeRecord::new(sym("AAPL"), 0.0, 0.0, 1_000, 1_000, None).unwrap();
        assert_eq!(t.latency_ms, 0);
    }

    #[test]
    fn trade_record_keeps_condition_order() {
        let t = TradeRecord::new(
            sym("AAPL"),
            1.0,
            1.0,
            1_000,
            1_001,
            Some(vec!["T".into(), "F".into()]),
        )
        .unwrap();
        assert_eq!(
            t.conditions.as_deref(),
            Some(&["T".to_string(), "F".to_string()][..])
        );
    }
}
