//! Reconstructed trades — the aggregator's per-wallet per-transaction
//! interpretation of raw fills.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::fill::{Fill, FillRole, Side};
use super::fixed;
use super::market::OutcomeSide;

/// A wallet's economic intent in one chain transaction on one condition.
///
/// Derived, never persisted. `side` is from the wallet's perspective (the
/// raw fill `side` field is the maker's).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub transaction_hash: String,
    pub condition_id: String,
    pub token_id: String,
    pub wallet: String,
    pub side: Side,
    pub outcome: OutcomeSide,
    /// The role the wallet held in the kept fills.
    pub role: FillRole,
    /// Total shares, micro-units.
    pub size: i64,
    /// Size-weighted average price, micro-USD per share.
    pub avg_price: i64,
    /// Total USD value, micro-USD.
    pub value_usd: i64,
    /// Earliest contributing fill, unix seconds.
    pub timestamp: i64,
    /// Fills folded into this trade.
    pub fills: Vec<Fill>,
    /// Whether opposite-token fills of the same condition were observed in
    /// the same transaction and discarded as routing artifacts.
    pub had_complementary_fills: bool,
    /// USD value of the discarded side, micro-USD.
    pub complementary_value: i64,
}

impl Trade {
    pub fn fill_count(&self) -> usize {
        self.fills.len()
    }

    /// Trade value in whole dollars, for display.
    pub fn value_usd_decimal(&self) -> Decimal {
        fixed::to_decimal(self.value_usd)
    }

    /// Average price as a probability-like decimal in [0, 1].
    pub fn avg_price_decimal(&self) -> Decimal {
        fixed::to_decimal(self.avg_price)
    }

    /// Whether this trade is a "safe bet": a buy near price 1.0 or a sell
    /// near price 0.0, which carries little information on a resolved
    /// market. `threshold` is the configured price bound (e.g. 0.95).
    pub fn is_safe_bet(&self, threshold: f64) -> bool {
        let price = fixed::to_f64(self.avg_price);
        match self.side {
            Side::Buy => price >= threshold,
            Side::Sell => price <= 1.0 - threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(side: Side, avg_price: i64) -> Trade {
        Trade {
            transaction_hash: "0xtx".into(),
            condition_id: "cond".into(),
            token_id: "tok".into(),
            wallet: "0xw".into(),
            side,
            outcome: OutcomeSide::Yes,
            role: FillRole::Taker,
            size: 1_000_000,
            avg_price,
            value_usd: fixed::value_usd(1_000_000, avg_price),
            timestamp: 1_700_000_000,
            fills: Vec::new(),
            had_complementary_fills: false,
            complementary_value: 0,
        }
    }

    #[test]
    fn test_safe_bet_detection() {
        assert!(trade(Side::Buy, 970_000).is_safe_bet(0.95));
        assert!(!trade(Side::Buy, 600_000).is_safe_bet(0.95));
        assert!(trade(Side::Sell, 30_000).is_safe_bet(0.95));
        assert!(!trade(Side::Sell, 400_000).is_safe_bet(0.95));
    }

    #[test]
    fn test_display_conversions() {
        let t = trade(Side::Buy, 150_000);
        assert_eq!(t.avg_price_decimal().to_string(), "0.150000");
        assert_eq!(t.value_usd_decimal().to_string(), "0.150000");
    }
}
