//! Suspicion signals. Each scorer is independent and returns a 0-100 score
//! with a typed detail record; weighting and thresholding happen in the
//! score aggregator.
//!
//! Scoring always uses the trade's own timestamp as "now": age and
//! dormancy are measured as of the trade, never as of the wall clock.

pub mod account;
pub mod conviction;
pub mod size;

use polymarket_core::types::{HistoryLookup, Trade, WalletStateAt};
use serde::Serialize;

/// Placeholder note attached when scoring ran without an account lookup.
pub const NOT_FETCHED: &str = "account data not fetched";

/// One signal's verdict on one trade.
#[derive(Debug, Clone, Serialize)]
pub struct SignalScore {
    pub name: &'static str,
    /// 0-100, rounded to an integer.
    pub score: u32,
    pub weight: u32,
    pub details: SignalDetails,
}

/// Per-signal detail records, kept for report rendering.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum SignalDetails {
    Size {
        value_usd: f64,
        magnitude_score: u32,
        impact_score: Option<u32>,
        price_change_pct: Option<f64>,
    },
    Account {
        trade_count: Option<i64>,
        trade_count_score: u32,
        age_days: Option<f64>,
        age_score: u32,
        dormancy_days: Option<f64>,
        dormancy_score: u32,
        profit_score: u32,
        reason: Option<&'static str>,
    },
    Conviction {
        concentration: Option<f64>,
        reason: Option<&'static str>,
    },
}

/// Price points bracketing a trade, for the market-impact sub-score.
#[derive(Debug, Clone, Copy)]
pub struct MarketImpact {
    pub price_before: f64,
    pub price_after: f64,
}

impl MarketImpact {
    /// Percent price change across the trade. `None` when the before-price
    /// is degenerate.
    pub fn change_pct(&self) -> Option<f64> {
        if self.price_before <= 0.0 {
            return None;
        }
        Some((self.price_after - self.price_before) / self.price_before * 100.0)
    }
}

/// Everything the signal suite sees for one trade.
pub struct SignalContext<'a> {
    pub trade: &'a Trade,
    pub history: &'a HistoryLookup,
    /// Point-in-time state at the trade's timestamp, when derived.
    pub state: Option<&'a WalletStateAt>,
    pub impact: Option<MarketImpact>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impact_change_pct() {
        let impact = MarketImpact {
            price_before: 0.40,
            price_after: 0.50,
        };
        assert!((impact.change_pct().unwrap() - 25.0).abs() < 1e-9);

        let degenerate = MarketImpact {
            price_before: 0.0,
            price_after: 0.50,
        };
        assert!(degenerate.change_pct().is_none());
    }
}
