//! Trade-size signal: raw magnitude above the configured floor, blended
//! with observed market impact when surrounding price points exist.

use polymarket_core::config::ScoringConfig;
use polymarket_core::types::fixed;

use super::{SignalContext, SignalDetails, SignalScore};

pub const NAME: &str = "size";

/// Impact contributes only when price points bracket the trade; magnitude
/// stays dominant so the signal degrades gracefully without them.
const MAGNITUDE_SHARE: f64 = 0.7;

pub fn evaluate(ctx: &SignalContext, config: &ScoringConfig) -> SignalScore {
    let value_usd = fixed::to_f64(ctx.trade.value_usd);

    let magnitude = magnitude_score(value_usd, config.min_trade_usd);
    let impact = ctx.impact.and_then(|i| i.change_pct()).map(impact_score);

    let combined = match impact {
        Some(impact) => {
            MAGNITUDE_SHARE * magnitude as f64 + (1.0 - MAGNITUDE_SHARE) * impact as f64
        }
        None => magnitude as f64,
    };

    SignalScore {
        name: NAME,
        score: combined.round() as u32,
        weight: config.size_weight,
        details: SignalDetails::Size {
            value_usd,
            magnitude_score: magnitude,
            impact_score: impact,
            price_change_pct: ctx.impact.and_then(|i| i.change_pct()),
        },
    }
}

/// 0 below the floor; 25 at the floor, +25 per decade above it, capped at
/// 100.
fn magnitude_score(value_usd: f64, floor_usd: f64) -> u32 {
    if floor_usd <= 0.0 || value_usd < floor_usd {
        return 0;
    }
    let score: f64 = 25.0 + 25.0 * (value_usd / floor_usd).log10();
    score.clamp(0.0, 100.0).round() as u32
}

/// Monotone map from percent price change to 0-100; a 20% move saturates.
fn impact_score(change_pct: f64) -> u32 {
    (change_pct.abs() * 5.0).clamp(0.0, 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::MarketImpact;
    use polymarket_core::types::{
        Fill, FillRole, HistoryLookup, OutcomeSide, Side, Trade,
    };

    fn trade(value_usd: i64) -> Trade {
        Trade {
            transaction_hash: "0xtx".into(),
            condition_id: "cond".into(),
            token_id: "tok".into(),
            wallet: "0xw".into(),
            side: Side::Buy,
            outcome: OutcomeSide::Yes,
            role: FillRole::Taker,
            size: 1_000_000,
            avg_price: 500_000,
            value_usd,
            timestamp: 1_700_000_000,
            fills: Vec::<Fill>::new(),
            had_complementary_fills: false,
            complementary_value: 0,
        }
    }

    fn config() -> ScoringConfig {
        ScoringConfig {
            min_trade_usd: 500.0,
            ..Default::default()
        }
    }

    fn score(value_usd: i64, impact: Option<MarketImpact>) -> u32 {
        let trade = trade(value_usd);
        let history = HistoryLookup::Skipped;
        let ctx = SignalContext {
            trade: &trade,
            history: &history,
            state: None,
            impact,
        };
        evaluate(&ctx, &config()).score
    }

    #[test]
    fn test_below_floor_scores_zero() {
        assert_eq!(score(499_000_000, None), 0);
    }

    #[test]
    fn test_magnitude_grows_by_decade() {
        // At the floor: 25. One decade above ($5,000): 50. Two ($50,000): 75.
        assert_eq!(score(500_000_000, None), 25);
        assert_eq!(score(5_000_000_000, None), 50);
        assert_eq!(score(50_000_000_000, None), 75);
        assert_eq!(score(500_000_000_000, None), 100);
        // Saturates past three decades.
        assert_eq!(score(5_000_000_000_000, None), 100);
    }

    #[test]
    fn test_impact_blends_when_present() {
        let impact = MarketImpact {
            price_before: 0.50,
            price_after: 0.60,
        };
        // magnitude 50, impact |20%| * 5 = 100 → 0.7*50 + 0.3*100 = 65
        assert_eq!(score(5_000_000_000, Some(impact)), 65);
    }

    #[test]
    fn test_score_is_monotone_in_value() {
        let mut last = 0;
        for value in [100, 600, 1_000, 5_000, 20_000, 100_000, 1_000_000] {
            let current = score(value * fixed::SCALE, None);
            assert!(current >= last, "score dropped at ${value}");
            last = current;
        }
    }
}
