//! Weighted score aggregation, alert thresholding, and behavioral tags.

use polymarket_core::config::ScoringConfig;
use polymarket_core::types::{HistoryLookup, Side, Trade, WalletStateAt};
use serde::Serialize;

use crate::signals::{self, MarketImpact, SignalContext, SignalScore};

/// Closed set of behavioral tags a suspicious trade can carry. Tags are
/// additive; any combination is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BehaviorTag {
    Whale,
    Sniper,
    EarlyMover,
    Dumping,
}

/// Market-side facts the classifier needs beyond the trade itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyContext {
    /// Market creation time, unix seconds, when known.
    pub market_created_at: Option<i64>,
    /// This trade's rank among the market's trades, oldest first (0 is the
    /// market's first trade), when known.
    pub market_rank: Option<usize>,
    /// Whether the wallet already held a position on the traded token.
    pub has_position: bool,
}

/// A fully scored trade.
#[derive(Debug, Clone, Serialize)]
pub struct TradeScore {
    pub trade: Trade,
    pub signals: Vec<SignalScore>,
    /// Weighted total, 0-100.
    pub total: u32,
    pub is_alert: bool,
    pub tags: Vec<BehaviorTag>,
    /// Carried from point-in-time state: the score judged against
    /// incomplete coverage.
    pub approximate: bool,
}

/// Evaluate the three signals for one trade and fold them into a total.
/// The signals are independent; results are collected in a fixed order so
/// identical inputs produce identical reports.
pub fn evaluate_trade(
    trade: &Trade,
    history: &HistoryLookup,
    state: Option<&WalletStateAt>,
    impact: Option<MarketImpact>,
    classify: ClassifyContext,
    config: &ScoringConfig,
) -> TradeScore {
    let ctx = SignalContext {
        trade,
        history,
        state,
        impact,
    };

    let signals = vec![
        signals::size::evaluate(&ctx, config),
        signals::account::evaluate(&ctx, config),
        signals::conviction::evaluate(&ctx, config),
    ];

    let total = weighted_total(&signals);
    let is_alert = total >= config.alert_threshold;
    let tags = classify_trade(trade, classify, config);

    TradeScore {
        trade: trade.clone(),
        signals,
        total,
        is_alert,
        tags,
        approximate: state.map(|s| s.approximate).unwrap_or(false),
    }
}

/// Σ score·weight / 100, rounded to the nearest integer.
pub fn weighted_total(signals: &[SignalScore]) -> u32 {
    let sum: u32 = signals.iter().map(|s| s.score * s.weight).sum();
    (sum + 50) / 100
}

/// Attach behavioral tags to a trade.
pub fn classify_trade(
    trade: &Trade,
    ctx: ClassifyContext,
    config: &ScoringConfig,
) -> Vec<BehaviorTag> {
    let mut tags = Vec::new();
    let value_usd = polymarket_core::types::fixed::to_f64(trade.value_usd);
    let price = polymarket_core::types::fixed::to_f64(trade.avg_price);

    if value_usd >= config.whale_usd {
        tags.push(BehaviorTag::Whale);
    }

    if let Some(created_at) = ctx.market_created_at {
        if trade.timestamp - created_at <= config.sniper_window_secs
            && trade.timestamp >= created_at
        {
            tags.push(BehaviorTag::Sniper);
        }
    }

    let extreme_price = (price - 0.5).abs() >= config.early_mover_price;
    if ctx.market_rank.is_some_and(|rank| rank < config.early_mover_rank) || extreme_price {
        tags.push(BehaviorTag::EarlyMover);
    }

    if trade.side == Side::Sell
        && ctx.has_position
        && price <= config.dumping_price
        && value_usd >= config.min_trade_usd
    {
        tags.push(BehaviorTag::Dumping);
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalDetails;
    use polymarket_core::types::{fixed, Fill, FillRole, OutcomeSide};

    fn trade(side: Side, value_usd: i64, avg_price: i64, timestamp: i64) -> Trade {
        Trade {
            transaction_hash: "0xtx".into(),
            condition_id: "cond".into(),
            token_id: "tok".into(),
            wallet: "0xw".into(),
            side,
            outcome: OutcomeSide::Yes,
            role: FillRole::Taker,
            size: 1_000_000_000,
            avg_price,
            value_usd,
            timestamp,
            fills: Vec::<Fill>::new(),
            had_complementary_fills: false,
            complementary_value: 0,
        }
    }

    fn signal(name: &'static str, score: u32, weight: u32) -> SignalScore {
        SignalScore {
            name,
            score,
            weight,
            details: SignalDetails::Conviction {
                concentration: None,
                reason: None,
            },
        }
    }

    #[test]
    fn test_weighted_total() {
        let signals = vec![
            signal("size", 80, 40),
            signal("account", 100, 35),
            signal("conviction", 40, 25),
        ];
        // 32 + 35 + 10 = 77
        assert_eq!(weighted_total(&signals), 77);
    }

    #[test]
    fn test_weighted_total_rounds() {
        let signals = vec![signal("size", 33, 40), signal("account", 0, 35)];
        // 13.2 rounds to 13
        assert_eq!(weighted_total(&signals), 13);
        let signals = vec![signal("size", 34, 40)];
        // 13.6 rounds to 14
        assert_eq!(weighted_total(&signals), 14);
    }

    #[test]
    fn test_alert_threshold() {
        let config = ScoringConfig::default();
        let t = trade(Side::Buy, fixed::from_f64(50_000.0), 500_000, 1_700_000_000);
        let scored = evaluate_trade(
            &t,
            &HistoryLookup::Missing,
            None,
            None,
            ClassifyContext::default(),
            &config,
        );
        // size 75, account 100, conviction 100 → 30 + 35 + 25 = 90
        assert_eq!(scored.total, 90);
        assert!(scored.is_alert);
    }

    #[test]
    fn test_whale_tag() {
        let config = ScoringConfig::default();
        let t = trade(Side::Buy, fixed::from_f64(15_000.0), 500_000, 1_700_000_000);
        let tags = classify_trade(&t, ClassifyContext::default(), &config);
        assert!(tags.contains(&BehaviorTag::Whale));
    }

    #[test]
    fn test_sniper_tag_needs_known_creation() {
        let config = ScoringConfig::default();
        let t = trade(Side::Buy, fixed::from_f64(1_000.0), 500_000, 1_700_010_000);

        let fresh = ClassifyContext {
            market_created_at: Some(1_700_000_000),
            ..Default::default()
        };
        assert!(classify_trade(&t, fresh, &config).contains(&BehaviorTag::Sniper));

        let old = ClassifyContext {
            market_created_at: Some(1_700_010_000 - 2 * 86_400),
            ..Default::default()
        };
        assert!(!classify_trade(&t, old, &config).contains(&BehaviorTag::Sniper));

        // Unknown creation time: never guessed.
        assert!(
            !classify_trade(&t, ClassifyContext::default(), &config)
                .contains(&BehaviorTag::Sniper)
        );
    }

    #[test]
    fn test_early_mover_by_rank_or_extreme_price() {
        let config = ScoringConfig::default();

        let t = trade(Side::Buy, fixed::from_f64(1_000.0), 500_000, 1_700_000_000);
        let early = ClassifyContext {
            market_rank: Some(3),
            ..Default::default()
        };
        assert!(classify_trade(&t, early, &config).contains(&BehaviorTag::EarlyMover));

        let late = ClassifyContext {
            market_rank: Some(500),
            ..Default::default()
        };
        assert!(!classify_trade(&t, late, &config).contains(&BehaviorTag::EarlyMover));

        // Price far from 0.5 counts even without rank data.
        let extreme = trade(Side::Buy, fixed::from_f64(1_000.0), 50_000, 1_700_000_000);
        assert!(
            classify_trade(&extreme, ClassifyContext::default(), &config)
                .contains(&BehaviorTag::EarlyMover)
        );
    }

    #[test]
    fn test_dumping_needs_position_low_price_and_size() {
        let config = ScoringConfig::default();
        let with_position = ClassifyContext {
            has_position: true,
            ..Default::default()
        };

        let dump = trade(Side::Sell, fixed::from_f64(2_000.0), 200_000, 1_700_000_000);
        assert!(classify_trade(&dump, with_position, &config).contains(&BehaviorTag::Dumping));

        // A buy, or no position, or a healthy price is not dumping.
        let buy = trade(Side::Buy, fixed::from_f64(2_000.0), 200_000, 1_700_000_000);
        assert!(!classify_trade(&buy, with_position, &config).contains(&BehaviorTag::Dumping));
        assert!(
            !classify_trade(&dump, ClassifyContext::default(), &config)
                .contains(&BehaviorTag::Dumping)
        );
        let healthy = trade(Side::Sell, fixed::from_f64(2_000.0), 600_000, 1_700_000_000);
        assert!(
            !classify_trade(&healthy, with_position, &config).contains(&BehaviorTag::Dumping)
        );
    }
}
