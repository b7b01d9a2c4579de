//! Conviction signal: how much of everything this wallet has ever traded
//! is riding on this one trade.

use polymarket_core::config::ScoringConfig;
use polymarket_core::types::{fixed, HistoryLookup};

use super::{SignalContext, SignalDetails, SignalScore, NOT_FETCHED};

pub const NAME: &str = "conviction";

const PLACEHOLDER_SCORE: u32 = 50;

pub fn evaluate(ctx: &SignalContext, config: &ScoringConfig) -> SignalScore {
    // Prior volume before this trade when state is available; lifetime
    // volume otherwise.
    let prior_volume = match (ctx.state, ctx.history) {
        (Some(state), _) => Some(state.volume),
        (None, HistoryLookup::Found(history)) => Some(history.total_volume),
        (None, HistoryLookup::Missing) => Some(0),
        (None, HistoryLookup::Skipped) => None,
    };

    let (score, concentration, reason) = match prior_volume {
        None => (PLACEHOLDER_SCORE, None, Some(NOT_FETCHED)),
        // No prior volume at all: the first trade is maximum concentration.
        Some(0) => (100, None, None),
        Some(prior) => {
            let ratio = fixed::to_f64(ctx.trade.value_usd) / fixed::to_f64(prior);
            ((ratio * 100.0).clamp(0.0, 100.0).round() as u32, Some(ratio), None)
        }
    };

    SignalScore {
        name: NAME,
        score,
        weight: config.conviction_weight,
        details: SignalDetails::Conviction {
            concentration,
            reason,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymarket_core::types::{
        AccountHistory, DataSource, Fill, FillRole, OutcomeSide, Side, Trade, WalletStateAt,
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

    fn history(total_volume: i64) -> HistoryLookup {
        HistoryLookup::Found(AccountHistory {
            wallet: "0xw".into(),
            created_at: None,
            first_trade_at: None,
            last_trade_at: None,
            total_trades: 10,
            total_volume,
            total_profit: 0,
            redemption_payout: 0,
            data_source: DataSource::Subgraph,
        })
    }

    fn evaluate_with(
        value_usd: i64,
        lookup: &HistoryLookup,
        state: Option<&WalletStateAt>,
    ) -> SignalScore {
        let trade = trade(value_usd);
        let ctx = SignalContext {
            trade: &trade,
            history: lookup,
            state,
            impact: None,
        };
        evaluate(&ctx, &ScoringConfig::default())
    }

    #[test]
    fn test_concentration_ratio_maps_linearly() {
        // $1,000 trade, $10,000 prior volume: 10% concentration.
        let score = evaluate_with(1_000_000_000, &history(10_000_000_000), None);
        assert_eq!(score.score, 10);

        // Trade equals the wallet's entire prior volume.
        let all_in = evaluate_with(10_000_000_000, &history(10_000_000_000), None);
        assert_eq!(all_in.score, 100);
    }

    #[test]
    fn test_first_trade_is_maximum_concentration() {
        let score = evaluate_with(500_000_000, &history(0), None);
        assert_eq!(score.score, 100);

        let missing = evaluate_with(500_000_000, &HistoryLookup::Missing, None);
        assert_eq!(missing.score, 100);
    }

    #[test]
    fn test_skipped_lookup_is_a_placeholder() {
        let score = evaluate_with(500_000_000, &HistoryLookup::Skipped, None);
        assert_eq!(score.score, PLACEHOLDER_SCORE);
        match score.details {
            SignalDetails::Conviction { reason, .. } => assert_eq!(reason, Some(NOT_FETCHED)),
            _ => panic!("wrong detail variant"),
        }
    }

    #[test]
    fn test_state_volume_overrides_lifetime() {
        // Lifetime volume is huge, but before this trade the wallet had
        // traded only $1,000: concentration judges the state.
        let state = WalletStateAt {
            wallet: "0xw".into(),
            as_of: 1_700_000_000,
            trade_count: 2,
            volume: 1_000_000_000,
            pnl: 0,
            last_trade_at: None,
            approximate: false,
        };
        let score = evaluate_with(1_000_000_000, &history(1_000_000_000_000), Some(&state));
        assert_eq!(score.score, 100);
    }
}
