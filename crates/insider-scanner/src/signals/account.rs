//! Account-history signal: new, young, dormant, or suspiciously profitable
//! wallets score high; established traders score low.

use polymarket_core::config::ScoringConfig;
use polymarket_core::types::{fixed, AccountHistory, HistoryLookup, WalletStateAt};

use super::{SignalContext, SignalDetails, SignalScore, NOT_FETCHED};

pub const NAME: &str = "account";

/// Placeholder emitted when the lookup was skipped (quick-scoring phase).
const PLACEHOLDER_SCORE: u32 = 50;

/// Each of the three main components tops out at a third of the scale.
const COMPONENT_MAX: f64 = 33.0;

/// Window in which positive profit on a young account adds to the score,
/// days.
const NEW_ACCOUNT_PROFIT_WINDOW_DAYS: f64 = 30.0;

pub fn evaluate(ctx: &SignalContext, config: &ScoringConfig) -> SignalScore {
    let (score, details) = match ctx.history {
        HistoryLookup::Skipped => (
            PLACEHOLDER_SCORE,
            SignalDetails::Account {
                trade_count: None,
                trade_count_score: 0,
                age_days: None,
                age_score: 0,
                dormancy_days: None,
                dormancy_score: 0,
                profit_score: 0,
                reason: Some(NOT_FETCHED),
            },
        ),
        // The lookup ran and found nothing: the wallet has no recorded
        // past at all, the strongest possible new-account signal.
        HistoryLookup::Missing => (
            100,
            SignalDetails::Account {
                trade_count: Some(0),
                trade_count_score: COMPONENT_MAX as u32,
                age_days: Some(0.0),
                age_score: COMPONENT_MAX as u32,
                dormancy_days: None,
                dormancy_score: 0,
                profit_score: 0,
                reason: None,
            },
        ),
        HistoryLookup::Found(history) => scored(ctx, history),
    };

    SignalScore {
        name: NAME,
        score,
        weight: config.account_weight,
        details,
    }
}

fn scored(ctx: &SignalContext, history: &AccountHistory) -> (u32, SignalDetails) {
    let at = ctx.trade.timestamp;

    // Point-in-time state describes the wallet before this very trade;
    // lifetime aggregates are the fallback.
    let trade_count = match ctx.state {
        Some(state) => state.trade_count,
        None => history.total_trades,
    };
    let count_score = trade_count_score(trade_count);

    let age_days = history
        .origin()
        .map(|origin| ((at - origin).max(0)) as f64 / 86_400.0);
    let age_score = age_days.map_or(0.0, age_component);

    let dormancy_days = dormancy_days(ctx.state, history, at);
    let dormancy_score = dormancy_days.map_or(0.0, dormancy_component);

    let profit_score = profit_component(age_days, fixed::to_f64(history.combined_profit()));

    let total = (count_score + age_score + dormancy_score + profit_score).min(100.0);
    (
        total.round() as u32,
        SignalDetails::Account {
            trade_count: Some(trade_count),
            trade_count_score: count_score.round() as u32,
            age_days,
            age_score: age_score.round() as u32,
            dormancy_days,
            dormancy_score: dormancy_score.round() as u32,
            profit_score: profit_score.round() as u32,
            reason: None,
        },
    )
}

/// Monotonically non-increasing in the trade count: a wallet's first few
/// trades are the interesting ones, fifty trades is an established
/// trader.
pub fn trade_count_score(count: i64) -> f64 {
    match count {
        i64::MIN..=1 => 33.0,
        2 => 30.0,
        3 => 28.0,
        4 => 26.0,
        5 => 25.0,
        n @ 6..=49 => 23.0 * (50 - n) as f64 / 44.0,
        _ => 0.0,
    }
}

/// 33 at zero days, linear to zero at one year.
fn age_component(age_days: f64) -> f64 {
    (COMPONENT_MAX * (1.0 - age_days / 365.0)).clamp(0.0, COMPONENT_MAX)
}

/// Saturates near the max around a hundred days of silence.
fn dormancy_component(dormancy_days: f64) -> f64 {
    (COMPONENT_MAX * (dormancy_days / 100.0)).clamp(0.0, COMPONENT_MAX)
}

/// Positive profit on a young account only; zero otherwise.
fn profit_component(age_days: Option<f64>, profit_usd: f64) -> f64 {
    match age_days {
        Some(age) if age <= NEW_ACCOUNT_PROFIT_WINDOW_DAYS && profit_usd > 0.0 => {
            (12.5 * (profit_usd / 100.0).log10()).clamp(0.0, 25.0)
        }
        _ => 0.0,
    }
}

/// Dormancy comes from point-in-time state when available, so a later
/// last-trade date in the global history cannot mask a gap before this
/// trade. Never negative; a first trade has no dormancy.
fn dormancy_days(
    state: Option<&WalletStateAt>,
    history: &AccountHistory,
    at: i64,
) -> Option<f64> {
    match state {
        Some(state) => Some(state.dormancy_days(at)),
        None => history
            .last_trade_at
            .map(|last| ((at - last).max(0)) as f64 / 86_400.0),
    }
}
