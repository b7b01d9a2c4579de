//! Fill aggregation: reconstructing per-wallet per-transaction trades from
//! raw maker/taker fill records.
//!
//! A single chain transaction routinely produces several fills for one
//! wallet, including artifacts of order-book cross-matching: the wallet
//! showing up in both roles on one token, or on both outcome tokens of the
//! same condition. Aggregation folds each (transaction, condition) group
//! down to the wallet's actual intent.

use std::collections::HashMap;

use polymarket_core::types::{
    fixed, Fill, FillRole, MarketToken, Position, Side, Trade,
};
use tracing::warn;

/// Everything the aggregator needs for one wallet.
///
/// Aggregation is a pure function of this input: same input, same output.
pub struct AggregateInput<'a> {
    pub wallet: &'a str,
    pub fills: &'a [Fill],
    /// token-id → metadata, covering (ideally) every token in `fills`.
    pub tokens: &'a HashMap<String, MarketToken>,
    /// The wallet's current positions, when the caller has them. Used to
    /// break complementary-side ties.
    pub positions: Option<&'a [Position]>,
}

/// Aggregation result. `unmapped_fills` are the wallet's fills whose token
/// was missing from the map; no trade can be reconstructed for them, but
/// callers deriving volume still count them.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub trades: Vec<Trade>,
    pub unmapped_fills: Vec<Fill>,
}

/// Reconstruct the wallet's trades, newest first.
pub fn aggregate(input: &AggregateInput) -> Aggregation {
    let mut by_tx: HashMap<&str, Vec<&Fill>> = HashMap::new();
    for fill in input.fills {
        if fill.role_of(input.wallet).is_some() {
            by_tx.entry(&fill.transaction_hash).or_default().push(fill);
        }
    }

    let mut result = Aggregation::default();
    for fills in by_tx.into_values() {
        aggregate_transaction(input, &fills, &mut result);
    }

    result.trades.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.transaction_hash.cmp(&b.transaction_hash))
    });
    result
}

/// One transaction: bucket by condition, dedup roles, pick the kept
/// outcome side, and fold the survivors into trades.
fn aggregate_transaction(input: &AggregateInput, fills: &[&Fill], result: &mut Aggregation) {
    let mut by_condition: HashMap<&str, Vec<&Fill>> = HashMap::new();
    for fill in fills {
        match input.tokens.get(&fill.token_id) {
            Some(token) => by_condition
                .entry(token.condition_id.as_str())
                .or_default()
                .push(*fill),
            None => {
                warn!(
                    token_id = %fill.token_id,
                    tx = %fill.transaction_hash,
                    "fill references unknown token; skipping its group"
                );
                result.unmapped_fills.push((*fill).clone());
            }
        }
    }

    for (condition_id, condition_fills) in by_condition {
        if let Some(trade) = aggregate_condition(input, condition_id, &condition_fills) {
            result.trades.push(trade);
        }
    }
}

fn aggregate_condition(
    input: &AggregateInput,
    condition_id: &str,
    fills: &[&Fill],
) -> Option<Trade> {
    // Same-transaction role deduplication, per token: a wallet appearing as
    // both maker and taker on one token in one transaction is a
    // cross-matching artifact. The role with the higher aggregate value is
    // the wallet's own order.
    let mut by_token: HashMap<&str, Vec<&Fill>> = HashMap::new();
    for fill in fills {
        by_token.entry(fill.token_id.as_str()).or_default().push(*fill);
    }

    let mut sides: Vec<TokenGroup> = Vec::with_capacity(2);
    for (token_id, token_fills) in by_token {
        let token = input.tokens.get(token_id)?;
        sides.push(dedup_roles(input.wallet, token, &token_fills));
    }

    // Complementary-side selection: both outcome tokens of one condition
    // traded in one transaction means one side is a routing artifact.
    let (kept, complementary_value, had_complementary) = match sides.len() {
        1 => (sides.pop().unwrap(), 0, false),
        _ => {
            sides.sort_by_key(|group| group.token.outcome_index);
            let decided = pick_side(input, sides);
            (decided.0, decided.1, true)
        }
    };

    build_trade(input.wallet, condition_id, kept, complementary_value, had_complementary)
}

/// A wallet's fills on one token in one transaction, reduced to a single
/// role.
struct TokenGroup<'a> {
    token: &'a MarketToken,
    role: FillRole,
    fills: Vec<&'a Fill>,
}

impl TokenGroup<'_> {
    fn total_value(&self) -> i64 {
        self.fills.iter().map(|f| f.value_usd()).sum()
    }
}

fn dedup_roles<'a>(wallet: &str, token: &'a MarketToken, fills: &[&'a Fill]) -> TokenGroup<'a> {
    let mut maker: Vec<&Fill> = Vec::new();
    let mut taker: Vec<&Fill> = Vec::new();
    for fill in fills {
        match fill.role_of(wallet) {
            Some(FillRole::Maker) => maker.push(*fill),
            Some(FillRole::Taker) => taker.push(*fill),
            None => {}
        }
    }

    let maker_value: i64 = maker.iter().map(|f| f.value_usd()).sum();
    let taker_value: i64 = taker.iter().map(|f| f.value_usd()).sum();

    if taker.is_empty() || (!maker.is_empty() && maker_value >= taker_value) {
        TokenGroup {
            token,
            role: FillRole::Maker,
            fills: maker,
        }
    } else {
        TokenGroup {
            token,
            role: FillRole::Taker,
            fills: taker,
        }
    }
}

/// Choose which outcome side of a condition to keep. Returns the kept
/// group and the discarded side's value.
fn pick_side<'a>(
    input: &AggregateInput,
    mut sides: Vec<TokenGroup<'a>>,
) -> (TokenGroup<'a>, i64) {
    debug_assert_eq!(sides.len(), 2);

    // Rule (a): an existing position on exactly one side marks that side
    // as the wallet's own market.
    if let Some(positions) = input.positions {
        let holds = |group: &TokenGroup| {
            positions
                .iter()
                .any(|p| p.token_id == group.token.token_id && p.net_quantity != 0)
        };
        let held: Vec<bool> = sides.iter().map(holds).collect();
        if held[0] != held[1] {
            let keep = if held[0] { 0 } else { 1 };
            let dropped = sides.remove(1 - keep);
            let kept = sides.pop().unwrap();
            return (kept, dropped.total_value());
        }
    }

    // Rule (b): maker on one side, taker on the other. The maker side is
    // the wallet's resting order; the taker appearance on the opposite
    // token is order routing.
    if sides[0].role != sides[1].role {
        let keep = if sides[0].role == FillRole::Maker { 0 } else { 1 };
        let dropped = sides.remove(1 - keep);
        let kept = sides.pop().unwrap();
        return (kept, dropped.total_value());
    }

    // Rule (c): higher total USD value wins.
    let keep = if sides[0].total_value() >= sides[1].total_value() {
        0
    } else {
        1
    };
    let dropped = sides.remove(1 - keep);
    let kept = sides.pop().unwrap();
    (kept, dropped.total_value())
}

fn build_trade(
    wallet: &str,
    condition_id: &str,
    group: TokenGroup,
    mut complementary_value: i64,
    mut had_complementary: bool,
) -> Option<Trade> {
    // The kept fills must agree on the wallet's side; when a mix survives,
    // the higher-value sub-side wins and the rest folds into complementary.
    let mut buys: Vec<&Fill> = Vec::new();
    let mut sells: Vec<&Fill> = Vec::new();
    for fill in &group.fills {
        match fill.side_for(group.role) {
            Side::Buy => buys.push(*fill),
            Side::Sell => sells.push(*fill),
        }
    }
    let buy_value: i64 = buys.iter().map(|f| f.value_usd()).sum();
    let sell_value: i64 = sells.iter().map(|f| f.value_usd()).sum();

    let (side, kept_fills) = if sells.is_empty() || (!buys.is_empty() && buy_value >= sell_value) {
        if sell_value > 0 {
            had_complementary = true;
            complementary_value += sell_value;
        }
        (Side::Buy, buys)
    } else {
        if buy_value > 0 {
            had_complementary = true;
            complementary_value += buy_value;
        }
        (Side::Sell, sells)
    };

    if kept_fills.is_empty() {
        return None;
    }

    let size: i64 = kept_fills.iter().map(|f| f.size).sum();
    let value_usd: i64 = kept_fills.iter().map(|f| f.value_usd()).sum();
    let timestamp = kept_fills.iter().map(|f| f.timestamp).min()?;
    let avg_price = if size > 0 {
        ((value_usd as i128 * fixed::SCALE as i128) / size as i128) as i64
    } else {
        0
    };

    Some(Trade {
        transaction_hash: kept_fills[0].transaction_hash.clone(),
        condition_id: condition_id.to_string(),
        token_id: group.token.token_id.clone(),
        wallet: wallet.to_lowercase(),
        side,
        outcome: group.token.outcome_side(),
        role: group.role,
        size,
        avg_price,
        value_usd,
        timestamp,
        fills: kept_fills.into_iter().cloned().collect(),
        had_complementary_fills: had_complementary,
        complementary_value,
    })
}
