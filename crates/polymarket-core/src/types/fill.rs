//! Raw fill records as reported by the indexer.

use serde::{Deserialize, Serialize};

use super::fixed;

/// Order side. On a raw [`Fill`] this is the maker's action; the taker's
/// action is always the inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The counterparty's side of the same fill.
    pub fn invert(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// The role a wallet played in a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillRole {
    Maker,
    Taker,
}

impl FillRole {
    pub fn as_str(self) -> &'static str {
        match self {
            FillRole::Maker => "maker",
            FillRole::Taker => "taker",
        }
    }
}

/// Which fills of a wallet a query should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TradeRole {
    Maker,
    Taker,
    #[default]
    Both,
}

impl std::str::FromStr for TradeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "maker" => Ok(TradeRole::Maker),
            "taker" => Ok(TradeRole::Taker),
            "both" => Ok(TradeRole::Both),
            other => Err(format!("unknown trade role: {other}")),
        }
    }
}

/// A single atomic match event between a maker order and a taker order.
///
/// Created on first observation from the indexer, never mutated, never
/// deleted. Sizes and prices are 6-dp micro-units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// Globally unique fill id.
    pub id: String,
    pub transaction_hash: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub order_hash: String,
    /// The maker's action.
    pub side: Side,
    /// Shares, micro-units. Always > 0.
    pub size: i64,
    /// USD per share, micro-units, in [0, 1_000_000].
    pub price: i64,
    pub maker: String,
    pub taker: String,
    pub token_id: String,
}

impl Fill {
    /// USD value of this fill in micro-units.
    pub fn value_usd(&self) -> i64 {
        fixed::value_usd(self.size, self.price)
    }

    /// The role `wallet` played in this fill, matched case-insensitively.
    /// `None` when the wallet is neither party.
    pub fn role_of(&self, wallet: &str) -> Option<FillRole> {
        if self.maker.eq_ignore_ascii_case(wallet) {
            Some(FillRole::Maker)
        } else if self.taker.eq_ignore_ascii_case(wallet) {
            Some(FillRole::Taker)
        } else {
            None
        }
    }

    /// The side from the perspective of the wallet in `role`. The reported
    /// `side` field is the maker's action; the taker did the opposite.
    pub fn side_for(&self, role: FillRole) -> Side {
        match role {
            FillRole::Maker => self.side,
            FillRole::Taker => self.side.invert(),
        }
    }

    /// Whether `wallet` appears in this fill under the requested role
    /// filter.
    pub fn involves(&self, wallet: &str, role: TradeRole) -> bool {
        match role {
            TradeRole::Maker => self.maker.eq_ignore_ascii_case(wallet),
            TradeRole::Taker => self.taker.eq_ignore_ascii_case(wallet),
            TradeRole::Both => self.role_of(wallet).is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill() -> Fill {
        Fill {
            id: "f1".into(),
            transaction_hash: "0xabc".into(),
            timestamp: 1_700_000_000,
            order_hash: "0xdef".into(),
            side: Side::Sell,
            size: 1_000_000_000,
            price: 100_000,
            maker: "0xAAAA".into(),
            taker: "0xBBBB".into(),
            token_id: "tok-yes".into(),
        }
    }

    #[test]
    fn test_role_detection_is_case_insensitive() {
        let f = fill();
        assert_eq!(f.role_of("0xaaaa"), Some(FillRole::Maker));
        assert_eq!(f.role_of("0xBbBb"), Some(FillRole::Taker));
        assert_eq!(f.role_of("0xcccc"), None);
    }

    #[test]
    fn test_taker_side_is_inverted() {
        let f = fill();
        // Reported side is the maker's action: maker sold, so taker bought.
        assert_eq!(f.side_for(FillRole::Maker), Side::Sell);
        assert_eq!(f.side_for(FillRole::Taker), Side::Buy);
    }

    #[test]
    fn test_fill_value() {
        // 1000 shares at $0.10
        assert_eq!(fill().value_usd(), 100_000_000);
    }
}
