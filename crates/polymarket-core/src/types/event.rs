//! Real-time trade events from the live data stream.

use serde::{Deserialize, Deserializer};

use super::fill::Side;
use super::fixed;
use super::market::OutcomeSide;

/// One trade event as delivered by the live stream.
///
/// The stream is loose about numeric encoding (numbers and decimal strings
/// both occur), so the numeric fields deserialize through flexible helpers
/// into the same 6-dp micro-units the rest of the system uses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvent {
    /// Token id of the traded outcome.
    pub asset: String,
    pub condition_id: String,
    #[serde(default)]
    pub event_slug: String,
    /// Outcome label ("Yes", "Up", ...).
    #[serde(default)]
    pub outcome: String,
    #[serde(deserialize_with = "de_u8_flex")]
    pub outcome_index: u8,
    /// Micro-USD per share.
    #[serde(deserialize_with = "de_units_flex")]
    pub price: i64,
    pub proxy_wallet: String,
    #[serde(deserialize_with = "de_side")]
    pub side: Side,
    /// Micro-shares.
    #[serde(deserialize_with = "de_units_flex")]
    pub size: i64,
    #[serde(default)]
    pub slug: String,
    /// Unix seconds.
    #[serde(deserialize_with = "de_i64_flex")]
    pub timestamp: i64,
    pub transaction_hash: String,
}

impl TradeEvent {
    /// USD value of the event, micro-units.
    pub fn value_usd(&self) -> i64 {
        fixed::value_usd(self.size, self.price)
    }

    pub fn outcome_side(&self) -> OutcomeSide {
        OutcomeSide::from_index(self.outcome_index)
    }
}

fn de_side<'de, D: Deserializer<'de>>(de: D) -> Result<Side, D::Error> {
    let s = String::deserialize(de)?;
    match s.to_ascii_uppercase().as_str() {
        "BUY" => Ok(Side::Buy),
        "SELL" => Ok(Side::Sell),
        other => Err(serde::de::Error::custom(format!("unknown side: {other}"))),
    }
}

/// Accept a whole-unit JSON number or decimal string, yield micro-units.
fn de_units_flex<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    match serde_json::Value::deserialize(de)? {
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(fixed::from_f64)
            .ok_or_else(|| serde::de::Error::custom("numeric field out of range")),
        serde_json::Value::String(s) => fixed::parse_units(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("bad numeric string: {s}"))),
        other => Err(serde::de::Error::custom(format!(
            "expected number or string, got {other}"
        ))),
    }
}

fn de_i64_flex<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    match serde_json::Value::deserialize(de)? {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| serde::de::Error::custom("integer field out of range")),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(|f| f as i64)
            .map_err(|_| serde::de::Error::custom(format!("bad integer string: {s}"))),
        other => Err(serde::de::Error::custom(format!(
            "expected number or string, got {other}"
        ))),
    }
}

fn de_u8_flex<'de, D: Deserializer<'de>>(de: D) -> Result<u8, D::Error> {
    de_i64_flex(de).map(|v| v as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_parses_mixed_numeric_encodings() {
        let raw = r#"{
            "asset": "1234",
            "conditionId": "0xcond",
            "eventSlug": "us-election",
            "outcome": "Yes",
            "outcomeIndex": 0,
            "price": "0.42",
            "proxyWallet": "0xWALLET",
            "side": "BUY",
            "size": 250.5,
            "slug": "will-it-happen",
            "timestamp": "1700000000",
            "transactionHash": "0xtx"
        }"#;

        let event: TradeEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.price, 420_000);
        assert_eq!(event.size, 250_500_000);
        assert_eq!(event.timestamp, 1_700_000_000);
        assert_eq!(event.side, Side::Buy);
        assert_eq!(event.outcome_side(), OutcomeSide::Yes);
        // $0.42 * 250.5 shares
        assert_eq!(event.value_usd(), 105_210_000);
    }

    #[test]
    fn test_event_rejects_unknown_side() {
        let raw = r#"{
            "asset": "1",
            "conditionId": "c",
            "outcomeIndex": 1,
            "price": 0.5,
            "proxyWallet": "0xw",
            "side": "HOLD",
            "size": 1,
            "timestamp": 1,
            "transactionHash": "0xtx"
        }"#;
        assert!(serde_json::from_str::<TradeEvent>(raw).is_err());
    }
}
