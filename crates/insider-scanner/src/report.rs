//! Plain-text report rendering for analysis results.

use polymarket_core::types::{fixed, HistoryLookup};

use crate::analyze::{AnalyzeReport, WalletReport};
use crate::score::TradeScore;
use crate::signals::SignalDetails;

/// Render a market analysis report.
pub fn render_market_report(report: &AnalyzeReport) -> String {
    let mut out = String::new();

    out.push_str("=== Market Analysis ===\n");
    out.push_str(&format!(
        "Scanned: {} trades across {} wallets ({} candidates)\n",
        report.scanned_trades, report.scanned_wallets, report.candidate_wallets
    ));
    out.push_str(&format!(
        "History sources: cache={} subgraph={} subgraph-trades={} data-api={} missing={}\n",
        report.sources.cache,
        report.sources.subgraph,
        report.sources.subgraph_trades,
        report.sources.data_api,
        report.sources.missing
    ));
    if report.degraded {
        out.push_str("NOTE: some fill ranges could not be fetched; results use cached coverage\n");
    }
    out.push('\n');

    if report.alerts.is_empty() {
        out.push_str("No alerts.\n");
    }
    for (index, alert) in report.alerts.iter().enumerate() {
        out.push_str(&format!("--- Alert #{} ---\n", index + 1));
        render_trade(&mut out, alert);
        out.push('\n');
    }

    out
}

/// Render a single-wallet investigation.
pub fn render_wallet_report(report: &WalletReport) -> String {
    let mut out = String::new();

    out.push_str("=== Wallet Investigation ===\n");
    out.push_str(&format!("Wallet: {}\n", report.wallet));
    match &report.history {
        HistoryLookup::Found(history) => {
            out.push_str(&format!(
                "History: {} trades, ${:.2} volume, ${:.2} combined profit ({})\n",
                history.total_trades,
                fixed::to_decimal(history.total_volume),
                fixed::to_decimal(history.combined_profit()),
                history.data_source.as_str()
            ));
        }
        HistoryLookup::Missing => out.push_str("History: no record on either data plane\n"),
        HistoryLookup::Skipped => out.push_str("History: not fetched\n"),
    }
    out.push_str(&format!("Trades: {}\n\n", report.trades.len()));

    for scored in &report.trades {
        render_trade(&mut out, scored);
        out.push('\n');
    }

    out
}

fn render_trade(out: &mut String, scored: &TradeScore) {
    let trade = &scored.trade;
    out.push_str(&format!(
        "{} {} ${:.2} @ {:.4} | {} | tx {}\n",
        trade.side.as_str(),
        trade.outcome.as_str(),
        trade.value_usd_decimal(),
        trade.avg_price_decimal(),
        trade.wallet,
        trade.transaction_hash
    ));
    out.push_str(&format!(
        "  Score: {} / 100{}{}\n",
        scored.total,
        if scored.is_alert { "  [ALERT]" } else { "" },
        if scored.approximate { "  (approximate)" } else { "" }
    ));

    if !scored.tags.is_empty() {
        let tags: Vec<String> = scored.tags.iter().map(|t| format!("{t:?}")).collect();
        out.push_str(&format!("  Tags: {}\n", tags.join(", ")));
    }
    if trade.had_complementary_fills {
        out.push_str(&format!(
            "  Complementary fills discarded: ${:.2}\n",
            fixed::to_decimal(trade.complementary_value)
        ));
    }

    for signal in &scored.signals {
        out.push_str(&format!(
            "  {:<12} {:>3} (weight {})",
            signal.name, signal.score, signal.weight
        ));
        match &signal.details {
            SignalDetails::Size {
                magnitude_score,
                impact_score,
                ..
            } => {
                out.push_str(&format!(" magnitude={magnitude_score}"));
                if let Some(impact) = impact_score {
                    out.push_str(&format!(" impact={impact}"));
                }
            }
            SignalDetails::Account {
                trade_count,
                age_days,
                dormancy_days,
                reason,
                ..
            } => {
                if let Some(reason) = reason {
                    out.push_str(&format!(" ({reason})"));
                } else {
                    if let Some(count) = trade_count {
                        out.push_str(&format!(" trades={count}"));
                    }
                    if let Some(age) = age_days {
                        out.push_str(&format!(" age={age:.1}d"));
                    }
                    if let Some(dormancy) = dormancy_days {
                        out.push_str(&format!(" dormant={dormancy:.1}d"));
                    }
                }
            }
            SignalDetails::Conviction {
                concentration,
                reason,
            } => {
                if let Some(reason) = reason {
                    out.push_str(&format!(" ({reason})"));
                } else if let Some(ratio) = concentration {
                    out.push_str(&format!(" concentration={:.0}%", ratio * 100.0));
                }
            }
        }
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::SourceDistribution;
    use crate::score::BehaviorTag;
    use crate::signals::SignalScore;
    use polymarket_core::types::{Fill, FillRole, OutcomeSide, Side, Trade};

    fn scored_trade() -> TradeScore {
        TradeScore {
            trade: Trade {
                transaction_hash: "0xtx".into(),
                condition_id: "cond".into(),
                token_id: "tok".into(),
                wallet: "0xwallet".into(),
                side: Side::Buy,
                outcome: OutcomeSide::Yes,
                role: FillRole::Taker,
                size: 10_000_000_000,
                avg_price: 150_000,
                value_usd: 1_500_000_000,
                timestamp: 1_700_000_000,
                fills: Vec::<Fill>::new(),
                had_complementary_fills: true,
                complementary_value: 250_000_000,
            },
            signals: vec![SignalScore {
                name: "size",
                score: 45,
                weight: 40,
                details: SignalDetails::Size {
                    value_usd: 1_500.0,
                    magnitude_score: 45,
                    impact_score: None,
                    price_change_pct: None,
                },
            }],
            total: 78,
            is_alert: true,
            tags: vec![BehaviorTag::Whale],
            approximate: true,
        }
    }

    #[test]
    fn test_market_report_renders_alerts() {
        let report = AnalyzeReport {
            alerts: vec![scored_trade()],
            scanned_trades: 120,
            scanned_wallets: 40,
            candidate_wallets: 6,
            sources: SourceDistribution::default(),
            degraded: false,
        };
        let text = render_market_report(&report);

        assert!(text.contains("120 trades across 40 wallets"));
        assert!(text.contains("BUY YES $1500.00 @ 0.1500"));
        assert!(text.contains("[ALERT]"));
        assert!(text.contains("(approximate)"));
        assert!(text.contains("Whale"));
        assert!(text.contains("Complementary fills discarded: $250.00"));
    }

    #[test]
    fn test_empty_report_says_so() {
        let report = AnalyzeReport {
            alerts: Vec::new(),
            scanned_trades: 0,
            scanned_wallets: 0,
            candidate_wallets: 0,
            sources: SourceDistribution::default(),
            degraded: true,
        };
        let text = render_market_report(&report);
        assert!(text.contains("No alerts."));
        assert!(text.contains("cached coverage"));
    }
}
