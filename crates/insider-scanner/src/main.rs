//! Insider Scanner CLI
//!
//! Batch market analysis, single-wallet investigation, live monitoring,
//! and store inspection for Polymarket trade data.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use insider_scanner::analyze::{AnalyzeRequest, Analyzer};
use insider_scanner::monitor::Monitor;
use insider_scanner::report;
use polymarket_core::api::{DataApiClient, SubgraphClient};
use polymarket_core::config::Config;
use polymarket_core::db::Store;
use polymarket_core::types::{OutcomeSide, TradeRole};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "scanner", about = "Polymarket insider-activity scanner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a market for suspicious trades.
    Analyze {
        /// Token id of either outcome of the market.
        market: String,
        /// Window start (unix seconds or YYYY-MM-DD).
        #[arg(long)]
        after: Option<String>,
        /// Window end (unix seconds or YYYY-MM-DD).
        #[arg(long)]
        before: Option<String>,
        /// Restrict to one outcome side.
        #[arg(long, value_parser = parse_outcome)]
        outcome: Option<OutcomeSide>,
        /// Which fills of a wallet count: maker, taker, or both.
        #[arg(long, value_parser = parse_role)]
        role: Option<TradeRole>,
        /// Cap on trades scanned.
        #[arg(long)]
        max_trades: Option<usize>,
        /// Alerts reported.
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
    /// Full scoring breakdown for one wallet.
    Investigate {
        wallet: String,
    },
    /// Stream live trades and alert in real time.
    Monitor {
        /// Market slugs to watch; empty watches everything.
        markets: Vec<String>,
        #[arg(long)]
        verbose: bool,
    },
    /// Inspect the local store.
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
}

#[derive(Subcommand)]
enum DbCommand {
    /// Row counts and coverage summary.
    Stats,
    /// Wallets waiting for history backfill.
    Backfill,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "insider_scanner=info,polymarket_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Insider Scanner");

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    let store = Store::open(&config.database.path)
        .await
        .context("failed to open store")?;
    let subgraph = SubgraphClient::new(&config.indexer);
    let data_api = DataApiClient::new(&config.indexer);

    match cli.command {
        Command::Analyze {
            market,
            after,
            before,
            outcome,
            role,
            max_trades,
            top,
        } => {
            let request = AnalyzeRequest {
                token_id: market,
                after: after.as_deref().map(parse_instant).transpose()?,
                before: before.as_deref().map(parse_instant).transpose()?,
                outcome,
                role: role.unwrap_or(config.scoring.default_role.into()),
                max_trades,
                top_n: top,
            };
            let analyzer = Analyzer::new(&store, &subgraph, &data_api, &config);
            let result = analyzer.analyze_market(&request).await?;
            println!("{}", report::render_market_report(&result));
        }
        Command::Investigate { wallet } => {
            let analyzer = Analyzer::new(&store, &subgraph, &data_api, &config);
            let result = analyzer.investigate_wallet(&wallet).await?;
            println!("{}", report::render_wallet_report(&result));
        }
        Command::Monitor { markets, verbose } => {
            config.monitor.verbose |= verbose;
            let mut monitor = Monitor::new(&store, &subgraph, &data_api, &config);
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            monitor.run(markets, shutdown).await?;
        }
        Command::Db { command } => match command {
            DbCommand::Stats => print_stats(&store).await?,
            DbCommand::Backfill => print_backfill(&store).await?,
        },
    }

    store.close().await;
    Ok(())
}

async fn print_stats(store: &Store) -> Result<()> {
    for table in ["fills", "markets", "accounts", "redemptions", "backfill_queue"] {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(store.pool())
            .await?;
        println!("{table:<16} {count}");
    }

    let synced = store.get_synced_tokens(Some(50)).await?;
    if synced.is_empty() {
        println!("\nno tokens synced yet");
        return Ok(());
    }
    println!("\nsync coverage:");
    for (token_id, sync) in synced {
        let bound = |ts: Option<i64>| match ts {
            Some(ts) => ts.to_string(),
            None => "-".to_string(),
        };
        println!(
            "  {:<24} [{}, {}]{}",
            token_id,
            bound(sync.synced_from),
            bound(sync.synced_to),
            if sync.has_complete_history {
                "  complete"
            } else {
                ""
            }
        );
    }
    Ok(())
}

async fn print_backfill(store: &Store) -> Result<()> {
    let entries = store.get_backfill_queue(Some(50)).await?;
    if entries.is_empty() {
        println!("backfill queue is empty");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{:<44} priority {:<6} queued {}",
            entry.wallet,
            entry.priority,
            entry.queued_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// Accept unix seconds or a calendar date.
fn parse_instant(raw: &str) -> Result<i64> {
    if let Ok(ts) = raw.parse::<i64>() {
        return Ok(ts);
    }
    let date = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("expected unix seconds or YYYY-MM-DD, got {raw}"))?;
    Ok(date
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
        .timestamp())
}

fn parse_role(raw: &str) -> std::result::Result<TradeRole, String> {
    raw.parse()
}

fn parse_outcome(raw: &str) -> std::result::Result<OutcomeSide, String> {
    match raw.to_ascii_lowercase().as_str() {
        "yes" => Ok(OutcomeSide::Yes),
        "no" => Ok(OutcomeSide::No),
        other => Err(format!("expected yes or no, got {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_instant() {
        assert_eq!(parse_instant("1700000000").unwrap(), 1_700_000_000);
        assert_eq!(parse_instant("2024-01-01").unwrap(), 1_704_067_200);
        assert!(parse_instant("yesterday").is_err());
    }

    #[test]
    fn test_parse_outcome() {
        assert_eq!(parse_outcome("YES").unwrap(), OutcomeSide::Yes);
        assert_eq!(parse_outcome("no").unwrap(), OutcomeSide::No);
        assert!(parse_outcome("maybe").is_err());
    }
}
