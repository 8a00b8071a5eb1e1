/// book-sync command line entry point

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use book_sync::config::{ClientConfig, DEFAULT_TARGET_ORDINAL};
use book_sync::{run_client, ReconnectPolicy};

#[derive(Parser, Debug)]
#[command(name = "book-sync", version, about = "Order book snapshot/delta reconciliation client")]
struct Cli {
    /// Target ordinal to reconcile up to
    target: Option<i64>,

    /// Target ordinal (alternative to the positional argument)
    #[arg(long = "ob-id")]
    ob_id: Option<i64>,

    /// Book depth requested and submitted
    #[arg(long, default_value_t = 100)]
    depth: usize,

    /// REST base URL
    #[arg(long, default_value = "http://localhost:9090")]
    http_url: String,

    /// Delta stream URL
    #[arg(long, default_value = "ws://localhost:9091/delta")]
    ws_url: String,

    /// Price levels retained per side
    #[arg(long, default_value_t = 1000)]
    store_cap: usize,

    /// Reconnect/retry attempts before giving up; 0 retries without limit
    #[arg(long, default_value_t = 10)]
    max_retries: u32,

    /// Initial reconnect backoff in milliseconds
    #[arg(long, default_value_t = 250)]
    backoff_ms: u64,

    /// Seconds of stream silence before reconnecting
    #[arg(long, default_value_t = 10)]
    idle_timeout_secs: u64,

    /// Call POST /start again before each resync snapshot
    #[arg(long)]
    restart_on_resync: bool,
}

impl Cli {
    fn into_config(self) -> Result<ClientConfig> {
        let target = match (self.target, self.ob_id) {
            (Some(a), Some(b)) if a != b => bail!("conflicting targets: {} and --ob-id {}", a, b),
            (Some(t), _) | (None, Some(t)) => t,
            (None, None) => DEFAULT_TARGET_ORDINAL,
        };
        if target < 0 {
            bail!("target ordinal must be non-negative, got {}", target);
        }
        if self.depth == 0 {
            bail!("--depth must be at least 1");
        }

        let defaults = ClientConfig::default();
        Ok(ClientConfig {
            http_url: self.http_url,
            ws_url: self.ws_url,
            target_ordinal: target,
            depth: self.depth,
            store_cap: self.store_cap,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs.max(1)),
            restart_feed_on_resync: self.restart_on_resync,
            reconnect: ReconnectPolicy {
                initial_backoff: Duration::from_millis(self.backoff_ms),
                max_retries: retry_budget(self.max_retries),
                ..defaults.reconnect.clone()
            },
            ..defaults
        })
    }
}

fn retry_budget(max_retries: u32) -> Option<u32> {
    match max_retries {
        0 => None,
        n => Some(n),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "book_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Cli::parse().into_config()?;
    info!(
        target_ordinal = config.target_ordinal,
        depth = config.depth,
        http = %config.http_url,
        ws = %config.ws_url,
        "book-sync v{}",
        env!("CARGO_PKG_VERSION")
    );

    match run_client(config).await {
        Ok(report) => {
            info!(
                ordinal = report.last_update_id,
                bids = report.bid_levels,
                asks = report.ask_levels,
                "order book validation passed"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, "order book validation failed");
            Ok(ExitCode::from(e.exit_code() as u8))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ClientConfig {
        Cli::try_parse_from(std::iter::once("book-sync").chain(args.iter().copied()))
            .unwrap()
            .into_config()
            .unwrap()
    }

    #[test]
    fn test_retries_bounded_by_default() {
        let config = parse(&[]);
        assert_eq!(config.reconnect.max_retries, Some(10));
        assert_eq!(config.target_ordinal, DEFAULT_TARGET_ORDINAL);
        assert_eq!(config.depth, 100);
    }

    #[test]
    fn test_zero_retries_means_unbounded() {
        assert_eq!(parse(&["--max-retries", "0"]).reconnect.max_retries, None);
        assert_eq!(parse(&["--max-retries", "3"]).reconnect.max_retries, Some(3));
    }

    #[test]
    fn test_target_sources() {
        assert_eq!(parse(&["500"]).target_ordinal, 500);
        assert_eq!(parse(&["--ob-id", "42"]).target_ordinal, 42);
        assert!(Cli::try_parse_from(["book-sync", "5", "--ob-id", "6"])
            .unwrap()
            .into_config()
            .is_err());
    }
}
