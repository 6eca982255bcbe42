//! Standalone forwarder: holds the venue connections for one account and
//! relays what it sees to a remote `/api/accounts/{id}/events` endpoint.
//!
//! Useful when the engine runs somewhere that cannot reach the venue's
//! websockets directly.

use anyhow::{Context, Result};
use clap::Args;
use position_guard_core::{inst_id_to_symbol, symbol_to_inst_id, ApiCredentials, AppConfig};
use position_guard_data::EventForwarder;
use position_guard_okx::{FeedConnection, FeedEvent, FeedSettings};
use position_guard_orchestrator::IngestEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Arguments for the forward command.
#[derive(Args, Debug)]
pub struct ForwardArgs {
    /// Account id on the remote engine
    #[arg(short, long)]
    pub account: String,

    /// Base URL of the remote engine, e.g. `http://engine:8080`
    #[arg(long, env = "FORWARD_TARGET")]
    pub target: String,

    /// Bearer token sent with each forwarded batch
    #[arg(long, env = "FORWARD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long, env = "OKX_API_KEY", hide_env_values = true)]
    pub api_key: String,

    #[arg(long, env = "OKX_API_SECRET", hide_env_values = true)]
    pub api_secret: String,

    #[arg(long, env = "OKX_PASSPHRASE", hide_env_values = true)]
    pub passphrase: String,

    /// Symbols whose candle direction is forwarded (comma separated)
    #[arg(long, value_delimiter = ',', default_value = "BTC/USDT:USDT")]
    pub symbols: Vec<String>,
}

/// Translates a feed event into the events the remote account accepts.
/// Flat positions and unmapped instruments are dropped.
pub fn to_ingest_events(event: &FeedEvent) -> Vec<IngestEvent> {
    match event {
        FeedEvent::Positions(positions) => positions
            .iter()
            .filter(|position| !position.is_flat())
            .map(|position| IngestEvent::Position {
                symbol: position.symbol.clone(),
                pos_side: position.pos_side,
                size: position.size,
                upl_ratio: position.upl_ratio,
            })
            .collect(),
        FeedEvent::Candle(update) => inst_id_to_symbol(&update.inst_id)
            .map(|symbol| IngestEvent::Direction {
                symbol,
                candle_dir: update.direction(),
            })
            .into_iter()
            .collect(),
        FeedEvent::Connected { .. }
        | FeedEvent::Disconnected { .. }
        | FeedEvent::Rejected { .. } => Vec::new(),
    }
}

fn events_endpoint(target: &str, account: &str) -> String {
    format!("{}/api/accounts/{}/events", target.trim_end_matches('/'), account)
}

/// Runs both feeds and forwards events until Ctrl+C.
///
/// # Errors
/// Returns an error if no symbol maps to an instrument or the HTTP client
/// cannot be built. Forwarding failures are logged and skipped.
pub async fn run_forward(args: ForwardArgs, config: AppConfig) -> Result<()> {
    let inst_ids: Vec<String> = args
        .symbols
        .iter()
        .filter_map(|symbol| {
            let inst_id = symbol_to_inst_id(symbol);
            if inst_id.is_none() {
                warn!("Unsupported symbol {}, skipping", symbol);
            }
            inst_id
        })
        .collect();
    if inst_ids.is_empty() {
        anyhow::bail!("no supported symbols to subscribe");
    }

    let endpoint = events_endpoint(&args.target, &args.account);
    let forwarder = EventForwarder::new(endpoint.clone(), args.token, config.retry.clone())
        .context("Failed to build forwarding client")?;
    let credentials = Arc::new(ApiCredentials::new(
        args.account.clone(),
        args.api_key,
        args.api_secret,
        args.passphrase,
    ));

    let (tx, mut rx) = mpsc::channel(256);
    let private_feed =
        FeedConnection::spawn_private(FeedSettings::private(&config.okx), credentials, tx.clone());
    let public_feed = FeedConnection::spawn_public(FeedSettings::public(&config.okx), &inst_ids, tx);

    info!(
        "Forwarding account {} feeds for {} instruments to {}",
        args.account,
        inst_ids.len(),
        endpoint
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                match &event {
                    FeedEvent::Connected { kind } => info!("{} feed connected", kind),
                    FeedEvent::Disconnected { kind, reason } => {
                        warn!("{} feed disconnected: {}", kind, reason);
                    }
                    FeedEvent::Rejected { kind, code, message } => {
                        error!("{} feed rejected request: {:?} {:?}", kind, code, message);
                    }
                    _ => {}
                }
                let events = to_ingest_events(&event);
                if events.is_empty() {
                    continue;
                }
                match forwarder.forward(&events).await {
                    Ok(()) => debug!("Forwarded {} events", events.len()),
                    Err(e) => error!("Failed to forward {} events: {}", events.len(), e),
                }
            }
        }
    }

    private_feed.shutdown();
    public_feed.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use position_guard_core::{CandleDirection, CandleUpdate, PosSide, PositionSnapshot};
    use position_guard_okx::FeedKind;
    use rust_decimal_macros::dec;

    #[test]
    fn positions_skip_flat_rows() {
        let event = FeedEvent::Positions(vec![
            PositionSnapshot {
                inst_id: "ETH-USDT-SWAP".to_string(),
                symbol: "ETH/USDT:USDT".to_string(),
                pos_side: PosSide::Short,
                size: dec!(4),
                upl_ratio: -0.12,
                mark_price: Some(dec!(3100)),
            },
            PositionSnapshot::flat("BTC-USDT-SWAP", "BTC/USDT:USDT"),
        ]);

        assert_eq!(
            to_ingest_events(&event),
            vec![IngestEvent::Position {
                symbol: "ETH/USDT:USDT".to_string(),
                pos_side: PosSide::Short,
                size: dec!(4),
                upl_ratio: -0.12,
            }]
        );
    }

    #[test]
    fn candles_become_directions() {
        let event = FeedEvent::Candle(CandleUpdate {
            inst_id: "BTC-USDT-SWAP".to_string(),
            open: dec!(65000),
            close: dec!(64000),
            ts: None,
        });
        assert_eq!(
            to_ingest_events(&event),
            vec![IngestEvent::Direction {
                symbol: "BTC/USDT:USDT".to_string(),
                candle_dir: CandleDirection::Down,
            }]
        );

        let unmapped = FeedEvent::Candle(CandleUpdate {
            inst_id: "BTC-USD-240628".to_string(),
            open: dec!(1),
            close: dec!(2),
            ts: None,
        });
        assert!(to_ingest_events(&unmapped).is_empty());
        assert!(to_ingest_events(&FeedEvent::Connected {
            kind: FeedKind::Public
        })
        .is_empty());
    }

    #[test]
    fn endpoint_joins_account_path() {
        assert_eq!(
            events_endpoint("http://engine:8080/", "acc-1"),
            "http://engine:8080/api/accounts/acc-1/events"
        );
    }
}
