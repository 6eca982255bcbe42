//! Foreground monitoring of a single account.

use anyhow::Result;
use clap::Args;
use position_guard_core::AppConfig;
use position_guard_orchestrator::{AccountDeps, AccountRegistry, AccountState, StartOptions};
use std::time::Duration;
use tracing::{info, warn};

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Account (credential) id to monitor
    #[arg(short, long)]
    pub account: String,

    /// Skip the venue feeds; only useful together with a forwarder
    #[arg(long)]
    pub no_feeds: bool,

    /// Seconds between status lines
    #[arg(long, default_value = "30")]
    pub status_interval_secs: u64,
}

/// Starts the account and logs its status until Ctrl+C.
///
/// # Errors
/// Returns an error if the collaborator clients cannot be built or the
/// actor stops responding.
pub async fn run_account(args: RunArgs, config: AppConfig) -> Result<()> {
    let deps = AccountDeps::from_config(&config)?;
    let registry = AccountRegistry::new(deps);
    let handle = registry.get_or_spawn(&args.account).await;

    handle
        .start(StartOptions {
            feeds: !args.no_feeds,
        })
        .await?;
    info!("Monitoring account {} (Ctrl+C to stop)", args.account);

    let mut status_tick = tokio::time::interval(Duration::from_secs(args.status_interval_secs.max(1)));
    status_tick.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = status_tick.tick() => {
                let status = handle.get_status().await?;
                if status.state == AccountState::Error {
                    warn!(
                        "Account {} in error state: {}",
                        status.account_id,
                        status.last_error.as_deref().unwrap_or("unknown")
                    );
                }
                info!(
                    "Account {} {:?}: {} strategies, private feed {}, public feed {} ({} subscriptions), {} in flight, {} completed, {} failed",
                    status.account_id,
                    status.state,
                    status.strategies,
                    status.feeds.private_connected,
                    status.feeds.public_connected,
                    status.feeds.public_subscriptions,
                    status.dispatch.in_flight,
                    status.dispatch.completed,
                    status.dispatch.failed
                );
            }
        }
    }

    handle.stop().await?;
    if handle.latest_status().dispatch.in_flight > 0 {
        info!("Waiting for in-flight actions to finish");
        handle.wait_until_idle().await?;
    }
    registry.shutdown_all().await?;
    Ok(())
}
