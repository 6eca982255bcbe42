use anyhow::Result;
use clap::Args;
use position_guard_core::AppConfig;
use position_guard_orchestrator::{AccountDeps, AccountRegistry};
use tracing::{info, warn};

/// Arguments for the tick command.
#[derive(Args, Debug)]
pub struct TickArgs {
    /// Account (credential) id to evaluate
    #[arg(short, long)]
    pub account: String,

    /// Restrict the pass to these symbols or instrument ids (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Runs one poll-driven pass and waits for every dispatched action.
///
/// # Errors
/// Returns an error if credentials or strategies cannot be loaded.
pub async fn run_tick(args: TickArgs, config: AppConfig) -> Result<()> {
    let deps = AccountDeps::from_config(&config)?;
    let registry = AccountRegistry::new(deps);
    let handle = registry.get_or_spawn(&args.account).await;

    let only = (!args.symbols.is_empty()).then_some(args.symbols);
    let report = handle.tick(only).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for record in &report.evaluations {
            info!(
                "{} {}: {}",
                record.strategy_id,
                record.symbol,
                serde_json::to_string(&record.decision)?
            );
        }
        for error in &report.errors {
            warn!("{}: {}", error.symbol, error.error);
        }
    }

    if report.dispatched > 0 {
        info!("Waiting for {} dispatched actions", report.dispatched);
        handle.wait_until_idle().await?;
    }

    let status = handle.get_status().await?;
    info!(
        "Tick done: {} completed, {} failed",
        status.dispatch.completed, status.dispatch.failed
    );
    registry.shutdown_all().await?;
    Ok(())
}
