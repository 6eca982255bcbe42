use anyhow::Result;
use clap::Args;
use position_guard_core::AppConfig;
use position_guard_orchestrator::{AccountDeps, AccountRegistry, StartOptions};
use position_guard_web_api::ApiServer;
use std::sync::Arc;
use tracing::{error, info};

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Server address; overrides `server.host` and `server.port`
    #[arg(short, long)]
    pub addr: Option<String>,
}

/// Runs the HTTP control surface until Ctrl+C.
///
/// # Errors
/// Returns an error if the collaborator clients cannot be built or the
/// server cannot bind.
pub async fn run_serve(args: ServeArgs, config: AppConfig) -> Result<()> {
    let addr = args.addr.unwrap_or_else(|| config.server.addr());
    info!("Starting web API server on {}", addr);

    let deps = AccountDeps::from_config(&config)?;
    let registry = Arc::new(AccountRegistry::new(deps));

    for account_id in &config.accounts {
        let handle = registry.get_or_spawn(account_id).await;
        match handle.start(StartOptions::default()).await {
            Ok(()) => info!("Auto-started account {}", account_id),
            Err(e) => error!("Failed to start account {}: {}", account_id, e),
        }
    }

    let server = ApiServer::new(registry.clone());
    server.serve(&addr).await?;

    registry.shutdown_all().await?;
    Ok(())
}
