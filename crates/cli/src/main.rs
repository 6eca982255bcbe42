use clap::{Parser, Subcommand};
use position_guard_core::ConfigLoader;

mod commands;

use commands::{ForwardArgs, RunArgs, ServeArgs, TickArgs};

#[derive(Parser)]
#[command(name = "position-guard")]
#[command(about = "Position-triggered take-profit, hedge and re-entry for OKX swap accounts", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config/Config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP control surface and auto-start configured accounts
    Serve(ServeArgs),
    /// Monitor one account in the foreground until Ctrl+C
    Run(RunArgs),
    /// Run one poll-driven evaluation pass for an account
    Tick(TickArgs),
    /// Stream venue feed events to a remote account's events endpoint
    Forward(ForwardArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ConfigLoader::load_from(&cli.config)?;

    match cli.command {
        Commands::Serve(args) => commands::run_serve(args, config).await?,
        Commands::Run(args) => commands::run_account(args, config).await?,
        Commands::Tick(args) => commands::run_tick(args, config).await?,
        Commands::Forward(args) => commands::run_forward(args, config).await?,
    }

    Ok(())
}
