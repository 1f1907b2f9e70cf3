use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use crate::agent::HeartbeatAgent;
use crate::agent::gpu::{self, NvidiaSmiProbe};
use crate::agent::sink::{StatusSender, status_channel};
use crate::auth::{self, StoredCredentials};
use crate::config::Config;
use crate::console;
use crate::server;
use crate::util::logging::init_logging;

#[derive(Parser)]
#[command(name = "aichain-helper")]
#[command(version, long_about = None)]
#[command(about = "Reports liveness and GPU inventory to the aichain launchpad")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save the API key and wallet used for heartbeats
    Login {
        #[arg(long = "api-key")]
        api_key: String,
        #[arg(long)]
        wallet: String,
    },

    /// Remove the stored API key and wallet
    Logout,

    /// Send heartbeats until interrupted (Ctrl-C)
    Run {
        /// Save this API key before starting
        #[arg(long = "api-key")]
        api_key: Option<String>,
        /// Save this wallet before starting
        #[arg(long)]
        wallet: Option<String>,
    },

    /// Interactive session: start/stop the heartbeat from stdin
    Console,

    /// List the GPUs that would be reported
    Gpus,

    /// Show the account the stored API key belongs to
    Whoami,

    /// Query the service's view of this helper's heartbeat
    RemoteStatus,

    /// Show version information
    Version,
}

/// Applies command line overrides and persists them when any were given.
fn resolve_credentials(
    api_key: Option<String>,
    wallet: Option<String>,
) -> anyhow::Result<StoredCredentials> {
    let mut credentials = auth::load_config()?;
    let changed = api_key.is_some() || wallet.is_some();
    if let Some(key) = api_key {
        credentials.api_key = key;
    }
    if let Some(wallet) = wallet {
        credentials.wallet = wallet;
    }

    if !credentials.is_complete() {
        bail!(
            "API key and wallet required. \
             Run `aichain-helper login --api-key <KEY> --wallet <WALLET>`"
        );
    }
    if changed {
        auth::save_config(&credentials.api_key, &credentials.wallet)?;
    }
    Ok(credentials)
}

fn build_agent(config: &Config, tx: StatusSender) -> HeartbeatAgent {
    let settings = config.heartbeat_settings();
    let probe = Arc::new(NvidiaSmiProbe::new(settings.sample_timeout));
    HeartbeatAgent::new(settings, probe, tx)
}

fn stored_credentials() -> anyhow::Result<StoredCredentials> {
    let credentials = auth::load_config()?;
    if credentials.api_key.trim().is_empty() {
        bail!("No API key stored. Run `aichain-helper login` first");
    }
    Ok(credentials)
}

pub async fn cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;
    init_logging(&config.log_level);

    match cli.command {
        Commands::Login { api_key, wallet } => {
            let credentials = StoredCredentials::new(api_key, wallet);
            if !credentials.is_complete() {
                bail!("API key and wallet required");
            }
            auth::save_config(&credentials.api_key, &credentials.wallet)?;
            println!("Credentials saved for wallet {}", credentials.wallet);
        }

        Commands::Logout => {
            auth::clear()?;
            println!("Logged out successfully");
        }

        Commands::Run { api_key, wallet } => {
            let credentials = resolve_credentials(api_key, wallet)?;
            let (tx, rx) = status_channel();
            let agent = build_agent(&config, tx);
            console::run_headless(&agent, rx, &credentials).await?;
        }

        Commands::Console => {
            let credentials = resolve_credentials(None, None)?;
            let (tx, rx) = status_channel();
            let agent = build_agent(&config, tx);
            console::run_interactive(&agent, rx, &credentials).await?;
        }

        Commands::Gpus => {
            let probe = NvidiaSmiProbe::new(config.heartbeat_settings().sample_timeout);
            let devices = tokio::task::spawn_blocking(move || gpu::sample(&probe)).await?;
            if devices.is_empty() {
                println!("no GPU");
            }
            for device in devices {
                println!(
                    "{}: {} MB total, {} MB free, {:.0}% load",
                    device.name,
                    device.memory_total_mb,
                    device.memory_free_mb,
                    device.utilization * 100.0
                );
            }
        }

        Commands::Whoami => {
            let credentials = stored_credentials()?;
            let settings = config.heartbeat_settings();
            let info = server::fetch_user_info(&settings, &credentials.key()).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::RemoteStatus => {
            let credentials = stored_credentials()?;
            let settings = config.heartbeat_settings();
            let status = server::fetch_remote_heartbeat(&settings, &credentials.key()).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }

        Commands::Version => {
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Build: {}", env!("GIT_COMMIT"));
            println!("Rust: {}", env!("RUSTC_VERSION"));
            println!(
                "Platform: {}/{}",
                std::env::consts::OS,
                std::env::consts::ARCH
            );
        }
    }

    Ok(())
}
