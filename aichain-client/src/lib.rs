pub mod agent;
pub mod auth;
pub mod config;
pub mod server;
pub mod util;

pub mod console;
// === CLI entrypoint ===
pub mod cli;

/// Entrypoint used by `main.rs` and tests to run the full CLI.
pub async fn run_cli() -> anyhow::Result<()> {
    cli::cli().await
}
