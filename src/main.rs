mod config;
mod host;
mod opencode;
mod reactor;
mod registry;
mod runner;
mod signals;

use clap::Parser;
use config::AutoContinueConfig;
use opencode::OpencodeClient;
use reactor::{IdleContinuationReactor, SystemClock};
use registry::SessionStateRegistry;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Keeps opencode agent sessions going: whenever a session goes idle, send
/// "continue" into it, subject to a per-session cooldown and cap.
#[derive(Parser, Debug)]
#[command(name = "auto-continue", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "auto-continue.toml")]
    config: PathBuf,

    /// opencode server URL (overrides config)
    #[arg(short, long)]
    server: Option<String>,

    /// Project directory to scope requests to (overrides config)
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// -1 = disabled, 0 = unlimited, >0 = limit per session (overrides config)
    #[arg(long, allow_negative_numbers = true)]
    max_continues: Option<i64>,

    /// Prompt text sent on idle (overrides config)
    #[arg(short, long)]
    message: Option<String>,

    /// Minimum milliseconds between continues in one session (overrides config)
    #[arg(long)]
    cooldown_ms: Option<u64>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (cooldown skips, stream frames)
    #[arg(short, long)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

/// Apply CLI overrides on top of file values.
fn apply_overrides(config: &mut AutoContinueConfig, cli: &Cli) {
    if let Some(server) = &cli.server {
        config.server.base_url = server.clone();
    }
    if let Some(directory) = &cli.directory {
        config.server.directory = Some(directory.clone());
    }
    if let Some(max) = cli.max_continues {
        config.continuation.max_continues = max;
    }
    if let Some(message) = &cli.message {
        config.continuation.message = message.clone();
    }
    if let Some(cooldown) = cli.cooldown_ms {
        config.continuation.cooldown_ms = cooldown;
    }
}

fn render_settings(config: &AutoContinueConfig) -> String {
    let directory = config
        .server
        .directory
        .as_ref()
        .map(|d| d.display().to_string())
        .unwrap_or_else(|| "(server default)".to_string());
    format!(
        "server:       {}\n\
         directory:    {}\n\
         max:          {}\n\
         message:      {:?}\n\
         cooldown_ms:  {}\n\
         reconnect:    {}ms .. {}ms",
        config.server.base_url,
        directory,
        config.continuation.limit(),
        config.continuation.message,
        config.continuation.cooldown_ms,
        config.reconnect.initial_delay_ms,
        config.reconnect.max_delay_ms,
    )
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    tracing::info!("auto-continue starting");
    tracing::debug!(?cli, "parsed CLI arguments");

    let mut config = match AutoContinueConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };
    apply_overrides(&mut config, &cli);

    if cli.dry_run {
        println!("auto-continue v{}", env!("CARGO_PKG_VERSION"));
        println!("{}", render_settings(&config));
        println!("Dry run mode: config validated, not running.");
        return ExitCode::SUCCESS;
    }

    let client = match OpencodeClient::new(&config.server) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(error = %e, "failed to create opencode client");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(server = %client.base_url(), "using opencode server");

    let reactor = IdleContinuationReactor::install(
        &config.continuation,
        Arc::clone(&client),
        SessionStateRegistry::new(),
        Box::new(SystemClock),
    )
    .await;

    let Some(reactor) = reactor else {
        return ExitCode::SUCCESS;
    };

    runner::run(
        client.as_ref(),
        &reactor,
        &config.reconnect,
        signals::shutdown_signal(),
    )
    .await;

    ExitCode::SUCCESS
}
