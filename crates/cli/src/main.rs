mod config_commands;
mod db_commands;
mod replay_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    inbox_config::InboxConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "inbox", version, about = "WhatsApp Business conversation inbox")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (default: ./inbox.toml, then ~/.config/inbox/).
    #[arg(long, global = true, env = "INBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Gateway,
    /// Feed webhook payload files through the ingestion pipeline.
    Replay {
        /// JSON files, each holding one webhook delivery.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Database management (migrate, clear).
    Db {
        #[command(subcommand)]
        action: db_commands::DbAction,
    },
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Resolve the effective config and apply command-line overrides on top.
fn load_config(cli: &Cli) -> anyhow::Result<InboxConfig> {
    let mut config = inbox_config::resolve(cli.config.as_deref())?;
    if let Some(ref bind) = cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "inbox starting");

    match cli.command {
        // Default: start gateway when no subcommand is provided
        None | Some(Commands::Gateway) => {
            let config = load_config(&cli)?;
            inbox_gateway::start_gateway(config).await
        },
        Some(Commands::Replay { ref files }) => {
            let config = load_config(&cli)?;
            replay_commands::handle_replay(&config, files).await
        },
        Some(Commands::Db { ref action }) => {
            let config = load_config(&cli)?;
            db_commands::handle_db(&config, action).await
        },
        Some(Commands::Config { ref action }) => {
            config_commands::handle_config(cli.config.as_deref(), action)
        },
    }
}
