mod api;
mod router;
mod startup;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use conform_core::Config;
use conform_dispatch::Dispatcher;

use crate::state::AppState;

// ── CLI ─────────────────────────────────────────────────────────────

/// Entity-change event validation service.
#[derive(Parser, Debug)]
#[command(name = "conform-server", version, about)]
struct Cli {
    /// Engine settings TOML file (overrides CONFORM_SETTINGS).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server (default).
    Serve,
    /// Load and compile all configuration, then exit.
    Check,
    /// Validate one event file and print the results as JSON.
    Validate {
        /// File holding one raw event.
        event: PathBuf,
        /// Counter source name.
        #[arg(long, default_value = "cli")]
        source: String,
    },
}

fn load_config() -> Config {
    conform_core::config::load_dotenv();
    Config::from_env()
}

async fn serve(config: &Config, dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    let state = Arc::new(AppState { dispatcher });
    let app = router::build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

fn main() -> anyhow::Result<()> {
    let mut config = load_config();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    if let Some(path) = cli.settings {
        config.engine.settings_path = path;
    }
    config.log_summary();

    // Engines are built before the runtime exists and outlive it.
    let dispatcher = Arc::new(startup::build_dispatcher(&config)?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Check => {
            info!("Configuration OK");
            Ok(())
        }
        Command::Validate { event, source } => {
            let raw = std::fs::read_to_string(&event)?;
            let outcome = dispatcher.execute(&raw, &source);
            println!("{}", serde_json::to_string_pretty(&outcome.results)?);
            match outcome.error {
                Some(e) => anyhow::bail!("validation failed: {e}"),
                None => Ok(()),
            }
        }
        Command::Serve => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let result = runtime.block_on(serve(&config, dispatcher.clone()));
            drop(runtime);
            result
        }
    }
}
