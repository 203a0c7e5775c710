mod config;
mod llm;
mod platform;
mod router;
mod webhook;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::llm::OpenAiClient;
use crate::platform::line::LineMessagingClient;
use crate::router::Router;
use crate::webhook::AppState;

#[derive(Parser, Debug)]
#[command(name = "linerelay", about = "LINE webhook relay to a chat-completion API")]
struct Cli {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Enable debug logging.
    #[arg(short, long, default_value_t = false, action = ArgAction::Set)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env before the log filter reads RUST_LOG
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    let default_filter = if cli.debug {
        "debug,hyper=info,reqwest=info"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A missing .env is fine; secrets may come from the real environment
    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let config = Config::load()?;

    info!("Configuration loaded successfully");
    info!("  Provider: {}", config.llm.provider);
    info!("  Model: {}", config.llm.model);
    info!("  Max tokens: {}", config.llm.max_tokens);
    info!("  Temperature: {}", config.llm.temperature);
    if config.llm.api_key.is_empty() {
        warn!("No completion API key configured; every completion will fall back");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, cli.port))?;

    let completion = Arc::new(OpenAiClient::new(config.llm.clone()));
    let router = Arc::new(Router::from_config(&config, completion));
    let sink = Arc::new(LineMessagingClient::new(&config.line));
    let state = AppState::new(router, sink, &config.line.channel_secret);

    webhook::run(state, addr).await?;

    Ok(())
}
