//! WhatsApp Gateway daemon
//!
//! Runs the HTTP API in front of a single engine-driven WhatsApp session.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use whatsapp_gateway::config::Config;
use whatsapp_gateway::engine::HttpEngine;
use whatsapp_gateway::number::canonical_address;
use whatsapp_gateway::server::{serve, AppState};
use whatsapp_gateway::session::{spawn_event_pump, SessionManager};

/// WhatsApp Gateway - single-session HTTP relay
#[derive(Parser)]
#[command(name = "whatsapp-gateway")]
#[command(about = "Expose one WhatsApp web-client session as a JSON API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Base URL of the engine sidecar
        #[arg(long, env = "ENGINE_URL")]
        engine_url: Option<String>,

        /// Session identifier the engine persists credentials under
        #[arg(long)]
        session_id: Option<String>,

        /// Country code prepended to bare national numbers
        #[arg(long)]
        country_code: Option<String>,
    },

    /// Print the canonical address for a phone number (debugging aid)
    CheckNumber {
        /// Number in any free-form format
        number: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve {
            port,
            engine_url,
            session_id,
            country_code,
        } => {
            let mut config = Config::default();
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(url) = engine_url {
                config.engine_url = url;
            }
            if let Some(id) = session_id {
                config.session_id = id;
            }
            if let Some(code) = country_code {
                config.country_code = code;
            }
            cmd_serve(config).await
        }
        Commands::CheckNumber { number } => {
            let config = Config::default();
            println!("{}", canonical_address(&number, &config));
            Ok(())
        }
    }
}

async fn cmd_serve(config: Config) -> anyhow::Result<()> {
    info!("starting gateway on port {}", config.port);

    let engine = Arc::new(HttpEngine::new(&config));
    let session = SessionManager::new(engine, &config);

    // Kick off pairing; readiness arrives via lifecycle events
    if let Err(e) = session.initialize().await {
        error!("initial engine start failed, will retry via /reconnect: {}", e);
    }
    let _pump = spawn_event_pump(Arc::clone(&session));

    serve(AppState::new(session, config)).await
}
