mod acs;
mod api;
mod config;
mod openai;
pub mod registry;
mod relay;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use acs::client::AcsClient;
use config::Config;
use registry::{CallDirectory, ConnectionRegistry};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub acs: Arc<AcsClient>,
    /// Media connection handles, keyed by call connection id.
    pub registry: ConnectionRegistry,
    /// Read-mostly mirror of active calls, updated from lifecycle events.
    pub calls: CallDirectory,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("--version") => println!("voice-relay {VERSION}"),
        Some("--help") | Some("-h") => print_usage(),
        Some(other) => {
            eprintln!("Unknown option: {other}");
            print_usage();
            std::process::exit(1);
        }
        None => {
            let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
            rt.block_on(server());
        }
    }
}

fn print_usage() {
    println!("voice-relay {VERSION}");
    println!("Bridges ACS Call Automation phone calls to Azure OpenAI Realtime");
    println!();
    println!("Usage: voice-relay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --version   Print version");
    println!("  --help, -h  Print this help message");
    println!();
    println!("Without options, starts the relay server.");
}

async fn server() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_relay=info,tower_http=info".into()),
        )
        .init();

    // Load config — configuration errors are fatal at startup
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        callback_url = %config.server.callback_url(),
        "Starting voice-relay"
    );

    let state = AppState {
        acs: Arc::new(AcsClient::new(config.acs.connection.clone())),
        config: config.clone(),
        registry: ConnectionRegistry::new(),
        calls: CallDirectory::new(),
    };

    // Build router
    let app = Router::new()
        .route("/", get(home))
        // Outbound call trigger
        .route("/outboundCall", get(api::outbound::handle_outbound_call))
        // ACS call lifecycle webhook
        .route("/api/callbacks", post(acs::webhook::handle_callbacks))
        // ACS media stream (WebSocket)
        .route("/ws", get(acs::media::handle_media_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("Invalid server address");

    tracing::info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}

async fn home() -> &'static str {
    "Hello ACS CallAutomation!"
}
