mod error;
mod routes;
mod state;

use arbor_core::Config;
use axum::routing::{delete, get, post};
use axum::Router;
use clap::Parser;
use state::{AppState, SharedState};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Parser)]
#[command(name = "arbor-service")]
#[command(about = "HTTP service for the arbor code knowledge graph")]
struct Args {
    /// Port to listen on (defaults to the configured service port)
    #[arg(long)]
    port: Option<u16>,

    /// Bind address (defaults to the configured bind address)
    #[arg(long)]
    bind: Option<String>,

    /// Path to a TOML config file (also reads ARBOR_CONFIG env var)
    #[arg(long, env = "ARBOR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.service.port = port;
    }
    if let Some(bind) = args.bind {
        config.service.bind = bind;
    }

    let addr = format!("{}:{}", config.service.bind, config.service.port);
    let state: SharedState = Arc::new(AppState::new(config));

    let app = Router::new()
        .route("/projects", post(routes::register_project))
        .route("/index", post(routes::reindex))
        .route("/nodes", get(routes::list_nodes))
        .route("/nodes/{id}", get(routes::get_node))
        .route("/nodes/{id}/edges", get(routes::node_edges))
        .route("/skeleton", get(routes::skeleton))
        .route("/capsule/{id}", get(routes::capsule))
        .route(
            "/observations",
            post(routes::create_observation).get(routes::list_observations),
        )
        .route("/observations/{id}", delete(routes::delete_observation))
        .route("/resume", get(routes::resume))
        .route("/hooks/install", post(routes::install_hooks))
        .route("/status", get(routes::status))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("arbor-service listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
