mod routes;
mod state;
mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio::signal;
use tracing::info;

use observer_core::{Observer, ObserverConfig, ObserverContext, PaneRegistry};

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "observer-gateway", about = "HTTP/WebSocket front door over the observation engine")]
struct Cli {
    #[arg(long, default_value = "9000")]
    port: u16,

    #[arg(long, default_value = "0.0.0.0")]
    host: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = ObserverConfig::from_env();

    let registry = Arc::new(PaneRegistry::new(config.capture_lines));
    let (events_tx, _) = tokio::sync::broadcast::channel(4096);
    let ctx = Arc::new(ObserverContext::new(registry.clone(), events_tx.clone()));

    let observer = Observer::new(config, registry, events_tx);
    let mode = observer.start().await;
    info!(?mode, "observer-gateway: observer daemon started");

    let state = AppState::new(ctx);
    let app = Router::new()
        .route("/api/panes", get(routes::list_panes))
        .route("/api/panes/{id}", get(routes::get_pane))
        .route("/ws", get(ws::handler))
        .with_state(state);

    let addr: std::net::SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .unwrap_or_else(|_| std::net::SocketAddr::from(([0, 0, 0, 0], cli.port)));

    info!(%addr, "observer-gateway: listening");
    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind listener");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    observer.stop().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("observer-gateway: shutting down");
}
