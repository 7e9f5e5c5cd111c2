//! Combined Axum server: Three Thirteen game WebSockets + static front-end.
//!
//! # Routes
//!
//! | Method | Path                 | Description                                |
//! |--------|----------------------|--------------------------------------------|
//! | `GET`  | `/ws/lobby`          | WebSocket feed of room summaries           |
//! | `GET`  | `/ws/room/{room_id}` | WebSocket game connection (`?player_id=…`) |
//! | `GET`  | `/health`            | Liveness probe, plain-text `"ok"`          |
//! | `GET`  | `/*`                 | Static front-end assets                    |
//!
//! Set `STATIC_DIR` to point at the front-end output (default: `./dist`).

mod room;
mod ws_handler;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::EnvFilter;

use room::RoomManager;

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomManager>,
}

#[tokio::main]
async fn main() {
    // Initialise tracing (respects RUST_LOG env var).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let state = AppState {
        rooms: Arc::new(RoomManager::new()),
    };

    // Static front-end, with index.html fallback for client-side routing.
    let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./dist".to_string());
    let front_end = ServeDir::new(&static_dir)
        .not_found_service(ServeFile::new(format!("{static_dir}/index.html")));

    let app = Router::new()
        .route("/ws/lobby", get(ws_handler::lobby_ws))
        .route("/ws/room/{room_id}", get(ws_handler::room_ws))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
        .fallback_service(front_end);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Three Thirteen server listening on {addr}");
    tracing::info!("Serving static files from {static_dir}");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// `GET /health` — liveness probe while the process is running.
async fn health() -> &'static str {
    "ok"
}
