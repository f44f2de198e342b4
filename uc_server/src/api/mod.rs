//! HTTP/WebSocket API for the game server.
//!
//! # Modules
//!
//! - [`games`]: REST endpoints creating games and driving them
//! - [`websocket`]: live views pushed on every state change, plus in-game commands
//! - [`rate_limiter`]: sliding window limits for WebSocket messages
//! - [`request_id`]: request correlation and per-request metrics
//!
//! # Endpoints Overview
//!
//! ```text
//! GET    /health                                   - Health check
//! POST   /api/v1/games                             - Create game
//! GET    /api/v1/games                             - List games
//! GET    /api/v1/games/{id}?player_id=             - Game view
//! DELETE /api/v1/games/{id}                        - Close game
//! GET    /api/v1/games/{id}/standings              - Wealth leaderboard
//! GET    /api/v1/games/{id}/optimal                - Collectively optimal extraction
//! POST   /api/v1/games/{id}/players                - Join
//! DELETE /api/v1/games/{id}/players                - Clear players
//! PUT    /api/v1/games/{id}/players/{pid}/name     - Set name
//! POST   /api/v1/games/{id}/players/{pid}/extraction - Submit extraction
//! DELETE /api/v1/games/{id}/players/{pid}          - Leave (or remove with ?host=true)
//! POST   /api/v1/games/{id}/start                  - Start
//! POST   /api/v1/games/{id}/reset                  - Reset
//! POST   /api/v1/games/{id}/wealth-visibility      - Toggle wealth visibility
//! PATCH  /api/v1/games/{id}/config                 - Adjust config
//! GET    /ws/{id}?player_id=                       - WebSocket
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively. In production, configure appropriate
//! origins, methods, and headers.

pub mod games;
pub mod rate_limiter;
pub mod request_id;
pub mod websocket;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, patch, post, put},
};
use log::{info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use uncooperative::{
    GameId,
    db::Database,
    room::{GameManager, StateChangeNotification},
};
use uuid::Uuid;

use crate::metrics;

/// Application state shared across all HTTP handlers and WebSocket connections.
#[derive(Clone)]
pub struct AppState {
    pub game_manager: Arc<GameManager>,
    /// Present when games are stored in Postgres
    pub database: Option<Arc<Database>>,
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use uc_server::api::{create_router, AppState};
/// # use uncooperative::{GameConfig, db::InMemorySnapshotStore, room::{GameManager, RoomConfig}};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(InMemorySnapshotStore::new());
/// let state = AppState {
///     game_manager: Arc::new(GameManager::new(store, RoomConfig::default(), GameConfig::default())),
///     database: None,
/// };
/// let app = create_router(state);
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState) -> Router {
    let root_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ws/{game_id}", get(websocket::websocket_handler));

    Router::new()
        .merge(root_routes)
        .nest("/api/v1", create_v1_router())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/games", post(games::create_game).get(games::list_games))
        .route(
            "/games/{game_id}",
            get(games::get_game).delete(games::close_game),
        )
        .route("/games/{game_id}/standings", get(games::standings))
        .route("/games/{game_id}/optimal", get(games::optimal_extraction))
        .route(
            "/games/{game_id}/players",
            post(games::join_game).delete(games::clear_players),
        )
        .route(
            "/games/{game_id}/players/{player_id}",
            delete(games::leave_game),
        )
        .route(
            "/games/{game_id}/players/{player_id}/name",
            put(games::set_name),
        )
        .route(
            "/games/{game_id}/players/{player_id}/extraction",
            post(games::submit_extraction),
        )
        .route("/games/{game_id}/start", post(games::start_game))
        .route("/games/{game_id}/reset", post(games::reset_game))
        .route(
            "/games/{game_id}/wealth-visibility",
            post(games::toggle_wealth_visibility),
        )
        .route("/games/{game_id}/config", patch(games::configure_game))
}

/// Count the game's outcome once it ends, whichever path resolved its last
/// turn.
pub async fn watch_game(manager: &GameManager, game_id: GameId) {
    let (tx, mut rx) = mpsc::channel(16);
    if let Err(e) = manager.subscribe(game_id, Uuid::new_v4(), tx).await {
        warn!("Could not watch game {game_id}: {e}");
        return;
    }
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            match notification {
                StateChangeNotification::GameOver { status, .. } => {
                    info!("Game {game_id} finished: {status}");
                    metrics::games_finished_total(status);
                }
                StateChangeNotification::Closed => break,
                _ => {}
            }
        }
    });
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the game store is reachable, `503 Service
/// Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:6969/health
/// # {"status":"healthy","store":"postgres","database":true,"games":{"active_count":2},...}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (store, db_healthy) = match &state.database {
        Some(database) => ("postgres", database.health_check().await.is_ok()),
        None => ("memory", true),
    };

    let game_count = state.game_manager.active_game_count().await;
    metrics::active_games(game_count);

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": store,
        "database": db_healthy,
        "games": {
            "active_count": game_count
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
