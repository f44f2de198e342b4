//! Integration tests for the REST API.
//!
//! Every test builds the real router over an in-memory snapshot store and
//! drives it with `oneshot` requests.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method
use uc_server::api::{AppState, create_router};
use uncooperative::{
    GameConfig,
    db::InMemorySnapshotStore,
    room::{GameManager, RoomConfig},
};

fn create_test_server() -> (Router, Arc<InMemorySnapshotStore>) {
    let store = Arc::new(InMemorySnapshotStore::new());
    let game_manager = Arc::new(GameManager::new(
        store.clone(),
        RoomConfig::default(),
        GameConfig::default(),
    ));
    let app = create_router(AppState {
        game_manager,
        database: None,
    });
    (app, store)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_game(app: &Router, body: Option<Value>) -> String {
    let (status, body) = send(app, "POST", "/api/v1/games", body).await;
    assert_eq!(status, StatusCode::CREATED);
    body["game_id"].as_str().unwrap().to_string()
}

async fn seat(app: &Router, game: &str, player: &str) {
    let (status, body) = send(
        app,
        "POST",
        &format!("/api/v1/games/{game}/players"),
        Some(json!({ "player_id": player })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["player_id"], player);

    let (status, _) = send(
        app,
        "PUT",
        &format!("/api/v1/games/{game}/players/{player}/name"),
        Some(json!({ "name": player.to_uppercase() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn test_health_check_endpoint() {
    let (app, _) = create_test_server();
    let (status, body) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["games"]["active_count"], 0);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let (app, _) = create_test_server();
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}

// ============================================================================
// Game Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_create_and_list_games() {
    let (app, _) = create_test_server();
    let default_game = create_game(&app, None).await;
    let custom_game = create_game(&app, Some(json!({ "starting_treasury": 60000000.0, "max_turns": 12 }))).await;

    let (status, games) = send(&app, "GET", "/api/v1/games", None).await;
    assert_eq!(status, StatusCode::OK);
    let games = games.as_array().unwrap();
    assert_eq!(games.len(), 2);

    let custom = games.iter().find(|g| g["id"] == custom_game.as_str()).unwrap();
    assert_eq!(custom["treasury"], 60000000.0);
    assert_eq!(custom["max_turns"], 12);
    assert_eq!(custom["status"], "waiting");
    assert!(games.iter().any(|g| g["id"] == default_game.as_str()));
}

#[tokio::test]
async fn test_full_turn_over_http() {
    let (app, _) = create_test_server();
    let game = create_game(&app, None).await;
    for player in ["alice", "bob", "carol"] {
        seat(&app, &game, player).await;
    }

    let (status, body) = send(&app, "POST", &format!("/api/v1/games/{game}/start"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["changed"], true);

    for (player, amount) in [("alice", 1_000_000.0), ("bob", 2_000_000.0), ("carol", 9e9)] {
        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/games/{game}/players/{player}/extraction"),
            Some(json!({ "amount": amount })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let (status, view) = send(
        &app,
        "GET",
        &format!("/api/v1/games/{game}?player_id=alice"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "playing");
    assert_eq!(view["turn_phase"], "summary");
    // Carol's absurd request was clamped to the 5M cap.
    assert_eq!(view["summary"]["total_extraction"], 8_000_000.0);

    let players = view["players"].as_array().unwrap();
    let alice = players.iter().find(|p| p["id"] == "alice").unwrap();
    let bob = players.iter().find(|p| p["id"] == "bob").unwrap();
    assert_eq!(alice["pending_extraction"], 1_000_000.0);
    assert!(bob["wealth"].is_null());

    // A second submission in the same turn is refused.
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/games/{game}/players/alice/extraction"),
        Some(json!({ "amount": 1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_start_without_quorum_is_bad_request() {
    let (app, _) = create_test_server();
    let game = create_game(&app, None).await;
    seat(&app, &game, "alice").await;

    let (status, body) = send(&app, "POST", &format!("/api/v1/games/{game}/start"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("3+"));

    let (status, _) = send(&app, "GET", &format!("/api/v1/games/{game}/optimal"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_optimal_extraction() {
    let (app, _) = create_test_server();
    let game = create_game(&app, None).await;
    for player in ["a", "b", "c", "d"] {
        seat(&app, &game, player).await;
    }

    let (status, body) = send(&app, "GET", &format!("/api/v1/games/{game}/optimal"), None).await;
    assert_eq!(status, StatusCode::OK);
    let rate = body["rate_per_player"].as_f64().unwrap();
    assert!((0.0..=5_000_000.0).contains(&rate));
    assert!(body["total_extracted"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_optimal_extraction_after_extreme_config() {
    let (app, _) = create_test_server();
    let game = create_game(&app, None).await;
    for change in [
        json!({ "change": "max_extraction", "value": 1e300 }),
        json!({ "change": "max_turns", "value": u32::MAX }),
    ] {
        let (status, _) = send(
            &app,
            "PATCH",
            &format!("/api/v1/games/{game}/config"),
            Some(change),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    for player in ["a", "b", "c"] {
        seat(&app, &game, player).await;
    }

    let (status, body) = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        send(&app, "GET", &format!("/api/v1/games/{game}/optimal"), None),
    )
    .await
    .expect("optimal extraction should answer");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_extracted"], 40_000_000.0);

    let (_, view) = send(&app, "GET", &format!("/api/v1/games/{game}"), None).await;
    assert_eq!(view["config"]["max_turns"], 1000);
}

#[tokio::test]
async fn test_join_generates_player_id() {
    let (app, _) = create_test_server();
    let game = create_game(&app, None).await;

    let (status, body) = send(&app, "POST", &format!("/api/v1/games/{game}/players"), None).await;
    assert_eq!(status, StatusCode::OK);
    let player_id = body["player_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(player_id).is_ok());
    assert_eq!(body["changed"], true);
}

#[tokio::test]
async fn test_configure_and_toggle() {
    let (app, _) = create_test_server();
    let game = create_game(&app, None).await;

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/api/v1/games/{game}/config"),
        Some(json!({ "change": "increase", "value": "max_turns" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/api/v1/games/{game}/config"),
        Some(json!({ "change": "interest_rate", "value": 0.2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/v1/games/{game}/wealth-visibility"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, view) = send(&app, "GET", &format!("/api/v1/games/{game}"), None).await;
    assert_eq!(view["config"]["max_turns"], 11);
    assert_eq!(view["config"]["interest_rate"], 0.2);
    assert_eq!(view["show_wealth"], true);
}

#[tokio::test]
async fn test_leave_remove_and_clear() {
    let (app, _) = create_test_server();
    let game = create_game(&app, None).await;
    for player in ["alice", "bob", "carol"] {
        seat(&app, &game, player).await;
    }

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/games/{game}/players/alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/v1/games/{game}/players/bob?host=true"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "DELETE", &format!("/api/v1/games/{game}/players/alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "DELETE", &format!("/api/v1/games/{game}/players"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);

    let (_, standings) = send(&app, "GET", &format!("/api/v1/games/{game}/standings"), None).await;
    assert_eq!(standings.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_close_game() {
    let (app, _) = create_test_server();
    let game = create_game(&app, None).await;

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/games/{game}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = send(&app, "GET", &format!("/api/v1/games/{game}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

// ============================================================================
// Error Mapping Tests
// ============================================================================

#[tokio::test]
async fn test_unknown_game_is_not_found() {
    let (app, _) = create_test_server();
    let unknown = uuid::Uuid::new_v4();
    let (status, _) = send(&app, "POST", &format!("/api/v1/games/{unknown}/start"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_storage_outage_is_service_unavailable() {
    let (app, store) = create_test_server();
    let game = create_game(&app, None).await;

    store.set_unavailable(true);
    let (status, body) = send(&app, "POST", &format!("/api/v1/games/{game}/players"), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("storage"));

    let (status, _) = send(&app, "POST", "/api/v1/games", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    store.set_unavailable(false);
    let (status, _) = send(&app, "POST", &format!("/api/v1/games/{game}/players"), None).await;
    assert_eq!(status, StatusCode::OK);
}
