//! WebSocket message format tests.
//!
//! The wire format of client and server messages, and the plain-HTTP
//! behaviour of the WebSocket route.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;
use uc_server::api::{
    AppState, create_router,
    websocket::{ClientMessage, ServerMessage},
};
use uncooperative::{
    GameConfig, PlayerId,
    db::InMemorySnapshotStore,
    room::{GameManager, RoomConfig},
};

#[test]
fn test_client_message_format() {
    let join: ClientMessage = serde_json::from_value(json!({ "type": "join" })).unwrap();
    assert!(matches!(join, ClientMessage::Join));

    let extract: ClientMessage =
        serde_json::from_value(json!({ "type": "extract", "amount": 2500000.0 })).unwrap();
    assert!(matches!(extract, ClientMessage::Extract { amount } if amount == 2_500_000.0));

    let serialized = serde_json::to_string(&ClientMessage::Leave).unwrap();
    assert_eq!(serialized, r#"{"type":"leave"}"#);

    assert!(serde_json::from_value::<ClientMessage>(json!({ "type": "extract" })).is_err());
}

#[test]
fn test_server_message_format() {
    let welcome = serde_json::to_value(ServerMessage::Welcome {
        player_id: PlayerId::new("alice"),
    })
    .unwrap();
    assert_eq!(welcome, json!({ "type": "welcome", "player_id": "alice" }));

    let success = serde_json::to_value(ServerMessage::Success { version: Some(3) }).unwrap();
    assert_eq!(success, json!({ "type": "success", "version": 3 }));
}

#[tokio::test]
async fn test_plain_get_is_not_upgraded() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let game_manager = Arc::new(GameManager::new(
        store,
        RoomConfig::default(),
        GameConfig::default(),
    ));
    let game_id = game_manager.create_game(None).await.unwrap();
    let app = create_router(AppState {
        game_manager,
        database: None,
    });

    let request = Request::builder()
        .uri(format!("/ws/{game_id}?player_id=alice"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(response.status().is_client_error());
    assert_ne!(response.status(), StatusCode::NOT_FOUND);
}
