//! WebSocket handler for live game updates.
//!
//! # Connection Flow
//!
//! 1. Client connects via `GET /ws/{game_id}?player_id=<id>`
//! 2. Server answers `404` for unknown games, otherwise upgrades
//! 3. Server sends a `welcome` with the player id (generated when absent)
//!    followed by the current view
//! 4. Every state change of the game pushes a fresh view, with the
//!    connected player's own wealth and pending extraction visible
//! 5. On disconnect the subscription is dropped. The player keeps their
//!    seat so they can reconnect.
//!
//! # Client Messages
//!
//! ```javascript
//! ws.send(JSON.stringify({ type: "join" }));
//! ws.send(JSON.stringify({ type: "set_name", name: "Alice" }));
//! ws.send(JSON.stringify({ type: "extract", amount: 1500000 }));
//! ws.send(JSON.stringify({ type: "leave" }));
//! ```
//!
//! # Server Messages
//!
//! `welcome`, `view` (a full game view), `success` and `error`, all tagged
//! by `type`.

use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uncooperative::{
    GameCommand, GameId, GameView, PlayerId, Usd, room::StateChangeNotification,
};
use uuid::Uuid;

use super::{
    AppState,
    games::{ApiError, run_command},
    rate_limiter::MessageLimits,
};
use crate::metrics;

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    player_id: Option<String>,
}

/// Client messages received via WebSocket
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join,
    SetName { name: String },
    Extract { amount: Usd },
    Leave,
}

impl ClientMessage {
    fn into_command(self, id: PlayerId) -> GameCommand {
        match self {
            Self::Join => GameCommand::Join { id },
            Self::SetName { name } => GameCommand::SetName { id, name },
            Self::Extract { amount } => GameCommand::SubmitExtraction { id, amount },
            Self::Leave => GameCommand::Leave { id },
        }
    }
}

/// Messages sent to the client
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome { player_id: PlayerId },
    View { view: Box<GameView> },
    Success { version: Option<u64> },
    Error { message: String },
}

impl ServerMessage {
    fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(e) => {
                error!("Failed to serialize server message: {e}");
                None
            }
        }
    }
}

/// Upgrade to a WebSocket attached to `game_id`.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(game_id): Path<GameId>,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    if state.game_manager.get_game(game_id).await.is_none() {
        return ApiError::NotFound(format!("game {game_id} not found")).into_response();
    }

    let player_id = query
        .player_id
        .map(|id| PlayerId::new(&id))
        .filter(|id| !id.is_empty())
        .unwrap_or_else(PlayerId::generate);

    ws.on_upgrade(move |socket| handle_socket(socket, game_id, player_id, state))
}

async fn handle_socket(socket: WebSocket, game_id: GameId, player_id: PlayerId, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    info!("WebSocket connected: game={game_id}, player={player_id}");
    metrics::websocket_connected();

    let mut limits = MessageLimits::default();

    let (response_tx, mut response_rx) = mpsc::channel::<String>(32);
    let (notification_tx, mut notification_rx) = mpsc::channel::<StateChangeNotification>(32);

    let subscriber_id = Uuid::new_v4();
    if let Err(e) = state
        .game_manager
        .subscribe(game_id, subscriber_id, notification_tx)
        .await
    {
        error!("Failed to subscribe to game {game_id}: {e}");
        metrics::websocket_disconnected();
        return;
    }

    let welcome = ServerMessage::Welcome {
        player_id: player_id.clone(),
    };
    let initial_view = state
        .game_manager
        .get_view(game_id, Some(player_id.clone()))
        .await
        .ok()
        .map(|view| ServerMessage::View {
            view: Box::new(view),
        });
    for message in std::iter::once(welcome).chain(initial_view) {
        if let Some(json) = message.to_json()
            && sender.send(Message::Text(json.into())).await.is_err()
        {
            metrics::websocket_disconnected();
            return;
        }
    }

    let send_state = state.clone();
    let viewer = player_id.clone();
    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(notification) = notification_rx.recv() => {
                    if notification == StateChangeNotification::Closed {
                        let closed = ServerMessage::Error { message: "game closed".to_string() };
                        if let Some(json) = closed.to_json() {
                            let _ = sender.send(Message::Text(json.into())).await;
                        }
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }

                    let view = match send_state
                        .game_manager
                        .get_view(game_id, Some(viewer.clone()))
                        .await
                    {
                        Ok(view) => view,
                        Err(e) => {
                            error!("Failed to get view of game {game_id}: {e}");
                            break;
                        }
                    };
                    let Some(json) = (ServerMessage::View { view: Box::new(view) }).to_json() else {
                        continue;
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                    metrics::websocket_messages_sent();
                }
                Some(response_json) = response_rx.recv() => {
                    if sender.send(Message::Text(response_json.into())).await.is_err() {
                        break;
                    }
                    metrics::websocket_messages_sent();
                }
                else => break,
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                metrics::websocket_messages_received();

                if let Err(exceeded) = limits.check() {
                    warn!("{exceeded:?} rate limit exceeded for player {player_id} (game {game_id})");
                    metrics::rate_limit_hits_total("websocket");
                    let response = ServerMessage::Error {
                        message: exceeded.message().to_string(),
                    };
                    if let Some(json) = response.to_json() {
                        let _ = response_tx.send(json).await;
                    }
                    continue;
                }

                let response = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => {
                        let command = client_msg.into_command(player_id.clone());
                        match run_command(&state, game_id, command).await {
                            Ok(result) => ServerMessage::Success {
                                version: result.version,
                            },
                            Err(e) => ServerMessage::Error {
                                message: e.to_string(),
                            },
                        }
                    }
                    Err(e) => {
                        warn!("Failed to parse client message: {e}");
                        ServerMessage::Error {
                            message: "Invalid message format".to_string(),
                        }
                    }
                };

                if let Some(json) = response.to_json()
                    && response_tx.send(json).await.is_err()
                {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket closed: game={game_id}, player={player_id}");
                break;
            }
            Err(e) => {
                error!("WebSocket error: {e}");
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
    if let Err(e) = state
        .game_manager
        .unsubscribe(game_id, subscriber_id)
        .await
    {
        warn!("Failed to unsubscribe from game {game_id}: {e}");
    }
    metrics::websocket_disconnected();

    info!("WebSocket disconnected: game={game_id}, player={player_id}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_messages_parse() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"extract","amount":1500000}"#).unwrap();
        let command = msg.into_command(PlayerId::new("alice"));
        assert_eq!(
            command,
            GameCommand::SubmitExtraction {
                id: PlayerId::new("alice"),
                amount: 1_500_000.0,
            }
        );

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"set_name","name":"Alice"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::SetName { ref name } if name == "Alice"));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"fold"}"#).is_err());
    }

    #[test]
    fn test_server_message_tags() {
        let json = ServerMessage::Welcome {
            player_id: PlayerId::new("alice"),
        }
        .to_json()
        .unwrap();
        assert_eq!(json, r#"{"type":"welcome","player_id":"alice"}"#);

        let json = ServerMessage::Error {
            message: "nope".to_string(),
        }
        .to_json()
        .unwrap();
        assert!(json.contains(r#""type":"error""#));
    }
}
