//! Game actor message types.

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::game::{
    GameCommand, GameEvent, UserError,
    entities::{GameSnapshot, GameStatus, GameView, PlayerId},
};

/// Messages that can be sent to a GameActor
#[derive(Debug)]
pub enum GameMessage {
    /// Apply a game command
    Command {
        command: GameCommand,
        response: oneshot::Sender<GameResponse>,
    },

    /// Get the game as seen by one player (or the public)
    GetView {
        viewer: Option<PlayerId>,
        response: oneshot::Sender<GameView>,
    },

    /// Get the full snapshot
    GetSnapshot {
        response: oneshot::Sender<GameSnapshot>,
    },

    /// Internal: check the summary deadline (called by timer)
    Tick,

    /// Subscribe to state change notifications
    Subscribe {
        subscriber_id: Uuid,
        sender: mpsc::Sender<StateChangeNotification>,
    },

    /// Unsubscribe from state change notifications
    Unsubscribe { subscriber_id: Uuid },

    /// Stop the actor
    Close {
        response: oneshot::Sender<GameResponse>,
    },
}

/// Notification sent when game state changes
#[derive(Debug, Clone, PartialEq)]
pub enum StateChangeNotification {
    /// Config, phase or submissions changed
    StateChanged { version: u64 },
    /// Player joined, left or was renamed
    PlayerListChanged { version: u64 },
    /// A turn was resolved and the treasury moved
    TurnResolved { version: u64, turn: u32 },
    /// The game was won or lost
    GameOver { version: u64, status: GameStatus },
    /// The game was closed and the actor stopped
    Closed,
}

impl StateChangeNotification {
    /// The most significant notification for a batch of events.
    #[must_use]
    pub fn from_events(version: u64, status: GameStatus, events: &[GameEvent]) -> Self {
        if events
            .iter()
            .any(|e| matches!(e, GameEvent::Won { .. } | GameEvent::Lost { .. }))
        {
            return Self::GameOver { version, status };
        }
        if let Some(turn) = events.iter().find_map(|e| match e {
            GameEvent::TurnResolved { turn, .. } => Some(*turn),
            _ => None,
        }) {
            return Self::TurnResolved { version, turn };
        }
        if events.iter().any(|e| {
            matches!(
                e,
                GameEvent::Joined(_)
                    | GameEvent::Named { .. }
                    | GameEvent::Left(_)
                    | GameEvent::Removed(_)
                    | GameEvent::Dropped(_)
                    | GameEvent::PlayersCleared(_)
            )
        }) {
            return Self::PlayerListChanged { version };
        }
        Self::StateChanged { version }
    }
}

/// Response from game operations
#[derive(Debug, Clone, PartialEq)]
pub enum GameResponse {
    /// Command applied and persisted
    Success { version: u64, events: Vec<GameEvent> },

    /// Command was valid but changed nothing
    Unchanged,

    /// Command targeted a turn or version that has already moved on
    Stale,

    /// Command doesn't fit the game's current state
    Rejected(UserError),

    /// The snapshot store couldn't be written. Nothing was applied.
    StorageUnavailable(String),
}

impl GameResponse {
    /// Check if response is success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Unchanged)
    }

    /// Get error message if response is error
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Rejected(error) => Some(error.to_string()),
            Self::StorageUnavailable(msg) => Some(format!("storage unavailable: {msg}")),
            Self::Stale => Some("game has moved on".to_string()),
            Self::Success { .. } | Self::Unchanged => None,
        }
    }
}
