//! Game manager for spawning and managing game actors.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use super::{
    actor::{GameActor, GameHandle},
    config::RoomConfig,
    errors::{RoomError, RoomResult},
    messages::{GameResponse, StateChangeNotification},
};
use crate::{
    db::SnapshotStore,
    game::{
        GameCommand, GameStateMachine,
        entities::{
            GameConfig, GameId, GameSnapshot, GameStatus, GameView, PlayerId, Standing, TurnPhase,
            Usd,
        },
        solver::{self, OptimalExtraction},
    },
};

/// Game metadata for discovery
#[derive(Debug, Clone, Serialize)]
pub struct GameMetadata {
    pub id: GameId,
    pub status: GameStatus,
    pub turn_phase: TurnPhase,
    pub turn: u32,
    pub max_turns: u32,
    pub treasury: Usd,
    pub player_count: usize,
    pub max_players: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&GameSnapshot> for GameMetadata {
    fn from(snapshot: &GameSnapshot) -> Self {
        Self {
            id: snapshot.id,
            status: snapshot.state.status,
            turn_phase: snapshot.state.turn_phase,
            turn: snapshot.state.turn,
            max_turns: snapshot.config.max_turns,
            treasury: snapshot.state.treasury,
            player_count: snapshot.players.len(),
            max_players: snapshot.config.max_players,
            created_at: snapshot.state.created_at,
        }
    }
}

/// Game manager for managing multiple game instances
pub struct GameManager {
    /// Snapshot store every actor persists to
    store: Arc<dyn SnapshotStore>,

    /// Timing settings handed to each actor
    room_config: RoomConfig,

    /// Config for games created without one
    default_config: GameConfig,

    /// Active game handles
    games: Arc<RwLock<HashMap<GameId, GameHandle>>>,
}

impl GameManager {
    /// Create a new game manager
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        room_config: RoomConfig,
        default_config: GameConfig,
    ) -> Self {
        Self {
            store,
            room_config,
            default_config: default_config.sanitized(),
            games: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn default_config(&self) -> &GameConfig {
        &self.default_config
    }

    fn spawn(&self, machine: GameStateMachine) -> GameHandle {
        let (actor, handle) = GameActor::new(machine, self.store.clone(), self.room_config.clone());
        tokio::spawn(async move {
            actor.run().await;
        });
        handle
    }

    /// Load stored games and spawn actors for them
    ///
    /// Games already running are left alone. Returns how many were spawned.
    pub async fn load_existing_games(&self) -> RoomResult<usize> {
        let ids = self.store.list_ids().await?;
        let mut loaded_count = 0;

        for id in ids {
            if self.games.read().await.contains_key(&id) {
                continue;
            }
            let Some(snapshot) = self.store.load(id).await? else {
                warn!("Game {id} listed but not stored, skipping");
                continue;
            };
            let handle = self.spawn(GameStateMachine::from_snapshot(snapshot));
            self.games.write().await.insert(id, handle);

            info!("Loaded and spawned existing game {id}");
            loaded_count += 1;
        }

        Ok(loaded_count)
    }

    /// Create, persist and spawn a new game
    pub async fn create_game(&self, config: Option<GameConfig>) -> RoomResult<GameId> {
        let config = config.unwrap_or_else(|| self.default_config.clone());
        let machine = GameStateMachine::new(Uuid::new_v4(), config);
        let game_id = machine.id();

        self.store.save(machine.snapshot(), None).await?;

        let handle = self.spawn(machine);
        self.games.write().await.insert(game_id, handle);

        info!("Created and spawned game {game_id}");

        Ok(game_id)
    }

    /// Get a game handle
    pub async fn get_game(&self, game_id: GameId) -> Option<GameHandle> {
        let games = self.games.read().await;
        games.get(&game_id).cloned()
    }

    async fn handle(&self, game_id: GameId) -> RoomResult<GameHandle> {
        self.get_game(game_id)
            .await
            .ok_or(RoomError::GameNotFound(game_id))
    }

    /// List all active games, oldest first
    pub async fn list_games(&self) -> Vec<GameMetadata> {
        let handles: Vec<GameHandle> = self.games.read().await.values().cloned().collect();

        let mut metadata_list = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.snapshot().await {
                Ok(snapshot) => metadata_list.push(GameMetadata::from(&snapshot)),
                Err(e) => warn!("Game {} unavailable for listing: {e}", handle.game_id()),
            }
        }
        metadata_list.sort_by_key(|m| (m.created_at, m.id));
        metadata_list
    }

    /// Stop a game's actor and delete it from the store
    pub async fn close_game(&self, game_id: GameId) -> RoomResult<()> {
        let handle = self
            .games
            .write()
            .await
            .remove(&game_id)
            .ok_or(RoomError::GameNotFound(game_id))?;

        if let Err(e) = handle.close().await {
            warn!("Game {game_id} was already stopped: {e}");
        }
        self.store.delete(game_id).await?;

        info!("Closed game {game_id}");

        Ok(())
    }

    /// Send a command to a game
    pub async fn send_command(
        &self,
        game_id: GameId,
        command: GameCommand,
    ) -> RoomResult<GameResponse> {
        self.handle(game_id).await?.command(command).await
    }

    pub async fn get_view(&self, game_id: GameId, viewer: Option<PlayerId>) -> RoomResult<GameView> {
        self.handle(game_id).await?.view(viewer).await
    }

    pub async fn get_snapshot(&self, game_id: GameId) -> RoomResult<GameSnapshot> {
        self.handle(game_id).await?.snapshot().await
    }

    pub async fn standings(&self, game_id: GameId) -> RoomResult<Vec<Standing>> {
        Ok(self.get_snapshot(game_id).await?.standings())
    }

    /// Recommended uniform extraction for the game's config and current
    /// table size. Runs on the blocking pool, outside the actor.
    pub async fn optimal_extraction(&self, game_id: GameId) -> RoomResult<OptimalExtraction> {
        let snapshot = self.get_snapshot(game_id).await?;
        let player_count = snapshot.players.active_count();
        let config = snapshot.config;
        let optimal =
            tokio::task::spawn_blocking(move || solver::solve(&config, player_count)).await??;
        Ok(optimal)
    }

    pub async fn subscribe(
        &self,
        game_id: GameId,
        subscriber_id: Uuid,
        sender: mpsc::Sender<StateChangeNotification>,
    ) -> RoomResult<()> {
        self.handle(game_id)
            .await?
            .subscribe(subscriber_id, sender)
            .await
    }

    pub async fn unsubscribe(&self, game_id: GameId, subscriber_id: Uuid) -> RoomResult<()> {
        self.handle(game_id).await?.unsubscribe(subscriber_id).await
    }

    /// Get active game count
    pub async fn active_game_count(&self) -> usize {
        let games = self.games.read().await;
        games.len()
    }
}
