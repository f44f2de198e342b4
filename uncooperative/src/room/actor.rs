//! Game actor implementation with async message handling.
//!
//! The actor is the only writer of its game. Commands are applied to a copy
//! of the state machine, the copy is saved to the snapshot store, and only a
//! successful save makes it the live game.

use log::{debug, error, info, warn};
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, MissedTickBehavior, interval},
};
use uuid::Uuid;

use super::{
    config::RoomConfig,
    errors::{RoomError, RoomResult},
    messages::{GameMessage, GameResponse, StateChangeNotification},
};
use crate::{
    db::{SnapshotStore, StoreError},
    game::{
        GameCommand, GameStateMachine,
        entities::{GameId, GameSnapshot, GameView, PlayerId},
    },
};

/// Game actor handle for sending messages
#[derive(Clone, Debug)]
pub struct GameHandle {
    sender: mpsc::Sender<GameMessage>,
    game_id: GameId,
}

impl GameHandle {
    /// Create a new game handle
    pub fn new(sender: mpsc::Sender<GameMessage>, game_id: GameId) -> Self {
        Self { sender, game_id }
    }

    /// Get game ID
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Send a message to the game
    pub async fn send(&self, message: GameMessage) -> RoomResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| RoomError::Closed)
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> GameMessage,
    ) -> RoomResult<T> {
        let (tx, rx) = oneshot::channel();
        self.send(message(tx)).await?;
        rx.await.map_err(|_| RoomError::ResponseDropped)
    }

    /// Apply a command and wait for the outcome.
    pub async fn command(&self, command: GameCommand) -> RoomResult<GameResponse> {
        self.request(|response| GameMessage::Command { command, response })
            .await
    }

    pub async fn view(&self, viewer: Option<PlayerId>) -> RoomResult<GameView> {
        self.request(|response| GameMessage::GetView { viewer, response })
            .await
    }

    pub async fn snapshot(&self) -> RoomResult<GameSnapshot> {
        self.request(|response| GameMessage::GetSnapshot { response })
            .await
    }

    pub async fn subscribe(
        &self,
        subscriber_id: Uuid,
        sender: mpsc::Sender<StateChangeNotification>,
    ) -> RoomResult<()> {
        self.send(GameMessage::Subscribe {
            subscriber_id,
            sender,
        })
        .await
    }

    pub async fn unsubscribe(&self, subscriber_id: Uuid) -> RoomResult<()> {
        self.send(GameMessage::Unsubscribe { subscriber_id }).await
    }

    pub async fn close(&self) -> RoomResult<()> {
        self.request(|response| GameMessage::Close { response })
            .await
            .map(|_| ())
    }
}

/// Game actor owning a single game
pub struct GameActor {
    /// Game ID
    id: GameId,

    /// Live game state
    machine: GameStateMachine,

    /// Message inbox
    inbox: mpsc::Receiver<GameMessage>,

    /// Where every committed snapshot is written
    store: Arc<dyn SnapshotStore>,

    config: RoomConfig,

    /// Turn on screen and when its summary ends
    summary_deadline: Option<(u32, Instant)>,

    /// Is game closed
    is_closed: bool,

    /// Subscribers for state change notifications
    subscribers: HashMap<Uuid, mpsc::Sender<StateChangeNotification>>,
}

impl GameActor {
    /// Create a new game actor around an already persisted game.
    ///
    /// A game restored mid-summary gets a fresh summary deadline.
    pub fn new(
        machine: GameStateMachine,
        store: Arc<dyn SnapshotStore>,
        config: RoomConfig,
    ) -> (Self, GameHandle) {
        let (sender, inbox) = mpsc::channel(config.inbox_capacity.max(1));
        let id = machine.id();

        let mut actor = Self {
            id,
            machine,
            inbox,
            store,
            config,
            summary_deadline: None,
            is_closed: false,
            subscribers: HashMap::new(),
        };
        actor.sync_summary_deadline();

        (actor, GameHandle::new(sender, id))
    }

    /// Run the game actor event loop
    pub async fn run(mut self) {
        info!("Game {} starting", self.id);

        let mut tick_interval = interval(self.config.tick_interval());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                message = self.inbox.recv() => {
                    match message {
                        Some(message) => self.handle_message(message).await,
                        // Every handle is gone, nobody can reach this game anymore.
                        None => break,
                    }

                    if self.is_closed {
                        break;
                    }
                }

                _ = tick_interval.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("Game {} stopped", self.id);
    }

    /// Handle a game message
    async fn handle_message(&mut self, message: GameMessage) {
        match message {
            GameMessage::Command { command, response } => {
                let result = self.handle_command(command).await;
                let _ = response.send(result);
            }

            GameMessage::GetView { viewer, response } => {
                let _ = response.send(self.machine.snapshot().view(viewer.as_ref()));
            }

            GameMessage::GetSnapshot { response } => {
                let _ = response.send(self.machine.snapshot().clone());
            }

            GameMessage::Tick => {
                self.tick().await;
            }

            GameMessage::Subscribe {
                subscriber_id,
                sender,
            } => {
                self.subscribers.insert(subscriber_id, sender);
                debug!("{subscriber_id} subscribed to game {}", self.id);
            }

            GameMessage::Unsubscribe { subscriber_id } => {
                self.subscribers.remove(&subscriber_id);
                debug!("{subscriber_id} unsubscribed from game {}", self.id);
            }

            GameMessage::Close { response } => {
                self.is_closed = true;
                self.notify_state_change(StateChangeNotification::Closed);
                let _ = response.send(GameResponse::Unchanged);
            }
        }
    }

    /// Apply, persist, then commit.
    async fn handle_command(&mut self, command: GameCommand) -> GameResponse {
        let mut next = self.machine.clone();
        let response = match next.apply(command) {
            Err(e) => GameResponse::Rejected(e),
            Ok(applied) if applied.stale => GameResponse::Stale,
            Ok(applied) if !applied.changed => GameResponse::Unchanged,
            Ok(applied) => {
                let expected = Some(self.machine.version());
                match self.store.save(next.snapshot(), expected).await {
                    Ok(()) => {
                        for event in &applied.events {
                            debug!("Game {}: {event}", self.id);
                        }
                        self.machine = next;
                        let notification = {
                            let snapshot = self.machine.snapshot();
                            StateChangeNotification::from_events(
                                snapshot.version,
                                snapshot.state.status,
                                &applied.events,
                            )
                        };
                        self.notify_state_change(notification);
                        GameResponse::Success {
                            version: self.machine.version(),
                            events: applied.events,
                        }
                    }
                    Err(StoreError::VersionConflict {
                        expected, actual, ..
                    }) => {
                        warn!(
                            "Game {}: store is at version {actual:?}, expected {expected:?}; reloading",
                            self.id
                        );
                        self.reload().await;
                        GameResponse::Stale
                    }
                    Err(e) => {
                        error!("Game {}: failed to persist snapshot: {e}", self.id);
                        GameResponse::StorageUnavailable(e.to_string())
                    }
                }
            }
        };
        self.sync_summary_deadline();
        response
    }

    /// Adopt whatever another writer stored.
    async fn reload(&mut self) {
        match self.store.load(self.id).await {
            Ok(Some(snapshot)) => {
                self.machine = GameStateMachine::from_snapshot(snapshot);
                let version = self.machine.version();
                self.notify_state_change(StateChangeNotification::StateChanged { version });
            }
            Ok(None) => warn!("Game {}: vanished from the store", self.id),
            Err(e) => error!("Game {}: reload failed: {e}", self.id),
        }
    }

    /// Resolve the summary on screen once its deadline has passed.
    async fn tick(&mut self) {
        if self.is_closed {
            return;
        }
        if let Some((turn, deadline)) = self.summary_deadline
            && Instant::now() >= deadline
        {
            debug!("Game {}: summary for turn {turn} expired", self.id);
            let response = self
                .handle_command(GameCommand::AdvanceSummary { turn })
                .await;
            if let Some(message) = response.error_message() {
                warn!("Game {}: advancing turn {turn} failed: {message}", self.id);
            }
        }
    }

    fn sync_summary_deadline(&mut self) {
        match self.machine.summary_turn() {
            Some(turn) if self.summary_deadline.map(|(t, _)| t) == Some(turn) => {}
            Some(turn) => {
                self.summary_deadline = Some((turn, Instant::now() + self.config.summary_delay()));
            }
            None => self.summary_deadline = None,
        }
    }

    /// Broadcast state change notification to all subscribers
    fn notify_state_change(&mut self, notification: StateChangeNotification) {
        self.subscribers
            .retain(|subscriber_id, sender| match sender.try_send(notification.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Subscriber {subscriber_id} channel full, dropping notification");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Subscriber {subscriber_id} disconnected, removing");
                    false
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::InMemorySnapshotStore,
        game::{
            UserError,
            entities::{GameConfig, GameStatus, TurnPhase},
        },
    };
    use std::time::Duration;

    async fn spawn_game() -> (GameHandle, Arc<InMemorySnapshotStore>) {
        let store = Arc::new(InMemorySnapshotStore::new());
        let machine = GameStateMachine::new(Uuid::new_v4(), GameConfig::default());
        store.save(machine.snapshot(), None).await.unwrap();
        let (actor, handle) = GameActor::new(machine, store.clone(), RoomConfig::default());
        tokio::spawn(actor.run());
        (handle, store)
    }

    async fn seat(handle: &GameHandle, names: &[&str]) -> Vec<PlayerId> {
        let mut ids = Vec::new();
        for name in names {
            let id = PlayerId::new(name);
            handle
                .command(GameCommand::Join { id: id.clone() })
                .await
                .unwrap();
            handle
                .command(GameCommand::SetName {
                    id: id.clone(),
                    name: name.to_string(),
                })
                .await
                .unwrap();
            ids.push(id);
        }
        ids
    }

    async fn submit_all(handle: &GameHandle, ids: &[PlayerId], amount: f64) {
        for id in ids {
            let response = handle
                .command(GameCommand::SubmitExtraction {
                    id: id.clone(),
                    amount,
                })
                .await
                .unwrap();
            assert!(response.is_success(), "{response:?}");
        }
    }

    #[tokio::test]
    async fn test_commands_are_persisted() {
        let (handle, store) = spawn_game().await;
        seat(&handle, &["a"]).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.version, 2);
        assert_eq!(store.load(handle.game_id()).await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_rejected_command_reports_error() {
        let (handle, _) = spawn_game().await;
        let response = handle.command(GameCommand::Start).await.unwrap();
        assert_eq!(response, GameResponse::Rejected(UserError::NotEnoughPlayers));
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_auto_advances_after_delay() {
        let (handle, _) = spawn_game().await;
        let ids = seat(&handle, &["a", "b", "c"]).await;
        handle.command(GameCommand::Start).await.unwrap();
        submit_all(&handle, &ids, 1_000_000.0).await;

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state.turn_phase, TurnPhase::Summary);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            handle.snapshot().await.unwrap().state.turn_phase,
            TurnPhase::Summary
        );

        tokio::time::sleep(Duration::from_secs(4)).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state.turn_phase, TurnPhase::Extracting);
        assert_eq!(snapshot.state.turn, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_advance_then_deadline_is_stale() {
        let (handle, _) = spawn_game().await;
        let ids = seat(&handle, &["a", "b", "c"]).await;
        handle.command(GameCommand::Start).await.unwrap();
        submit_all(&handle, &ids, 1_000_000.0).await;

        let response = handle
            .command(GameCommand::AdvanceSummary { turn: 1 })
            .await
            .unwrap();
        assert!(matches!(response, GameResponse::Success { .. }));
        let resolved = handle.snapshot().await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(handle.snapshot().await.unwrap(), resolved);
        assert_eq!(
            handle
                .command(GameCommand::AdvanceSummary { turn: 1 })
                .await
                .unwrap(),
            GameResponse::Stale
        );
    }

    #[tokio::test]
    async fn test_racing_submissions_resolve_once() {
        let (handle, _) = spawn_game().await;
        let ids = seat(&handle, &["a", "b", "c", "d", "e"]).await;
        handle.command(GameCommand::Start).await.unwrap();

        let tasks: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    handle
                        .command(GameCommand::SubmitExtraction { id, amount: 1.0 })
                        .await
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_success());
        }

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state.turn_phase, TurnPhase::Summary);
        assert_eq!(snapshot.state.summary.unwrap().total_extraction, 5.0);

        let responses = race_advance(&handle, 1).await;
        let successes = responses
            .iter()
            .filter(|r| matches!(r, GameResponse::Success { .. }))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(handle.snapshot().await.unwrap().state.turn, 2);
    }

    async fn race_advance(handle: &GameHandle, turn: u32) -> Vec<GameResponse> {
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    handle
                        .command(GameCommand::AdvanceSummary { turn })
                        .await
                })
            })
            .collect();
        let mut responses = Vec::new();
        for task in tasks {
            responses.push(task.await.unwrap().unwrap());
        }
        responses
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_game_untouched() {
        let (handle, store) = spawn_game().await;
        seat(&handle, &["a"]).await;
        let before = handle.snapshot().await.unwrap();

        store.set_unavailable(true);
        let response = handle
            .command(GameCommand::ToggleWealthVisibility)
            .await
            .unwrap();
        assert!(matches!(response, GameResponse::StorageUnavailable(_)));
        assert_eq!(handle.snapshot().await.unwrap(), before);

        store.set_unavailable(false);
        let response = handle
            .command(GameCommand::ToggleWealthVisibility)
            .await
            .unwrap();
        assert!(matches!(response, GameResponse::Success { version: 3, .. }));
    }

    #[tokio::test]
    async fn test_version_conflict_reloads_from_store() {
        let (handle, store) = spawn_game().await;
        let mut foreign = handle.snapshot().await.unwrap();
        foreign.version = 1;
        foreign.state.show_wealth = true;
        store.save(&foreign, Some(0)).await.unwrap();

        let response = handle
            .command(GameCommand::Join {
                id: PlayerId::new("a"),
            })
            .await
            .unwrap();
        assert_eq!(response, GameResponse::Stale);
        assert_eq!(handle.snapshot().await.unwrap(), foreign);
    }

    #[tokio::test]
    async fn test_subscribers_are_notified() {
        let (handle, _) = spawn_game().await;
        let (tx, mut rx) = mpsc::channel(10);
        handle.subscribe(Uuid::new_v4(), tx).await.unwrap();
        handle
            .command(GameCommand::Join {
                id: PlayerId::new("a"),
            })
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(StateChangeNotification::PlayerListChanged { version: 1 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bankruptcy_notifies_game_over() {
        let (handle, _) = spawn_game().await;
        let ids = seat(&handle, &["a", "b", "c"]).await;
        handle
            .command(GameCommand::Configure {
                change: crate::game::entities::ConfigChange::StartingTreasury(1_000_000.0),
            })
            .await
            .unwrap();
        handle.command(GameCommand::Start).await.unwrap();

        let (tx, mut rx) = mpsc::channel(10);
        handle.subscribe(Uuid::new_v4(), tx).await.unwrap();
        submit_all(&handle, &ids, 5_000_000.0).await;

        let mut last = None;
        while let Ok(notification) = rx.try_recv() {
            last = Some(notification);
        }
        assert!(matches!(
            last,
            Some(StateChangeNotification::GameOver {
                status: GameStatus::Lost,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_close_stops_actor() {
        let (handle, _) = spawn_game().await;
        handle.close().await.unwrap();
        assert!(matches!(
            handle.snapshot().await,
            Err(RoomError::Closed | RoomError::ResponseDropped)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restored_summary_gets_new_deadline() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let mut machine = GameStateMachine::new(Uuid::new_v4(), GameConfig::default());
        for name in ["a", "b", "c"] {
            let id = PlayerId::new(name);
            machine.apply(GameCommand::Join { id: id.clone() }).unwrap();
            machine
                .apply(GameCommand::SetName {
                    id,
                    name: name.to_string(),
                })
                .unwrap();
        }
        machine.apply(GameCommand::Start).unwrap();
        for name in ["a", "b", "c"] {
            machine
                .apply(GameCommand::SubmitExtraction {
                    id: PlayerId::new(name),
                    amount: 1.0,
                })
                .unwrap();
        }
        store.save(machine.snapshot(), None).await.unwrap();

        let (actor, handle) = GameActor::new(machine, store.clone(), RoomConfig::default());
        tokio::spawn(actor.run());
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(handle.snapshot().await.unwrap().state.turn, 2);
    }
}
