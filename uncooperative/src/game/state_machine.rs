//! Game state machine.
//!
//! A game moves `waiting -> extracting -> (summary -> extracting)* -> ended`.
//! [`GameStateMachine::apply`] is the only way to change a game: each command
//! is reduced against a copy of the current snapshot and the copy replaces the
//! original only if the command succeeds, so a rejected command never leaves a
//! half-applied round behind.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::{
    constants::QUORUM,
    entities::{
        ConfigChange, GameConfig, GameId, GameSnapshot, GameStatus, PlayerId, Standing,
        TurnPhase, TurnSummary, Usd,
    },
    resolver::{self, Resolution, ResolveMode, TurnOutcome},
};

/// Errors that can occur when a command doesn't fit the game's current state
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum UserError {
    #[error("game already in progress")]
    GameAlreadyInProgress,
    #[error("game not in progress")]
    GameNotInProgress,
    #[error("need 3+ named players")]
    NotEnoughPlayers,
    #[error("game is full")]
    CapacityReached,
    #[error("user does not exist")]
    UserDoesNotExist,
    #[error("pick a name first")]
    UserNotRegistered,
    #[error("already submitted this turn")]
    AlreadySubmitted,
    #[error("not accepting extractions right now")]
    NotExtracting,
    #[error("waiting on submissions")]
    MissingSubmissions,
}

/// Events that occur during gameplay
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum GameEvent {
    Joined(PlayerId),
    Named { id: PlayerId, name: String },
    Submitted(PlayerId),
    Left(PlayerId),
    Removed(PlayerId),
    /// Unnamed players dropped when the game started.
    Dropped(PlayerId),
    PlayersCleared(usize),
    ConfigChanged(GameConfig),
    WealthVisibility(bool),
    Started { turn: u32, treasury: Usd },
    SummaryReady { turn: u32, summary: TurnSummary },
    TurnResolved {
        turn: u32,
        total_extraction: Usd,
        interest: Usd,
        treasury: Usd,
    },
    Won { winner: Option<Standing> },
    Lost { turn: u32 },
    Reset,
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Joined(id) => format!("{id} joined the game"),
            Self::Named { id, name } => format!("{id} is now {name}"),
            Self::Submitted(id) => format!("{id} submitted an extraction"),
            Self::Left(id) => format!("{id} left the game"),
            Self::Removed(id) => format!("{id} removed from the game"),
            Self::Dropped(id) => format!("{id} dropped for not picking a name"),
            Self::PlayersCleared(count) => format!("cleared {count} players"),
            Self::ConfigChanged(config) => format!(
                "config: {} turns, {:.0}% interest, ${:.0} max extraction, ${:.0} treasury",
                config.max_turns,
                config.interest_rate * 100.0,
                config.max_extraction_per_player,
                config.starting_treasury
            ),
            Self::WealthVisibility(true) => "wealth is now public".to_string(),
            Self::WealthVisibility(false) => "wealth is now hidden".to_string(),
            Self::Started { turn, treasury } => {
                format!("game started on turn {turn} with ${treasury:.0}")
            }
            Self::SummaryReady { turn, summary } => format!(
                "turn {turn}: ${:.0} extracted, treasury heading to ${:.0}",
                summary.total_extraction, summary.projected_treasury
            ),
            Self::TurnResolved {
                turn,
                total_extraction,
                interest,
                treasury,
            } => format!(
                "turn {turn} resolved: ${total_extraction:.0} extracted, ${interest:.0} interest, ${treasury:.0} left"
            ),
            Self::Won {
                winner: Some(winner),
            } => format!("treasury survived, {} wins", winner.name),
            Self::Won { winner: None } => "treasury survived".to_string(),
            Self::Lost { turn } => format!("treasury went bankrupt on turn {turn}"),
            Self::Reset => "game reset".to_string(),
        };
        write!(f, "{repr}")
    }
}

/// Everything a client or host can ask of a game.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum GameCommand {
    Join { id: PlayerId },
    SetName { id: PlayerId, name: String },
    SubmitExtraction { id: PlayerId, amount: Usd },
    Leave { id: PlayerId },
    RemovePlayer { id: PlayerId },
    ClearPlayers,
    Configure { change: ConfigChange },
    ToggleWealthVisibility,
    Start,
    /// Resolve the summary of `turn`. Anything but the current summary turn
    /// is a stale trigger and changes nothing.
    AdvanceSummary { turn: u32 },
    Reset,
}

/// Result of applying a command.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Applied {
    pub events: Vec<GameEvent>,
    pub changed: bool,
    /// The command targeted a turn that has already moved on.
    pub stale: bool,
}

impl Applied {
    #[must_use]
    pub fn unchanged() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stale() -> Self {
        Self {
            stale: true,
            ..Self::default()
        }
    }

    fn with_events(events: Vec<GameEvent>) -> Self {
        Self {
            events,
            changed: true,
            stale: false,
        }
    }
}

/// Owns one game's snapshot and applies commands to it.
#[derive(Clone, Debug)]
pub struct GameStateMachine {
    snapshot: GameSnapshot,
}

impl GameStateMachine {
    #[must_use]
    pub fn new(id: GameId, config: GameConfig) -> Self {
        Self {
            snapshot: GameSnapshot::new(id, config),
        }
    }

    #[must_use]
    pub fn from_snapshot(snapshot: GameSnapshot) -> Self {
        Self { snapshot }
    }

    #[must_use]
    pub fn snapshot(&self) -> &GameSnapshot {
        &self.snapshot
    }

    #[must_use]
    pub fn into_snapshot(self) -> GameSnapshot {
        self.snapshot
    }

    #[must_use]
    pub fn id(&self) -> GameId {
        self.snapshot.id
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.snapshot.version
    }

    /// Turn whose summary is on screen, if any.
    #[must_use]
    pub fn summary_turn(&self) -> Option<u32> {
        (self.snapshot.state.turn_phase == TurnPhase::Summary).then_some(self.snapshot.state.turn)
    }

    /// Apply a command. On error the snapshot is untouched.
    pub fn apply(&mut self, command: GameCommand) -> Result<Applied, UserError> {
        let mut next = self.snapshot.clone();
        let applied = reduce(&mut next, command)?;
        if applied.changed {
            next.version += 1;
            self.snapshot = next;
        }
        Ok(applied)
    }
}

fn reduce(snapshot: &mut GameSnapshot, command: GameCommand) -> Result<Applied, UserError> {
    let mut events = Vec::new();
    match command {
        GameCommand::Join { id } => {
            if id.is_empty() {
                return Err(UserError::UserDoesNotExist);
            }
            if snapshot.state.status != GameStatus::Waiting {
                return if snapshot.players.contains(&id) {
                    Ok(Applied::unchanged())
                } else {
                    Err(UserError::GameAlreadyInProgress)
                };
            }
            if !snapshot.players.join(id.clone(), snapshot.config.max_players)? {
                return Ok(Applied::unchanged());
            }
            events.push(GameEvent::Joined(id));
        }
        GameCommand::SetName { id, name } => {
            if !snapshot.players.set_name(&id, &name)? {
                return Ok(Applied::unchanged());
            }
            let name = snapshot
                .players
                .get(&id)
                .map(|p| p.display_name().to_string())
                .unwrap_or_default();
            events.push(GameEvent::Named { id, name });
        }
        GameCommand::SubmitExtraction { id, amount } => {
            if snapshot.state.status != GameStatus::Playing {
                return Err(UserError::GameNotInProgress);
            }
            if snapshot.state.turn_phase != TurnPhase::Extracting {
                return Err(UserError::NotExtracting);
            }
            let max = snapshot.config.max_extraction_per_player;
            let amount = snapshot.players.submit_extraction(&id, amount, max)?;
            debug!(
                "game {}: {id} submitted {amount} on turn {}",
                snapshot.id, snapshot.state.turn
            );
            events.push(GameEvent::Submitted(id));
            check_turn_complete(snapshot, &mut events)?;
        }
        GameCommand::Leave { id } => {
            snapshot
                .players
                .remove(&id)
                .ok_or(UserError::UserDoesNotExist)?;
            events.push(GameEvent::Left(id));
            reevaluate_after_departure(snapshot, &mut events)?;
        }
        GameCommand::RemovePlayer { id } => {
            snapshot
                .players
                .remove(&id)
                .ok_or(UserError::UserDoesNotExist)?;
            events.push(GameEvent::Removed(id));
            reevaluate_after_departure(snapshot, &mut events)?;
        }
        GameCommand::ClearPlayers => {
            if snapshot.state.status != GameStatus::Waiting {
                return Err(UserError::GameAlreadyInProgress);
            }
            let count = snapshot.players.clear();
            if count == 0 {
                return Ok(Applied::unchanged());
            }
            events.push(GameEvent::PlayersCleared(count));
        }
        GameCommand::Configure { change } => {
            if snapshot.state.status != GameStatus::Waiting {
                return Err(UserError::GameAlreadyInProgress);
            }
            let config = change.apply_to(&snapshot.config);
            if config == snapshot.config {
                return Ok(Applied::unchanged());
            }
            snapshot.state.treasury = config.starting_treasury;
            snapshot.config = config.clone();
            events.push(GameEvent::ConfigChanged(config));
        }
        GameCommand::ToggleWealthVisibility => {
            snapshot.state.show_wealth = !snapshot.state.show_wealth;
            events.push(GameEvent::WealthVisibility(snapshot.state.show_wealth));
        }
        GameCommand::Start => {
            if snapshot.state.status != GameStatus::Waiting {
                return Err(UserError::GameAlreadyInProgress);
            }
            if snapshot.players.active_count() < QUORUM {
                return Err(UserError::NotEnoughPlayers);
            }
            events.extend(
                snapshot
                    .players
                    .drop_unnamed()
                    .into_iter()
                    .map(GameEvent::Dropped),
            );
            snapshot.players.reset_wealth();
            snapshot.players.clear_pending();
            let state = &mut snapshot.state;
            state.status = GameStatus::Playing;
            state.turn_phase = TurnPhase::Extracting;
            state.turn = 1;
            state.treasury = snapshot.config.starting_treasury;
            state.summary = None;
            info!(
                "game {} started with {} players",
                snapshot.id,
                snapshot.players.active_count()
            );
            events.push(GameEvent::Started {
                turn: state.turn,
                treasury: state.treasury,
            });
        }
        GameCommand::AdvanceSummary { turn } => {
            if snapshot.state.turn_phase != TurnPhase::Summary || snapshot.state.turn != turn {
                debug!(
                    "game {}: ignoring stale advance for turn {turn}",
                    snapshot.id
                );
                return Ok(Applied::stale());
            }
            let resolution = resolver::resolve(
                &snapshot.config,
                &snapshot.state,
                &snapshot.players,
                ResolveMode::Normal,
            )?;
            commit_resolution(snapshot, resolution, &mut events);
        }
        GameCommand::Reset => {
            let state = &mut snapshot.state;
            state.status = GameStatus::Waiting;
            state.turn_phase = TurnPhase::Idle;
            state.turn = 0;
            state.treasury = snapshot.config.starting_treasury;
            state.summary = None;
            snapshot.players.clear_pending();
            info!("game {} reset", snapshot.id);
            events.push(GameEvent::Reset);
        }
    }
    Ok(Applied::with_events(events))
}

/// Once every active player has submitted, either go bankrupt right away or
/// show the summary of what the round will do.
fn check_turn_complete(
    snapshot: &mut GameSnapshot,
    events: &mut Vec<GameEvent>,
) -> Result<(), UserError> {
    if snapshot.state.status != GameStatus::Playing
        || snapshot.state.turn_phase != TurnPhase::Extracting
        || !snapshot.players.all_submitted()
    {
        return Ok(());
    }
    let summary = resolver::preview(&snapshot.config, &snapshot.state, &snapshot.players);
    if summary.depletes_treasury() {
        let resolution = resolver::resolve(
            &snapshot.config,
            &snapshot.state,
            &snapshot.players,
            ResolveMode::Normal,
        )?;
        commit_resolution(snapshot, resolution, events);
        return Ok(());
    }
    snapshot.state.turn_phase = TurnPhase::Summary;
    snapshot.state.summary = Some(summary);
    events.push(GameEvent::SummaryReady {
        turn: snapshot.state.turn,
        summary,
    });
    Ok(())
}

/// A player left mid-game: the remaining players may now all have
/// submitted, or a summary on screen may be out of date.
fn reevaluate_after_departure(
    snapshot: &mut GameSnapshot,
    events: &mut Vec<GameEvent>,
) -> Result<(), UserError> {
    if snapshot.state.status != GameStatus::Playing {
        return Ok(());
    }
    match snapshot.state.turn_phase {
        TurnPhase::Extracting => check_turn_complete(snapshot, events),
        TurnPhase::Summary if snapshot.players.active_count() == 0 => {
            snapshot.state.turn_phase = TurnPhase::Extracting;
            snapshot.state.summary = None;
            Ok(())
        }
        TurnPhase::Summary => {
            let summary = resolver::preview(&snapshot.config, &snapshot.state, &snapshot.players);
            snapshot.state.summary = Some(summary);
            events.push(GameEvent::SummaryReady {
                turn: snapshot.state.turn,
                summary,
            });
            Ok(())
        }
        TurnPhase::Idle | TurnPhase::Ended => Ok(()),
    }
}

fn commit_resolution(
    snapshot: &mut GameSnapshot,
    resolution: Resolution,
    events: &mut Vec<GameEvent>,
) {
    let turn = snapshot.state.turn;
    snapshot.state = resolution.state;
    snapshot.players = resolution.players;
    events.push(GameEvent::TurnResolved {
        turn,
        total_extraction: resolution.total_extraction,
        interest: resolution.interest,
        treasury: snapshot.state.treasury,
    });
    match resolution.outcome {
        TurnOutcome::Continue => {}
        TurnOutcome::Won => {
            let winner = snapshot.winner();
            info!(
                "game {} won after {turn} turns, winner: {}",
                snapshot.id,
                winner.as_ref().map_or("nobody", |w| w.name.as_str())
            );
            events.push(GameEvent::Won { winner });
        }
        TurnOutcome::Lost => {
            info!("game {} went bankrupt on turn {turn}", snapshot.id);
            events.push(GameEvent::Lost { turn });
        }
    }
}
