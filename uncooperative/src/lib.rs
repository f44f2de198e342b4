//! # Uncooperative
//!
//! A tragedy-of-the-commons coordination game engine. A handful of players
//! repeatedly extract money from a shared, interest-bearing treasury. If the
//! treasury runs dry everybody loses; if it survives the configured number of
//! turns the wealthiest player wins.
//!
//! ## Architecture
//!
//! The rules live in pure, synchronous code under [`game`]:
//!
//! - **Resolver**: turns one round of submissions into the next state
//! - **Solver**: brute-force search for the wealth-maximizing uniform extraction rate
//! - **Registry**: joined players, names, wealth and pending submissions
//! - **State machine**: a reducer applying [`GameCommand`]s to a [`GameSnapshot`]
//!
//! Each running game is owned by exactly one [`room::GameActor`] task. Every other
//! caller holds a cloneable [`room::GameHandle`] and talks to the actor through
//! its message inbox, so a turn is resolved exactly once no matter how many
//! submissions race for it.
//!
//! ## Core Modules
//!
//! - [`game`]: rules, entities and the state machine
//! - [`room`]: per-game actors and the game manager
//! - [`db`]: snapshot persistence (in-memory and PostgreSQL)
//! - [`bot`]: strategy bots and the balance simulation
//!
//! ## Example
//!
//! ```
//! use uncooperative::{GameCommand, GameConfig, GameStateMachine, PlayerId};
//! use uuid::Uuid;
//!
//! let mut game = GameStateMachine::new(Uuid::new_v4(), GameConfig::default());
//! let alice = PlayerId::new("alice");
//! game.apply(GameCommand::Join { id: alice.clone() }).unwrap();
//! game.apply(GameCommand::SetName { id: alice, name: "Alice".into() }).unwrap();
//! assert_eq!(game.snapshot().players.active_count(), 1);
//! ```

/// Core game rules, entities, and state machine.
pub mod game;
pub use game::{
    GameCommand, GameEvent, GameStateMachine, UserError,
    constants::{self, MAX_PLAYERS, QUORUM},
    entities::{
        self, ConfigChange, ConfigField, GameConfig, GameId, GameSnapshot, GameState,
        GameStatus, GameView, Player, PlayerId, Standing, TurnPhase, TurnSummary, Usd,
    },
    registry::PlayerRegistry,
    resolver, solver,
};

/// Snapshot persistence.
pub mod db;

/// Per-game actors and the manager that spawns them.
pub mod room;

/// Strategy bots and the balance simulation built on top of them.
pub mod bot;
