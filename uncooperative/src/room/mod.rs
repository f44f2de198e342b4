//! Room module providing multi-game support with an async actor model.
//!
//! This module implements:
//! - GameActor: async actor owning a single game
//! - GameManager: spawns, restores and closes game actors
//! - Message-based communication with tokio channels
//!
//! ## Architecture
//!
//! Each game runs in a separate Tokio task with an mpsc message inbox. All
//! reads and writes of a game go through that inbox, so submissions racing
//! for the last slot of a turn are applied one at a time and the turn is
//! resolved exactly once.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use uncooperative::{
//!     GameCommand, GameConfig, PlayerId,
//!     db::InMemorySnapshotStore,
//!     room::{GameManager, RoomConfig},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemorySnapshotStore::new());
//!     let manager = GameManager::new(store, RoomConfig::default(), GameConfig::default());
//!     let game_id = manager.create_game(None).await?;
//!     manager
//!         .send_command(game_id, GameCommand::Join { id: PlayerId::new("alice") })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod actor;
pub mod config;
pub mod errors;
pub mod manager;
pub mod messages;

pub use actor::{GameActor, GameHandle};
pub use config::RoomConfig;
pub use errors::{RoomError, RoomResult};
pub use manager::{GameManager, GameMetadata};
pub use messages::{GameMessage, GameResponse, StateChangeNotification};
