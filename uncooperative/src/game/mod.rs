//! Game engine - rules, entities and the turn state machine.
//!
//! This module provides the foundational game implementation including:
//! - Game configuration, state and player entities
//! - The pure turn resolver and extraction solver
//! - The player registry
//! - The reducer-style state machine that owns a game's snapshot

pub mod constants;
pub mod entities;
pub mod registry;
pub mod resolver;
pub mod solver;

mod state_machine;

pub use state_machine::*;
