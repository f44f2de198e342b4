//! Turn resolution.
//!
//! Resolution is a pure function of a game's config, state and players: it
//! takes every active player's pending extraction out of the treasury, pays it
//! to them, and either grows the remainder by the interest rate or declares the
//! game lost when nothing remains. Callers decide what to do with the result.

use serde::{Deserialize, Serialize};

use super::{
    UserError,
    entities::{GameConfig, GameState, GameStatus, TurnPhase, TurnSummary, Usd, non_negative},
    registry::PlayerRegistry,
};

/// How to treat active players that haven't submitted.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum ResolveMode {
    /// Every active player must have submitted.
    #[default]
    Normal,
    /// Missing submissions count as zero.
    Forced,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TurnOutcome {
    /// Treasury survived and there are turns left.
    Continue,
    Won,
    /// Treasury was depleted.
    Lost,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub state: GameState,
    pub players: PlayerRegistry,
    pub total_extraction: Usd,
    pub interest: Usd,
    pub outcome: TurnOutcome,
}

fn pending_total(players: &PlayerRegistry) -> Usd {
    players
        .active()
        .map(|p| non_negative(p.pending_extraction.unwrap_or(0.0)))
        .sum()
}

/// What resolving the current submissions would do, without doing it.
#[must_use]
pub fn preview(config: &GameConfig, state: &GameState, players: &PlayerRegistry) -> TurnSummary {
    let total_extraction = pending_total(players);
    let post_extraction_treasury = (state.treasury - total_extraction).max(0.0);
    let interest = post_extraction_treasury * config.interest_rate;
    TurnSummary {
        total_extraction,
        post_extraction_treasury,
        interest,
        projected_treasury: post_extraction_treasury + interest,
    }
}

/// Resolve the current turn.
///
/// # Errors
///
/// - [`UserError::GameNotInProgress`] unless the game is playing and a turn
///   is in flight.
/// - [`UserError::MissingSubmissions`] if nobody is active, or in
///   [`ResolveMode::Normal`] if an active player hasn't submitted.
pub fn resolve(
    config: &GameConfig,
    state: &GameState,
    players: &PlayerRegistry,
    mode: ResolveMode,
) -> Result<Resolution, UserError> {
    if state.status != GameStatus::Playing
        || !matches!(state.turn_phase, TurnPhase::Extracting | TurnPhase::Summary)
    {
        return Err(UserError::GameNotInProgress);
    }
    if players.active_count() == 0 {
        return Err(UserError::MissingSubmissions);
    }
    if mode == ResolveMode::Normal && !players.all_submitted() {
        return Err(UserError::MissingSubmissions);
    }

    let summary = preview(config, state, players);
    let mut next_state = state.clone();
    let mut next_players = players.clone();
    for player in next_players.active_mut() {
        player.wealth += non_negative(player.pending_extraction.unwrap_or(0.0));
    }
    next_players.clear_pending();
    next_state.summary = None;

    if summary.depletes_treasury() {
        next_state.treasury = 0.0;
        next_state.status = GameStatus::Lost;
        next_state.turn_phase = TurnPhase::Ended;
        return Ok(Resolution {
            state: next_state,
            players: next_players,
            total_extraction: summary.total_extraction,
            interest: 0.0,
            outcome: TurnOutcome::Lost,
        });
    }

    next_state.treasury = summary.projected_treasury;
    next_state.turn += 1;
    let outcome = if next_state.turn >= config.max_turns {
        next_state.status = GameStatus::Won;
        next_state.turn_phase = TurnPhase::Ended;
        TurnOutcome::Won
    } else {
        next_state.turn_phase = TurnPhase::Extracting;
        TurnOutcome::Continue
    };

    Ok(Resolution {
        state: next_state,
        players: next_players,
        total_extraction: summary.total_extraction,
        interest: summary.interest,
        outcome,
    })
}
