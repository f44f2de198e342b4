//! Advisory solver for the collectively optimal extraction rate.
//!
//! Every player taking the same amount each turn, which rate gets the most
//! money out of the treasury before the game ends? The answer is found by a
//! brute-force scan over `[0, max_extraction_per_player]`, replaying the same
//! extract-then-interest arithmetic the resolver uses.
//!
//! The work is bounded: at most [`SOLVER_MAX_CANDIDATES`] rates are tried and
//! each replays at most [`MAX_TURNS_LIMIT`] turns.

use serde::{Deserialize, Serialize};

use super::{
    UserError,
    constants::{MAX_TURNS_LIMIT, QUORUM, SOLVER_MAX_CANDIDATES, SOLVER_STEP},
    entities::{GameConfig, Usd},
};

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct OptimalExtraction {
    pub rate_per_player: Usd,
    pub total_extracted: Usd,
}

/// Total extracted by `player_count` players each taking `rate` per turn for
/// the configured number of turns. The last extraction is capped by whatever
/// is left in the treasury.
#[must_use]
pub fn simulate_uniform(config: &GameConfig, player_count: usize, rate: Usd) -> Usd {
    let demand = rate.max(0.0) * player_count as f64;
    if demand <= 0.0 || demand.is_nan() {
        return 0.0;
    }
    let mut treasury = config.starting_treasury;
    let mut total = 0.0;
    for _ in 0..config.max_turns.min(MAX_TURNS_LIMIT) {
        if treasury <= 0.0 || treasury.is_nan() {
            break;
        }
        let actual = demand.min(treasury);
        treasury -= actual;
        total += actual;
        treasury += treasury * config.interest_rate;
    }
    total
}

/// Solve with the default [`SOLVER_STEP`].
///
/// # Errors
///
/// Returns [`UserError::NotEnoughPlayers`] below the start quorum.
pub fn solve(config: &GameConfig, player_count: usize) -> Result<OptimalExtraction, UserError> {
    solve_with_step(config, player_count, SOLVER_STEP)
}

/// Scan candidate rates `0, step, 2*step, ...` up to and including the max
/// extraction. Ties keep the lowest rate. The step is widened when the scan
/// would exceed [`SOLVER_MAX_CANDIDATES`] rates.
///
/// # Errors
///
/// Returns [`UserError::NotEnoughPlayers`] below the start quorum.
pub fn solve_with_step(
    config: &GameConfig,
    player_count: usize,
    step: Usd,
) -> Result<OptimalExtraction, UserError> {
    if player_count < QUORUM {
        return Err(UserError::NotEnoughPlayers);
    }
    let step = if step.is_finite() && step > 0.0 {
        step
    } else {
        SOLVER_STEP
    };
    let max = if config.max_extraction_per_player.is_finite() {
        config.max_extraction_per_player.max(0.0)
    } else {
        0.0
    };
    let step = step.max(max / SOLVER_MAX_CANDIDATES as f64);

    let mut best = OptimalExtraction {
        rate_per_player: 0.0,
        total_extracted: simulate_uniform(config, player_count, 0.0),
    };
    let mut consider = |rate: Usd| {
        let total_extracted = simulate_uniform(config, player_count, rate);
        if total_extracted > best.total_extracted {
            best = OptimalExtraction {
                rate_per_player: rate,
                total_extracted,
            };
        }
    };

    // Index-based candidates so the grid doesn't accumulate float error.
    let steps = ((max / step).floor() as u64).min(SOLVER_MAX_CANDIDATES);
    for idx in 1..=steps {
        consider(idx as f64 * step);
    }
    if (steps as f64 * step) < max {
        consider(max);
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_requires_quorum() {
        let config = GameConfig::default();
        assert_eq!(solve(&config, 2), Err(UserError::NotEnoughPlayers));
        assert!(solve(&config, 3).is_ok());
    }

    #[test]
    fn test_simulate_uniform_caps_final_extraction() {
        let config = GameConfig::new(10, 0.0, 50.0, 100.0);
        // 3 * 40 = 120 demanded on turn one, only 100 available.
        assert_eq!(simulate_uniform(&config, 3, 40.0), 100.0);
        assert_eq!(simulate_uniform(&config, 3, 0.0), 0.0);
    }

    #[test]
    fn test_simulate_uniform_compounds_interest() {
        let config = GameConfig::new(2, 0.5, 10.0, 100.0);
        // Turn 1: take 30, 70 left, grows to 105. Turn 2: take 30.
        assert_eq!(simulate_uniform(&config, 3, 10.0), 60.0);
    }

    #[test]
    fn test_ties_keep_lowest_rate() {
        let config = GameConfig::new(1, 0.0, 100.0, 100.0);
        let best = solve_with_step(&config, 3, 1.0).unwrap();
        // Anything from 34 up drains the treasury on the only turn.
        assert_eq!(best.rate_per_player, 34.0);
        assert_eq!(best.total_extracted, 100.0);
    }

    #[test]
    fn test_max_is_considered_off_grid() {
        let config = GameConfig::new(1, 0.0, 2.5, 1_000.0);
        let best = solve_with_step(&config, 3, 1.0).unwrap();
        assert_eq!(best.rate_per_player, 2.5);
    }

    #[test]
    fn test_invalid_step_falls_back() {
        let config = GameConfig::default();
        let default = solve(&config, 4).unwrap();
        assert_eq!(solve_with_step(&config, 4, 0.0).unwrap(), default);
        assert_eq!(solve_with_step(&config, 4, f64::NAN).unwrap(), default);
    }

    #[test]
    fn test_huge_max_extraction_is_scanned_coarsely() {
        let config = GameConfig {
            max_extraction_per_player: 1e300,
            ..GameConfig::default()
        };
        let best = solve(&config, 4).unwrap();
        // Every candidate drains the 40M treasury on the first turn.
        assert_eq!(best.total_extracted, config.starting_treasury);
        assert_eq!(best.rate_per_player, 1e300 / SOLVER_MAX_CANDIDATES as f64);
    }

    #[test]
    fn test_turns_beyond_limit_are_not_replayed() {
        let capped = GameConfig::new(u32::MAX, 0.5, 5_000_000.0, 40_000_000.0);
        let raw = GameConfig {
            max_turns: u32::MAX,
            ..capped.clone()
        };
        assert_eq!(capped.max_turns, MAX_TURNS_LIMIT);
        assert_eq!(
            simulate_uniform(&raw, 4, 1_000_000.0),
            simulate_uniform(&capped, 4, 1_000_000.0)
        );
        assert_eq!(solve(&raw, 4).unwrap(), solve(&capped, 4).unwrap());
    }

    #[test]
    fn test_zero_rate_extracts_nothing() {
        let config = GameConfig {
            max_turns: u32::MAX,
            ..GameConfig::default()
        };
        assert_eq!(simulate_uniform(&config, 5, 0.0), 0.0);
        assert_eq!(simulate_uniform(&config, 5, f64::NAN), 0.0);
    }

    // Scenario: 60M treasury, 10% interest, 5M max, 10 turns, 4 players.
    #[test]
    fn test_solver_beats_coarse_grid() {
        let config = GameConfig::new(10, 0.10, 5_000_000.0, 60_000_000.0);
        let best = solve(&config, 4).unwrap();
        assert!(best.rate_per_player >= 0.0);
        assert!(best.rate_per_player <= config.max_extraction_per_player);
        for idx in 0..=10 {
            let rate = idx as f64 * 500_000.0;
            assert!(best.total_extracted >= simulate_uniform(&config, 4, rate));
        }
        assert_eq!(
            best.total_extracted,
            simulate_uniform(&config, 4, best.rate_per_player)
        );
    }
}
