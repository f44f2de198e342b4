//! Balance simulation: whole games played by strategy bots through the real
//! state machine, batched into bankruptcy rates.

use log::debug;
use rand::{rngs::StdRng, seq::SliceRandom};
use serde::Serialize;
use uuid::Uuid;

use super::models::{Greedy, Opportunistic, Strategy, StrategyKind, TurnContext};
use crate::game::{
    GameCommand, GameEvent, GameStateMachine, UserError,
    entities::{GameConfig, GameStatus, PlayerId, Standing, Usd},
};

/// Starting treasuries tried by [`autotune`].
pub const TUNE_TREASURIES: [Usd; 6] = [
    50_000_000.0,
    75_000_000.0,
    100_000_000.0,
    125_000_000.0,
    150_000_000.0,
    200_000_000.0,
];

/// Max extractions tried by [`autotune`].
pub const TUNE_MAX_EXTRACTIONS: [Usd; 6] = [
    2_500_000.0,
    3_750_000.0,
    5_000_000.0,
    7_500_000.0,
    10_000_000.0,
    15_000_000.0,
];

/// The bankruptcy rate a balanced game should land on.
pub const TARGET_BANKRUPTCY_RATE: f64 = 0.5;

/// How one simulated game ended.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GameRecord {
    pub bankrupt: bool,
    pub turns_resolved: u32,
    pub final_treasury: Usd,
    pub standings: Vec<Standing>,
}

/// Aggregate of a batch of games played with the same config and mix.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub games: usize,
    pub bankruptcies: usize,
    pub total_turns: u64,
}

impl BatchReport {
    #[must_use]
    pub fn bankruptcy_rate(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        self.bankruptcies as f64 / self.games as f64
    }

    #[must_use]
    pub fn mean_turns(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        self.total_turns as f64 / self.games as f64
    }

    fn record(&mut self, game: &GameRecord) {
        self.games += 1;
        self.total_turns += u64::from(game.turns_resolved);
        if game.bankrupt {
            self.bankruptcies += 1;
        }
    }
}

/// One cell of a parameter sweep.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SweepPoint {
    pub max_extraction: Usd,
    pub interest_rate: f64,
    pub report: BatchReport,
}

/// Best config found for a player count.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TuneResult {
    pub player_count: usize,
    pub config: GameConfig,
    pub report: BatchReport,
}

/// One greedy player, everyone else opportunistic.
#[must_use]
pub fn default_mix(player_count: usize) -> Vec<StrategyKind> {
    let mut mix = Vec::with_capacity(player_count);
    if player_count > 0 {
        mix.push(Greedy.into());
    }
    mix.extend((1..player_count).map(|_| StrategyKind::from(Opportunistic::default())));
    mix
}

/// Play one game to the end with one bot per strategy, seated in order.
///
/// # Errors
///
/// Fails when the mix doesn't fit the table: fewer than the quorum or more
/// than the player cap.
pub fn run_game(
    config: &GameConfig,
    seats: &[StrategyKind],
    rng: &mut StdRng,
) -> Result<GameRecord, UserError> {
    let config = GameConfig {
        max_players: seats.len(),
        ..config.clone()
    };
    let mut machine = GameStateMachine::new(Uuid::nil(), config);

    let bots: Vec<(PlayerId, StrategyKind)> = seats
        .iter()
        .enumerate()
        .map(|(seat, strategy)| (PlayerId::new(&format!("bot-{seat}")), *strategy))
        .collect();
    for (seat, (id, strategy)) in bots.iter().enumerate() {
        machine.apply(GameCommand::Join { id: id.clone() })?;
        machine.apply(GameCommand::SetName {
            id: id.clone(),
            name: format!("{}-{seat}", strategy.label()),
        })?;
    }
    machine.apply(GameCommand::Start)?;

    let mut turns_resolved = 0;
    while machine.snapshot().state.status == GameStatus::Playing {
        let ctx = TurnContext::from_snapshot(machine.snapshot());
        let mut events = Vec::new();
        for (id, strategy) in &bots {
            let amount = strategy.extraction(&ctx, rng);
            events.extend(
                machine
                    .apply(GameCommand::SubmitExtraction {
                        id: id.clone(),
                        amount,
                    })?
                    .events,
            );
        }
        if let Some(turn) = machine.summary_turn() {
            events.extend(machine.apply(GameCommand::AdvanceSummary { turn })?.events);
        }
        let resolved = events
            .iter()
            .filter(|event| matches!(event, GameEvent::TurnResolved { .. }))
            .count();
        if resolved == 0 {
            return Err(UserError::MissingSubmissions);
        }
        turns_resolved += resolved as u32;
    }

    let snapshot = machine.into_snapshot();
    Ok(GameRecord {
        bankrupt: snapshot.state.status == GameStatus::Lost,
        turns_resolved,
        final_treasury: snapshot.state.treasury,
        standings: snapshot.standings(),
    })
}

/// Play `games` games, reshuffling the seating before each one.
///
/// # Errors
///
/// See [`run_game`].
pub fn simulate_batch(
    config: &GameConfig,
    mix: &[StrategyKind],
    games: usize,
    rng: &mut StdRng,
) -> Result<BatchReport, UserError> {
    let mut seats = mix.to_vec();
    let mut report = BatchReport::default();
    for _ in 0..games {
        seats.shuffle(rng);
        let game = run_game(config, &seats, rng)?;
        report.record(&game);
    }
    debug!(
        "{} games with {} players: {:.1}% bankrupt",
        report.games,
        mix.len(),
        report.bankruptcy_rate() * 100.0
    );
    Ok(report)
}

/// Run a batch for every max extraction and interest rate pair.
///
/// # Errors
///
/// See [`run_game`].
pub fn sweep(
    base: &GameConfig,
    mix: &[StrategyKind],
    games: usize,
    max_extractions: &[Usd],
    interest_rates: &[f64],
    rng: &mut StdRng,
) -> Result<Vec<SweepPoint>, UserError> {
    let mut points = Vec::with_capacity(max_extractions.len() * interest_rates.len());
    for &max_extraction in max_extractions {
        for &interest_rate in interest_rates {
            let config = GameConfig {
                max_extraction_per_player: max_extraction,
                interest_rate,
                ..base.clone()
            }
            .sanitized();
            let report = simulate_batch(&config, mix, games, rng)?;
            points.push(SweepPoint {
                max_extraction: config.max_extraction_per_player,
                interest_rate: config.interest_rate,
                report,
            });
        }
    }
    Ok(points)
}

/// Search starting treasury and max extraction for the config whose
/// bankruptcy rate with [`default_mix`] is closest to
/// [`TARGET_BANKRUPTCY_RATE`]. Turns and interest come from `base`. Ties keep
/// the first candidate.
///
/// # Errors
///
/// See [`run_game`].
pub fn autotune(
    base: &GameConfig,
    player_count: usize,
    games: usize,
    rng: &mut StdRng,
) -> Result<TuneResult, UserError> {
    let mix = default_mix(player_count);
    let mut best: Option<(f64, TuneResult)> = None;

    for &starting_treasury in &TUNE_TREASURIES {
        for &max_extraction_per_player in &TUNE_MAX_EXTRACTIONS {
            let config = GameConfig {
                starting_treasury,
                max_extraction_per_player,
                ..base.clone()
            }
            .sanitized();
            let report = simulate_batch(&config, &mix, games, rng)?;
            let distance = (report.bankruptcy_rate() - TARGET_BANKRUPTCY_RATE).abs();
            if best.as_ref().is_none_or(|(closest, _)| distance < *closest) {
                best = Some((
                    distance,
                    TuneResult {
                        player_count,
                        config,
                        report,
                    },
                ));
            }
        }
    }

    best.map(|(_, result)| result)
        .ok_or(UserError::NotEnoughPlayers)
}
