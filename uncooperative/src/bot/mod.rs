//! Strategy bots and the balance simulation built on them.
//!
//! Bots play complete games through [`GameStateMachine`](crate::GameStateMachine),
//! so a simulated game follows exactly the rules a live one does. Batches of
//! games with reshuffled seating give the bankruptcy rate of a config, which
//! is what the parameter sweep and [`autotune`] look at.
//!
//! ## Strategies
//!
//! - Greedy: always the maximum
//! - Cooperative: its share of the interest the treasury earns
//! - Random: uniform between zero and the maximum
//! - Opportunistic: cooperative for the first 70% of turns, greedy after
//! - Defector: cooperative, but grabs the maximum 20% of the time
//! - Fixed: the same amount every turn
//!
//! ## Example
//!
//! ```
//! use rand::{SeedableRng, rngs::StdRng};
//! use uncooperative::{GameConfig, bot};
//!
//! let mut rng = StdRng::seed_from_u64(7);
//! let mix = bot::parse_mix("greedy,cooperative,defector").unwrap();
//! let report = bot::simulate_batch(&GameConfig::default(), &mix, 100, &mut rng).unwrap();
//! assert_eq!(report.games, 100);
//! ```

pub mod models;
pub mod simulation;

pub use models::{
    Cooperative, Defector, Fixed, Greedy, Opportunistic, RandomExtractor, Strategy, StrategyKind,
    TurnContext, UnknownStrategy, parse_mix,
};
pub use simulation::{
    BatchReport, GameRecord, SweepPoint, TuneResult, autotune, default_mix, run_game,
    simulate_batch, sweep,
};
