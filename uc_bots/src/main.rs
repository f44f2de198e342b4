//! Balance simulation for uncooperative.
//!
//! Plays batches of bot games against the real rules engine and reports how
//! often the treasury goes bankrupt, optionally sweeping or autotuning the
//! game parameters.

use anyhow::{Context, Result, bail};
use ctrlc::set_handler;
use log::{info, warn};
use pico_args::Arguments;
use rand::{SeedableRng, rngs::StdRng};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use uncooperative::{
    GameConfig,
    bot::{self, BatchReport, StrategyKind, simulation::TUNE_MAX_EXTRACTIONS},
    constants::{MAX_PLAYERS, QUORUM},
};

const HELP: &str = "\
Simulate uncooperative games with strategy bots

USAGE:
  uc_bots [OPTIONS]

OPTIONS:
  --games N               Games per batch  [default: 1000]
  --players LIST          Comma-separated table sizes  [default: 3,4,5]
  --mix LIST              Comma-separated strategies, one per seat
                          (greedy, cooperative, random, opportunistic,
                          defector, fixed:<amount>). Overrides --players.
  --seed N                RNG seed  [default: random]
  --turns N               Max turns  [default: 10]
  --treasury USD          Starting treasury  [default: 40000000]
  --max-extraction USD    Max extraction per player  [default: 5000000]
  --interest RATE         Interest rate per turn  [default: 0.1]

FLAGS:
  --autotune              Search treasury and max extraction for a 50% bankruptcy rate
  --sweep                 Sweep max extraction against interest rate
  -h, --help              Print help information
";

const SWEEP_INTEREST_RATES: [f64; 4] = [0.05, 0.10, 0.15, 0.20];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Batch,
    Sweep,
    Autotune,
}

struct Args {
    games: usize,
    player_counts: Vec<usize>,
    mix: Option<Vec<StrategyKind>>,
    seed: u64,
    config: GameConfig,
    mode: Mode,
}

fn parse_player_counts(s: &str) -> Result<Vec<usize>> {
    let counts = s
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<usize>()
                .with_context(|| format!("invalid player count '{part}'"))
        })
        .collect::<Result<Vec<_>>>()?;

    if counts.is_empty() {
        bail!("no player counts given");
    }
    if let Some(bad) = counts.iter().find(|&&n| !(QUORUM..=MAX_PLAYERS).contains(&n)) {
        bail!("player count {bad} is outside {QUORUM}..={MAX_PLAYERS}");
    }
    Ok(counts)
}

fn parse_args(mut pargs: Arguments) -> Result<Args> {
    let defaults = GameConfig::default();

    let autotune = pargs.contains("--autotune");
    let sweep = pargs.contains("--sweep");
    let mode = match (autotune, sweep) {
        (true, true) => bail!("--autotune and --sweep are mutually exclusive"),
        (true, false) => Mode::Autotune,
        (false, true) => Mode::Sweep,
        (false, false) => Mode::Batch,
    };

    let games = pargs.opt_value_from_str("--games")?.unwrap_or(1000);
    let players: String = pargs
        .opt_value_from_str("--players")?
        .unwrap_or_else(|| "3,4,5".to_string());
    let mix = pargs
        .opt_value_from_str::<_, String>("--mix")?
        .map(|s| bot::parse_mix(&s))
        .transpose()?;
    let seed = pargs
        .opt_value_from_str("--seed")?
        .unwrap_or_else(rand::random::<u64>);

    let config = GameConfig {
        max_turns: pargs
            .opt_value_from_str("--turns")?
            .unwrap_or(defaults.max_turns),
        starting_treasury: pargs
            .opt_value_from_str("--treasury")?
            .unwrap_or(defaults.starting_treasury),
        max_extraction_per_player: pargs
            .opt_value_from_str("--max-extraction")?
            .unwrap_or(defaults.max_extraction_per_player),
        interest_rate: pargs
            .opt_value_from_str("--interest")?
            .unwrap_or(defaults.interest_rate),
        ..defaults
    }
    .sanitized();

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        bail!("unexpected arguments: {remaining:?}");
    }

    if games == 0 {
        bail!("--games must be at least 1");
    }
    if mode == Mode::Autotune && mix.is_some() {
        bail!("--autotune always uses its own mix; drop --mix");
    }

    Ok(Args {
        games,
        player_counts: parse_player_counts(&players)?,
        mix,
        seed,
        config,
        mode,
    })
}

fn describe(mix: &[StrategyKind]) -> String {
    mix.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn print_report(label: &str, report: &BatchReport) {
    println!(
        "{label:<48} games={:<6} bankrupt={:>6.1}%  mean turns={:.2}",
        report.games,
        report.bankruptcy_rate() * 100.0,
        report.mean_turns()
    );
}

/// Table mixes to simulate: the explicit mix, or the default mix per size.
fn mixes(args: &Args) -> Vec<Vec<StrategyKind>> {
    match &args.mix {
        Some(mix) => vec![mix.clone()],
        None => args
            .player_counts
            .iter()
            .map(|&n| bot::default_mix(n))
            .collect(),
    }
}

fn run(args: &Args, interrupted: &AtomicBool) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    info!("Seed {}", args.seed);
    println!(
        "config: turns={} treasury={:.0} max_extraction={:.0} interest={:.2}",
        args.config.max_turns,
        args.config.starting_treasury,
        args.config.max_extraction_per_player,
        args.config.interest_rate
    );

    match args.mode {
        Mode::Batch => {
            for mix in mixes(args) {
                if interrupted.load(Ordering::Relaxed) {
                    warn!("Interrupted, skipping remaining batches");
                    break;
                }
                let report = bot::simulate_batch(&args.config, &mix, args.games, &mut rng)?;
                print_report(&describe(&mix), &report);
            }
        }
        Mode::Sweep => {
            for mix in mixes(args) {
                println!("mix: {}", describe(&mix));
                let points = bot::sweep(
                    &args.config,
                    &mix,
                    args.games,
                    &TUNE_MAX_EXTRACTIONS,
                    &SWEEP_INTEREST_RATES,
                    &mut rng,
                )?;
                for point in points {
                    let label = format!(
                        "  max_extraction={:.0} interest={:.2}",
                        point.max_extraction, point.interest_rate
                    );
                    print_report(&label, &point.report);
                }
                if interrupted.load(Ordering::Relaxed) {
                    warn!("Interrupted, skipping remaining sweeps");
                    break;
                }
            }
        }
        Mode::Autotune => {
            for &player_count in &args.player_counts {
                if interrupted.load(Ordering::Relaxed) {
                    warn!("Interrupted, skipping remaining table sizes");
                    break;
                }
                let tuned = bot::autotune(&args.config, player_count, args.games, &mut rng)?;
                println!(
                    "{} players: treasury={:.0} max_extraction={:.0}",
                    tuned.player_count,
                    tuned.config.starting_treasury,
                    tuned.config.max_extraction_per_player
                );
                print_report("  best", &tuned.report);
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let mut pargs = Arguments::from_env();
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }
    let args = parse_args(pargs)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        set_handler(move || {
            interrupted.store(true, Ordering::Relaxed);
        })?;
    }

    run(&args, &interrupted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(Arguments::from_vec(
            list.iter().map(OsString::from).collect(),
        ))
    }

    #[test]
    fn test_defaults() {
        let args = args(&["--seed", "9"]).unwrap();
        assert_eq!(args.games, 1000);
        assert_eq!(args.player_counts, vec![3, 4, 5]);
        assert_eq!(args.seed, 9);
        assert_eq!(args.mode, Mode::Batch);
        assert_eq!(args.config, GameConfig::default());
        assert!(args.mix.is_none());
    }

    #[test]
    fn test_overrides() {
        let args = args(&[
            "--games",
            "20",
            "--players",
            "4",
            "--turns",
            "6",
            "--interest",
            "0.05",
            "--sweep",
        ])
        .unwrap();
        assert_eq!(args.games, 20);
        assert_eq!(args.player_counts, vec![4]);
        assert_eq!(args.config.max_turns, 6);
        assert_eq!(args.config.interest_rate, 0.05);
        assert_eq!(args.mode, Mode::Sweep);
    }

    #[test]
    fn test_mix_replaces_player_counts() {
        let args = args(&["--mix", "greedy,cooperative,fixed:100"]).unwrap();
        let mixes = mixes(&args);
        assert_eq!(mixes.len(), 1);
        assert_eq!(describe(&mixes[0]), "greedy,cooperative,fixed:100");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(args(&["--players", "2"]).is_err());
        assert!(args(&["--players", "3,x"]).is_err());
        assert!(args(&["--mix", "sneaky"]).is_err());
        assert!(args(&["--autotune", "--sweep"]).is_err());
        assert!(args(&["--games", "0"]).is_err());
        assert!(args(&["--bogus"]).is_err());
    }

    #[test]
    fn test_batch_run_completes() {
        let args = args(&["--games", "5", "--players", "3", "--seed", "1"]).unwrap();
        run(&args, &AtomicBool::new(false)).unwrap();
    }
}
