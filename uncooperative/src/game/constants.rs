//! Game rule constants and defaults.

use super::entities::Usd;

/// Minimum number of named players required to start a game. Below this the
/// coordination problem is degenerate.
pub const QUORUM: usize = 3;

/// Default lobby capacity.
pub const MAX_PLAYERS: usize = 5;

/// Player names are truncated to this many characters.
pub const MAX_NAME_LENGTH: usize = 32;

/// Player ids supplied by clients are truncated to this many characters.
pub const MAX_PLAYER_ID_LENGTH: usize = 64;

pub const DEFAULT_MAX_TURNS: u32 = 10;
/// Longest game a host can configure.
pub const MAX_TURNS_LIMIT: u32 = 1_000;
pub const DEFAULT_INTEREST_RATE: f64 = 0.10;
pub const DEFAULT_MAX_EXTRACTION: Usd = 5_000_000.0;
pub const DEFAULT_STARTING_TREASURY: Usd = 40_000_000.0;

/// Floor for the host's treasury and max extraction adjustments.
pub const MIN_ADJUSTABLE_AMOUNT: Usd = 1_000_000.0;

pub const TREASURY_STEP: Usd = 10_000_000.0;
pub const MAX_EXTRACTION_STEP: Usd = 1_000_000.0;
pub const INTEREST_RATE_STEP: f64 = 0.01;

/// Candidate spacing for the extraction solver's scan.
pub const SOLVER_STEP: Usd = 100_000.0;

/// Most rates the solver scans. Larger max extractions get a coarser step.
pub const SOLVER_MAX_CANDIDATES: u64 = 10_000;
