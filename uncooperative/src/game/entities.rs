use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{
    constants::{
        DEFAULT_INTEREST_RATE, DEFAULT_MAX_EXTRACTION, DEFAULT_MAX_TURNS,
        DEFAULT_STARTING_TREASURY, INTEREST_RATE_STEP, MAX_EXTRACTION_STEP, MAX_PLAYERS,
        MAX_PLAYER_ID_LENGTH, MAX_TURNS_LIMIT, MIN_ADJUSTABLE_AMOUNT, QUORUM, TREASURY_STEP,
    },
    registry::PlayerRegistry,
};

/// Type alias for money amounts. Treasury, extraction and wealth are all
/// fractional dollars since interest compounds on whatever remains.
pub type Usd = f64;

/// Unique identifier for a game.
pub type GameId = Uuid;

/// Opaque player identifier handed out by whatever identity provider sits in
/// front of the game. Surrounding whitespace is stripped and overly long ids
/// are truncated.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(s: &str) -> Self {
        Self(s.trim().chars().take(MAX_PLAYER_ID_LENGTH).collect())
    }

    /// Fresh random id for clients that didn't bring their own.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<'de> Deserialize<'de> for PlayerId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(&s))
    }
}

impl From<String> for PlayerId {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Replaces NaN and infinities with zero and floors at zero.
pub(crate) fn non_negative(amount: Usd) -> Usd {
    if amount.is_finite() { amount.max(0.0) } else { 0.0 }
}

fn clamp_turns(turns: u32) -> u32 {
    turns.clamp(1, MAX_TURNS_LIMIT)
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) }
}

fn floor_amount(amount: Usd) -> Usd {
    if amount.is_finite() {
        amount.max(MIN_ADJUSTABLE_AMOUNT)
    } else {
        MIN_ADJUSTABLE_AMOUNT
    }
}

// Rates are adjusted in whole percentage points, so keep them from drifting
// to 0.09999999.
fn round_rate(rate: f64) -> f64 {
    (rate * 100.0).round() / 100.0
}

fn default_max_players() -> usize {
    MAX_PLAYERS
}

/// Rules of a single game. Only mutable while the game is waiting for players.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GameConfig {
    pub max_turns: u32,
    pub interest_rate: f64,
    pub max_extraction_per_player: Usd,
    pub starting_treasury: Usd,
    #[serde(default = "default_max_players")]
    pub max_players: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            interest_rate: DEFAULT_INTEREST_RATE,
            max_extraction_per_player: DEFAULT_MAX_EXTRACTION,
            starting_treasury: DEFAULT_STARTING_TREASURY,
            max_players: MAX_PLAYERS,
        }
    }
}

impl GameConfig {
    #[must_use]
    pub fn new(
        max_turns: u32,
        interest_rate: f64,
        max_extraction_per_player: Usd,
        starting_treasury: Usd,
    ) -> Self {
        Self {
            max_turns,
            interest_rate,
            max_extraction_per_player,
            starting_treasury,
            max_players: MAX_PLAYERS,
        }
        .sanitized()
    }

    /// Clamp every field into its valid range. Out of range input is never an
    /// error, it just snaps to the nearest legal value.
    #[must_use]
    pub fn sanitized(self) -> Self {
        Self {
            max_turns: clamp_turns(self.max_turns),
            interest_rate: clamp_rate(self.interest_rate),
            max_extraction_per_player: non_negative(self.max_extraction_per_player),
            starting_treasury: non_negative(self.starting_treasury),
            max_players: self.max_players.clamp(QUORUM, MAX_PLAYERS),
        }
    }
}

/// Adjustable fields of a [`GameConfig`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigField {
    MaxTurns,
    StartingTreasury,
    MaxExtraction,
    InterestRate,
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::MaxTurns => "max turns",
            Self::StartingTreasury => "starting treasury",
            Self::MaxExtraction => "max extraction",
            Self::InterestRate => "interest rate",
        };
        write!(f, "{repr}")
    }
}

/// A host adjustment to the game configuration.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "change", content = "value", rename_all = "snake_case")]
pub enum ConfigChange {
    MaxTurns(u32),
    StartingTreasury(Usd),
    MaxExtraction(Usd),
    InterestRate(f64),
    Increase(ConfigField),
    Decrease(ConfigField),
}

impl ConfigChange {
    /// Config with this change applied. Values snap to their floors
    /// (one turn, $1M treasury and max extraction) and rates stay in `[0, 1]`.
    /// Turns are also capped at [`MAX_TURNS_LIMIT`].
    #[must_use]
    pub fn apply_to(self, config: &GameConfig) -> GameConfig {
        let mut next = config.clone();
        match self {
            Self::MaxTurns(turns) => next.max_turns = clamp_turns(turns),
            Self::StartingTreasury(amount) => next.starting_treasury = floor_amount(amount),
            Self::MaxExtraction(amount) => next.max_extraction_per_player = floor_amount(amount),
            Self::InterestRate(rate) => next.interest_rate = clamp_rate(rate),
            Self::Increase(field) => match field {
                ConfigField::MaxTurns => {
                    next.max_turns = clamp_turns(config.max_turns.saturating_add(1));
                }
                ConfigField::StartingTreasury => {
                    next.starting_treasury = floor_amount(config.starting_treasury + TREASURY_STEP);
                }
                ConfigField::MaxExtraction => {
                    next.max_extraction_per_player =
                        floor_amount(config.max_extraction_per_player + MAX_EXTRACTION_STEP);
                }
                ConfigField::InterestRate => {
                    next.interest_rate =
                        clamp_rate(round_rate(config.interest_rate + INTEREST_RATE_STEP));
                }
            },
            Self::Decrease(field) => match field {
                ConfigField::MaxTurns => {
                    next.max_turns = clamp_turns(config.max_turns.saturating_sub(1));
                }
                ConfigField::StartingTreasury => {
                    next.starting_treasury = floor_amount(config.starting_treasury - TREASURY_STEP);
                }
                ConfigField::MaxExtraction => {
                    next.max_extraction_per_player =
                        floor_amount(config.max_extraction_per_player - MAX_EXTRACTION_STEP);
                }
                ConfigField::InterestRate => {
                    next.interest_rate =
                        clamp_rate(round_rate(config.interest_rate - INTEREST_RATE_STEP));
                }
            },
        }
        next
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    #[default]
    Waiting,
    Playing,
    Won,
    Lost,
}

impl GameStatus {
    #[must_use]
    pub fn is_over(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Waiting => "waiting",
            Self::Playing => "playing",
            Self::Won => "won",
            Self::Lost => "lost",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnPhase {
    /// No turn in flight (lobby).
    #[default]
    #[serde(rename = "none")]
    Idle,
    Extracting,
    Summary,
    Ended,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Idle => "none",
            Self::Extracting => "extracting",
            Self::Summary => "summary",
            Self::Ended => "ended",
        };
        write!(f, "{repr}")
    }
}

/// What a round of submissions does to the treasury, computed before it is
/// committed. Shown to players between submission and resolution.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct TurnSummary {
    pub total_extraction: Usd,
    pub post_extraction_treasury: Usd,
    pub interest: Usd,
    pub projected_treasury: Usd,
}

impl TurnSummary {
    /// Exact depletion counts as bankruptcy.
    #[must_use]
    pub fn depletes_treasury(&self) -> bool {
        self.post_extraction_treasury <= 0.0
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GameState {
    pub status: GameStatus,
    pub turn_phase: TurnPhase,
    pub turn: u32,
    pub treasury: Usd,
    /// Only set during [`TurnPhase::Summary`].
    pub summary: Option<TurnSummary>,
    /// Whether everybody's wealth is visible while the game is running.
    pub show_wealth: bool,
    pub created_at: DateTime<Utc>,
}

impl GameState {
    #[must_use]
    pub fn new(config: &GameConfig) -> Self {
        Self {
            status: GameStatus::Waiting,
            turn_phase: TurnPhase::Idle,
            turn: 0,
            treasury: config.starting_treasury,
            summary: None,
            show_wealth: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Player {
    pub id: PlayerId,
    /// Players only count once they've picked a name.
    pub name: Option<String>,
    pub wealth: Usd,
    pub pending_extraction: Option<Usd>,
    pub joined_at: DateTime<Utc>,
}

impl Player {
    #[must_use]
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            name: None,
            wealth: 0.0,
            pending_extraction: None,
            joined_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.name.is_some()
    }

    #[must_use]
    pub fn has_submitted(&self) -> bool {
        self.pending_extraction.is_some()
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.id.as_str())
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Leaderboard row.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Standing {
    pub rank: usize,
    pub id: PlayerId,
    pub name: String,
    pub wealth: Usd,
}

impl fmt::Display for Standing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} ${:.2}", self.rank, self.name, self.wealth)
    }
}

/// Everything that makes up one game. Rounds are applied to a snapshot as a
/// whole and `version` goes up by one for every applied change.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GameSnapshot {
    pub id: GameId,
    pub version: u64,
    pub config: GameConfig,
    pub state: GameState,
    pub players: PlayerRegistry,
}

impl GameSnapshot {
    #[must_use]
    pub fn new(id: GameId, config: GameConfig) -> Self {
        let config = config.sanitized();
        Self {
            id,
            version: 0,
            state: GameState::new(&config),
            config,
            players: PlayerRegistry::default(),
        }
    }

    #[must_use]
    pub fn standings(&self) -> Vec<Standing> {
        self.players.standings()
    }

    /// The wealthiest player, once the treasury survived every turn.
    #[must_use]
    pub fn winner(&self) -> Option<Standing> {
        if self.state.status != GameStatus::Won {
            return None;
        }
        self.players.standings().into_iter().next()
    }

    /// What `viewer` is allowed to see. Other players' wealth is hidden
    /// while the game runs unless the host made it public.
    #[must_use]
    pub fn view(&self, viewer: Option<&PlayerId>) -> GameView {
        let reveal_all = self.state.show_wealth || self.state.status.is_over();
        let players = self
            .players
            .iter()
            .map(|player| {
                let is_viewer = viewer == Some(&player.id);
                PlayerView {
                    id: player.id.clone(),
                    name: player.name.clone(),
                    wealth: (reveal_all || is_viewer).then_some(player.wealth),
                    submitted: player.has_submitted(),
                    pending_extraction: if is_viewer {
                        player.pending_extraction
                    } else {
                        None
                    },
                }
            })
            .collect();
        GameView {
            id: self.id,
            version: self.version,
            config: self.config.clone(),
            status: self.state.status,
            turn_phase: self.state.turn_phase,
            turn: self.state.turn,
            treasury: self.state.treasury,
            summary: self.state.summary,
            show_wealth: self.state.show_wealth,
            players,
            standings: self.state.status.is_over().then(|| self.standings()),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: Option<String>,
    pub wealth: Option<Usd>,
    pub submitted: bool,
    pub pending_extraction: Option<Usd>,
}

/// A snapshot as presented to one viewer.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GameView {
    pub id: GameId,
    pub version: u64,
    pub config: GameConfig,
    pub status: GameStatus,
    pub turn_phase: TurnPhase,
    pub turn: u32,
    pub treasury: Usd,
    pub summary: Option<TurnSummary>,
    pub show_wealth: bool,
    pub players: Vec<PlayerView>,
    pub standings: Option<Vec<Standing>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    // === PlayerId Tests ===

    #[test]
    fn test_player_id_trims_and_truncates() {
        let id = PlayerId::new("  alice  ");
        assert_eq!(id.as_str(), "alice");

        let long = "x".repeat(MAX_PLAYER_ID_LENGTH * 2);
        assert_eq!(PlayerId::new(&long).as_str().len(), MAX_PLAYER_ID_LENGTH);
    }

    #[test]
    fn test_player_id_deserialize_sanitizes() {
        let id: PlayerId = serde_json::from_str("\" bob \"").unwrap();
        assert_eq!(id, PlayerId::new("bob"));
    }

    #[test]
    fn test_player_id_generate_is_unique() {
        assert_ne!(PlayerId::generate(), PlayerId::generate());
    }

    // === GameConfig Tests ===

    #[test]
    fn test_default_config_matches_original_parameters() {
        let config = GameConfig::default();
        assert_eq!(config.max_turns, 10);
        assert_eq!(config.interest_rate, 0.10);
        assert_eq!(config.max_extraction_per_player, 5_000_000.0);
        assert_eq!(config.starting_treasury, 40_000_000.0);
        assert_eq!(config.max_players, MAX_PLAYERS);
    }

    #[test]
    fn test_sanitized_clamps_out_of_range() {
        let config = GameConfig {
            max_turns: 0,
            interest_rate: 1.5,
            max_extraction_per_player: -3.0,
            starting_treasury: f64::NAN,
            max_players: 50,
        }
        .sanitized();
        assert_eq!(config.max_turns, 1);
        assert_eq!(config.interest_rate, 1.0);
        assert_eq!(config.max_extraction_per_player, 0.0);
        assert_eq!(config.starting_treasury, 0.0);
        assert_eq!(config.max_players, MAX_PLAYERS);
    }

    #[test]
    fn test_sanitized_nan_rate_is_zero() {
        let config = GameConfig {
            interest_rate: f64::NAN,
            ..GameConfig::default()
        }
        .sanitized();
        assert_eq!(config.interest_rate, 0.0);
    }

    #[test]
    fn test_config_deserializes_without_max_players() {
        let json = r#"{"max_turns":5,"interest_rate":0.2,"max_extraction_per_player":1.0,"starting_treasury":10.0}"#;
        let config: GameConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_players, MAX_PLAYERS);
    }

    // === ConfigChange Tests ===

    #[test]
    fn test_config_change_floors() {
        let config = GameConfig::default();
        assert_eq!(ConfigChange::MaxTurns(0).apply_to(&config).max_turns, 1);
        assert_eq!(
            ConfigChange::StartingTreasury(10.0)
                .apply_to(&config)
                .starting_treasury,
            MIN_ADJUSTABLE_AMOUNT
        );
        assert_eq!(
            ConfigChange::MaxExtraction(f64::NAN)
                .apply_to(&config)
                .max_extraction_per_player,
            MIN_ADJUSTABLE_AMOUNT
        );
        assert_eq!(
            ConfigChange::InterestRate(-0.5)
                .apply_to(&config)
                .interest_rate,
            0.0
        );
    }

    #[test]
    fn test_turns_are_capped() {
        let config = GameConfig::default();
        assert_eq!(
            ConfigChange::MaxTurns(u32::MAX).apply_to(&config).max_turns,
            MAX_TURNS_LIMIT
        );
        let at_limit = GameConfig {
            max_turns: MAX_TURNS_LIMIT,
            ..GameConfig::default()
        };
        assert_eq!(
            ConfigChange::Increase(ConfigField::MaxTurns)
                .apply_to(&at_limit)
                .max_turns,
            MAX_TURNS_LIMIT
        );
        assert_eq!(GameConfig::new(u32::MAX, 0.1, 1.0, 1.0).max_turns, MAX_TURNS_LIMIT);
    }

    #[test]
    fn test_config_change_steps() {
        let config = GameConfig::default();
        let up = ConfigChange::Increase(ConfigField::StartingTreasury).apply_to(&config);
        assert_eq!(up.starting_treasury, 50_000_000.0);
        let down = ConfigChange::Decrease(ConfigField::MaxExtraction).apply_to(&config);
        assert_eq!(down.max_extraction_per_player, 4_000_000.0);
        let turns = ConfigChange::Increase(ConfigField::MaxTurns).apply_to(&config);
        assert_eq!(turns.max_turns, 11);
        let rate = ConfigChange::Increase(ConfigField::InterestRate).apply_to(&config);
        assert_eq!(rate.interest_rate, 0.11);
    }

    #[test]
    fn test_config_change_decrease_stops_at_floor() {
        let config = GameConfig {
            max_turns: 1,
            interest_rate: 0.0,
            max_extraction_per_player: 1_500_000.0,
            starting_treasury: 5_000_000.0,
            max_players: MAX_PLAYERS,
        };
        assert_eq!(
            ConfigChange::Decrease(ConfigField::MaxTurns)
                .apply_to(&config)
                .max_turns,
            1
        );
        assert_eq!(
            ConfigChange::Decrease(ConfigField::InterestRate)
                .apply_to(&config)
                .interest_rate,
            0.0
        );
        assert_eq!(
            ConfigChange::Decrease(ConfigField::MaxExtraction)
                .apply_to(&config)
                .max_extraction_per_player,
            MIN_ADJUSTABLE_AMOUNT
        );
        assert_eq!(
            ConfigChange::Decrease(ConfigField::StartingTreasury)
                .apply_to(&config)
                .starting_treasury,
            MIN_ADJUSTABLE_AMOUNT
        );
    }

    #[test]
    fn test_interest_rate_increase_caps_at_one() {
        let config = GameConfig {
            interest_rate: 1.0,
            ..GameConfig::default()
        };
        let next = ConfigChange::Increase(ConfigField::InterestRate).apply_to(&config);
        assert_eq!(next.interest_rate, 1.0);
    }

    #[test]
    fn test_config_change_serde_shape() {
        let change: ConfigChange =
            serde_json::from_str(r#"{"change":"increase","value":"interest_rate"}"#).unwrap();
        assert_eq!(change, ConfigChange::Increase(ConfigField::InterestRate));

        let change: ConfigChange =
            serde_json::from_str(r#"{"change":"max_turns","value":12}"#).unwrap();
        assert_eq!(change, ConfigChange::MaxTurns(12));
    }

    // === State Tests ===

    #[test]
    fn test_turn_phase_idle_serializes_as_none() {
        assert_eq!(serde_json::to_string(&TurnPhase::Idle).unwrap(), "\"none\"");
        assert_eq!(
            serde_json::to_string(&TurnPhase::Extracting).unwrap(),
            "\"extracting\""
        );
    }

    #[test]
    fn test_summary_exact_depletion_is_bankrupt() {
        let summary = TurnSummary {
            total_extraction: 100.0,
            post_extraction_treasury: 0.0,
            interest: 0.0,
            projected_treasury: 0.0,
        };
        assert!(summary.depletes_treasury());
    }

    #[test]
    fn test_new_snapshot_is_waiting() {
        let snapshot = GameSnapshot::new(Uuid::new_v4(), GameConfig::default());
        assert_eq!(snapshot.version, 0);
        assert_eq!(snapshot.state.status, GameStatus::Waiting);
        assert_eq!(snapshot.state.turn_phase, TurnPhase::Idle);
        assert_eq!(snapshot.state.turn, 0);
        assert_eq!(snapshot.state.treasury, 40_000_000.0);
        assert!(snapshot.winner().is_none());
    }

    // === View Tests ===

    fn snapshot_with_players() -> GameSnapshot {
        let mut snapshot = GameSnapshot::new(Uuid::new_v4(), GameConfig::default());
        for (id, wealth) in [("a", 10.0), ("b", 30.0)] {
            let id = PlayerId::new(id);
            snapshot.players.join(id.clone(), MAX_PLAYERS).unwrap();
            snapshot.players.set_name(&id, id.as_str()).unwrap();
            snapshot.players.credit(&id, wealth);
        }
        snapshot.state.status = GameStatus::Playing;
        snapshot
    }

    #[test]
    fn test_view_hides_other_wealth_while_playing() {
        let snapshot = snapshot_with_players();
        let viewer = PlayerId::new("a");
        let view = snapshot.view(Some(&viewer));
        let a = view.players.iter().find(|p| p.id == viewer).unwrap();
        let b = view.players.iter().find(|p| p.id.as_str() == "b").unwrap();
        assert_eq!(a.wealth, Some(10.0));
        assert_eq!(b.wealth, None);
        assert!(view.standings.is_none());
    }

    #[test]
    fn test_view_shows_wealth_when_toggled_or_over() {
        let mut snapshot = snapshot_with_players();
        snapshot.state.show_wealth = true;
        assert!(snapshot.view(None).players.iter().all(|p| p.wealth.is_some()));

        snapshot.state.show_wealth = false;
        snapshot.state.status = GameStatus::Won;
        let view = snapshot.view(None);
        assert!(view.players.iter().all(|p| p.wealth.is_some()));
        let standings = view.standings.unwrap();
        assert_eq!(standings[0].id.as_str(), "b");
        assert_eq!(snapshot.winner().unwrap().wealth, 30.0);
    }

    #[test]
    fn test_snapshot_json_roundtrip() {
        let snapshot = snapshot_with_players();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: GameSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);
    }
}
