//! Extraction strategies played by simulation bots.

use enum_dispatch::enum_dispatch;
use rand::{Rng, rngs::StdRng};
use std::{fmt, str::FromStr};

use crate::game::entities::{GameSnapshot, Usd};

/// What a bot can see when choosing its extraction for a turn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TurnContext {
    pub treasury: Usd,
    pub max_extraction: Usd,
    pub interest_rate: f64,
    pub player_count: usize,
    pub turn: u32,
    pub max_turns: u32,
}

impl TurnContext {
    #[must_use]
    pub fn from_snapshot(snapshot: &GameSnapshot) -> Self {
        Self {
            treasury: snapshot.state.treasury,
            max_extraction: snapshot.config.max_extraction_per_player,
            interest_rate: snapshot.config.interest_rate,
            player_count: snapshot.players.active_count(),
            turn: snapshot.state.turn,
            max_turns: snapshot.config.max_turns,
        }
    }

    /// This player's share of the interest the treasury would earn as is,
    /// capped at the max extraction.
    #[must_use]
    pub fn sustainable_share(&self) -> Usd {
        if self.player_count == 0 {
            return 0.0;
        }
        let share = self.treasury.max(0.0) * self.interest_rate / self.player_count as f64;
        share.min(self.max_extraction)
    }
}

#[enum_dispatch]
pub trait Strategy {
    /// Amount to submit this turn. The game clamps it to
    /// `[0, max_extraction]` either way.
    fn extraction(&self, ctx: &TurnContext, rng: &mut StdRng) -> Usd;

    fn label(&self) -> &'static str;
}

/// Always takes the maximum.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Greedy;

impl Strategy for Greedy {
    fn extraction(&self, ctx: &TurnContext, _rng: &mut StdRng) -> Usd {
        ctx.max_extraction
    }

    fn label(&self) -> &'static str {
        "greedy"
    }
}

/// Takes its share of the interest, leaving the principal alone.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Cooperative;

impl Strategy for Cooperative {
    fn extraction(&self, ctx: &TurnContext, _rng: &mut StdRng) -> Usd {
        ctx.sustainable_share()
    }

    fn label(&self) -> &'static str {
        "cooperative"
    }
}

/// Uniformly random amount between zero and the maximum.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RandomExtractor;

impl Strategy for RandomExtractor {
    fn extraction(&self, ctx: &TurnContext, rng: &mut StdRng) -> Usd {
        if ctx.max_extraction <= 0.0 {
            return 0.0;
        }
        rng.random_range(0.0..=ctx.max_extraction)
    }

    fn label(&self) -> &'static str {
        "random"
    }
}

/// Cooperative until `greedy_after` of the game has gone by, greedy after.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Opportunistic {
    pub greedy_after: f64,
}

impl Default for Opportunistic {
    fn default() -> Self {
        Self { greedy_after: 0.7 }
    }
}

impl Strategy for Opportunistic {
    fn extraction(&self, ctx: &TurnContext, _rng: &mut StdRng) -> Usd {
        if f64::from(ctx.turn) > f64::from(ctx.max_turns) * self.greedy_after {
            ctx.max_extraction
        } else {
            ctx.sustainable_share()
        }
    }

    fn label(&self) -> &'static str {
        "opportunistic"
    }
}

/// Cooperative, except for the occasional grab of the maximum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Defector {
    pub defect_probability: f64,
}

impl Default for Defector {
    fn default() -> Self {
        Self {
            defect_probability: 0.2,
        }
    }
}

impl Strategy for Defector {
    fn extraction(&self, ctx: &TurnContext, rng: &mut StdRng) -> Usd {
        if rng.random_bool(self.defect_probability.clamp(0.0, 1.0)) {
            ctx.max_extraction
        } else {
            ctx.sustainable_share()
        }
    }

    fn label(&self) -> &'static str {
        "defector"
    }
}

/// Same amount every turn.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Fixed {
    pub amount: Usd,
}

impl Strategy for Fixed {
    fn extraction(&self, _ctx: &TurnContext, _rng: &mut StdRng) -> Usd {
        self.amount
    }

    fn label(&self) -> &'static str {
        "fixed"
    }
}

#[enum_dispatch(Strategy)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StrategyKind {
    Greedy,
    Cooperative,
    RandomExtractor,
    Opportunistic,
    Defector,
    Fixed,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(fixed) => write!(f, "fixed:{}", fixed.amount),
            other => write!(f, "{}", other.label()),
        }
    }
}

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown strategy {0:?}")]
pub struct UnknownStrategy(pub String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    /// Parses `greedy`, `cooperative`, `random`, `opportunistic`,
    /// `defector` or `fixed:<amount>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let kind = match s.as_str() {
            "greedy" => Greedy.into(),
            "cooperative" => Cooperative.into(),
            "random" => RandomExtractor.into(),
            "opportunistic" => Opportunistic::default().into(),
            "defector" => Defector::default().into(),
            other => {
                let amount = other
                    .strip_prefix("fixed:")
                    .and_then(|amount| amount.parse::<Usd>().ok())
                    .filter(|amount| amount.is_finite())
                    .ok_or_else(|| UnknownStrategy(s.clone()))?;
                Fixed { amount }.into()
            }
        };
        Ok(kind)
    }
}

/// Parse a comma separated list of strategies.
///
/// # Errors
///
/// Fails on the first name that isn't a strategy.
pub fn parse_mix(s: &str) -> Result<Vec<StrategyKind>, UnknownStrategy> {
    s.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(str::parse)
        .collect()
}
