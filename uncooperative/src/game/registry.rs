//! Joined players, their names, wealth and pending extractions.

use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeMap};

use super::{
    UserError,
    constants::MAX_NAME_LENGTH,
    entities::{Player, PlayerId, Standing, Usd},
};

/// Clamp a requested extraction into `[0, max]`. NaN becomes zero.
#[must_use]
pub fn clamp_extraction(amount: Usd, max: Usd) -> Usd {
    let max = if max.is_nan() { 0.0 } else { max.max(0.0) };
    if amount.is_nan() {
        0.0
    } else {
        amount.clamp(0.0, max)
    }
}

/// Players keyed by id. Iteration order is the id order, which keeps
/// resolution and serialization deterministic.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PlayerRegistry {
    players: BTreeMap<PlayerId, Player>,
}

impl PlayerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &PlayerId) -> bool {
        self.players.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Add a player. Joining twice is a no-op and returns `false`.
    pub fn join(&mut self, id: PlayerId, capacity: usize) -> Result<bool, UserError> {
        if self.players.contains_key(&id) {
            return Ok(false);
        }
        if self.players.len() >= capacity {
            return Err(UserError::CapacityReached);
        }
        self.players.insert(id.clone(), Player::new(id));
        Ok(true)
    }

    /// Name a player, which makes them active. Blank names are ignored.
    pub fn set_name(&mut self, id: &PlayerId, name: &str) -> Result<bool, UserError> {
        let player = self
            .players
            .get_mut(id)
            .ok_or(UserError::UserDoesNotExist)?;
        let name: String = name.trim().chars().take(MAX_NAME_LENGTH).collect();
        if name.is_empty() || player.name.as_deref() == Some(name.as_str()) {
            return Ok(false);
        }
        player.name = Some(name);
        Ok(true)
    }

    /// Record a player's extraction for the current turn and return the
    /// amount actually recorded after clamping.
    pub fn submit_extraction(
        &mut self,
        id: &PlayerId,
        amount: Usd,
        max: Usd,
    ) -> Result<Usd, UserError> {
        let player = self
            .players
            .get_mut(id)
            .ok_or(UserError::UserDoesNotExist)?;
        if !player.is_active() {
            return Err(UserError::UserNotRegistered);
        }
        if player.has_submitted() {
            return Err(UserError::AlreadySubmitted);
        }
        let amount = clamp_extraction(amount, max);
        player.pending_extraction = Some(amount);
        Ok(amount)
    }

    pub fn remove(&mut self, id: &PlayerId) -> Option<Player> {
        self.players.remove(id)
    }

    /// Remove everybody, returning how many players were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.players.len();
        self.players.clear();
        count
    }

    /// Named players, the only ones that take part in a turn.
    pub fn active(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| p.is_active())
    }

    pub(crate) fn active_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut().filter(|p| p.is_active())
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    #[must_use]
    pub fn submitted_count(&self) -> usize {
        self.active().filter(|p| p.has_submitted()).count()
    }

    /// Whether every active player has submitted. An empty table never has.
    #[must_use]
    pub fn all_submitted(&self) -> bool {
        let mut active = self.active().peekable();
        active.peek().is_some() && active.all(Player::has_submitted)
    }

    /// Drop players who never picked a name.
    pub fn drop_unnamed(&mut self) -> Vec<PlayerId> {
        let unnamed: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| !p.is_active())
            .map(|p| p.id.clone())
            .collect();
        for id in &unnamed {
            self.players.remove(id);
        }
        unnamed
    }

    pub fn clear_pending(&mut self) {
        for player in self.players.values_mut() {
            player.pending_extraction = None;
        }
    }

    pub fn reset_wealth(&mut self) {
        for player in self.players.values_mut() {
            player.wealth = 0.0;
        }
    }

    #[cfg(test)]
    pub(crate) fn credit(&mut self, id: &PlayerId, amount: Usd) {
        if let Some(player) = self.players.get_mut(id) {
            player.wealth += amount;
        }
    }

    #[must_use]
    pub fn total_wealth(&self) -> Usd {
        self.players.values().map(|p| p.wealth).sum()
    }

    /// Active players ranked by wealth, richest first. Ties are broken by
    /// name so the order is stable.
    #[must_use]
    pub fn standings(&self) -> Vec<Standing> {
        let mut ranked: Vec<&Player> = self.active().collect();
        ranked.sort_by(|a, b| match b.wealth.total_cmp(&a.wealth) {
            Ordering::Equal => a.display_name().cmp(b.display_name()),
            ordering => ordering,
        });
        ranked
            .into_iter()
            .enumerate()
            .map(|(idx, player)| Standing {
                rank: idx + 1,
                id: player.id.clone(),
                name: player.display_name().to_string(),
                wealth: player.wealth,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::MAX_PLAYERS;

    fn named(registry: &mut PlayerRegistry, id: &str) -> PlayerId {
        let id = PlayerId::new(id);
        registry.join(id.clone(), MAX_PLAYERS).unwrap();
        registry.set_name(&id, id.as_str()).unwrap();
        id
    }

    #[test]
    fn test_join_is_idempotent() {
        let mut registry = PlayerRegistry::new();
        let id = PlayerId::new("alice");
        assert_eq!(registry.join(id.clone(), MAX_PLAYERS), Ok(true));
        assert_eq!(registry.join(id, MAX_PLAYERS), Ok(false));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_join_rejects_over_capacity() {
        let mut registry = PlayerRegistry::new();
        for i in 0..MAX_PLAYERS {
            registry
                .join(PlayerId::new(&format!("p{i}")), MAX_PLAYERS)
                .unwrap();
        }
        assert_eq!(
            registry.join(PlayerId::new("late"), MAX_PLAYERS),
            Err(UserError::CapacityReached)
        );
        // Existing players can still rejoin.
        assert_eq!(registry.join(PlayerId::new("p0"), MAX_PLAYERS), Ok(false));
    }

    #[test]
    fn test_set_name_blank_is_noop() {
        let mut registry = PlayerRegistry::new();
        let id = PlayerId::new("alice");
        registry.join(id.clone(), MAX_PLAYERS).unwrap();
        assert_eq!(registry.set_name(&id, "   "), Ok(false));
        assert!(!registry.get(&id).unwrap().is_active());
        assert_eq!(registry.set_name(&id, "  Alice "), Ok(true));
        assert_eq!(registry.get(&id).unwrap().name.as_deref(), Some("Alice"));
        assert_eq!(registry.set_name(&id, "Alice"), Ok(false));
    }

    #[test]
    fn test_set_name_truncates() {
        let mut registry = PlayerRegistry::new();
        let id = PlayerId::new("alice");
        registry.join(id.clone(), MAX_PLAYERS).unwrap();
        registry.set_name(&id, &"n".repeat(100)).unwrap();
        assert_eq!(
            registry.get(&id).unwrap().name.as_ref().unwrap().len(),
            MAX_NAME_LENGTH
        );
    }

    #[test]
    fn test_set_name_unknown_player() {
        let mut registry = PlayerRegistry::new();
        assert_eq!(
            registry.set_name(&PlayerId::new("ghost"), "Ghost"),
            Err(UserError::UserDoesNotExist)
        );
    }

    #[test]
    fn test_submit_clamps_to_bounds() {
        let mut registry = PlayerRegistry::new();
        let a = named(&mut registry, "a");
        let b = named(&mut registry, "b");
        let c = named(&mut registry, "c");
        assert_eq!(registry.submit_extraction(&a, 10.0, 5.0), Ok(5.0));
        assert_eq!(registry.submit_extraction(&b, -1.0, 5.0), Ok(0.0));
        assert_eq!(registry.submit_extraction(&c, f64::NAN, 5.0), Ok(0.0));
    }

    #[test]
    fn test_submit_rejects_twice() {
        let mut registry = PlayerRegistry::new();
        let a = named(&mut registry, "a");
        registry.submit_extraction(&a, 1.0, 5.0).unwrap();
        assert_eq!(
            registry.submit_extraction(&a, 2.0, 5.0),
            Err(UserError::AlreadySubmitted)
        );
        assert_eq!(registry.get(&a).unwrap().pending_extraction, Some(1.0));
    }

    #[test]
    fn test_submit_requires_name() {
        let mut registry = PlayerRegistry::new();
        let id = PlayerId::new("anon");
        registry.join(id.clone(), MAX_PLAYERS).unwrap();
        assert_eq!(
            registry.submit_extraction(&id, 1.0, 5.0),
            Err(UserError::UserNotRegistered)
        );
        assert_eq!(
            registry.submit_extraction(&PlayerId::new("ghost"), 1.0, 5.0),
            Err(UserError::UserDoesNotExist)
        );
    }

    #[test]
    fn test_all_submitted_ignores_unnamed() {
        let mut registry = PlayerRegistry::new();
        assert!(!registry.all_submitted());

        let a = named(&mut registry, "a");
        registry
            .join(PlayerId::new("lurker"), MAX_PLAYERS)
            .unwrap();
        assert!(!registry.all_submitted());
        registry.submit_extraction(&a, 1.0, 5.0).unwrap();
        assert!(registry.all_submitted());
        assert_eq!(registry.submitted_count(), 1);
    }

    #[test]
    fn test_drop_unnamed() {
        let mut registry = PlayerRegistry::new();
        named(&mut registry, "a");
        registry.join(PlayerId::new("b"), MAX_PLAYERS).unwrap();
        let dropped = registry.drop_unnamed();
        assert_eq!(dropped, vec![PlayerId::new("b")]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_standings_sorted_by_wealth() {
        let mut registry = PlayerRegistry::new();
        let a = named(&mut registry, "a");
        let b = named(&mut registry, "b");
        let c = named(&mut registry, "c");
        registry.credit(&a, 5.0);
        registry.credit(&b, 20.0);
        registry.credit(&c, 5.0);
        let standings = registry.standings();
        assert_eq!(standings[0].id, b);
        assert_eq!(standings[0].rank, 1);
        assert_eq!(standings[1].id, a);
        assert_eq!(standings[2].id, c);
        assert_eq!(registry.total_wealth(), 30.0);
    }

    #[test]
    fn test_clear_and_reset() {
        let mut registry = PlayerRegistry::new();
        let a = named(&mut registry, "a");
        registry.credit(&a, 7.0);
        registry.submit_extraction(&a, 1.0, 5.0).unwrap();
        registry.clear_pending();
        registry.reset_wealth();
        let player = registry.get(&a).unwrap();
        assert_eq!(player.wealth, 0.0);
        assert!(!player.has_submitted());
        assert_eq!(registry.clear(), 1);
        assert!(registry.is_empty());
    }
}
