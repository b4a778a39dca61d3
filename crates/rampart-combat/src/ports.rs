//! Seams to the systems around the combat core.
//!
//! - [`SessionSink`]: delivers messages to sessions and regions
//! - [`AccountStore`]: persistent counters (reputation, faction points, kills)
//! - [`OriginCheck`]: whether two sessions share a network origin
//! - [`DamageFormula`]: the damage roll
//!
//! In-memory implementations back the binary and the tests.

use dashmap::DashMap;
use parking_lot::Mutex;
use rampart_common::{EntityId, RegionId};

use crate::broadcast::HitMode;
use crate::entity::CombatantSnapshot;
use crate::events::ServerMessage;
use crate::skill::Skill;

/// Who in a region receives a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastScope {
    /// Every session in the region
    Everyone,
    /// Every session but one
    EveryoneExcept(EntityId),
}

/// Outbound message delivery.
pub trait SessionSink: Send + Sync {
    /// Sends to one session.
    fn send(&self, to: EntityId, message: ServerMessage);

    /// Sends to the sessions of a region.
    fn broadcast(&self, region: RegionId, message: ServerMessage, scope: BroadcastScope);
}

/// Persistent per-account counters.
pub trait AccountStore: Send + Sync {
    /// Current reputation.
    fn reputation(&self, id: EntityId) -> i64;
    /// Adds to reputation.
    fn adjust_reputation(&self, id: EntityId, delta: i64);
    /// Adds to faction points.
    fn adjust_faction_points(&self, id: EntityId, delta: i32);
    /// Counts a faction-war kill.
    fn record_faction_kill(&self, id: EntityId);
    /// Counts a faction-war death.
    fn record_faction_death(&self, id: EntityId);
    /// Counts a duel win outside faction wars.
    fn record_duel_win(&self, id: EntityId);
    /// Counts a duel loss outside faction wars.
    fn record_duel_loss(&self, id: EntityId);
}

/// Counters of one account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountRecord {
    /// Reputation
    pub reputation: i64,
    /// Faction points
    pub faction_points: i32,
    /// Faction-war kills
    pub faction_kills: u32,
    /// Faction-war deaths
    pub faction_deaths: u32,
    /// Duel wins
    pub duel_wins: u32,
    /// Duel losses
    pub duel_losses: u32,
}

/// Account store kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    records: DashMap<EntityId, AccountRecord>,
}

impl InMemoryAccounts {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an account.
    pub fn insert(&self, id: EntityId, record: AccountRecord) {
        self.records.insert(id, record);
    }

    /// Copy of an account's counters.
    #[must_use]
    pub fn record(&self, id: EntityId) -> AccountRecord {
        self.records.get(&id).map(|r| *r).unwrap_or_default()
    }

    fn update(&self, id: EntityId, f: impl FnOnce(&mut AccountRecord)) {
        f(&mut self.records.entry(id).or_default());
    }
}

impl AccountStore for InMemoryAccounts {
    fn reputation(&self, id: EntityId) -> i64 {
        self.record(id).reputation
    }

    fn adjust_reputation(&self, id: EntityId, delta: i64) {
        self.update(id, |r| r.reputation = r.reputation.saturating_add(delta));
    }

    fn adjust_faction_points(&self, id: EntityId, delta: i32) {
        self.update(id, |r| r.faction_points = r.faction_points.saturating_add(delta));
    }

    fn record_faction_kill(&self, id: EntityId) {
        self.update(id, |r| r.faction_kills += 1);
    }

    fn record_faction_death(&self, id: EntityId) {
        self.update(id, |r| r.faction_deaths += 1);
    }

    fn record_duel_win(&self, id: EntityId) {
        self.update(id, |r| r.duel_wins += 1);
    }

    fn record_duel_loss(&self, id: EntityId) {
        self.update(id, |r| r.duel_losses += 1);
    }
}

/// Network-origin comparison between two sessions.
pub trait OriginCheck: Send + Sync {
    /// Whether both sessions come from the same origin.
    fn same_origin(&self, a: EntityId, b: EntityId) -> bool;
}

/// Origin table keyed by session.
#[derive(Debug, Default)]
pub struct OriginTable {
    origins: DashMap<EntityId, String>,
}

impl OriginTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a session's origin.
    pub fn insert(&self, id: EntityId, origin: impl Into<String>) {
        self.origins.insert(id, origin.into());
    }
}

impl OriginCheck for OriginTable {
    fn same_origin(&self, a: EntityId, b: EntityId) -> bool {
        let Some(left) = self.origins.get(&a).map(|o| o.clone()) else {
            return false;
        };
        self.origins.get(&b).is_some_and(|o| *o == left)
    }
}

/// Outcome of a damage roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageRoll {
    /// Damage dealt
    pub damage: i32,
    /// How the hit landed
    pub hit_mode: HitMode,
    /// Attacker carries a reflect effect; half the damage is shown by a proxy
    pub reflect: bool,
}

/// Damage calculation.
pub trait DamageFormula: Send + Sync {
    /// Rolls damage for `skill` from `source` against `target`.
    fn roll(&self, source: &CombatantSnapshot, target: &CombatantSnapshot, skill: &Skill) -> DamageRoll;
}

/// Attack minus defence with a flat critical chance.
#[derive(Debug)]
pub struct StandardFormula {
    rng_state: Mutex<u64>,
    /// Chance of a critical hit (0.0 - 1.0)
    pub crit_chance: f32,
    /// Damage multiplier of a critical hit
    pub crit_multiplier: f32,
}

impl Default for StandardFormula {
    fn default() -> Self {
        Self::new(0x2545_F491_4F6C_DD1D)
    }
}

impl StandardFormula {
    /// Creates a formula with a fixed random seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng_state: Mutex::new(seed.max(1)),
            crit_chance: 0.05,
            crit_multiplier: 1.5,
        }
    }

    fn next_random(&self) -> f32 {
        let mut state = self.rng_state.lock();
        *state ^= *state << 13;
        *state ^= *state >> 17;
        *state ^= *state << 5;
        (*state as f32) / (u64::MAX as f32)
    }
}

impl DamageFormula for StandardFormula {
    fn roll(&self, source: &CombatantSnapshot, target: &CombatantSnapshot, _skill: &Skill) -> DamageRoll {
        let base = (source.attack - target.defense).max(1);
        let critical = self.next_random() < self.crit_chance;
        let damage = if critical {
            (base as f32 * self.crit_multiplier) as i32
        } else {
            base
        };

        DamageRoll {
            damage,
            hit_mode: if critical { HitMode::Critical } else { HitMode::Normal },
            reflect: source.reflects,
        }
    }
}

/// Formula returning the same roll every time.
#[derive(Debug, Clone, Copy)]
pub struct FixedFormula(pub DamageRoll);

impl FixedFormula {
    /// Plain hits of `damage`.
    #[must_use]
    pub const fn damage(damage: i32) -> Self {
        Self(DamageRoll {
            damage,
            hit_mode: HitMode::Normal,
            reflect: false,
        })
    }
}

impl DamageFormula for FixedFormula {
    fn roll(&self, _source: &CombatantSnapshot, _target: &CombatantSnapshot, _skill: &Skill) -> DamageRoll {
        self.0
    }
}

/// Fixed damage, split through a proxy when the attacker carries a reflect
/// effect.
#[derive(Debug, Clone, Copy)]
pub struct ReflectAware(pub i32);

impl DamageFormula for ReflectAware {
    fn roll(&self, source: &CombatantSnapshot, _target: &CombatantSnapshot, _skill: &Skill) -> DamageRoll {
        DamageRoll {
            damage: self.0,
            hit_mode: HitMode::Normal,
            reflect: source.reflects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Combatant;
    use rampart_common::SkillId;
    use tokio::time::Instant;

    #[test]
    fn test_accounts_adjust() {
        let accounts = InMemoryAccounts::new();
        let hero = EntityId::new();
        accounts.adjust_reputation(hero, 500);
        accounts.adjust_reputation(hero, -200);
        accounts.adjust_faction_points(hero, -1);
        accounts.record_faction_kill(hero);

        let record = accounts.record(hero);
        assert_eq!(record.reputation, 300);
        assert_eq!(record.faction_points, -1);
        assert_eq!(record.faction_kills, 1);
    }

    #[test]
    fn test_origin_table() {
        let origins = OriginTable::new();
        let (a, b, c) = (EntityId::new(), EntityId::new(), EntityId::new());
        origins.insert(a, "10.0.0.1");
        origins.insert(b, "10.0.0.1");
        origins.insert(c, "10.0.0.2");

        assert!(origins.same_origin(a, b));
        assert!(!origins.same_origin(a, c));
        assert!(!origins.same_origin(a, EntityId::new()));
    }

    #[test]
    fn test_standard_formula_floor_and_reflect() {
        let formula = StandardFormula {
            crit_chance: 0.0,
            ..StandardFormula::new(7)
        };
        let now = Instant::now();
        let source = Combatant::player(EntityId::new(), "A").with_ratings(50, 0).snapshot(now);
        let target = Combatant::player(EntityId::new(), "B").with_ratings(0, 80).snapshot(now);
        let skill = Skill::new(SkillId::new(1), 0, "Jab");

        let roll = formula.roll(&source, &target, &skill);
        assert_eq!(roll.damage, 1);
        assert_eq!(roll.hit_mode, HitMode::Normal);
        assert!(!roll.reflect);
    }
}
