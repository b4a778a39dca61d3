//! Combatants: players and non-player combatants sharing one lockable state.
//!
//! Each combatant owns:
//! - an immutable identity (id, kind, profile)
//! - a [`CombatantState`] behind a `RwLock`, the only mutable part
//! - a [`HitQueue`] serialising damage against it
//!
//! Code never holds two combatant locks at once; callers take a
//! [`CombatantSnapshot`] of one side, release it, and only then lock the other.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rampart_common::{EntityId, GroupId, MapPosition, RegionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;

use crate::combo::ComboTracker;
use crate::death::DeathPhase;
use crate::faction::Faction;
use crate::hit::HitQueue;
use crate::skill::{ActiveBuff, BuffId, Card, Skill, SkillBook, WeaponSlot};

/// Player or non-player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombatantKind {
    /// Session-controlled character
    Player,
    /// Monster, guard, or proxy
    NonPlayer,
}

/// Extra data carried by non-player combatants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonPlayerProfile {
    /// Template number
    pub template: u16,
    /// Body size, added to the attacker's reach
    pub basic_area: u16,
    /// Whether players may target it at all
    pub hostile: bool,
    /// Short-lived proxy spawned by the resolver
    pub ephemeral: bool,
}

/// Mutable combat state of one combatant.
#[derive(Debug, Clone)]
pub struct CombatantState {
    /// Display name
    pub name: String,
    /// Character level
    pub level: u8,
    /// Current health
    pub hp: i32,
    /// Maximum health
    pub max_hp: i32,
    /// Current mana
    pub mp: i32,
    /// Maximum mana
    pub max_mp: i32,
    /// Attack rating fed to the damage formula
    pub attack: i32,
    /// Defence rating fed to the damage formula
    pub defense: i32,
    /// Region the combatant is in
    pub region: RegionId,
    /// Cell within the region
    pub position: MapPosition,
    /// Faction membership
    pub faction: Faction,
    /// Party membership
    pub group: Option<GroupId>,
    /// Active status effects
    pub buffs: Vec<ActiveBuff>,
    /// Loaded weapons
    pub weapons: Vec<WeaponSlot>,
    /// Skills the combatant can cast
    pub skills: SkillBook,
    /// Combo counters per skill
    pub combos: ComboTracker,
    /// Invulnerable and pays no mana
    pub god_mode: bool,
    /// Mounted; casting is refused
    pub vehicled: bool,
    /// Sitting; any cast stands the combatant up
    pub sitting: bool,
    /// Movement forbidden
    pub no_move: bool,
    /// Attacking forbidden
    pub no_attack: bool,
    /// Chat and casting blocked until this instant
    pub muted_until: Option<Instant>,
    /// Last transformation
    pub last_transform: Option<Instant>,
    /// Last successful cast of any skill
    pub last_skill_use: Option<Instant>,
    /// Last PVP revival
    pub last_revive: Option<Instant>,
    /// Where the death sequence stands
    pub phase: DeathPhase,
    /// Respawn point outside faction wars
    pub respawn: (RegionId, MapPosition),
    /// Non-player data
    pub npc: NonPlayerProfile,
}

impl CombatantState {
    fn new(name: String) -> Self {
        Self {
            name,
            level: 1,
            hp: 100,
            max_hp: 100,
            mp: 100,
            max_mp: 100,
            attack: 10,
            defense: 0,
            region: RegionId::new(0),
            position: MapPosition::default(),
            faction: Faction::Neutral,
            group: None,
            buffs: Vec::new(),
            weapons: vec![WeaponSlot::Main, WeaponSlot::Secondary],
            skills: SkillBook::new(),
            combos: ComboTracker::new(),
            god_mode: false,
            vehicled: false,
            sitting: false,
            no_move: false,
            no_attack: false,
            muted_until: None,
            last_transform: None,
            last_skill_use: None,
            last_revive: None,
            phase: DeathPhase::Alive,
            respawn: (RegionId::new(0), MapPosition::default()),
            npc: NonPlayerProfile::default(),
        }
    }

    /// Whether the combatant is alive and standing.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.phase == DeathPhase::Alive && self.hp > 0
    }

    /// Whether an unexpired buff with `id` is active.
    #[must_use]
    pub fn has_buff(&self, id: BuffId, now: Instant) -> bool {
        self.buffs.iter().any(|b| b.buff == id && b.is_active(now))
    }

    /// Applies a status effect, replacing an existing one with the same id.
    pub fn apply_card(&mut self, card: &Card, expires_at: Option<Instant>) {
        self.buffs.retain(|b| b.buff != card.buff);
        self.buffs.push(ActiveBuff {
            buff: card.buff,
            polarity: card.polarity,
            expires_at,
        });
    }

    /// Refills health and mana.
    pub fn restore_full(&mut self) {
        self.hp = self.max_hp;
        self.mp = self.max_mp;
    }

    /// Health as a percentage of maximum.
    #[must_use]
    pub fn hp_percent(&self) -> u8 {
        if self.max_hp <= 0 {
            return 0;
        }
        (i64::from(self.hp.max(0)) * 100 / i64::from(self.max_hp)).min(100) as u8
    }
}

/// Point-in-time copy of the fields other parties read about a combatant.
#[derive(Debug, Clone, PartialEq)]
pub struct CombatantSnapshot {
    /// Combatant id
    pub id: EntityId,
    /// Player or non-player
    pub kind: CombatantKind,
    /// Display name
    pub name: String,
    /// Character level
    pub level: u8,
    /// Current health
    pub hp: i32,
    /// Maximum health
    pub max_hp: i32,
    /// Attack rating
    pub attack: i32,
    /// Defence rating
    pub defense: i32,
    /// Region
    pub region: RegionId,
    /// Cell
    pub position: MapPosition,
    /// Faction membership
    pub faction: Faction,
    /// Party membership
    pub group: Option<GroupId>,
    /// Invulnerable
    pub god_mode: bool,
    /// Last PVP revival
    pub last_revive: Option<Instant>,
    /// Alive and standing
    pub alive: bool,
    /// Reflect effect active
    pub reflects: bool,
    /// Non-player data
    pub npc: NonPlayerProfile,
}

impl CombatantSnapshot {
    /// Whether this is a player.
    #[must_use]
    pub fn is_player(&self) -> bool {
        self.kind == CombatantKind::Player
    }

    /// Whether a caster of `faction` may target this non-player combatant.
    #[must_use]
    pub fn is_targetable_by(&self, faction: Faction) -> bool {
        self.npc.hostile && !self.npc.ephemeral && self.faction.is_hostile_to(faction)
    }
}

/// A player or non-player combatant.
#[derive(Debug)]
pub struct Combatant {
    id: EntityId,
    kind: CombatantKind,
    state: RwLock<CombatantState>,
    queue: HitQueue,
}

impl Combatant {
    /// Creates a player with default stats.
    #[must_use]
    pub fn player(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            kind: CombatantKind::Player,
            state: RwLock::new(CombatantState::new(name.into())),
            queue: HitQueue::new(),
        }
    }

    /// Creates a hostile non-player combatant from a template.
    #[must_use]
    pub fn non_player(id: EntityId, template: u16) -> Self {
        let mut state = CombatantState::new(format!("npc-{template}"));
        state.npc = NonPlayerProfile {
            template,
            basic_area: 0,
            hostile: true,
            ephemeral: false,
        };
        Self {
            id,
            kind: CombatantKind::NonPlayer,
            state: RwLock::new(state),
            queue: HitQueue::new(),
        }
    }

    /// Sets level.
    #[must_use]
    pub fn with_level(mut self, level: u8) -> Self {
        self.state.get_mut().level = level;
        self
    }

    /// Sets maximum health and mana, filling both.
    #[must_use]
    pub fn with_vitals(mut self, hp: i32, mp: i32) -> Self {
        let state = self.state.get_mut();
        state.max_hp = hp;
        state.hp = hp;
        state.max_mp = mp;
        state.mp = mp;
        self
    }

    /// Sets attack and defence ratings.
    #[must_use]
    pub fn with_ratings(mut self, attack: i32, defense: i32) -> Self {
        let state = self.state.get_mut();
        state.attack = attack;
        state.defense = defense;
        self
    }

    /// Sets the starting cell.
    #[must_use]
    pub fn at(mut self, position: MapPosition) -> Self {
        self.state.get_mut().position = position;
        self
    }

    /// Sets faction membership.
    #[must_use]
    pub fn with_faction(mut self, faction: Faction) -> Self {
        self.state.get_mut().faction = faction;
        self
    }

    /// Sets party membership.
    #[must_use]
    pub fn with_group(mut self, group: GroupId) -> Self {
        self.state.get_mut().group = Some(group);
        self
    }

    /// Learns a primary skill.
    #[must_use]
    pub fn with_skill(mut self, skill: Arc<Skill>) -> Self {
        self.state.get_mut().skills.learn(skill);
        self
    }

    /// Learns a special skill.
    #[must_use]
    pub fn with_special_skill(mut self, skill: Arc<Skill>) -> Self {
        self.state.get_mut().skills.learn_special(skill);
        self
    }

    /// Sets body size of a non-player combatant.
    #[must_use]
    pub fn with_basic_area(mut self, cells: u16) -> Self {
        self.state.get_mut().npc.basic_area = cells;
        self
    }

    /// Marks a non-player combatant as a short-lived, untargetable proxy.
    #[must_use]
    pub fn as_proxy(mut self) -> Self {
        let npc = &mut self.state.get_mut().npc;
        npc.hostile = false;
        npc.ephemeral = true;
        self
    }

    /// Sets the respawn point used outside faction wars.
    #[must_use]
    pub fn with_respawn(mut self, region: RegionId, position: MapPosition) -> Self {
        self.state.get_mut().respawn = (region, position);
        self
    }

    /// Combatant id.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Player or non-player.
    #[must_use]
    pub const fn kind(&self) -> CombatantKind {
        self.kind
    }

    /// Whether this is a player.
    #[must_use]
    pub fn is_player(&self) -> bool {
        self.kind == CombatantKind::Player
    }

    /// Pending hit requests against this combatant.
    #[must_use]
    pub const fn queue(&self) -> &HitQueue {
        &self.queue
    }

    /// Read access to the state.
    pub fn read(&self) -> RwLockReadGuard<'_, CombatantState> {
        self.state.read()
    }

    /// Write access to the state.
    pub fn write(&self) -> RwLockWriteGuard<'_, CombatantState> {
        self.state.write()
    }

    /// Region the combatant currently stands in.
    #[must_use]
    pub fn region(&self) -> RegionId {
        self.state.read().region
    }

    /// Copies the fields other parties need, releasing the lock on return.
    #[must_use]
    pub fn snapshot(&self, now: Instant) -> CombatantSnapshot {
        let state = self.state.read();
        CombatantSnapshot {
            id: self.id,
            kind: self.kind,
            name: state.name.clone(),
            level: state.level,
            hp: state.hp,
            max_hp: state.max_hp,
            attack: state.attack,
            defense: state.defense,
            region: state.region,
            position: state.position,
            faction: state.faction,
            group: state.group,
            god_mode: state.god_mode,
            last_revive: state.last_revive,
            alive: state.is_alive(),
            reflects: state.has_buff(BuffId::REFLECT, now),
            npc: state.npc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::BuffPolarity;

    #[test]
    fn test_builder_sets_state() {
        let hero = Combatant::player(EntityId::new(), "Ayla")
            .with_level(40)
            .with_vitals(2_000, 500)
            .with_faction(Faction::Angel)
            .at(MapPosition::new(5, 6));

        let state = hero.read();
        assert_eq!(state.level, 40);
        assert_eq!(state.hp, 2_000);
        assert_eq!(state.mp, 500);
        assert_eq!(state.position, MapPosition::new(5, 6));
        assert!(state.is_alive());
        assert!(hero.is_player());
    }

    #[test]
    fn test_proxy_is_untargetable() {
        let proxy = Combatant::non_player(EntityId::new(), 2371).as_proxy();
        let snap = proxy.snapshot(Instant::now());
        assert!(!snap.is_targetable_by(Faction::Angel));

        let monster = Combatant::non_player(EntityId::new(), 1);
        assert!(monster.snapshot(Instant::now()).is_targetable_by(Faction::Angel));
    }

    #[test]
    fn test_hp_percent() {
        let hero = Combatant::player(EntityId::new(), "Ayla").with_vitals(1_000, 0);
        hero.write().hp = 251;
        assert_eq!(hero.read().hp_percent(), 25);
        hero.write().hp = 0;
        assert_eq!(hero.read().hp_percent(), 0);
    }

    #[test]
    fn test_apply_card_replaces_same_buff() {
        let hero = Combatant::player(EntityId::new(), "Ayla");
        let card = Card {
            buff: BuffId::REFLECT,
            polarity: BuffPolarity::Good,
            duration_ticks: 0,
        };
        let now = Instant::now();
        {
            let mut state = hero.write();
            state.apply_card(&card, None);
            state.apply_card(&card, None);
            assert_eq!(state.buffs.len(), 1);
        }
        assert!(hero.snapshot(now).reflects);
    }
}
