//! Skill definitions and per-combatant skill books.
//!
//! Skills are immutable reference data shared through `Arc`. A combatant's
//! [`SkillBook`] pairs them with the mutable bits: the last-use timestamp
//! driving cooldowns and the primary/special split.

use rampart_common::SkillId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How a skill picks its primary target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    /// A designated combatant
    #[default]
    Single,
    /// Centred on the caster
    SelfArea,
    /// A designated ally
    Ally,
}

/// How a skill spreads once the target is picked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HitType {
    /// One combatant
    #[default]
    Single,
    /// Every eligible combatant around the centre
    Cleave,
    /// Every ally around the caster
    Party,
    /// The caster only
    SelfBuff,
}

/// Weapon slot a skill draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponSlot {
    /// Main-hand weapon
    Main,
    /// Off-hand weapon
    Secondary,
}

/// Identifier of a status effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuffId(pub u16);

impl BuffId {
    /// Forbids attacking while active.
    pub const NO_ATTACK: Self = Self(1);
    /// Splits incoming damage with a short-lived proxy.
    pub const REFLECT: Self = Self(2);
}

/// Whether a status effect helps or hinders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuffPolarity {
    /// Beneficial
    Good,
    /// Harmful
    Bad,
    /// Neither
    Neutral,
}

/// Status effect granted by a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Effect granted
    pub buff: BuffId,
    /// Effect polarity
    pub polarity: BuffPolarity,
    /// Duration in skill ticks, 0 for permanent
    pub duration_ticks: u16,
}

/// A status effect active on a combatant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveBuff {
    /// Effect id
    pub buff: BuffId,
    /// Effect polarity
    pub polarity: BuffPolarity,
    /// Expiry, `None` for permanent
    pub expires_at: Option<Instant>,
}

impl ActiveBuff {
    /// Checks whether the effect still applies at `now`.
    #[must_use]
    pub fn is_active(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Combo stage reached after a number of consecutive uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboDefinition {
    /// Consecutive use count that triggers this stage
    pub hit: u8,
    /// Animation replacing the skill's attack animation
    pub animation: u16,
    /// Effect replacing the skill's effect
    pub effect: u16,
}

/// Skill reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    /// Catalogue number
    pub id: SkillId,
    /// Slot number the client casts by
    pub cast_id: u16,
    /// Display name
    pub name: String,
    /// Mana cost
    pub mp_cost: i32,
    /// Cooldown in ticks
    pub cooldown: u16,
    /// Cast time in ticks
    pub cast_time: u16,
    /// Animation while casting
    pub cast_animation: u16,
    /// Effect while casting, 0 for an instant cast
    pub cast_effect: u16,
    /// Animation on hit
    pub attack_animation: u16,
    /// Effect on hit
    pub effect: u16,
    /// Reach to the primary target, in cells
    pub range: u16,
    /// Area radius around the centre, 0 for single-target
    pub target_range: u16,
    /// Primary target selection
    pub target_type: TargetType,
    /// Spread after selection
    pub hit_type: HitType,
    /// Client-facing type code
    pub skill_type: u8,
    /// Weapon the skill needs loaded
    pub weapon: Option<WeaponSlot>,
    /// Status effects applied by support skills
    pub cards: Vec<Card>,
    /// Combo stages, by consecutive hit count
    pub combos: Vec<ComboDefinition>,
    /// Base skill whose visuals this one overrides
    pub upgrade_of: Option<SkillId>,
}

impl Skill {
    /// Creates a single-target skill with no cost, cooldown, or cast time.
    #[must_use]
    pub fn new(id: SkillId, cast_id: u16, name: impl Into<String>) -> Self {
        Self {
            id,
            cast_id,
            name: name.into(),
            mp_cost: 0,
            cooldown: 0,
            cast_time: 0,
            cast_animation: 0,
            cast_effect: 0,
            attack_animation: 0,
            effect: 0,
            range: 1,
            target_range: 0,
            target_type: TargetType::Single,
            hit_type: HitType::Single,
            skill_type: 0,
            weapon: None,
            cards: Vec::new(),
            combos: Vec::new(),
            upgrade_of: None,
        }
    }

    /// Sets mana cost.
    #[must_use]
    pub fn with_mp_cost(mut self, cost: i32) -> Self {
        self.mp_cost = cost;
        self
    }

    /// Sets cooldown, in ticks.
    #[must_use]
    pub fn with_cooldown(mut self, ticks: u16) -> Self {
        self.cooldown = ticks;
        self
    }

    /// Sets the cast time (ticks) and the effect shown while casting.
    #[must_use]
    pub fn with_cast(mut self, ticks: u16, effect: u16) -> Self {
        self.cast_time = ticks;
        self.cast_effect = effect;
        self
    }

    /// Sets hit visuals.
    #[must_use]
    pub fn with_visuals(mut self, attack_animation: u16, effect: u16) -> Self {
        self.attack_animation = attack_animation;
        self.effect = effect;
        self
    }

    /// Sets reach and area radius.
    #[must_use]
    pub fn with_range(mut self, range: u16, target_range: u16) -> Self {
        self.range = range;
        self.target_range = target_range;
        self
    }

    /// Sets target selection and spread.
    #[must_use]
    pub fn with_targeting(mut self, target_type: TargetType, hit_type: HitType) -> Self {
        self.target_type = target_type;
        self.hit_type = hit_type;
        self
    }

    /// Requires a loaded weapon.
    #[must_use]
    pub fn with_weapon(mut self, slot: WeaponSlot) -> Self {
        self.weapon = Some(slot);
        self
    }

    /// Adds a status effect.
    #[must_use]
    pub fn with_card(mut self, card: Card) -> Self {
        self.cards.push(card);
        self
    }

    /// Adds a combo stage.
    #[must_use]
    pub fn with_combo(mut self, combo: ComboDefinition) -> Self {
        self.combos.push(combo);
        self
    }

    /// Marks this skill as a visual upgrade of `base`.
    #[must_use]
    pub fn upgrading(mut self, base: SkillId) -> Self {
        self.upgrade_of = Some(base);
        self
    }

    /// Combo stage triggered at `hit` consecutive uses.
    #[must_use]
    pub fn combo_for(&self, hit: u8) -> Option<&ComboDefinition> {
        self.combos.iter().find(|c| c.hit == hit)
    }

    /// Highest combo threshold, if the skill chains at all.
    #[must_use]
    pub fn max_combo_hit(&self) -> Option<u8> {
        self.combos.iter().map(|c| c.hit).max()
    }

    /// Whether the skill hits an area around its centre.
    #[must_use]
    pub const fn is_area(&self) -> bool {
        self.target_range != 0
    }
}

/// Visual replacement granted by an upgrade skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectOverride {
    /// Replacement hit effect
    pub effect: u16,
    /// Replacement cast effect
    pub cast_effect: u16,
}

/// A skill as known by one combatant.
#[derive(Debug, Clone)]
pub struct LearnedSkill {
    /// Reference data
    pub skill: Arc<Skill>,
    /// Last successful cast
    pub last_use: Option<Instant>,
}

impl LearnedSkill {
    /// Checks whether the cooldown has elapsed at `now`.
    #[must_use]
    pub fn is_ready(&self, now: Instant, cooldown: Duration) -> bool {
        self.last_use
            .map_or(true, |used| now.saturating_duration_since(used) >= cooldown)
    }
}

/// Skills a combatant can cast, split into the primary set and the special
/// set used while transformed.
#[derive(Debug, Clone, Default)]
pub struct SkillBook {
    primary: Vec<LearnedSkill>,
    special: Vec<LearnedSkill>,
    /// Casting draws from the special set
    pub use_special: bool,
}

impl SkillBook {
    /// Creates an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Learns a skill into the primary set.
    pub fn learn(&mut self, skill: Arc<Skill>) {
        self.primary.push(LearnedSkill {
            skill,
            last_use: None,
        });
    }

    /// Learns a skill into the special set.
    pub fn learn_special(&mut self, skill: Arc<Skill>) {
        self.special.push(LearnedSkill {
            skill,
            last_use: None,
        });
    }

    fn active(&self) -> &[LearnedSkill] {
        if self.use_special {
            &self.special
        } else {
            &self.primary
        }
    }

    fn active_mut(&mut self) -> &mut [LearnedSkill] {
        if self.use_special {
            &mut self.special
        } else {
            &mut self.primary
        }
    }

    /// Finds the castable skill in the active set by its cast slot.
    ///
    /// Upgrade skills only lend their visuals and are never cast directly.
    #[must_use]
    pub fn find_by_cast(&self, cast_id: u16) -> Option<&LearnedSkill> {
        self.active()
            .iter()
            .find(|l| l.skill.cast_id == cast_id && l.skill.upgrade_of.is_none())
    }

    /// Stamps the last use of the skill in the active set.
    pub fn mark_used(&mut self, id: SkillId, now: Instant) {
        if let Some(learned) = self.active_mut().iter_mut().find(|l| l.skill.id == id) {
            learned.last_use = Some(now);
        }
    }

    /// Visual override for `base` from the lowest-numbered upgrade learned in
    /// the primary set that carries an effect of its own.
    #[must_use]
    pub fn effect_override(&self, base: SkillId) -> Option<EffectOverride> {
        self.primary
            .iter()
            .filter(|l| l.skill.upgrade_of == Some(base) && l.skill.effect > 0)
            .min_by_key(|l| l.skill.id)
            .map(|l| EffectOverride {
                effect: l.skill.effect,
                cast_effect: l.skill.cast_effect,
            })
    }
}
