//! Hit broadcast payloads.
//!
//! Pure mapping from a resolved hit to what the region sees. Area-shaped
//! hits translate the rolled hit mode to its area counterpart; zone hits
//! report the ground cell; single-target area hits may lead with a zero-damage
//! payload that plays the hit animation on the primary target.

use rampart_common::{EntityId, MapPosition, SkillId};
use serde::Serialize;

use crate::hit::HitRequest;
use crate::skill::Skill;

/// Shape of a hit, deciding how it is broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HitOutcome {
    /// Plain single-target hit
    Single,
    /// Single-target hit at a combo stage
    Combo,
    /// Area hit reported per target
    AreaSingle,
    /// Area hit reported with the area hit modes
    Area,
    /// Ground-targeted hit
    Zone,
    /// One entry of a multi-target batch
    SpecialZone,
}

/// How a hit landed, as shown to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HitMode {
    /// Regular hit
    Normal,
    /// Absorbed; no damage
    Blocked,
    /// Missed
    Missed,
    /// Critical hit
    Critical,
    /// Absorbed area hit
    AreaBlocked,
    /// Regular area hit
    AreaNormal,
    /// Critical area hit
    AreaCritical,
    /// Support skill on an ally
    Support,
    /// Self-cast marker
    SelfCast,
}

impl HitMode {
    /// Wire code.
    #[must_use]
    pub const fn code(self) -> i8 {
        match self {
            Self::Normal => 0,
            Self::Blocked => 1,
            Self::Missed => 2,
            Self::Critical => 3,
            Self::AreaBlocked => 4,
            Self::AreaNormal => 5,
            Self::AreaCritical => 6,
            Self::Support => -1,
            Self::SelfCast => -2,
        }
    }

    /// Area counterpart of a rolled mode.
    #[must_use]
    pub const fn area_variant(self) -> Self {
        match self {
            Self::Blocked => Self::AreaBlocked,
            Self::Critical => Self::AreaCritical,
            _ => Self::AreaNormal,
        }
    }
}

/// Skill-use payload broadcast to a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillUsePayload {
    /// Combatant that used the skill
    pub caster: EntityId,
    /// Combatant hit
    pub target: EntityId,
    /// Skill
    pub skill: SkillId,
    /// Cooldown in ticks
    pub cooldown: u16,
    /// Animation
    pub animation: u16,
    /// Effect
    pub effect: u16,
    /// Cell shown for the impact
    pub position: MapPosition,
    /// Target still alive
    pub target_alive: bool,
    /// Target health percentage
    pub target_hp_percent: u8,
    /// Damage dealt
    pub damage: i32,
    /// How the hit landed
    pub hit_mode: HitMode,
    /// Client-facing skill type
    pub skill_type: u8,
}

/// Target-side facts a broadcast needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitContext {
    /// Target id
    pub target: EntityId,
    /// Caster's cell
    pub caster_position: MapPosition,
    /// Target alive after the hit
    pub target_alive: bool,
    /// Target health percentage after the hit
    pub target_hp_percent: u8,
}

/// Builds the payloads broadcast for one resolved hit.
#[must_use]
pub fn hit_payloads(request: &HitRequest, ctx: &HitContext, damage: i32, hit_mode: HitMode) -> Vec<SkillUsePayload> {
    let skill = &request.skill;
    let base = SkillUsePayload {
        caster: request.source,
        target: ctx.target,
        skill: skill.id,
        cooldown: skill.cooldown,
        animation: request.animation(),
        effect: request.effect(),
        position: ctx.caster_position,
        target_alive: ctx.target_alive,
        target_hp_percent: ctx.target_hp_percent,
        damage,
        hit_mode,
        skill_type: skill.skill_type,
    };

    match request.kind {
        HitOutcome::Single | HitOutcome::Combo => vec![base],
        HitOutcome::AreaSingle => {
            let main = SkillUsePayload {
                hit_mode: hit_mode.area_variant(),
                ..base
            };
            if request.show_target_animation {
                let replay = SkillUsePayload {
                    position: MapPosition::default(),
                    damage: 0,
                    hit_mode: HitMode::Normal,
                    ..main.clone()
                };
                vec![replay, main]
            } else {
                vec![main]
            }
        },
        HitOutcome::Area => vec![SkillUsePayload {
            hit_mode: hit_mode.area_variant(),
            ..base
        }],
        HitOutcome::Zone => vec![SkillUsePayload {
            position: request.zone.unwrap_or(ctx.caster_position),
            hit_mode: HitMode::AreaNormal,
            ..base
        }],
        HitOutcome::SpecialZone => vec![SkillUsePayload {
            hit_mode: HitMode::Normal,
            ..base
        }],
    }
}

/// Payload of a support skill landing on an ally.
#[must_use]
pub fn support_payload(caster: EntityId, target: EntityId, position: MapPosition, skill: &Skill) -> SkillUsePayload {
    SkillUsePayload {
        caster,
        target,
        skill: skill.id,
        cooldown: skill.cooldown,
        animation: skill.attack_animation,
        effect: skill.effect,
        position,
        target_alive: true,
        target_hp_percent: 100,
        damage: 0,
        hit_mode: HitMode::Support,
        skill_type: skill.skill_type,
    }
}

/// Payload of a caster-centred skill going off on the caster.
#[must_use]
pub fn self_cast_payload(caster: EntityId, position: MapPosition, skill: &Skill, effect: u16) -> SkillUsePayload {
    SkillUsePayload {
        caster,
        target: caster,
        skill: skill.id,
        cooldown: skill.cooldown,
        animation: skill.attack_animation,
        effect,
        position,
        target_alive: true,
        target_hp_percent: 100,
        damage: 0,
        hit_mode: HitMode::SelfCast,
        skill_type: skill.skill_type,
    }
}
