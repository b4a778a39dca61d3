//! Combat error types.
//!
//! - [`CastDenial`]: a cast the caster is not allowed to make; recovered
//!   locally by cancelling the cast and telling the caster
//! - [`CombatError`]: lookups and transient failures of non-cast operations

use rampart_common::{EntityId, LookupError, RegionId, SkillId};
use std::time::Duration;
use thiserror::Error;

use crate::events::{CancelCategory, MessageKey};
use crate::targeting::Ineligibility;

/// Reasons a cast is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CastDenial {
    /// Caster has no session in the world
    #[error("unknown caster: {0}")]
    UnknownCaster(EntityId),
    /// Caster transformed moments ago
    #[error("recently transformed")]
    RecentlyTransformed,
    /// Caster is muted
    #[error("muted for another {0:?}")]
    Muted(Duration),
    /// Caster is mounted
    #[error("cannot cast while mounted")]
    Vehicled,
    /// Caster carries a no-attack status
    #[error("attacking is forbidden")]
    NoAttack,
    /// Caster is dead
    #[error("caster is defeated")]
    CasterDefeated,
    /// Slot holds no castable skill
    #[error("no skill in slot {0}")]
    UnknownSkill(u16),
    /// Skill is still cooling down
    #[error("skill {0} is cooling down")]
    OnCooldown(SkillId),
    /// Mana below cost
    #[error("not enough mana: need {required}, have {current}")]
    NotEnoughMana {
        /// Skill cost
        required: i32,
        /// Caster mana
        current: i32,
    },
    /// Required weapon not loaded
    #[error("weapon not loaded")]
    WeaponNotLoaded,
    /// Skill cannot be cast through this entry point
    #[error("skill {0} cannot be cast this way")]
    WrongTargeting(SkillId),
    /// Caster is not inside a live region
    #[error("caster is not in a region")]
    NoRegion,
    /// Target does not exist in the caster's region
    #[error("target not found: {0}")]
    TargetNotFound(EntityId),
    /// Target too far away
    #[error("target out of range: distance {distance}, range {range}")]
    OutOfRange {
        /// Grid distance
        distance: u16,
        /// Allowed reach
        range: u16,
    },
    /// Target fails the eligibility filter
    #[error("ineligible target: {0}")]
    Ineligible(#[from] Ineligibility),
    /// Multi-target batch count is zero or does not match its entries
    #[error("malformed multi-target batch")]
    InvalidBatch,
}

impl CastDenial {
    /// Cancel category sent to the caster, if any.
    #[must_use]
    pub const fn category(&self) -> Option<CancelCategory> {
        match self {
            Self::UnknownCaster(_) | Self::InvalidBatch => None,
            Self::RecentlyTransformed | Self::Muted(_) | Self::Vehicled | Self::NoAttack | Self::WrongTargeting(_) => {
                Some(CancelCategory::Caster)
            },
            _ => Some(CancelCategory::Target),
        }
    }

    /// Notice accompanying the cancel signal, if any.
    #[must_use]
    pub fn reason(&self) -> Option<MessageKey> {
        match self {
            Self::RecentlyTransformed => Some(MessageKey::CantAttackNow),
            Self::Vehicled | Self::NoAttack => Some(MessageKey::CantAttack),
            Self::NotEnoughMana { .. } => Some(MessageKey::NotEnoughMp),
            _ => None,
        }
    }

    /// Identifier echoed in the cancel signal.
    ///
    /// Caster-side refusals and a dead caster echo 0; target refusals echo
    /// the target (or cast slot) the client aimed at.
    #[must_use]
    pub const fn echo(&self, aimed_at: u64) -> u64 {
        match self {
            Self::CasterDefeated => 0,
            Self::WrongTargeting(_) => aimed_at,
            _ => match self.category() {
                Some(CancelCategory::Target) => aimed_at,
                _ => 0,
            },
        }
    }
}

/// Result of a cast.
pub type CastResult<T> = Result<T, CastDenial>;

/// Errors of non-cast combat operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombatError {
    /// Entity is not in the world
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),
    /// Region does not exist
    #[error("region not found: {0}")]
    RegionNotFound(RegionId),
    /// Skill is unknown
    #[error("skill not found: {0}")]
    SkillNotFound(SkillId),
    /// Target changed underneath the operation
    #[error("transient failure: {0}")]
    Transient(String),
}

impl From<LookupError> for CombatError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::EntityNotFound(id) => Self::EntityNotFound(id),
            LookupError::RegionNotFound(id) => Self::RegionNotFound(id),
            LookupError::SkillNotFound(id) => Self::SkillNotFound(id),
        }
    }
}

/// Result type for combat operations.
pub type CombatResult<T> = Result<T, CombatError>;
