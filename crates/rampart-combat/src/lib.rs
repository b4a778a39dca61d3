//! # Rampart Combat
//!
//! Combat resolution core for the Rampart game server.
//!
//! This crate owns everything between a client asking to cast a skill and
//! the world reacting to the outcome:
//! - Skill cast coordination (validation, mana, cooldowns, cast times)
//! - Per-target hit queues and damage resolution
//! - Combo tracking
//! - Delayed and repeating events on the tokio runtime
//! - The PVP death and respawn state machine
//! - Faction-war scoring and region announcements
//!
//! Networking, persistence and the wider world are reached through the
//! traits in [`ports`] and [`region::RegionDirectory`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod announce;
pub mod broadcast;
pub mod combo;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod death;
pub mod entity;
pub mod error;
pub mod events;
pub mod faction;
pub mod hit;
pub mod ports;
pub mod region;
pub mod resolver;
pub mod scheduler;
pub mod skill;
pub mod targeting;

#[cfg(test)]
mod scenarios;
#[cfg(test)]
mod testing;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::announce::Announcement;
    pub use crate::broadcast::{HitMode, HitOutcome, SkillUsePayload};
    pub use crate::combo::{ComboStep, ComboTracker};
    pub use crate::config::{CitadelConfig, CombatConfig, ConfigError, CONFIG_FILE};
    pub use crate::context::CombatContext;
    pub use crate::coordinator::{CastReport, CastRequest, CastTarget, CombatService};
    pub use crate::death::{DeathEvent, DeathPhase};
    pub use crate::entity::{Combatant, CombatantKind, CombatantSnapshot, CombatantState};
    pub use crate::error::{CastDenial, CastResult, CombatError, CombatResult};
    pub use crate::events::{CancelCategory, ChannelSink, Delivery, MessageKey, Recipient, ServerMessage};
    pub use crate::faction::{Faction, FactionProgress, FactionWarState};
    pub use crate::hit::{HitQueue, HitRequest};
    pub use crate::ports::{
        AccountRecord, AccountStore, BroadcastScope, DamageFormula, DamageRoll, InMemoryAccounts, OriginCheck,
        OriginTable, SessionSink, StandardFormula,
    };
    pub use crate::region::{Region, RegionDirectory, RegionKind, World};
    pub use crate::resolver::HitResolution;
    pub use crate::scheduler::{DelayedEventScheduler, EventId};
    pub use crate::skill::{BuffId, BuffPolarity, Card, ComboDefinition, HitType, Skill, TargetType, WeaponSlot};
    pub use crate::targeting::Ineligibility;
}

pub use prelude::*;
