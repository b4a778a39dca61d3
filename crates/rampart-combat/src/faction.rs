//! Faction membership and faction-war progress.
//!
//! Two factions contest faction-war regions. Each faction carries:
//! - a progress percentage raised by kills
//! - a special-mode flag; while either faction is in a special mode, kills
//!   no longer raise progress

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Faction a combatant belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Faction {
    /// No faction
    #[default]
    Neutral,
    /// First warring faction
    Angel,
    /// Second warring faction
    Demon,
}

impl Faction {
    /// Checks whether this is one of the warring factions.
    #[must_use]
    pub const fn is_aligned(self) -> bool {
        !matches!(self, Self::Neutral)
    }

    /// Checks whether a combatant of this faction may be attacked by `other`.
    ///
    /// Neutral combatants are fair game for everyone; aligned combatants
    /// only for members of a different faction.
    #[must_use]
    pub fn is_hostile_to(self, other: Faction) -> bool {
        match self {
            Self::Neutral => true,
            aligned => aligned != other,
        }
    }
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Neutral => write!(f, "neutral"),
            Self::Angel => write!(f, "angel"),
            Self::Demon => write!(f, "demon"),
        }
    }
}

/// Progress of one faction in the war.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionProgress {
    /// Accumulated progress
    pub percentage: u32,
    /// Non-zero while the faction runs a special mode
    pub mode: u8,
}

/// Shared faction-war scoreboard.
#[derive(Debug, Default)]
pub struct FactionWarState {
    angel: Mutex<FactionProgress>,
    demon: Mutex<FactionProgress>,
}

impl FactionWarState {
    /// Creates an empty scoreboard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, faction: Faction) -> Option<&Mutex<FactionProgress>> {
        match faction {
            Faction::Angel => Some(&self.angel),
            Faction::Demon => Some(&self.demon),
            Faction::Neutral => None,
        }
    }

    /// Current progress of a faction.
    #[must_use]
    pub fn progress(&self, faction: Faction) -> FactionProgress {
        self.slot(faction).map(|s| *s.lock()).unwrap_or_default()
    }

    /// Sets a faction's special mode.
    pub fn set_mode(&self, faction: Faction, mode: u8) {
        if let Some(slot) = self.slot(faction) {
            slot.lock().mode = mode;
        }
    }

    /// Credits a kill to `faction`.
    ///
    /// Progress only moves while neither faction runs a special mode.
    /// Returns whether progress was added.
    pub fn award_kill(&self, faction: Faction, amount: u32) -> bool {
        if self.angel.lock().mode != 0 || self.demon.lock().mode != 0 {
            return false;
        }
        match self.slot(faction) {
            Some(slot) => {
                let mut progress = slot.lock();
                progress.percentage = progress.percentage.saturating_add(amount);
                true
            },
            None => false,
        }
    }
}
