//! Consecutive-use counters per (combatant, skill).
//!
//! A counter restarts at 1 when the skill sat idle longer than the reset
//! window and otherwise climbs by one per use. Reaching the skill's highest
//! combo threshold clears the counter so the next use starts a new chain.
//! Using a different skill leaves other counters alone.

use rampart_common::SkillId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::skill::{ComboDefinition, Skill};

#[derive(Debug, Clone, Copy)]
struct ComboCounter {
    hits: u8,
    last_use: Instant,
}

/// Result of registering one use of a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComboStep {
    /// Consecutive use count including this one
    pub hit: u8,
    /// Combo stage triggered by this use
    pub combo: Option<ComboDefinition>,
    /// This use completed the chain and the counter was cleared
    pub chain_complete: bool,
}

/// Combo counters of one combatant.
#[derive(Debug, Clone, Default)]
pub struct ComboTracker {
    counters: HashMap<SkillId, ComboCounter>,
}

impl ComboTracker {
    /// Creates a tracker with no counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a use of `skill` at `now`.
    pub fn advance(&mut self, skill: &Skill, now: Instant, reset_after: Duration) -> ComboStep {
        let counter = self.counters.entry(skill.id).or_insert(ComboCounter {
            hits: 0,
            last_use: now,
        });

        if now.saturating_duration_since(counter.last_use) > reset_after {
            counter.hits = 0;
        }
        counter.hits = counter.hits.saturating_add(1);
        counter.last_use = now;

        let hit = counter.hits;
        let combo = skill.combo_for(hit).copied();
        let chain_complete = combo.is_some() && skill.max_combo_hit() == Some(hit);
        if chain_complete {
            counter.hits = 0;
        }

        ComboStep {
            hit,
            combo,
            chain_complete,
        }
    }

    /// Current counter value for a skill.
    #[must_use]
    pub fn hits(&self, skill: SkillId) -> u8 {
        self.counters.get(&skill).map_or(0, |c| c.hits)
    }
}
