//! Shared combat context.
//!
//! Bundles configuration, the injected collaborators, the scheduler, and the
//! faction-war scoreboard. Built once per process and passed around as
//! `Arc<CombatContext>`; scheduled continuations hold their own clone.

use std::sync::Arc;

use crate::config::CombatConfig;
use crate::faction::FactionWarState;
use crate::ports::{AccountStore, DamageFormula, InMemoryAccounts, OriginCheck, OriginTable, SessionSink, StandardFormula};
use crate::region::RegionDirectory;
use crate::scheduler::DelayedEventScheduler;

/// Everything the combat core needs from the process.
pub struct CombatContext {
    /// Tuning constants
    pub config: CombatConfig,
    /// Region and entity lookups
    pub directory: Arc<dyn RegionDirectory>,
    /// Outbound messages
    pub sessions: Arc<dyn SessionSink>,
    /// Persistent counters
    pub accounts: Arc<dyn AccountStore>,
    /// Network-origin comparison
    pub origins: Arc<dyn OriginCheck>,
    /// Damage roll
    pub formula: Arc<dyn DamageFormula>,
    /// Timed continuations
    pub scheduler: DelayedEventScheduler,
    /// Faction-war scoreboard
    pub faction_war: FactionWarState,
}

impl std::fmt::Debug for CombatContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombatContext")
            .field("config", &self.config)
            .field("pending_events", &self.scheduler.pending_count())
            .finish_non_exhaustive()
    }
}

impl CombatContext {
    /// Creates a context with in-memory accounts, an empty origin table, and
    /// the standard damage formula.
    #[must_use]
    pub fn new(
        config: CombatConfig,
        directory: Arc<dyn RegionDirectory>,
        sessions: Arc<dyn SessionSink>,
        scheduler: DelayedEventScheduler,
    ) -> Self {
        Self {
            config,
            directory,
            sessions,
            accounts: Arc::new(InMemoryAccounts::new()),
            origins: Arc::new(OriginTable::new()),
            formula: Arc::new(StandardFormula::default()),
            scheduler,
            faction_war: FactionWarState::new(),
        }
    }

    /// Sets the account store.
    #[must_use]
    pub fn with_accounts(mut self, accounts: Arc<dyn AccountStore>) -> Self {
        self.accounts = accounts;
        self
    }

    /// Sets the origin check.
    #[must_use]
    pub fn with_origins(mut self, origins: Arc<dyn OriginCheck>) -> Self {
        self.origins = origins;
        self
    }

    /// Sets the damage formula.
    #[must_use]
    pub fn with_formula(mut self, formula: Arc<dyn DamageFormula>) -> Self {
        self.formula = formula;
        self
    }
}
