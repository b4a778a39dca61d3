//! Combat configuration.
//!
//! Every timing window and tuning constant used by the combat core lives here:
//! - Tick length used by skill cooldowns and cast times
//! - Combo and revive-grace windows
//! - Reflect proxy lifetime and placement
//! - Death sequence timings and effects
//! - Faction-war scoring and citadel respawn points
//!
//! Configuration is loaded from `rampart.toml`; a missing or unreadable file
//! falls back to defaults.

use rampart_common::{MapPosition, RegionId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::faction::Faction;

/// Configuration file name.
pub const CONFIG_FILE: &str = "rampart.toml";

/// Errors raised while parsing combat configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("config io error: {0}")]
    Io(#[from] io::Error),
    /// TOML could not be parsed
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// TOML could not be produced
    #[error("config encode error: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Respawn point for one faction during a faction war.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitadelConfig {
    /// Faction respawning here
    pub faction: Faction,
    /// Region holding the citadel
    pub region: u32,
    /// Citadel X cell
    pub x: i16,
    /// Citadel Y cell
    pub y: i16,
}

impl CitadelConfig {
    /// Region id of the citadel.
    #[must_use]
    pub const fn region_id(&self) -> RegionId {
        RegionId::new(self.region)
    }

    /// Centre cell of the citadel.
    #[must_use]
    pub const fn position(&self) -> MapPosition {
        MapPosition::new(self.x, self.y)
    }
}

/// Combat configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    // === Timing ===
    /// Length of one skill tick in milliseconds
    pub tick_ms: u64,
    /// Idle time after which a combo chain starts over, in milliseconds
    pub combo_reset_ms: u64,
    /// Damage immunity after a PVP revival, in milliseconds
    pub revive_grace_ms: u64,
    /// Casting lockout after a transformation, in milliseconds
    pub transform_lock_ms: u64,

    // === Range ===
    /// Extra cells tolerated on top of a skill's range
    pub range_slack: u16,

    // === Reflect ===
    /// Lifetime of the reflect proxy in milliseconds
    pub reflect_lifetime_ms: u64,
    /// Cell offset of the proxy from the reflecting combatant
    pub reflect_offset: i16,
    /// Template number of the proxy combatant
    pub reflect_template: u16,

    // === Death sequence ===
    /// Delay before the revive posture, in milliseconds
    pub posture_delay_ms: u64,
    /// Delay before a faction-war respawn, in milliseconds
    pub respawn_delay_ms: u64,
    /// Delay before the revive prompt in open regions, in milliseconds
    pub revive_prompt_ms: u64,
    /// Effect shown while lying in the revive posture
    pub posture_effect: u16,
    /// Effect repeated on frozen combatants
    pub freeze_effect: u16,
    /// Interval of the freeze effect, in milliseconds
    pub freeze_interval_ms: u64,

    // === Faction war ===
    /// Progress a faction gains per kill
    pub progress_per_kill: u32,
    /// Faction points lost by the victim
    pub death_penalty: i32,
    /// Faction points gained by a killer beating a much higher-level victim
    pub kill_bonus: i32,
    /// Level gap the victim must exceed the killer by for the bonus
    pub bonus_level_gap: u8,
    /// Reputation below which a victim loses nothing
    pub reputation_floor: i64,
    /// Reputation transferred per victim level
    pub reputation_per_level: i64,
    /// Maximum jitter applied around a citadel, exclusive upper bound
    pub citadel_jitter: i16,
    /// Citadel respawn points
    pub citadels: Vec<CitadelConfig>,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            combo_reset_ms: 3_000,
            revive_grace_ms: 10_000,
            transform_lock_ms: 3_000,

            range_slack: 1,

            reflect_lifetime_ms: 350,
            reflect_offset: 2,
            reflect_template: 2371,

            posture_delay_ms: 2_000,
            respawn_delay_ms: 30_000,
            revive_prompt_ms: 1_000,
            posture_effect: 1564,
            freeze_effect: 35,
            freeze_interval_ms: 1_000,

            progress_per_kill: 100,
            death_penalty: 1,
            kill_bonus: 2,
            bonus_level_gap: 10,
            reputation_floor: 50_000,
            reputation_per_level: 50,
            citadel_jitter: 3,
            citadels: vec![
                CitadelConfig {
                    faction: Faction::Angel,
                    region: 130,
                    x: 39,
                    y: 42,
                },
                CitadelConfig {
                    faction: Faction::Demon,
                    region: 131,
                    x: 39,
                    y: 42,
                },
            ],
        }
    }
}

impl CombatConfig {
    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Combat config not found at {}, using defaults", path.display());
            return Self::default();
        }

        match fs::read_to_string(path)
            .map_err(ConfigError::from)
            .and_then(|contents| Self::from_toml_str(&contents))
        {
            Ok(config) => {
                info!("Loaded combat config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to load combat config: {e}");
                Self::default()
            },
        }
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let mut config: Self = toml::from_str(contents)?;
        config.validate();
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved combat config to {}", path.display());
        Ok(())
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        self.tick_ms = self.tick_ms.clamp(10, 1_000);
        self.freeze_interval_ms = self.freeze_interval_ms.max(100);
        self.reflect_lifetime_ms = self.reflect_lifetime_ms.max(1);
        self.respawn_delay_ms = self.respawn_delay_ms.max(self.posture_delay_ms);
        self.citadel_jitter = self.citadel_jitter.clamp(1, 16);
        self.reputation_floor = self.reputation_floor.max(0);
        self.reputation_per_level = self.reputation_per_level.max(0);
    }

    /// Converts a number of skill ticks to wall time.
    #[must_use]
    pub const fn ticks(&self, ticks: u16) -> Duration {
        Duration::from_millis(self.tick_ms * ticks as u64)
    }

    /// Combo idle reset window.
    #[must_use]
    pub const fn combo_reset(&self) -> Duration {
        Duration::from_millis(self.combo_reset_ms)
    }

    /// Grace window after a PVP revival.
    #[must_use]
    pub const fn revive_grace(&self) -> Duration {
        Duration::from_millis(self.revive_grace_ms)
    }

    /// Casting lockout after a transformation.
    #[must_use]
    pub const fn transform_lock(&self) -> Duration {
        Duration::from_millis(self.transform_lock_ms)
    }

    /// Reflect proxy lifetime.
    #[must_use]
    pub const fn reflect_lifetime(&self) -> Duration {
        Duration::from_millis(self.reflect_lifetime_ms)
    }

    /// Delay before the revive posture.
    #[must_use]
    pub const fn posture_delay(&self) -> Duration {
        Duration::from_millis(self.posture_delay_ms)
    }

    /// Delay before a faction-war respawn.
    #[must_use]
    pub const fn respawn_delay(&self) -> Duration {
        Duration::from_millis(self.respawn_delay_ms)
    }

    /// Delay before the revive prompt.
    #[must_use]
    pub const fn revive_prompt(&self) -> Duration {
        Duration::from_millis(self.revive_prompt_ms)
    }

    /// Interval of the freeze effect loop.
    #[must_use]
    pub const fn freeze_interval(&self) -> Duration {
        Duration::from_millis(self.freeze_interval_ms)
    }

    /// Citadel used when respawning a member of `faction`.
    #[must_use]
    pub fn citadel_for(&self, faction: Faction) -> Option<&CitadelConfig> {
        self.citadels.iter().find(|c| c.faction == faction)
    }
}
