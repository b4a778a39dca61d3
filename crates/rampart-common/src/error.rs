//! Error types for Project Rampart.

use thiserror::Error;

use crate::ids::{EntityId, RegionId, SkillId};

/// Top-level error type for Rampart operations.
#[derive(Debug, Error)]
pub enum RampartError {
    /// Directory lookups
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failed lookups against the live world.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// Entity is not present in any region
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Region instance does not exist
    #[error("region not found: {0}")]
    RegionNotFound(RegionId),

    /// Skill is not part of the active skill set
    #[error("skill not found: {0}")]
    SkillNotFound(SkillId),
}

/// Result type alias for Rampart operations.
pub type RampartResult<T> = Result<T, RampartError>;
