//! Outbound messages and the channel-backed session sink.
//!
//! Everything the combat core tells clients is a [`ServerMessage`] addressed
//! either to one session or to a region. The [`ChannelSink`] collects them on
//! a crossbeam channel for the network layer (or a test) to drain.

use crossbeam_channel::{unbounded, Receiver, Sender};
use rampart_common::{EntityId, MapPosition, RegionId, SkillId};
use serde::Serialize;
use std::time::Duration;

use crate::broadcast::SkillUsePayload;
use crate::entity::CombatantState;
use crate::ports::{BroadcastScope, SessionSink};

/// Which layer refused a cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CancelCategory {
    /// Caster-side state (mute, transformation, mount)
    Caster,
    /// Skill or target validation
    Target,
}

impl CancelCategory {
    /// Wire code of the category.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Caster => 0,
            Self::Target => 2,
        }
    }
}

/// Localisation key of a text notice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum MessageKey {
    /// Casting refused right now
    CantAttackNow,
    /// Casting refused
    CantAttack,
    /// Mana below cost
    NotEnoughMp,
    /// Someone tried to act while muted
    Muted,
    /// Time left on a mute
    MuteTime,
    /// Victim had too little reputation to lose any
    LoseReputation,
    /// Reputation gained from a kill
    ReputationGained,
    /// Own faction scored a kill
    FactionKill,
    /// Own faction suffered a death
    FactionDeath,
    /// You died in the faction war
    FactionDie,
    /// Player frozen
    Frozen,
    /// Player eliminated from a freeze region
    Eliminated,
    /// Free-form key used by scheduled announcements
    Named(String),
}

/// A message for clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A cast was refused
    Cancel {
        /// Refusing layer
        category: CancelCategory,
        /// Target id or cast slot echoed to the client
        target: u64,
    },
    /// A skill slot is usable again
    CooldownReady {
        /// Cast slot
        cast_id: u16,
    },
    /// A caster began casting
    CastStarted {
        /// Caster
        caster: EntityId,
        /// Primary target, the caster for self-centred skills
        target: EntityId,
        /// Cast animation
        animation: u16,
        /// Cast effect
        effect: u16,
        /// Skill
        skill: SkillId,
    },
    /// A skill landed
    SkillUsed(SkillUsePayload),
    /// A ground-targeted skill landed
    GroundEffect {
        /// Caster
        caster: EntityId,
        /// Skill
        skill: SkillId,
        /// Ground cell
        position: MapPosition,
        /// Animation
        animation: u16,
        /// Effect
        effect: u16,
    },
    /// A text notice
    Notice {
        /// Localisation key
        key: MessageKey,
        /// Substitution parameters
        params: Vec<String>,
    },
    /// Current vitals of the recipient
    Stat {
        /// Combatant
        entity: EntityId,
        /// Health
        hp: i32,
        /// Maximum health
        max_hp: i32,
        /// Mana
        mp: i32,
        /// Maximum mana
        max_mp: i32,
    },
    /// A visual effect on a combatant
    Effect {
        /// Combatant
        entity: EntityId,
        /// Effect
        effect: u16,
    },
    /// A combatant lies in the revive posture
    Posture {
        /// Combatant
        entity: EntityId,
        /// Posture effect
        effect: u16,
    },
    /// A combatant came back to life
    Revived {
        /// Combatant
        entity: EntityId,
    },
    /// A combatant was moved
    Teleported {
        /// Combatant
        entity: EntityId,
        /// Destination region
        region: RegionId,
        /// Destination cell
        position: MapPosition,
    },
    /// A combatant should be redrawn from scratch
    Refresh {
        /// Combatant
        entity: EntityId,
    },
    /// Ask the recipient whether to revive
    RevivePrompt {
        /// Recipient
        entity: EntityId,
    },
    /// Movement and attack lockout changed
    Condition {
        /// Combatant
        entity: EntityId,
        /// Movement forbidden
        no_move: bool,
        /// Attacking forbidden
        no_attack: bool,
    },
    /// A combatant appeared
    Summoned {
        /// New combatant
        entity: EntityId,
        /// Template
        template: u16,
        /// Cell
        position: MapPosition,
    },
    /// A combatant was defeated
    Defeated {
        /// Combatant
        entity: EntityId,
    },
    /// A combatant vanished
    Despawned {
        /// Combatant
        entity: EntityId,
    },
}

impl ServerMessage {
    /// Notice with parameters.
    #[must_use]
    pub fn notice(key: MessageKey, params: Vec<String>) -> Self {
        Self::Notice { key, params }
    }

    /// Cancel signal.
    #[must_use]
    pub const fn cancel(category: CancelCategory, target: u64) -> Self {
        Self::Cancel { category, target }
    }

    /// Vitals of `entity` read from its state.
    #[must_use]
    pub const fn stat(entity: EntityId, state: &CombatantState) -> Self {
        Self::Stat {
            entity,
            hp: state.hp,
            max_hp: state.max_hp,
            mp: state.mp,
            max_mp: state.max_mp,
        }
    }
}

/// Addressee of a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "to", rename_all = "snake_case")]
pub enum Recipient {
    /// One session
    Session {
        /// Session's combatant
        entity: EntityId,
    },
    /// Everyone in a region, minus an optional exclusion
    Region {
        /// Region
        region: RegionId,
        /// Excluded combatant
        except: Option<EntityId>,
    },
}

/// A message with its addressee.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    /// Addressee
    pub recipient: Recipient,
    /// Message
    pub message: ServerMessage,
}

impl Delivery {
    /// Whether this delivery reaches `entity`'s session directly.
    #[must_use]
    pub fn is_for(&self, entity: EntityId) -> bool {
        self.recipient == Recipient::Session { entity }
    }

    /// Whether this delivery is a region broadcast.
    #[must_use]
    pub const fn is_broadcast(&self) -> bool {
        matches!(self.recipient, Recipient::Region { .. })
    }
}

/// Session sink collecting deliveries on a channel.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<Delivery>,
    receiver: Receiver<Delivery>,
}

impl Default for ChannelSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Drains all pending deliveries.
    pub fn drain(&self) -> Vec<Delivery> {
        self.receiver.try_iter().collect()
    }

    /// Returns the number of pending deliveries.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Receiving end, for a consumer on another thread.
    #[must_use]
    pub fn receiver(&self) -> Receiver<Delivery> {
        self.receiver.clone()
    }

    fn publish(&self, delivery: Delivery) {
        let _ = self.sender.send(delivery);
    }
}

impl SessionSink for ChannelSink {
    fn send(&self, to: EntityId, message: ServerMessage) {
        self.publish(Delivery {
            recipient: Recipient::Session { entity: to },
            message,
        });
    }

    fn broadcast(&self, region: RegionId, message: ServerMessage, scope: BroadcastScope) {
        let except = match scope {
            BroadcastScope::Everyone => None,
            BroadcastScope::EveryoneExcept(id) => Some(id),
        };
        self.publish(Delivery {
            recipient: Recipient::Region { region, except },
            message,
        });
    }
}

/// Formats a remaining duration as `hh:mm:ss`.
#[must_use]
pub fn format_hms(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
