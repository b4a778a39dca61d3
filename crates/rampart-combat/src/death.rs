//! Death and respawn state machine.
//!
//! ```text
//! Alive --Killed--> DeathSequence --PostureElapsed--> RevivePosture
//!                        |                                 |
//!                        +--------Revived--------+   RespawnElapsed
//!                                                v         v
//!                                             Respawned --Restored--> Alive
//! ```
//!
//! The resolver claims the `Killed` edge under the victim's write lock, so a
//! death is handled exactly once however many hits cross zero together. What
//! happens next depends on the region:
//! - faction war: scoreboard, counters and reputation, then a scheduled
//!   posture and citadel respawn
//! - freeze: the victim toggles between frozen and eliminated
//! - anywhere else: duel counters and a revive prompt

use rampart_common::{EntityId, MapPosition, RegionId};
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::CombatContext;
use crate::entity::{Combatant, CombatantSnapshot, CombatantState};
use crate::error::{CombatError, CombatResult};
use crate::events::{MessageKey, ServerMessage};
use crate::faction::Faction;
use crate::ports::BroadcastScope;
use crate::region::{Region, RegionKind};
use crate::scheduler::{now, EventId};

/// Where a combatant stands in the death sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DeathPhase {
    /// Standing and fighting
    #[default]
    Alive,
    /// Health reached zero; death consequences are running
    DeathSequence,
    /// Lying in the revive posture, waiting for the respawn
    RevivePosture,
    /// Brought back; vitals being restored
    Respawned,
}

/// Inputs driving [`DeathPhase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeathEvent {
    /// Health reached zero
    Killed,
    /// Posture delay elapsed
    PostureElapsed,
    /// Respawn delay elapsed
    RespawnElapsed,
    /// Victim accepted a revival
    Revived,
    /// Vitals restored
    Restored,
}

impl DeathPhase {
    /// Next phase after `event`, or `None` when the event does not apply.
    #[must_use]
    pub const fn on(self, event: DeathEvent) -> Option<Self> {
        match (self, event) {
            (Self::Alive, DeathEvent::Killed) => Some(Self::DeathSequence),
            (Self::DeathSequence, DeathEvent::PostureElapsed) => Some(Self::RevivePosture),
            (Self::RevivePosture, DeathEvent::RespawnElapsed)
            | (Self::DeathSequence | Self::RevivePosture, DeathEvent::Revived) => Some(Self::Respawned),
            (Self::Respawned, DeathEvent::Restored) => Some(Self::Alive),
            _ => None,
        }
    }
}

/// Applies `event` to the state's phase. Returns whether it moved.
pub fn transition(state: &mut CombatantState, event: DeathEvent) -> bool {
    match state.phase.on(event) {
        Some(next) => {
            state.phase = next;
            true
        },
        None => false,
    }
}

/// Runs the consequences of `victim`'s death at the hands of `killer`.
///
/// Called once, right after the resolver claimed the `Killed` transition.
pub fn handle_death(ctx: &Arc<CombatContext>, killer: &CombatantSnapshot, victim: &Arc<Combatant>, region: &Region) {
    if !victim.is_player() {
        ctx.sessions.broadcast(
            region.id(),
            ServerMessage::Defeated { entity: victim.id() },
            BroadcastScope::Everyone,
        );
        return;
    }

    match region.kind() {
        RegionKind::FactionWar => faction_war_death(ctx, killer, victim, region),
        RegionKind::Freeze => freeze_death(ctx, victim, region),
        RegionKind::Open | RegionKind::TeamArena => duel_death(ctx, killer, victim),
    }
}

fn faction_war_death(ctx: &Arc<CombatContext>, killer: &CombatantSnapshot, victim: &Arc<Combatant>, region: &Region) {
    let victim_snap = victim.snapshot(now());

    if killer.is_player() {
        if !ctx.faction_war.award_kill(killer.faction, ctx.config.progress_per_kill) {
            debug!("Faction progress frozen by a special mode");
        }
        if ctx.origins.same_origin(killer.id, victim_snap.id) {
            info!(
                killer = %killer.id,
                entity = %victim_snap.id,
                "Same network origin; no faction credit"
            );
        } else {
            credit_faction_kill(ctx, killer, &victim_snap);
        }
        announce_faction_kill(ctx, killer, &victim_snap);
    }

    victim.write().buffs.clear();
    ctx.sessions.broadcast(
        region.id(),
        ServerMessage::Refresh { entity: victim_snap.id },
        BroadcastScope::EveryoneExcept(victim_snap.id),
    );
    ctx.sessions.send(
        victim_snap.id,
        ServerMessage::notice(MessageKey::FactionDie, vec![killer.name.clone()]),
    );

    schedule_posture(ctx, victim_snap.id);
    schedule_citadel_respawn(ctx, victim_snap.id);
}

fn credit_faction_kill(ctx: &CombatContext, killer: &CombatantSnapshot, victim: &CombatantSnapshot) {
    let cfg = &ctx.config;
    let accounts = &ctx.accounts;

    accounts.record_faction_kill(killer.id);
    accounts.record_faction_death(victim.id);
    accounts.adjust_faction_points(victim.id, -cfg.death_penalty);
    if u16::from(killer.level) + u16::from(cfg.bonus_level_gap) <= u16::from(victim.level) {
        accounts.adjust_faction_points(killer.id, cfg.kill_bonus);
    }

    if accounts.reputation(victim.id) < cfg.reputation_floor {
        ctx.sessions.send(
            victim.id,
            ServerMessage::notice(MessageKey::LoseReputation, vec!["0".to_owned()]),
        );
    } else {
        let amount = i64::from(victim.level) * cfg.reputation_per_level;
        accounts.adjust_reputation(victim.id, -amount);
        accounts.adjust_reputation(killer.id, amount);
        ctx.sessions.send(
            killer.id,
            ServerMessage::notice(MessageKey::ReputationGained, vec![amount.to_string()]),
        );
    }
}

fn announce_faction_kill(ctx: &CombatContext, killer: &CombatantSnapshot, victim: &CombatantSnapshot) {
    for player in ctx.directory.players_in(RegionKind::FactionWar) {
        let faction = player.read().faction;
        let notice = if faction == killer.faction {
            ServerMessage::notice(
                MessageKey::FactionKill,
                vec![victim.faction.to_string(), killer.name.clone()],
            )
        } else if faction == victim.faction {
            ServerMessage::notice(
                MessageKey::FactionDeath,
                vec![victim.faction.to_string(), victim.name.clone()],
            )
        } else {
            continue;
        };
        ctx.sessions.send(player.id(), notice);
    }
}

fn schedule_posture(ctx: &Arc<CombatContext>, victim: EntityId) -> EventId {
    let task_ctx = Arc::clone(ctx);
    ctx.scheduler.schedule("revive-posture", ctx.config.posture_delay(), move || {
        let Some(combatant) = task_ctx.directory.find(victim) else {
            warn!(entity = %victim, "Posture fired for a vanished combatant");
            return;
        };
        if !transition(&mut combatant.write(), DeathEvent::PostureElapsed) {
            return;
        }
        task_ctx.sessions.broadcast(
            combatant.region(),
            ServerMessage::Posture {
                entity: victim,
                effect: task_ctx.config.posture_effect,
            },
            BroadcastScope::Everyone,
        );
    })
}

fn schedule_citadel_respawn(ctx: &Arc<CombatContext>, victim: EntityId) -> EventId {
    let task_ctx = Arc::clone(ctx);
    ctx.scheduler.schedule("respawn", ctx.config.respawn_delay(), move || {
        respawn_at_citadel(&task_ctx, victim);
    })
}

/// Citadel cell for `faction`, jittered, or `None` for the unaligned.
fn citadel_spot(ctx: &CombatContext, faction: Faction) -> Option<(RegionId, MapPosition)> {
    let citadel = ctx.config.citadel_for(faction)?;
    let jitter = ctx.config.citadel_jitter.max(1);
    let spot = citadel
        .position()
        .offset(fastrand::i16((1 - jitter)..jitter), fastrand::i16((1 - jitter)..jitter));
    Some((citadel.region_id(), spot))
}

fn respawn_at_citadel(ctx: &CombatContext, victim: EntityId) {
    let Some(combatant) = ctx.directory.find(victim) else {
        warn!(entity = %victim, "Respawn fired for a vanished combatant");
        return;
    };
    let faction = {
        let mut state = combatant.write();
        if !transition(&mut state, DeathEvent::RespawnElapsed) {
            return;
        }
        state.restore_full();
        state.last_revive = Some(now());
        transition(&mut state, DeathEvent::Restored);
        state.faction
    };

    if let Some((citadel, spot)) = citadel_spot(ctx, faction) {
        if let Err(err) = ctx.directory.relocate(victim, citadel, spot) {
            warn!(entity = %victim, "Citadel respawn failed: {err}");
        }
    }

    let (region, position, stat) = {
        let state = combatant.read();
        (state.region, state.position, ServerMessage::stat(victim, &state))
    };
    ctx.sessions.broadcast(
        region,
        ServerMessage::Teleported {
            entity: victim,
            region,
            position,
        },
        BroadcastScope::Everyone,
    );
    ctx.sessions
        .broadcast(region, ServerMessage::Revived { entity: victim }, BroadcastScope::Everyone);
    ctx.sessions.send(victim, stat);
    info!(entity = %victim, region = %region, "Respawned at citadel");
}

fn freeze_death(ctx: &Arc<CombatContext>, victim: &Arc<Combatant>, region: &Region) {
    let id = victim.id();
    let frozen = region.toggle_frozen(id);
    let (name, stat, respawn) = {
        let mut state = victim.write();
        transition(&mut state, DeathEvent::Revived);
        transition(&mut state, DeathEvent::Restored);
        state.restore_full();
        state.no_move = frozen;
        state.no_attack = frozen;
        (state.name.clone(), ServerMessage::stat(id, &state), state.respawn)
    };

    if frozen {
        ctx.sessions.send(id, stat);
        ctx.sessions.send(
            id,
            ServerMessage::Condition {
                entity: id,
                no_move: true,
                no_attack: true,
            },
        );
        ctx.sessions.broadcast(
            region.id(),
            ServerMessage::notice(MessageKey::Frozen, vec![name]),
            BroadcastScope::Everyone,
        );
        schedule_freeze_effect(ctx, region.id(), id);
        info!(entity = %id, "Frozen");
        return;
    }

    ctx.sessions.broadcast(
        region.id(),
        ServerMessage::notice(MessageKey::Eliminated, vec![name]),
        BroadcastScope::Everyone,
    );
    let (destination, position) = respawn;
    if let Err(err) = ctx.directory.relocate(id, destination, position) {
        warn!(entity = %id, "Could not send eliminated player home: {err}");
    }
    let region = victim.region();
    ctx.sessions.broadcast(
        region,
        ServerMessage::Teleported {
            entity: id,
            region,
            position: victim.read().position,
        },
        BroadcastScope::Everyone,
    );
    ctx.sessions.send(id, stat);
    info!(entity = %id, "Eliminated from freeze region");
}

/// Repeats the frozen visual until the victim is thawed or leaves.
fn schedule_freeze_effect(ctx: &CombatContext, region: RegionId, victim: EntityId) -> EventId {
    let directory = Arc::clone(&ctx.directory);
    let sessions = Arc::clone(&ctx.sessions);
    let effect = ctx.config.freeze_effect;
    sessions.broadcast(region, ServerMessage::Effect { entity: victim, effect }, BroadcastScope::Everyone);

    ctx.scheduler
        .schedule_repeating("freeze-effect", ctx.config.freeze_interval(), move || {
            match directory.region(region) {
                Some(r) if r.contains(victim) && r.is_frozen(victim) => {
                    sessions.broadcast(region, ServerMessage::Effect { entity: victim, effect }, BroadcastScope::Everyone);
                    ControlFlow::Continue(())
                },
                _ => ControlFlow::Break(()),
            }
        })
}

fn duel_death(ctx: &Arc<CombatContext>, killer: &CombatantSnapshot, victim: &Arc<Combatant>) {
    let id = victim.id();
    if killer.is_player() {
        ctx.accounts.record_duel_win(killer.id);
        ctx.accounts.record_duel_loss(id);
    }

    let directory = Arc::clone(&ctx.directory);
    let sessions = Arc::clone(&ctx.sessions);
    ctx.scheduler.schedule("revive-prompt", ctx.config.revive_prompt(), move || {
        let waiting = directory
            .find(id)
            .is_some_and(|c| c.read().phase == DeathPhase::DeathSequence);
        if waiting {
            sessions.send(id, ServerMessage::RevivePrompt { entity: id });
        }
    });
}

/// Revives a defeated player in place.
///
/// Returns `Ok(false)` when the player is not waiting for a revival, or
/// stands in a faction-war region where only the timed respawn applies.
pub fn revive(ctx: &CombatContext, id: EntityId) -> CombatResult<bool> {
    let combatant = ctx.directory.find_player(id).ok_or(CombatError::EntityNotFound(id))?;
    let region = combatant.region();
    if ctx.directory.get_region_type(region) == Some(RegionKind::FactionWar) {
        return Ok(false);
    }

    let stat = {
        let mut state = combatant.write();
        if !transition(&mut state, DeathEvent::Revived) {
            return Ok(false);
        }
        state.restore_full();
        state.last_revive = Some(now());
        transition(&mut state, DeathEvent::Restored);
        ServerMessage::stat(id, &state)
    };

    ctx.sessions
        .broadcast(region, ServerMessage::Revived { entity: id }, BroadcastScope::Everyone);
    ctx.sessions.send(id, stat);
    info!(entity = %id, "Revived");
    Ok(true)
}
