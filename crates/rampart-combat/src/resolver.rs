//! Damage resolver.
//!
//! Drains a target's [`HitQueue`](crate::hit::HitQueue) and applies each
//! request in order:
//! 1. re-check that source and target still exist and the target is eligible
//! 2. roll damage and apply the god-mode and revive-grace overrides
//! 3. mutate health under the target's lock and claim the death transition
//! 4. broadcast the outcome, spawning a proxy for split hits
//! 5. hand a fresh death to the death state machine
//!
//! The source is only ever read through a snapshot taken before the target
//! lock, so no two combatant locks are held together.

use rampart_common::EntityId;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::broadcast::{hit_payloads, HitContext, HitMode, SkillUsePayload};
use crate::context::CombatContext;
use crate::death::{self, DeathEvent};
use crate::entity::{Combatant, CombatantSnapshot};
use crate::events::{CancelCategory, ServerMessage};
use crate::hit::HitRequest;
use crate::ports::{BroadcastScope, DamageRoll};
use crate::region::Region;
use crate::scheduler::now;
use crate::targeting;

/// What one resolved request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitResolution {
    /// Target hit
    pub target: EntityId,
    /// Damage applied to health
    pub damage: i32,
    /// How the hit landed
    pub hit_mode: HitMode,
    /// This hit started the target's death sequence
    pub killed: bool,
    /// Share of the damage shown by a proxy
    pub split: Option<i32>,
}

/// Health after taking `damage`, clamped at zero.
#[must_use]
pub fn apply_damage(hp: i32, damage: i32) -> i32 {
    hp.saturating_sub(damage.max(0)).max(0)
}

/// Whether `at` lies within `window` before `now`.
#[must_use]
pub fn within_grace(at: Option<Instant>, now: Instant, window: Duration) -> bool {
    at.is_some_and(|t| now.saturating_duration_since(t) <= window)
}

/// Applies the god-mode and revive-grace overrides to a roll.
#[must_use]
pub fn apply_overrides(
    roll: DamageRoll,
    source: &CombatantSnapshot,
    target: &CombatantSnapshot,
    now: Instant,
    grace: Duration,
) -> DamageRoll {
    let shielded = target.god_mode
        || within_grace(target.last_revive, now, grace)
        || within_grace(source.last_revive, now, grace);
    if shielded {
        DamageRoll {
            damage: 0,
            hit_mode: HitMode::Blocked,
            reflect: false,
        }
    } else {
        roll
    }
}

/// Queues a request against `target` and drains the queue if no one else is.
pub fn enqueue(ctx: &Arc<CombatContext>, target: &Arc<Combatant>, request: HitRequest) -> usize {
    target.queue().push(request);
    pump(ctx, target)
}

/// Drains `target`'s queue if no one else is. Returns requests processed.
pub fn pump(ctx: &Arc<CombatContext>, target: &Arc<Combatant>) -> usize {
    target.queue().drain_with(|request| {
        resolve(ctx, target, &request);
    })
}

/// Resolves one request against `target`.
///
/// Returns `None` when the request was dropped: a vanished party is a silent
/// no-op, an ineligible target cancels back to the caster.
pub fn resolve(ctx: &Arc<CombatContext>, target: &Arc<Combatant>, request: &HitRequest) -> Option<HitResolution> {
    let now = now();
    let region_id = target.region();
    let Some(region) = ctx.directory.region(region_id).filter(|r| r.contains(target.id())) else {
        warn!(entity = %target.id(), "Target left its region before the hit landed");
        return None;
    };
    sweep_stale_proxies(ctx, &region, now);
    let Some(source) = ctx.directory.find(request.source).or_else(|| region.get(request.source)) else {
        debug!(entity = %request.source, "Hit source vanished");
        return None;
    };

    let source_snap = source.snapshot(now);
    let target_snap = target.snapshot(now);
    if !source_snap.alive {
        debug!(entity = %request.source, "Hit source died before the hit landed");
        return None;
    }
    if let Err(reason) = targeting::check_target(&region, &source_snap, &target_snap) {
        debug!(entity = %target.id(), "Dropping hit: {reason}");
        ctx.sessions.send(
            request.source,
            ServerMessage::cancel(CancelCategory::Target, target.id().raw()),
        );
        return None;
    }

    let rolled = ctx.formula.roll(&source_snap, &target_snap, &request.skill);
    let roll = apply_overrides(rolled, &source_snap, &target_snap, now, ctx.config.revive_grace());
    let damage = roll.damage.max(0);

    let (killed, alive, hp_percent, stat) = {
        let mut state = target.write();
        state.sitting = false;
        state.hp = apply_damage(state.hp, damage);
        let killed = state.hp == 0 && death::transition(&mut state, DeathEvent::Killed);
        let stat = ServerMessage::stat(target.id(), &state);
        (killed, state.is_alive(), state.hp_percent(), stat)
    };

    debug!(
        entity = %target.id(),
        skill = %request.skill.id,
        "{} took {damage} from {}",
        target_snap.name,
        source_snap.name
    );

    if target.is_player() {
        ctx.sessions.send(target.id(), stat);
    }

    let split = (roll.reflect && damage > 0).then_some(damage / 2);
    let shown = damage - split.unwrap_or(0);
    let hit_ctx = HitContext {
        target: target.id(),
        caster_position: source_snap.position,
        target_alive: alive,
        target_hp_percent: hp_percent,
    };
    for payload in hit_payloads(request, &hit_ctx, shown, roll.hit_mode) {
        ctx.sessions
            .broadcast(region_id, ServerMessage::SkillUsed(payload), BroadcastScope::Everyone);
    }

    if let Some(half) = split {
        spawn_split_proxy(ctx, &region, &source_snap, request, &hit_ctx, half, roll.hit_mode, now);
    }

    if killed {
        info!(entity = %target.id(), "{} was defeated by {}", target_snap.name, source_snap.name);
        death::handle_death(ctx, &source_snap, target, &region);
    }

    Some(HitResolution {
        target: target.id(),
        damage,
        hit_mode: roll.hit_mode,
        killed,
        split,
    })
}

/// Removes proxies a full tick past their expiry whose despawn event never ran.
fn sweep_stale_proxies(ctx: &CombatContext, region: &Region, now: Instant) {
    let Some(cutoff) = now.checked_sub(ctx.config.ticks(1)) else {
        return;
    };
    for entity in region.sweep_expired(cutoff) {
        warn!(entity = %entity, "Swept a proxy that outlived its despawn");
        ctx.sessions
            .broadcast(region.id(), ServerMessage::Despawned { entity }, BroadcastScope::Everyone);
    }
}

/// Spawns the proxy that shows the split half of a hit, then despawns it.
#[allow(clippy::too_many_arguments)]
fn spawn_split_proxy(
    ctx: &Arc<CombatContext>,
    region: &Arc<Region>,
    source: &CombatantSnapshot,
    request: &HitRequest,
    hit_ctx: &HitContext,
    half: i32,
    hit_mode: HitMode,
    now: Instant,
) {
    let cfg = &ctx.config;
    let offset = cfg.reflect_offset;
    let position = source.position.offset(offset, offset);
    let proxy = Combatant::non_player(EntityId::new(), cfg.reflect_template)
        .as_proxy()
        .at(position);
    proxy.write().region = region.id();
    let proxy_id = proxy.id();
    let handle = region.spawn_ephemeral(Arc::new(proxy), now + cfg.reflect_lifetime());

    ctx.sessions.broadcast(
        region.id(),
        ServerMessage::Summoned {
            entity: proxy_id,
            template: cfg.reflect_template,
            position,
        },
        BroadcastScope::Everyone,
    );

    let payload = SkillUsePayload {
        caster: proxy_id,
        target: hit_ctx.target,
        skill: request.skill.id,
        cooldown: request.skill.cooldown,
        animation: request.animation(),
        effect: request.effect(),
        position,
        target_alive: hit_ctx.target_alive,
        target_hp_percent: hit_ctx.target_hp_percent,
        damage: half,
        hit_mode,
        skill_type: request.skill.skill_type,
    };
    let directory = Arc::clone(&ctx.directory);
    let sessions = Arc::clone(&ctx.sessions);
    let region_id = region.id();
    ctx.scheduler.schedule("split-proxy", cfg.reflect_lifetime(), move || {
        let Some(region) = directory.region(region_id) else {
            return;
        };
        if region.despawn_ephemeral(handle) {
            sessions.broadcast(region_id, ServerMessage::SkillUsed(payload), BroadcastScope::Everyone);
            sessions.broadcast(region_id, ServerMessage::Despawned { entity: proxy_id }, BroadcastScope::Everyone);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::HitOutcome;
    use crate::death::DeathPhase;
    use crate::faction::Faction;
    use crate::region::RegionKind;
    use crate::skill::Skill;
    use crate::testing::Harness;
    use proptest::prelude::*;
    use rampart_common::{MapPosition, SkillId};

    fn jab() -> Arc<Skill> {
        Arc::new(Skill::new(SkillId::new(1), 1, "Jab").with_visuals(5, 6))
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_damages_monster() {
        let h = Harness::new(RegionKind::Open, 40);
        let hero = h.player("Ayla", MapPosition::new(1, 1));
        let slime = h.monster(100, MapPosition::new(2, 2));

        let request = HitRequest::new(hero.id(), jab(), HitOutcome::Single);
        let resolution = resolve(&h.ctx, &slime, &request).expect("resolved");

        assert_eq!(resolution.damage, 40);
        assert!(!resolution.killed);
        assert_eq!(slime.read().hp, 60);
        let used = h.skill_used();
        assert_eq!(used.len(), 1);
        assert_eq!(used[0].damage, 40);
        assert_eq!(used[0].target_hp_percent, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_death_claimed_once() {
        let h = Harness::new(RegionKind::Open, 150);
        let hero = h.player("Ayla", MapPosition::new(1, 1));
        let slime = h.monster(100, MapPosition::new(2, 2));

        let first = resolve(&h.ctx, &slime, &HitRequest::new(hero.id(), jab(), HitOutcome::Single)).expect("first");
        assert!(first.killed);
        assert_eq!(slime.read().phase, DeathPhase::DeathSequence);

        let second = resolve(&h.ctx, &slime, &HitRequest::new(hero.id(), jab(), HitOutcome::Single));
        assert!(second.is_none());
        assert_eq!(slime.read().hp, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_god_mode_target_blocks() {
        let h = Harness::new(RegionKind::Open, 999);
        let hero = h.player("Ayla", MapPosition::new(1, 1));
        let rival = h.player("Bren", MapPosition::new(2, 1));
        rival.write().god_mode = true;

        let resolution = resolve(&h.ctx, &rival, &HitRequest::new(hero.id(), jab(), HitOutcome::Single)).expect("resolved");
        assert_eq!(resolution.damage, 0);
        assert_eq!(resolution.hit_mode, HitMode::Blocked);
        let state = rival.read();
        assert_eq!(state.hp, state.max_hp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ineligible_target_cancels_to_caster() {
        let h = Harness::new(RegionKind::FactionWar, 10);
        let hero = h.player("Ayla", MapPosition::new(1, 1));
        let ally = h.player("Bren", MapPosition::new(2, 1));
        hero.write().faction = Faction::Angel;
        ally.write().faction = Faction::Angel;

        assert!(resolve(&h.ctx, &ally, &HitRequest::new(hero.id(), jab(), HitOutcome::Single)).is_none());
        let cancels = h.deliveries_for(hero.id());
        assert!(cancels.iter().any(|m| matches!(
            m,
            ServerMessage::Cancel {
                category: CancelCategory::Target,
                ..
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_vanished_target_is_silent() {
        let h = Harness::new(RegionKind::Open, 10);
        let hero = h.player("Ayla", MapPosition::new(1, 1));
        let slime = h.monster(100, MapPosition::new(2, 2));
        h.world.despawn(slime.id());

        assert!(resolve(&h.ctx, &slime, &HitRequest::new(hero.id(), jab(), HitOutcome::Single)).is_none());
        assert!(h.sink.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_applies_in_order() {
        let h = Harness::new(RegionKind::Open, 30);
        let hero = h.player("Ayla", MapPosition::new(1, 1));
        let slime = h.monster(100, MapPosition::new(2, 2));

        for _ in 0..3 {
            enqueue(&h.ctx, &slime, HitRequest::new(hero.id(), jab(), HitOutcome::Single));
        }
        assert_eq!(slime.read().hp, 10);
        let percents: Vec<u8> = h.skill_used().iter().map(|p| p.target_hp_percent).collect();
        assert_eq!(percents, vec![70, 40, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_sweeps_stale_proxy() {
        let h = Harness::new(RegionKind::Open, 10);
        let hero = h.player("Ayla", MapPosition::new(1, 1));
        let slime = h.monster(100, MapPosition::new(2, 2));
        let proxy = Arc::new(Combatant::non_player(EntityId::new(), 2371).as_proxy());
        let handle = h.region.spawn_ephemeral(proxy, Instant::now() + Duration::from_millis(350));

        tokio::time::sleep(Duration::from_millis(400)).await;
        resolve(&h.ctx, &slime, &HitRequest::new(hero.id(), jab(), HitOutcome::Single)).expect("resolved");
        assert_eq!(h.region.ephemeral_count(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        h.deliveries();
        resolve(&h.ctx, &slime, &HitRequest::new(hero.id(), jab(), HitOutcome::Single)).expect("resolved");

        assert_eq!(h.region.ephemeral_count(), 0);
        assert!(!h.region.contains(handle.entity));
        let despawned = h
            .deliveries()
            .into_iter()
            .filter(|d| d.message == ServerMessage::Despawned { entity: handle.entity })
            .count();
        assert_eq!(despawned, 1);
    }

    proptest! {
        #[test]
        fn prop_health_clamps_at_zero(hp in 0i32..10_000, damage in -100i32..20_000) {
            let after = apply_damage(hp, damage);
            prop_assert_eq!(after, (hp - damage.max(0)).max(0));
            prop_assert!(after >= 0);
        }

        #[test]
        fn prop_overrides_zero_damage(damage in 0i32..100_000, god in any::<bool>(), since_ms in 0u64..20_000) {
            let now = Instant::now();
            let source = Combatant::player(EntityId::new(), "a").snapshot(now);
            let mut target = Combatant::player(EntityId::new(), "b").snapshot(now);
            target.god_mode = god;
            target.last_revive = now.checked_sub(Duration::from_millis(since_ms));

            let roll = DamageRoll { damage, hit_mode: HitMode::Critical, reflect: true };
            let out = apply_overrides(roll, &source, &target, now, Duration::from_secs(10));
            let shielded = god || (target.last_revive.is_some() && since_ms <= 10_000);
            if shielded {
                prop_assert_eq!(out.damage, 0);
                prop_assert_eq!(out.hit_mode, HitMode::Blocked);
            } else {
                prop_assert_eq!(out, roll);
            }
        }
    }
}
