//! Skill cast coordinator.
//!
//! Entry point for every cast a session makes. A cast is validated under the
//! caster's read lock, its target set resolved, and its mana and cooldown
//! committed under the write lock; the hits themselves are queued either
//! inline or from a scheduled continuation once the cast time has passed.
//! Continuations capture ids and look everything up again when they fire.
//!
//! Refusals never escape as panics: the caster gets a cancel signal and the
//! call returns the [`CastDenial`].

use rampart_common::{EntityId, MapPosition, SkillId};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::broadcast::{self_cast_payload, support_payload, HitOutcome};
use crate::combo::ComboStep;
use crate::config::CombatConfig;
use crate::context::CombatContext;
use crate::death;
use crate::entity::Combatant;
use crate::error::{CastDenial, CastResult, CombatResult};
use crate::events::{format_hms, CancelCategory, MessageKey, ServerMessage};
use crate::hit::HitRequest;
use crate::ports::BroadcastScope;
use crate::region::{Region, RegionKind};
use crate::resolver;
use crate::scheduler::{now, EventId};
use crate::skill::{BuffId, ComboDefinition, EffectOverride, HitType, Skill, TargetType};
use crate::targeting::{self, Ineligibility};

/// What a cast is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastTarget {
    /// A non-player combatant in the caster's region
    Monster(EntityId),
    /// A player in the caster's region
    Player(EntityId),
    /// The caster itself
    Caster,
}

/// A cast as received from a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastRequest {
    /// Casting combatant
    pub caster: EntityId,
    /// Cast slot
    pub cast_id: u16,
    /// Aim
    pub target: CastTarget,
    /// Caster's cell as reported by the client
    pub caster_position: Option<MapPosition>,
}

impl CastRequest {
    /// Cast at a monster.
    #[must_use]
    pub const fn on_monster(caster: EntityId, cast_id: u16, monster: EntityId) -> Self {
        Self {
            caster,
            cast_id,
            target: CastTarget::Monster(monster),
            caster_position: None,
        }
    }

    /// Cast at a player.
    #[must_use]
    pub const fn on_player(caster: EntityId, cast_id: u16, player: EntityId) -> Self {
        Self {
            caster,
            cast_id,
            target: CastTarget::Player(player),
            caster_position: None,
        }
    }

    /// Cast centred on the caster.
    #[must_use]
    pub const fn on_self(caster: EntityId, cast_id: u16) -> Self {
        Self {
            caster,
            cast_id,
            target: CastTarget::Caster,
            caster_position: None,
        }
    }

    /// Reports the caster's current cell.
    #[must_use]
    pub const fn from_cell(mut self, position: MapPosition) -> Self {
        self.caster_position = Some(position);
        self
    }

    fn aimed_at(&self) -> u64 {
        match self.target {
            CastTarget::Monster(id) | CastTarget::Player(id) => id.raw(),
            CastTarget::Caster => self.caster.raw(),
        }
    }
}

/// What an accepted cast set in motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastReport {
    /// Skill cast
    pub skill: SkillId,
    /// Combo counter after this cast
    pub combo: ComboStep,
    /// Continuation queuing the hits after the cast time, if deferred
    pub deferred: Option<EventId>,
    /// Cooldown-ready notification
    pub cooldown: EventId,
}

/// Mana, combo and cooldown bookkeeping of an accepted cast.
#[derive(Debug, Clone, Copy)]
struct Committed {
    combo: ComboStep,
    visuals: Option<EffectOverride>,
    cooldown: EventId,
}

impl Committed {
    fn effect(&self) -> Option<u16> {
        self.visuals.map(|v| v.effect)
    }

    fn cast_effect(&self, skill: &Skill) -> u16 {
        self.visuals.map_or(skill.cast_effect, |v| v.cast_effect)
    }
}

/// Hits waiting for the cast time of a single-target cast.
#[derive(Debug, Clone)]
struct Landing {
    caster: EntityId,
    target: EntityId,
    skill: Arc<Skill>,
    combo: Option<ComboDefinition>,
    effect: Option<u16>,
}

/// The combat core's public face.
#[derive(Debug, Clone)]
pub struct CombatService {
    ctx: Arc<CombatContext>,
}

impl CombatService {
    /// Creates a service over `ctx`.
    #[must_use]
    pub fn new(ctx: CombatContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    /// Shared context.
    #[must_use]
    pub const fn context(&self) -> &Arc<CombatContext> {
        &self.ctx
    }

    /// Casts a skill at a monster, a player, or around the caster.
    pub fn cast(&self, request: &CastRequest) -> CastResult<CastReport> {
        let result = self.try_cast(request);
        if let Err(denial) = &result {
            self.deny(request.caster, denial, request.aimed_at());
        }
        result
    }

    /// Casts a ground-targeted area skill at `at`.
    pub fn cast_zone(&self, caster: EntityId, cast_id: u16, at: MapPosition) -> CastResult<CastReport> {
        let result = self.try_cast_zone(caster, cast_id, at);
        if let Err(denial) = &result {
            self.deny(caster, denial, u64::from(cast_id));
        }
        result
    }

    /// Fires a batch of already-paid special hits, one per `(cast slot,
    /// monster)` entry. Returns how many entries landed a hit.
    ///
    /// Entries whose skill is cooling down or whose monster is gone, out of
    /// range, or defeated are skipped without affecting the rest.
    pub fn cast_multi_target(&self, caster: EntityId, declared: u8, entries: &[(u16, EntityId)]) -> CastResult<usize> {
        let result = self.try_cast_multi_target(caster, declared, entries);
        if let Err(denial) = &result {
            self.deny(caster, denial, 0);
        }
        result
    }

    /// Revives a defeated player waiting on a revive prompt.
    pub fn revive(&self, id: EntityId) -> CombatResult<bool> {
        death::revive(&self.ctx, id)
    }

    fn try_cast(&self, request: &CastRequest) -> CastResult<CastReport> {
        let ctx = &self.ctx;
        let caster = ctx
            .directory
            .find(request.caster)
            .ok_or(CastDenial::UnknownCaster(request.caster))?;
        if let Some(position) = request.caster_position {
            caster.write().position = position;
        }

        let now = now();
        let skill = validate(&ctx.config, &caster, request.cast_id, now)?;
        let region = ctx.directory.region(caster.region()).ok_or(CastDenial::NoRegion)?;

        match (skill.target_type, skill.hit_type) {
            (TargetType::SelfArea, HitType::Cleave) => self.cast_self_area(&caster, &region, skill, now),
            (TargetType::SelfArea, HitType::Party) => self.cast_party_buff(&caster, &region, skill, now),
            (TargetType::SelfArea, _) => self.cast_self_buff(&caster, &region, skill, now),
            (TargetType::Ally, _) => self.cast_support(&caster, &region, request.target, skill, now),
            (TargetType::Single, _) => self.cast_single(&caster, &region, request.target, skill, now),
        }
    }

    fn cast_single(
        &self,
        caster: &Arc<Combatant>,
        region: &Region,
        aim: CastTarget,
        skill: Arc<Skill>,
        now: Instant,
    ) -> CastResult<CastReport> {
        let ctx = &self.ctx;
        let slack = ctx.config.range_slack;
        let (target, reach) = match aim {
            CastTarget::Monster(id) => {
                let monster = ctx
                    .directory
                    .get_monster(region.id(), id)
                    .ok_or(CastDenial::TargetNotFound(id))?;
                let body = monster.read().npc.basic_area;
                (monster, skill.range.saturating_add(slack).saturating_add(body))
            },
            CastTarget::Player(id) => {
                let player = ctx
                    .directory
                    .find_player(id)
                    .filter(|p| p.region() == region.id())
                    .ok_or(CastDenial::TargetNotFound(id))?;
                (player, skill.range.saturating_add(slack))
            },
            CastTarget::Caster => return Err(Ineligibility::SelfTarget.into()),
        };

        let caster_snap = caster.snapshot(now);
        let target_snap = target.snapshot(now);
        let distance = caster_snap.position.distance_to(target_snap.position);
        if distance > reach {
            return Err(CastDenial::OutOfRange { distance, range: reach });
        }
        targeting::check_target(region, &caster_snap, &target_snap)?;

        let committed = commit(ctx, caster, &skill, now)?;
        ctx.sessions.broadcast(
            region.id(),
            ServerMessage::CastStarted {
                caster: caster.id(),
                target: target.id(),
                animation: skill.cast_animation,
                effect: committed.cast_effect(&skill),
                skill: skill.id,
            },
            BroadcastScope::Everyone,
        );

        let landing = Landing {
            caster: caster.id(),
            target: target.id(),
            skill: Arc::clone(&skill),
            combo: committed.combo.combo,
            effect: committed.effect(),
        };
        let task_ctx = Arc::clone(ctx);
        let deferred = defer(ctx, "land-hit", cast_delay(&ctx.config, &skill), move || {
            land_single(&task_ctx, &landing);
        });

        Ok(CastReport {
            skill: skill.id,
            combo: committed.combo,
            deferred,
            cooldown: committed.cooldown,
        })
    }

    fn cast_self_area(
        &self,
        caster: &Arc<Combatant>,
        region: &Region,
        skill: Arc<Skill>,
        now: Instant,
    ) -> CastResult<CastReport> {
        let ctx = &self.ctx;
        let committed = commit(ctx, caster, &skill, now)?;
        ctx.sessions.broadcast(
            region.id(),
            ServerMessage::CastStarted {
                caster: caster.id(),
                target: caster.id(),
                animation: skill.cast_animation,
                effect: committed.cast_effect(&skill),
                skill: skill.id,
            },
            BroadcastScope::Everyone,
        );

        let task_ctx = Arc::clone(ctx);
        let caster_id = caster.id();
        let effect = committed.effect();
        let area_skill = Arc::clone(&skill);
        let deferred = ctx.scheduler.schedule("self-area", cast_delay(&ctx.config, &skill), move || {
            land_self_area(&task_ctx, caster_id, &area_skill, effect);
        });

        Ok(CastReport {
            skill: skill.id,
            combo: committed.combo,
            deferred: Some(deferred),
            cooldown: committed.cooldown,
        })
    }

    fn cast_self_buff(
        &self,
        caster: &Arc<Combatant>,
        region: &Region,
        skill: Arc<Skill>,
        now: Instant,
    ) -> CastResult<CastReport> {
        let ctx = &self.ctx;
        let committed = commit(ctx, caster, &skill, now)?;
        apply_cards(&ctx.config, caster, &skill, now);
        let position = caster.read().position;
        let effect = committed.effect().unwrap_or(skill.effect);
        ctx.sessions.broadcast(
            region.id(),
            ServerMessage::SkillUsed(self_cast_payload(caster.id(), position, &skill, effect)),
            BroadcastScope::Everyone,
        );
        Ok(CastReport {
            skill: skill.id,
            combo: committed.combo,
            deferred: None,
            cooldown: committed.cooldown,
        })
    }

    fn cast_party_buff(
        &self,
        caster: &Arc<Combatant>,
        region: &Region,
        skill: Arc<Skill>,
        now: Instant,
    ) -> CastResult<CastReport> {
        let ctx = &self.ctx;
        let committed = commit(ctx, caster, &skill, now)?;
        let caster_snap = caster.snapshot(now);
        for member in region.in_range(caster_snap.position, skill.target_range) {
            if !targeting::is_ally(region, &caster_snap, &member.snapshot(now)) {
                continue;
            }
            apply_cards(&ctx.config, &member, &skill, now);
            ctx.sessions.broadcast(
                region.id(),
                ServerMessage::SkillUsed(support_payload(caster.id(), member.id(), caster_snap.position, &skill)),
                BroadcastScope::Everyone,
            );
        }
        Ok(CastReport {
            skill: skill.id,
            combo: committed.combo,
            deferred: None,
            cooldown: committed.cooldown,
        })
    }

    fn cast_support(
        &self,
        caster: &Arc<Combatant>,
        region: &Region,
        aim: CastTarget,
        skill: Arc<Skill>,
        now: Instant,
    ) -> CastResult<CastReport> {
        let ctx = &self.ctx;
        let target = match aim {
            CastTarget::Caster => Arc::clone(caster),
            CastTarget::Player(id) if id == caster.id() => Arc::clone(caster),
            CastTarget::Player(id) => ctx
                .directory
                .find_player(id)
                .filter(|p| p.region() == region.id())
                .ok_or(CastDenial::TargetNotFound(id))?,
            CastTarget::Monster(_) => return Err(CastDenial::WrongTargeting(skill.id)),
        };

        let caster_snap = caster.snapshot(now);
        let target_snap = target.snapshot(now);
        if !target_snap.alive {
            return Err(Ineligibility::Defeated.into());
        }
        let reach = skill.range.saturating_add(ctx.config.range_slack);
        let distance = caster_snap.position.distance_to(target_snap.position);
        if distance > reach {
            return Err(CastDenial::OutOfRange { distance, range: reach });
        }

        let committed = commit(ctx, caster, &skill, now)?;
        apply_cards(&ctx.config, &target, &skill, now);
        ctx.sessions.broadcast(
            region.id(),
            ServerMessage::SkillUsed(support_payload(caster.id(), target.id(), caster_snap.position, &skill)),
            BroadcastScope::Everyone,
        );
        Ok(CastReport {
            skill: skill.id,
            combo: committed.combo,
            deferred: None,
            cooldown: committed.cooldown,
        })
    }

    fn try_cast_zone(&self, caster_id: EntityId, cast_id: u16, at: MapPosition) -> CastResult<CastReport> {
        let ctx = &self.ctx;
        let caster = ctx
            .directory
            .find(caster_id)
            .ok_or(CastDenial::UnknownCaster(caster_id))?;
        let now = now();
        let skill = validate(&ctx.config, &caster, cast_id, now)?;
        if !skill.is_area() {
            return Err(CastDenial::WrongTargeting(skill.id));
        }
        let region = ctx.directory.region(caster.region()).ok_or(CastDenial::NoRegion)?;

        let committed = commit(ctx, &caster, &skill, now)?;
        ctx.sessions.broadcast(
            region.id(),
            ServerMessage::CastStarted {
                caster: caster_id,
                target: caster_id,
                animation: skill.cast_animation,
                effect: committed.cast_effect(&skill),
                skill: skill.id,
            },
            BroadcastScope::Everyone,
        );

        let task_ctx = Arc::clone(ctx);
        let effect = committed.effect();
        let zone_skill = Arc::clone(&skill);
        let deferred = defer(ctx, "zone-hit", cast_delay(&ctx.config, &skill), move || {
            land_zone(&task_ctx, caster_id, &zone_skill, at, effect);
        });

        Ok(CastReport {
            skill: skill.id,
            combo: committed.combo,
            deferred,
            cooldown: committed.cooldown,
        })
    }

    fn try_cast_multi_target(&self, caster_id: EntityId, declared: u8, entries: &[(u16, EntityId)]) -> CastResult<usize> {
        let ctx = &self.ctx;
        let caster = ctx
            .directory
            .find(caster_id)
            .ok_or(CastDenial::UnknownCaster(caster_id))?;
        let now = now();
        {
            let state = caster.read();
            if let Some(remaining) = mute_remaining(state.muted_until, now) {
                return Err(CastDenial::Muted(remaining));
            }
            if recently(state.last_transform, now, ctx.config.transform_lock()) {
                return Err(CastDenial::RecentlyTransformed);
            }
            if state.vehicled {
                return Err(CastDenial::Vehicled);
            }
        }
        if declared == 0 || usize::from(declared) != entries.len() {
            return Err(CastDenial::InvalidBatch);
        }
        let region = ctx.directory.region(caster.region()).ok_or(CastDenial::NoRegion)?;
        let caster_snap = caster.snapshot(now);

        let mut landed = 0;
        for &(cast_id, monster_id) in entries {
            let ready = {
                let state = caster.read();
                state
                    .skills
                    .find_by_cast(cast_id)
                    .filter(|l| l.is_ready(now, ctx.config.ticks(l.skill.cooldown)))
                    .map(|l| Arc::clone(&l.skill))
            };
            let Some(skill) = ready else {
                continue;
            };

            let hit = region.monster(monster_id).filter(|monster| {
                let snap = monster.snapshot(now);
                caster_snap.position.distance_to(snap.position) <= skill.range
                    && targeting::check_monster_target(&caster_snap, &snap).is_ok()
            });
            if let Some(monster) = hit {
                {
                    let mut state = caster.write();
                    state.last_skill_use = Some(now);
                    state.skills.mark_used(skill.id, now);
                }
                resolver::enqueue(ctx, &monster, HitRequest::new(caster_id, Arc::clone(&skill), HitOutcome::SpecialZone));
                landed += 1;
            }
            schedule_cooldown(ctx, caster_id, &skill);
        }
        Ok(landed)
    }

    /// Tells the caster why a cast was refused.
    fn deny(&self, caster: EntityId, denial: &CastDenial, aimed_at: u64) {
        let ctx = &self.ctx;
        debug!(entity = %caster, "Cast refused: {denial}");
        let Some(category) = denial.category() else {
            return;
        };
        ctx.sessions
            .send(caster, ServerMessage::cancel(category, denial.echo(aimed_at)));
        if let Some(key) = denial.reason() {
            ctx.sessions.send(caster, ServerMessage::notice(key, Vec::new()));
        }
        if let CastDenial::Muted(remaining) = denial {
            if let Some(combatant) = ctx.directory.find(caster) {
                let (name, region) = {
                    let state = combatant.read();
                    (state.name.clone(), state.region)
                };
                ctx.sessions.broadcast(
                    region,
                    ServerMessage::notice(MessageKey::Muted, vec![name]),
                    BroadcastScope::Everyone,
                );
            }
            ctx.sessions.send(
                caster,
                ServerMessage::notice(MessageKey::MuteTime, vec![format_hms(*remaining)]),
            );
        }
    }
}

fn recently(at: Option<Instant>, now: Instant, window: Duration) -> bool {
    at.is_some_and(|t| now.saturating_duration_since(t) < window)
}

fn mute_remaining(until: Option<Instant>, now: Instant) -> Option<Duration> {
    until.filter(|u| *u > now).map(|u| u - now)
}

/// Checks everything about the caster a cast depends on and returns the skill.
fn validate(cfg: &CombatConfig, caster: &Combatant, cast_id: u16, now: Instant) -> CastResult<Arc<Skill>> {
    let state = caster.read();
    if recently(state.last_transform, now, cfg.transform_lock()) {
        return Err(CastDenial::RecentlyTransformed);
    }
    if let Some(remaining) = mute_remaining(state.muted_until, now) {
        return Err(CastDenial::Muted(remaining));
    }
    if state.vehicled {
        return Err(CastDenial::Vehicled);
    }
    if state.no_attack || state.has_buff(BuffId::NO_ATTACK, now) {
        return Err(CastDenial::NoAttack);
    }
    if !state.is_alive() {
        return Err(CastDenial::CasterDefeated);
    }

    let learned = state
        .skills
        .find_by_cast(cast_id)
        .ok_or(CastDenial::UnknownSkill(cast_id))?;
    let skill = &learned.skill;
    if !learned.is_ready(now, cfg.ticks(skill.cooldown)) {
        return Err(CastDenial::OnCooldown(skill.id));
    }
    if !state.god_mode && state.mp < skill.mp_cost {
        return Err(CastDenial::NotEnoughMana {
            required: skill.mp_cost,
            current: state.mp,
        });
    }
    if skill.weapon.is_some_and(|slot| !state.weapons.contains(&slot)) {
        return Err(CastDenial::WeaponNotLoaded);
    }
    Ok(Arc::clone(skill))
}

/// Deducts mana, stamps the cooldown, advances the combo counter, and
/// schedules the cooldown-ready notification.
fn commit(ctx: &CombatContext, caster: &Combatant, skill: &Skill, now: Instant) -> CastResult<Committed> {
    let (combo, visuals, stat) = {
        let mut state = caster.write();
        if !state.god_mode {
            if state.mp < skill.mp_cost {
                return Err(CastDenial::NotEnoughMana {
                    required: skill.mp_cost,
                    current: state.mp,
                });
            }
            state.mp -= skill.mp_cost;
        }
        state.sitting = false;
        state.last_skill_use = Some(now);
        state.skills.mark_used(skill.id, now);
        let combo = state.combos.advance(skill, now, ctx.config.combo_reset());
        let visuals = state.skills.effect_override(skill.id);
        (combo, visuals, ServerMessage::stat(caster.id(), &state))
    };
    ctx.sessions.send(caster.id(), stat);
    let cooldown = schedule_cooldown(ctx, caster.id(), skill);
    debug!(entity = %caster.id(), skill = %skill.id, hit = combo.hit, "Cast committed");
    Ok(Committed {
        combo,
        visuals,
        cooldown,
    })
}

fn schedule_cooldown(ctx: &CombatContext, caster: EntityId, skill: &Skill) -> EventId {
    let directory = Arc::clone(&ctx.directory);
    let sessions = Arc::clone(&ctx.sessions);
    let cast_id = skill.cast_id;
    ctx.scheduler
        .schedule("cooldown-ready", ctx.config.ticks(skill.cooldown), move || {
            if directory.find(caster).is_some() {
                sessions.send(caster, ServerMessage::CooldownReady { cast_id });
            } else {
                debug!(entity = %caster, "Cooldown elapsed after the caster left");
            }
        })
}

/// Time between starting a cast and its hits landing.
fn cast_delay(cfg: &CombatConfig, skill: &Skill) -> Duration {
    if skill.cast_effect == 0 {
        Duration::ZERO
    } else {
        cfg.ticks(skill.cast_time)
    }
}

/// Runs `action` now when `delay` is zero, otherwise schedules it.
fn defer<F>(ctx: &CombatContext, label: &'static str, delay: Duration, action: F) -> Option<EventId>
where
    F: FnOnce() + Send + 'static,
{
    if delay.is_zero() {
        action();
        None
    } else {
        Some(ctx.scheduler.schedule(label, delay, action))
    }
}

fn apply_cards(cfg: &CombatConfig, target: &Combatant, skill: &Skill, now: Instant) {
    let mut state = target.write();
    for card in &skill.cards {
        let expires_at = (card.duration_ticks > 0).then(|| now + cfg.ticks(card.duration_ticks));
        state.apply_card(card, expires_at);
    }
}

fn land_single(ctx: &Arc<CombatContext>, landing: &Landing) {
    let now = now();
    let Some(caster) = ctx.directory.find(landing.caster) else {
        warn!(entity = %landing.caster, "Caster left before the hit landed");
        return;
    };
    let Some(region) = ctx.directory.region(caster.region()) else {
        return;
    };
    let cancel = ServerMessage::cancel(CancelCategory::Target, landing.target.raw());
    let Some(target) = region.get(landing.target) else {
        ctx.sessions.send(landing.caster, cancel);
        return;
    };

    let caster_snap = caster.snapshot(now);
    let target_snap = target.snapshot(now);
    if let Err(reason) = targeting::check_target(&region, &caster_snap, &target_snap) {
        debug!(entity = %landing.target, "Target no longer eligible: {reason}");
        ctx.sessions.send(landing.caster, cancel);
        return;
    }

    let skill = &landing.skill;
    let request = |kind| {
        HitRequest::new(landing.caster, Arc::clone(skill), kind)
            .with_combo(landing.combo)
            .with_effect(landing.effect)
    };

    if !skill.is_area() {
        let kind = if landing.combo.is_some() { HitOutcome::Combo } else { HitOutcome::Single };
        resolver::enqueue(ctx, &target, request(kind));
        return;
    }

    let centre = if target_snap.is_player() {
        caster_snap.position
    } else {
        target_snap.position
    };
    let primary = match landing.combo {
        Some(_) => request(HitOutcome::Combo),
        None => request(HitOutcome::AreaSingle).showing_target_animation(),
    };
    resolver::enqueue(ctx, &target, primary);

    let spread_kind = if landing.combo.is_some() { HitOutcome::Combo } else { HitOutcome::AreaSingle };
    let mut nearby = region.in_range(centre, skill.target_range);
    if target_snap.is_player() {
        nearby.retain(|c| c.is_player());
    }
    let others = targeting::eligible(&region, &caster_snap, nearby, Some(target.id()), now);
    for other in others {
        resolver::enqueue(ctx, &other, request(spread_kind));
    }
}

fn land_self_area(ctx: &Arc<CombatContext>, caster_id: EntityId, skill: &Arc<Skill>, effect: Option<u16>) {
    let now = now();
    let Some(caster) = ctx.directory.find(caster_id) else {
        warn!(entity = %caster_id, "Caster left before the area landed");
        return;
    };
    let Some(region) = ctx.directory.region(caster.region()) else {
        return;
    };
    let caster_snap = caster.snapshot(now);
    ctx.sessions.broadcast(
        region.id(),
        ServerMessage::SkillUsed(self_cast_payload(
            caster_id,
            caster_snap.position,
            skill,
            effect.unwrap_or(skill.effect),
        )),
        BroadcastScope::Everyone,
    );

    let kind = if region.kind() == RegionKind::FactionWar {
        HitOutcome::AreaSingle
    } else {
        HitOutcome::Area
    };
    let targets = targeting::eligible(
        &region,
        &caster_snap,
        region.in_range(caster_snap.position, skill.target_range),
        None,
        now,
    );
    for target in targets {
        resolver::enqueue(ctx, &target, HitRequest::new(caster_id, Arc::clone(skill), kind).with_effect(effect));
    }
}

fn land_zone(ctx: &Arc<CombatContext>, caster_id: EntityId, skill: &Arc<Skill>, at: MapPosition, effect: Option<u16>) {
    let now = now();
    let Some(caster) = ctx.directory.find(caster_id) else {
        warn!(entity = %caster_id, "Caster left before the zone landed");
        return;
    };
    let Some(region) = ctx.directory.region(caster.region()) else {
        return;
    };
    ctx.sessions.broadcast(
        region.id(),
        ServerMessage::GroundEffect {
            caster: caster_id,
            skill: skill.id,
            position: at,
            animation: skill.attack_animation,
            effect: effect.unwrap_or(skill.effect),
        },
        BroadcastScope::Everyone,
    );

    let caster_snap = caster.snapshot(now);
    let targets = targeting::eligible(&region, &caster_snap, region.in_range(at, skill.target_range), None, now);
    for target in targets {
        resolver::enqueue(
            ctx,
            &target,
            HitRequest::new(caster_id, Arc::clone(skill), HitOutcome::Zone)
                .at(at)
                .with_effect(effect),
        );
    }
}
