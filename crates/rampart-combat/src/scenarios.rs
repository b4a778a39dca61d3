//! End-to-end combat scenarios on a paused clock.

use rampart_common::{EntityId, MapPosition, RegionId, SkillId};
use std::sync::Arc;
use std::time::Duration;

use crate::broadcast::HitMode;
use crate::config::CombatConfig;
use crate::coordinator::CastRequest;
use crate::death::DeathPhase;
use crate::entity::Combatant;
use crate::error::CastDenial;
use crate::events::{CancelCategory, MessageKey, ServerMessage};
use crate::faction::Faction;
use crate::ports::{AccountRecord, ReflectAware};
use crate::region::{ArenaTeam, Region, RegionKind};
use crate::scheduler::now;
use crate::skill::{BuffId, BuffPolarity, Card, ComboDefinition, Skill};
use crate::testing::Harness;

fn bolt() -> Skill {
    Skill::new(SkillId::new(100), 1, "Bolt")
        .with_mp_cost(30)
        .with_cooldown(500)
        .with_range(5, 0)
        .with_visuals(11, 12)
}

fn jab() -> Arc<Skill> {
    Arc::new(Skill::new(SkillId::new(101), 2, "Jab").with_range(3, 0))
}

fn citadels(h: &Harness) {
    for id in [130, 131] {
        h.world.add_region(
            Region::new(RegionId::new(id), RegionKind::FactionWar)
                .with_pvp()
                .as_sanctuary(),
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_single_target_cast_end_to_end() {
    let h = Harness::new(RegionKind::Open, 40);
    let hero = h.spawn(
        Combatant::player(EntityId::new(), "Ayla")
            .with_vitals(500, 50)
            .with_skill(Arc::new(bolt())),
    );
    let slime = h.monster(100, MapPosition::new(2, 1));
    let start = now();

    let report = h
        .service
        .cast(&CastRequest::on_monster(hero.id(), 1, slime.id()))
        .expect("cast accepted");

    assert_eq!(slime.read().hp, 60);
    assert_eq!(hero.read().mp, 20);
    let cooldowns = h.ctx.scheduler.pending_labelled("cooldown-ready");
    assert_eq!(cooldowns.len(), 1);
    assert_eq!(cooldowns[0].id, report.cooldown);
    assert_eq!(cooldowns[0].due, start + Duration::from_millis(50_000));

    let used = h.skill_used();
    assert_eq!(used.len(), 1);
    assert_eq!(used[0].damage, 40);
    assert_eq!(used[0].hit_mode, HitMode::Normal);
    assert_eq!(used[0].target_hp_percent, 60);

    tokio::time::sleep(Duration::from_millis(50_001)).await;
    assert_eq!(
        h.deliveries_for(hero.id()),
        vec![ServerMessage::CooldownReady { cast_id: 1 }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_third_cast_uses_combo_visuals() {
    let h = Harness::new(RegionKind::Open, 1);
    let chain = Skill::new(SkillId::new(102), 3, "Chain")
        .with_cooldown(10)
        .with_visuals(20, 21)
        .with_combo(ComboDefinition {
            hit: 3,
            animation: 77,
            effect: 88,
        });
    let hero = h.spawn(Combatant::player(EntityId::new(), "Ayla").with_skill(Arc::new(chain)));
    let dummy = h.monster(1_000, MapPosition::new(1, 0));
    let request = CastRequest::on_monster(hero.id(), 3, dummy.id());

    let mut reports = Vec::new();
    for round in 0..3 {
        if round > 0 {
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
        reports.push(h.service.cast(&request).expect("cast"));
    }

    let used = h.skill_used();
    assert_eq!(used.len(), 3);
    assert_eq!((used[0].animation, used[0].effect), (20, 21));
    assert_eq!((used[1].animation, used[1].effect), (20, 21));
    assert_eq!((used[2].animation, used[2].effect), (77, 88));
    assert!(reports[2].combo.chain_complete);
    assert_eq!(hero.read().combos.hits(SkillId::new(102)), 0);
}

#[tokio::test(start_paused = true)]
async fn test_same_origin_faction_kill_gives_no_credit() {
    let h = Harness::new(RegionKind::FactionWar, 500);
    citadels(&h);
    let killer = h.spawn(
        Combatant::player(EntityId::new(), "Ayla")
            .with_faction(Faction::Angel)
            .with_level(20)
            .with_skill(jab()),
    );
    let victim = h.spawn(
        Combatant::player(EntityId::new(), "Bren")
            .with_faction(Faction::Demon)
            .with_level(60)
            .at(MapPosition::new(1, 1)),
    );
    h.origins.insert(killer.id(), "10.0.0.7");
    h.origins.insert(victim.id(), "10.0.0.7");
    h.accounts.insert(
        victim.id(),
        AccountRecord {
            reputation: 90_000,
            ..AccountRecord::default()
        },
    );

    h.service
        .cast(&CastRequest::on_player(killer.id(), 2, victim.id()))
        .expect("cast");
    assert_eq!(victim.read().phase, DeathPhase::DeathSequence);

    assert_eq!(h.accounts.record(killer.id()), AccountRecord::default());
    assert_eq!(h.accounts.record(victim.id()).reputation, 90_000);
    assert_eq!(h.accounts.record(victim.id()).faction_points, 0);
    assert_eq!(h.ctx.faction_war.progress(Faction::Angel).percentage, 100);

    tokio::time::sleep(Duration::from_millis(2_001)).await;
    assert_eq!(victim.read().phase, DeathPhase::RevivePosture);

    tokio::time::sleep(Duration::from_secs(28)).await;
    let state = victim.read();
    assert_eq!(state.phase, DeathPhase::Alive);
    assert_eq!(state.hp, state.max_hp);
    assert_eq!(state.region, RegionId::new(131));
    assert!((37..=41).contains(&state.position.x));
    assert!((40..=44).contains(&state.position.y));
}

#[tokio::test(start_paused = true)]
async fn test_faction_kill_transfers_reputation() {
    let h = Harness::new(RegionKind::FactionWar, 500);
    citadels(&h);
    let killer = h.spawn(
        Combatant::player(EntityId::new(), "Ayla")
            .with_faction(Faction::Angel)
            .with_level(30)
            .with_skill(jab()),
    );
    let victim = h.spawn(
        Combatant::player(EntityId::new(), "Bren")
            .with_faction(Faction::Demon)
            .with_level(50)
            .at(MapPosition::new(1, 0)),
    );
    let onlooker = h.spawn(Combatant::player(EntityId::new(), "Cato").with_faction(Faction::Demon));
    victim.write().apply_card(
        &Card {
            buff: BuffId::REFLECT,
            polarity: BuffPolarity::Good,
            duration_ticks: 0,
        },
        None,
    );
    h.origins.insert(killer.id(), "10.0.0.1");
    h.origins.insert(victim.id(), "10.0.0.2");
    h.accounts.insert(
        victim.id(),
        AccountRecord {
            reputation: 60_000,
            ..AccountRecord::default()
        },
    );

    h.service
        .cast(&CastRequest::on_player(killer.id(), 2, victim.id()))
        .expect("cast");

    let won = h.accounts.record(killer.id());
    assert_eq!(won.faction_kills, 1);
    assert_eq!(won.faction_points, 2);
    assert_eq!(won.reputation, 2_500);
    let lost = h.accounts.record(victim.id());
    assert_eq!(lost.faction_deaths, 1);
    assert_eq!(lost.faction_points, -1);
    assert_eq!(lost.reputation, 57_500);
    assert!(victim.read().buffs.is_empty());

    let deliveries = h.deliveries();
    let to = |id: EntityId, key: MessageKey| {
        deliveries
            .iter()
            .any(|d| d.is_for(id) && matches!(&d.message, ServerMessage::Notice { key: k, .. } if *k == key))
    };
    assert!(to(killer.id(), MessageKey::FactionKill));
    assert!(to(killer.id(), MessageKey::ReputationGained));
    assert!(to(onlooker.id(), MessageKey::FactionDeath));
    assert!(to(victim.id(), MessageKey::FactionDeath));
    assert!(to(victim.id(), MessageKey::FactionDie));
}

#[tokio::test(start_paused = true)]
async fn test_muted_cast_is_cancelled() {
    let h = Harness::new(RegionKind::Open, 40);
    let hero = h.spawn(
        Combatant::player(EntityId::new(), "Ayla")
            .with_vitals(500, 50)
            .with_skill(Arc::new(bolt())),
    );
    hero.write().muted_until = Some(now() + Duration::from_secs(60));
    let slime = h.monster(100, MapPosition::new(1, 1));

    let denial = h
        .service
        .cast(&CastRequest::on_monster(hero.id(), 1, slime.id()))
        .expect_err("muted");

    assert_eq!(denial, CastDenial::Muted(Duration::from_secs(60)));
    assert_eq!(hero.read().mp, 50);
    assert_eq!(slime.read().hp, 100);
    assert!(slime.queue().is_empty());
    assert_eq!(h.ctx.scheduler.pending_count(), 0);

    let deliveries = h.deliveries();
    assert!(deliveries
        .iter()
        .any(|d| d.is_for(hero.id()) && d.message == ServerMessage::cancel(CancelCategory::Caster, 0)));
    assert!(deliveries.iter().any(|d| d.is_for(hero.id())
        && d.message == ServerMessage::notice(MessageKey::MuteTime, vec!["00:01:00".to_owned()])));
    assert!(deliveries.iter().any(|d| d.is_broadcast()
        && d.message == ServerMessage::notice(MessageKey::Muted, vec!["Ayla".to_owned()])));
}

#[tokio::test(start_paused = true)]
async fn test_reflect_splits_damage_through_proxy() {
    let h = Harness::build(
        Region::new(Harness::REGION, RegionKind::Open).with_pvp(),
        CombatConfig::default(),
        Arc::new(ReflectAware(40)),
    );
    let hero = h.spawn(Combatant::player(EntityId::new(), "Ayla").with_skill(jab()));
    hero.write().apply_card(
        &Card {
            buff: BuffId::REFLECT,
            polarity: BuffPolarity::Good,
            duration_ticks: 0,
        },
        None,
    );
    let slime = h.monster(100, MapPosition::new(1, 0));

    h.service
        .cast(&CastRequest::on_monster(hero.id(), 2, slime.id()))
        .expect("cast");

    assert_eq!(slime.read().hp, 60);
    assert_eq!(h.region.ephemeral_count(), 1);
    let first = h.deliveries();
    let proxy = first
        .iter()
        .find_map(|d| match d.message {
            ServerMessage::Summoned { entity, position, .. } => Some((entity, position)),
            _ => None,
        })
        .expect("proxy summoned");
    assert_eq!(proxy.1, MapPosition::new(2, 2));
    let primary: Vec<i32> = first
        .iter()
        .filter_map(|d| match &d.message {
            ServerMessage::SkillUsed(p) => Some(p.damage),
            _ => None,
        })
        .collect();
    assert_eq!(primary, vec![20]);

    tokio::time::sleep(Duration::from_millis(351)).await;
    let later = h.deliveries();
    assert!(later.iter().any(|d| matches!(
        &d.message,
        ServerMessage::SkillUsed(p) if p.caster == proxy.0 && p.damage == 20
    )));
    assert!(later
        .iter()
        .any(|d| d.message == ServerMessage::Despawned { entity: proxy.0 }));
    assert_eq!(h.region.ephemeral_count(), 0);
    assert!(!h.region.contains(proxy.0));
}

#[tokio::test(start_paused = true)]
async fn test_freeze_then_eliminate() {
    let h = Harness::new(RegionKind::Freeze, 500);
    let home = RegionId::new(2);
    h.world.add_region(Region::new(home, RegionKind::Open));
    let hunter = h.spawn(Combatant::player(EntityId::new(), "Ayla").with_skill(jab()));
    let prey = h.spawn(
        Combatant::player(EntityId::new(), "Bren")
            .at(MapPosition::new(1, 0))
            .with_respawn(home, MapPosition::new(5, 5)),
    );
    let cast = CastRequest::on_player(hunter.id(), 2, prey.id());

    h.service.cast(&cast).expect("freeze");
    assert!(h.region.is_frozen(prey.id()));
    {
        let state = prey.read();
        assert!(state.is_alive());
        assert_eq!(state.hp, state.max_hp);
        assert!(state.no_move && state.no_attack);
    }

    h.deliveries();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    let effects = h
        .deliveries()
        .iter()
        .filter(|d| matches!(d.message, ServerMessage::Effect { effect: 35, .. }))
        .count();
    assert_eq!(effects, 2);

    assert!(h.region.thaw(prey.id()));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(h.ctx.scheduler.pending_labelled("freeze-effect").is_empty());
    assert!(!prey.read().no_move);

    h.service.cast(&cast).expect("second knockout");
    h.service.cast(&cast).expect("eliminate");
    let state = prey.read();
    assert_eq!(state.region, home);
    assert_eq!(state.position, MapPosition::new(5, 5));
    assert!(!state.no_attack);
}

#[tokio::test(start_paused = true)]
async fn test_duel_revive_grants_grace() {
    let h = Harness::new(RegionKind::Open, 500);
    let winner = h.spawn(Combatant::player(EntityId::new(), "Ayla").with_skill(jab()));
    let loser = h.player("Bren", MapPosition::new(1, 0));

    h.service
        .cast(&CastRequest::on_player(winner.id(), 2, loser.id()))
        .expect("cast");
    assert_eq!(h.accounts.record(winner.id()).duel_wins, 1);
    assert_eq!(h.accounts.record(loser.id()).duel_losses, 1);
    assert_eq!(h.service.revive(winner.id()), Ok(false));

    h.deliveries();
    tokio::time::sleep(Duration::from_millis(1_001)).await;
    assert!(h
        .deliveries_for(loser.id())
        .contains(&ServerMessage::RevivePrompt { entity: loser.id() }));

    assert_eq!(h.service.revive(loser.id()), Ok(true));
    assert_eq!(h.service.revive(loser.id()), Ok(false));
    let max_hp = loser.read().max_hp;
    assert_eq!(loser.read().hp, max_hp);

    h.service
        .cast(&CastRequest::on_player(winner.id(), 2, loser.id()))
        .expect("cast during grace");
    assert_eq!(loser.read().hp, max_hp);
    let used = h.skill_used();
    assert_eq!(used.last().map(|p| p.hit_mode), Some(HitMode::Blocked));
}

#[tokio::test(start_paused = true)]
async fn test_team_arena_kill_tallies_duel() {
    let h = Harness::new(RegionKind::TeamArena, 500);
    let winner = h.spawn(Combatant::player(EntityId::new(), "Ayla").with_skill(jab()));
    let loser = h.player("Bren", MapPosition::new(1, 0));
    h.region.set_team(winner.id(), ArenaTeam::Blue);
    h.region.set_team(loser.id(), ArenaTeam::Red);

    h.service
        .cast(&CastRequest::on_player(winner.id(), 2, loser.id()))
        .expect("cast");
    assert_eq!(loser.read().phase, DeathPhase::DeathSequence);
    assert_eq!(h.accounts.record(winner.id()).duel_wins, 1);
    assert_eq!(h.accounts.record(loser.id()).duel_losses, 1);

    h.deliveries();
    tokio::time::sleep(Duration::from_millis(999)).await;
    assert!(!h
        .deliveries_for(loser.id())
        .contains(&ServerMessage::RevivePrompt { entity: loser.id() }));

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert!(h
        .deliveries_for(loser.id())
        .contains(&ServerMessage::RevivePrompt { entity: loser.id() }));
    assert_eq!(h.service.revive(loser.id()), Ok(true));
}

#[tokio::test(start_paused = true)]
async fn test_special_set_casts_its_own_skill() {
    let h = Harness::new(RegionKind::Open, 10);
    let claw = Skill::new(SkillId::new(900), 1, "Claw")
        .with_mp_cost(5)
        .with_cooldown(30)
        .with_range(2, 0)
        .with_visuals(90, 91);
    let hero = h.spawn(
        Combatant::player(EntityId::new(), "Ayla")
            .with_vitals(500, 100)
            .with_skill(Arc::new(bolt()))
            .with_special_skill(Arc::new(claw)),
    );
    let slime = h.monster(100, MapPosition::new(1, 0));
    hero.write().skills.use_special = true;

    h.service
        .cast(&CastRequest::on_monster(hero.id(), 1, slime.id()))
        .expect("special cast");
    assert_eq!(hero.read().mp, 95);
    let used = h.skill_used();
    assert_eq!(used.len(), 1);
    assert_eq!(used[0].skill, SkillId::new(900));
    assert_eq!((used[0].animation, used[0].effect), (90, 91));
    let cooldowns = h.ctx.scheduler.pending_labelled("cooldown-ready");
    assert_eq!(cooldowns.len(), 1);
    assert_eq!(cooldowns[0].due, now() + Duration::from_secs(3));

    hero.write().skills.use_special = false;
    h.service
        .cast(&CastRequest::on_monster(hero.id(), 1, slime.id()))
        .expect("primary skill is not on cooldown");
    assert_eq!(hero.read().mp, 65);
    assert_eq!(slime.read().hp, 80);
    assert_eq!(h.skill_used()[0].skill, SkillId::new(100));
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_ready_after_dropped_hit() {
    let h = Harness::new(RegionKind::Open, 500);
    let lance = Skill::new(SkillId::new(102), 3, "Lance")
        .with_cooldown(20)
        .with_range(5, 0)
        .with_cast(8, 55);
    let hero = h.spawn(Combatant::player(EntityId::new(), "Ayla").with_skill(Arc::new(lance)));
    let rival = h.spawn(Combatant::player(EntityId::new(), "Bren").with_skill(jab()));
    let slime = h.monster(100, MapPosition::new(1, 0));

    let report = h
        .service
        .cast(&CastRequest::on_monster(hero.id(), 3, slime.id()))
        .expect("slow cast");
    assert!(report.deferred.is_some());
    h.service
        .cast(&CastRequest::on_monster(rival.id(), 2, slime.id()))
        .expect("quick cast");
    assert!(!slime.read().is_alive());

    h.deliveries();
    tokio::time::sleep(Duration::from_millis(801)).await;
    assert!(h
        .deliveries_for(hero.id())
        .contains(&ServerMessage::cancel(CancelCategory::Target, slime.id().raw())));
    assert_eq!(slime.read().hp, 0);

    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(
        h.deliveries_for(hero.id()),
        vec![ServerMessage::CooldownReady { cast_id: 3 }]
    );
}
