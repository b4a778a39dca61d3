//! Scripted skirmish driving the combat core end to end.
//!
//! Two stages run back to back:
//! 1. a duel ground where a player clears monsters and then duels another
//!    player, who accepts a revival
//! 2. a faction-war field where an angel kills a demon, who respawns at the
//!    demon citadel once the respawn delay has passed
//!
//! The run ends when no delayed event is pending, or on Ctrl+C.

use anyhow::{Context, Result};
use rampart_combat::prelude::*;
use rampart_common::{EntityId, MapPosition, RegionId, SkillId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DUEL_GROUND: RegionId = RegionId::new(1);
const WAR_FIELD: RegionId = RegionId::new(10);

/// Upper bound on strikes spent on one opponent.
const MAX_STRIKES: usize = 16;

/// Output poll interval.
const FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// What a skirmish run left behind.
#[derive(Debug, Clone)]
pub struct SkirmishReport {
    /// Casts it took to defeat the duel opponent
    pub duel_strikes: usize,
    /// Whether the duel loser accepted a revival
    pub duel_revived: bool,
    /// Counters of the faction-war killer
    pub war_killer: AccountRecord,
    /// Region the faction-war victim ended up in
    pub war_victim_region: RegionId,
}

struct Spellbook {
    bolt: Arc<Skill>,
    cleave: Arc<Skill>,
    smite: Arc<Skill>,
}

impl Spellbook {
    fn new() -> Self {
        Self {
            bolt: Arc::new(
                Skill::new(SkillId::new(1), 1, "Bolt")
                    .with_mp_cost(20)
                    .with_cooldown(10)
                    .with_range(6, 0)
                    .with_visuals(11, 12)
                    .with_combo(ComboDefinition {
                        hit: 3,
                        animation: 13,
                        effect: 14,
                    }),
            ),
            cleave: Arc::new(
                Skill::new(SkillId::new(2), 2, "Cleave")
                    .with_mp_cost(10)
                    .with_cooldown(10)
                    .with_range(0, 2)
                    .with_targeting(TargetType::SelfArea, HitType::Cleave)
                    .with_visuals(21, 22),
            ),
            smite: Arc::new(
                Skill::new(SkillId::new(3), 3, "Smite")
                    .with_cooldown(10)
                    .with_range(3, 0)
                    .with_visuals(31, 32),
            ),
        }
    }
}

/// Runs the skirmish on the current tokio runtime.
pub async fn run(config: CombatConfig) -> Result<SkirmishReport> {
    let world = Arc::new(World::new());
    world.add_region(Region::new(DUEL_GROUND, RegionKind::Open).with_pvp());
    world.add_region(Region::new(WAR_FIELD, RegionKind::FactionWar).with_pvp());
    for citadel in &config.citadels {
        if world.region(citadel.region_id()).is_none() {
            world.add_region(
                Region::new(citadel.region_id(), RegionKind::FactionWar)
                    .with_pvp()
                    .as_sanctuary(),
            );
        }
    }

    let sink = Arc::new(ChannelSink::new());
    let accounts = Arc::new(InMemoryAccounts::new());
    let origins = Arc::new(OriginTable::new());
    let scheduler = DelayedEventScheduler::current().context("skirmish needs a tokio runtime")?;
    let pause = config.ticks(10) + FLUSH_INTERVAL;
    let ctx = CombatContext::new(config, world.clone(), sink.clone(), scheduler)
        .with_accounts(accounts.clone())
        .with_origins(origins.clone());
    let service = CombatService::new(ctx);

    let printer = tokio::spawn(print_deliveries(Arc::clone(&sink)));
    let book = Spellbook::new();

    // === Duel ground ===
    let ayla = world.spawn(
        DUEL_GROUND,
        Combatant::player(EntityId::new(), "Ayla")
            .with_level(40)
            .with_vitals(400, 200)
            .with_ratings(60, 5)
            .with_skill(Arc::clone(&book.bolt))
            .with_skill(Arc::clone(&book.cleave)),
    )?;
    let slimes = [MapPosition::new(1, 0), MapPosition::new(0, 2), MapPosition::new(4, 4)]
        .into_iter()
        .map(|at| {
            world.spawn(
                DUEL_GROUND,
                Combatant::non_player(EntityId::new(), 7).with_vitals(50, 0).at(at),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    if let Err(denial) = service.cast(&CastRequest::on_self(ayla.id(), 2)) {
        warn!("Cleave refused: {denial}");
    }
    tokio::time::sleep(pause).await;
    if let Some(straggler) = slimes.iter().find(|s| s.read().is_alive()) {
        strike_until_defeated(&service, CastRequest::on_monster(ayla.id(), 1, straggler.id()), straggler, pause).await;
    }

    let bren = world.spawn(
        DUEL_GROUND,
        Combatant::player(EntityId::new(), "Bren")
            .with_level(35)
            .with_vitals(150, 50)
            .at(MapPosition::new(2, 2))
            .with_respawn(DUEL_GROUND, MapPosition::new(8, 8)),
    )?;
    let duel_strikes =
        strike_until_defeated(&service, CastRequest::on_player(ayla.id(), 1, bren.id()), &bren, pause).await;
    tokio::time::sleep(service.context().config.revive_prompt() + FLUSH_INTERVAL).await;
    let duel_revived = service.revive(bren.id())?;

    // === Faction war ===
    let cato = world.spawn(
        WAR_FIELD,
        Combatant::player(EntityId::new(), "Cato")
            .with_level(30)
            .with_ratings(500, 0)
            .with_faction(Faction::Angel)
            .with_skill(Arc::clone(&book.smite)),
    )?;
    let dara = world.spawn(
        WAR_FIELD,
        Combatant::player(EntityId::new(), "Dara")
            .with_level(50)
            .with_faction(Faction::Demon)
            .at(MapPosition::new(1, 1)),
    )?;
    origins.insert(cato.id(), "203.0.113.4");
    origins.insert(dara.id(), "198.51.100.9");
    accounts.insert(
        dara.id(),
        AccountRecord {
            reputation: 80_000,
            ..AccountRecord::default()
        },
    );
    strike_until_defeated(&service, CastRequest::on_player(cato.id(), 3, dara.id()), &dara, pause).await;

    tokio::select! {
        () = wait_until_idle(&service) => {},
        result = tokio::signal::ctrl_c() => {
            result?;
            warn!("Interrupted with {} events pending", service.context().scheduler.pending_count());
        },
    }

    printer.abort();
    flush(&sink);
    let progress = service.context().faction_war.progress(Faction::Angel);
    info!(progress = progress.percentage, "Skirmish finished");

    Ok(SkirmishReport {
        duel_strikes,
        duel_revived,
        war_killer: accounts.record(cato.id()),
        war_victim_region: dara.region(),
    })
}

/// Casts `request` until `target` is down, waiting `pause` between casts.
/// Returns the number of accepted casts.
async fn strike_until_defeated(service: &CombatService, request: CastRequest, target: &Combatant, pause: Duration) -> usize {
    let mut strikes = 0;
    while target.read().is_alive() && strikes < MAX_STRIKES {
        match service.cast(&request) {
            Ok(report) => {
                strikes += 1;
                info!(skill = %report.skill, hit = report.combo.hit, "Strike {strikes}");
            },
            Err(denial) => {
                warn!("Strike refused: {denial}");
                break;
            },
        }
        tokio::time::sleep(pause).await;
    }
    strikes
}

async fn wait_until_idle(service: &CombatService) {
    while service.context().scheduler.pending_count() > 0 {
        tokio::time::sleep(FLUSH_INTERVAL).await;
    }
}

async fn print_deliveries(sink: Arc<ChannelSink>) {
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
    loop {
        ticker.tick().await;
        flush(&sink);
    }
}

/// Prints pending deliveries as JSON lines.
fn flush(sink: &ChannelSink) {
    for delivery in sink.drain() {
        match serde_json::to_string(&delivery) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("Could not encode delivery: {e}"),
        }
    }
}
