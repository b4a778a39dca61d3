//! Shared fixture for tests: a one-region world wired to in-memory ports.

use rampart_common::{EntityId, MapPosition, RegionId};
use std::sync::Arc;

use crate::broadcast::SkillUsePayload;
use crate::config::CombatConfig;
use crate::context::CombatContext;
use crate::coordinator::CombatService;
use crate::entity::Combatant;
use crate::events::{ChannelSink, Delivery, ServerMessage};
use crate::ports::{DamageFormula, FixedFormula, InMemoryAccounts, OriginTable};
use crate::region::{Region, RegionKind, World};
use crate::scheduler::DelayedEventScheduler;

pub struct Harness {
    pub world: Arc<World>,
    pub region: Arc<Region>,
    pub sink: Arc<ChannelSink>,
    pub accounts: Arc<InMemoryAccounts>,
    pub origins: Arc<OriginTable>,
    pub ctx: Arc<CombatContext>,
    pub service: CombatService,
}

impl Harness {
    pub const REGION: RegionId = RegionId::new(1);

    /// PVP-enabled region of `kind`; every hit deals `damage`.
    pub fn new(kind: RegionKind, damage: i32) -> Self {
        Self::with_region(Region::new(Self::REGION, kind).with_pvp(), damage)
    }

    pub fn with_region(region: Region, damage: i32) -> Self {
        Self::build(region, CombatConfig::default(), Arc::new(FixedFormula::damage(damage)))
    }

    pub fn build(region: Region, config: CombatConfig, formula: Arc<dyn DamageFormula>) -> Self {
        let world = Arc::new(World::new());
        let region = world.add_region(region);
        let sink = Arc::new(ChannelSink::new());
        let accounts = Arc::new(InMemoryAccounts::new());
        let origins = Arc::new(OriginTable::new());
        let scheduler = DelayedEventScheduler::current().expect("tests run on a tokio runtime");

        let ctx = CombatContext::new(config, world.clone(), sink.clone(), scheduler)
            .with_accounts(accounts.clone())
            .with_origins(origins.clone())
            .with_formula(formula);
        let service = CombatService::new(ctx);
        let ctx = Arc::clone(service.context());

        Self {
            world,
            region,
            sink,
            accounts,
            origins,
            ctx,
            service,
        }
    }

    pub fn spawn(&self, combatant: Combatant) -> Arc<Combatant> {
        self.world.spawn(self.region.id(), combatant).expect("region exists")
    }

    pub fn player(&self, name: &str, position: MapPosition) -> Arc<Combatant> {
        self.spawn(Combatant::player(EntityId::new(), name).at(position))
    }

    pub fn monster(&self, hp: i32, position: MapPosition) -> Arc<Combatant> {
        self.spawn(
            Combatant::non_player(EntityId::new(), 1)
                .with_vitals(hp, 0)
                .at(position),
        )
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.sink.drain()
    }

    /// Drains the sink, keeping messages sent straight to `entity`.
    pub fn deliveries_for(&self, entity: EntityId) -> Vec<ServerMessage> {
        self.sink
            .drain()
            .into_iter()
            .filter(|d| d.is_for(entity))
            .map(|d| d.message)
            .collect()
    }

    /// Drains the sink, keeping skill-use broadcasts.
    pub fn skill_used(&self) -> Vec<SkillUsePayload> {
        self.sink
            .drain()
            .into_iter()
            .filter_map(|d| match d.message {
                ServerMessage::SkillUsed(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }
}
