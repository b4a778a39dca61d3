//! Regions and the world directory.
//!
//! A region is one live map instance: its members, its rules (PVP, faction
//! war, team arena, freeze), and its short-lived proxies. The [`World`]
//! indexes regions and tracks which region every combatant is in, and is the
//! default [`RegionDirectory`] the combat core queries.

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use rampart_common::{EntityId, LookupError, MapPosition, RegionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::entity::Combatant;

/// Rules a region plays by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionKind {
    /// Ordinary map
    #[default]
    Open,
    /// Contested by the two factions
    FactionWar,
    /// Team-versus-team arena
    TeamArena,
    /// Deaths freeze instead of killing
    Freeze,
}

/// Side in a team arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArenaTeam {
    /// First team
    Blue,
    /// Second team
    Red,
}

#[derive(Debug, Clone, Copy)]
struct EphemeralSlot {
    entity: EntityId,
    expires_at: Instant,
}

/// Slot handle of a short-lived proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EphemeralHandle {
    slot: usize,
    /// Proxy id
    pub entity: EntityId,
}

/// Slot storage for short-lived proxies with free-list reuse.
#[derive(Debug, Default)]
struct EphemeralArena {
    slots: Vec<Option<EphemeralSlot>>,
    free: Vec<usize>,
}

impl EphemeralArena {
    fn insert(&mut self, entry: EphemeralSlot) -> usize {
        if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(entry);
            slot
        } else {
            self.slots.push(Some(entry));
            self.slots.len() - 1
        }
    }

    fn release(&mut self, handle: EphemeralHandle) -> bool {
        match self.slots.get_mut(handle.slot) {
            Some(slot) if slot.map(|s| s.entity) == Some(handle.entity) => {
                *slot = None;
                self.free.push(handle.slot);
                true
            },
            _ => false,
        }
    }

    fn take_expired(&mut self, now: Instant) -> Vec<EntityId> {
        let mut expired = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(entry) = *slot {
                if entry.expires_at <= now {
                    expired.push(entry.entity);
                    *slot = None;
                    self.free.push(index);
                }
            }
        }
        expired
    }

    fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// One live map instance.
#[derive(Debug)]
pub struct Region {
    id: RegionId,
    kind: RegionKind,
    pvp_enabled: bool,
    sanctuary: bool,
    members: DashMap<EntityId, Arc<Combatant>>,
    teams: DashMap<EntityId, ArenaTeam>,
    frozen: DashSet<EntityId>,
    ephemerals: Mutex<EphemeralArena>,
}

impl Region {
    /// Creates an empty region with PVP disabled.
    #[must_use]
    pub fn new(id: RegionId, kind: RegionKind) -> Self {
        Self {
            id,
            kind,
            pvp_enabled: false,
            sanctuary: false,
            members: DashMap::new(),
            teams: DashMap::new(),
            frozen: DashSet::new(),
            ephemerals: Mutex::new(EphemeralArena::default()),
        }
    }

    /// Enables player-versus-player combat.
    #[must_use]
    pub fn with_pvp(mut self) -> Self {
        self.pvp_enabled = true;
        self
    }

    /// Marks the region as a sanctuary where players cannot be attacked.
    #[must_use]
    pub fn as_sanctuary(mut self) -> Self {
        self.sanctuary = true;
        self
    }

    /// Region id.
    #[must_use]
    pub const fn id(&self) -> RegionId {
        self.id
    }

    /// Region rules.
    #[must_use]
    pub const fn kind(&self) -> RegionKind {
        self.kind
    }

    /// Whether players may attack each other.
    #[must_use]
    pub const fn is_pvp_enabled(&self) -> bool {
        self.pvp_enabled
    }

    /// Whether players here are protected.
    #[must_use]
    pub const fn is_sanctuary(&self) -> bool {
        self.sanctuary
    }

    /// Adds a member.
    pub fn insert(&self, combatant: Arc<Combatant>) {
        self.members.insert(combatant.id(), combatant);
    }

    /// Removes a member.
    pub fn remove(&self, id: EntityId) -> Option<Arc<Combatant>> {
        self.teams.remove(&id);
        self.frozen.remove(&id);
        self.members.remove(&id).map(|(_, c)| c)
    }

    /// Whether `id` is a member.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.members.contains_key(&id)
    }

    /// Looks up a member.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<Arc<Combatant>> {
        self.members.get(&id).map(|c| Arc::clone(c.value()))
    }

    /// Looks up a non-player member.
    #[must_use]
    pub fn monster(&self, id: EntityId) -> Option<Arc<Combatant>> {
        self.get(id).filter(|c| !c.is_player())
    }

    /// All members.
    #[must_use]
    pub fn members(&self) -> Vec<Arc<Combatant>> {
        self.members.iter().map(|c| Arc::clone(c.value())).collect()
    }

    /// All player members.
    #[must_use]
    pub fn players(&self) -> Vec<Arc<Combatant>> {
        self.members
            .iter()
            .filter(|c| c.is_player())
            .map(|c| Arc::clone(c.value()))
            .collect()
    }

    /// Members within `radius` cells of `center`.
    #[must_use]
    pub fn in_range(&self, center: MapPosition, radius: u16) -> Vec<Arc<Combatant>> {
        // Clone out first so no shard lock is held while reading state.
        self.members()
            .into_iter()
            .filter(|c| c.read().position.is_in_range(center, radius))
            .collect()
    }

    /// Assigns an arena team.
    pub fn set_team(&self, id: EntityId, team: ArenaTeam) {
        self.teams.insert(id, team);
    }

    /// Arena team of a member.
    #[must_use]
    pub fn team(&self, id: EntityId) -> Option<ArenaTeam> {
        self.teams.get(&id).map(|t| *t)
    }

    /// Whether a member is frozen.
    #[must_use]
    pub fn is_frozen(&self, id: EntityId) -> bool {
        self.frozen.contains(&id)
    }

    /// Flips a member's frozen flag. Returns whether it is now frozen.
    pub fn toggle_frozen(&self, id: EntityId) -> bool {
        if self.frozen.remove(&id).is_some() {
            false
        } else {
            self.frozen.insert(id);
            true
        }
    }

    /// Rescues a frozen member, lifting the movement and attack lockout.
    /// Returns whether the member was frozen.
    pub fn thaw(&self, id: EntityId) -> bool {
        if self.frozen.remove(&id).is_none() {
            return false;
        }
        if let Some(member) = self.get(id) {
            let mut state = member.write();
            state.no_move = false;
            state.no_attack = false;
        }
        info!("Thawed {id} in region {}", self.id);
        true
    }

    /// Adds a short-lived proxy that expires at `expires_at`.
    pub fn spawn_ephemeral(&self, proxy: Arc<Combatant>, expires_at: Instant) -> EphemeralHandle {
        let entity = proxy.id();
        self.insert(proxy);
        let slot = self.ephemerals.lock().insert(EphemeralSlot { entity, expires_at });
        debug!("Spawned proxy {entity} in region {}", self.id);
        EphemeralHandle { slot, entity }
    }

    /// Removes a proxy ahead of the sweep. Returns whether it was still there.
    pub fn despawn_ephemeral(&self, handle: EphemeralHandle) -> bool {
        let released = self.ephemerals.lock().release(handle);
        if released {
            self.remove(handle.entity);
        }
        released
    }

    /// Removes every proxy whose lifetime has passed.
    pub fn sweep_expired(&self, now: Instant) -> Vec<EntityId> {
        let expired = self.ephemerals.lock().take_expired(now);
        for &entity in &expired {
            self.remove(entity);
        }
        expired
    }

    /// Number of live proxies.
    #[must_use]
    pub fn ephemeral_count(&self) -> usize {
        self.ephemerals.lock().len()
    }
}

/// Region and entity lookups the combat core depends on.
pub trait RegionDirectory: Send + Sync {
    /// Looks up a region.
    fn region(&self, id: RegionId) -> Option<Arc<Region>>;

    /// Looks up any combatant by id.
    fn find(&self, id: EntityId) -> Option<Arc<Combatant>>;

    /// Moves a combatant to another region and cell.
    fn relocate(&self, id: EntityId, destination: RegionId, position: MapPosition) -> Result<(), LookupError>;

    /// Every region of a kind.
    fn regions_of_kind(&self, kind: RegionKind) -> Vec<Arc<Region>>;

    /// Looks up a non-player combatant in a region.
    fn get_monster(&self, region: RegionId, id: EntityId) -> Option<Arc<Combatant>> {
        self.region(region).and_then(|r| r.monster(id))
    }

    /// Looks up a player by id.
    fn find_player(&self, id: EntityId) -> Option<Arc<Combatant>> {
        self.find(id).filter(|c| c.is_player())
    }

    /// Members of a region within `radius` cells of `center`.
    fn get_entities_in_range(&self, region: RegionId, center: MapPosition, radius: u16) -> Vec<Arc<Combatant>> {
        self.region(region)
            .map(|r| r.in_range(center, radius))
            .unwrap_or_default()
    }

    /// Rules of a region.
    fn get_region_type(&self, region: RegionId) -> Option<RegionKind> {
        self.region(region).map(|r| r.kind())
    }

    /// Whether a region allows PVP.
    fn is_pvp_enabled(&self, region: RegionId) -> bool {
        self.region(region).is_some_and(|r| r.is_pvp_enabled())
    }

    /// Players in every region of a kind.
    fn players_in(&self, kind: RegionKind) -> Vec<Arc<Combatant>> {
        self.regions_of_kind(kind)
            .iter()
            .flat_map(|r| r.players())
            .collect()
    }
}

/// In-memory world: every region plus an entity-to-region index.
#[derive(Debug, Default)]
pub struct World {
    regions: DashMap<RegionId, Arc<Region>>,
    locations: DashMap<EntityId, RegionId>,
}

impl World {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a region.
    pub fn add_region(&self, region: Region) -> Arc<Region> {
        let region = Arc::new(region);
        self.regions.insert(region.id(), Arc::clone(&region));
        region
    }

    /// Tears down a region, forgetting where its members were.
    pub fn remove_region(&self, id: RegionId) -> Option<Arc<Region>> {
        let (_, region) = self.regions.remove(&id)?;
        self.locations.retain(|_, r| *r != id);
        info!("Closed region {id}");
        Some(region)
    }

    /// Places a combatant in a region.
    pub fn spawn(&self, region: RegionId, combatant: Combatant) -> Result<Arc<Combatant>, LookupError> {
        let target = self.region(region).ok_or(LookupError::RegionNotFound(region))?;
        combatant.write().region = region;
        let combatant = Arc::new(combatant);
        target.insert(Arc::clone(&combatant));
        self.locations.insert(combatant.id(), region);
        Ok(combatant)
    }

    /// Removes a combatant from the world.
    pub fn despawn(&self, id: EntityId) -> Option<Arc<Combatant>> {
        let (_, region) = self.locations.remove(&id)?;
        self.region(region).and_then(|r| r.remove(id))
    }
}

impl RegionDirectory for World {
    fn region(&self, id: RegionId) -> Option<Arc<Region>> {
        self.regions.get(&id).map(|r| Arc::clone(r.value()))
    }

    fn find(&self, id: EntityId) -> Option<Arc<Combatant>> {
        let region = *self.locations.get(&id)?;
        self.region(region).and_then(|r| r.get(id))
    }

    fn relocate(&self, id: EntityId, destination: RegionId, position: MapPosition) -> Result<(), LookupError> {
        let target = self.region(destination).ok_or(LookupError::RegionNotFound(destination))?;
        let current = self
            .locations
            .get(&id)
            .map(|r| *r)
            .ok_or(LookupError::EntityNotFound(id))?;
        let combatant = self
            .region(current)
            .and_then(|r| r.remove(id))
            .ok_or(LookupError::EntityNotFound(id))?;

        {
            let mut state = combatant.write();
            state.region = destination;
            state.position = position;
        }
        target.insert(combatant);
        self.locations.insert(id, destination);
        debug!("Relocated {id} to region {destination} at ({}, {})", position.x, position.y);
        Ok(())
    }

    fn regions_of_kind(&self, kind: RegionKind) -> Vec<Arc<Region>> {
        self.regions
            .iter()
            .filter(|r| r.kind() == kind)
            .map(|r| Arc::clone(r.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn world_with(kind: RegionKind) -> (World, RegionId) {
        let world = World::new();
        let id = RegionId::new(1);
        world.add_region(Region::new(id, kind).with_pvp());
        (world, id)
    }

    #[test]
    fn test_spawn_and_find() {
        let (world, region) = world_with(RegionKind::Open);
        let hero = world
            .spawn(region, Combatant::player(EntityId::new(), "Ayla"))
            .expect("spawn");

        assert!(world.find(hero.id()).is_some());
        assert!(world.find_player(hero.id()).is_some());
        assert!(world.get_monster(region, hero.id()).is_none());
        assert_eq!(hero.region(), region);
        assert!(world.is_pvp_enabled(region));
        assert_eq!(world.get_region_type(region), Some(RegionKind::Open));
    }

    #[test]
    fn test_spawn_into_missing_region() {
        let world = World::new();
        let missing = RegionId::new(99);
        let err = world
            .spawn(missing, Combatant::player(EntityId::new(), "Ayla"))
            .expect_err("no region");
        assert_eq!(err, LookupError::RegionNotFound(missing));
    }

    #[test]
    fn test_entities_in_range() {
        let (world, region) = world_with(RegionKind::Open);
        let near = world
            .spawn(region, Combatant::non_player(EntityId::new(), 1).at(MapPosition::new(3, 3)))
            .expect("spawn");
        world
            .spawn(region, Combatant::non_player(EntityId::new(), 1).at(MapPosition::new(20, 20)))
            .expect("spawn");

        let found = world.get_entities_in_range(region, MapPosition::new(1, 1), 2);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), near.id());
    }

    #[test]
    fn test_relocate_moves_membership() {
        let (world, region) = world_with(RegionKind::Open);
        let other = RegionId::new(2);
        world.add_region(Region::new(other, RegionKind::Open));
        let hero = world
            .spawn(region, Combatant::player(EntityId::new(), "Ayla"))
            .expect("spawn");

        world
            .relocate(hero.id(), other, MapPosition::new(4, 4))
            .expect("relocate");

        assert!(!world.region(region).expect("region").contains(hero.id()));
        assert!(world.region(other).expect("region").contains(hero.id()));
        assert_eq!(hero.read().position, MapPosition::new(4, 4));
        assert_eq!(hero.region(), other);
    }

    #[test]
    fn test_freeze_toggle_and_thaw() {
        let (world, region_id) = world_with(RegionKind::Freeze);
        let region = world.region(region_id).expect("region");
        let hero = world
            .spawn(region_id, Combatant::player(EntityId::new(), "Ayla"))
            .expect("spawn");
        hero.write().no_move = true;

        assert!(region.toggle_frozen(hero.id()));
        assert!(region.is_frozen(hero.id()));
        assert!(region.thaw(hero.id()));
        assert!(!region.is_frozen(hero.id()));
        assert!(!hero.read().no_move);
        assert!(!region.thaw(hero.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ephemeral_lifecycle() {
        let (world, region_id) = world_with(RegionKind::Open);
        let region = world.region(region_id).expect("region");
        let now = Instant::now();

        let first = region.spawn_ephemeral(
            Arc::new(Combatant::non_player(EntityId::new(), 2371).as_proxy()),
            now + Duration::from_millis(350),
        );
        let second = region.spawn_ephemeral(
            Arc::new(Combatant::non_player(EntityId::new(), 2371).as_proxy()),
            now + Duration::from_secs(5),
        );
        assert_eq!(region.ephemeral_count(), 2);

        assert!(region.despawn_ephemeral(first));
        assert!(!region.despawn_ephemeral(first));
        assert!(!region.contains(first.entity));

        assert!(region.sweep_expired(now + Duration::from_secs(1)).is_empty());
        let swept = region.sweep_expired(now + Duration::from_secs(6));
        assert_eq!(swept, vec![second.entity]);
        assert_eq!(region.ephemeral_count(), 0);
    }
}
