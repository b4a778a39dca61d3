//! Target eligibility.
//!
//! One filter shared by single-target casts, area spreads, zone hits, and
//! resolution-time re-checks, so every path agrees on who may be hit.

use rampart_common::EntityId;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;

use crate::entity::{Combatant, CombatantSnapshot};
use crate::region::{Region, RegionKind};

/// Why a combatant cannot be hit by a caster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Ineligibility {
    /// Caster aimed at itself
    #[error("cannot target yourself")]
    SelfTarget,
    /// Target is already defeated
    #[error("target is defeated")]
    Defeated,
    /// Region forbids player-versus-player combat
    #[error("pvp is disabled here")]
    PvpDisabled,
    /// Target stands in a sanctuary
    #[error("target is in a sanctuary")]
    Sanctuary,
    /// Both belong to the same faction
    #[error("target is in your faction")]
    SameFaction,
    /// One side has no arena team
    #[error("target has no arena team")]
    NoArenaTeam,
    /// Both are on the same arena team
    #[error("target is on your team")]
    SameArenaTeam,
    /// Both are in the same group
    #[error("target is in your group")]
    SameGroup,
    /// Non-player combatant is not hostile to the caster
    #[error("target is not hostile")]
    NotHostile,
}

/// Checks whether `caster` may damage the player `target` inside `region`.
pub fn check_player_target(region: &Region, caster: &CombatantSnapshot, target: &CombatantSnapshot) -> Result<(), Ineligibility> {
    if caster.id == target.id {
        return Err(Ineligibility::SelfTarget);
    }
    if !target.alive {
        return Err(Ineligibility::Defeated);
    }
    if !region.is_pvp_enabled() {
        return Err(Ineligibility::PvpDisabled);
    }
    match region.kind() {
        RegionKind::FactionWar => {
            if region.is_sanctuary() {
                return Err(Ineligibility::Sanctuary);
            }
            if caster.faction == target.faction {
                return Err(Ineligibility::SameFaction);
            }
        },
        RegionKind::TeamArena => match (region.team(caster.id), region.team(target.id)) {
            (Some(mine), Some(theirs)) if mine == theirs => return Err(Ineligibility::SameArenaTeam),
            (Some(_), Some(_)) => {},
            _ => return Err(Ineligibility::NoArenaTeam),
        },
        RegionKind::Open | RegionKind::Freeze => {
            if caster.group.is_some() && caster.group == target.group {
                return Err(Ineligibility::SameGroup);
            }
        },
    }
    Ok(())
}

/// Checks whether `caster` may damage the non-player `target`.
pub fn check_monster_target(caster: &CombatantSnapshot, target: &CombatantSnapshot) -> Result<(), Ineligibility> {
    if !target.alive {
        return Err(Ineligibility::Defeated);
    }
    if !target.is_targetable_by(caster.faction) {
        return Err(Ineligibility::NotHostile);
    }
    Ok(())
}

/// Checks any target, dispatching on its kind.
pub fn check_target(region: &Region, caster: &CombatantSnapshot, target: &CombatantSnapshot) -> Result<(), Ineligibility> {
    if target.is_player() {
        check_player_target(region, caster, target)
    } else {
        check_monster_target(caster, target)
    }
}

/// Whether `other` counts as an ally of `caster` for support skills.
pub fn is_ally(region: &Region, caster: &CombatantSnapshot, other: &CombatantSnapshot) -> bool {
    if caster.id == other.id {
        return true;
    }
    if !other.is_player() {
        return false;
    }
    if caster.group.is_some() && caster.group == other.group {
        return true;
    }
    match region.kind() {
        RegionKind::FactionWar => caster.faction.is_aligned() && caster.faction == other.faction,
        RegionKind::TeamArena => region.team(caster.id).is_some() && region.team(caster.id) == region.team(other.id),
        RegionKind::Open | RegionKind::Freeze => false,
    }
}

/// Eligible combatants among `candidates`, skipping `exclude`.
pub fn eligible(
    region: &Region,
    caster: &CombatantSnapshot,
    candidates: Vec<Arc<Combatant>>,
    exclude: Option<EntityId>,
    now: Instant,
) -> Vec<Arc<Combatant>> {
    candidates
        .into_iter()
        .filter(|c| Some(c.id()) != exclude && c.id() != caster.id)
        .filter(|c| check_target(region, caster, &c.snapshot(now)).is_ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faction::Faction;
    use crate::region::ArenaTeam;
    use proptest::prelude::*;
    use rampart_common::{GroupId, RegionId};

    fn snap(combatant: Combatant) -> CombatantSnapshot {
        combatant.snapshot(Instant::now())
    }

    fn player(name: &str) -> Combatant {
        Combatant::player(EntityId::new(), name)
    }

    fn pvp(kind: RegionKind) -> Region {
        Region::new(RegionId::new(1), kind).with_pvp()
    }

    #[test]
    fn test_pvp_disabled() {
        let region = Region::new(RegionId::new(1), RegionKind::Open);
        let result = check_player_target(&region, &snap(player("a")), &snap(player("b")));
        assert_eq!(result, Err(Ineligibility::PvpDisabled));
    }

    #[test]
    fn test_self_target() {
        let region = pvp(RegionKind::Open);
        let me = snap(player("a"));
        assert_eq!(check_player_target(&region, &me, &me), Err(Ineligibility::SelfTarget));
    }

    #[test]
    fn test_faction_war_rules() {
        let region = pvp(RegionKind::FactionWar);
        let angel = snap(player("a").with_faction(Faction::Angel));
        let ally = snap(player("b").with_faction(Faction::Angel));
        let demon = snap(player("c").with_faction(Faction::Demon));

        assert_eq!(check_player_target(&region, &angel, &ally), Err(Ineligibility::SameFaction));
        assert!(check_player_target(&region, &angel, &demon).is_ok());
        assert!(is_ally(&region, &angel, &ally));
        assert!(!is_ally(&region, &angel, &demon));

        let citadel = pvp(RegionKind::FactionWar).as_sanctuary();
        assert_eq!(check_player_target(&citadel, &angel, &demon), Err(Ineligibility::Sanctuary));
    }

    #[test]
    fn test_team_arena_rules() {
        let region = pvp(RegionKind::TeamArena);
        let a = snap(player("a"));
        let b = snap(player("b"));
        let c = snap(player("c"));
        region.set_team(a.id, ArenaTeam::Blue);
        region.set_team(b.id, ArenaTeam::Blue);
        region.set_team(c.id, ArenaTeam::Red);

        assert_eq!(check_player_target(&region, &a, &b), Err(Ineligibility::SameArenaTeam));
        assert!(check_player_target(&region, &a, &c).is_ok());

        let stray = snap(player("d"));
        assert_eq!(check_player_target(&region, &a, &stray), Err(Ineligibility::NoArenaTeam));
    }

    #[test]
    fn test_group_members_protected() {
        let region = pvp(RegionKind::Open);
        let group = GroupId::new(9);
        let a = snap(player("a").with_group(group));
        let b = snap(player("b").with_group(group));
        let c = snap(player("c"));

        assert_eq!(check_player_target(&region, &a, &b), Err(Ineligibility::SameGroup));
        assert!(check_player_target(&region, &a, &c).is_ok());
        assert!(check_player_target(&region, &c, &snap(player("d"))).is_ok());
    }

    #[test]
    fn test_monster_rules() {
        let caster = snap(player("a").with_faction(Faction::Angel));
        let wild = Combatant::non_player(EntityId::new(), 1);
        assert!(check_monster_target(&caster, &snap(wild)).is_ok());

        let guard = Combatant::non_player(EntityId::new(), 2).with_faction(Faction::Angel);
        assert_eq!(check_monster_target(&caster, &snap(guard)), Err(Ineligibility::NotHostile));

        let dead = Combatant::non_player(EntityId::new(), 3);
        dead.write().hp = 0;
        assert_eq!(check_monster_target(&caster, &snap(dead)), Err(Ineligibility::Defeated));
    }

    fn faction() -> impl Strategy<Value = Faction> {
        prop_oneof![Just(Faction::Neutral), Just(Faction::Angel), Just(Faction::Demon)]
    }

    proptest! {
        #[test]
        fn prop_faction_war_spread_skips_own_faction(
            mine in faction(),
            theirs in proptest::collection::vec(faction(), 0..12),
        ) {
            let region = pvp(RegionKind::FactionWar);
            let now = Instant::now();
            let caster = snap(player("caster").with_faction(mine));
            let candidates: Vec<_> = theirs
                .iter()
                .map(|&f| Arc::new(player("other").with_faction(f)))
                .collect();

            let hit = eligible(&region, &caster, candidates, None, now);

            prop_assert_eq!(hit.len(), theirs.iter().filter(|&&f| f != mine).count());
            for target in hit {
                prop_assert_ne!(target.read().faction, mine);
            }
        }
    }
}
