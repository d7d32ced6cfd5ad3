//! Zone capture by touching the orb.

use shared::constants::{PlayerId, ZoneId};
use shared::world::team::TeamId;
use shared::world::zone::{outnumbers_defence, Zone};
use shared::world::World;
use std::collections::BTreeMap;

/// Zone tags to broadcast this tick, as `(zone, tagging player)`.
///
/// A living, mobile player touching an orb tags the zone for its team once
/// the team outnumbers the capped defence and owns a neighbouring zone. An
/// enemy zone that the team outnumbers but cannot reach is only
/// neutralised. At most one tag is produced per zone.
///
/// Each tag counts as applied when the remaining zones are judged, so a
/// zone made reachable by another tag this tick is taken in the same tick.
pub fn find_zone_tags(world: &World) -> Vec<(ZoneId, Option<PlayerId>)> {
    if !world.abilities.zone_caps {
        return Vec::new();
    }

    let mut owners: BTreeMap<ZoneId, Option<TeamId>> = world.zones.values().map(|z| (z.id, z.owner)).collect();
    let mut tags: Vec<(ZoneId, Option<PlayerId>)> = Vec::new();
    loop {
        let found = tags.len();
        for zone in world.zones.values() {
            if tags.iter().any(|(id, _)| *id == zone.id) {
                continue;
            }
            if let Some((tagger, new_owner)) = zone_tag(world, zone, &owners) {
                owners.insert(zone.id, new_owner);
                tags.push((zone.id, tagger));
            }
        }
        if tags.len() == found {
            return tags;
        }
    }
}

/// The tag `zone` would receive given the current `owners`, and the owner
/// it would be left with.
fn zone_tag(
    world: &World,
    zone: &Zone,
    owners: &BTreeMap<ZoneId, Option<TeamId>>,
) -> Option<(Option<PlayerId>, Option<TeamId>)> {
    let owner = owners.get(&zone.id).copied().flatten();
    let counts = world.zone_counts(zone.id);
    for team in [TeamId::A, TeamId::B] {
        if owner == Some(team) {
            continue;
        }
        let tagger = zone
            .players
            .iter()
            .filter_map(|id| world.player(*id))
            .find(|p| !p.dead && p.team == Some(team) && !p.is_turret() && zone.is_touching_orb(&p.pos()));
        let Some(tagger) = tagger else {
            continue;
        };

        let defenders = owner.map(|owner| counts.get(owner)).unwrap_or(0);
        if !outnumbers_defence(counts.get(team), defenders) {
            continue;
        }
        let reachable = zone
            .neighbours
            .iter()
            .any(|id| owners.get(id).copied().flatten() == Some(team));
        if reachable {
            return Some((Some(tagger.id), Some(team)));
        }
        if owner == Some(team.opponent()) {
            return Some((None, None));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::messages::AddPlayerMsg;
    use shared::world::layout::{LayoutDatabase, MapLayout};
    use shared::world::physics::Vector2;
    use shared::world::WorldRole;

    fn world_with(columns: u16, players: &[(PlayerId, TeamId, ZoneId)]) -> World {
        let mut world = World::new(WorldRole::Server, MapLayout::standard(columns, 1), LayoutDatabase::default());
        for (id, team, zone_id) in players {
            world
                .apply(
                    &AddPlayerMsg {
                        player_id: *id,
                        nick: format!("p{}", id),
                        team: Some(*team),
                        zone_id: *zone_id,
                        dead: false,
                        bot: false,
                    }
                    .into(),
                )
                .unwrap();
        }
        world
    }

    #[test]
    fn test_touching_orb_tags_neutral_zone() {
        let world = world_with(3, &[(4, TeamId::A, 2), (2, TeamId::A, 2)]);
        // The lowest id on the orb is credited
        assert_eq!(find_zone_tags(&world), vec![(2, Some(2))]);
    }

    #[test]
    fn test_no_tag_away_from_orb() {
        let mut world = world_with(3, &[(1, TeamId::A, 2)]);
        world.players.get_mut(&1).unwrap().motion.pos = Vector2::new(1100.0, 700.0);
        world.update_zone_inhabitants();
        assert!(find_zone_tags(&world).is_empty());
    }

    #[test]
    fn test_defenders_block_tag() {
        let world = world_with(2, &[(1, TeamId::A, 2), (2, TeamId::B, 2)]);
        assert!(find_zone_tags(&world).is_empty());

        let world = world_with(2, &[(1, TeamId::A, 2), (3, TeamId::A, 2), (2, TeamId::B, 2)]);
        assert_eq!(find_zone_tags(&world), vec![(2, Some(1))]);
    }

    #[test]
    fn test_unreachable_enemy_zone_is_neutralised() {
        // A owns 1 and 2, B owns 3 and 4; zone 4 borders nothing of A's
        let world = world_with(4, &[(1, TeamId::A, 4)]);
        assert_eq!(find_zone_tags(&world), vec![(4, None)]);
    }

    #[test]
    fn test_tag_opens_the_way_to_the_next_zone() {
        // Taking zone 3 makes zone 4 border A in the same tick
        let world = world_with(4, &[(1, TeamId::A, 3), (2, TeamId::A, 4)]);
        assert_eq!(find_zone_tags(&world), vec![(3, Some(1)), (4, Some(2))]);
    }

    #[test]
    fn test_zone_caps_disabled() {
        let mut world = world_with(3, &[(1, TeamId::A, 2)]);
        world.abilities.zone_caps = false;
        assert!(find_zone_tags(&world).is_empty());
    }
}
