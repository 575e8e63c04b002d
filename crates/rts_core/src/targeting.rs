//! Distances to targets, vision and nearest-enemy searches.

use crate::buildings::{center, clamp_to_footprint, is_destroyed_landmark};
use crate::entities::{EntityRef, PlayerIndex, Unit};
use crate::math::{fixed_ratio, Fixed, Vec2Fixed};
use crate::state::Match;
use crate::stats::{building_sight, unit_radius, unit_sight, MELEE_RANGE};

/// Melee attackers connect within this distance.
const MELEE_REACH: Fixed = fixed_ratio(7, 10);

/// Distance from `from` to a target's edge: footprint for buildings, body
/// radius for units.
#[must_use]
pub fn target_distance(m: &Match, from: Vec2Fixed, target: EntityRef) -> Option<Fixed> {
    match target {
        EntityRef::Building(id) => {
            let b = m.building(id)?;
            Some(clamp_to_footprint(m.content(), b, from).distance(from))
        }
        EntityRef::Unit(id) => {
            let u = m.unit(id)?;
            let radius = unit_radius(m.content(), u.kind);
            Some((u.position.distance(from) - radius).max(Fixed::ZERO))
        }
    }
}

/// Point an attacker at `from` aims at.
#[must_use]
pub fn aim_point(m: &Match, from: Vec2Fixed, target: EntityRef) -> Option<Vec2Fixed> {
    match target {
        EntityRef::Building(id) => m.building(id).map(|b| clamp_to_footprint(m.content(), b, from)),
        EntityRef::Unit(id) => m.unit(id).map(|u| u.position),
    }
}

/// Centre of a unit or building.
#[must_use]
pub fn entity_center(m: &Match, target: EntityRef) -> Option<Vec2Fixed> {
    match target {
        EntityRef::Building(id) => m.building(id).map(|b| center(m.content(), b)),
        EntityRef::Unit(id) => m.unit(id).map(|u| u.position),
    }
}

/// Check a distance against a weapon's reach. Melee weapons reach a little
/// further than their nominal range.
#[must_use]
pub fn within_reach(distance: Fixed, range: Fixed, min_range: Fixed) -> bool {
    let range = if range <= MELEE_RANGE { MELEE_REACH } else { range };
    distance <= range && distance >= min_range.max(Fixed::ZERO)
}

/// Check if `attacker` can hit `target` from where it stands.
#[must_use]
pub fn is_in_range(m: &Match, attacker: &Unit, target: EntityRef, range: Fixed, min_range: Fixed) -> bool {
    target_distance(m, attacker.position, target).is_some_and(|d| within_reach(d, range, min_range))
}

/// Check if a unit has `target` inside its own sight.
#[must_use]
pub fn can_unit_see(m: &Match, unit: &Unit, target: EntityRef) -> bool {
    let sight = unit_sight(m.content(), m.player(unit.owner), unit.kind);
    let point = match target {
        EntityRef::Building(id) => m.building(id).map(|b| clamp_to_footprint(m.content(), b, unit.position)),
        EntityRef::Unit(id) => m.unit(id).map(|u| u.position),
    };
    point.is_some_and(|p| p.distance(unit.position) <= sight)
}

/// Check if `owner`'s team has vision of `target`.
///
/// Any unit or non-corpse building of a non-eliminated teammate provides
/// vision. Buildings observe from their centre.
#[must_use]
pub fn can_player_see(m: &Match, owner: PlayerIndex, target: EntityRef) -> bool {
    if m.flags.fog_reveal {
        return m.resolve(target.id()).is_some();
    }
    if m.player(owner).is_some_and(|p| p.eliminated) {
        return false;
    }
    let team = m.team_of(owner);
    let usable = |source: PlayerIndex| m.team_of(source) == team && !m.player(source).is_some_and(|p| p.eliminated);

    if m.units.iter().any(|u| usable(u.owner) && can_unit_see(m, u, target)) {
        return true;
    }
    let content = m.content();
    m.buildings.iter().any(|b| {
        let Some(source) = b.owner else {
            return false;
        };
        if !usable(source) || is_destroyed_landmark(content, b) {
            return false;
        }
        let sight = building_sight(content, m.player(source), b.kind);
        let observer = center(content, b);
        let point = match target {
            EntityRef::Building(id) => m.building(id).map(|t| clamp_to_footprint(content, t, observer)),
            EntityRef::Unit(id) => m.unit(id).map(|u| u.position),
        };
        point.is_some_and(|p| p.distance(observer) <= sight)
    })
}

/// Check if `owner`'s team has vision of a bare map point.
#[must_use]
pub fn can_player_see_point(m: &Match, owner: PlayerIndex, point: Vec2Fixed) -> bool {
    if m.flags.fog_reveal {
        return true;
    }
    if m.player(owner).is_some_and(|p| p.eliminated) {
        return false;
    }
    let team = m.team_of(owner);
    let usable = |source: PlayerIndex| m.team_of(source) == team && !m.player(source).is_some_and(|p| p.eliminated);
    let content = m.content();
    let by_unit = m.units.iter().any(|u| {
        usable(u.owner) && u.position.distance(point) <= unit_sight(content, m.player(u.owner), u.kind)
    });
    by_unit
        || m.buildings.iter().any(|b| {
            b.owner.is_some_and(usable)
                && !is_destroyed_landmark(content, b)
                && center(content, b).distance(point) <= building_sight(content, b.owner.and_then(|o| m.player(o)), b.kind)
        })
}

/// Nearest enemy unit within `[min_range, max_range]` of `from`.
#[must_use]
pub fn find_nearest_enemy_unit(
    m: &Match,
    owner: Option<PlayerIndex>,
    from: Vec2Fixed,
    max_range: Fixed,
    min_range: Fixed,
) -> Option<EntityRef> {
    let content = m.content();
    m.units
        .iter()
        .filter(|u| u.is_alive() && m.is_enemy(Some(u.owner), owner))
        .map(|u| ((u.position.distance(from) - unit_radius(content, u.kind)).max(Fixed::ZERO), u.id))
        .filter(|(d, _)| *d <= max_range && *d >= min_range)
        .min_by_key(|(d, id)| (*d, *id))
        .map(|(_, id)| EntityRef::Unit(id))
}

/// Nearest attackable enemy building within `[min_range, max_range]` of
/// `from`.
#[must_use]
pub fn find_nearest_enemy_building(
    m: &Match,
    owner: Option<PlayerIndex>,
    from: Vec2Fixed,
    max_range: Fixed,
    min_range: Fixed,
) -> Option<EntityRef> {
    let content = m.content();
    m.buildings
        .iter()
        .filter(|b| b.hp > Fixed::ZERO && b.owner.is_some())
        .filter(|b| {
            let data = content.building(b.kind);
            !data.is_neutral && !data.is_invulnerable
        })
        .filter(|b| m.is_enemy(b.owner, owner))
        .map(|b| (clamp_to_footprint(content, b, from).distance(from), b.id))
        .filter(|(d, _)| *d <= max_range && *d >= min_range)
        .min_by_key(|(d, id)| (*d, *id))
        .map(|(_, id)| EntityRef::Building(id))
}

/// Nearest enemy unit, falling back to the nearest enemy building.
#[must_use]
pub fn find_nearest_enemy(
    m: &Match,
    owner: Option<PlayerIndex>,
    from: Vec2Fixed,
    max_range: Fixed,
    min_range: Fixed,
) -> Option<EntityRef> {
    find_nearest_enemy_unit(m, owner, from, max_range, min_range)
        .or_else(|| find_nearest_enemy_building(m, owner, from, max_range, min_range))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{BuildingType, UnitType};
    use crate::math::fixed_int;
    use crate::test_support::{create_test_match, place_building, place_unit};

    fn pos(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(fixed_int(x), fixed_int(y))
    }

    #[test]
    fn test_target_distance_subtracts_radius() {
        let mut m = create_test_match(2);
        let enemy = place_unit(&mut m, 1, UnitType::Spearman, pos(50, 50));
        let d = target_distance(&m, pos(53, 50), EntityRef::Unit(enemy)).unwrap();
        assert_eq!(d, fixed_int(3) - fixed_ratio(3, 10));
        assert!(target_distance(&m, pos(0, 0), EntityRef::Unit(99_999)).is_none());
    }

    #[test]
    fn test_melee_reach_extends_short_ranges() {
        assert!(within_reach(fixed_ratio(65, 100), fixed_ratio(5, 10), Fixed::ZERO));
        assert!(!within_reach(fixed_ratio(75, 100), fixed_ratio(5, 10), Fixed::ZERO));
        assert!(!within_reach(fixed_int(3), fixed_int(10), fixed_int(4)));
    }

    #[test]
    fn test_nearest_enemy_ignores_allies_and_neutrals() {
        let mut m = create_test_match(2);
        place_unit(&mut m, 0, UnitType::Spearman, pos(51, 50));
        let far = place_unit(&mut m, 1, UnitType::Spearman, pos(55, 50));
        place_building(&mut m, None, BuildingType::TradePost, pos(48, 48));
        let found = find_nearest_enemy(&m, Some(0), pos(50, 50), fixed_int(10), Fixed::ZERO);
        assert_eq!(found, Some(EntityRef::Unit(far)));
        assert_eq!(find_nearest_enemy(&m, Some(0), pos(50, 50), fixed_int(2), Fixed::ZERO), None);
    }

    #[test]
    fn test_vision_comes_from_team_sources() {
        let mut m = create_test_match(2);
        let enemy = place_unit(&mut m, 1, UnitType::Spearman, pos(50, 50));
        assert!(!can_player_see(&m, 0, EntityRef::Unit(enemy)));
        place_unit(&mut m, 0, UnitType::Scout, pos(53, 50));
        assert!(can_player_see(&m, 0, EntityRef::Unit(enemy)));
        m.players[0].eliminated = true;
        assert!(!can_player_see(&m, 0, EntityRef::Unit(enemy)));
    }

    #[test]
    fn test_fog_reveal_shows_everything() {
        let mut m = create_test_match(2);
        let enemy = place_unit(&mut m, 1, UnitType::Spearman, pos(50, 50));
        m.flags.fog_reveal = true;
        assert!(can_player_see(&m, 0, EntityRef::Unit(enemy)));
    }

    #[test]
    fn test_point_vision_from_town_center() {
        let m = create_test_match(2);
        assert!(can_player_see_point(&m, 0, pos(23, 23)));
        assert!(!can_player_see_point(&m, 0, pos(60, 60)));
        assert!(can_player_see_point(&m, 1, pos(78, 78)));
    }
}
