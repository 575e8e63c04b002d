//! Building geometry, placement and lookup.
//!
//! Buildings occupy an integer-aligned square footprint anchored at their
//! top-left corner. Buildings larger than 2x2 collide only with an inner
//! square one tile in from the footprint edge, so units can stand against
//! the walls.
//!
//! All calculations use fixed-point math for deterministic simulation.

use crate::data::{bonus_index, ContentTables};
use crate::entities::{Building, EntityId, PlayerIndex, ResourceNode, Unit};
use crate::kinds::{BuildingType, ResourceKind, UnitType};
use crate::math::{fixed_int, Fixed, Vec2Fixed};
use crate::state::Match;

// ============================================================================
// Footprint geometry
// ============================================================================

/// Axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    /// Left edge.
    pub min_x: Fixed,
    /// Top edge.
    pub min_y: Fixed,
    /// Right edge.
    pub max_x: Fixed,
    /// Bottom edge.
    pub max_y: Fixed,
}

impl Bounds {
    /// Check if a point is inside (edges included).
    #[must_use]
    pub fn contains(&self, point: Vec2Fixed) -> bool {
        point.x >= self.min_x && point.x <= self.max_x && point.y >= self.min_y && point.y <= self.max_y
    }

    /// Closest point of the box to `point`.
    #[must_use]
    pub fn clamp(&self, point: Vec2Fixed) -> Vec2Fixed {
        Vec2Fixed::new(
            point.x.clamp(self.min_x, self.max_x),
            point.y.clamp(self.min_y, self.max_y),
        )
    }
}

/// Footprint side length.
#[must_use]
pub fn footprint_size(content: &ContentTables, kind: BuildingType) -> Fixed {
    content.building(kind).footprint()
}

/// Full footprint of a building.
#[must_use]
pub fn footprint(content: &ContentTables, building: &Building) -> Bounds {
    let size = footprint_size(content, building.kind);
    Bounds {
        min_x: building.position.x,
        min_y: building.position.y,
        max_x: building.position.x + size,
        max_y: building.position.y + size,
    }
}

/// Footprint centre.
#[must_use]
pub fn center(content: &ContentTables, building: &Building) -> Vec2Fixed {
    let half = footprint_size(content, building.kind) / 2;
    Vec2Fixed::new(building.position.x + half, building.position.y + half)
}

/// Solid part of a building for movement. `None` for 2x2 and smaller.
#[must_use]
pub fn collision_bounds(content: &ContentTables, building: &Building) -> Option<Bounds> {
    let size = content.building(building.kind).size;
    if size <= 2 {
        return None;
    }
    let size = fixed_int(size);
    Some(Bounds {
        min_x: building.position.x + Fixed::ONE,
        min_y: building.position.y + Fixed::ONE,
        max_x: building.position.x + size - Fixed::ONE,
        max_y: building.position.y + size - Fixed::ONE,
    })
}

/// Closest footprint point to `point`.
#[must_use]
pub fn clamp_to_footprint(content: &ContentTables, building: &Building, point: Vec2Fixed) -> Vec2Fixed {
    footprint(content, building).clamp(point)
}

/// Distance from `point` to the footprint (zero inside).
#[must_use]
pub fn distance_to_footprint(content: &ContentTables, building: &Building, point: Vec2Fixed) -> Fixed {
    clamp_to_footprint(content, building, point).distance(point)
}

// ============================================================================
// State predicates
// ============================================================================

/// Landmark reduced to zero health and kept as a corpse.
#[must_use]
pub fn is_destroyed_landmark(content: &ContentTables, building: &Building) -> bool {
    content.building(building.kind).is_landmark() && building.landmark_destroyed
}

/// Check if a building works: finished and not a landmark corpse.
#[must_use]
pub fn is_functional(content: &ContentTables, building: &Building) -> bool {
    !building.under_construction && !is_destroyed_landmark(content, building)
}

/// Landmark corpses cannot be attacked.
#[must_use]
pub fn is_untargetable(content: &ContentTables, building: &Building) -> bool {
    is_destroyed_landmark(content, building) && building.hp <= Fixed::ZERO
}

/// Resource spent on repairs: stone for defensive buildings that cost stone.
#[must_use]
pub fn repair_resource(content: &ContentTables, kind: BuildingType) -> ResourceKind {
    if content.is_defensive(kind) && content.building(kind).cost.stone > Fixed::ZERO {
        ResourceKind::Stone
    } else {
        ResourceKind::Wood
    }
}

/// Units a building can hold.
#[must_use]
pub fn garrison_capacity(content: &ContentTables, building: &Building) -> usize {
    if is_destroyed_landmark(content, building) {
        return 0;
    }
    match building.kind {
        BuildingType::TownCenter | BuildingType::Castle => 15,
        BuildingType::Outpost => 5,
        BuildingType::StoneTower | BuildingType::OldMarketPavilion => 8,
        BuildingType::DominionSpire => {
            let tier = building.landmark_age_tier.unwrap_or(1).clamp(1, 4);
            content
                .landmark_bonuses
                .spire
                .garrison_by_age
                .get(bonus_index(tier))
                .map_or(8, |c| *c as usize)
        }
        _ => 0,
    }
}

/// Relics a building can hold.
#[must_use]
pub fn relic_capacity(content: &ContentTables, kind: BuildingType) -> usize {
    match content.building(kind).relic_capacity {
        Some(capacity) => capacity as usize,
        None if kind == BuildingType::Monastery => 3,
        None => 0,
    }
}

/// Relic carriers and trebuchets stay outside.
#[must_use]
pub fn can_garrison(unit: &Unit) -> bool {
    unit.relic.is_none() && unit.kind != UnitType::CounterweightTrebuchet
}

// ============================================================================
// Queries
// ============================================================================

/// First building whose footprint contains `point`.
#[must_use]
pub fn building_at(m: &Match, point: Vec2Fixed) -> Option<EntityId> {
    let content = m.content();
    m.buildings
        .iter()
        .find(|b| footprint(content, b).contains(point))
        .map(|b| b.id)
}

/// First resource node whose footprint contains `point`.
#[must_use]
pub fn resource_at(m: &Match, point: Vec2Fixed) -> Option<EntityId> {
    m.resources.iter().find(|r| r.contains(point)).map(|r| r.id)
}

/// Nearest functional own building accepting `kind`, by centre distance.
#[must_use]
pub fn find_dropoff(m: &Match, owner: PlayerIndex, kind: ResourceKind, from: Vec2Fixed) -> Option<EntityId> {
    let content = m.content();
    m.buildings
        .iter()
        .filter(|b| b.is_owned_by(owner) && is_functional(content, b))
        .filter(|b| content.building(b.kind).accepts(kind))
        .map(|b| (center(content, b).distance_squared(from), b.id))
        .min_by_key(|(d, id)| (*d, *id))
        .map(|(_, id)| id)
}

/// Nearest building of `owner` under construction within `max_distance` of
/// the footprint.
#[must_use]
pub fn find_nearest_unfinished(
    m: &Match,
    owner: PlayerIndex,
    from: Vec2Fixed,
    max_distance: Fixed,
) -> Option<EntityId> {
    let content = m.content();
    m.buildings
        .iter()
        .filter(|b| b.under_construction && b.is_owned_by(owner))
        .map(|b| (distance_to_footprint(content, b, from), b.id))
        .filter(|(d, _)| *d <= max_distance)
        .min_by_key(|(d, id)| (*d, *id))
        .map(|(_, id)| id)
}

fn overlaps(ax: Fixed, ay: Fixed, asize: Fixed, bx: Fixed, by: Fixed, bsize: Fixed) -> bool {
    ax < bx + bsize && ax + asize > bx && ay < by + bsize && ay + asize > by
}

/// Check if a square of side `size` at `position` lies on the map and
/// overlaps no building or resource footprint.
#[must_use]
pub fn is_area_free(m: &Match, position: Vec2Fixed, size: Fixed) -> bool {
    let content = m.content();
    if position.x < Fixed::ZERO || position.y < Fixed::ZERO {
        return false;
    }
    if position.x + size > m.width() || position.y + size > m.height() {
        return false;
    }
    let hits_building = m.buildings.iter().any(|b| {
        let bsize = footprint_size(content, b.kind);
        overlaps(position.x, position.y, size, b.position.x, b.position.y, bsize)
    });
    let hits_resource = m.resources.iter().any(|r: &ResourceNode| {
        overlaps(position.x, position.y, size, r.position.x, r.position.y, fixed_int(r.size))
    });
    !hits_building && !hits_resource
}

/// Check if a building of `kind` may be placed with its corner at `position`.
#[must_use]
pub fn is_placement_valid(m: &Match, kind: BuildingType, position: Vec2Fixed) -> bool {
    is_area_free(m, position, footprint_size(m.content(), kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_test_match, place_building, place_resource};
    use crate::kinds::ResourceNodeType;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn vec2(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(fixed(x), fixed(y))
    }

    #[test]
    fn test_collision_bounds_are_hollow_for_large_buildings() {
        let mut m = create_test_match(2);
        let house = place_building(&mut m, Some(0), BuildingType::House, vec2(40, 40));
        let content = m.content_arc();
        assert!(collision_bounds(&content, m.building(house).unwrap()).is_none());
        let tc = m.players[0].starting_town_center.unwrap();
        let building = m.building(tc).unwrap();
        let bounds = collision_bounds(&content, building).unwrap();
        assert_eq!(bounds.min_x, building.position.x + Fixed::ONE);
        assert_eq!(bounds.max_x, building.position.x + fixed(3));
    }

    #[test]
    fn test_distance_to_footprint() {
        let mut m = create_test_match(2);
        let house = place_building(&mut m, Some(0), BuildingType::House, vec2(40, 40));
        let content = m.content_arc();
        let building = m.building(house).unwrap();
        assert_eq!(distance_to_footprint(&content, building, vec2(41, 41)), Fixed::ZERO);
        assert_eq!(distance_to_footprint(&content, building, vec2(45, 41)), fixed(3));
        assert_eq!(center(&content, building), vec2(41, 41));
    }

    #[test]
    fn test_placement_rejects_overlap_and_edges() {
        let mut m = create_test_match(2);
        m.resources.clear();
        place_building(&mut m, Some(0), BuildingType::House, vec2(40, 40));
        place_resource(&mut m, ResourceNodeType::Gold, vec2(50, 50));
        assert!(is_placement_valid(&m, BuildingType::House, vec2(42, 40)));
        assert!(!is_placement_valid(&m, BuildingType::House, vec2(41, 41)));
        assert!(!is_placement_valid(&m, BuildingType::House, vec2(51, 49)));
        assert!(!is_placement_valid(&m, BuildingType::House, vec2(99, 10)));
        assert!(!is_placement_valid(&m, BuildingType::House, vec2(-1, 10)));
    }

    #[test]
    fn test_find_dropoff_skips_unfinished_and_wrong_kind() {
        let mut m = create_test_match(2);
        let tc = m.players[0].starting_town_center.unwrap();
        let tc_pos = m.building(tc).unwrap().position;
        let camp = place_building(&mut m, Some(0), BuildingType::LumberCamp, tc_pos + vec2(6, 0));
        assert_eq!(find_dropoff(&m, 0, ResourceKind::Wood, tc_pos + vec2(7, 0)), Some(camp));
        m.building_mut(camp).unwrap().under_construction = true;
        assert_eq!(find_dropoff(&m, 0, ResourceKind::Wood, tc_pos + vec2(7, 0)), Some(tc));

        // With the Town Centre out of service only the camp is left, and it
        // takes wood but refuses gold.
        m.building_mut(camp).unwrap().under_construction = false;
        m.building_mut(tc).unwrap().under_construction = true;
        assert_eq!(find_dropoff(&m, 0, ResourceKind::Wood, tc_pos), Some(camp));
        assert_eq!(find_dropoff(&m, 0, ResourceKind::Gold, tc_pos), None);
    }

    #[test]
    fn test_unfinished_sites_of_other_players_are_skipped() {
        let mut m = create_test_match(2);
        let theirs = place_building(&mut m, Some(1), BuildingType::House, vec2(40, 40));
        let ours = place_building(&mut m, Some(0), BuildingType::House, vec2(50, 40));
        m.building_mut(theirs).unwrap().under_construction = true;
        assert_eq!(find_nearest_unfinished(&m, 0, vec2(41, 41), fixed(20)), None);
        m.building_mut(ours).unwrap().under_construction = true;
        assert_eq!(find_nearest_unfinished(&m, 0, vec2(41, 41), fixed(20)), Some(ours));
        assert_eq!(find_nearest_unfinished(&m, 1, vec2(41, 41), fixed(20)), Some(theirs));
    }

    #[test]
    fn test_garrison_capacity_by_type() {
        let mut m = create_test_match(2);
        let content = m.content_arc();
        let tc = m.players[0].starting_town_center.unwrap();
        assert_eq!(garrison_capacity(&content, m.building(tc).unwrap()), 15);
        let spire = place_building(&mut m, Some(0), BuildingType::DominionSpire, vec2(40, 40));
        m.building_mut(spire).unwrap().landmark_age_tier = Some(3);
        assert_eq!(garrison_capacity(&content, m.building(spire).unwrap()), 20);
        m.building_mut(spire).unwrap().landmark_destroyed = true;
        assert_eq!(garrison_capacity(&content, m.building(spire).unwrap()), 0);
        assert_eq!(relic_capacity(&content, BuildingType::Monastery), 3);
        assert_eq!(relic_capacity(&content, BuildingType::House), 0);
    }

    #[test]
    fn test_can_garrison() {
        let mut unit = Unit::new(1, 0, UnitType::Monk, vec2(1, 1), fixed(50));
        assert!(can_garrison(&unit));
        unit.relic = Some(4);
        assert!(!can_garrison(&unit));
        let trebuchet = Unit::new(2, 0, UnitType::CounterweightTrebuchet, vec2(1, 1), fixed(50));
        assert!(!can_garrison(&trebuchet));
    }

    #[test]
    fn test_repair_resource() {
        let m = create_test_match(2);
        assert_eq!(repair_resource(m.content(), BuildingType::StoneTower), ResourceKind::Stone);
        assert_eq!(repair_resource(m.content(), BuildingType::House), ResourceKind::Wood);
    }
}
