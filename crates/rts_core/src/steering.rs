//! Local steering: path following, avoidance and soft collision resolution.
//!
//! Avoidance blends a repulsion vector into the direction of travel. Overlaps
//! that remain are pushed apart a little every tick, so crowds settle over a
//! few ticks instead of being solved exactly.

use crate::buildings::collision_bounds;
use crate::entities::EntityId;
use crate::math::{atan2, fixed_ratio, fixed_sqrt, Fixed, Vec2Fixed};
use crate::orders::Order;
use crate::pathfinding::find_path;
use crate::state::{Match, DT};
use crate::stats::{unit_radius, unit_speed};

/// Units keep this far from the far map edges.
pub const MAP_EDGE_MARGIN: Fixed = fixed_ratio(1, 10);

/// Extra clearance kept from building walls.
const BUILDING_AVOID_PADDING: Fixed = fixed_ratio(7, 10);
/// Extra clearance kept between units.
const UNIT_AVOID_PADDING: Fixed = fixed_ratio(1, 10);
/// Waypoints count as reached within this distance.
const WAYPOINT_REACHED: Fixed = fixed_ratio(1, 10);
/// Collision distance factor for two members of one formation.
pub const FORMATION_COLLISION_FACTOR: Fixed = fixed_ratio(82, 100);
/// Unit avoidance strength inside a formation.
pub const FORMATION_UNIT_AVOIDANCE: Fixed = fixed_ratio(8, 100);
/// Same-formation avoidance factor inside a formation.
pub const FORMATION_SAME_FACTOR: Fixed = fixed_ratio(5, 100);
/// Avoidance scale inside a formation.
pub const FORMATION_AVOIDANCE_SCALE: Fixed = fixed_ratio(75, 100);

const EPSILON: Fixed = fixed_ratio(1, 10_000);
const NUDGE: Fixed = fixed_ratio(1, 100);

/// Tuning for one movement step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOptions {
    /// Building whose walls the unit may touch (its destination).
    pub ignore_building: Option<EntityId>,
    /// Speed to use instead of the unit's own (formation speed).
    pub speed_override: Option<Fixed>,
    /// Ticks before a cached path is recomputed.
    pub repath_ticks: u64,
    /// Strength of unit-to-unit avoidance; `None` disables it.
    pub unit_avoidance: Option<Fixed>,
    /// Multiplier on unit avoidance between members of one formation.
    pub same_formation_factor: Fixed,
    /// Scale applied to the whole avoidance vector.
    pub avoidance_scale: Fixed,
}

impl Default for MoveOptions {
    fn default() -> Self {
        Self {
            ignore_building: None,
            speed_override: None,
            repath_ticks: 60,
            unit_avoidance: Some(fixed_ratio(24, 100)),
            same_formation_factor: fixed_ratio(2, 10),
            avoidance_scale: fixed_ratio(9, 10),
        }
    }
}

impl MoveOptions {
    /// Options walking up to a building.
    #[must_use]
    pub fn towards_building(building: EntityId) -> Self {
        Self {
            ignore_building: Some(building),
            ..Self::default()
        }
    }
}

fn formation_id(m: &Match, index: usize) -> Option<u64> {
    m.units[index].order.and_then(|o| o.formation()).map(|f| f.id)
}

fn push_from(position: Vec2Fixed, from: Vec2Fixed, radius: Fixed) -> Vec2Fixed {
    let mut delta = position - from;
    let mut dist = delta.length();
    if dist == Fixed::ZERO {
        delta = Vec2Fixed::new(NUDGE, NUDGE);
        dist = delta.length();
    }
    if dist >= radius {
        return Vec2Fixed::ZERO;
    }
    let strength = (radius - dist) / radius;
    delta.scale(strength / dist)
}

/// Repulsion from building walls and other units.
#[must_use]
pub fn avoidance_vector(m: &Match, index: usize, options: &MoveOptions) -> Vec2Fixed {
    let content = m.content();
    let unit = &m.units[index];
    let radius = unit_radius(content, unit.kind);
    let mut result = Vec2Fixed::ZERO;

    for building in &m.buildings {
        if options.ignore_building == Some(building.id) {
            continue;
        }
        let Some(bounds) = collision_bounds(content, building) else {
            continue;
        };
        result += push_from(unit.position, bounds.clamp(unit.position), radius + BUILDING_AVOID_PADDING);
    }

    if let Some(strength) = options.unit_avoidance {
        let own_formation = formation_id(m, index);
        for (j, other) in m.units.iter().enumerate() {
            if j == index {
                continue;
            }
            let delta = unit.position - other.position;
            let dist = delta.length();
            let avoid_radius = radius + unit_radius(content, other.kind) + UNIT_AVOID_PADDING;
            if dist == Fixed::ZERO || dist >= avoid_radius {
                continue;
            }
            let same = own_formation.is_some() && own_formation == formation_id(m, j);
            let factor = if same { options.same_formation_factor } else { Fixed::ONE };
            let push = (avoid_radius - dist) / avoid_radius * strength * factor;
            result += delta.scale(push / dist);
        }
    }

    result.scale(options.avoidance_scale)
}

/// Step a unit straight towards `target`, bending around obstacles.
pub fn move_towards(m: &mut Match, index: usize, target: Vec2Fixed, options: &MoveOptions) {
    let position = m.units[index].position;
    let delta = target - position;
    let distance = delta.length();
    if distance < EPSILON {
        return;
    }
    let mut direction = delta.scale(Fixed::ONE / distance);
    let avoid = avoidance_vector(m, index, options);
    if avoid != Vec2Fixed::ZERO {
        let mixed = direction + avoid;
        let len = mixed.length();
        if len > EPSILON {
            direction = mixed.scale(Fixed::ONE / len);
        }
    }
    let speed = options.speed_override.unwrap_or_else(|| unit_speed(m, &m.units[index]));
    let step = speed * DT;
    let next = if step >= distance {
        target
    } else {
        position + direction.scale(step)
    };
    let next = m.clamp_to_map(next, MAP_EDGE_MARGIN);
    let unit = &mut m.units[index];
    if direction.length() > EPSILON {
        unit.facing = atan2(direction.y, direction.x);
    }
    unit.position = next;
}

/// Step a unit towards `target` along a cached A* path, recomputing the
/// path when it is missing, stale or aimed at another cell.
pub fn move_with_path(m: &mut Match, index: usize, target: Vec2Fixed, options: &MoveOptions) {
    let target_cell = m.nav.cell_of(target);
    let tick = m.tick;
    let unit = &m.units[index];
    let needs_path = unit.path.waypoints.is_empty()
        || unit.path.target_cell != Some(target_cell)
        || tick.saturating_sub(unit.path.computed_tick) > options.repath_ticks;

    if needs_path {
        let occupied = m.nav.occupied_cells(&m.units, unit.id);
        let path = find_path(&m.nav, unit.position, target, &occupied).filter(|p| p.len() > 1);
        let state = &mut m.units[index].path;
        state.waypoints = path.unwrap_or_default();
        state.index = 1;
        state.target_cell = Some(target_cell);
        state.computed_tick = tick;
    }

    let mut destination = target;
    let unit = &mut m.units[index];
    if let Some(waypoint) = unit.path.waypoints.get(unit.path.index).copied() {
        destination = waypoint;
        if waypoint.distance(unit.position) < WAYPOINT_REACHED {
            unit.path.index += 1;
        }
    }
    move_towards(m, index, destination, options);
}

/// Push overlapping units apart, half the overlap each.
pub fn resolve_unit_collisions(m: &mut Match) {
    let content = m.content_arc();
    let radii: Vec<Fixed> = m.units.iter().map(|u| unit_radius(&content, u.kind)).collect();
    let formations: Vec<Option<u64>> = (0..m.units.len()).map(|i| formation_id(m, i)).collect();
    let (width, height) = (m.width() - MAP_EDGE_MARGIN, m.height() - MAP_EDGE_MARGIN);
    let clamp = |p: Vec2Fixed| Vec2Fixed::new(p.x.clamp(Fixed::ZERO, width), p.y.clamp(Fixed::ZERO, height));

    for i in 0..m.units.len() {
        for j in (i + 1)..m.units.len() {
            let same = formations[i].is_some() && formations[i] == formations[j];
            let factor = if same { FORMATION_COLLISION_FACTOR } else { Fixed::ONE };
            let min_dist = (radii[i] + radii[j]) * factor;
            let mut delta = m.units[j].position - m.units[i].position;
            let mut dist_sq = delta.dot(delta);
            if dist_sq == Fixed::ZERO {
                delta = Vec2Fixed::new(NUDGE, NUDGE);
                dist_sq = delta.dot(delta);
            }
            if dist_sq >= min_dist * min_dist {
                continue;
            }
            let dist = fixed_sqrt(dist_sq);
            let overlap = (min_dist - dist) / 2;
            let push = delta.scale(overlap / dist);
            m.units[i].position = clamp(m.units[i].position - push);
            m.units[j].position = clamp(m.units[j].position + push);
        }
    }
}

/// Move every unit out of building collision bounds. A farmer may stand on
/// its own farm.
pub fn resolve_obstacle_collisions(m: &mut Match) {
    let content = m.content_arc();
    let (width, height) = (m.width() - MAP_EDGE_MARGIN, m.height() - MAP_EDGE_MARGIN);
    let Match { units, buildings, .. } = m;
    for unit in units.iter_mut() {
        let radius = unit_radius(&content, unit.kind);
        let own_farm = match unit.order {
            Some(Order::Farm { building }) => Some(building),
            _ => None,
        };
        for building in buildings.iter() {
            if own_farm == Some(building.id) {
                continue;
            }
            let Some(bounds) = collision_bounds(&content, building) else {
                continue;
            };
            let closest = bounds.clamp(unit.position);
            let delta = unit.position - closest;
            let dist_sq = delta.dot(delta);
            if dist_sq == Fixed::ZERO {
                let left = unit.position.x - bounds.min_x;
                let right = bounds.max_x - unit.position.x;
                let top = unit.position.y - bounds.min_y;
                let bottom = bounds.max_y - unit.position.y;
                let min_edge = left.min(right).min(top).min(bottom);
                if min_edge == left {
                    unit.position.x = bounds.min_x - radius;
                } else if min_edge == right {
                    unit.position.x = bounds.max_x + radius;
                } else if min_edge == top {
                    unit.position.y = bounds.min_y - radius;
                } else {
                    unit.position.y = bounds.max_y + radius;
                }
            } else if dist_sq < radius * radius {
                let dist = fixed_sqrt(dist_sq);
                unit.position += delta.scale((radius - dist) / dist);
            }
        }
        unit.position = Vec2Fixed::new(
            unit.position.x.clamp(Fixed::ZERO, width),
            unit.position.y.clamp(Fixed::ZERO, height),
        );
    }
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

    fn index_of(m: &Match, id: EntityId) -> usize {
        m.units.iter().position(|u| u.id == id).unwrap()
    }

    #[test]
    fn test_move_towards_advances_by_speed() {
        let mut m = create_test_match(2);
        let id = place_unit(&mut m, 0, UnitType::Spearman, pos(50, 50));
        let i = index_of(&m, id);
        let speed = unit_speed(&m, &m.units[i]);
        move_towards(&mut m, i, pos(60, 50), &MoveOptions::default());
        let moved = m.units[i].position.x - fixed_int(50);
        assert!((moved - speed * DT).abs() < fixed_ratio(1, 1000));
    }

    #[test]
    fn test_move_towards_does_not_overshoot() {
        let mut m = create_test_match(2);
        let id = place_unit(&mut m, 0, UnitType::Scout, pos(50, 50));
        let i = index_of(&m, id);
        let target = Vec2Fixed::new(fixed_int(50) + fixed_ratio(1, 100), fixed_int(50));
        move_towards(&mut m, i, target, &MoveOptions::default());
        assert_eq!(m.units[i].position, target);
    }

    #[test]
    fn test_move_with_path_caches_route() {
        let mut m = create_test_match(2);
        let id = place_unit(&mut m, 0, UnitType::Spearman, pos(40, 40));
        let i = index_of(&m, id);
        move_with_path(&mut m, i, pos(45, 40), &MoveOptions::default());
        let path = &m.units[i].path;
        assert!(path.waypoints.len() > 1);
        assert_eq!(path.target_cell, Some((45, 40)));
    }

    #[test]
    fn test_overlapping_units_are_pushed_apart() {
        let mut m = create_test_match(2);
        let a = place_unit(&mut m, 0, UnitType::Spearman, pos(50, 50));
        let b = place_unit(&mut m, 0, UnitType::Spearman, pos(50, 50));
        resolve_unit_collisions(&mut m);
        let pa = m.unit(a).unwrap().position;
        let pb = m.unit(b).unwrap().position;
        assert!(pa.distance(pb) > Fixed::ZERO);
    }

    #[test]
    fn test_units_are_pushed_out_of_buildings() {
        let mut m = create_test_match(2);
        let barracks = place_building(&mut m, Some(0), BuildingType::Barracks, pos(40, 40));
        let id = place_unit(&mut m, 0, UnitType::Spearman, Vec2Fixed::new(fixed_ratio(413, 10), fixed_ratio(415, 10)));
        resolve_obstacle_collisions(&mut m);
        let content = m.content_arc();
        let bounds = collision_bounds(&content, m.building(barracks).unwrap()).unwrap();
        let p = m.unit(id).unwrap().position;
        assert!(!bounds.contains(p));
    }

    #[test]
    fn test_farmer_may_stand_on_own_farm() {
        let mut m = create_test_match(2);
        let farm = place_building(&mut m, Some(0), BuildingType::Farm, pos(40, 40));
        let spot = pos(41, 41);
        let id = place_unit(&mut m, 0, UnitType::Villager, spot);
        m.unit_mut(id).unwrap().order = Some(Order::Farm { building: farm });
        resolve_obstacle_collisions(&mut m);
        assert_eq!(m.unit(id).unwrap().position, spot);
    }
}
