//! Movement phase: walks every unit towards whatever its order needs.
//!
//! Arrival effects that only concern position (relic pickup, relic storage,
//! entering a garrison) are resolved here as well; work at the destination
//! (gathering, building, fighting) belongs to the later phases.

use tracing::debug;

use crate::buildings::{
    can_garrison, clamp_to_footprint, find_dropoff, garrison_capacity, is_destroyed_landmark, relic_capacity,
};
use crate::entities::{EntityId, EntityRef, GarrisonSlot};
use crate::kinds::BuildingType;
use crate::math::{fixed_int, fixed_ratio, Fixed, Vec2Fixed};
use crate::orders::Order;
use crate::relics;
use crate::state::Match;
use crate::stats::{unit_min_range, unit_range};
use crate::steering::{
    move_with_path, MoveOptions, FORMATION_AVOIDANCE_SCALE, FORMATION_SAME_FACTOR, FORMATION_UNIT_AVOIDANCE,
};
use crate::targeting::{aim_point, can_player_see, find_nearest_enemy, is_in_range, target_distance};

/// Units stop this close to a building edge, resource or relic.
pub const ARRIVAL_DISTANCE: Fixed = fixed_ratio(6, 10);

/// Repairers stop this close to a building.
const REPAIR_DISTANCE: Fixed = fixed_ratio(3, 4);

/// Repairers stop this close to a siege unit.
const SIEGE_REPAIR_DISTANCE: Fixed = fixed_ratio(125, 100);

/// Healers stop this close to their patient.
const HEAL_DISTANCE: Fixed = fixed_int(2);

/// Relic carriers drop within this distance of the requested point.
const DROP_DISTANCE: Fixed = fixed_ratio(2, 10);

/// Point orders complete (and snap) within this distance.
const SNAP_DISTANCE: Fixed = fixed_ratio(5, 100);

/// Extra margin when backing off from inside minimum range.
const MIN_RANGE_BACKOFF: Fixed = fixed_ratio(35, 100);

fn clear_order(m: &mut Match, index: usize) {
    m.units[index].order = None;
}

/// Footprint point nearest to the unit and its distance.
fn approach_point(m: &Match, index: usize, building: EntityId) -> Option<(Vec2Fixed, Fixed)> {
    let b = m.building(building)?;
    let position = m.units[index].position;
    let point = clamp_to_footprint(m.content(), b, position);
    Some((point, point.distance(position)))
}

/// Walk up to a building; returns `true` once within `reach`.
fn approach_building(m: &mut Match, index: usize, building: EntityId, reach: Fixed, options: &MoveOptions) -> bool {
    let Some((point, distance)) = approach_point(m, index, building) else {
        return false;
    };
    if distance <= reach {
        return true;
    }
    move_with_path(m, index, point, options);
    false
}

fn can_handle_relics(m: &Match, index: usize) -> bool {
    relics::can_handle_relics(m, m.units[index].owner)
}

/// Own, finished relic building.
fn is_usable_relic_building(m: &Match, index: usize, building: EntityId) -> bool {
    let owner = m.units[index].owner;
    m.building(building).is_some_and(|b| {
        b.is_owned_by(owner) && !b.under_construction && relic_capacity(m.content(), b.kind) > 0
    })
}

fn move_garrison(m: &mut Match, index: usize, building: EntityId, arrivals: &mut Vec<(usize, EntityId)>) {
    let owner = m.units[index].owner;
    let Some(b) = m.building(building).filter(|b| b.is_owned_by(owner)) else {
        return clear_order(m, index);
    };
    if b.under_construction || is_destroyed_landmark(m.content(), b) {
        let target = b.position;
        m.units[index].order = Some(Order::Move { target, formation: None });
        return;
    }
    if !can_garrison(&m.units[index]) {
        return clear_order(m, index);
    }
    let options = MoveOptions::towards_building(building);
    if approach_building(m, index, building, ARRIVAL_DISTANCE, &options) {
        arrivals.push((index, building));
    }
}

fn move_return(m: &mut Match, index: usize, building: EntityId) {
    let content = m.content_arc();
    let usable = m
        .building(building)
        .is_some_and(|b| !b.under_construction && !is_destroyed_landmark(&content, b));
    if !usable {
        let unit = &m.units[index];
        let replacement = unit
            .carry
            .kind
            .and_then(|kind| find_dropoff(m, unit.owner, kind, unit.position));
        match replacement {
            Some(id) => {
                if let Some(Order::Return { building, .. }) = m.units[index].order.as_mut() {
                    *building = id;
                }
            }
            None => clear_order(m, index),
        }
        return;
    }
    approach_building(m, index, building, ARRIVAL_DISTANCE, &MoveOptions::towards_building(building));
}

fn move_repair(m: &mut Match, index: usize, target: EntityRef) {
    let owner = m.units[index].owner;
    match target {
        EntityRef::Building(id) => {
            let valid = m
                .building(id)
                .is_some_and(|b| b.is_owned_by(owner) && !b.under_construction && b.hp < b.max_hp);
            if !valid {
                return clear_order(m, index);
            }
            let options = MoveOptions {
                unit_avoidance: None,
                ..MoveOptions::towards_building(id)
            };
            approach_building(m, index, id, REPAIR_DISTANCE, &options);
        }
        EntityRef::Unit(id) => {
            let content = m.content_arc();
            let Some(patient) = m
                .unit(id)
                .filter(|u| u.owner == owner && content.unit(u.kind).is_siege() && u.is_damaged())
            else {
                return clear_order(m, index);
            };
            let target = patient.position;
            if target.distance(m.units[index].position) > SIEGE_REPAIR_DISTANCE {
                let options = MoveOptions {
                    unit_avoidance: None,
                    ..MoveOptions::default()
                };
                move_with_path(m, index, target, &options);
            }
        }
    }
}

fn move_gather(m: &mut Match, index: usize, resource: EntityId) {
    let Some(center) = m.resource(resource).map(|r| r.center()) else {
        return clear_order(m, index);
    };
    if center.distance(m.units[index].position) > ARRIVAL_DISTANCE {
        move_with_path(m, index, center, &MoveOptions::default());
    }
}

fn move_pickup_relic(m: &mut Match, index: usize, relic: EntityId) {
    if !can_handle_relics(m, index) || m.units[index].relic.is_some() {
        return clear_order(m, index);
    }
    let Some(target) = m.relic(relic).filter(|r| r.is_free()).map(|r| r.position) else {
        return clear_order(m, index);
    };
    if target.distance(m.units[index].position) > ARRIVAL_DISTANCE {
        move_with_path(m, index, target, &MoveOptions::default());
        return;
    }
    let unit = m.units[index].id;
    relics::pick_up(m, unit, relic);
    clear_order(m, index);
}

fn move_deposit_relic(m: &mut Match, index: usize, building: EntityId) {
    let unit = m.units[index].id;
    let carrying = m.units[index]
        .relic
        .and_then(|r| m.relic(r))
        .is_some_and(|r| r.carrier() == Some(unit));
    if !carrying || !is_usable_relic_building(m, index, building) {
        return clear_order(m, index);
    }
    if approach_building(m, index, building, ARRIVAL_DISTANCE, &MoveOptions::towards_building(building)) {
        relics::deposit(m, unit, building);
        clear_order(m, index);
    }
}

fn move_take_relic(m: &mut Match, index: usize, building: EntityId) {
    if !can_handle_relics(m, index)
        || m.units[index].relic.is_some()
        || !is_usable_relic_building(m, index, building)
    {
        return clear_order(m, index);
    }
    if approach_building(m, index, building, ARRIVAL_DISTANCE, &MoveOptions::towards_building(building)) {
        let unit = m.units[index].id;
        relics::take(m, unit, building);
        clear_order(m, index);
    }
}

fn move_drop_relic(m: &mut Match, index: usize, target: Vec2Fixed) {
    let unit = m.units[index].id;
    let carrying = m.units[index]
        .relic
        .and_then(|r| m.relic(r))
        .is_some_and(|r| r.carrier() == Some(unit));
    if !carrying {
        let u = &mut m.units[index];
        u.order = None;
        u.relic = None;
        return;
    }
    let position = m.units[index].position;
    if target.distance(position) > DROP_DISTANCE {
        move_with_path(m, index, target, &MoveOptions::default());
        return;
    }
    relics::drop_at(m, unit, position);
    clear_order(m, index);
}

fn move_heal(m: &mut Match, index: usize, patient: EntityId) {
    let owner = m.units[index].owner;
    let Some(target) = m
        .unit(patient)
        .filter(|u| u.owner == owner && u.is_alive())
        .map(|u| u.position)
    else {
        let u = &mut m.units[index];
        u.order = None;
        u.is_healing = false;
        return;
    };
    if target.distance(m.units[index].position) > HEAL_DISTANCE {
        move_with_path(m, index, target, &MoveOptions::default());
    }
}

fn move_attack(m: &mut Match, index: usize, target: EntityRef, manual: bool) {
    let owner = m.units[index].owner;
    let valid = m.resolve(target.id()) == Some(target) && m.is_enemy(m.owner_of(target), Some(owner));
    let lost_sight = manual && !target.is_building() && !can_player_see(m, owner, target);
    if !valid || lost_sight {
        let u = &mut m.units[index];
        u.order = None;
        u.attack_target = None;
        return;
    }

    let unit = &m.units[index];
    let (range, min_range) = (unit_range(m, unit), unit_min_range(m, unit));
    if is_in_range(m, unit, target, range, min_range) {
        return;
    }
    let (Some(distance), Some(aim)) = (
        target_distance(m, unit.position, target),
        aim_point(m, unit.position, target),
    ) else {
        return;
    };
    if distance <= SNAP_DISTANCE {
        return;
    }

    let mut destination = aim;
    if min_range > Fixed::ZERO && distance < min_range {
        let mut away = unit.position - aim;
        if away.length() < fixed_ratio(1, 1000) {
            away = Vec2Fixed::new(Fixed::ONE, Fixed::ZERO);
        }
        let away = away.normalize();
        let margin = fixed_ratio(5, 100);
        let backed = aim + away.scale(min_range + MIN_RANGE_BACKOFF);
        destination = Vec2Fixed::new(
            backed.x.clamp(Fixed::ZERO, m.width() - margin),
            backed.y.clamp(Fixed::ZERO, m.height() - margin),
        );
    }
    let options = MoveOptions {
        ignore_building: target.is_building().then_some(target.id()),
        repath_ticks: 20,
        unit_avoidance: Some(fixed_ratio(18, 100)),
        avoidance_scale: fixed_ratio(85, 100),
        ..MoveOptions::default()
    };
    move_with_path(m, index, destination, &options);
}

fn move_to_point(m: &mut Match, index: usize, order: Order) {
    let (target, formation, attack_move) = match order {
        Order::Move { target, formation } => (target, formation, false),
        Order::AttackMove { target, formation } => (target, formation, true),
        _ => return,
    };
    if attack_move {
        let unit = &m.units[index];
        let (range, min_range) = (unit_range(m, unit), unit_min_range(m, unit));
        if find_nearest_enemy(m, Some(unit.owner), unit.position, range, min_range).is_some() {
            return;
        }
    }
    let destination = target + formation.map_or(Vec2Fixed::ZERO, |f| f.offset);
    if destination.distance(m.units[index].position) < SNAP_DISTANCE {
        let u = &mut m.units[index];
        u.position = destination;
        u.order = None;
        return;
    }
    let options = MoveOptions {
        speed_override: formation.map(|f| f.speed),
        repath_ticks: if attack_move { 20 } else { 60 },
        unit_avoidance: Some(if formation.is_some() {
            FORMATION_UNIT_AVOIDANCE
        } else {
            fixed_ratio(2, 10)
        }),
        same_formation_factor: if formation.is_some() {
            FORMATION_SAME_FACTOR
        } else {
            fixed_ratio(12, 100)
        },
        avoidance_scale: if formation.is_some() {
            FORMATION_AVOIDANCE_SCALE
        } else {
            fixed_ratio(9, 10)
        },
        ..MoveOptions::default()
    };
    move_with_path(m, index, destination, &options);
}

/// Seat arrived units in their building, or drop the order when full.
fn apply_garrison_arrivals(m: &mut Match, arrivals: Vec<(usize, EntityId)>) {
    let content = m.content_arc();
    let mut entered = Vec::new();
    for (index, building) in arrivals {
        let Some(b) = m.building(building) else {
            continue;
        };
        if b.garrison.len() >= garrison_capacity(&content, b) {
            m.units[index].order = None;
            continue;
        }
        let slot = GarrisonSlot {
            id: m.units[index].id,
            kind: m.units[index].kind,
        };
        if let Some(b) = m.building_mut(building) {
            b.garrison.push(slot);
        }
        debug!(unit = slot.id, building, "unit garrisoned");
        entered.push(slot.id);
    }
    if !entered.is_empty() {
        m.units.retain(|u| !entered.contains(&u.id));
    }
}

/// Movement phase.
pub fn process_movement(m: &mut Match) {
    let mut arrivals = Vec::new();
    for i in 0..m.units.len() {
        let Some(order) = m.units[i].order else {
            continue;
        };
        match order {
            Order::Trade { building } => {
                if m.building(building).is_none() {
                    clear_order(m, i);
                    continue;
                }
                approach_building(m, i, building, ARRIVAL_DISTANCE, &MoveOptions::towards_building(building));
            }
            Order::Garrison { building } => move_garrison(m, i, building, &mut arrivals),
            Order::Return { building, .. } => move_return(m, i, building),
            Order::Build { building } => {
                if m.building(building).is_none() {
                    clear_order(m, i);
                    continue;
                }
                let options = MoveOptions {
                    repath_ticks: 20,
                    unit_avoidance: Some(fixed_ratio(16, 100)),
                    ..MoveOptions::towards_building(building)
                };
                approach_building(m, i, building, ARRIVAL_DISTANCE, &options);
            }
            Order::Repair { target } => move_repair(m, i, target),
            Order::Farm { building } => {
                if m.building(building).map(|b| b.kind) != Some(BuildingType::Farm) {
                    clear_order(m, i);
                    continue;
                }
                approach_building(m, i, building, ARRIVAL_DISTANCE, &MoveOptions::towards_building(building));
            }
            Order::Gather { resource } => move_gather(m, i, resource),
            Order::PickupRelic { relic } => move_pickup_relic(m, i, relic),
            Order::DepositRelic { building } => move_deposit_relic(m, i, building),
            Order::TakeRelic { building } => move_take_relic(m, i, building),
            Order::DropRelic { target } => move_drop_relic(m, i, target),
            Order::Heal { target, .. } => move_heal(m, i, target),
            Order::Attack { target, manual } => move_attack(m, i, target, manual),
            Order::Move { .. } | Order::AttackMove { .. } => move_to_point(m, i, order),
        }
    }
    if !arrivals.is_empty() {
        apply_garrison_arrivals(m, arrivals);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::UnitType;
    use crate::orders::FormationSlot;
    use crate::test_support::{create_test_match, place_building, place_relic, place_unit};

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn pos(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(fixed(x), fixed(y))
    }

    fn run(m: &mut Match, ticks: usize) {
        for _ in 0..ticks {
            process_movement(m);
        }
    }

    #[test]
    fn test_move_order_snaps_and_completes() {
        let mut m = create_test_match(2);
        let unit = place_unit(&mut m, 0, UnitType::Spearman, pos(50, 50));
        m.unit_mut(unit).unwrap().order = Some(Order::Move {
            target: pos(53, 50),
            formation: None,
        });
        run(&mut m, 20 * 10);
        let u = m.unit(unit).unwrap();
        assert_eq!(u.order, None);
        assert_eq!(u.position, pos(53, 50));
    }

    #[test]
    fn test_formation_offset_shifts_destination() {
        let mut m = create_test_match(2);
        let unit = place_unit(&mut m, 0, UnitType::Spearman, pos(50, 50));
        m.unit_mut(unit).unwrap().order = Some(Order::Move {
            target: pos(52, 50),
            formation: Some(FormationSlot {
                id: 1,
                offset: pos(0, 1),
                speed: fixed(1),
            }),
        });
        run(&mut m, 20 * 10);
        assert_eq!(m.unit(unit).unwrap().position, pos(52, 51));
    }

    #[test]
    fn test_attack_move_holds_when_enemy_in_range() {
        let mut m = create_test_match(2);
        let archer = place_unit(&mut m, 0, UnitType::Archer, pos(50, 50));
        place_unit(&mut m, 1, UnitType::Spearman, pos(53, 50));
        m.unit_mut(archer).unwrap().order = Some(Order::AttackMove {
            target: pos(60, 60),
            formation: None,
        });
        run(&mut m, 5);
        assert_eq!(m.unit(archer).unwrap().position, pos(50, 50));
    }

    #[test]
    fn test_attack_on_ally_is_dropped() {
        let mut m = create_test_match(2);
        let a = place_unit(&mut m, 0, UnitType::Spearman, pos(50, 50));
        let b = place_unit(&mut m, 0, UnitType::Spearman, pos(55, 50));
        let target = EntityRef::Unit(b);
        {
            let u = m.unit_mut(a).unwrap();
            u.order = Some(Order::Attack { target, manual: true });
            u.attack_target = Some(target);
        }
        process_movement(&mut m);
        let u = m.unit(a).unwrap();
        assert_eq!(u.order, None);
        assert_eq!(u.attack_target, None);
    }

    #[test]
    fn test_garrison_removes_unit_from_map() {
        let mut m = create_test_match(2);
        let tc = m.players[0].starting_town_center.unwrap();
        let tc_pos = m.building(tc).unwrap().position;
        let unit = place_unit(&mut m, 0, UnitType::Villager, tc_pos + pos(-1, 1));
        m.unit_mut(unit).unwrap().order = Some(Order::Garrison { building: tc });
        run(&mut m, 20 * 3);
        assert!(m.unit(unit).is_none());
        let slots = &m.building(tc).unwrap().garrison;
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].id, unit);
    }

    #[test]
    fn test_garrison_into_enemy_building_is_dropped() {
        let mut m = create_test_match(2);
        let enemy_tc = m.players[1].starting_town_center.unwrap();
        let unit = place_unit(&mut m, 0, UnitType::Spearman, pos(50, 50));
        m.unit_mut(unit).unwrap().order = Some(Order::Garrison { building: enemy_tc });
        process_movement(&mut m);
        assert_eq!(m.unit(unit).unwrap().order, None);
    }

    #[test]
    fn test_relic_pickup_needs_second_age() {
        let mut m = create_test_match(2);
        let monk = place_unit(&mut m, 0, UnitType::Monk, pos(50, 50));
        let relic = place_relic(&mut m, pos(51, 50));
        m.unit_mut(monk).unwrap().order = Some(Order::PickupRelic { relic });
        process_movement(&mut m);
        assert_eq!(m.unit(monk).unwrap().order, None);

        m.players[0].age_tier = 2;
        m.unit_mut(monk).unwrap().order = Some(Order::PickupRelic { relic });
        run(&mut m, 20 * 3);
        assert_eq!(m.unit(monk).unwrap().relic, Some(relic));
        assert_eq!(m.relic(relic).unwrap().carrier(), Some(monk));
    }

    #[test]
    fn test_deposit_relic_stores_at_building_center() {
        let mut m = create_test_match(2);
        m.players[0].age_tier = 2;
        let monastery = place_building(&mut m, Some(0), BuildingType::Monastery, pos(50, 50));
        let monk = place_unit(&mut m, 0, UnitType::Monk, pos(48, 50));
        let relic = place_relic(&mut m, pos(48, 50));
        assert!(relics::pick_up(&mut m, monk, relic));
        m.unit_mut(monk).unwrap().order = Some(Order::DepositRelic { building: monastery });
        run(&mut m, 20 * 4);
        let stored = m.relic(relic).unwrap();
        assert_eq!(stored.stored_in(), Some(monastery));
        let b = m.building(monastery).unwrap();
        assert_eq!(stored.position, crate::buildings::center(m.content(), b));
        assert_eq!(m.unit(monk).unwrap().order, None);
    }

    #[test]
    fn test_heal_order_on_dead_patient_stops_healing() {
        let mut m = create_test_match(2);
        let monk = place_unit(&mut m, 0, UnitType::Monk, pos(50, 50));
        {
            let u = m.unit_mut(monk).unwrap();
            u.order = Some(Order::Heal { target: 12_345, manual: true });
            u.is_healing = true;
        }
        process_movement(&mut m);
        let u = m.unit(monk).unwrap();
        assert_eq!(u.order, None);
        assert!(!u.is_healing);
    }
}
