//! Construction and repair phases.

use tracing::debug;

use crate::buildings::{distance_to_footprint, find_nearest_unfinished, repair_resource};
use crate::economy::find_nearest_resource;
use crate::entities::{EntityId, EntityRef};
use crate::events::GameEvent;
use crate::kinds::{BuildingType, ResourceKind, UnitType};
use crate::math::{fixed_int, fixed_ratio, Fixed};
use crate::orders::Order;
use crate::production::{advance_age, announce_landmark_age};
use crate::state::{Match, DT};
use crate::stats::{dropoff_multiplier, spire_max_hp_for_age};

/// Builders must stand this close to the footprint to contribute.
pub const BUILD_DISTANCE: Fixed = fixed_ratio(105, 100);

/// Radius searched for follow-up work after a building completes.
pub const REASSIGN_RADIUS: Fixed = fixed_int(6);

/// Building hp restored per repairer per second.
pub const REPAIR_RATE: Fixed = fixed_int(20);

/// Siege hp restored per repairer per second.
pub const SIEGE_REPAIR_RATE: Fixed = fixed_int(5);

/// Resource spent per repairer per second.
pub const REPAIR_COST: Fixed = Fixed::ONE;

const REPAIR_REACH: Fixed = fixed_ratio(75, 100);
const SIEGE_REPAIR_REACH: Fixed = fixed_ratio(125, 100);

fn builders_of(m: &Match, building: EntityId) -> Vec<usize> {
    m.units
        .iter()
        .enumerate()
        .filter(|(_, u)| matches!(u.order, Some(Order::Build { building: b }) if b == building))
        .map(|(i, _)| i)
        .collect()
}

/// Construction phase.
pub fn process_construction(m: &mut Match) {
    let content = m.content_arc();
    for i in 0..m.buildings.len() {
        let b = &m.buildings[i];
        if !b.under_construction {
            continue;
        }
        let id = b.id;
        let total = b.build_time;
        if total <= Fixed::ZERO {
            finish_construction(m, i, &[]);
            continue;
        }
        let nearby: Vec<usize> = builders_of(m, id)
            .into_iter()
            .filter(|&u| distance_to_footprint(&content, b, m.units[u].position) <= BUILD_DISTANCE)
            .collect();
        if nearby.is_empty() {
            continue;
        }

        let b = &mut m.buildings[i];
        b.build_progress += DT * Fixed::from_num(nearby.len());
        let ratio = (b.build_progress / total).clamp(Fixed::ZERO, Fixed::ONE);
        b.hp = (b.max_hp * ratio).round().max(Fixed::ONE);
        if b.build_progress >= total {
            finish_construction(m, i, &nearby);
        }
    }
}

/// Complete the building at `index` and hand out follow-up work to the
/// builders that finished it.
fn finish_construction(m: &mut Match, index: usize, builders: &[usize]) {
    let content = m.content_arc();
    let b = &mut m.buildings[index];
    b.under_construction = false;
    b.build_progress = b.build_time.max(Fixed::ZERO);
    b.hp = b.max_hp;
    let (id, kind, owner, position) = (b.id, b.kind, b.owner, b.position);
    let data = content.building(kind);

    if let Some(owner) = owner {
        if content.is_age_landmark(kind) {
            let next = m.player(owner).map_or(1, |p| p.age_tier.saturating_add(1).clamp(1, 4));
            let tier = m.buildings[index].landmark_age_tier.unwrap_or(next);
            m.buildings[index].landmark_age_tier = Some(tier);
            if let Some(player) = m.player_mut(owner) {
                player.landmark_built_ages.insert(kind, tier);
            }
            if kind == BuildingType::DominionSpire {
                if let Some(max_hp) = m.player(owner).map(|p| spire_max_hp_for_age(&content, p, tier)) {
                    let b = &mut m.buildings[index];
                    b.max_hp = max_hp;
                    b.hp = max_hp;
                }
            }
            if advance_age(m, owner, tier) {
                announce_landmark_age(m, owner, id);
            }
        }
        m.outbox.to_player(owner, GameEvent::BuildingComplete { building_type: kind });
    }
    debug!(building = id, ?kind, ?position, "construction complete");

    for &u in builders {
        let unit = &m.units[u];
        let Some(carried) = unit.carry.kind.filter(|_| !unit.carry.is_empty()) else {
            continue;
        };
        let amount = unit.carry.amount;
        let owner = unit.owner;
        if let Some(player) = m.player_mut(owner) {
            let bonus = dropoff_multiplier(&content, player, carried);
            player.resources.add(carried, amount * bonus);
        }
        m.units[u].carry.clear();
    }

    let mut idle = builders.iter().copied();
    if kind == BuildingType::Farm {
        if let Some(farmer) = idle.next() {
            m.units[farmer].order = Some(Order::Farm { building: id });
            m.buildings[index].farmer = Some(m.units[farmer].id);
        }
    }
    let accepts: &[ResourceKind] = &data.accepts;
    for u in idle {
        let (from, owner) = (m.units[u].position, m.units[u].owner);
        let order = find_nearest_unfinished(m, owner, from, REASSIGN_RADIUS)
            .map(|building| Order::Build { building })
            .or_else(|| {
                (!accepts.is_empty())
                    .then(|| find_nearest_resource(m, from, accepts, REASSIGN_RADIUS))
                    .flatten()
                    .map(|resource| Order::Gather { resource })
            });
        m.units[u].order = order;
    }
}

/// Repairers that are in reach, and the affordable share of them.
fn active_repairers(nearby: usize, available: Fixed) -> Fixed {
    if available <= Fixed::ZERO {
        return Fixed::ZERO;
    }
    Fixed::from_num(nearby).min(available / (REPAIR_COST * DT))
}

fn clear_repair_orders(m: &mut Match, target: EntityRef) {
    for u in &mut m.units {
        if matches!(u.order, Some(Order::Repair { target: t }) if t == target) {
            u.order = None;
        }
    }
}

/// Repair phase for buildings and siege units.
///
/// Repairers are never idled by a shortfall; they simply do nothing on ticks
/// their owner cannot pay for.
pub fn process_repairing(m: &mut Match) {
    let content = m.content_arc();
    for i in 0..m.buildings.len() {
        let b = &m.buildings[i];
        let Some(owner) = b.owner else { continue };
        if b.under_construction {
            continue;
        }
        if b.hp >= b.max_hp {
            let b = &mut m.buildings[i];
            b.hp = b.max_hp;
            b.landmark_destroyed = false;
            continue;
        }
        let target = b.entity_ref();
        let nearby = m
            .units
            .iter()
            .filter(|u| u.owner == owner && u.kind == UnitType::Villager)
            .filter(|u| matches!(u.order, Some(Order::Repair { target: t }) if t == target))
            .filter(|u| distance_to_footprint(&content, b, u.position) <= REPAIR_REACH)
            .count();
        if nearby == 0 {
            continue;
        }
        let kind = repair_resource(&content, b.kind);
        let Some(player) = m.player_mut(owner) else { continue };
        let active = active_repairers(nearby, player.resources.get(kind));
        if active <= Fixed::ZERO {
            continue;
        }
        let spent = player.resources.get_mut(kind);
        *spent = (*spent - active * REPAIR_COST * DT).max(Fixed::ZERO);

        let b = &mut m.buildings[i];
        b.hp = (b.hp + active * REPAIR_RATE * DT).min(b.max_hp);
        if b.hp >= b.max_hp {
            b.landmark_destroyed = false;
            debug!(building = b.id, "repair complete");
            clear_repair_orders(m, target);
        }
    }

    for i in 0..m.units.len() {
        let target = &m.units[i];
        if !content.unit(target.kind).is_siege() {
            continue;
        }
        if target.hp >= target.max_hp {
            m.units[i].hp = m.units[i].max_hp;
            continue;
        }
        let (owner, spot, target_ref) = (target.owner, target.position, target.entity_ref());
        let nearby = m
            .units
            .iter()
            .filter(|u| u.owner == owner && u.kind == UnitType::Villager)
            .filter(|u| matches!(u.order, Some(Order::Repair { target: t }) if t == target_ref))
            .filter(|u| u.position.distance(spot) <= SIEGE_REPAIR_REACH)
            .count();
        if nearby == 0 {
            continue;
        }
        let Some(player) = m.player_mut(owner) else { continue };
        let active = active_repairers(nearby, player.resources.wood);
        if active <= Fixed::ZERO {
            continue;
        }
        player.resources.wood = (player.resources.wood - active * REPAIR_COST * DT).max(Fixed::ZERO);

        let unit = &mut m.units[i];
        unit.hp = (unit.hp + active * SIEGE_REPAIR_RATE * DT).min(unit.max_hp);
        if unit.hp >= unit.max_hp {
            clear_repair_orders(m, target_ref);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Audience;
    use crate::math::Vec2Fixed;
    use crate::state::TICK_RATE;
    use crate::kinds::ResourceNodeType;
    use crate::test_support::{create_test_match, place_building, place_resource, place_unit};

    fn fixed(n: i32) -> Fixed {
        fixed_int(n)
    }

    fn pos(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(fixed(x), fixed(y))
    }

    fn create_test_site(m: &mut crate::state::Match, kind: BuildingType, at: Vec2Fixed) -> EntityId {
        let id = place_building(m, Some(0), kind, at);
        let content = m.content_arc();
        let b = m.building_mut(id).unwrap();
        b.under_construction = true;
        b.build_progress = Fixed::ZERO;
        b.build_time = content.building(kind).build_time.unwrap_or(Fixed::ZERO);
        b.hp = Fixed::ONE;
        id
    }

    #[test]
    fn test_construction_needs_adjacent_builder() {
        let mut m = create_test_match(1);
        let house = create_test_site(&mut m, BuildingType::House, pos(40, 40));
        let far = place_unit(&mut m, 0, UnitType::Villager, pos(50, 50));
        m.unit_mut(far).unwrap().order = Some(Order::Build { building: house });
        process_construction(&mut m);
        assert_eq!(m.building(house).unwrap().build_progress, Fixed::ZERO);
    }

    #[test]
    fn test_construction_completes_with_full_hp() {
        let mut m = create_test_match(1);
        let house = create_test_site(&mut m, BuildingType::House, pos(40, 40));
        let builder = place_unit(&mut m, 0, UnitType::Villager, pos(39, 40));
        m.unit_mut(builder).unwrap().order = Some(Order::Build { building: house });

        let mut last_hp = Fixed::ZERO;
        let mut ticks = 0;
        while m.building(house).unwrap().under_construction {
            process_construction(&mut m);
            let hp = m.building(house).unwrap().hp;
            assert!(hp >= last_hp);
            last_hp = hp;
            ticks += 1;
            assert!(ticks <= 15 * TICK_RATE + 1, "house never finished");
        }
        assert!(ticks >= 15 * TICK_RATE - 1);

        let b = m.building(house).unwrap();
        assert!(!b.under_construction);
        assert_eq!(b.hp, b.max_hp);
        assert_eq!(m.unit(builder).unwrap().order, None);
        assert!(m
            .outbox
            .events()
            .iter()
            .any(|e| e.audience == Audience::Player(0) && e.event.name() == "buildingComplete"));
    }

    #[test]
    fn test_two_builders_build_twice_as_fast() {
        let mut m = create_test_match(1);
        let house = create_test_site(&mut m, BuildingType::House, pos(40, 40));
        for y in [40, 41] {
            let id = place_unit(&mut m, 0, UnitType::Villager, pos(39, y));
            m.unit_mut(id).unwrap().order = Some(Order::Build { building: house });
        }
        process_construction(&mut m);
        assert_eq!(m.building(house).unwrap().build_progress, DT * 2);
    }

    #[test]
    fn test_finished_farm_takes_its_builder() {
        let mut m = create_test_match(1);
        let farm = create_test_site(&mut m, BuildingType::Farm, pos(40, 40));
        m.building_mut(farm).unwrap().build_progress = m.building(farm).unwrap().build_time - DT;
        let builder = place_unit(&mut m, 0, UnitType::Villager, pos(39, 40));
        m.unit_mut(builder).unwrap().order = Some(Order::Build { building: farm });
        process_construction(&mut m);

        assert_eq!(m.building(farm).unwrap().farmer, Some(builder));
        assert_eq!(m.unit(builder).unwrap().order, Some(Order::Farm { building: farm }));
    }

    #[test]
    fn test_finished_dropoff_sends_builder_to_gather() {
        let mut m = create_test_match(1);
        let camp = create_test_site(&mut m, BuildingType::LumberCamp, pos(40, 40));
        m.building_mut(camp).unwrap().build_progress = m.building(camp).unwrap().build_time - DT;
        let tree = place_resource(&mut m, ResourceNodeType::Tree, pos(37, 40));
        let builder = place_unit(&mut m, 0, UnitType::Villager, pos(39, 40));
        {
            let u = m.unit_mut(builder).unwrap();
            u.order = Some(Order::Build { building: camp });
            u.carry.kind = Some(ResourceKind::Food);
            u.carry.amount = fixed(5);
        }
        let food = m.players[0].resources.food;
        process_construction(&mut m);

        assert_eq!(m.unit(builder).unwrap().order, Some(Order::Gather { resource: tree }));
        assert_eq!(m.players[0].resources.food, food + fixed(5));
    }

    #[test]
    fn test_landmark_completion_advances_age() {
        let mut m = create_test_match(1);
        let grove = create_test_site(&mut m, BuildingType::GroveUniversity, pos(40, 40));
        m.building_mut(grove).unwrap().build_time = Fixed::ZERO;
        process_construction(&mut m);

        assert_eq!(m.players[0].age_tier, 1);
        assert_eq!(m.players[0].landmark_built_ages.get(&BuildingType::GroveUniversity), Some(&1));
        assert_eq!(m.building(grove).unwrap().landmark_age_tier, Some(1));
        assert_eq!(m.outbox.events()[0].event.name(), "researchComplete");
    }

    #[test]
    fn test_repair_spends_wood_and_restores_landmark() {
        let mut m = create_test_match(1);
        let tc = m.players[0].starting_town_center.unwrap();
        {
            let b = m.building_mut(tc).unwrap();
            b.hp = b.max_hp - fixed_ratio(1, 2);
            b.landmark_destroyed = true;
        }
        let pos_tc = m.building(tc).unwrap().position;
        let villager = place_unit(&mut m, 0, UnitType::Villager, pos_tc - Vec2Fixed::new(fixed_ratio(1, 2), Fixed::ZERO));
        m.unit_mut(villager).unwrap().order = Some(Order::Repair {
            target: EntityRef::Building(tc),
        });
        let wood = m.players[0].resources.wood;
        process_repairing(&mut m);

        let b = m.building(tc).unwrap();
        assert_eq!(b.hp, b.max_hp);
        assert!(!b.landmark_destroyed);
        assert_eq!(m.players[0].resources.wood, wood - DT);
        assert_eq!(m.unit(villager).unwrap().order, None);
    }

    #[test]
    fn test_repair_stalls_without_resources() {
        let mut m = create_test_match(1);
        let tc = m.players[0].starting_town_center.unwrap();
        m.building_mut(tc).unwrap().hp = fixed(100);
        let pos_tc = m.building(tc).unwrap().position;
        let villager = place_unit(&mut m, 0, UnitType::Villager, pos_tc - Vec2Fixed::new(fixed_ratio(1, 2), Fixed::ZERO));
        m.unit_mut(villager).unwrap().order = Some(Order::Repair {
            target: EntityRef::Building(tc),
        });
        m.players[0].resources.wood = Fixed::ZERO;
        process_repairing(&mut m);

        assert_eq!(m.building(tc).unwrap().hp, fixed(100));
        assert!(m.unit(villager).unwrap().order.is_some());
    }
}
