//! Economy and resource management.
//!
//! Player stockpiles of food, wood, gold and stone, plus the villager
//! gather / farm / drop-off cycle run by the tick engine.
//!
//! All calculations use fixed-point math for deterministic simulation.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::buildings::{distance_to_footprint, find_dropoff, is_functional};
use crate::data::by_age;
use crate::entities::{EntityId, PlayerIndex};
use crate::error::{GameError, Result};
use crate::kinds::{BuildingType, ResourceKind, UnitType};
use crate::math::{fixed_int, fixed_ratio, fixed_serde, Fixed, Vec2Fixed};
use crate::orders::{Order, ReturnTo};
use crate::state::{Match, DT};
use crate::stats::{carry_capacity, dropoff_multiplier, gather_rate};

/// Distance from a footprint at which villagers can work or drop off.
pub const WORK_DISTANCE: Fixed = fixed_ratio(3, 4);

/// Radius searched for a replacement node of the same kind.
pub const REPLACEMENT_RADIUS: Fixed = fixed_int(5);

/// Seconds without progress before a gatherer gives up on a node.
const STALL_SECONDS: Fixed = fixed_int(10);

/// Minimum approach per tick that counts as progress.
const STALL_PROGRESS: Fixed = fixed_ratio(5, 100);

/// A bundle of the four player resources. Used for stockpiles and costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stockpile {
    /// Food.
    #[serde(default, with = "fixed_serde")]
    pub food: Fixed,
    /// Wood.
    #[serde(default, with = "fixed_serde")]
    pub wood: Fixed,
    /// Gold.
    #[serde(default, with = "fixed_serde")]
    pub gold: Fixed,
    /// Stone.
    #[serde(default, with = "fixed_serde")]
    pub stone: Fixed,
}

impl Stockpile {
    /// Empty stockpile.
    pub const ZERO: Self = Self {
        food: Fixed::ZERO,
        wood: Fixed::ZERO,
        gold: Fixed::ZERO,
        stone: Fixed::ZERO,
    };

    /// Create a stockpile from whole amounts.
    #[must_use]
    pub const fn new(food: i32, wood: i32, gold: i32, stone: i32) -> Self {
        Self {
            food: fixed_int(food),
            wood: fixed_int(wood),
            gold: fixed_int(gold),
            stone: fixed_int(stone),
        }
    }

    /// A stockpile holding `amount` of a single kind.
    #[must_use]
    pub fn of(kind: ResourceKind, amount: Fixed) -> Self {
        let mut out = Self::ZERO;
        *out.get_mut(kind) = amount;
        out
    }

    /// Amount of one kind.
    #[must_use]
    pub const fn get(&self, kind: ResourceKind) -> Fixed {
        match kind {
            ResourceKind::Food => self.food,
            ResourceKind::Wood => self.wood,
            ResourceKind::Gold => self.gold,
            ResourceKind::Stone => self.stone,
        }
    }

    /// Mutable amount of one kind.
    pub fn get_mut(&mut self, kind: ResourceKind) -> &mut Fixed {
        match kind {
            ResourceKind::Food => &mut self.food,
            ResourceKind::Wood => &mut self.wood,
            ResourceKind::Gold => &mut self.gold,
            ResourceKind::Stone => &mut self.stone,
        }
    }

    /// Add to one kind.
    pub fn add(&mut self, kind: ResourceKind, amount: Fixed) {
        *self.get_mut(kind) += amount;
    }

    /// Check if every amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        ResourceKind::ALL.iter().all(|k| self.get(*k) == Fixed::ZERO)
    }

    /// Costs are whole and never negative.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut out = *self;
        for kind in ResourceKind::ALL {
            let value = out.get_mut(kind);
            *value = value.round().max(Fixed::ZERO);
        }
        out
    }

    /// Multiply every amount, then normalize.
    #[must_use]
    pub fn scaled(&self, factor: Fixed) -> Self {
        Self {
            food: self.food * factor,
            wood: self.wood * factor,
            gold: self.gold * factor,
            stone: self.stone * factor,
        }
        .normalized()
    }

    /// Check if this stockpile covers `cost`.
    #[must_use]
    pub fn can_afford(&self, cost: &Self) -> bool {
        let cost = cost.normalized();
        ResourceKind::ALL
            .iter()
            .all(|k| self.get(*k) >= cost.get(*k))
    }

    /// Deduct `cost`, or leave the stockpile untouched and fail.
    pub fn spend(&mut self, cost: &Self) -> Result<()> {
        if !self.can_afford(cost) {
            return Err(GameError::InsufficientResources);
        }
        *self -= cost.normalized();
        Ok(())
    }

    /// Return a previously paid cost.
    pub fn refund(&mut self, cost: &Self) {
        *self += cost.normalized();
    }
}

impl std::ops::Add for Stockpile {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            food: self.food + rhs.food,
            wood: self.wood + rhs.wood,
            gold: self.gold + rhs.gold,
            stone: self.stone + rhs.stone,
        }
    }
}

impl std::ops::Sub for Stockpile {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            food: self.food - rhs.food,
            wood: self.wood - rhs.wood,
            gold: self.gold - rhs.gold,
            stone: self.stone - rhs.stone,
        }
    }
}

impl std::ops::AddAssign for Stockpile {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::ops::SubAssign for Stockpile {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

/// Nearest node of one of `kinds` within `max_distance` of `from`, measured
/// to the node centre.
#[must_use]
pub fn find_nearest_resource(
    m: &Match,
    from: Vec2Fixed,
    kinds: &[ResourceKind],
    max_distance: Fixed,
) -> Option<EntityId> {
    let max_sq = max_distance * max_distance;
    m.resources
        .iter()
        .filter(|node| kinds.contains(&node.kind) && !node.is_depleted())
        .map(|node| (node.center().distance_squared(from), node.id))
        .filter(|(d, _)| *d <= max_sq)
        .min_by_key(|(d, id)| (*d, *id))
        .map(|(_, id)| id)
}

/// Return order to the nearest drop-off for `kind`, if one exists.
fn return_order(m: &Match, owner: PlayerIndex, kind: ResourceKind, from: Vec2Fixed, resume: ReturnTo) -> Option<Order> {
    find_dropoff(m, owner, kind, from).map(|building| Order::Return { building, resume })
}

/// Release farms whose farmer stopped working them.
fn release_abandoned_farms(m: &mut Match) {
    let stale: Vec<usize> = m
        .buildings
        .iter()
        .enumerate()
        .filter(|(_, b)| b.kind == BuildingType::Farm)
        .filter_map(|(i, farm)| {
            let farmer = farm.farmer?;
            let working = m.unit(farmer).is_some_and(|unit| match unit.order {
                Some(Order::Farm { building }) => building == farm.id,
                Some(Order::Return { resume: ReturnTo::Farm(id), .. }) => id == farm.id,
                _ => false,
            });
            (!working).then_some(i)
        })
        .collect();
    for i in stale {
        m.buildings[i].farmer = None;
    }
}

fn process_farmer(m: &mut Match, index: usize, farm_id: EntityId) {
    let content = m.content_arc();
    let unit = &m.units[index];
    if unit.kind != UnitType::Villager {
        m.units[index].order = None;
        return;
    }
    let Some(farm) = m.building(farm_id).filter(|b| b.kind == BuildingType::Farm) else {
        m.units[index].order = None;
        return;
    };
    if farm.under_construction {
        return;
    }
    if farm.farmer.is_some_and(|id| id != unit.id) {
        m.units[index].order = None;
        return;
    }
    let distance = distance_to_footprint(&content, farm, unit.position);
    let (unit_id, owner, position, carry) = (unit.id, unit.owner, unit.position, unit.carry);
    if let Some(farm) = m.building_mut(farm_id) {
        farm.farmer = Some(unit_id);
    }
    if distance > WORK_DISTANCE {
        return;
    }

    let capacity = carry_capacity(m, owner);
    let resume = ReturnTo::Farm(farm_id);
    if carry.kind.is_some_and(|k| k != ResourceKind::Food) {
        let order = carry.kind.and_then(|k| return_order(m, owner, k, position, resume));
        m.units[index].order = order;
        return;
    }
    let available = capacity - carry.amount;
    if available <= Fixed::ZERO {
        if let Some(order) = return_order(m, owner, ResourceKind::Food, position, resume) {
            m.units[index].order = Some(order);
        }
        return;
    }
    let amount = (gather_rate(m, &m.units[index], ResourceKind::Food) * DT).min(available);
    let unit = &mut m.units[index];
    unit.carry.kind = Some(ResourceKind::Food);
    unit.carry.amount += amount;
    if unit.carry.amount >= capacity {
        if let Some(order) = return_order(m, owner, ResourceKind::Food, position, resume) {
            m.units[index].order = Some(order);
        }
    }
}

/// Track approach progress and swap to a nearby node when stuck.
fn track_gather_stall(m: &mut Match, index: usize, node_id: EntityId, node_kind: ResourceKind, distance: Fixed) {
    if distance > REPLACEMENT_RADIUS {
        let stall = &mut m.units[index].gather_stall;
        stall.resource = Some(node_id);
        stall.best_distance = None;
        stall.timer = Fixed::ZERO;
        return;
    }
    let stall = &mut m.units[index].gather_stall;
    if stall.resource != Some(node_id) {
        stall.resource = Some(node_id);
        stall.best_distance = Some(distance);
        stall.timer = Fixed::ZERO;
        return;
    }
    let last = stall.best_distance.unwrap_or(distance);
    if distance < last - STALL_PROGRESS {
        stall.timer = Fixed::ZERO;
    } else {
        stall.timer += DT;
    }
    stall.best_distance = Some(distance);
    if stall.timer < STALL_SECONDS {
        return;
    }

    let position = m.units[index].position;
    let replacement = find_nearest_resource(m, position, &[node_kind], REPLACEMENT_RADIUS);
    let unit = &mut m.units[index];
    if let Some(other) = replacement.filter(|id| *id != node_id) {
        trace!(unit = unit.id, from = node_id, to = other, "gatherer switched to unblocked node");
        unit.order = Some(Order::Gather { resource: other });
    }
    unit.gather_stall.timer = Fixed::ZERO;
    unit.gather_stall.best_distance = None;
    unit.gather_stall.resource = Some(replacement.unwrap_or(node_id));
}

fn process_gatherer(m: &mut Match, index: usize, node_id: EntityId) {
    if m.units[index].kind != UnitType::Villager {
        m.units[index].order = None;
        return;
    }
    let Some(node_index) = m.resources.iter().position(|r| r.id == node_id) else {
        m.units[index].order = None;
        return;
    };
    let node = m.resources[node_index];
    let unit = &m.units[index];
    let target = Vec2Fixed::new(
        unit.position.x.clamp(node.position.x, node.position.x + fixed_int(node.size)),
        unit.position.y.clamp(node.position.y, node.position.y + fixed_int(node.size)),
    );
    let distance = target.distance(unit.position);
    if distance > WORK_DISTANCE {
        track_gather_stall(m, index, node_id, node.kind, distance);
        return;
    }
    let (owner, position, carry) = (unit.owner, unit.position, unit.carry);
    let stall = &mut m.units[index].gather_stall;
    stall.resource = Some(node_id);
    stall.best_distance = None;
    stall.timer = Fixed::ZERO;

    let resume = ReturnTo::Resource(node_id);
    let capacity = carry_capacity(m, owner);
    if let Some(carried) = carry.kind.filter(|k| *k != node.kind) {
        m.units[index].order = return_order(m, owner, carried, position, resume);
        return;
    }
    let available = capacity - carry.amount;
    if available <= Fixed::ZERO {
        m.units[index].order = return_order(m, owner, node.kind, position, resume);
        return;
    }
    let rate = gather_rate(m, &m.units[index], node.kind);
    let amount = node.amount.min(rate * DT).min(available);
    if amount <= Fixed::ZERO {
        return;
    }
    m.resources[node_index].amount -= amount;
    let unit = &mut m.units[index];
    unit.carry.kind = Some(node.kind);
    unit.carry.amount += amount;
    if unit.carry.amount >= capacity {
        m.units[index].order = return_order(m, owner, node.kind, position, resume);
    }

    if m.resources[node_index].is_depleted() {
        deplete_node(m, node_id, node.kind);
    }
}

/// Remove an exhausted node and move everyone still gathering it to a
/// nearby node of the same kind.
fn deplete_node(m: &mut Match, node_id: EntityId, kind: ResourceKind) {
    m.resources.retain(|r| r.id != node_id);
    trace!(node = node_id, "resource node depleted");
    for i in 0..m.units.len() {
        if !matches!(m.units[i].order, Some(Order::Gather { resource }) if resource == node_id) {
            continue;
        }
        let replacement = find_nearest_resource(m, m.units[i].position, &[kind], REPLACEMENT_RADIUS);
        m.units[i].order = replacement.map(|resource| Order::Gather { resource });
    }
}

/// Farm and gather phase.
pub fn process_gathering(m: &mut Match) {
    release_abandoned_farms(m);
    for i in 0..m.units.len() {
        match m.units[i].order {
            Some(Order::Farm { building }) => process_farmer(m, i, building),
            Some(Order::Gather { resource }) => process_gatherer(m, i, resource),
            _ => {}
        }
    }
}

/// Credit a drop-off to the owner, applying landmark conversions.
fn deposit(m: &mut Match, owner: PlayerIndex, building_id: EntityId, kind: ResourceKind, amount: Fixed) {
    let content = m.content_arc();
    let Some(building) = m.building(building_id) else {
        return;
    };
    let (building_kind, fountain_mode, landmark_tier) =
        (building.kind, building.fountain_mode, building.landmark_age_tier);
    let Some(player) = m.player_mut(owner) else {
        return;
    };
    let deposited = amount * dropoff_multiplier(&content, player, kind);
    if building_kind == BuildingType::GoldenFountainSquare {
        let convert = fountain_mode
            .filter(|k| *k != ResourceKind::Stone)
            .unwrap_or(ResourceKind::Food);
        player.resources.add(convert, deposited);
    } else {
        player.resources.add(kind, deposited);
    }
    if building_kind == BuildingType::OldMarketPavilion && kind == ResourceKind::Food {
        let tier = landmark_tier.unwrap_or(1);
        let bonus = by_age(&content.landmark_bonuses.old_market.food_to_gold_by_age, tier);
        if bonus > Fixed::ZERO {
            player.resources.add(ResourceKind::Gold, deposited * bonus);
        }
    }
}

fn process_returner(m: &mut Match, index: usize, building_id: EntityId, resume: ReturnTo) {
    let content = m.content_arc();
    let unit = &m.units[index];
    let (owner, position, carry) = (unit.owner, unit.position, unit.carry);
    let Some(building) = m.building(building_id).filter(|b| is_functional(&content, b)) else {
        let replacement = carry.kind.and_then(|kind| find_dropoff(m, owner, kind, position));
        m.units[index].order = replacement.map(|building| Order::Return { building, resume });
        return;
    };
    if distance_to_footprint(&content, building, position) > WORK_DISTANCE {
        return;
    }

    if let Some(kind) = carry.kind.filter(|_| carry.amount > Fixed::ZERO) {
        deposit(m, owner, building_id, kind, carry.amount);
        m.units[index].carry.clear();
    }

    let unit_id = m.units[index].id;
    let next = match resume {
        ReturnTo::Farm(farm_id) => match m.building_mut(farm_id) {
            Some(farm) if farm.kind == BuildingType::Farm && farm.farmer.map_or(true, |f| f == unit_id) => {
                farm.farmer = Some(unit_id);
                Some(Order::Farm { building: farm_id })
            }
            _ => None,
        },
        ReturnTo::Resource(node) => m.resource(node).map(|_| Order::Gather { resource: node }),
        ReturnTo::Nothing => None,
    };
    m.units[index].order = next;
}

/// Drop-off phase.
pub fn process_returns(m: &mut Match) {
    for i in 0..m.units.len() {
        if let Some(Order::Return { building, resume }) = m.units[i].order {
            process_returner(m, i, building, resume);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::ResourceNodeType;
    use crate::test_support::{create_test_match, place_building, place_resource, place_unit};

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn pos(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(fixed(x), fixed(y))
    }

    #[test]
    fn test_stockpile_spend_and_refund() {
        let mut stock = Stockpile::new(200, 200, 0, 0);
        let cost = Stockpile::new(0, 75, 0, 0);
        stock.spend(&cost).unwrap();
        assert_eq!(stock.wood, fixed(125));
        stock.refund(&cost);
        assert_eq!(stock, Stockpile::new(200, 200, 0, 0));
    }

    #[test]
    fn test_stockpile_spend_is_all_or_nothing() {
        let mut stock = Stockpile::new(50, 500, 0, 0);
        let before = stock;
        let err = stock.spend(&Stockpile::new(60, 20, 0, 0)).unwrap_err();
        assert!(matches!(err, GameError::InsufficientResources));
        assert_eq!(stock, before);
    }

    #[test]
    fn test_scaled_rounds_and_clamps() {
        let cost = Stockpile::new(60, 20, 0, 0).scaled(Fixed::from_num(0.9));
        assert_eq!(cost.food, fixed(54));
        assert_eq!(cost.wood, fixed(18));
        let negative = Stockpile {
            food: fixed(-5),
            ..Stockpile::ZERO
        };
        assert_eq!(negative.normalized().food, Fixed::ZERO);
    }

    #[test]
    fn test_villager_gathers_and_returns() {
        let mut m = create_test_match(2);
        let tc = m.players[0].starting_town_center.unwrap();
        let tc_pos = m.building(tc).unwrap().position;
        let node = place_resource(&mut m, ResourceNodeType::Berry, tc_pos + pos(5, 0));
        let spot = tc_pos + pos(5, 0) + Vec2Fixed::new(Fixed::from_num(0.5), Fixed::from_num(0.5));
        let villager = place_unit(&mut m, 0, UnitType::Villager, spot);
        m.unit_mut(villager).unwrap().order = Some(Order::Gather { resource: node });

        for _ in 0..(20 * 11) {
            process_gathering(&mut m);
        }
        let unit = m.unit(villager).unwrap();
        assert_eq!(unit.carry.kind, Some(ResourceKind::Food));
        assert!(matches!(
            unit.order,
            Some(Order::Return { building, resume: ReturnTo::Resource(id) }) if building == tc && id == node
        ));
    }

    #[test]
    fn test_drop_off_credits_owner_and_resumes() {
        let mut m = create_test_match(2);
        let tc = m.players[0].starting_town_center.unwrap();
        let tc_pos = m.building(tc).unwrap().position;
        let node = place_resource(&mut m, ResourceNodeType::Tree, tc_pos + pos(6, 0));
        let villager = place_unit(&mut m, 0, UnitType::Villager, tc_pos + pos(4, 1));
        {
            let unit = m.unit_mut(villager).unwrap();
            unit.carry.kind = Some(ResourceKind::Wood);
            unit.carry.amount = fixed(10);
            unit.order = Some(Order::Return {
                building: tc,
                resume: ReturnTo::Resource(node),
            });
        }
        let before = m.players[0].resources.wood;
        process_returns(&mut m);
        assert_eq!(m.players[0].resources.wood, before + fixed(10));
        let unit = m.unit(villager).unwrap();
        assert!(unit.carry.is_empty());
        assert_eq!(unit.order, Some(Order::Gather { resource: node }));
    }

    #[test]
    fn test_depleted_node_reassigns_gatherers() {
        let mut m = create_test_match(2);
        m.resources.clear();
        let a = place_resource(&mut m, ResourceNodeType::Berry, pos(50, 50));
        let b = place_resource(&mut m, ResourceNodeType::Berry, pos(52, 50));
        m.resources.iter_mut().find(|r| r.id == a).unwrap().amount = Fixed::from_num(0.01);
        let first = place_unit(&mut m, 0, UnitType::Villager, Vec2Fixed::new(Fixed::from_num(50.5), Fixed::from_num(50.5)));
        let second = place_unit(&mut m, 0, UnitType::Villager, Vec2Fixed::new(Fixed::from_num(50.5), Fixed::from_num(51.2)));
        for id in [first, second] {
            m.unit_mut(id).unwrap().order = Some(Order::Gather { resource: a });
        }
        process_gathering(&mut m);
        assert!(m.resource(a).is_none());
        assert_eq!(m.unit(second).unwrap().order, Some(Order::Gather { resource: b }));
    }

    #[test]
    fn test_fountain_converts_drop_off() {
        let mut m = create_test_match(2);
        let fountain = place_building(&mut m, Some(0), BuildingType::GoldenFountainSquare, pos(40, 40));
        m.building_mut(fountain).unwrap().fountain_mode = Some(ResourceKind::Gold);
        let gold_before = m.players[0].resources.gold;
        deposit(&mut m, 0, fountain, ResourceKind::Wood, fixed(10));
        assert_eq!(m.players[0].resources.gold, gold_before + fixed(10));
    }
}
