//! Entity creation: units, buildings, spawning next to a building and
//! releasing a garrison.

use tracing::trace;

use crate::buildings::{building_at, center, footprint_size};
use crate::data::by_age;
use crate::entities::{Building, EntityId, PlayerIndex, Relic, RelicHolder, ResourceNode, TradeLeg, Unit};
use crate::kinds::{BuildingType, ResourceNodeType, UnitType};
use crate::math::{fixed_ratio, Fixed, Vec2Fixed};
use crate::orders::Order;
use crate::state::Match;
use crate::stats::{building_build_time, building_max_hp, landmark_tier, unit_stats};
use crate::trading::start_leg;

/// Gap between a building edge and a freshly spawned unit.
const SPAWN_GAP: Fixed = fixed_ratio(6, 10);

/// Units never spawn closer than this to the far map edges.
const SPAWN_EDGE_MARGIN: Fixed = fixed_ratio(2, 10);

/// Create a unit at full effective health and add it to the match.
pub fn spawn_unit(m: &mut Match, owner: PlayerIndex, kind: UnitType, position: Vec2Fixed) -> EntityId {
    let max_hp = unit_stats(m.content(), m.player(owner), kind).health;
    let id = m.allocate_id();
    m.units.push(Unit::new(id, owner, kind, position, max_hp));
    trace!(id, ?kind, owner, "unit spawned");
    id
}

/// Create a completed building and add it to the match.
pub fn spawn_building(m: &mut Match, owner: Option<PlayerIndex>, kind: BuildingType, position: Vec2Fixed) -> EntityId {
    let max_hp = building_max_hp(m, owner, kind);
    let build_time = building_build_time(m.content(), owner.and_then(|o| m.player(o)), kind);
    let id = m.allocate_id();
    m.buildings.push(Building::new(id, owner, kind, position, max_hp, build_time));
    id
}

/// Create a full resource node with its corner at `position`.
pub fn spawn_resource(m: &mut Match, node_type: ResourceNodeType, position: Vec2Fixed) -> EntityId {
    let data = m.content().resource(node_type);
    let (kind, size, amount) = (data.kind, data.size, data.amount);
    let id = m.allocate_id();
    m.resources.push(ResourceNode {
        id,
        node_type,
        kind,
        position,
        size,
        amount,
    });
    id
}

/// Create a relic lying on the ground.
pub fn spawn_relic(m: &mut Match, position: Vec2Fixed) -> EntityId {
    let id = m.allocate_id();
    m.relics.push(Relic {
        id,
        position,
        holder: RelicHolder::Ground,
    });
    id
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Right,
    Left,
    Bottom,
    Top,
}

impl Side {
    fn offset(self, size: Fixed) -> Vec2Fixed {
        let half = size / 2;
        match self {
            Self::Right => Vec2Fixed::new(size + SPAWN_GAP, half),
            Self::Left => Vec2Fixed::new(-SPAWN_GAP, half),
            Self::Bottom => Vec2Fixed::new(half, size + SPAWN_GAP),
            Self::Top => Vec2Fixed::new(half, -SPAWN_GAP),
        }
    }
}

/// Spawn sides in preference order: towards the rally point first.
fn side_order(from: Vec2Fixed, rally: Option<Vec2Fixed>) -> [Side; 4] {
    let Some(rally) = rally else {
        return [Side::Right, Side::Left, Side::Bottom, Side::Top];
    };
    let delta = rally - from;
    let (h, h_opp) = if delta.x >= Fixed::ZERO {
        (Side::Right, Side::Left)
    } else {
        (Side::Left, Side::Right)
    };
    let (v, v_opp) = if delta.y >= Fixed::ZERO {
        (Side::Bottom, Side::Top)
    } else {
        (Side::Top, Side::Bottom)
    };
    if delta.x.abs() >= delta.y.abs() {
        [h, v, v_opp, h_opp]
    } else {
        [v, h, h_opp, v_opp]
    }
}

/// Extra health for infantry trained at the military landmark.
fn apply_spawn_modifiers(m: &mut Match, building: EntityId, unit: EntityId) {
    let content = m.content_arc();
    let Some(b) = m.building(building) else {
        return;
    };
    if b.kind != BuildingType::ArgentThroneComplex {
        return;
    }
    let tier = landmark_tier(m, b).unwrap_or(1);
    let bonus = by_age(&content.landmark_bonuses.argent.infantry_health_bonus_by_age, tier);
    let Some(u) = m.unit_mut(unit) else {
        return;
    };
    if bonus <= Fixed::ZERO || !content.unit(u.kind).is_infantry() {
        return;
    }
    let multiplier = Fixed::ONE + bonus;
    u.bonus_hp_multiplier *= multiplier;
    u.max_hp *= multiplier;
    u.hp *= multiplier;
}

/// Wire a new trader to the market it came from and the trade post under the
/// rally point.
fn setup_trader(m: &mut Match, building: EntityId, unit: EntityId) {
    let Some(b) = m.building(building) else {
        return;
    };
    let home = (b.kind == BuildingType::Market).then_some(b.id);
    let dest = b
        .rally
        .and_then(|r| building_at(m, r.position))
        .filter(|id| m.building(*id).is_some_and(|t| t.kind == BuildingType::TradePost));
    let Some(trade) = m.unit_mut(unit).and_then(|u| u.trade.as_mut()) else {
        return;
    };
    if home.is_some() {
        trade.home = home;
    }
    if dest.is_some() {
        trade.dest = dest;
    }
    if trade.home.is_some() && trade.dest.is_some() {
        start_leg(m, unit, TradeLeg::ToDest);
    }
}

/// Spawn a unit beside a building, on the first side that lies on the map.
///
/// Returns `None` only if the building no longer exists.
pub fn spawn_unit_near_building(m: &mut Match, building: EntityId, kind: UnitType) -> Option<EntityId> {
    let b = m.building(building)?;
    let owner = b.owner?;
    let size = footprint_size(m.content(), b.kind);
    let rally = b.rally.map(|r| r.position);
    let sides = side_order(center(m.content(), b), rally);
    let origin = b.position;
    let (max_x, max_y) = (m.width() - SPAWN_EDGE_MARGIN, m.height() - SPAWN_EDGE_MARGIN);

    let on_map = |p: Vec2Fixed| p.x >= Fixed::ZERO && p.y >= Fixed::ZERO && p.x <= max_x && p.y <= max_y;
    let position = sides
        .iter()
        .map(|side| origin + side.offset(size))
        .find(|p| on_map(*p))
        .unwrap_or_else(|| m.clamp_to_map(origin + sides[0].offset(size), SPAWN_EDGE_MARGIN));

    let unit = spawn_unit(m, owner, kind, position);
    apply_spawn_modifiers(m, building, unit);
    if kind == UnitType::Trader {
        setup_trader(m, building, unit);
    }
    Some(unit)
}

/// Release up to `count` garrisoned units, oldest first, sending each to the
/// rally point.
pub fn ungarrison(m: &mut Match, building: EntityId, count: usize) -> Vec<EntityId> {
    let Some(b) = m.building_mut(building) else {
        return Vec::new();
    };
    let take = count.min(b.garrison.len());
    let released: Vec<_> = b.garrison.drain(..take).collect();
    let rally = b.rally;

    let mut spawned = Vec::with_capacity(released.len());
    for slot in released {
        let Some(id) = spawn_unit_near_building(m, building, slot.kind) else {
            continue;
        };
        if let (Some(rally), Some(unit)) = (rally, m.unit_mut(id)) {
            unit.order = Some(match rally.resource {
                Some(resource) if unit.kind == UnitType::Villager => Order::Gather { resource },
                _ => Order::Move {
                    target: rally.position,
                    formation: None,
                },
            });
        }
        spawned.push(id);
    }
    spawned
}
