//! Unit orders, the per-unit order queue and formations.
//!
//! A unit holds at most one active [`Order`] plus a FIFO of pending ones.
//! Commands with `queue: true` append; without it they replace everything.

use serde::{Deserialize, Serialize};

use crate::entities::{EntityId, EntityRef, Unit};
use crate::kinds::UnitType;
use crate::math::{fixed_int, fixed_ratio, fixed_serde, fixed_sqrt, Fixed, Vec2Fixed};
use crate::state::Match;

/// Grid spacing between formation slots.
pub const FORMATION_SPACING: Fixed = fixed_ratio(65, 100);

/// Maximum centroid spread of a selection that still moves in formation.
pub const FORMATION_SPREAD: Fixed = fixed_int(6);

/// A unit's place in a formation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormationSlot {
    /// Formation id shared by the group.
    pub id: u64,
    /// Offset added to the shared destination.
    pub offset: Vec2Fixed,
    /// Shared speed (slowest member).
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
}

/// What a villager does after dropping off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnTo {
    /// Go idle.
    Nothing,
    /// Resume gathering this node.
    Resource(EntityId),
    /// Resume working this farm.
    Farm(EntityId),
}

/// A unit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    /// Walk to a point.
    Move {
        /// Destination.
        target: Vec2Fixed,
        /// Formation slot, if moving as a group.
        formation: Option<FormationSlot>,
    },
    /// Walk to a point, stopping to fight anything in range.
    AttackMove {
        /// Destination.
        target: Vec2Fixed,
        /// Formation slot, if moving as a group.
        formation: Option<FormationSlot>,
    },
    /// Attack one entity.
    Attack {
        /// Target.
        target: EntityRef,
        /// Player-issued; dropped when a unit target leaves vision.
        manual: bool,
    },
    /// Gather a resource node.
    Gather {
        /// Node id.
        resource: EntityId,
    },
    /// Carry resources to a drop-off.
    Return {
        /// Drop-off building.
        building: EntityId,
        /// Follow-up once emptied.
        resume: ReturnTo,
    },
    /// Construct a building.
    Build {
        /// Building under construction.
        building: EntityId,
    },
    /// Repair a building or a siege unit.
    Repair {
        /// Repair target.
        target: EntityRef,
    },
    /// Work a farm.
    Farm {
        /// Farm id.
        building: EntityId,
    },
    /// Enter a building.
    Garrison {
        /// Building id.
        building: EntityId,
    },
    /// Pick up a relic from the ground.
    PickupRelic {
        /// Relic id.
        relic: EntityId,
    },
    /// Store the carried relic in a building.
    DepositRelic {
        /// Building id.
        building: EntityId,
    },
    /// Take a stored relic out of a building.
    TakeRelic {
        /// Building id.
        building: EntityId,
    },
    /// Drop the carried relic at a point.
    DropRelic {
        /// Drop point.
        target: Vec2Fixed,
    },
    /// Heal a friendly unit.
    Heal {
        /// Unit id.
        target: EntityId,
        /// Player-issued rather than auto-acquired.
        manual: bool,
    },
    /// Walk a trade leg.
    Trade {
        /// Market or trade post.
        building: EntityId,
    },
}

impl Order {
    /// Wire name of the order type.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Move { .. } => "move",
            Self::AttackMove { .. } => "attackMove",
            Self::Attack { .. } => "attack",
            Self::Gather { .. } => "gather",
            Self::Return { .. } => "return",
            Self::Build { .. } => "build",
            Self::Repair { .. } => "repair",
            Self::Farm { .. } => "farm",
            Self::Garrison { .. } => "garrison",
            Self::PickupRelic { .. } => "pickupRelic",
            Self::DepositRelic { .. } => "depositRelic",
            Self::TakeRelic { .. } => "takeRelic",
            Self::DropRelic { .. } => "dropRelic",
            Self::Heal { .. } => "heal",
            Self::Trade { .. } => "trade",
        }
    }

    /// Formation slot of a group move.
    #[must_use]
    pub const fn formation(&self) -> Option<FormationSlot> {
        match self {
            Self::Move { formation, .. } | Self::AttackMove { formation, .. } => *formation,
            _ => None,
        }
    }

    /// Units on these orders are about to move and never block paths.
    #[must_use]
    pub const fn is_in_transit(&self) -> bool {
        matches!(
            self,
            Self::Move { .. } | Self::AttackMove { .. } | Self::Build { .. } | Self::Repair { .. }
        )
    }

    /// Point target, if any.
    #[must_use]
    pub const fn target_point(&self) -> Option<Vec2Fixed> {
        match self {
            Self::Move { target, .. } | Self::AttackMove { target, .. } | Self::DropRelic { target } => {
                Some(*target)
            }
            _ => None,
        }
    }

    fn strip_formation(&mut self) {
        if let Self::Move { formation, .. } | Self::AttackMove { formation, .. } = self {
            *formation = None;
        }
    }
}

/// Apply the immediate effects of an order becoming active.
fn apply_side_effects(unit: &mut Unit, order: &Order) {
    match order {
        Order::Move { .. } | Order::AttackMove { .. } => {
            unit.attack_target = None;
            if matches!(order, Order::Move { .. }) && unit.kind == UnitType::Trader {
                if let Some(trade) = unit.trade.as_mut() {
                    trade.paused = true;
                }
            }
        }
        Order::Attack { target, .. } => unit.attack_target = Some(*target),
        _ => {}
    }
}

/// Give a unit an order.
///
/// Without `queue` the active order and the pending queue are replaced. With
/// `queue` the order is appended, and an idle unit starts the oldest pending
/// order straight away.
pub fn issue(unit: &mut Unit, order: Order, queue: bool) {
    if queue && unit.order.is_some() {
        unit.order_queue.push_back(order);
        return;
    }
    if queue && !unit.order_queue.is_empty() {
        unit.order_queue.push_back(order);
        activate_next(unit);
        return;
    }
    unit.order_queue.clear();
    apply_side_effects(unit, &order);
    unit.order = Some(order);
}

/// Start the next pending order of an idle unit.
pub fn activate_next(unit: &mut Unit) {
    if unit.order.is_some() {
        return;
    }
    if let Some(next) = unit.order_queue.pop_front() {
        apply_side_effects(unit, &next);
        unit.order = Some(next);
    }
}

/// Order activation phase.
pub fn activate_queued_orders(m: &mut Match) {
    for unit in &mut m.units {
        activate_next(unit);
    }
}

/// Nearest-square grid offsets for `count` units, centred on the origin.
#[must_use]
pub fn formation_offsets(count: usize) -> Vec<Vec2Fixed> {
    if count == 0 {
        return Vec::new();
    }
    let cols = (1..=count).find(|c| c * c >= count).unwrap_or(count);
    let rows = count.div_ceil(cols);
    // Centre offsets are whole or half steps, so compute in half-spacings.
    let half = FORMATION_SPACING / 2;
    let to_fixed = |n: usize| Fixed::from_num(n);
    (0..count)
        .map(|i| {
            let (row, col) = (i / cols, i % cols);
            let x = (to_fixed(col * 2) - to_fixed(cols - 1)) * half;
            let y = (to_fixed(row * 2) - to_fixed(rows - 1)) * half;
            Vec2Fixed::new(x, y)
        })
        .collect()
}

/// Check if every position lies within `max_distance` of their centroid.
#[must_use]
pub fn units_nearby(positions: &[Vec2Fixed], max_distance: Fixed) -> bool {
    if positions.is_empty() {
        return false;
    }
    let count = Fixed::from_num(positions.len());
    let sum = positions.iter().fold(Vec2Fixed::ZERO, |acc, p| acc + *p);
    let center = Vec2Fixed::new(sum.x / count, sum.y / count);
    positions
        .iter()
        .all(|p| fixed_sqrt(p.distance_squared(center)) <= max_distance)
}

/// Strip a formation from every unit still marching in it.
pub fn break_formation(m: &mut Match, formation_id: u64) {
    for unit in &mut m.units {
        if let Some(order) = unit.order.as_mut() {
            if order.formation().is_some_and(|f| f.id == formation_id) {
                order.strip_formation();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn create_test_unit() -> Unit {
        Unit::new(1, 0, UnitType::Spearman, Vec2Fixed::ZERO, fixed(80))
    }

    fn move_to(x: i32, y: i32) -> Order {
        Order::Move {
            target: Vec2Fixed::new(fixed(x), fixed(y)),
            formation: None,
        }
    }

    #[test]
    fn test_issue_without_queue_replaces_everything() {
        let mut unit = create_test_unit();
        issue(&mut unit, move_to(1, 1), false);
        issue(&mut unit, move_to(2, 2), true);
        issue(&mut unit, move_to(3, 3), false);
        assert_eq!(unit.order, Some(move_to(3, 3)));
        assert!(unit.order_queue.is_empty());
    }

    #[test]
    fn test_queue_on_idle_unit_starts_immediately() {
        let mut unit = create_test_unit();
        issue(&mut unit, move_to(5, 5), true);
        assert_eq!(unit.order, Some(move_to(5, 5)));
        assert!(unit.order_queue.is_empty());
    }

    #[test]
    fn test_queue_appends_behind_active_order() {
        let mut unit = create_test_unit();
        issue(&mut unit, move_to(1, 1), false);
        issue(&mut unit, move_to(2, 2), true);
        issue(&mut unit, move_to(3, 3), true);
        assert_eq!(unit.order_queue.len(), 2);
        unit.order = None;
        activate_next(&mut unit);
        assert_eq!(unit.order, Some(move_to(2, 2)));
    }

    #[test]
    fn test_move_clears_attack_target_and_pauses_trade() {
        let mut unit = create_test_unit();
        issue(
            &mut unit,
            Order::Attack {
                target: EntityRef::Unit(9),
                manual: true,
            },
            false,
        );
        assert_eq!(unit.attack_target, Some(EntityRef::Unit(9)));
        issue(&mut unit, move_to(1, 1), false);
        assert_eq!(unit.attack_target, None);

        let mut trader = Unit::new(2, 0, UnitType::Trader, Vec2Fixed::ZERO, fixed(60));
        issue(&mut trader, move_to(4, 4), false);
        assert!(trader.trade.unwrap().paused);
    }

    #[test]
    fn test_formation_offsets_form_a_centred_grid() {
        let offsets = formation_offsets(4);
        assert_eq!(offsets.len(), 4);
        let half = FORMATION_SPACING / 2;
        assert_eq!(offsets[0], Vec2Fixed::new(-half, -half));
        assert_eq!(offsets[3], Vec2Fixed::new(half, half));
        let sum = offsets.iter().fold(Vec2Fixed::ZERO, |acc, o| acc + *o);
        assert_eq!(sum, Vec2Fixed::ZERO);
        assert_eq!(formation_offsets(1), vec![Vec2Fixed::ZERO]);
    }

    #[test]
    fn test_units_nearby_uses_centroid_spread() {
        let close = [Vec2Fixed::new(fixed(10), fixed(10)), Vec2Fixed::new(fixed(14), fixed(10))];
        assert!(units_nearby(&close, FORMATION_SPREAD));
        let far = [Vec2Fixed::new(fixed(10), fixed(10)), Vec2Fixed::new(fixed(30), fixed(10))];
        assert!(!units_nearby(&far, FORMATION_SPREAD));
        assert!(!units_nearby(&[], FORMATION_SPREAD));
    }
}
