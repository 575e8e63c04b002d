//! Monk healing and landmark healing auras.

use crate::buildings::{center, is_destroyed_landmark};
use crate::data::by_age;
use crate::entities::{EntityId, PlayerIndex};
use crate::kinds::{BuildingType, UnitType};
use crate::math::{fixed_int, Fixed, Vec2Fixed};
use crate::orders::Order;
use crate::state::{Match, DT, TICK_RATE};
use crate::stats::landmark_tier;

/// Monks heal within this distance of their patient.
pub const HEAL_RANGE: Fixed = fixed_int(2);

/// Idle monks look for damaged allies this far away.
pub const AUTO_HEAL_RADIUS: Fixed = fixed_int(5);

/// Healing per second out of combat.
pub const HEAL_RATE: Fixed = fixed_int(10);

/// Healing per second on a unit that fought recently.
pub const COMBAT_HEAL_RATE: Fixed = fixed_int(5);

/// Seconds after its last hit a unit counts as in combat.
pub const COMBAT_MEMORY_SECONDS: u64 = 5;

fn in_combat(m: &Match, last_combat_tick: Option<u64>) -> bool {
    last_combat_tick.is_some_and(|t| m.tick.saturating_sub(t) <= COMBAT_MEMORY_SECONDS * TICK_RATE)
}

/// Nearest damaged, non-siege friendly unit within `radius`.
fn find_patient(m: &Match, healer: EntityId, owner: PlayerIndex, from: Vec2Fixed, radius: Fixed) -> Option<EntityId> {
    let content = m.content();
    m.units
        .iter()
        .filter(|u| u.id != healer && u.owner == owner && u.is_alive() && u.is_damaged())
        .filter(|u| !content.unit(u.kind).is_siege())
        .map(|u| (u.position.distance(from), u.id))
        .filter(|(d, _)| *d <= radius)
        .min()
        .map(|(_, id)| id)
}

fn is_valid_patient(m: &Match, healer: EntityId, owner: PlayerIndex, target: EntityId) -> bool {
    m.unit(target).is_some_and(|u| {
        u.id != healer && u.owner == owner && u.is_alive() && !m.content().unit(u.kind).is_siege()
    })
}

fn monk_heal(m: &mut Match, index: usize) {
    let monk = &m.units[index];
    if monk.relic.is_some() || !monk.is_alive() {
        return;
    }
    let (id, owner, position) = (monk.id, monk.owner, monk.position);
    let (mut target, manual) = match monk.order {
        None => (None, false),
        Some(Order::Heal { target, manual }) => (Some(target), manual),
        Some(_) => return,
    };
    if target.is_some_and(|t| !is_valid_patient(m, id, owner, t)) {
        target = None;
        m.units[index].order = None;
    }
    let target = match target {
        Some(target) => target,
        None => {
            let Some(found) = find_patient(m, id, owner, position, AUTO_HEAL_RADIUS) else {
                return;
            };
            m.units[index].order = Some(Order::Heal {
                target: found,
                manual: false,
            });
            found
        }
    };

    let Some(patient) = m.unit(target) else {
        return;
    };
    if !patient.is_damaged() {
        if !manual {
            m.units[index].order = None;
        }
        return;
    }
    if patient.position.distance(position) > HEAL_RANGE {
        return;
    }
    let rate = if in_combat(m, patient.last_combat_tick) {
        COMBAT_HEAL_RATE
    } else {
        HEAL_RATE
    };
    if let Some(patient) = m.unit_mut(target) {
        patient.hp = (patient.hp + rate * DT).min(patient.max_hp);
    }
    m.units[index].is_healing = true;
}

/// Aura healing per second a unit receives from its owner's landmarks.
fn aura_rate(m: &Match, owner: PlayerIndex, position: Vec2Fixed, last_combat_tick: Option<u64>) -> Fixed {
    let content = m.content();
    let bonuses = &content.landmark_bonuses;
    let mut sanctum = Fixed::ZERO;
    let mut basilica = Fixed::ZERO;
    for b in m.buildings.iter().filter(|b| b.is_owned_by(owner) && !b.under_construction) {
        if is_destroyed_landmark(content, b) {
            continue;
        }
        let distance = center(content, b).distance(position);
        let tier = landmark_tier(m, b).unwrap_or(1);
        match b.kind {
            BuildingType::SanctumOfTheVeil => {
                if distance <= bonuses.sanctum.aura_range && !in_combat(m, last_combat_tick) {
                    sanctum = sanctum.max(by_age(&bonuses.sanctum.aura_heal_by_age, tier));
                }
            }
            BuildingType::BasilicaOfEternalLight => {
                if distance <= bonuses.basilica.aura_range {
                    basilica = basilica.max(by_age(&bonuses.basilica.aura_heal_by_age, tier));
                }
            }
            _ => {}
        }
    }
    sanctum + basilica
}

/// Healing phase: monks first, then landmark auras.
pub fn process_healing(m: &mut Match) {
    for u in m.units.iter_mut().filter(|u| u.kind == UnitType::Monk) {
        u.is_healing = false;
    }
    for i in 0..m.units.len() {
        if m.units[i].kind == UnitType::Monk {
            monk_heal(m, i);
        }
    }
    for i in 0..m.units.len() {
        let u = &m.units[i];
        if !u.is_alive() || !u.is_damaged() {
            continue;
        }
        let rate = aura_rate(m, u.owner, u.position, u.last_combat_tick);
        if rate > Fixed::ZERO {
            let u = &mut m.units[i];
            u.hp = (u.hp + rate * DT).min(u.max_hp);
        }
    }
}
