//! Relic handling: pickup, storage, dropping and relic income.
//!
//! A relic is on the ground, carried by one monk, or stored in one building.
//! Every transition here updates the relic and its holder together.

use tracing::trace;

use crate::buildings::{center, is_destroyed_landmark, relic_capacity};
use crate::data::bonus_index;
use crate::economy::Stockpile;
use crate::entities::{EntityId, PlayerIndex, RelicHolder};
use crate::kinds::{BuildingType, ResourceKind};
use crate::math::{fixed_int, Fixed, Vec2Fixed};
use crate::state::{Match, DT};
use crate::stats::landmark_tier;

/// Minimum age tier to handle relics.
pub const RELIC_MIN_AGE: u8 = 2;

/// Seconds between relic payouts.
pub const RELIC_INCOME_INTERVAL: Fixed = fixed_int(3);

/// Check if a player may pick up relics.
#[must_use]
pub fn can_handle_relics(m: &Match, owner: PlayerIndex) -> bool {
    m.player(owner).is_some_and(|p| p.age_tier >= RELIC_MIN_AGE)
}

/// Monk picks a free relic off the ground.
pub fn pick_up(m: &mut Match, unit: EntityId, relic: EntityId) -> bool {
    let free = m.relic(relic).is_some_and(|r| r.is_free());
    let empty_handed = m.unit(unit).is_some_and(|u| u.relic.is_none());
    if !free || !empty_handed {
        return false;
    }
    if let Some(r) = m.relic_mut(relic) {
        r.holder = RelicHolder::Carried(unit);
    }
    if let Some(u) = m.unit_mut(unit) {
        u.relic = Some(relic);
    }
    true
}

/// Store a monk's relic in a building with free relic slots.
pub fn deposit(m: &mut Match, unit: EntityId, building: EntityId) -> bool {
    let content = m.content_arc();
    let Some(relic) = m.unit(unit).and_then(|u| u.relic) else {
        return false;
    };
    if m.relic(relic).and_then(|r| r.carrier()) != Some(unit) {
        return false;
    }
    let Some(b) = m.building(building) else {
        return false;
    };
    if b.relics.len() >= relic_capacity(&content, b.kind) {
        return false;
    }
    let spot = center(&content, b);
    if let Some(b) = m.building_mut(building) {
        b.relics.push(relic);
    }
    if let Some(r) = m.relic_mut(relic) {
        r.holder = RelicHolder::Stored(building);
        r.position = spot;
    }
    if let Some(u) = m.unit_mut(unit) {
        u.relic = None;
    }
    trace!(relic, building, "relic stored");
    true
}

/// Take the oldest stored relic out of a building.
pub fn take(m: &mut Match, unit: EntityId, building: EntityId) -> bool {
    if m.unit(unit).map_or(true, |u| u.relic.is_some()) {
        return false;
    }
    let Some(b) = m.building_mut(building) else {
        return false;
    };
    if b.relics.is_empty() {
        return false;
    }
    let relic = b.relics.remove(0);
    let Some(r) = m.relic_mut(relic) else {
        return false;
    };
    r.holder = RelicHolder::Carried(unit);
    if let Some(u) = m.unit_mut(unit) {
        u.relic = Some(relic);
    }
    true
}

/// Put a carried relic down at `position`.
pub fn drop_at(m: &mut Match, unit: EntityId, position: Vec2Fixed) {
    let Some(relic) = m.unit_mut(unit).and_then(|u| u.relic.take()) else {
        return;
    };
    if let Some(r) = m.relic_mut(relic) {
        if r.carrier() == Some(unit) {
            r.holder = RelicHolder::Ground;
            r.position = position;
        }
    }
}

/// Drop whatever relic a dying unit carries where it stands.
pub fn drop_carried(m: &mut Match, unit: EntityId) {
    if let Some(position) = m.unit(unit).map(|u| u.position) {
        drop_at(m, unit, position);
    }
}

/// Release the relics of a removed building onto the ground at its centre.
pub fn release_stored(m: &mut Match, building: EntityId) {
    let content = m.content_arc();
    let Some(b) = m.building_mut(building) else {
        return;
    };
    let relics = std::mem::take(&mut b.relics);
    let spot = center(&content, b);
    for relic in relics {
        if let Some(r) = m.relic_mut(relic) {
            r.holder = RelicHolder::Ground;
            r.position = spot;
        }
    }
}

/// Relic income phase.
///
/// Relic buildings pay per held relic every interval. The timer resets while
/// the building holds nothing.
pub fn process_relic_income(m: &mut Match) {
    let content = m.content_arc();
    for i in 0..m.buildings.len() {
        let b = &m.buildings[i];
        let data = content.building(b.kind);
        let evermist = b.kind == BuildingType::EvermistGardens;
        if data.relic_gold.is_none() && !evermist {
            continue;
        }
        if b.under_construction || is_destroyed_landmark(&content, b) {
            continue;
        }
        let count = b.relics.len();
        if count == 0 {
            m.buildings[i].relic_timer = Fixed::ZERO;
            continue;
        }
        let tier = landmark_tier(m, b).unwrap_or(1);
        let owner = b.owner;

        let timer = &mut m.buildings[i].relic_timer;
        *timer += DT;
        if *timer < RELIC_INCOME_INTERVAL {
            continue;
        }
        let payouts = (*timer / RELIC_INCOME_INTERVAL).floor();
        *timer -= payouts * RELIC_INCOME_INTERVAL;

        let factor = payouts * Fixed::from_num(count);
        let income = if evermist {
            content
                .landmark_bonuses
                .evermist
                .income_per_minute_by_age
                .get(bonus_index(tier))
                .copied()
                .unwrap_or(Stockpile::ZERO)
                .scaled(factor * RELIC_INCOME_INTERVAL / 60)
        } else {
            let gold = data.relic_gold.unwrap_or(Fixed::ZERO);
            Stockpile::of(ResourceKind::Gold, gold * factor)
        };
        if let Some(player) = owner.and_then(|o| m.player_mut(o)) {
            player.resources += income;
        }
        trace!(building = m.buildings[i].id, relics = count, "relic income paid");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::UnitType;
    use crate::test_support::{create_test_match, place_building, place_relic, place_unit};

    fn pos(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(fixed_int(x), fixed_int(y))
    }

    #[test]
    fn test_relic_lifecycle_keeps_one_holder() {
        let mut m = create_test_match(2);
        let monk = place_unit(&mut m, 0, UnitType::Monk, pos(50, 50));
        let relic = place_relic(&mut m, pos(50, 50));
        let monastery = place_building(&mut m, Some(0), BuildingType::Monastery, pos(52, 50));

        assert!(pick_up(&mut m, monk, relic));
        assert_eq!(m.relic(relic).unwrap().carrier(), Some(monk));
        assert!(!pick_up(&mut m, monk, relic));

        assert!(deposit(&mut m, monk, monastery));
        assert_eq!(m.relic(relic).unwrap().stored_in(), Some(monastery));
        assert_eq!(m.unit(monk).unwrap().relic, None);

        assert!(take(&mut m, monk, monastery));
        assert_eq!(m.relic(relic).unwrap().carrier(), Some(monk));
        assert!(m.building(monastery).unwrap().relics.is_empty());

        drop_at(&mut m, monk, pos(60, 60));
        let r = m.relic(relic).unwrap();
        assert!(r.is_free());
        assert_eq!(r.position, pos(60, 60));
    }

    #[test]
    fn test_deposit_respects_capacity() {
        let mut m = create_test_match(2);
        let monastery = place_building(&mut m, Some(0), BuildingType::Monastery, pos(52, 50));
        m.building_mut(monastery).unwrap().relics = vec![900, 901, 902];
        let monk = place_unit(&mut m, 0, UnitType::Monk, pos(50, 50));
        let relic = place_relic(&mut m, pos(50, 50));
        assert!(pick_up(&mut m, monk, relic));
        assert!(!deposit(&mut m, monk, monastery));
        assert_eq!(m.relic(relic).unwrap().carrier(), Some(monk));
    }

    #[test]
    fn test_monastery_pays_gold_every_three_seconds() {
        let mut m = create_test_match(2);
        let monastery = place_building(&mut m, Some(0), BuildingType::Monastery, pos(52, 50));
        let relic = place_relic(&mut m, pos(0, 0));
        m.building_mut(monastery).unwrap().relics.push(relic);
        m.players[0].resources.gold = Fixed::ZERO;
        for _ in 0..59 {
            process_relic_income(&mut m);
        }
        assert_eq!(m.players[0].resources.gold, Fixed::ZERO);
        process_relic_income(&mut m);
        assert_eq!(m.players[0].resources.gold, fixed_int(4));
    }
}
