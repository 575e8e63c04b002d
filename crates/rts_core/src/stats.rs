//! Derived values: effective unit stats, costs, times, population, armour,
//! speeds and rates after technologies and landmark bonuses.
//!
//! Nothing here is stored. Every value is recomputed from content tables
//! and current player state when it is needed.

use crate::buildings::{center, is_destroyed_landmark};
use crate::data::{bonus_index, by_age, ContentTables, DamageBonus};
use crate::economy::Stockpile;
use crate::entities::{Building, EntityId, EntityRef, PlayerIndex, Unit};
use crate::kinds::{BuildingType, ResourceKind, TechId, UnitType};
use crate::math::{fixed_int, fixed_ratio, Fixed};
use crate::state::{Match, Player};

/// Population cap with no houses.
pub const BASE_POPULATION_CAP: u32 = 20;
/// Population added per completed house.
pub const HOUSE_POPULATION_BONUS: u32 = 10;
/// Hard population cap.
pub const MAX_POPULATION_CAP: u32 = 200;
/// Base villager carry capacity.
pub const BASE_CARRY_CAPACITY: Fixed = fixed_int(10);
/// Units at or below this range fight in melee.
pub const MELEE_RANGE: Fixed = fixed_ratio(6, 10);

const SIGHT_RADAR_MULTIPLIER: Fixed = fixed_ratio(3, 2);
const GUNPOWDER_DAMAGE_MULTIPLIER: Fixed = fixed_ratio(6, 5);
const SECOND_WIND_THRESHOLD: Fixed = fixed_ratio(35, 100);
const RESOURCEFULNESS_MULTIPLIER: Fixed = fixed_ratio(9, 10);
const MIN_PRODUCTION_TIME: Fixed = fixed_ratio(5, 100);
const MONK_RELIC_SPEED: Fixed = fixed_ratio(7, 8);
const KNIGHT_CHARGE_SPEED: Fixed = fixed_int(2);
const MAX_RANGED_RESISTANCE: Fixed = fixed_ratio(99, 100);

/// Age tier at which `player` completed a landmark, clamped to 1..=4.
#[must_use]
pub fn landmark_built_tier(player: &Player, landmark: BuildingType) -> Option<u8> {
    player
        .landmark_built_ages
        .get(&landmark)
        .map(|tier| (*tier).clamp(1, 4))
}

/// Age tier a landmark building grants its bonuses at.
#[must_use]
pub fn landmark_tier(m: &Match, building: &Building) -> Option<u8> {
    if let Some(tier) = building.landmark_age_tier {
        return Some(tier.clamp(1, 4));
    }
    let player = m.player(building.owner?)?;
    landmark_built_tier(player, building.kind)
}

/// Value of a technology-landmark scaling table at the landmark's age, or
/// zero before the landmark is built.
fn grove_scaled(player: &Player, values: &[Fixed]) -> Fixed {
    landmark_built_tier(player, BuildingType::GroveUniversity)
        .map_or(Fixed::ZERO, |tier| by_age(values, tier))
}

/// Bonus of a researched grove technology.
#[must_use]
pub fn grove_tech_bonus(content: &ContentTables, player: &Player, tech: TechId) -> Fixed {
    if !player.has_tech(tech) {
        return Fixed::ZERO;
    }
    grove_scaled(player, &content.tech(tech).grove_scaling_by_age)
}

/// Research cost of a technology for `player`.
#[must_use]
pub fn tech_cost(content: &ContentTables, player: &Player, tech: TechId) -> Stockpile {
    let data = content.tech(tech);
    let grove_tier = landmark_built_tier(player, BuildingType::GroveUniversity);
    let grove = &content.landmark_bonuses.grove;
    let mut cost = data.cost;
    if let Some(tier) = grove_tier.filter(|_| data.grove_dynamic_cost) {
        if let Some(by_age) = grove.tech_cost_by_age.get(bonus_index(tier)) {
            cost = *by_age;
        }
    }
    let reduction = grove_tier.map_or(Fixed::ZERO, |tier| by_age(&grove.tech_cost_reduction_by_age, tier));
    if reduction > Fixed::ZERO {
        return cost.scaled((Fixed::ONE - reduction).max(Fixed::ZERO));
    }
    cost.normalized()
}

/// Placement cost of a building. Age landmarks cost the next age-up price.
#[must_use]
pub fn building_cost(content: &ContentTables, player: &Player, kind: BuildingType) -> Stockpile {
    if content.is_age_landmark(kind) {
        return content.age_up_cost(player.age_tier.saturating_add(1)).normalized();
    }
    content.building(kind).cost.normalized()
}

/// Construction time of a building.
#[must_use]
pub fn building_build_time(content: &ContentTables, player: Option<&Player>, kind: BuildingType) -> Fixed {
    let base = content.building(kind).build_time.unwrap_or(Fixed::ZERO);
    if player.is_some_and(|p| p.has_tech(TechId::RapidFabrications)) {
        return base / 2;
    }
    base
}

/// Upgrade tier of a unit type, or `None` when it has no upgrade line.
#[must_use]
pub fn unit_upgrade_tier(content: &ContentTables, player: &Player, unit: UnitType) -> Option<u8> {
    let path = content.upgrade_paths.get(&unit)?;
    let tier = path
        .techs
        .iter()
        .filter(|(tier, tech)| *tier > path.unlock_tier && player.has_tech(*tech))
        .map(|(tier, _)| *tier)
        .max()
        .unwrap_or(path.unlock_tier);
    Some(tier.max(path.unlock_tier))
}

/// Minimum age tier to train a unit type.
#[must_use]
pub fn unit_min_age(content: &ContentTables, unit: UnitType) -> u8 {
    content
        .upgrade_paths
        .get(&unit)
        .map_or(content.unit(unit).min_age_tier, |path| path.unlock_tier)
}

/// Unit stats after upgrades and health technologies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStats<'a> {
    /// Maximum health before per-unit multipliers.
    pub health: Fixed,
    /// Damage per hit.
    pub damage: Fixed,
    /// Extra damage on a charge hit.
    pub charge_damage: Fixed,
    /// Melee armour.
    pub melee_armor: Fixed,
    /// Ranged armour.
    pub ranged_armor: Fixed,
    /// Bonus damage table.
    pub bonus: &'a [DamageBonus],
}

/// Effective stats of a unit type for its owner.
#[must_use]
pub fn unit_stats<'a>(content: &'a ContentTables, player: Option<&Player>, unit: UnitType) -> UnitStats<'a> {
    let data = content.unit(unit);
    let upgrade = player
        .and_then(|p| unit_upgrade_tier(content, p, unit))
        .filter(|tier| *tier > 0)
        .and_then(|tier| content.upgrade_stats.get(&unit)?.get(&tier));
    let mut health = upgrade.map_or(data.health, |u| u.health);
    if !data.is_siege() {
        let bonus = player.map_or(Fixed::ZERO, |p| grove_tech_bonus(content, p, TechId::GreaterRations));
        if bonus > Fixed::ZERO {
            health *= Fixed::ONE + bonus;
        }
    }
    UnitStats {
        health,
        damage: upgrade.map_or(data.damage, |u| u.damage),
        charge_damage: upgrade.and_then(|u| u.charge_damage).unwrap_or(data.charge_damage),
        melee_armor: upgrade.map_or(data.melee_armor, |u| u.melee_armor),
        ranged_armor: upgrade.map_or(data.ranged_armor, |u| u.ranged_armor),
        bonus: upgrade.map_or(data.bonus.as_slice(), |u| u.bonus.as_slice()),
    }
}

/// Training cost of a unit, including the religious landmark discount.
#[must_use]
pub fn unit_cost(m: &Match, player: &Player, unit: UnitType, building: Option<&Building>) -> Stockpile {
    let content = m.content();
    let data = content.unit(unit);
    let mut multiplier = if player.has_tech(TechId::Resourcefulness) {
        RESOURCEFULNESS_MULTIPLIER
    } else {
        Fixed::ONE
    };
    if let Some(building) = building.filter(|b| b.kind == BuildingType::SanctumOfTheVeil) {
        if data.is_religious() {
            let tier = landmark_tier(m, building).unwrap_or(1);
            let reduction = by_age(&content.landmark_bonuses.sanctum.religious_cost_reduction_by_age, tier);
            multiplier *= (Fixed::ONE - reduction).max(fixed_ratio(5, 100));
        }
    }
    data.cost.scaled(multiplier)
}

/// Training time of a unit.
#[must_use]
pub fn unit_production_time(m: &Match, player: &Player, unit: UnitType, building: Option<&Building>) -> Fixed {
    let content = m.content();
    let data = content.unit(unit);
    if data.build_time <= Fixed::ZERO {
        return Fixed::ZERO;
    }
    if m.flags.fast_build {
        return fixed_ratio(1, 10);
    }
    let mut time = data.build_time;
    if player.has_tech(TechId::RapidFabrications) && data.is_siege() {
        time /= 2;
    }
    if let Some(building) = building.filter(|b| b.kind == BuildingType::ArgentThroneComplex) {
        if data.is_infantry() {
            let tier = landmark_tier(m, building).unwrap_or(1);
            let bonus = by_age(&content.landmark_bonuses.argent.production_speed_bonus_by_age, tier);
            let speed = Fixed::ONE + bonus;
            if speed > Fixed::ZERO {
                time /= speed;
            }
        }
    }
    time.max(MIN_PRODUCTION_TIME)
}

/// Research time of a technology.
#[must_use]
pub fn tech_research_time(m: &Match, tech: TechId) -> Fixed {
    if m.flags.fast_build {
        return Fixed::ONE;
    }
    m.content().tech(tech).research_time
}

/// Population slots used by one unit of a type.
#[must_use]
pub fn population_cost(content: &ContentTables, unit: UnitType) -> u32 {
    content.unit(unit).population.max(1)
}

/// Population cap of a player.
#[must_use]
pub fn population_cap(m: &Match, owner: PlayerIndex) -> u32 {
    let houses = m
        .buildings
        .iter()
        .filter(|b| b.is_owned_by(owner) && b.kind == BuildingType::House)
        .filter(|b| !b.under_construction && b.hp > Fixed::ZERO)
        .count();
    let houses = u32::try_from(houses).unwrap_or(u32::MAX);
    BASE_POPULATION_CAP
        .saturating_add(houses.saturating_mul(HOUSE_POPULATION_BONUS))
        .min(MAX_POPULATION_CAP)
}

/// Population used by living and garrisoned units.
#[must_use]
pub fn population_used(m: &Match, owner: PlayerIndex) -> u32 {
    let content = m.content();
    let living: u32 = m
        .units
        .iter()
        .filter(|u| u.owner == owner && u.is_alive())
        .map(|u| population_cost(content, u.kind))
        .sum();
    let garrisoned: u32 = m
        .buildings
        .iter()
        .filter(|b| b.is_owned_by(owner))
        .flat_map(|b| b.garrison.iter())
        .map(|slot| population_cost(content, slot.kind))
        .sum();
    living + garrisoned
}

/// Check if a finished unit job may spawn without exceeding the cap. Jobs
/// still waiting in any queue do not count.
#[must_use]
pub fn can_complete_unit(m: &Match, owner: PlayerIndex, unit: UnitType) -> bool {
    population_used(m, owner) + population_cost(m.content(), unit) <= population_cap(m, owner)
}

fn sight_multiplier(player: Option<&Player>) -> Fixed {
    if player.is_some_and(|p| p.has_tech(TechId::AdvancedRadar)) {
        SIGHT_RADAR_MULTIPLIER
    } else {
        Fixed::ONE
    }
}

/// Sight radius of a unit type.
#[must_use]
pub fn unit_sight(content: &ContentTables, player: Option<&Player>, unit: UnitType) -> Fixed {
    content.unit(unit).sight * sight_multiplier(player)
}

/// Sight radius of a building type.
#[must_use]
pub fn building_sight(content: &ContentTables, player: Option<&Player>, kind: BuildingType) -> Fixed {
    content.building(kind).sight * sight_multiplier(player)
}

/// Attack range of a unit.
#[must_use]
pub fn unit_range(m: &Match, unit: &Unit) -> Fixed {
    let data = m.content().unit(unit.kind);
    let improved = m
        .player(unit.owner)
        .is_some_and(|p| p.has_tech(TechId::ImprovedGunpowder));
    if improved && data.is_gunpowder() {
        return data.range + Fixed::ONE;
    }
    data.range
}

/// Minimum attack range of a unit.
#[must_use]
pub fn unit_min_range(m: &Match, unit: &Unit) -> Fixed {
    m.content().unit(unit.kind).min_range.max(Fixed::ZERO)
}

/// Check if a unit fights in melee.
#[must_use]
pub fn is_melee(m: &Match, unit: &Unit) -> bool {
    unit_range(m, unit) <= MELEE_RANGE
}

/// Best aura bonus from a complete own landmark of `kind` in range.
fn best_aura(m: &Match, unit: &Unit, kind: BuildingType, range: Fixed, table: &[Fixed]) -> Fixed {
    let content = m.content();
    let range_sq = range * range;
    m.buildings
        .iter()
        .filter(|b| b.is_owned_by(unit.owner) && b.kind == kind)
        .filter(|b| !b.under_construction && !is_destroyed_landmark(content, b))
        .filter(|b| center(content, b).distance_squared(unit.position) <= range_sq)
        .map(|b| by_age(table, landmark_tier(m, b).unwrap_or(1)))
        .max()
        .unwrap_or(Fixed::ZERO)
        .max(Fixed::ZERO)
}

/// Damage multiplier of a unit from technologies and auras.
#[must_use]
pub fn damage_multiplier(m: &Match, unit: &Unit) -> Fixed {
    let content = m.content();
    let data = content.unit(unit.kind);
    let mut multiplier = Fixed::ONE;
    if let Some(player) = m.player(unit.owner) {
        if player.has_tech(TechId::ImprovedGunpowder) && data.is_gunpowder() {
            multiplier *= GUNPOWDER_DAMAGE_MULTIPLIER;
        }
        if player.has_tech(TechId::SecondWind) && !data.is_siege() && unit.max_hp > Fixed::ZERO {
            if unit.hp / unit.max_hp < SECOND_WIND_THRESHOLD {
                multiplier *= Fixed::ONE + grove_tech_bonus(content, player, TechId::SecondWind);
            }
        }
    }
    let basilica = &content.landmark_bonuses.basilica;
    let aura = best_aura(
        m,
        unit,
        BuildingType::BasilicaOfEternalLight,
        basilica.aura_range,
        &basilica.aura_damage_by_age,
    );
    if aura > Fixed::ZERO {
        multiplier *= Fixed::ONE + aura;
    }
    multiplier
}

/// Flat Armory damage bonus.
#[must_use]
pub fn unit_damage_bonus(m: &Match, unit: &Unit, ranged: bool) -> Fixed {
    let Some(player) = m.player(unit.owner) else {
        return Fixed::ZERO;
    };
    let count = if ranged {
        if m.content().unit(unit.kind).is_gunpowder() {
            return Fixed::ZERO;
        }
        player.count_techs(&TechId::RANGED_DAMAGE)
    } else {
        player.count_techs(&TechId::MELEE_DAMAGE)
    };
    Fixed::from_num(count)
}

/// Armour of a unit or building against melee or ranged damage.
#[must_use]
pub fn armor(m: &Match, target: EntityRef, ranged: bool) -> Fixed {
    let content = m.content();
    match target {
        EntityRef::Building(id) => m.building(id).map_or(Fixed::ZERO, |b| {
            let data = content.building(b.kind);
            if ranged {
                data.ranged_armor
            } else {
                data.melee_armor
            }
        }),
        EntityRef::Unit(id) => m.unit(id).map_or(Fixed::ZERO, |unit| {
            let player = m.player(unit.owner);
            let stats = unit_stats(content, player, unit.kind);
            let mut value = if ranged { stats.ranged_armor } else { stats.melee_armor };
            if let Some(player) = player.filter(|_| !content.unit(unit.kind).is_siege()) {
                let techs = if ranged { &TechId::RANGED_ARMOR } else { &TechId::MELEE_ARMOR };
                value += Fixed::from_num(player.count_techs(techs));
            }
            value
        }),
    }
}

/// Fractional ranged damage reduction, for units only.
#[must_use]
pub fn ranged_resistance(m: &Match, target: EntityRef) -> Fixed {
    match target {
        EntityRef::Unit(id) => m.unit(id).map_or(Fixed::ZERO, |u| {
            m.content()
                .unit(u.kind)
                .ranged_resistance
                .clamp(Fixed::ZERO, MAX_RANGED_RESISTANCE)
        }),
        EntityRef::Building(_) => Fixed::ZERO,
    }
}

/// First bonus whose target matches the class. Buildings are "Building".
#[must_use]
pub fn bonus_damage(bonus: &[DamageBonus], target_class: &str) -> Fixed {
    bonus
        .iter()
        .find(|b| b.applies_to(target_class))
        .map_or(Fixed::ZERO, |b| b.damage)
}

/// Class string a bonus table is matched against.
#[must_use]
pub fn target_class(m: &Match, target: EntityRef) -> &str {
    match target {
        EntityRef::Building(_) => "Building",
        EntityRef::Unit(id) => m
            .unit(id)
            .map_or("", |u| m.content().unit(u.kind).class.as_str()),
    }
}

/// Villager carry capacity.
#[must_use]
pub fn carry_capacity(m: &Match, owner: PlayerIndex) -> Fixed {
    let bonus = m
        .player(owner)
        .filter(|p| p.has_tech(TechId::CarryingFrame))
        .and_then(|_| m.content().tech(TechId::CarryingFrame).carry_bonus)
        .unwrap_or(Fixed::ZERO);
    BASE_CARRY_CAPACITY + bonus
}

/// Movement speed of a unit in tiles per second.
#[must_use]
pub fn unit_speed(m: &Match, unit: &Unit) -> Fixed {
    let content = m.content();
    let base = content.unit(unit.kind).speed;
    match unit.kind {
        UnitType::Monk if unit.relic.is_some() => MONK_RELIC_SPEED,
        UnitType::Knight if unit.charge.active => KNIGHT_CHARGE_SPEED,
        UnitType::Villager => {
            let bonus = m
                .player(unit.owner)
                .filter(|p| p.has_tech(TechId::CarryingFrame))
                .and_then(|_| content.tech(TechId::CarryingFrame).speed_bonus)
                .unwrap_or(Fixed::ZERO);
            base + bonus
        }
        _ => base,
    }
}

/// Gather rate of a villager for a resource kind.
#[must_use]
pub fn gather_rate(m: &Match, unit: &Unit, kind: ResourceKind) -> Fixed {
    let content = m.content();
    let base = content.unit(UnitType::Villager).gather_rate;
    let Some(player) = m.player(unit.owner) else {
        return base;
    };
    let mut bonus: Fixed = player
        .techs
        .iter()
        .map(|tech| content.tech(*tech).gather_bonus.get(kind))
        .sum();
    let fountain = &content.landmark_bonuses.fountain;
    bonus += best_aura(
        m,
        unit,
        BuildingType::GoldenFountainSquare,
        fountain.aura_range,
        &fountain.gather_rate_bonus_by_age,
    );
    base * (Fixed::ONE + bonus)
}

/// Drop-off multiplier for a resource kind.
#[must_use]
pub fn dropoff_multiplier(content: &ContentTables, player: &Player, kind: ResourceKind) -> Fixed {
    let bonus: Fixed = player
        .techs
        .iter()
        .map(|tech| content.tech(*tech).dropoff_bonus.get(kind))
        .sum();
    Fixed::ONE + bonus
}

/// Collision radius of a unit type.
#[must_use]
pub fn unit_radius(content: &ContentTables, unit: UnitType) -> Fixed {
    if content.unit(unit).is_siege() {
        fixed_ratio(6, 10)
    } else {
        fixed_ratio(3, 10)
    }
}

/// Maximum health of a new building for its owner.
#[must_use]
pub fn building_max_hp(m: &Match, owner: Option<PlayerIndex>, kind: BuildingType) -> Fixed {
    let content = m.content();
    let player = owner.and_then(|o| m.player(o));
    let mut max_hp = content.building(kind).health.max(Fixed::ONE);
    if kind == BuildingType::DominionSpire {
        let tier = player.map_or(1, |p| {
            landmark_built_tier(p, kind).unwrap_or_else(|| p.age_tier.saturating_add(1).clamp(1, 4))
        });
        let by_tier = by_age(&content.landmark_bonuses.spire.hp_by_age, tier);
        if by_tier > Fixed::ZERO {
            max_hp = by_tier;
        }
    }
    let bedrock = player.map_or(Fixed::ZERO, |p| grove_tech_bonus(content, p, TechId::BedrockFoundations));
    max_hp * (Fixed::ONE + bedrock)
}

/// Maximum health of the defensive landmark at a given age.
#[must_use]
pub fn spire_max_hp_for_age(content: &ContentTables, player: &Player, tier: u8) -> Fixed {
    let mut base = by_age(&content.landmark_bonuses.spire.hp_by_age, tier);
    if base <= Fixed::ZERO {
        base = content.building(BuildingType::DominionSpire).health;
    }
    base * (Fixed::ONE + grove_tech_bonus(content, player, TechId::BedrockFoundations))
}

/// Check if a player has a technology queued anywhere, or at one building.
#[must_use]
pub fn is_tech_in_progress(m: &Match, owner: PlayerIndex, tech: TechId, building: Option<EntityId>) -> bool {
    m.buildings
        .iter()
        .filter(|b| b.is_owned_by(owner))
        .filter(|b| building.map_or(true, |id| b.id == id))
        .any(|b| b.production_queue.iter().any(|job| job.tech() == Some(tech)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{JobKind, ProductionJob};
    use crate::test_support::{create_test_match, place_building, place_unit};
    use crate::math::Vec2Fixed;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn pos(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(fixed(x), fixed(y))
    }

    #[test]
    fn test_population_cap_counts_finished_houses() {
        let mut m = create_test_match(2);
        assert_eq!(population_cap(&m, 0), 20);
        place_building(&mut m, Some(0), BuildingType::House, pos(40, 40));
        let unfinished = place_building(&mut m, Some(0), BuildingType::House, pos(44, 40));
        m.building_mut(unfinished).unwrap().under_construction = true;
        assert_eq!(population_cap(&m, 0), 30);
    }

    #[test]
    fn test_population_used_includes_garrison() {
        let mut m = create_test_match(2);
        let start = population_used(&m, 0);
        let tc = m.players[0].starting_town_center.unwrap();
        m.building_mut(tc).unwrap().garrison.push(crate::entities::GarrisonSlot {
            id: 999,
            kind: UnitType::Cannon,
        });
        assert_eq!(population_used(&m, 0), start + 3);
    }

    #[test]
    fn test_completion_ignores_other_queued_jobs() {
        let mut m = create_test_match(2);
        for i in 0..18 {
            place_unit(&mut m, 0, UnitType::Villager, pos(30 + i, 50));
        }
        let tc = m.players[0].starting_town_center.unwrap();
        for _ in 0..5 {
            m.building_mut(tc).unwrap().production_queue.push_back(ProductionJob {
                kind: JobKind::Unit(UnitType::Villager),
                remaining: Fixed::ONE,
                total: Fixed::ONE,
                cost: Stockpile::default(),
                stalled: false,
            });
        }
        assert!(can_complete_unit(&m, 0, UnitType::Villager));
        assert!(!can_complete_unit(&m, 0, UnitType::Cannon));
        place_unit(&mut m, 0, UnitType::Villager, pos(30, 52));
        place_unit(&mut m, 0, UnitType::Villager, pos(32, 52));
        assert!(!can_complete_unit(&m, 0, UnitType::Villager));
    }

    #[test]
    fn test_upgrade_tier_follows_researched_techs() {
        let m = create_test_match(2);
        let content = m.content();
        let mut player = m.players[0].clone();
        assert_eq!(unit_upgrade_tier(content, &player, UnitType::Spearman), Some(0));
        player.techs.insert(TechId::SpearmanIron);
        player.techs.insert(TechId::SpearmanDiamond);
        assert_eq!(unit_upgrade_tier(content, &player, UnitType::Spearman), Some(2));
        assert_eq!(unit_upgrade_tier(content, &player, UnitType::Villager), None);
        assert_eq!(unit_min_age(content, UnitType::Knight), 2);
    }

    #[test]
    fn test_resourcefulness_discounts_units() {
        let mut m = create_test_match(2);
        let base = unit_cost(&m, &m.players[0], UnitType::Spearman, None);
        m.players[0].techs.insert(TechId::Resourcefulness);
        let cheaper = unit_cost(&m, &m.players[0], UnitType::Spearman, None);
        assert!(cheaper.food < base.food);
        assert_eq!(cheaper.food, (base.food * RESOURCEFULNESS_MULTIPLIER).round());
    }

    #[test]
    fn test_armory_techs_add_armor_except_siege() {
        let mut m = create_test_match(2);
        let spear = place_unit(&mut m, 0, UnitType::Spearman, pos(50, 50));
        let cannon = place_unit(&mut m, 0, UnitType::Cannon, pos(52, 50));
        let before = armor(&m, EntityRef::Unit(spear), false);
        m.players[0].techs.insert(TechId::ChainmailArmor);
        assert_eq!(armor(&m, EntityRef::Unit(spear), false), before + Fixed::ONE);
        assert_eq!(armor(&m, EntityRef::Unit(cannon), false), Fixed::ZERO);
    }

    #[test]
    fn test_speed_modifiers() {
        let mut m = create_test_match(2);
        let monk = place_unit(&mut m, 0, UnitType::Monk, pos(50, 50));
        m.unit_mut(monk).unwrap().relic = Some(77);
        assert_eq!(unit_speed(&m, m.unit(monk).unwrap()), MONK_RELIC_SPEED);
        let villager = place_unit(&mut m, 0, UnitType::Villager, pos(52, 50));
        let base = unit_speed(&m, m.unit(villager).unwrap());
        m.players[0].techs.insert(TechId::CarryingFrame);
        assert_eq!(unit_speed(&m, m.unit(villager).unwrap()), base + fixed_ratio(1, 8));
        assert_eq!(carry_capacity(&m, 0), fixed(15));
    }

    #[test]
    fn test_gather_and_dropoff_bonuses_stack() {
        let mut m = create_test_match(2);
        let villager = place_unit(&mut m, 0, UnitType::Villager, pos(50, 50));
        m.players[0].techs.insert(TechId::Basketry);
        m.players[0].techs.insert(TechId::Agriculture);
        let rate = gather_rate(&m, m.unit(villager).unwrap(), ResourceKind::Food);
        assert!((rate - fixed_ratio(12, 10)).abs() < fixed_ratio(1, 1000));
        let wood = gather_rate(&m, m.unit(villager).unwrap(), ResourceKind::Wood);
        assert_eq!(wood, Fixed::ONE);
        m.players[0].techs.insert(TechId::WoodSaws);
        let mult = dropoff_multiplier(m.content(), &m.players[0], ResourceKind::Wood);
        assert!((mult - fixed_ratio(11, 10)).abs() < fixed_ratio(1, 1000));
    }

    #[test]
    fn test_bonus_damage_takes_first_match() {
        let m = create_test_match(2);
        let spear = m.content().unit(UnitType::Spearman);
        assert!(bonus_damage(&spear.bonus, "Heavy Melee Cavalry") > Fixed::ZERO);
        assert_eq!(bonus_damage(&spear.bonus, "Light Ranged Infantry"), Fixed::ZERO);
    }

    #[test]
    fn test_rapid_fabrications_halves_build_time() {
        let m = create_test_match(2);
        let content = m.content();
        let mut player = m.players[0].clone();
        let base = building_build_time(content, Some(&player), BuildingType::House);
        player.techs.insert(TechId::RapidFabrications);
        assert_eq!(building_build_time(content, Some(&player), BuildingType::House), base / 2);
    }
}
