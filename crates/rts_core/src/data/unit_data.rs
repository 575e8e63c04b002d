//! Unit data structures for data-driven unit definitions.

use serde::{Deserialize, Serialize};

use crate::economy::Stockpile;
use crate::kinds::TechId;
use crate::math::{fixed_int, fixed_serde, Fixed};

/// Flat bonus damage against targets whose class contains `target`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DamageBonus {
    /// Class fragment matched against the target ("Cavalry", "Building", ...).
    pub target: String,
    /// Extra damage per hit.
    #[serde(with = "fixed_serde")]
    pub damage: Fixed,
}

impl DamageBonus {
    /// Whether this bonus applies to a target with the given class string.
    #[must_use]
    pub fn applies_to(&self, class: &str) -> bool {
        class
            .to_ascii_lowercase()
            .contains(&self.target.to_ascii_lowercase())
    }
}

/// Data-driven unit definition.
///
/// # Example RON
///
/// ```ron
/// Spearman: (
///     name: "Spearman",
///     class: "Light Melee Infantry",
///     health: 80.0,
///     speed: 1.25,
///     damage: 7.0,
///     attack_cooldown: 1.5,
///     range: 0.5,
///     cost: (food: 60.0, wood: 20.0),
///     build_time: 15.0,
///     bonus: [(target: "Cavalry", damage: 18.0)],
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitData {
    /// Display name.
    pub name: String,

    /// Space-separated class words ("Heavy Melee Cavalry", "Siege", ...).
    pub class: String,

    /// Base maximum health.
    #[serde(with = "fixed_serde")]
    pub health: Fixed,

    /// Movement speed in tiles per second.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,

    /// Base damage per hit.
    #[serde(with = "fixed_serde")]
    pub damage: Fixed,

    /// Extra damage on the first hit of a charge.
    #[serde(default, with = "fixed_serde")]
    pub charge_damage: Fixed,

    /// Seconds between attacks.
    #[serde(with = "fixed_serde")]
    pub attack_cooldown: Fixed,

    /// Attack range in tiles. At most 0.6 means melee.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,

    /// Minimum attack range in tiles.
    #[serde(default, with = "fixed_serde")]
    pub min_range: Fixed,

    /// Flat reduction of melee damage.
    #[serde(default, with = "fixed_serde")]
    pub melee_armor: Fixed,

    /// Flat reduction of ranged damage.
    #[serde(default, with = "fixed_serde")]
    pub ranged_armor: Fixed,

    /// Fractional reduction of ranged damage.
    #[serde(default, with = "fixed_serde")]
    pub ranged_resistance: Fixed,

    /// Production cost.
    #[serde(default)]
    pub cost: Stockpile,

    /// Production time in seconds.
    #[serde(with = "fixed_serde")]
    pub build_time: Fixed,

    /// Bonus damage against classes. Only the first match applies.
    #[serde(default)]
    pub bonus: Vec<DamageBonus>,

    /// Base sight radius in tiles.
    #[serde(default = "default_sight", with = "fixed_serde")]
    pub sight: Fixed,

    /// Minimum age tier needed to produce this unit.
    #[serde(default)]
    pub min_age_tier: u8,

    /// Technology that must be researched before this unit can be produced.
    #[serde(default)]
    pub requires_tech: Option<TechId>,

    /// Population slots used.
    #[serde(default = "default_population")]
    pub population: u32,

    /// Base gather rate per second (villagers).
    #[serde(default = "default_gather_rate", with = "fixed_serde")]
    pub gather_rate: Fixed,
}

const fn default_sight() -> Fixed {
    fixed_int(4)
}

const fn default_population() -> u32 {
    1
}

const fn default_gather_rate() -> Fixed {
    Fixed::ONE
}

impl UnitData {
    /// Case-insensitive check for a class word or phrase.
    #[must_use]
    pub fn has_class(&self, fragment: &str) -> bool {
        self.class
            .to_ascii_lowercase()
            .contains(&fragment.to_ascii_lowercase())
    }

    /// Siege units ignore armour and take no Armory bonuses.
    #[must_use]
    pub fn is_siege(&self) -> bool {
        self.class.contains("Siege")
    }

    /// Gunpowder units benefit from ImprovedGunpowder.
    #[must_use]
    pub fn is_gunpowder(&self) -> bool {
        self.class.contains("Gunpowder")
    }

    /// Infantry units benefit from the military landmark.
    #[must_use]
    pub fn is_infantry(&self) -> bool {
        self.class.contains("Infantry")
    }

    /// Religious units benefit from the religious landmark.
    #[must_use]
    pub fn is_religious(&self) -> bool {
        self.class.contains("Religious")
    }
}

/// Per-tier stat override for an upgradable unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpgradeStats {
    /// Maximum health at this tier.
    #[serde(with = "fixed_serde")]
    pub health: Fixed,
    /// Damage per hit at this tier.
    #[serde(with = "fixed_serde")]
    pub damage: Fixed,
    /// Charge damage at this tier.
    #[serde(default, with = "crate::data::option_fixed_serde")]
    pub charge_damage: Option<Fixed>,
    /// Melee armour at this tier.
    #[serde(with = "fixed_serde")]
    pub melee_armor: Fixed,
    /// Ranged armour at this tier.
    #[serde(with = "fixed_serde")]
    pub ranged_armor: Fixed,
    /// Bonus damage table at this tier.
    #[serde(default)]
    pub bonus: Vec<DamageBonus>,
}

/// Upgrade line of a unit: the building researching it and the technology
/// unlocking each tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpgradePath {
    /// Building hosting the upgrade technologies.
    pub building: crate::kinds::BuildingType,
    /// Tier the unit starts at once available; also its minimum age.
    pub unlock_tier: u8,
    /// `(tier, technology)` pairs in ascending tier order.
    pub techs: Vec<(u8, TechId)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_unit() -> UnitData {
        UnitData {
            name: "Cannon".to_string(),
            class: "Gunpowder Siege".to_string(),
            health: Fixed::from_num(300),
            speed: Fixed::from_num(0.75),
            damage: Fixed::from_num(50),
            charge_damage: Fixed::ZERO,
            attack_cooldown: Fixed::from_num(5),
            range: Fixed::from_num(10),
            min_range: Fixed::from_num(3),
            melee_armor: Fixed::ZERO,
            ranged_armor: Fixed::ZERO,
            ranged_resistance: Fixed::from_num(0.85),
            cost: Stockpile::default(),
            build_time: Fixed::from_num(50),
            bonus: vec![
                DamageBonus {
                    target: "Infantry".to_string(),
                    damage: Fixed::from_num(50),
                },
                DamageBonus {
                    target: "Building".to_string(),
                    damage: Fixed::from_num(500),
                },
            ],
            sight: Fixed::from_num(12),
            min_age_tier: 3,
            requires_tech: None,
            population: 3,
            gather_rate: Fixed::ONE,
        }
    }

    #[test]
    fn test_class_flags() {
        let unit = create_test_unit();
        assert!(unit.is_siege());
        assert!(unit.is_gunpowder());
        assert!(!unit.is_infantry());
        assert!(unit.has_class("siege"));
    }

    #[test]
    fn test_bonus_matches_substring_case_insensitively() {
        let unit = create_test_unit();
        assert!(unit.bonus[0].applies_to("Light Ranged Infantry"));
        assert!(!unit.bonus[0].applies_to("Heavy Melee Cavalry"));
        assert!(unit.bonus[1].applies_to("building"));
    }
}
