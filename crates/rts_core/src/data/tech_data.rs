//! Tech tree data structures for data-driven technology definitions.

use serde::{Deserialize, Serialize};

use super::option_fixed_serde;
use crate::economy::Stockpile;
use crate::kinds::{BuildingType, UnitType};
use crate::math::{fixed_serde, fixed_vec_serde, Fixed};

/// Who owns a researched technology.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TechScope {
    /// Applies to every entity of the researching player.
    #[default]
    Player,
    /// Applies only to the building that researched it.
    Building,
}

/// Data-driven technology definition.
///
/// Most effects are keyed by technology id in the derived-stat rules; the
/// numeric parts (gather and drop-off bonuses, carry bonus, grove scaling)
/// live here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TechData {
    /// Display name.
    pub name: String,

    /// Research cost.
    #[serde(default)]
    pub cost: Stockpile,

    /// Research time in seconds.
    #[serde(with = "fixed_serde")]
    pub research_time: Fixed,

    /// Building type hosting the research.
    pub building: BuildingType,

    /// Minimum age tier to start research.
    #[serde(default)]
    pub min_age_tier: Option<u8>,

    /// Age tier reached on completion (era technologies).
    #[serde(default)]
    pub age_tier: Option<u8>,

    /// Prerequisite technology.
    #[serde(default)]
    pub requires_tech: Option<crate::kinds::TechId>,

    /// Ownership scope.
    #[serde(default)]
    pub scope: TechScope,

    /// Additive gather rate bonus per resource kind.
    #[serde(default)]
    pub gather_bonus: Stockpile,

    /// Additive drop-off multiplier bonus per resource kind.
    #[serde(default)]
    pub dropoff_bonus: Stockpile,

    /// Extra villager carry capacity.
    #[serde(default, with = "option_fixed_serde")]
    pub carry_bonus: Option<Fixed>,

    /// Extra villager speed.
    #[serde(default, with = "option_fixed_serde")]
    pub speed_bonus: Option<Fixed>,

    /// Cost follows the technology landmark's per-age table once it is built.
    #[serde(default)]
    pub grove_dynamic_cost: bool,

    /// Effect strength indexed by the technology landmark's age.
    #[serde(default, with = "fixed_vec_serde")]
    pub grove_scaling_by_age: Vec<Fixed>,

    /// Unit type upgraded by this technology.
    #[serde(default)]
    pub upgrade_unit: Option<UnitType>,

    /// Tier granted to `upgrade_unit`.
    #[serde(default)]
    pub upgrade_tier: Option<u8>,
}

impl TechData {
    /// Check whether this technology advances the player's age.
    #[must_use]
    pub const fn is_age_tech(&self) -> bool {
        self.age_tier.is_some()
    }

    /// Check whether completion marks only the researching building.
    #[must_use]
    pub fn is_building_scoped(&self) -> bool {
        self.scope == TechScope::Building
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::TechId;

    fn create_test_tech() -> TechData {
        TechData {
            name: "Iron Era".to_string(),
            cost: Stockpile::default(),
            research_time: Fixed::from_num(120),
            building: BuildingType::Armory,
            min_age_tier: None,
            age_tier: Some(1),
            requires_tech: None,
            scope: TechScope::Player,
            gather_bonus: Stockpile::default(),
            dropoff_bonus: Stockpile::default(),
            carry_bonus: None,
            speed_bonus: None,
            grove_dynamic_cost: false,
            grove_scaling_by_age: Vec::new(),
            upgrade_unit: None,
            upgrade_tier: None,
        }
    }

    #[test]
    fn test_age_tech() {
        let mut tech = create_test_tech();
        assert!(tech.is_age_tech());
        tech.age_tier = None;
        assert!(!tech.is_age_tech());
    }

    #[test]
    fn test_scope_parsing() {
        let scope: TechScope = ron::from_str("Building").unwrap();
        assert_eq!(scope, TechScope::Building);
        let mut tech = create_test_tech();
        tech.scope = scope;
        tech.requires_tech = Some(TechId::IronEra);
        assert!(tech.is_building_scoped());
    }
}
