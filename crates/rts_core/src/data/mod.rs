//! Static content tables consumed by the simulation.
//!
//! Units, buildings, technologies, upgrade paths, landmark bonuses, map and
//! resource definitions. Everything is deserialized from a RON document; the
//! standard content ships embedded in the crate.
//!
//! **Note:** This module contains no IO - callers pass RON text in.

mod building_data;
mod landmark_data;
mod tech_data;
mod unit_data;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use building_data::{AttackData, BuildingData, SplashTier};
pub use landmark_data::{
    bonus_index, by_age, ArgentBonuses, BasilicaBonuses, EvermistBonuses, FountainBonuses,
    GroveBonuses, LandmarkBonuses, OldMarketBonuses, SanctumBonuses, SpireBonuses,
};
pub use tech_data::{TechData, TechScope};
pub use unit_data::{DamageBonus, UnitData, UpgradePath, UpgradeStats};

use crate::economy::Stockpile;
use crate::error::{GameError, Result};
use crate::kinds::{BuildingType, ResourceKind, ResourceNodeType, TechId, UnitType};
use crate::math::{fixed_serde, Fixed};

/// Embedded standard content.
pub const STANDARD_CONTENT: &str = include_str!("../../data/content.ron");

/// Serde support for optional fixed-point numbers.
pub(crate) mod option_fixed_serde {
    use crate::math::Fixed;
    use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize an optional fixed-point number as a decimal.
    pub fn serialize<S>(value: &Option<Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(|v| v.to_num::<f64>()).serialize(serializer)
    }

    /// Deserialize an optional fixed-point number from a decimal.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<f64>::deserialize(deserializer)?
            .map(|value| {
                Fixed::checked_from_num(value)
                    .ok_or_else(|| D::Error::custom(format!("{value} is out of fixed-point range")))
            })
            .transpose()
    }
}

/// Map dimensions in tiles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MapData {
    /// Width in tiles.
    pub width: i32,
    /// Height in tiles.
    pub height: i32,
    /// Client render scale; the simulation ignores it.
    pub tile_size: i32,
}

/// Resource node definition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceNodeData {
    /// Resource kind gathered from this node.
    pub kind: ResourceKind,
    /// Starting amount.
    #[serde(with = "fixed_serde")]
    pub amount: Fixed,
    /// Footprint side length in tiles.
    pub size: i32,
}

/// Counts used by map generation for global resource scatter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceSpawnRules {
    /// Number of berry groups.
    pub berry_groups: u32,
    /// Minimum bushes per group.
    pub berry_group_min: u32,
    /// Maximum bushes per group.
    pub berry_group_max: u32,
    /// Number of forests.
    pub tree_forests: u32,
    /// Minimum trees per forest.
    pub tree_forest_min: u32,
    /// Maximum trees per forest.
    pub tree_forest_max: u32,
    /// Number of gold mines.
    pub gold_mines: u32,
    /// Number of stone mines.
    pub stone_mines: u32,
}

/// Selectable player colour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColorOption {
    /// Stable id used by lobby commands.
    pub id: String,
    /// Display name.
    pub name: String,
    /// `#rrggbb` value.
    pub hex: String,
}

/// Building groupings used by repair and placement rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BuildingCategories {
    /// Economic buildings.
    pub economy: Vec<BuildingType>,
    /// Military buildings.
    pub military: Vec<BuildingType>,
    /// Defensive buildings; repaired with stone when they cost stone.
    pub defensive: Vec<BuildingType>,
}

/// Every content table the simulation reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentTables {
    /// Map dimensions.
    pub map: MapData,
    /// Display names of the ages, indexed by tier.
    pub ages: Vec<String>,
    /// Landmark cost for reaching tier `i + 1`.
    pub age_up_costs: Vec<Stockpile>,
    /// Pool of age-up landmarks each player draws from.
    pub landmark_pool: Vec<BuildingType>,
    /// Landmarks offered to each player.
    pub landmarks_per_player: usize,
    /// Default colours of single-queue matches, by player index.
    pub player_colors: Vec<String>,
    /// Colours selectable in lobbies.
    pub color_options: Vec<ColorOption>,
    /// Resource node definitions.
    pub resources: BTreeMap<ResourceNodeType, ResourceNodeData>,
    /// Global resource scatter counts.
    pub spawn_rules: ResourceSpawnRules,
    /// Building definitions.
    pub buildings: BTreeMap<BuildingType, BuildingData>,
    /// Building groupings.
    pub categories: BuildingCategories,
    /// Landmark bonus tables.
    pub landmark_bonuses: LandmarkBonuses,
    /// Unit definitions.
    pub units: BTreeMap<UnitType, UnitData>,
    /// Unit upgrade lines.
    pub upgrade_paths: BTreeMap<UnitType, UpgradePath>,
    /// Unit stats per upgrade tier.
    pub upgrade_stats: BTreeMap<UnitType, BTreeMap<u8, UpgradeStats>>,
    /// Technology definitions.
    pub technologies: BTreeMap<TechId, TechData>,
}

impl ContentTables {
    /// Parse content from RON text and check cross-references.
    pub fn from_ron(source: &str) -> Result<Self> {
        let tables: Self = ron::from_str(source).map_err(|err| GameError::DataParseError {
            path: "content.ron".to_string(),
            message: err.to_string(),
        })?;
        tables.validate()?;
        Ok(tables)
    }

    /// Parse the embedded standard content.
    pub fn standard() -> Result<Self> {
        Self::from_ron(STANDARD_CONTENT)
    }

    fn validate(&self) -> Result<()> {
        if let Some(missing) = BuildingType::ALL.iter().find(|t| !self.buildings.contains_key(t)) {
            return Err(GameError::InvalidContent(format!("missing building {missing}")));
        }
        if let Some(missing) = UnitType::ALL.iter().find(|t| !self.units.contains_key(t)) {
            return Err(GameError::InvalidContent(format!("missing unit {missing}")));
        }
        if let Some(missing) = TechId::ALL.iter().find(|t| !self.technologies.contains_key(t)) {
            return Err(GameError::InvalidContent(format!("missing technology {missing}")));
        }
        for node in [
            ResourceNodeType::Berry,
            ResourceNodeType::Tree,
            ResourceNodeType::Gold,
            ResourceNodeType::Stone,
        ] {
            if !self.resources.contains_key(&node) {
                return Err(GameError::InvalidContent(format!("missing resource {node:?}")));
            }
        }
        if self.age_up_costs.len() < 4 {
            return Err(GameError::InvalidContent("age_up_costs needs 4 tiers".to_string()));
        }
        if self.map.width <= 0 || self.map.height <= 0 {
            return Err(GameError::InvalidContent("map must have a positive size".to_string()));
        }
        Ok(())
    }

    /// Building definition. Every [`BuildingType`] is present after validation.
    #[must_use]
    pub fn building(&self, building: BuildingType) -> &BuildingData {
        &self.buildings[&building]
    }

    /// Unit definition. Every [`UnitType`] is present after validation.
    #[must_use]
    pub fn unit(&self, unit: UnitType) -> &UnitData {
        &self.units[&unit]
    }

    /// Technology definition. Every [`TechId`] is present after validation.
    #[must_use]
    pub fn tech(&self, tech: TechId) -> &TechData {
        &self.technologies[&tech]
    }

    /// Resource node definition.
    #[must_use]
    pub fn resource(&self, node: ResourceNodeType) -> &ResourceNodeData {
        &self.resources[&node]
    }

    /// Map width as a fixed-point number.
    #[must_use]
    pub fn map_width(&self) -> Fixed {
        Fixed::from_num(self.map.width)
    }

    /// Map height as a fixed-point number.
    #[must_use]
    pub fn map_height(&self) -> Fixed {
        Fixed::from_num(self.map.height)
    }

    /// Landmark cost for reaching `tier` (clamped to 1..=4).
    #[must_use]
    pub fn age_up_cost(&self, tier: u8) -> Stockpile {
        let index = usize::from(tier.clamp(1, 4) - 1);
        self.age_up_costs
            .get(index)
            .or_else(|| self.age_up_costs.last())
            .copied()
            .unwrap_or_default()
    }

    /// Check if a building type is one of the age-up landmarks.
    #[must_use]
    pub fn is_age_landmark(&self, building: BuildingType) -> bool {
        self.landmark_pool.contains(&building)
    }

    /// Check if a building type is a defensive structure.
    #[must_use]
    pub fn is_defensive(&self, building: BuildingType) -> bool {
        self.categories.defensive.contains(&building)
    }

    /// Display name of an age tier.
    #[must_use]
    pub fn age_name(&self, tier: u8) -> &str {
        self.ages.get(usize::from(tier)).map_or("", String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_content_parses() {
        let content = ContentTables::standard().expect("embedded content must parse");
        assert_eq!(content.map.width, 100);
        assert_eq!(content.landmark_pool.len(), 8);
        assert_eq!(content.building(BuildingType::Farm).cost.wood, Fixed::from_num(75));
        assert_eq!(content.unit(UnitType::Cannon).population, 3);
        assert!(content.tech(TechId::Arrowslits).is_building_scoped());
    }

    #[test]
    fn test_age_up_cost_clamps() {
        let content = ContentTables::standard().unwrap();
        assert_eq!(content.age_up_cost(1).food, Fixed::from_num(200));
        assert_eq!(content.age_up_cost(4).gold, Fixed::from_num(2000));
        assert_eq!(content.age_up_cost(7).gold, Fixed::from_num(2000));
    }

    #[test]
    fn test_landmark_classification() {
        let content = ContentTables::standard().unwrap();
        assert!(content.building(BuildingType::TownCenter).is_landmark());
        assert!(!content.is_age_landmark(BuildingType::TownCenter));
        assert!(content.is_age_landmark(BuildingType::EvermistGardens));
        assert!(content.is_defensive(BuildingType::StoneTower));
    }

    #[test]
    fn test_malformed_content_is_a_parse_error() {
        let err = ContentTables::from_ron("(map: oops)").unwrap_err();
        assert!(matches!(err, GameError::DataParseError { .. }));
    }

    #[test]
    fn test_upgrade_tables_reference_known_tiers() {
        let content = ContentTables::standard().unwrap();
        for (unit, path) in &content.upgrade_paths {
            for (tier, tech) in &path.techs {
                let data = content.tech(*tech);
                assert_eq!(data.upgrade_unit, Some(*unit));
                assert_eq!(data.upgrade_tier, Some(*tier));
                assert!(content.upgrade_stats[unit].contains_key(tier));
            }
        }
    }
}
