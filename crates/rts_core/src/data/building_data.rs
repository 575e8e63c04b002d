//! Building data structures for data-driven building definitions.

use serde::{Deserialize, Serialize};

use super::option_fixed_serde;
use crate::economy::Stockpile;
use crate::kinds::{ResourceKind, TechId, UnitType};
use crate::math::{fixed_int, fixed_serde, Fixed};

/// One ring of a splash falloff table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SplashTier {
    /// Outer radius of this ring.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Damage scale inside this ring.
    #[serde(with = "fixed_serde")]
    pub scale: Fixed,
}

/// Intrinsic weapon of a building.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttackData {
    /// Damage per shot.
    #[serde(with = "fixed_serde")]
    pub damage: Fixed,
    /// Range in tiles, measured from the building centre.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Minimum range in tiles.
    #[serde(default, with = "fixed_serde")]
    pub min_range: Fixed,
    /// Seconds between volleys.
    #[serde(with = "fixed_serde")]
    pub cooldown: Fixed,
    /// Shots per volley. Absent means one shot when damage is positive.
    #[serde(default)]
    pub volley: Option<u32>,
    /// Splash radius for area weapons.
    #[serde(default, with = "option_fixed_serde")]
    pub splash_radius: Option<Fixed>,
    /// Falloff rings for area weapons, innermost first.
    #[serde(default)]
    pub splash_falloff: Vec<SplashTier>,
}

/// Data-driven building definition.
///
/// # Example RON
///
/// ```ron
/// Mill: (
///     name: "Mill",
///     size: 2,
///     health: 1200.0,
///     build_time: Some(15.0),
///     cost: (wood: 50.0),
///     accepts: [food],
///     research: [Basketry, Agriculture, ImprovedProcessing],
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildingData {
    /// Display name.
    pub name: String,

    /// Side length of the square footprint in tiles.
    pub size: i32,

    /// Base maximum health.
    #[serde(with = "fixed_serde")]
    pub health: Fixed,

    /// Construction time in seconds. `None` for buildings that cannot be
    /// placed by players.
    #[serde(default, with = "option_fixed_serde")]
    pub build_time: Option<Fixed>,

    /// Construction cost.
    #[serde(default)]
    pub cost: Stockpile,

    /// Sight radius in tiles.
    #[serde(default = "default_sight", with = "fixed_serde")]
    pub sight: Fixed,

    /// Free-form tag ("Landmark", "Religious Building", ...).
    #[serde(default)]
    pub tag: Option<String>,

    /// Resource kinds villagers may drop off here.
    #[serde(default)]
    pub accepts: Vec<ResourceKind>,

    /// Intrinsic weapon.
    #[serde(default)]
    pub attack: Option<AttackData>,

    /// Units this building trains.
    #[serde(default)]
    pub produce: Vec<UnitType>,

    /// Technologies researched here.
    #[serde(default)]
    pub research: Vec<TechId>,

    /// Flat reduction of incoming ranged damage.
    #[serde(default = "default_ranged_armor", with = "fixed_serde")]
    pub ranged_armor: Fixed,

    /// Flat reduction of incoming melee damage.
    #[serde(default, with = "fixed_serde")]
    pub melee_armor: Fixed,

    /// Minimum age tier to place this building.
    #[serde(default)]
    pub min_age_tier: u8,

    /// Technology required to place this building.
    #[serde(default)]
    pub requires_tech: Option<TechId>,

    /// Relics this building can hold.
    #[serde(default)]
    pub relic_capacity: Option<u32>,

    /// Gold paid per held relic each relic interval.
    #[serde(default, with = "option_fixed_serde")]
    pub relic_gold: Option<Fixed>,

    /// Owned by nobody.
    #[serde(default)]
    pub is_neutral: bool,

    /// Cannot be damaged.
    #[serde(default)]
    pub is_invulnerable: bool,

    /// Member of the age-up landmark pool.
    #[serde(default)]
    pub is_age_landmark: bool,
}

const fn default_sight() -> Fixed {
    fixed_int(4)
}

const fn default_ranged_armor() -> Fixed {
    fixed_int(50)
}

impl BuildingData {
    /// Footprint side length as a fixed-point number.
    #[must_use]
    pub fn footprint(&self) -> Fixed {
        fixed_int(self.size)
    }

    /// Check if this building's tag contains the given text, ignoring case.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag
            .as_deref()
            .is_some_and(|t| t.to_ascii_lowercase().contains(&tag.to_ascii_lowercase()))
    }

    /// Landmark-tagged buildings persist as corpses and decide elimination.
    #[must_use]
    pub fn is_landmark(&self) -> bool {
        self.has_tag("landmark")
    }

    /// Check if villagers can drop off this resource kind here.
    #[must_use]
    pub fn accepts(&self, kind: ResourceKind) -> bool {
        self.accepts.contains(&kind)
    }

    /// Check if this building trains the unit type.
    #[must_use]
    pub fn produces(&self, unit: UnitType) -> bool {
        self.produce.contains(&unit)
    }

    /// Check if this building researches the technology.
    #[must_use]
    pub fn researches(&self, tech: TechId) -> bool {
        self.research.contains(&tech)
    }
}
