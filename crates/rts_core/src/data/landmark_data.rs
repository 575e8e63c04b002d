//! Per-age bonus tables for age-up landmarks.

use serde::{Deserialize, Serialize};

use crate::economy::Stockpile;
use crate::math::{fixed_serde, fixed_vec_serde, Fixed};

/// Index into a per-age table for a landmark completed at `age_tier`.
///
/// Tier 0 and tier 1 both read the first entry.
#[must_use]
pub fn bonus_index(age_tier: u8) -> usize {
    usize::from(age_tier.clamp(1, 4) - 1)
}

/// Read a per-age value, or zero when the table is short.
#[must_use]
pub fn by_age(values: &[Fixed], age_tier: u8) -> Fixed {
    values.get(bonus_index(age_tier)).copied().unwrap_or(Fixed::ZERO)
}

/// Technology landmark.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroveBonuses {
    /// Fractional reduction of every technology cost.
    #[serde(with = "fixed_vec_serde")]
    pub tech_cost_reduction_by_age: Vec<Fixed>,
    /// Cost of the landmark's own technologies.
    pub tech_cost_by_age: Vec<Stockpile>,
}

/// Military production landmark.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArgentBonuses {
    /// Infantry production speed bonus (time divided by `1 + bonus`).
    #[serde(with = "fixed_vec_serde")]
    pub production_speed_bonus_by_age: Vec<Fixed>,
    /// Infantry health multiplier bonus.
    #[serde(with = "fixed_vec_serde")]
    pub infantry_health_bonus_by_age: Vec<Fixed>,
}

/// Defensive landmark.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpireBonuses {
    /// Maximum health.
    #[serde(with = "fixed_vec_serde")]
    pub hp_by_age: Vec<Fixed>,
    /// Arrowslit shots per volley.
    pub arrowslits_by_age: Vec<u32>,
    /// Arrowslit damage per shot.
    #[serde(with = "fixed_vec_serde")]
    pub arrowslit_damage_by_age: Vec<Fixed>,
    /// Garrison capacity.
    pub garrison_by_age: Vec<u32>,
}

/// Economic landmark converting food drop-offs into gold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OldMarketBonuses {
    /// Gold granted per food dropped off.
    #[serde(with = "fixed_vec_serde")]
    pub food_to_gold_by_age: Vec<Fixed>,
}

/// Religious landmark with a healing aura.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SanctumBonuses {
    /// Aura radius.
    #[serde(with = "fixed_serde")]
    pub aura_range: Fixed,
    /// Healing per second for units out of combat.
    #[serde(with = "fixed_vec_serde")]
    pub aura_heal_by_age: Vec<Fixed>,
    /// Cost reduction of religious units trained here.
    #[serde(with = "fixed_vec_serde")]
    pub religious_cost_reduction_by_age: Vec<Fixed>,
}

/// Military landmark with healing and damage auras.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BasilicaBonuses {
    /// Aura radius.
    #[serde(with = "fixed_serde")]
    pub aura_range: Fixed,
    /// Healing per second.
    #[serde(with = "fixed_vec_serde")]
    pub aura_heal_by_age: Vec<Fixed>,
    /// Damage multiplier bonus.
    #[serde(with = "fixed_vec_serde")]
    pub aura_damage_by_age: Vec<Fixed>,
}

/// Religious landmark paying relic income in every resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvermistBonuses {
    /// Income per relic per minute.
    pub income_per_minute_by_age: Vec<Stockpile>,
}

/// Economic landmark with a gather aura and resource conversion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FountainBonuses {
    /// Aura radius.
    #[serde(with = "fixed_serde")]
    pub aura_range: Fixed,
    /// Gather rate bonus for villagers inside the aura.
    #[serde(with = "fixed_vec_serde")]
    pub gather_rate_bonus_by_age: Vec<Fixed>,
}

/// All landmark bonus tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LandmarkBonuses {
    /// GroveUniversity.
    pub grove: GroveBonuses,
    /// ArgentThroneComplex.
    pub argent: ArgentBonuses,
    /// DominionSpire.
    pub spire: SpireBonuses,
    /// OldMarketPavilion.
    pub old_market: OldMarketBonuses,
    /// SanctumOfTheVeil.
    pub sanctum: SanctumBonuses,
    /// BasilicaOfEternalLight.
    pub basilica: BasilicaBonuses,
    /// EvermistGardens.
    pub evermist: EvermistBonuses,
    /// GoldenFountainSquare.
    pub fountain: FountainBonuses,
}
