//! Strongly typed identifiers for content: unit, building, technology and
//! resource kinds.
//!
//! Each id has a stable wire name (its variant name, or lowercase for
//! resource kinds) used by content files, commands and snapshots.

use serde::{Deserialize, Serialize};

use crate::error::GameError;

macro_rules! content_ids {
    (
        $(#[$meta:meta])*
        $name:ident ($label:literal) {
            $($(#[$vmeta:meta])* $variant:ident),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every id, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire name of this id.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = GameError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok($name::$variant),)+
                    _ => Err(GameError::UnknownContent {
                        kind: $label,
                        id: s.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

content_ids! {
    /// Unit types.
    UnitType("unit") {
        /// Gatherer and builder.
        Villager,
        /// Market-to-trade-post gold runner.
        Trader,
        /// Healer and relic carrier.
        Monk,
        /// Fast light cavalry with long sight.
        Scout,
        /// Anti-cavalry infantry.
        Spearman,
        /// Heavy melee infantry.
        ManAtArms,
        /// Anti-ranged light cavalry.
        Horseman,
        /// Heavy cavalry with a charge attack.
        Knight,
        /// Light ranged infantry.
        Archer,
        /// Anti-armour ranged infantry.
        Crossbowman,
        /// Gunpowder ranged infantry.
        Handcannoneer,
        /// Long-range anti-building siege.
        CounterweightTrebuchet,
        /// Gunpowder siege.
        Cannon,
    }
}

content_ids! {
    /// Building types.
    BuildingType("building") {
        /// Starting drop-off and villager producer.
        TownCenter,
        /// Infinite food source worked by one villager.
        Farm,
        /// Population building.
        House,
        /// Food drop-off.
        Mill,
        /// Wood drop-off.
        LumberCamp,
        /// Gold and stone drop-off.
        MiningCamp,
        /// Trader producer and trade route home.
        Market,
        /// Monk producer and relic store.
        Monastery,
        /// Neutral trade destination.
        TradePost,
        /// Technology landmark.
        GroveUniversity,
        /// Military production landmark.
        ArgentThroneComplex,
        /// Defensive landmark.
        DominionSpire,
        /// Economic landmark converting food to gold.
        OldMarketPavilion,
        /// Religious landmark with a healing aura.
        SanctumOfTheVeil,
        /// Military landmark with healing and damage auras.
        BasilicaOfEternalLight,
        /// Religious landmark with relic income.
        EvermistGardens,
        /// Economic landmark accepting and converting all resources.
        GoldenFountainSquare,
        /// Melee infantry producer.
        Barracks,
        /// Military technology building.
        Armory,
        /// Late technology building.
        TechLab,
        /// Ranged infantry producer.
        ArcheryRange,
        /// Cavalry producer.
        Stable,
        /// Siege producer.
        SiegeWorkshop,
        /// Light tower.
        Outpost,
        /// Heavy tower.
        StoneTower,
        /// Fortress.
        Castle,
        /// Long-range splash artillery.
        DisruptorCannon,
    }
}

content_ids! {
    /// Technology ids.
    #[allow(missing_docs)]
    TechId("technology") {
        CarryingFrame,
        Resourcefulness,
        RapidFabrications,
        AdvancedRadar,
        ImprovedGunpowder,
        SuperWeapons,
        Basketry,
        Agriculture,
        ImprovedProcessing,
        OakHandle,
        DoubleHeadedAxe,
        WoodSaws,
        CarbideTip,
        HeavySwings,
        TungstenTip,
        Arrowslits,
        SpringaldEmplacement,
        GreaterRations,
        SecondWind,
        BedrockFoundations,
        SpearmanIron,
        SpearmanDiamond,
        SpearmanEmerald,
        SpearmanEnlightened,
        ArcherDiamond,
        ArcherEmerald,
        ArcherEnlightened,
        HorsemanDiamond,
        HorsemanEmerald,
        HorsemanEnlightened,
        KnightEmerald,
        KnightEnlightened,
        ManAtArmsEmerald,
        ManAtArmsEnlightened,
        CrossbowmanEmerald,
        CrossbowmanEnlightened,
        HandcannoneerEnlightened,
        IronForging,
        LightweightShafts,
        ChainmailArmor,
        LeatherPadding,
        DiamondForging,
        EmeraldForging,
        EnlightenedForging,
        PiercingPoints,
        Aerodynamic,
        BodkinBolts,
        DiamondArmor,
        EmeraldArmor,
        EnlightenedArmor,
        ImprovedShields,
        DeflectiveScales,
        GildedFittings,
        IronEra,
        DiamondEra,
        EmeraldEra,
        EnlightenedEra,
    }
}

impl TechId {
    /// Armory technologies adding +1 melee damage.
    pub const MELEE_DAMAGE: [TechId; 4] = [
        TechId::IronForging,
        TechId::DiamondForging,
        TechId::EmeraldForging,
        TechId::EnlightenedForging,
    ];
    /// Armory technologies adding +1 ranged damage.
    pub const RANGED_DAMAGE: [TechId; 4] = [
        TechId::LightweightShafts,
        TechId::PiercingPoints,
        TechId::Aerodynamic,
        TechId::BodkinBolts,
    ];
    /// Armory technologies adding +1 melee armour.
    pub const MELEE_ARMOR: [TechId; 4] = [
        TechId::ChainmailArmor,
        TechId::DiamondArmor,
        TechId::EmeraldArmor,
        TechId::EnlightenedArmor,
    ];
    /// Armory technologies adding +1 ranged armour.
    pub const RANGED_ARMOR: [TechId; 4] = [
        TechId::LeatherPadding,
        TechId::ImprovedShields,
        TechId::DeflectiveScales,
        TechId::GildedFittings,
    ];
}

/// Player resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Food.
    Food,
    /// Wood.
    Wood,
    /// Gold.
    Gold,
    /// Stone.
    Stone,
}

impl ResourceKind {
    /// All kinds in stockpile order.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Food,
        ResourceKind::Wood,
        ResourceKind::Gold,
        ResourceKind::Stone,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Food => "food",
            ResourceKind::Wood => "wood",
            ResourceKind::Gold => "gold",
            ResourceKind::Stone => "stone",
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "food" => Ok(ResourceKind::Food),
            "wood" => Ok(ResourceKind::Wood),
            "gold" => Ok(ResourceKind::Gold),
            "stone" => Ok(ResourceKind::Stone),
            _ => Err(GameError::UnknownContent {
                kind: "resource",
                id: s.to_string(),
            }),
        }
    }
}

/// Map resource node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceNodeType {
    /// Berry bush (food).
    Berry,
    /// Tree (wood).
    Tree,
    /// Gold mine.
    Gold,
    /// Stone quarry.
    Stone,
}
