//! Entity records owned by a match: units, buildings, resource nodes and
//! relics.
//!
//! Entities are plain data. Every cross-entity reference is an id resolved
//! through [`crate::state::Match`] at the moment it is needed, so a record
//! never holds a stale borrow of another one across a tick.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::economy::Stockpile;
use crate::kinds::{BuildingType, ResourceKind, ResourceNodeType, TechId, UnitType};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::orders::Order;

/// Unique identifier for entities. One id space is shared by every entity
/// kind within a match.
pub type EntityId = u64;

/// Stable player slot (0..=3). Index 1 may own units without a player slot
/// (singleplayer cheat enemies).
pub type PlayerIndex = u8;

/// Reference to either a unit or a building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityRef {
    /// A unit id.
    Unit(EntityId),
    /// A building id.
    Building(EntityId),
}

impl EntityRef {
    /// The raw id.
    #[must_use]
    pub const fn id(self) -> EntityId {
        match self {
            Self::Unit(id) | Self::Building(id) => id,
        }
    }

    /// Check if this refers to a building.
    #[must_use]
    pub const fn is_building(self) -> bool {
        matches!(self, Self::Building(_))
    }
}

/// Resources carried by a villager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Carry {
    /// Kind being carried, if any.
    pub kind: Option<ResourceKind>,
    /// Amount carried.
    #[serde(with = "fixed_serde")]
    pub amount: Fixed,
}

impl Carry {
    /// Check if nothing is carried.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() || self.amount <= Fixed::ZERO
    }

    /// Drop whatever is carried.
    pub fn clear(&mut self) {
        self.kind = None;
        self.amount = Fixed::ZERO;
    }
}

/// Knight charge state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChargeState {
    /// Charging towards `target`.
    pub active: bool,
    /// Seconds spent charging.
    #[serde(with = "fixed_serde")]
    pub time: Fixed,
    /// Seconds until the next charge may start.
    #[serde(with = "fixed_serde")]
    pub cooldown: Fixed,
    /// Charge target.
    pub target: Option<EntityRef>,
}

/// Which building a trader is heading to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TradeLeg {
    /// Towards the neutral trade post.
    ToDest,
    /// Back to the owner's market.
    ToHome,
}

/// Trade route of a trader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TradeState {
    /// Owner's market.
    pub home: Option<EntityId>,
    /// Neutral trade post.
    pub dest: Option<EntityId>,
    /// Market applied at the next arrival.
    pub pending_home: Option<EntityId>,
    /// Trade post applied at the next arrival.
    pub pending_dest: Option<EntityId>,
    /// Current leg.
    pub leg: Option<TradeLeg>,
    /// Gold paid on arrival.
    #[serde(with = "fixed_serde")]
    pub next_gold: Fixed,
    /// A player move order interrupted the route.
    pub paused: bool,
}

/// Cached A* path.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PathState {
    /// Cell-centre waypoints. Empty means "no path, move directly".
    pub waypoints: Vec<Vec2Fixed>,
    /// Next waypoint.
    pub index: usize,
    /// Cell the path was computed for.
    pub target_cell: Option<(i32, i32)>,
    /// Tick the path was computed on.
    pub computed_tick: u64,
}

impl PathState {
    /// Forget the cached path.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Progress tracking used to unstick gatherers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GatherStall {
    /// Node being approached.
    pub resource: Option<EntityId>,
    /// Best distance to the node seen so far.
    pub best_distance: Option<Fixed>,
    /// Seconds without meaningful progress.
    #[serde(with = "fixed_serde")]
    pub timer: Fixed,
}

/// A mobile entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Entity id.
    pub id: EntityId,
    /// Owning player index.
    pub owner: PlayerIndex,
    /// Unit type.
    pub kind: UnitType,
    /// Centre position in tiles.
    pub position: Vec2Fixed,
    /// Current health.
    #[serde(with = "fixed_serde")]
    pub hp: Fixed,
    /// Maximum health.
    #[serde(with = "fixed_serde")]
    pub max_hp: Fixed,
    /// Extra health multiplier granted at spawn (military landmark).
    #[serde(with = "fixed_serde")]
    pub bonus_hp_multiplier: Fixed,
    /// Active order.
    pub order: Option<Order>,
    /// Pending orders, oldest first.
    pub order_queue: VecDeque<Order>,
    /// Current combat target.
    pub attack_target: Option<EntityRef>,
    /// Seconds until the next attack.
    #[serde(with = "fixed_serde")]
    pub attack_cooldown: Fixed,
    /// Facing angle in radians.
    #[serde(with = "fixed_serde")]
    pub facing: Fixed,
    /// Monk is currently healing.
    pub is_healing: bool,
    /// Last tick this unit dealt or took damage.
    pub last_combat_tick: Option<u64>,
    /// Knight charge.
    pub charge: ChargeState,
    /// Carried resources.
    pub carry: Carry,
    /// Carried relic.
    pub relic: Option<EntityId>,
    /// Trade route (traders only).
    pub trade: Option<TradeState>,
    /// Cached path.
    pub path: PathState,
    /// Gatherer progress tracking.
    pub gather_stall: GatherStall,
}

impl Unit {
    /// Create a unit at full health.
    #[must_use]
    pub fn new(id: EntityId, owner: PlayerIndex, kind: UnitType, position: Vec2Fixed, max_hp: Fixed) -> Self {
        Self {
            id,
            owner,
            kind,
            position,
            hp: max_hp,
            max_hp,
            bonus_hp_multiplier: Fixed::ONE,
            order: None,
            order_queue: VecDeque::new(),
            attack_target: None,
            attack_cooldown: Fixed::ZERO,
            facing: Fixed::ZERO,
            is_healing: false,
            last_combat_tick: None,
            charge: ChargeState::default(),
            carry: Carry::default(),
            relic: None,
            trade: (kind == UnitType::Trader).then(TradeState::default),
            path: PathState::default(),
            gather_stall: GatherStall::default(),
        }
    }

    /// Check if the unit is alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.hp > Fixed::ZERO
    }

    /// Check if the unit is below maximum health.
    #[must_use]
    pub fn is_damaged(&self) -> bool {
        self.hp < self.max_hp
    }

    /// Reference to this unit.
    #[must_use]
    pub const fn entity_ref(&self) -> EntityRef {
        EntityRef::Unit(self.id)
    }
}

/// A unit absorbed into a building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarrisonSlot {
    /// Id the unit had before garrisoning.
    pub id: EntityId,
    /// Unit type, used to respawn it.
    pub kind: UnitType,
}

/// Where newly produced units go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RallyPoint {
    /// World point.
    pub position: Vec2Fixed,
    /// Resource node villagers should gather from.
    pub resource: Option<EntityId>,
}

/// What a production job makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    /// Train a unit.
    Unit(UnitType),
    /// Research a technology.
    Tech(TechId),
}

/// One entry of a building's production queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionJob {
    /// Unit or technology.
    pub kind: JobKind,
    /// Seconds left.
    #[serde(with = "fixed_serde")]
    pub remaining: Fixed,
    /// Total seconds.
    #[serde(with = "fixed_serde")]
    pub total: Fixed,
    /// Cost paid at enqueue, refunded on cancel.
    pub cost: Stockpile,
    /// Finished but held back by the population cap.
    pub stalled: bool,
}

impl ProductionJob {
    /// Unit type if this is a unit job.
    #[must_use]
    pub const fn unit(&self) -> Option<UnitType> {
        match self.kind {
            JobKind::Unit(unit) => Some(unit),
            JobKind::Tech(_) => None,
        }
    }

    /// Technology if this is a research job.
    #[must_use]
    pub const fn tech(&self) -> Option<TechId> {
        match self.kind {
            JobKind::Tech(tech) => Some(tech),
            JobKind::Unit(_) => None,
        }
    }
}

/// Independent weapons a building may carry. Each has its own cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackProfileId {
    /// Intrinsic weapon from content.
    Base,
    /// Outpost arrowslits.
    Arrowslits,
    /// Springald emplacement.
    Springald,
    /// Defensive landmark arrowslits.
    SpireArrowslits,
    /// Defensive landmark garrison fire.
    SpireGarrison,
    /// Stone tower garrison fire.
    GarrisonArrows,
    /// Long-range splash artillery.
    Disruptor,
}

/// A placed structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    /// Entity id.
    pub id: EntityId,
    /// Owning player; `None` for neutral structures.
    pub owner: Option<PlayerIndex>,
    /// Building type.
    pub kind: BuildingType,
    /// Top-left corner in tiles.
    pub position: Vec2Fixed,
    /// Current health.
    #[serde(with = "fixed_serde")]
    pub hp: Fixed,
    /// Maximum health.
    #[serde(with = "fixed_serde")]
    pub max_hp: Fixed,
    /// Garrisoned units.
    pub garrison: Vec<GarrisonSlot>,
    /// Seconds until each weapon may fire again.
    pub attack_cooldowns: BTreeMap<AttackProfileId, Fixed>,
    /// Unit and research jobs, head first.
    pub production_queue: VecDeque<ProductionJob>,
    /// Building-scoped technologies.
    pub techs: BTreeSet<TechId>,
    /// Rally point.
    pub rally: Option<RallyPoint>,
    /// Player-issued target.
    pub attack_target: Option<EntityRef>,
    /// Construction not finished.
    pub under_construction: bool,
    /// Seconds of construction done.
    #[serde(with = "fixed_serde")]
    pub build_progress: Fixed,
    /// Seconds of construction needed.
    #[serde(with = "fixed_serde")]
    pub build_time: Fixed,
    /// Villager working this farm.
    pub farmer: Option<EntityId>,
    /// Stored relics, oldest first.
    pub relics: Vec<EntityId>,
    /// Seconds accumulated towards the next relic payout.
    #[serde(with = "fixed_serde")]
    pub relic_timer: Fixed,
    /// Placed at match start.
    pub starting_town_center: bool,
    /// Cost paid at placement, refunded by cancel.
    pub cost_paid: Option<Stockpile>,
    /// Age tier granted when this landmark completed.
    pub landmark_age_tier: Option<u8>,
    /// Landmark reduced to zero health but kept as a corpse.
    pub landmark_destroyed: bool,
    /// Resource a drop-off here is converted into.
    pub fountain_mode: Option<ResourceKind>,
}

impl Building {
    /// Create a completed building at full health.
    #[must_use]
    pub fn new(
        id: EntityId,
        owner: Option<PlayerIndex>,
        kind: BuildingType,
        position: Vec2Fixed,
        max_hp: Fixed,
        build_time: Fixed,
    ) -> Self {
        Self {
            id,
            owner,
            kind,
            position,
            hp: max_hp,
            max_hp,
            garrison: Vec::new(),
            attack_cooldowns: BTreeMap::new(),
            production_queue: VecDeque::new(),
            techs: BTreeSet::new(),
            rally: None,
            attack_target: None,
            under_construction: false,
            build_progress: Fixed::ZERO,
            build_time,
            farmer: None,
            relics: Vec::new(),
            relic_timer: Fixed::ZERO,
            starting_town_center: false,
            cost_paid: None,
            landmark_age_tier: None,
            landmark_destroyed: false,
            fountain_mode: (kind == BuildingType::GoldenFountainSquare).then_some(ResourceKind::Food),
        }
    }

    /// Reference to this building.
    #[must_use]
    pub const fn entity_ref(&self) -> EntityRef {
        EntityRef::Building(self.id)
    }

    /// Check if owned by `player`.
    #[must_use]
    pub fn is_owned_by(&self, player: PlayerIndex) -> bool {
        self.owner == Some(player)
    }
}

/// A gatherable resource node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Entity id.
    pub id: EntityId,
    /// Node type.
    pub node_type: ResourceNodeType,
    /// Resource kind yielded.
    pub kind: ResourceKind,
    /// Top-left corner in tiles.
    pub position: Vec2Fixed,
    /// Footprint side length.
    pub size: i32,
    /// Remaining amount.
    #[serde(with = "fixed_serde")]
    pub amount: Fixed,
}

impl ResourceNode {
    /// Footprint centre.
    #[must_use]
    pub fn center(&self) -> Vec2Fixed {
        let half = Fixed::from_num(self.size) / 2;
        Vec2Fixed::new(self.position.x + half, self.position.y + half)
    }

    /// Check if the node has run dry.
    #[must_use]
    pub fn is_depleted(&self) -> bool {
        self.amount <= Fixed::ZERO
    }

    /// Check if a point lies on the footprint (edges included).
    #[must_use]
    pub fn contains(&self, point: Vec2Fixed) -> bool {
        let size = Fixed::from_num(self.size);
        point.x >= self.position.x
            && point.x <= self.position.x + size
            && point.y >= self.position.y
            && point.y <= self.position.y + size
    }
}

/// Where a relic is. A relic is in exactly one of these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelicHolder {
    /// Lying on the map.
    Ground,
    /// Carried by a monk.
    Carried(EntityId),
    /// Stored in a building.
    Stored(EntityId),
}

/// A relic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relic {
    /// Entity id.
    pub id: EntityId,
    /// Position (centre).
    pub position: Vec2Fixed,
    /// Current holder.
    pub holder: RelicHolder,
}

impl Relic {
    /// Pickup radius.
    pub const RADIUS: Fixed = crate::math::fixed_ratio(45, 100);

    /// Carrying unit, if any.
    #[must_use]
    pub const fn carrier(&self) -> Option<EntityId> {
        match self.holder {
            RelicHolder::Carried(id) => Some(id),
            _ => None,
        }
    }

    /// Storing building, if any.
    #[must_use]
    pub const fn stored_in(&self) -> Option<EntityId> {
        match self.holder {
            RelicHolder::Stored(id) => Some(id),
            _ => None,
        }
    }

    /// Check if the relic is on the ground.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        matches!(self.holder, RelicHolder::Ground)
    }
}
