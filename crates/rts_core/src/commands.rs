//! Player commands as they arrive from clients, and their outcomes.
//!
//! Clients are untrusted, so every field is read leniently: ids that are not
//! non-negative numbers become invalid rather than failing the whole command,
//! id lists are de-duplicated and capped, and malformed points carry NaN so
//! the dispatcher can reject them with a proper reason.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::entities::EntityId;

/// Longest id list a single command may act on.
pub const MAX_COMMAND_IDS: usize = 256;

/// A JSON value, read without caring about its exact shape.
#[derive(Debug, Clone, PartialEq)]
enum Loose {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Loose>),
    Object(BTreeMap<String, Loose>),
}

impl Loose {
    /// Numeric coercion: numbers and numeric strings.
    fn coerce(&self) -> f64 {
        match self {
            Loose::Number(n) => *n,
            Loose::Text(s) => s.trim().parse().unwrap_or(f64::NAN),
            Loose::Bool(b) => f64::from(u8::from(*b)),
            _ => f64::NAN,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Loose::Null => false,
            Loose::Bool(b) => *b,
            Loose::Number(n) => *n != 0.0 && !n.is_nan(),
            Loose::Text(s) => !s.is_empty(),
            Loose::List(_) | Loose::Object(_) => true,
        }
    }

    fn id(&self) -> IdField {
        if matches!(self, Loose::Null) {
            return IdField::Absent;
        }
        let n = self.coerce();
        if !n.is_finite() {
            return IdField::Invalid;
        }
        let n = n.trunc();
        if n < 0.0 {
            return IdField::Invalid;
        }
        // Saturating cast; ids that large never exist.
        IdField::Id(n as EntityId)
    }

    fn point(&self) -> RawPoint {
        let Loose::Object(fields) = self else {
            return RawPoint::INVALID;
        };
        let coord = |key: &str| fields.get(key).map_or(f64::NAN, Loose::coerce);
        RawPoint {
            x: coord("x"),
            y: coord("y"),
        }
    }
}

struct LooseVisitor;

impl<'de> Visitor<'de> for LooseVisitor {
    type Value = Loose;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Loose, E> {
        Ok(Loose::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Loose, E> {
        Ok(Loose::Number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Loose, E> {
        Ok(Loose::Number(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Loose, E> {
        Ok(Loose::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Loose, E> {
        Ok(Loose::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Loose, E> {
        Ok(Loose::Text(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Loose, E> {
        Ok(Loose::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Loose, E> {
        Ok(Loose::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Loose, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Loose, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Loose::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Loose, A::Error> {
        let mut fields = BTreeMap::new();
        while let Some((key, value)) = map.next_entry::<String, Loose>()? {
            fields.insert(key, value);
        }
        Ok(Loose::Object(fields))
    }
}

impl<'de> Deserialize<'de> for Loose {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(LooseVisitor)
    }
}

/// A single entity id field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdField {
    /// Missing or `null`.
    #[default]
    Absent,
    /// Present but not a non-negative number.
    Invalid,
    /// A usable id.
    Id(EntityId),
}

impl IdField {
    /// The id, if usable.
    #[must_use]
    pub const fn id(self) -> Option<EntityId> {
        match self {
            IdField::Id(id) => Some(id),
            _ => None,
        }
    }

    /// Check if the field was sent at all.
    #[must_use]
    pub const fn is_present(self) -> bool {
        !matches!(self, IdField::Absent)
    }
}

impl From<EntityId> for IdField {
    fn from(id: EntityId) -> Self {
        IdField::Id(id)
    }
}

/// A world point as sent; either coordinate may be NaN when malformed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawPoint {
    pub x: f64,
    pub y: f64,
}

impl RawPoint {
    /// A point that never validates.
    pub const INVALID: RawPoint = RawPoint { x: f64::NAN, y: f64::NAN };

    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Check if both coordinates are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Normalise an id list: keep non-negative numbers, drop duplicates, stop at
/// [`MAX_COMMAND_IDS`].
#[must_use]
pub fn normalize_ids<I: IntoIterator<Item = IdField>>(entries: I) -> Vec<EntityId> {
    let mut out: Vec<EntityId> = Vec::new();
    for id in entries.into_iter().filter_map(IdField::id) {
        if out.contains(&id) {
            continue;
        }
        out.push(id);
        if out.len() >= MAX_COMMAND_IDS {
            break;
        }
    }
    out
}

mod lenient {
    use serde::{Deserialize, Deserializer};

    use super::{normalize_ids, IdField, Loose, RawPoint};
    use crate::entities::EntityId;

    pub fn ids<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<EntityId>, D::Error> {
        Ok(match Loose::deserialize(d)? {
            Loose::List(items) => normalize_ids(items.iter().map(Loose::id)),
            _ => Vec::new(),
        })
    }

    /// Like [`ids`], but keeps "not a list" apart from "empty list".
    pub fn id_list<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<EntityId>>, D::Error> {
        Ok(match Loose::deserialize(d)? {
            Loose::List(items) => Some(normalize_ids(items.iter().map(Loose::id))),
            _ => None,
        })
    }

    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<IdField, D::Error> {
        Ok(Loose::deserialize(d)?.id())
    }

    pub fn point<'de, D: Deserializer<'de>>(d: D) -> Result<RawPoint, D::Error> {
        Ok(Loose::deserialize(d)?.point())
    }

    /// A point that may be left out; falsy values count as left out.
    pub fn optional_point<'de, D: Deserializer<'de>>(d: D) -> Result<Option<RawPoint>, D::Error> {
        let value = Loose::deserialize(d)?;
        Ok(value.truthy().then(|| value.point()))
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Loose::deserialize(d)?.coerce())
    }

    /// Only genuine JSON numbers.
    pub fn strict_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Loose::deserialize(d)? {
            Loose::Number(n) => Some(n),
            _ => None,
        })
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Loose::deserialize(d)? {
            Loose::Text(s) => s,
            _ => String::new(),
        })
    }

    pub fn optional_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Loose::deserialize(d)? {
            Loose::Text(s) => Some(s),
            _ => None,
        })
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(Loose::deserialize(d)?.truthy())
    }
}

fn nan() -> f64 {
    f64::NAN
}

fn invalid_point() -> RawPoint {
    RawPoint::INVALID
}

/// A command sent by a player during a match.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Walk to a point.
    #[serde(rename_all = "camelCase")]
    Move {
        #[serde(default, deserialize_with = "lenient::ids")]
        unit_ids: Vec<EntityId>,
        #[serde(default = "invalid_point", deserialize_with = "lenient::point")]
        target: RawPoint,
        #[serde(default, deserialize_with = "lenient::flag")]
        queue: bool,
    },
    /// Walk to a point, fighting anything met on the way.
    #[serde(rename_all = "camelCase")]
    AttackMove {
        #[serde(default, deserialize_with = "lenient::ids")]
        unit_ids: Vec<EntityId>,
        #[serde(default = "invalid_point", deserialize_with = "lenient::point")]
        target: RawPoint,
        #[serde(default, deserialize_with = "lenient::flag")]
        queue: bool,
    },
    /// Attack one enemy unit or building.
    #[serde(rename_all = "camelCase")]
    AttackTarget {
        #[serde(default, deserialize_with = "lenient::ids")]
        unit_ids: Vec<EntityId>,
        #[serde(default, deserialize_with = "lenient::id")]
        target_id: IdField,
        #[serde(default, deserialize_with = "lenient::flag")]
        queue: bool,
    },
    /// Point defensive buildings at one enemy.
    #[serde(rename_all = "camelCase")]
    BuildingAttackTarget {
        #[serde(default, deserialize_with = "lenient::id_list")]
        building_ids: Option<Vec<EntityId>>,
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
        #[serde(default, deserialize_with = "lenient::id")]
        target_id: IdField,
    },
    /// Send monks to heal a friendly unit.
    #[serde(rename_all = "camelCase")]
    HealTarget {
        #[serde(default, deserialize_with = "lenient::ids")]
        unit_ids: Vec<EntityId>,
        #[serde(default, deserialize_with = "lenient::id")]
        target_id: IdField,
        #[serde(default, deserialize_with = "lenient::flag")]
        queue: bool,
    },
    /// Send villagers to a resource node.
    #[serde(rename_all = "camelCase")]
    Gather {
        #[serde(default, deserialize_with = "lenient::ids")]
        unit_ids: Vec<EntityId>,
        #[serde(default, deserialize_with = "lenient::id")]
        resource_id: IdField,
        #[serde(default, deserialize_with = "lenient::flag")]
        queue: bool,
    },
    /// Send monks to pick up a relic.
    #[serde(rename_all = "camelCase")]
    PickupRelic {
        #[serde(default, deserialize_with = "lenient::ids")]
        unit_ids: Vec<EntityId>,
        #[serde(default, deserialize_with = "lenient::id")]
        relic_id: IdField,
        #[serde(default, deserialize_with = "lenient::flag")]
        queue: bool,
    },
    /// Drop carried relics at a point, or store them if the point is on a
    /// relic building. Without a target monks drop where they stand.
    #[serde(rename_all = "camelCase")]
    DropRelicAt {
        #[serde(default, deserialize_with = "lenient::ids")]
        unit_ids: Vec<EntityId>,
        #[serde(default, deserialize_with = "lenient::optional_point")]
        target: Option<RawPoint>,
        #[serde(default, deserialize_with = "lenient::flag")]
        queue: bool,
    },
    /// Store carried relics in a building.
    #[serde(rename_all = "camelCase")]
    DepositRelic {
        #[serde(default, deserialize_with = "lenient::ids")]
        unit_ids: Vec<EntityId>,
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
        #[serde(default, deserialize_with = "lenient::flag")]
        queue: bool,
    },
    /// Take a stored relic out of a building.
    #[serde(rename_all = "camelCase")]
    TakeRelic {
        #[serde(default, deserialize_with = "lenient::ids")]
        unit_ids: Vec<EntityId>,
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
        #[serde(default, deserialize_with = "lenient::flag")]
        queue: bool,
    },
    /// Set the home market of traders.
    #[serde(rename_all = "camelCase")]
    SetTradeHome {
        #[serde(default, deserialize_with = "lenient::ids")]
        unit_ids: Vec<EntityId>,
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
    },
    /// Set the destination trade post of traders.
    #[serde(rename_all = "camelCase")]
    SetTradeDestination {
        #[serde(default, deserialize_with = "lenient::ids")]
        unit_ids: Vec<EntityId>,
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
    },
    /// Put traders with a full route back to work.
    #[serde(rename_all = "camelCase")]
    RestartTrading {
        #[serde(default, deserialize_with = "lenient::ids")]
        unit_ids: Vec<EntityId>,
    },
    /// Place a new building and send villagers to construct it.
    #[serde(rename_all = "camelCase")]
    Build {
        #[serde(default, deserialize_with = "lenient::text")]
        building_type: String,
        #[serde(default, deserialize_with = "lenient::ids")]
        builder_ids: Vec<EntityId>,
        #[serde(default = "nan", deserialize_with = "lenient::number")]
        x: f64,
        #[serde(default = "nan", deserialize_with = "lenient::number")]
        y: f64,
    },
    /// Send villagers to an unfinished building.
    #[serde(rename_all = "camelCase")]
    AssignBuild {
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
        #[serde(default, deserialize_with = "lenient::ids")]
        builder_ids: Vec<EntityId>,
        #[serde(default, deserialize_with = "lenient::flag")]
        queue: bool,
    },
    /// Repair a building or a siege unit.
    #[serde(rename_all = "camelCase")]
    Repair {
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
        #[serde(default, deserialize_with = "lenient::id")]
        unit_id: IdField,
        #[serde(default, deserialize_with = "lenient::ids")]
        builder_ids: Vec<EntityId>,
        #[serde(default, deserialize_with = "lenient::flag")]
        queue: bool,
    },
    /// Cancel an unfinished building and get its cost back.
    #[serde(rename_all = "camelCase")]
    CancelBuild {
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
    },
    /// Put a villager on an empty farm.
    #[serde(rename_all = "camelCase")]
    FarmAssign {
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
        #[serde(default, deserialize_with = "lenient::ids")]
        builder_ids: Vec<EntityId>,
        #[serde(default, deserialize_with = "lenient::flag")]
        queue: bool,
    },
    /// Testing shortcuts.
    #[serde(rename_all = "camelCase")]
    Cheat {
        #[serde(default, deserialize_with = "lenient::text")]
        action: String,
        #[serde(default, deserialize_with = "lenient::optional_text")]
        unit_type: Option<String>,
        #[serde(default = "nan", deserialize_with = "lenient::number")]
        x: f64,
        #[serde(default = "nan", deserialize_with = "lenient::number")]
        y: f64,
        #[serde(default = "invalid_point", deserialize_with = "lenient::point")]
        target: RawPoint,
    },
    /// Send units into a building.
    #[serde(rename_all = "camelCase")]
    Garrison {
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
        #[serde(default, deserialize_with = "lenient::ids")]
        unit_ids: Vec<EntityId>,
        #[serde(default, deserialize_with = "lenient::flag")]
        queue: bool,
    },
    /// Release garrisoned units; all of them when `count` is not a number.
    #[serde(rename_all = "camelCase")]
    Ungarrison {
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
        #[serde(default = "nan", deserialize_with = "lenient::number")]
        count: f64,
    },
    /// Queue a unit.
    #[serde(rename_all = "camelCase")]
    Produce {
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
        #[serde(default, deserialize_with = "lenient::text")]
        unit_type: String,
    },
    /// Remove a queued job and refund it.
    #[serde(rename_all = "camelCase")]
    CancelQueue {
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
        #[serde(default, deserialize_with = "lenient::strict_number")]
        index: Option<f64>,
    },
    /// Remove rally points and forced targets.
    #[serde(rename_all = "camelCase")]
    ClearRally {
        #[serde(default, deserialize_with = "lenient::id_list")]
        building_ids: Option<Vec<EntityId>>,
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
    },
    /// Choose what a fountain converts drop-offs into.
    #[serde(rename_all = "camelCase")]
    SetFountainMode {
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
        #[serde(default, deserialize_with = "lenient::text")]
        kind: String,
    },
    /// Set rally points.
    #[serde(rename_all = "camelCase")]
    Rally {
        #[serde(default, deserialize_with = "lenient::id_list")]
        building_ids: Option<Vec<EntityId>>,
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
        #[serde(default = "invalid_point", deserialize_with = "lenient::point")]
        target: RawPoint,
    },
    /// Queue a technology.
    #[serde(rename_all = "camelCase")]
    Research {
        #[serde(default, deserialize_with = "lenient::text")]
        tech_id: String,
        #[serde(default, deserialize_with = "lenient::id")]
        building_id: IdField,
    },
    /// Leave the match.
    Resign,
}

impl Command {
    /// Wire name of the command.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Command::Move { .. } => "move",
            Command::AttackMove { .. } => "attackMove",
            Command::AttackTarget { .. } => "attackTarget",
            Command::BuildingAttackTarget { .. } => "buildingAttackTarget",
            Command::HealTarget { .. } => "healTarget",
            Command::Gather { .. } => "gather",
            Command::PickupRelic { .. } => "pickupRelic",
            Command::DropRelicAt { .. } => "dropRelicAt",
            Command::DepositRelic { .. } => "depositRelic",
            Command::TakeRelic { .. } => "takeRelic",
            Command::SetTradeHome { .. } => "setTradeHome",
            Command::SetTradeDestination { .. } => "setTradeDestination",
            Command::RestartTrading { .. } => "restartTrading",
            Command::Build { .. } => "build",
            Command::AssignBuild { .. } => "assignBuild",
            Command::Repair { .. } => "repair",
            Command::CancelBuild { .. } => "cancelBuild",
            Command::FarmAssign { .. } => "farmAssign",
            Command::Cheat { .. } => "cheat",
            Command::Garrison { .. } => "garrison",
            Command::Ungarrison { .. } => "ungarrison",
            Command::Produce { .. } => "produce",
            Command::CancelQueue { .. } => "cancelQueue",
            Command::ClearRally { .. } => "clearRally",
            Command::SetFountainMode { .. } => "setFountainMode",
            Command::Rally { .. } => "rally",
            Command::Research { .. } => "research",
            Command::Resign => "resign",
        }
    }
}

/// Why a command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    InvalidPayload,
    InvalidTarget,
    InvalidBuilding,
    InvalidUnit,
    NoAttack,
    NoRoute,
    AgeMax,
    InvalidLandmark,
    LandmarkAlreadyBuilt,
    LandmarkUnderConstruction,
    AgeRequired,
    TechRequired,
    InsufficientResources,
    NoBuilders,
    InvalidLocation,
    NotDamaged,
    BuildingIncomplete,
    BuildingDestroyed,
    CannotProduceHere,
    InvalidUnitType,
    UnknownUnit,
    InvalidIndex,
    InvalidMode,
    UnknownTech,
    CannotResearchHere,
    AlreadyResearched,
    TechPrereq,
    AgeOrder,
    AlreadyResearching,
}

impl Rejection {
    /// Wire reason string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Rejection::InvalidPayload => "invalid_payload",
            Rejection::InvalidTarget => "invalid_target",
            Rejection::InvalidBuilding => "invalid_building",
            Rejection::InvalidUnit => "invalid_unit",
            Rejection::NoAttack => "no_attack",
            Rejection::NoRoute => "no_route",
            Rejection::AgeMax => "age_max",
            Rejection::InvalidLandmark => "invalid_landmark",
            Rejection::LandmarkAlreadyBuilt => "landmark_already_built",
            Rejection::LandmarkUnderConstruction => "landmark_under_construction",
            Rejection::AgeRequired => "age_required",
            Rejection::TechRequired => "tech_required",
            Rejection::InsufficientResources => "insufficient_resources",
            Rejection::NoBuilders => "no_builders",
            Rejection::InvalidLocation => "invalid_location",
            Rejection::NotDamaged => "not_damaged",
            Rejection::BuildingIncomplete => "building_incomplete",
            Rejection::BuildingDestroyed => "building_destroyed",
            Rejection::CannotProduceHere => "cannot_produce_here",
            Rejection::InvalidUnitType => "invalid_unit_type",
            Rejection::UnknownUnit => "unknown_unit",
            Rejection::InvalidIndex => "invalid_index",
            Rejection::InvalidMode => "invalid_mode",
            Rejection::UnknownTech => "unknown_tech",
            Rejection::CannotResearchHere => "cannot_research_here",
            Rejection::AlreadyResearched => "already_researched",
            Rejection::TechPrereq => "tech_prereq",
            Rejection::AgeOrder => "age_order",
            Rejection::AlreadyResearching => "already_researching",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of handling one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Handled, or ignored, without an acknowledgement.
    Silent,
    /// Accepted; `count` is how many entities it applied to, when reported.
    Accepted { count: Option<usize> },
    /// Refused. Match state is untouched.
    Rejected(Rejection),
}

impl CommandOutcome {
    /// Accepted without a count.
    pub const OK: CommandOutcome = CommandOutcome::Accepted { count: None };

    /// Check if the command was refused.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, CommandOutcome::Rejected(_))
    }

    /// Acknowledgement to send back, if any.
    #[must_use]
    pub fn ack(&self) -> Option<Ack> {
        match *self {
            CommandOutcome::Silent => None,
            CommandOutcome::Accepted { count } => Some(Ack {
                ok: true,
                reason: None,
                count,
            }),
            CommandOutcome::Rejected(reason) => Some(Ack::rejected(reason)),
        }
    }
}

impl From<Rejection> for CommandOutcome {
    fn from(reason: Rejection) -> Self {
        CommandOutcome::Rejected(reason)
    }
}

/// Acknowledgement payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Rejection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl Ack {
    /// A refusal.
    #[must_use]
    pub const fn rejected(reason: Rejection) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            count: None,
        }
    }
}
