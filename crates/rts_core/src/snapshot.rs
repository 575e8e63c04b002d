//! Wire views of a match.
//!
//! Snapshots are full, delta-free copies of everything a client draws. All
//! fixed-point values leave the simulation here as `f64`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::combat::ProjectileEvent;
use crate::economy::Stockpile;
use crate::entities::{
    AttackProfileId, Building, Carry, EntityId, EntityRef, GarrisonSlot, JobKind, PlayerIndex, RallyPoint,
    RelicHolder, TradeState, Unit,
};
use crate::kinds::{BuildingType, ResourceKind, ResourceNodeType, TechId, UnitType};
use crate::math::{Fixed, Vec2Fixed};
use crate::orders::{Order, ReturnTo};
use crate::state::{Match, Player};
use crate::stats::{population_cap, population_used};

fn num(value: Fixed) -> f64 {
    value.to_num()
}

/// A point on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointView {
    pub x: f64,
    pub y: f64,
}

impl From<Vec2Fixed> for PointView {
    fn from(p: Vec2Fixed) -> Self {
        let (x, y) = p.to_f64();
        Self { x, y }
    }
}

/// Resource amounts on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StockpileView {
    pub food: f64,
    pub wood: f64,
    pub gold: f64,
    pub stone: f64,
}

impl From<Stockpile> for StockpileView {
    fn from(s: Stockpile) -> Self {
        Self {
            food: num(s.food),
            wood: num(s.wood),
            gold: num(s.gold),
            stone: num(s.stone),
        }
    }
}

/// An order on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<PointView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relic_id: Option<EntityId>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub manual: bool,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        let mut view = Self {
            kind: order.type_name(),
            target: order.target_point().map(PointView::from),
            target_id: None,
            resource_id: None,
            building_id: None,
            relic_id: None,
            manual: false,
        };
        match *order {
            Order::Attack { target, manual } => {
                view.target_id = Some(target.id());
                view.manual = manual;
            }
            Order::Heal { target, manual } => {
                view.target_id = Some(target);
                view.manual = manual;
            }
            Order::Repair { target } => view.target_id = Some(target.id()),
            Order::Gather { resource } => view.resource_id = Some(resource),
            Order::Return { building, resume } => {
                view.building_id = Some(building);
                if let ReturnTo::Resource(resource) = resume {
                    view.resource_id = Some(resource);
                }
            }
            Order::Build { building }
            | Order::Farm { building }
            | Order::Garrison { building }
            | Order::DepositRelic { building }
            | Order::TakeRelic { building }
            | Order::Trade { building } => view.building_id = Some(building),
            Order::PickupRelic { relic } => view.relic_id = Some(relic),
            Order::Move { .. } | Order::AttackMove { .. } | Order::DropRelic { .. } => {}
        }
        view
    }
}

/// Carried resources on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CarryView {
    pub kind: Option<ResourceKind>,
    pub amount: f64,
}

impl From<Carry> for CarryView {
    fn from(c: Carry) -> Self {
        Self {
            kind: c.kind,
            amount: num(c.amount),
        }
    }
}

/// Trade route on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeView {
    pub home_id: Option<EntityId>,
    pub dest_id: Option<EntityId>,
    pub pending_home_id: Option<EntityId>,
    pub pending_dest_id: Option<EntityId>,
    pub leg: Option<crate::entities::TradeLeg>,
    pub next_gold: f64,
    pub paused: bool,
}

impl From<TradeState> for TradeView {
    fn from(t: TradeState) -> Self {
        Self {
            home_id: t.home,
            dest_id: t.dest,
            pending_home_id: t.pending_home,
            pending_dest_id: t.pending_dest,
            leg: t.leg,
            next_gold: num(t.next_gold),
            paused: t.paused,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitView {
    pub id: EntityId,
    pub owner_id: PlayerIndex,
    #[serde(rename = "type")]
    pub kind: UnitType,
    pub x: f64,
    pub y: f64,
    pub hp: f64,
    pub max_hp: f64,
    pub attack_cooldown: f64,
    pub facing: f64,
    pub order_type: Option<&'static str>,
    pub active_order: Option<OrderView>,
    pub queued_orders: Vec<OrderView>,
    pub is_healing: bool,
    pub carry: CarryView,
    pub relic_id: Option<EntityId>,
    pub trade: Option<TradeView>,
    pub attack_target_id: Option<EntityId>,
    pub charging: bool,
}

impl From<&Unit> for UnitView {
    fn from(u: &Unit) -> Self {
        let (x, y) = u.position.to_f64();
        Self {
            id: u.id,
            owner_id: u.owner,
            kind: u.kind,
            x,
            y,
            hp: num(u.hp),
            max_hp: num(u.max_hp),
            attack_cooldown: num(u.attack_cooldown),
            facing: num(u.facing),
            order_type: u.order.as_ref().map(Order::type_name),
            active_order: u.order.as_ref().map(OrderView::from),
            queued_orders: u.order_queue.iter().map(OrderView::from).collect(),
            is_healing: u.is_healing,
            carry: u.carry.into(),
            relic_id: u.relic,
            trade: u.trade.map(TradeView::from),
            attack_target_id: u.attack_target.map(EntityRef::id),
            charging: u.charge.active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub unit_type: Option<UnitType>,
    pub tech_id: Option<TechId>,
    pub remaining: f64,
    pub total: f64,
    pub stalled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RallyView {
    pub x: f64,
    pub y: f64,
    pub resource_id: Option<EntityId>,
}

impl From<RallyPoint> for RallyView {
    fn from(r: RallyPoint) -> Self {
        let (x, y) = r.position.to_f64();
        Self {
            x,
            y,
            resource_id: r.resource,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingView {
    pub id: EntityId,
    pub owner_id: Option<PlayerIndex>,
    #[serde(rename = "type")]
    pub kind: BuildingType,
    pub x: f64,
    pub y: f64,
    pub hp: f64,
    pub max_hp: f64,
    pub attack_cooldowns: BTreeMap<AttackProfileId, f64>,
    pub rally_point: Option<RallyView>,
    pub is_under_construction: bool,
    pub build_progress: f64,
    pub build_time: f64,
    pub farmer_id: Option<EntityId>,
    pub garrison_count: usize,
    pub garrison: Vec<GarrisonSlot>,
    pub production_queue: Vec<JobView>,
    pub techs: Vec<TechId>,
    pub relic_ids: Vec<EntityId>,
    pub landmark_age_tier: Option<u8>,
    pub landmark_destroyed: bool,
    pub convert_resource_kind: Option<ResourceKind>,
    pub attack_target_id: Option<EntityId>,
}

impl From<&Building> for BuildingView {
    fn from(b: &Building) -> Self {
        let (x, y) = b.position.to_f64();
        Self {
            id: b.id,
            owner_id: b.owner,
            kind: b.kind,
            x,
            y,
            hp: num(b.hp),
            max_hp: num(b.max_hp),
            attack_cooldowns: b.attack_cooldowns.iter().map(|(k, v)| (*k, num(*v))).collect(),
            rally_point: b.rally.map(RallyView::from),
            is_under_construction: b.under_construction,
            build_progress: num(b.build_progress),
            build_time: num(b.build_time),
            farmer_id: b.farmer,
            garrison_count: b.garrison.len(),
            garrison: b.garrison.clone(),
            production_queue: b
                .production_queue
                .iter()
                .map(|job| JobView {
                    unit_type: match job.kind {
                        JobKind::Unit(unit) => Some(unit),
                        JobKind::Tech(_) => None,
                    },
                    tech_id: job.tech(),
                    remaining: num(job.remaining),
                    total: num(job.total),
                    stalled: job.stalled,
                })
                .collect(),
            techs: b.techs.iter().copied().collect(),
            relic_ids: b.relics.clone(),
            landmark_age_tier: b.landmark_age_tier,
            landmark_destroyed: b.landmark_destroyed,
            convert_resource_kind: b.fountain_mode,
            attack_target_id: b.attack_target.map(EntityRef::id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceView {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub node_type: ResourceNodeType,
    pub kind: ResourceKind,
    pub x: f64,
    pub y: f64,
    pub size: i32,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelicView {
    pub id: EntityId,
    pub x: f64,
    pub y: f64,
    pub carrier_id: Option<EntityId>,
    pub stored_in_building_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub index: PlayerIndex,
    pub team: u8,
    pub eliminated: bool,
    pub resources: StockpileView,
    pub techs: Vec<TechId>,
    pub age_tier: u8,
    pub age: String,
    pub landmark_choices: Vec<BuildingType>,
    pub landmark_built_ages: BTreeMap<BuildingType, u8>,
    pub color: String,
    pub population_used: u32,
    pub population_cap: u32,
}

fn player_view(m: &Match, p: &Player) -> PlayerView {
    PlayerView {
        index: p.index,
        team: p.team,
        eliminated: p.eliminated,
        resources: p.resources.into(),
        techs: p.techs.iter().copied().collect(),
        age_tier: p.age_tier,
        age: m.content().age_name(p.age_tier).to_string(),
        landmark_choices: p.landmark_choices.clone(),
        landmark_built_ages: p.landmark_built_ages.clone(),
        color: p.color.clone(),
        population_used: population_used(m, p.index),
        population_cap: population_cap(m, p.index),
    }
}

/// A projectile spawned this tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectileView {
    pub from: PointView,
    pub to: PointView,
    #[serde(rename = "type")]
    pub kind: crate::combat::ProjectileKind,
}

impl From<&ProjectileEvent> for ProjectileView {
    fn from(p: &ProjectileEvent) -> Self {
        Self {
            from: p.from.into(),
            to: p.to.into(),
            kind: p.kind,
        }
    }
}

/// Per-tick `stateUpdate` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub tick: u64,
    /// Shots fired this tick.
    pub attacks: Vec<ProjectileView>,
    pub fog_reveal: bool,
    pub resources: Vec<ResourceView>,
    pub units: Vec<UnitView>,
    pub buildings: Vec<BuildingView>,
    pub relics: Vec<RelicView>,
    pub players: Vec<PlayerView>,
}

/// Capture the full state of a match.
#[must_use]
pub fn snapshot(m: &Match) -> Snapshot {
    Snapshot {
        tick: m.tick,
        attacks: m.projectiles.iter().map(ProjectileView::from).collect(),
        fog_reveal: m.flags.fog_reveal,
        resources: m
            .resources
            .iter()
            .map(|r| {
                let (x, y) = r.position.to_f64();
                ResourceView {
                    id: r.id,
                    node_type: r.node_type,
                    kind: r.kind,
                    x,
                    y,
                    size: r.size,
                    amount: num(r.amount),
                }
            })
            .collect(),
        units: m.units.iter().map(UnitView::from).collect(),
        buildings: m.buildings.iter().map(BuildingView::from).collect(),
        relics: m
            .relics
            .iter()
            .map(|r| {
                let (x, y) = r.position.to_f64();
                RelicView {
                    id: r.id,
                    x,
                    y,
                    carrier_id: r.carrier(),
                    stored_in_building_id: match r.holder {
                        RelicHolder::Stored(id) => Some(id),
                        _ => None,
                    },
                }
            })
            .collect(),
        players: m.players.iter().map(|p| player_view(m, p)).collect(),
    }
}

/// Map dimensions sent at match start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapView {
    pub width: i32,
    pub height: i32,
    pub tile_size: i32,
}

/// `matchStart` payload for one player.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStart {
    pub match_id: u64,
    pub map: MapView,
    pub player_index: PlayerIndex,
    pub singleplayer: bool,
    pub allow_cheats: bool,
    #[serde(flatten)]
    pub state: Snapshot,
}

/// Build the `matchStart` payload for `player_index`.
#[must_use]
pub fn match_start(m: &Match, player_index: PlayerIndex) -> MatchStart {
    let map = &m.content().map;
    MatchStart {
        match_id: m.id,
        map: MapView {
            width: map.width,
            height: map.height,
            tile_size: map.tile_size,
        },
        player_index,
        singleplayer: m.flags.singleplayer,
        allow_cheats: m.flags.allow_cheats,
        state: snapshot(m),
    }
}
