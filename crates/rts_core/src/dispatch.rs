//! Command validation and application.
//!
//! Every handler checks everything it needs before touching the match, so a
//! rejected command leaves state exactly as it was. Commands whose effect the
//! UI waits on ask the outbox for an immediate snapshot.

use tracing::{debug, info};

use crate::buildings::{
    building_at, can_garrison, garrison_capacity, is_destroyed_landmark, is_placement_valid, is_untargetable,
    relic_capacity, resource_at,
};
use crate::commands::{Command, CommandOutcome, IdField, RawPoint, Rejection};
use crate::defenses::attack_profiles;
use crate::elimination::{eliminate_player, settle_outcome, EliminationReason};
use crate::economy::Stockpile;
use crate::entities::{
    Building, EntityId, EntityRef, JobKind, PlayerIndex, ProductionJob, RallyPoint, TradeLeg, TradeState, Unit,
};
use crate::events::{Audience, GameEvent};
use crate::kinds::{BuildingType, ResourceKind, TechId, UnitType};
use crate::math::{fixed_ratio, Fixed, Vec2Fixed};
use crate::orders::{formation_offsets, issue, units_nearby, FormationSlot, Order, FORMATION_SPREAD};
use crate::production::cancel_job;
use crate::relics::can_handle_relics;
use crate::spawn::{spawn_building, spawn_unit, ungarrison};
use crate::state::{Match, MAX_AGE_TIER};
use crate::stats::{
    building_build_time, building_cost, is_tech_in_progress, spire_max_hp_for_age, tech_cost, tech_research_time,
    unit_cost, unit_min_age, unit_production_time, unit_speed,
};
use crate::trading::start_leg;

type Handled = Result<CommandOutcome, Rejection>;

/// Resources granted by a cheat.
const CHEAT_GRANT: i32 = 10_000;

/// Apply one command from `player`.
///
/// Commands from unknown slots and commands sent after the match ended are
/// ignored. An eliminated player may only resign.
pub fn dispatch(m: &mut Match, player: PlayerIndex, command: &Command) -> CommandOutcome {
    let Some(sender) = m.player(player) else {
        return CommandOutcome::Silent;
    };
    if m.is_over() || (sender.eliminated && !matches!(command, Command::Resign)) {
        return CommandOutcome::Silent;
    }

    let result = match command {
        Command::Move {
            unit_ids,
            target,
            queue,
        } => move_units(m, player, unit_ids, *target, *queue, false),
        Command::AttackMove {
            unit_ids,
            target,
            queue,
        } => move_units(m, player, unit_ids, *target, *queue, true),
        Command::AttackTarget {
            unit_ids,
            target_id,
            queue,
        } => attack_target(m, player, unit_ids, *target_id, *queue),
        Command::BuildingAttackTarget {
            building_ids,
            building_id,
            target_id,
        } => building_attack_target(m, player, &ids_or_single(building_ids, *building_id), *target_id),
        Command::HealTarget {
            unit_ids,
            target_id,
            queue,
        } => heal_target(m, player, unit_ids, *target_id, *queue),
        Command::Gather {
            unit_ids,
            resource_id,
            queue,
        } => gather(m, player, unit_ids, *resource_id, *queue),
        Command::PickupRelic {
            unit_ids,
            relic_id,
            queue,
        } => pickup_relic(m, player, unit_ids, *relic_id, *queue),
        Command::DropRelicAt {
            unit_ids,
            target,
            queue,
        } => drop_relic_at(m, player, unit_ids, *target, *queue),
        Command::DepositRelic {
            unit_ids,
            building_id,
            queue,
        } => deposit_relic(m, player, unit_ids, *building_id, *queue),
        Command::TakeRelic {
            unit_ids,
            building_id,
            queue,
        } => take_relic(m, player, unit_ids, *building_id, *queue),
        Command::SetTradeHome { unit_ids, building_id } => set_trade_end(m, player, unit_ids, *building_id, true),
        Command::SetTradeDestination { unit_ids, building_id } => {
            set_trade_end(m, player, unit_ids, *building_id, false)
        }
        Command::RestartTrading { unit_ids } => restart_trading(m, player, unit_ids),
        Command::Build {
            building_type,
            builder_ids,
            x,
            y,
        } => build(m, player, building_type, builder_ids, *x, *y),
        Command::AssignBuild {
            building_id,
            builder_ids,
            queue,
        } => assign_build(m, player, *building_id, builder_ids, *queue),
        Command::Repair {
            building_id,
            unit_id,
            builder_ids,
            queue,
        } => repair(m, player, *building_id, *unit_id, builder_ids, *queue),
        Command::CancelBuild { building_id } => cancel_build(m, player, *building_id),
        Command::FarmAssign {
            building_id,
            builder_ids,
            queue,
        } => farm_assign(m, player, *building_id, builder_ids, *queue),
        Command::Cheat {
            action,
            unit_type,
            x,
            y,
            target,
        } => cheat(m, player, action, unit_type.as_deref(), RawPoint::new(*x, *y), *target),
        Command::Garrison {
            building_id,
            unit_ids,
            queue,
        } => garrison(m, player, *building_id, unit_ids, *queue),
        Command::Ungarrison { building_id, count } => release_garrison(m, player, *building_id, *count),
        Command::Produce { building_id, unit_type } => produce(m, player, *building_id, unit_type),
        Command::CancelQueue { building_id, index } => cancel_queue(m, player, *building_id, *index),
        Command::ClearRally {
            building_ids,
            building_id,
        } => clear_rally(m, player, &ids_or_single(building_ids, *building_id)),
        Command::SetFountainMode { building_id, kind } => set_fountain_mode(m, player, *building_id, kind),
        Command::Rally {
            building_ids,
            building_id,
            target,
        } => rally(m, player, &ids_or_single(building_ids, *building_id), *target),
        Command::Research { tech_id, building_id } => research(m, player, tech_id, *building_id),
        Command::Resign => {
            resign(m, player);
            Ok(CommandOutcome::Silent)
        }
    };

    result.unwrap_or_else(|reason| {
        debug!(player, command = command.name(), %reason, "command rejected");
        CommandOutcome::Rejected(reason)
    })
}

/// Drop a player whose connection closed, then settle the match if that
/// decided it.
pub fn disconnect(m: &mut Match, player: PlayerIndex) {
    if let Some(p) = m.player_mut(player) {
        p.connected = false;
    }
    eliminate_player(m, player, EliminationReason::PlayerDisconnected);
    if settle_outcome(m).is_none() {
        m.outbox.request_snapshot();
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Clamp a finite point onto the map.
fn world_point(m: &Match, raw: RawPoint) -> Option<Vec2Fixed> {
    if !raw.is_finite() {
        return None;
    }
    let map = &m.content().map;
    let max_x = f64::from(map.width) - 0.001;
    let max_y = f64::from(map.height) - 0.001;
    Vec2Fixed::from_f64(raw.x.clamp(0.0, max_x), raw.y.clamp(0.0, max_y))
}

fn ids_or_single(list: &Option<Vec<EntityId>>, single: IdField) -> Vec<EntityId> {
    match list {
        Some(ids) => ids.clone(),
        None => single.id().into_iter().collect(),
    }
}

/// Ids of `player`'s units among `ids` that pass `filter`, in request order.
fn own_units(m: &Match, player: PlayerIndex, ids: &[EntityId], filter: impl Fn(&Unit) -> bool) -> Vec<EntityId> {
    ids.iter()
        .copied()
        .filter(|id| m.unit(*id).is_some_and(|u| u.owner == player && filter(u)))
        .collect()
}

fn own_villagers(m: &Match, player: PlayerIndex, ids: &[EntityId]) -> Vec<EntityId> {
    own_units(m, player, ids, |u| u.kind == UnitType::Villager)
}

fn issue_all(m: &mut Match, units: &[EntityId], order: Order, queue: bool) {
    for id in units {
        if let Some(unit) = m.unit_mut(*id) {
            issue(unit, order, queue);
        }
    }
}

/// Enemy buildings that can be attacked: owned, vulnerable, not a corpse.
fn is_attackable_building(m: &Match, id: EntityId) -> bool {
    let content = m.content();
    m.building(id).is_some_and(|b| {
        let data = content.building(b.kind);
        b.owner.is_some() && !data.is_neutral && !data.is_invulnerable && !is_untargetable(content, b)
    })
}

fn is_relic_building(m: &Match, id: EntityId, player: PlayerIndex) -> bool {
    m.building(id).is_some_and(|b| {
        b.is_owned_by(player) && relic_capacity(m.content(), b.kind) > 0 && !b.under_construction
    })
}

fn pay(m: &mut Match, player: PlayerIndex, cost: &Stockpile) -> Result<(), Rejection> {
    m.player_mut(player)
        .ok_or(Rejection::InvalidPayload)?
        .resources
        .spend(cost)
        .map_err(|_| Rejection::InsufficientResources)
}

// ============================================================================
// Unit orders
// ============================================================================

fn move_units(m: &mut Match, player: PlayerIndex, ids: &[EntityId], target: RawPoint, queue: bool, attack: bool) -> Handled {
    let target = world_point(m, target).ok_or(Rejection::InvalidTarget)?;
    let selected = own_units(m, player, ids, |_| true);
    let positions: Vec<Vec2Fixed> = selected.iter().filter_map(|id| m.unit(*id)).map(|u| u.position).collect();

    let formation = if selected.len() > 1 && units_nearby(&positions, FORMATION_SPREAD) {
        let speed = selected
            .iter()
            .filter_map(|id| m.unit(*id))
            .map(|u| unit_speed(m, u))
            .min()
            .unwrap_or(Fixed::ONE);
        let id = m.allocate_formation_id();
        Some((id, speed, formation_offsets(selected.len())))
    } else {
        None
    };

    for (i, id) in selected.iter().enumerate() {
        let slot = formation.as_ref().map(|(formation_id, speed, offsets)| FormationSlot {
            id: *formation_id,
            offset: offsets.get(i).copied().unwrap_or(Vec2Fixed::ZERO),
            speed: *speed,
        });
        let order = if attack {
            Order::AttackMove { target, formation: slot }
        } else {
            Order::Move { target, formation: slot }
        };
        if let Some(unit) = m.unit_mut(*id) {
            issue(unit, order, queue);
        }
    }
    Ok(CommandOutcome::Silent)
}

fn attack_target(m: &mut Match, player: PlayerIndex, ids: &[EntityId], target_id: IdField, queue: bool) -> Handled {
    let target_id = target_id.id().ok_or(Rejection::InvalidTarget)?;
    let Some(target) = m.resolve(target_id) else {
        return Ok(CommandOutcome::Silent);
    };
    if !m.is_enemy(m.owner_of(target), Some(player)) {
        return Ok(CommandOutcome::Silent);
    }
    if matches!(target, EntityRef::Building(id) if !is_attackable_building(m, id)) {
        return Ok(CommandOutcome::Silent);
    }
    let attackers = own_units(m, player, ids, |u| u.kind != UnitType::Trader);
    issue_all(m, &attackers, Order::Attack { target, manual: true }, queue);
    Ok(CommandOutcome::Silent)
}

fn building_attack_target(m: &mut Match, player: PlayerIndex, building_ids: &[EntityId], target_id: IdField) -> Handled {
    let target = target_id
        .id()
        .and_then(|id| m.resolve(id))
        .filter(|t| m.is_enemy(m.owner_of(*t), Some(player)))
        .ok_or(Rejection::InvalidTarget)?;
    if matches!(target, EntityRef::Building(id) if !is_attackable_building(m, id)) {
        return Err(Rejection::InvalidTarget);
    }

    let content = m.content();
    let selected: Vec<EntityId> = building_ids
        .iter()
        .filter_map(|id| m.building(*id))
        .filter(|b| b.is_owned_by(player) && !is_destroyed_landmark(content, b))
        .map(|b| b.id)
        .collect();
    if selected.is_empty() {
        return Err(Rejection::InvalidBuilding);
    }
    let armed: Vec<EntityId> = selected
        .iter()
        .filter_map(|id| m.building(*id))
        .filter(|b| {
            let data = content.building(b.kind);
            !data.is_neutral && !data.is_invulnerable && !attack_profiles(m, b).is_empty()
        })
        .map(|b| b.id)
        .collect();
    if armed.is_empty() {
        return Err(Rejection::NoAttack);
    }

    for id in &armed {
        if let Some(b) = m.building_mut(*id) {
            b.attack_target = Some(target);
        }
    }
    m.outbox.request_snapshot();
    Ok(CommandOutcome::Accepted {
        count: Some(armed.len()),
    })
}

fn heal_target(m: &mut Match, player: PlayerIndex, ids: &[EntityId], target_id: IdField, queue: bool) -> Handled {
    let Some(patient) = target_id.id().and_then(|id| m.unit(id)) else {
        return Ok(CommandOutcome::Silent);
    };
    if patient.owner != player || m.content().unit(patient.kind).is_siege() {
        return Ok(CommandOutcome::Silent);
    }
    let target = patient.id;
    let monks = own_units(m, player, ids, |u| u.kind == UnitType::Monk && u.relic.is_none());
    issue_all(m, &monks, Order::Heal { target, manual: true }, queue);
    Ok(CommandOutcome::Silent)
}

fn gather(m: &mut Match, player: PlayerIndex, ids: &[EntityId], resource_id: IdField, queue: bool) -> Handled {
    let Some(resource) = resource_id.id().and_then(|id| m.resource(id)).map(|r| r.id) else {
        return Ok(CommandOutcome::Silent);
    };
    let villagers = own_villagers(m, player, ids);
    issue_all(m, &villagers, Order::Gather { resource }, queue);
    Ok(CommandOutcome::Silent)
}

// ============================================================================
// Relics and trade
// ============================================================================

fn pickup_relic(m: &mut Match, player: PlayerIndex, ids: &[EntityId], relic_id: IdField, queue: bool) -> Handled {
    if !can_handle_relics(m, player) {
        return Ok(CommandOutcome::Silent);
    }
    let Some(relic) = relic_id.id().and_then(|id| m.relic(id)).filter(|r| r.is_free()).map(|r| r.id) else {
        return Ok(CommandOutcome::Silent);
    };
    let monks = own_units(m, player, ids, |u| u.kind == UnitType::Monk && u.relic.is_none());
    issue_all(m, &monks, Order::PickupRelic { relic }, queue);
    Ok(CommandOutcome::Silent)
}

fn drop_relic_at(m: &mut Match, player: PlayerIndex, ids: &[EntityId], target: Option<RawPoint>, queue: bool) -> Handled {
    let drop_point = match target {
        Some(raw) => match world_point(m, raw) {
            Some(point) => Some(point),
            None => return Ok(CommandOutcome::Silent),
        },
        None => None,
    };
    for id in own_units(m, player, ids, |u| u.kind == UnitType::Monk && u.relic.is_some()) {
        let Some(unit) = m.unit(id) else {
            continue;
        };
        let point = drop_point.unwrap_or(unit.position);
        let order = match building_at(m, point).filter(|b| is_relic_building(m, *b, player)) {
            Some(building) => Order::DepositRelic { building },
            None => Order::DropRelic { target: point },
        };
        if let Some(unit) = m.unit_mut(id) {
            issue(unit, order, queue);
        }
    }
    Ok(CommandOutcome::Silent)
}

fn deposit_relic(m: &mut Match, player: PlayerIndex, ids: &[EntityId], building_id: IdField, queue: bool) -> Handled {
    let Some(building) = building_id.id().filter(|id| is_relic_building(m, *id, player)) else {
        return Ok(CommandOutcome::Silent);
    };
    let monks = own_units(m, player, ids, |u| u.kind == UnitType::Monk && u.relic.is_some());
    issue_all(m, &monks, Order::DepositRelic { building }, queue);
    Ok(CommandOutcome::Silent)
}

fn take_relic(m: &mut Match, player: PlayerIndex, ids: &[EntityId], building_id: IdField, queue: bool) -> Handled {
    if !can_handle_relics(m, player) {
        return Ok(CommandOutcome::Silent);
    }
    let Some(building) = building_id
        .id()
        .filter(|id| is_relic_building(m, *id, player))
        .filter(|id| m.building(*id).is_some_and(|b| !b.relics.is_empty()))
    else {
        return Ok(CommandOutcome::Silent);
    };
    let monks = own_units(m, player, ids, |u| u.kind == UnitType::Monk && u.relic.is_none());
    issue_all(m, &monks, Order::TakeRelic { building }, queue);
    Ok(CommandOutcome::Silent)
}

/// Set the home market (`home`) or the destination trade post of traders,
/// starting the outbound leg once both ends are known.
fn set_trade_end(m: &mut Match, player: PlayerIndex, ids: &[EntityId], building_id: IdField, home: bool) -> Handled {
    let valid = |b: &Building| {
        if home {
            b.is_owned_by(player) && b.kind == BuildingType::Market && !b.under_construction
        } else {
            b.kind == BuildingType::TradePost
        }
    };
    let Some(building) = building_id.id().and_then(|id| m.building(id)).filter(|b| valid(*b)).map(|b| b.id) else {
        return Ok(CommandOutcome::Silent);
    };
    for id in own_units(m, player, ids, |u| u.kind == UnitType::Trader) {
        let Some(unit) = m.unit_mut(id) else {
            continue;
        };
        let trade = unit.trade.get_or_insert_with(TradeState::default);
        if home {
            trade.home = Some(building);
            trade.pending_home = None;
        } else {
            trade.dest = Some(building);
            trade.pending_dest = None;
        }
        trade.paused = false;
        if trade.home.is_some() && trade.dest.is_some() {
            start_leg(m, id, TradeLeg::ToDest);
        }
    }
    Ok(CommandOutcome::Silent)
}

fn restart_trading(m: &mut Match, player: PlayerIndex, ids: &[EntityId]) -> Handled {
    let routed = own_units(m, player, ids, |u| {
        u.kind == UnitType::Trader && u.trade.is_some_and(|t| t.home.is_some() && t.dest.is_some())
    });
    if routed.is_empty() {
        return Err(Rejection::NoRoute);
    }
    for id in routed {
        if let Some(trade) = m.unit_mut(id).and_then(|u| u.trade.as_mut()) {
            trade.paused = false;
            trade.pending_home = None;
            trade.pending_dest = None;
        }
        start_leg(m, id, TradeLeg::ToDest);
    }
    m.outbox.request_snapshot();
    Ok(CommandOutcome::OK)
}

// ============================================================================
// Construction
// ============================================================================

fn build(m: &mut Match, player: PlayerIndex, building_type: &str, builder_ids: &[EntityId], x: f64, y: f64) -> Handled {
    let content = m.content_arc();
    let kind: BuildingType = building_type.parse().map_err(|_| Rejection::InvalidBuilding)?;
    if !content.buildings.contains_key(&kind) {
        return Err(Rejection::InvalidBuilding);
    }
    let p = m.player(player).ok_or(Rejection::InvalidPayload)?;
    let age_landmark = content.is_age_landmark(kind);
    if age_landmark {
        if p.age_tier >= MAX_AGE_TIER {
            return Err(Rejection::AgeMax);
        }
        if !p.landmark_choices.contains(&kind) {
            return Err(Rejection::InvalidLandmark);
        }
        let placed = m.buildings.iter().any(|b| b.is_owned_by(player) && b.kind == kind);
        if placed || p.landmark_built_ages.contains_key(&kind) {
            return Err(Rejection::LandmarkAlreadyBuilt);
        }
        let landmark_in_progress = m
            .buildings
            .iter()
            .any(|b| b.is_owned_by(player) && b.under_construction && content.is_age_landmark(b.kind));
        if landmark_in_progress {
            return Err(Rejection::LandmarkUnderConstruction);
        }
    }
    let data = content.building(kind);
    if p.age_tier < data.min_age_tier {
        return Err(Rejection::AgeRequired);
    }
    if data.requires_tech.is_some_and(|tech| !p.has_tech(tech)) {
        return Err(Rejection::TechRequired);
    }
    let cost = building_cost(&content, p, kind);
    if !p.resources.can_afford(&cost) {
        return Err(Rejection::InsufficientResources);
    }
    let builders = own_villagers(m, player, builder_ids);
    if builders.is_empty() {
        return Err(Rejection::NoBuilders);
    }
    if !x.is_finite() || !y.is_finite() {
        return Err(Rejection::InvalidLocation);
    }
    let position = Vec2Fixed::from_f64(x.floor(), y.floor()).ok_or(Rejection::InvalidLocation)?;
    if !is_placement_valid(m, kind, position) {
        return Err(Rejection::InvalidLocation);
    }

    let landmark_tier = (p.age_tier + 1).clamp(1, MAX_AGE_TIER);
    let spire_hp = (age_landmark && kind == BuildingType::DominionSpire)
        .then(|| spire_max_hp_for_age(&content, p, landmark_tier));
    let build_time = building_build_time(&content, Some(p), kind);

    pay(m, player, &cost)?;
    let id = spawn_building(m, Some(player), kind, position);
    if let Some(b) = m.building_mut(id) {
        b.cost_paid = Some(cost);
        if age_landmark {
            b.landmark_age_tier = Some(landmark_tier);
        }
        if let Some(max_hp) = spire_hp {
            b.max_hp = max_hp;
        }
        b.build_time = build_time;
        b.under_construction = build_time > Fixed::ZERO;
        b.build_progress = Fixed::ZERO;
        b.hp = if b.under_construction { Fixed::ONE } else { b.max_hp };
    }
    issue_all(m, &builders, Order::Build { building: id }, false);
    info!(player, building = id, ?kind, "building placed");
    m.outbox.request_snapshot();
    Ok(CommandOutcome::OK)
}

fn assign_build(m: &mut Match, player: PlayerIndex, building_id: IdField, builder_ids: &[EntityId], queue: bool) -> Handled {
    let Some(building) = building_id
        .id()
        .and_then(|id| m.building(id))
        .filter(|b| b.is_owned_by(player) && b.under_construction)
        .map(|b| b.id)
    else {
        return Ok(CommandOutcome::Silent);
    };
    let builders = own_villagers(m, player, builder_ids);
    issue_all(m, &builders, Order::Build { building }, queue);
    Ok(CommandOutcome::Silent)
}

fn repair(
    m: &mut Match,
    player: PlayerIndex,
    building_id: IdField,
    unit_id: IdField,
    builder_ids: &[EntityId],
    queue: bool,
) -> Handled {
    let target = if building_id.is_present() {
        let b = building_id
            .id()
            .and_then(|id| m.building(id))
            .filter(|b| b.is_owned_by(player) && !b.under_construction)
            .ok_or(Rejection::InvalidBuilding)?;
        if b.hp >= b.max_hp {
            return Err(Rejection::NotDamaged);
        }
        EntityRef::Building(b.id)
    } else if unit_id.is_present() {
        let u = unit_id
            .id()
            .and_then(|id| m.unit(id))
            .filter(|u| u.owner == player && m.content().unit(u.kind).is_siege())
            .ok_or(Rejection::InvalidUnit)?;
        if u.hp >= u.max_hp {
            return Err(Rejection::NotDamaged);
        }
        EntityRef::Unit(u.id)
    } else {
        return Err(Rejection::InvalidTarget);
    };
    let builders = own_villagers(m, player, builder_ids);
    if builders.is_empty() {
        return Err(Rejection::NoBuilders);
    }
    issue_all(m, &builders, Order::Repair { target }, queue);
    Ok(CommandOutcome::OK)
}

fn cancel_build(m: &mut Match, player: PlayerIndex, building_id: IdField) -> Handled {
    let Some(b) = building_id
        .id()
        .and_then(|id| m.building(id))
        .filter(|b| b.is_owned_by(player) && b.under_construction)
    else {
        return Ok(CommandOutcome::Silent);
    };
    let id = b.id;
    let refund = b.cost_paid.unwrap_or(m.content().building(b.kind).cost);
    if let Some(p) = m.player_mut(player) {
        p.resources.refund(&refund);
    }
    for unit in &mut m.units {
        if unit.order == Some(Order::Build { building: id }) {
            unit.order = None;
        }
    }
    m.buildings.retain(|b| b.id != id);
    debug!(player, building = id, "construction cancelled");
    m.outbox.request_snapshot();
    Ok(CommandOutcome::Silent)
}

fn farm_assign(m: &mut Match, player: PlayerIndex, building_id: IdField, builder_ids: &[EntityId], queue: bool) -> Handled {
    let Some(farm) = building_id
        .id()
        .and_then(|id| m.building(id))
        .filter(|b| b.is_owned_by(player) && b.kind == BuildingType::Farm)
        .filter(|b| !b.under_construction && b.farmer.is_none())
        .map(|b| b.id)
    else {
        return Ok(CommandOutcome::Silent);
    };
    let Some(farmer) = own_villagers(m, player, builder_ids).first().copied() else {
        return Ok(CommandOutcome::Silent);
    };
    if let Some(b) = m.building_mut(farm) {
        b.farmer = Some(farmer);
    }
    issue_all(m, &[farmer], Order::Farm { building: farm }, queue);
    Ok(CommandOutcome::Silent)
}

// ============================================================================
// Cheats
// ============================================================================

fn cheat(
    m: &mut Match,
    player: PlayerIndex,
    action: &str,
    unit_type: Option<&str>,
    at: RawPoint,
    target: RawPoint,
) -> Handled {
    let flags = m.flags;
    if !flags.singleplayer && !flags.allow_cheats {
        return Ok(CommandOutcome::Silent);
    }
    if flags.singleplayer && flags.host != Some(player) {
        return Ok(CommandOutcome::Silent);
    }
    let spawns = matches!(
        action,
        "spawn_enemy" | "spawn_castle" | "spawn_disruptor_cannon" | "enemy_attack_move"
    );
    if spawns && !flags.singleplayer {
        return Ok(CommandOutcome::Silent);
    }
    let enemy: PlayerIndex = if player == 0 { 1 } else { 0 };

    let grant = |m: &mut Match, kind: ResourceKind| {
        if let Some(p) = m.player_mut(player) {
            p.resources.add(kind, Fixed::from_num(CHEAT_GRANT));
        }
    };
    match action {
        "grant_food" => grant(m, ResourceKind::Food),
        "grant_wood" => grant(m, ResourceKind::Wood),
        "grant_gold" => grant(m, ResourceKind::Gold),
        "grant_stone" => grant(m, ResourceKind::Stone),
        "spawn_enemy" => {
            let kind = unit_type.and_then(|t| t.parse::<UnitType>().ok());
            if let (Some(kind), Some(point)) = (kind, world_point(m, at)) {
                spawn_unit(m, enemy, kind, point);
            }
        }
        "spawn_castle" => spawn_enemy_building(m, enemy, BuildingType::Castle, at),
        "spawn_disruptor_cannon" => spawn_enemy_building(m, enemy, BuildingType::DisruptorCannon, at),
        "enemy_attack_move" => {
            if let Some(target) = world_point(m, target) {
                for unit in m.units.iter_mut().filter(|u| u.owner == enemy) {
                    issue(unit, Order::AttackMove { target, formation: None }, false);
                }
            }
        }
        "reveal_fog" => m.flags.fog_reveal = true,
        "instant_build" => {
            m.flags.fast_build = true;
            for job in m.buildings.iter_mut().flat_map(|b| b.production_queue.iter_mut()) {
                let fast = match job.kind {
                    JobKind::Tech(_) => Fixed::ONE,
                    JobKind::Unit(_) => fixed_ratio(1, 10),
                };
                job.remaining = job.remaining.min(fast);
                job.total = fast;
            }
        }
        _ => return Ok(CommandOutcome::Silent),
    }
    info!(player, action, "cheat applied");
    Ok(CommandOutcome::Silent)
}

fn spawn_enemy_building(m: &mut Match, enemy: PlayerIndex, kind: BuildingType, at: RawPoint) {
    let Some(point) = world_point(m, at) else {
        return;
    };
    let corner = Vec2Fixed::new(point.x.floor(), point.y.floor());
    if is_placement_valid(m, kind, corner) {
        spawn_building(m, Some(enemy), kind, corner);
    }
}

// ============================================================================
// Garrison
// ============================================================================

fn garrison(m: &mut Match, player: PlayerIndex, building_id: IdField, ids: &[EntityId], queue: bool) -> Handled {
    let content = m.content();
    let Some(b) = building_id
        .id()
        .and_then(|id| m.building(id))
        .filter(|b| b.is_owned_by(player) && !b.under_construction && !is_destroyed_landmark(content, b))
    else {
        return Ok(CommandOutcome::Silent);
    };
    let building = b.id;
    let available = garrison_capacity(content, b).saturating_sub(b.garrison.len());
    if available == 0 {
        return Ok(CommandOutcome::Silent);
    }
    let mut entering = own_units(m, player, ids, can_garrison);
    entering.truncate(available);
    issue_all(m, &entering, Order::Garrison { building }, queue);
    Ok(CommandOutcome::Silent)
}

fn release_garrison(m: &mut Match, player: PlayerIndex, building_id: IdField, count: f64) -> Handled {
    let Some(b) = building_id
        .id()
        .and_then(|id| m.building(id))
        .filter(|b| b.is_owned_by(player) && !b.garrison.is_empty())
    else {
        return Ok(CommandOutcome::Silent);
    };
    let (building, held) = (b.id, b.garrison.len());
    let count = if count.is_finite() {
        // Saturating float-to-int cast, then clamped into range.
        (count.trunc() as i64).clamp(1, held as i64) as usize
    } else {
        held
    };
    let released = ungarrison(m, building, count);
    debug!(player, building, released = released.len(), "garrison released");
    m.outbox.request_snapshot();
    Ok(CommandOutcome::Silent)
}

// ============================================================================
// Production and research
// ============================================================================

/// A functional building owned by `player`, or the reason it is not.
fn production_building(m: &Match, player: PlayerIndex, building_id: IdField) -> Result<EntityId, Rejection> {
    let b = building_id
        .id()
        .and_then(|id| m.building(id))
        .filter(|b| b.is_owned_by(player))
        .ok_or(Rejection::InvalidBuilding)?;
    if b.under_construction {
        return Err(Rejection::BuildingIncomplete);
    }
    if is_destroyed_landmark(m.content(), b) {
        return Err(Rejection::BuildingDestroyed);
    }
    Ok(b.id)
}

fn produce(m: &mut Match, player: PlayerIndex, building_id: IdField, unit_type: &str) -> Handled {
    let content = m.content_arc();
    let building = production_building(m, player, building_id)?;
    let b = m.building(building).ok_or(Rejection::InvalidBuilding)?;
    let data = content.building(b.kind);
    if data.produce.is_empty() {
        return Err(Rejection::CannotProduceHere);
    }
    let unit = unit_type
        .parse::<UnitType>()
        .ok()
        .filter(|u| data.produces(*u))
        .ok_or(Rejection::InvalidUnitType)?;
    if !content.units.contains_key(&unit) {
        return Err(Rejection::UnknownUnit);
    }
    let p = m.player(player).ok_or(Rejection::InvalidPayload)?;
    if p.age_tier < unit_min_age(&content, unit) {
        return Err(Rejection::AgeRequired);
    }
    if content.unit(unit).requires_tech.is_some_and(|tech| !p.has_tech(tech)) {
        return Err(Rejection::TechRequired);
    }
    let cost = unit_cost(m, p, unit, Some(b));
    if !p.resources.can_afford(&cost) {
        return Err(Rejection::InsufficientResources);
    }
    let time = unit_production_time(m, p, unit, Some(b));

    pay(m, player, &cost)?;
    if let Some(b) = m.building_mut(building) {
        b.production_queue.push_back(ProductionJob {
            kind: JobKind::Unit(unit),
            remaining: time,
            total: time,
            cost,
            stalled: false,
        });
    }
    debug!(player, building, ?unit, "unit queued");
    m.outbox.request_snapshot();
    Ok(CommandOutcome::OK)
}

fn cancel_queue(m: &mut Match, player: PlayerIndex, building_id: IdField, index: Option<f64>) -> Handled {
    let b = building_id
        .id()
        .and_then(|id| m.building(id))
        .filter(|b| b.is_owned_by(player))
        .ok_or(Rejection::InvalidBuilding)?;
    let building = b.id;
    let len = b.production_queue.len();
    let index = index
        .filter(|i| i.fract() == 0.0 && *i >= 0.0 && *i < len as f64)
        .ok_or(Rejection::InvalidIndex)?;
    // In range, so the cast is exact.
    cancel_job(m, building, index as usize).ok_or(Rejection::InvalidIndex)?;
    m.outbox.request_snapshot();
    Ok(CommandOutcome::OK)
}

fn research(m: &mut Match, player: PlayerIndex, tech_id: &str, building_id: IdField) -> Handled {
    let content = m.content_arc();
    let tech: TechId = tech_id
        .parse()
        .ok()
        .filter(|t| content.technologies.contains_key(t))
        .ok_or(Rejection::UnknownTech)?;
    let building = production_building(m, player, building_id)?;
    let b = m.building(building).ok_or(Rejection::InvalidBuilding)?;
    if !content.building(b.kind).researches(tech) {
        return Err(Rejection::CannotResearchHere);
    }
    let p = m.player(player).ok_or(Rejection::InvalidPayload)?;
    if p.has_tech(tech) {
        return Err(Rejection::AlreadyResearched);
    }
    let data = content.tech(tech);
    if data.requires_tech.is_some_and(|t| !p.has_tech(t)) {
        return Err(Rejection::TechPrereq);
    }
    if data.min_age_tier.is_some_and(|tier| p.age_tier < tier) {
        return Err(Rejection::AgeRequired);
    }
    if data.age_tier.is_some_and(|tier| tier != p.age_tier + 1) {
        return Err(Rejection::AgeOrder);
    }
    let building_scoped = data.is_building_scoped();
    if building_scoped && b.techs.contains(&tech) {
        return Err(Rejection::AlreadyResearched);
    }
    if is_tech_in_progress(m, player, tech, building_scoped.then_some(building)) {
        return Err(Rejection::AlreadyResearching);
    }
    let cost = tech_cost(&content, p, tech);
    if !p.resources.can_afford(&cost) {
        return Err(Rejection::InsufficientResources);
    }
    let time = tech_research_time(m, tech);

    pay(m, player, &cost)?;
    if let Some(b) = m.building_mut(building) {
        b.production_queue.push_back(ProductionJob {
            kind: JobKind::Tech(tech),
            remaining: time,
            total: time,
            cost,
            stalled: false,
        });
    }
    debug!(player, building, ?tech, "research queued");
    m.outbox.request_snapshot();
    Ok(CommandOutcome::OK)
}

// ============================================================================
// Rally points and fountain
// ============================================================================

fn clear_rally(m: &mut Match, player: PlayerIndex, building_ids: &[EntityId]) -> Handled {
    let owned: Vec<EntityId> = building_ids
        .iter()
        .copied()
        .filter(|id| m.building(*id).is_some_and(|b| b.is_owned_by(player)))
        .collect();
    if owned.is_empty() {
        return Err(Rejection::InvalidBuilding);
    }
    for id in &owned {
        if let Some(b) = m.building_mut(*id) {
            b.rally = None;
            b.attack_target = None;
        }
    }
    m.outbox.request_snapshot();
    Ok(CommandOutcome::Accepted {
        count: Some(owned.len()),
    })
}

fn rally(m: &mut Match, player: PlayerIndex, building_ids: &[EntityId], target: RawPoint) -> Handled {
    let position = world_point(m, target).ok_or(Rejection::InvalidTarget)?;
    let content = m.content();
    let owned: Vec<EntityId> = building_ids
        .iter()
        .copied()
        .filter(|id| {
            m.building(*id)
                .is_some_and(|b| b.is_owned_by(player) && !is_destroyed_landmark(content, b))
        })
        .collect();
    if owned.is_empty() {
        return Err(Rejection::InvalidBuilding);
    }
    let resource = resource_at(m, position);
    for id in &owned {
        if let Some(b) = m.building_mut(*id) {
            b.rally = Some(RallyPoint { position, resource });
            b.attack_target = None;
        }
    }
    m.outbox.request_snapshot();
    Ok(CommandOutcome::Accepted {
        count: Some(owned.len()),
    })
}

fn set_fountain_mode(m: &mut Match, player: PlayerIndex, building_id: IdField, kind: &str) -> Handled {
    let content = m.content();
    let building = building_id
        .id()
        .and_then(|id| m.building(id))
        .filter(|b| b.is_owned_by(player) && b.kind == BuildingType::GoldenFountainSquare)
        .filter(|b| !is_destroyed_landmark(content, b))
        .map(|b| b.id)
        .ok_or(Rejection::InvalidBuilding)?;
    let mode = kind
        .parse::<ResourceKind>()
        .ok()
        .filter(|k| *k != ResourceKind::Stone)
        .ok_or(Rejection::InvalidMode)?;
    if let Some(b) = m.building_mut(building) {
        b.fountain_mode = Some(mode);
    }
    m.outbox.request_snapshot();
    Ok(CommandOutcome::OK)
}

// ============================================================================
// Leaving
// ============================================================================

fn resign(m: &mut Match, player: PlayerIndex) {
    eliminate_player(m, player, EliminationReason::Resigned);
    m.outbox.push(
        Audience::AllExcept(player),
        GameEvent::PlayerResigned {
            player_index: player,
            label: format!("Player {}", u16::from(player) + 1),
        },
    );
    if settle_outcome(m).is_none() {
        m.outbox.request_snapshot();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ContentTables;
    use crate::entities::RelicHolder;
    use crate::math::fixed_int;
    use crate::kinds::ResourceNodeType;
    use crate::test_support::{
        create_test_match, create_test_match_with, place_building, place_relic, place_resource, place_unit,
    };

    fn fixed(n: i32) -> Fixed {
        fixed_int(n)
    }

    fn pos(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(fixed(x), fixed(y))
    }

    fn point(x: f64, y: f64) -> RawPoint {
        RawPoint::new(x, y)
    }

    fn create_test_build(kind: &str, builder: EntityId, x: f64, y: f64) -> Command {
        Command::Build {
            building_type: kind.to_string(),
            builder_ids: vec![builder],
            x,
            y,
        }
    }

    #[test]
    fn test_move_with_non_finite_target_is_rejected() {
        let mut m = create_test_match(2);
        let unit = place_unit(&mut m, 0, UnitType::Spearman, pos(30, 30));
        let before = m.clone();
        let outcome = dispatch(
            &mut m,
            0,
            &Command::Move {
                unit_ids: vec![unit],
                target: point(f64::NAN, 4.0),
                queue: false,
            },
        );
        assert_eq!(outcome, CommandOutcome::Rejected(Rejection::InvalidTarget));
        assert_eq!(m, before);
    }

    #[test]
    fn test_group_move_forms_up_at_slowest_speed() {
        let mut m = create_test_match(2);
        let a = place_unit(&mut m, 0, UnitType::Spearman, pos(30, 30));
        let b = place_unit(&mut m, 0, UnitType::Horseman, pos(31, 30));
        let enemy = place_unit(&mut m, 1, UnitType::Spearman, pos(32, 30));
        let outcome = dispatch(
            &mut m,
            0,
            &Command::Move {
                unit_ids: vec![a, b, enemy],
                target: point(60.0, 60.0),
                queue: false,
            },
        );
        assert_eq!(outcome, CommandOutcome::Silent);
        let slot_a = m.unit(a).unwrap().order.unwrap().formation().unwrap();
        let slot_b = m.unit(b).unwrap().order.unwrap().formation().unwrap();
        assert_eq!(slot_a.id, slot_b.id);
        assert_eq!(slot_a.speed, slot_b.speed);
        assert_eq!(slot_a.speed, unit_speed(&m, m.unit(a).unwrap()));
        assert_ne!(slot_a.offset, slot_b.offset);
        assert_eq!(m.unit(enemy).unwrap().order, None);
    }

    #[test]
    fn test_move_target_is_clamped_to_map() {
        let mut m = create_test_match(2);
        let unit = place_unit(&mut m, 0, UnitType::Spearman, pos(30, 30));
        dispatch(
            &mut m,
            0,
            &Command::Move {
                unit_ids: vec![unit],
                target: point(-5.0, 1000.0),
                queue: false,
            },
        );
        let target = m.unit(unit).unwrap().order.unwrap().target_point().unwrap();
        assert_eq!(target.x, Fixed::ZERO);
        assert!(target.y < m.height());
    }

    #[test]
    fn test_attack_target_ignores_allies_and_skips_traders() {
        let mut m = create_test_match(2);
        let spear = place_unit(&mut m, 0, UnitType::Spearman, pos(30, 30));
        let trader = place_unit(&mut m, 0, UnitType::Trader, pos(31, 30));
        let friend = place_unit(&mut m, 0, UnitType::Villager, pos(32, 30));
        let foe = place_unit(&mut m, 1, UnitType::Villager, pos(33, 30));

        let attack = |target: EntityId| Command::AttackTarget {
            unit_ids: vec![spear, trader],
            target_id: IdField::Id(target),
            queue: false,
        };
        assert_eq!(dispatch(&mut m, 0, &attack(friend)), CommandOutcome::Silent);
        assert_eq!(m.unit(spear).unwrap().order, None);

        dispatch(&mut m, 0, &attack(foe));
        assert_eq!(
            m.unit(spear).unwrap().order,
            Some(Order::Attack {
                target: EntityRef::Unit(foe),
                manual: true
            })
        );
        assert_eq!(m.unit(trader).unwrap().order, None);

        let invalid = Command::AttackTarget {
            unit_ids: vec![spear],
            target_id: IdField::Invalid,
            queue: false,
        };
        assert_eq!(dispatch(&mut m, 0, &invalid), CommandOutcome::Rejected(Rejection::InvalidTarget));
    }

    #[test]
    fn test_building_attack_target_counts_armed_buildings() {
        let mut m = create_test_match(2);
        let tc = m.players[0].starting_town_center.unwrap();
        let house = place_building(&mut m, Some(0), BuildingType::House, pos(30, 30));
        let foe = place_unit(&mut m, 1, UnitType::Spearman, pos(27, 22));

        let cmd = |ids: Vec<EntityId>| Command::BuildingAttackTarget {
            building_ids: Some(ids),
            building_id: IdField::Absent,
            target_id: IdField::Id(foe),
        };
        assert_eq!(dispatch(&mut m, 0, &cmd(vec![house])), CommandOutcome::Rejected(Rejection::NoAttack));
        assert_eq!(dispatch(&mut m, 0, &cmd(vec![9999])), CommandOutcome::Rejected(Rejection::InvalidBuilding));
        assert_eq!(
            dispatch(&mut m, 0, &cmd(vec![tc, house])),
            CommandOutcome::Accepted { count: Some(1) }
        );
        assert_eq!(m.building(tc).unwrap().attack_target, Some(EntityRef::Unit(foe)));
        assert!(m.outbox.take_snapshot_request());
    }

    #[test]
    fn test_gather_only_sends_villagers() {
        let mut m = create_test_match(2);
        let villager = place_unit(&mut m, 0, UnitType::Villager, pos(30, 30));
        let spear = place_unit(&mut m, 0, UnitType::Spearman, pos(31, 30));
        let tree = place_resource(&mut m, ResourceNodeType::Tree, pos(35, 35));
        dispatch(
            &mut m,
            0,
            &Command::Gather {
                unit_ids: vec![villager, spear],
                resource_id: IdField::Id(tree),
                queue: false,
            },
        );
        assert_eq!(m.unit(villager).unwrap().order, Some(Order::Gather { resource: tree }));
        assert_eq!(m.unit(spear).unwrap().order, None);
    }

    #[test]
    fn test_build_farm_spends_wood_and_assigns_builders() {
        let mut m = create_test_match(2);
        let villager = place_unit(&mut m, 0, UnitType::Villager, pos(30, 30));
        let outcome = dispatch(&mut m, 0, &create_test_build("Farm", villager, 34.6, 34.2));
        assert_eq!(outcome, CommandOutcome::OK);
        assert_eq!(m.players[0].resources.wood, fixed(125));

        let farm = m.buildings.iter().find(|b| b.kind == BuildingType::Farm).unwrap();
        assert_eq!(farm.position, pos(34, 34));
        assert!(farm.under_construction);
        assert_eq!(farm.hp, Fixed::ONE);
        assert_eq!(farm.cost_paid, Some(Stockpile::new(0, 75, 0, 0)));
        assert_eq!(m.unit(villager).unwrap().order, Some(Order::Build { building: farm.id }));
        assert!(m.outbox.take_snapshot_request());
    }

    #[test]
    fn test_build_rejections_leave_state_unchanged() {
        let mut m = create_test_match(2);
        let villager = place_unit(&mut m, 0, UnitType::Villager, pos(30, 30));
        let spear = place_unit(&mut m, 0, UnitType::Spearman, pos(31, 30));
        let before = m.clone();

        let cases = [
            (create_test_build("Spaceport", villager, 34.0, 34.0), Rejection::InvalidBuilding),
            (create_test_build("Market", villager, 34.0, 34.0), Rejection::AgeRequired),
            (create_test_build("Castle", villager, 34.0, 34.0), Rejection::AgeRequired),
            (create_test_build("Farm", spear, 34.0, 34.0), Rejection::NoBuilders),
            (create_test_build("Farm", villager, f64::INFINITY, 34.0), Rejection::InvalidLocation),
            (create_test_build("Farm", villager, 21.0, 21.0), Rejection::InvalidLocation),
        ];
        for (command, reason) in &cases {
            assert_eq!(dispatch(&mut m, 0, command), CommandOutcome::Rejected(*reason));
            assert_eq!(m, before);
        }

        m.players[0].resources = Stockpile::default();
        let before = m.clone();
        assert_eq!(
            dispatch(&mut m, 0, &create_test_build("Farm", villager, 34.0, 34.0)),
            CommandOutcome::Rejected(Rejection::InsufficientResources)
        );
        assert_eq!(m, before);
    }

    #[test]
    fn test_landmark_build_rules() {
        let mut m = create_test_match(2);
        let villager = place_unit(&mut m, 0, UnitType::Villager, pos(30, 30));
        m.players[0].resources = Stockpile::new(5000, 5000, 5000, 5000);
        m.players[0].landmark_choices = vec![BuildingType::GroveUniversity, BuildingType::DominionSpire];

        assert_eq!(
            dispatch(&mut m, 0, &create_test_build("ArgentThroneComplex", villager, 40.0, 40.0)),
            CommandOutcome::Rejected(Rejection::InvalidLandmark)
        );
        assert_eq!(dispatch(&mut m, 0, &create_test_build("DominionSpire", villager, 40.0, 40.0)), CommandOutcome::OK);
        let spire = m.buildings.iter().find(|b| b.kind == BuildingType::DominionSpire).unwrap();
        assert_eq!(spire.landmark_age_tier, Some(1));
        assert_eq!(
            spire.max_hp,
            spire_max_hp_for_age(m.content(), &m.players[0], 1)
        );
        assert_eq!(
            dispatch(&mut m, 0, &create_test_build("GroveUniversity", villager, 50.0, 50.0)),
            CommandOutcome::Rejected(Rejection::LandmarkUnderConstruction)
        );
        assert_eq!(
            dispatch(&mut m, 0, &create_test_build("DominionSpire", villager, 50.0, 50.0)),
            CommandOutcome::Rejected(Rejection::LandmarkAlreadyBuilt)
        );
        m.players[0].age_tier = MAX_AGE_TIER;
        assert_eq!(
            dispatch(&mut m, 0, &create_test_build("GroveUniversity", villager, 50.0, 50.0)),
            CommandOutcome::Rejected(Rejection::AgeMax)
        );
    }

    #[test]
    fn test_cancel_build_refunds_and_clears_orders() {
        let mut m = create_test_match(2);
        let villager = place_unit(&mut m, 0, UnitType::Villager, pos(30, 30));
        dispatch(&mut m, 0, &create_test_build("House", villager, 40.0, 40.0));
        let house = m.buildings.iter().find(|b| b.kind == BuildingType::House).unwrap().id;
        assert_eq!(m.players[0].resources.wood, fixed(150));

        dispatch(
            &mut m,
            0,
            &Command::CancelBuild {
                building_id: IdField::Id(house),
            },
        );
        assert!(m.building(house).is_none());
        assert_eq!(m.players[0].resources.wood, fixed(200));
        assert_eq!(m.unit(villager).unwrap().order, None);
    }

    #[test]
    fn test_repair_reasons() {
        let mut m = create_test_match(2);
        let villager = place_unit(&mut m, 0, UnitType::Villager, pos(30, 30));
        let tc = m.players[0].starting_town_center.unwrap();
        let repair = |building_id: IdField, unit_id: IdField| Command::Repair {
            building_id,
            unit_id,
            builder_ids: vec![villager],
            queue: false,
        };
        assert_eq!(
            dispatch(&mut m, 0, &repair(IdField::Absent, IdField::Absent)),
            CommandOutcome::Rejected(Rejection::InvalidTarget)
        );
        assert_eq!(
            dispatch(&mut m, 0, &repair(IdField::Id(tc), IdField::Absent)),
            CommandOutcome::Rejected(Rejection::NotDamaged)
        );
        assert_eq!(
            dispatch(&mut m, 0, &repair(IdField::Absent, IdField::Id(villager))),
            CommandOutcome::Rejected(Rejection::InvalidUnit)
        );
        m.building_mut(tc).unwrap().hp = fixed(100);
        assert_eq!(dispatch(&mut m, 0, &repair(IdField::Id(tc), IdField::Absent)), CommandOutcome::OK);
        assert_eq!(
            m.unit(villager).unwrap().order,
            Some(Order::Repair {
                target: EntityRef::Building(tc)
            })
        );
    }

    #[test]
    fn test_produce_requires_age_and_charges_cost() {
        let mut m = create_test_match(2);
        let barracks = place_building(&mut m, Some(0), BuildingType::Barracks, pos(40, 40));
        let produce = |unit: &str| Command::Produce {
            building_id: IdField::Id(barracks),
            unit_type: unit.to_string(),
        };
        let before = m.clone();
        assert_eq!(dispatch(&mut m, 0, &produce("ManAtArms")), CommandOutcome::Rejected(Rejection::AgeRequired));
        assert_eq!(dispatch(&mut m, 0, &produce("Villager")), CommandOutcome::Rejected(Rejection::InvalidUnitType));
        assert_eq!(m, before);

        assert_eq!(dispatch(&mut m, 0, &produce("Spearman")), CommandOutcome::OK);
        assert_eq!(m.players[0].resources.food, fixed(140));
        assert_eq!(m.players[0].resources.wood, fixed(180));
        let job = m.building(barracks).unwrap().production_queue[0];
        assert_eq!(job.kind, JobKind::Unit(UnitType::Spearman));
        assert_eq!(job.cost, Stockpile::new(60, 20, 0, 0));

        let house = place_building(&mut m, Some(0), BuildingType::House, pos(50, 50));
        let at_house = Command::Produce {
            building_id: IdField::Id(house),
            unit_type: "Spearman".to_string(),
        };
        assert_eq!(dispatch(&mut m, 0, &at_house), CommandOutcome::Rejected(Rejection::CannotProduceHere));
    }

    #[test]
    fn test_produce_checks_required_tech() {
        let mut content = ContentTables::standard().unwrap();
        content.units.get_mut(&UnitType::Spearman).unwrap().requires_tech = Some(TechId::CarryingFrame);
        let mut m = create_test_match_with(2, content);
        let barracks = place_building(&mut m, Some(0), BuildingType::Barracks, pos(40, 40));
        let produce = Command::Produce {
            building_id: IdField::Id(barracks),
            unit_type: "Spearman".to_string(),
        };
        let before = m.clone();
        assert_eq!(dispatch(&mut m, 0, &produce), CommandOutcome::Rejected(Rejection::TechRequired));
        assert_eq!(m, before);

        m.players[0].techs.insert(TechId::CarryingFrame);
        assert_eq!(dispatch(&mut m, 0, &produce), CommandOutcome::OK);
    }

    #[test]
    fn test_produce_in_unfinished_or_foreign_building() {
        let mut m = create_test_match(2);
        let barracks = place_building(&mut m, Some(0), BuildingType::Barracks, pos(40, 40));
        m.building_mut(barracks).unwrap().under_construction = true;
        let produce = Command::Produce {
            building_id: IdField::Id(barracks),
            unit_type: "Spearman".to_string(),
        };
        assert_eq!(dispatch(&mut m, 0, &produce), CommandOutcome::Rejected(Rejection::BuildingIncomplete));
        assert_eq!(dispatch(&mut m, 1, &produce), CommandOutcome::Rejected(Rejection::InvalidBuilding));
    }

    #[test]
    fn test_cancel_queue_refunds_job() {
        let mut m = create_test_match(2);
        let tc = m.players[0].starting_town_center.unwrap();
        dispatch(
            &mut m,
            0,
            &Command::Produce {
                building_id: IdField::Id(tc),
                unit_type: "Villager".to_string(),
            },
        );
        assert_eq!(m.players[0].resources.food, fixed(150));
        let cancel = |index: Option<f64>| Command::CancelQueue {
            building_id: IdField::Id(tc),
            index,
        };
        assert_eq!(dispatch(&mut m, 0, &cancel(None)), CommandOutcome::Rejected(Rejection::InvalidIndex));
        assert_eq!(dispatch(&mut m, 0, &cancel(Some(1.0))), CommandOutcome::Rejected(Rejection::InvalidIndex));
        assert_eq!(dispatch(&mut m, 0, &cancel(Some(0.0))), CommandOutcome::OK);
        assert_eq!(m.players[0].resources.food, fixed(200));
        assert!(m.building(tc).unwrap().production_queue.is_empty());
    }

    #[test]
    fn test_research_reasons_in_order() {
        let mut m = create_test_match(2);
        let tc = m.players[0].starting_town_center.unwrap();
        let research = |tech: &str| Command::Research {
            tech_id: tech.to_string(),
            building_id: IdField::Id(tc),
        };
        assert_eq!(dispatch(&mut m, 0, &research("Warp")), CommandOutcome::Rejected(Rejection::UnknownTech));
        assert_eq!(
            dispatch(&mut m, 0, &research("Basketry")),
            CommandOutcome::Rejected(Rejection::CannotResearchHere)
        );
        assert_eq!(
            dispatch(&mut m, 0, &research("CarryingFrame")),
            CommandOutcome::Rejected(Rejection::AgeRequired)
        );
        m.players[0].age_tier = 1;
        m.players[0].resources = Stockpile::new(0, 100, 100, 0);
        assert_eq!(dispatch(&mut m, 0, &research("CarryingFrame")), CommandOutcome::OK);
        assert_eq!(
            dispatch(&mut m, 0, &research("CarryingFrame")),
            CommandOutcome::Rejected(Rejection::AlreadyResearching)
        );
        m.players[0].techs.insert(TechId::CarryingFrame);
        assert_eq!(
            dispatch(&mut m, 0, &research("CarryingFrame")),
            CommandOutcome::Rejected(Rejection::AlreadyResearched)
        );
    }

    #[test]
    fn test_rally_and_clear_rally() {
        let mut m = create_test_match(2);
        let tc = m.players[0].starting_town_center.unwrap();
        let bush = place_resource(&mut m, ResourceNodeType::Berry, pos(30, 30));
        let outcome = dispatch(
            &mut m,
            0,
            &Command::Rally {
                building_ids: None,
                building_id: IdField::Id(tc),
                target: point(30.5, 30.5),
            },
        );
        assert_eq!(outcome, CommandOutcome::Accepted { count: Some(1) });
        let rally = m.building(tc).unwrap().rally.unwrap();
        assert_eq!(rally.resource, Some(bush));

        let clear = Command::ClearRally {
            building_ids: Some(vec![tc]),
            building_id: IdField::Absent,
        };
        assert_eq!(dispatch(&mut m, 1, &clear), CommandOutcome::Rejected(Rejection::InvalidBuilding));
        assert_eq!(dispatch(&mut m, 0, &clear), CommandOutcome::Accepted { count: Some(1) });
        assert_eq!(m.building(tc).unwrap().rally, None);
    }

    #[test]
    fn test_fountain_mode() {
        let mut m = create_test_match(2);
        let fountain = place_building(&mut m, Some(0), BuildingType::GoldenFountainSquare, pos(40, 40));
        let set = |kind: &str| Command::SetFountainMode {
            building_id: IdField::Id(fountain),
            kind: kind.to_string(),
        };
        assert_eq!(dispatch(&mut m, 0, &set("stone")), CommandOutcome::Rejected(Rejection::InvalidMode));
        assert_eq!(dispatch(&mut m, 0, &set("GOLD")), CommandOutcome::OK);
        assert_eq!(m.building(fountain).unwrap().fountain_mode, Some(ResourceKind::Gold));
        assert_eq!(dispatch(&mut m, 1, &set("wood")), CommandOutcome::Rejected(Rejection::InvalidBuilding));
    }

    #[test]
    fn test_garrison_respects_capacity() {
        let mut m = create_test_match(2);
        let outpost = place_building(&mut m, Some(0), BuildingType::Outpost, pos(40, 40));
        let units: Vec<EntityId> = (0..7)
            .map(|i| place_unit(&mut m, 0, UnitType::Villager, pos(35 + i, 35)))
            .collect();
        dispatch(
            &mut m,
            0,
            &Command::Garrison {
                building_id: IdField::Id(outpost),
                unit_ids: units.clone(),
                queue: false,
            },
        );
        let ordered = units
            .iter()
            .filter(|id| m.unit(**id).unwrap().order == Some(Order::Garrison { building: outpost }))
            .count();
        assert_eq!(ordered, 5);
    }

    #[test]
    fn test_relic_commands() {
        let mut m = create_test_match(2);
        let monk = place_unit(&mut m, 0, UnitType::Monk, pos(40, 40));
        let relic = place_relic(&mut m, pos(45, 45));
        let pickup = Command::PickupRelic {
            unit_ids: vec![monk],
            relic_id: IdField::Id(relic),
            queue: false,
        };
        dispatch(&mut m, 0, &pickup);
        assert_eq!(m.unit(monk).unwrap().order, None, "relics need the second age");

        m.players[0].age_tier = 2;
        dispatch(&mut m, 0, &pickup);
        assert_eq!(m.unit(monk).unwrap().order, Some(Order::PickupRelic { relic }));

        m.relic_mut(relic).unwrap().holder = RelicHolder::Carried(monk);
        m.unit_mut(monk).unwrap().relic = Some(relic);
        let monastery = place_building(&mut m, Some(0), BuildingType::Monastery, pos(50, 50));
        dispatch(
            &mut m,
            0,
            &Command::DropRelicAt {
                unit_ids: vec![monk],
                target: Some(point(51.0, 51.0)),
                queue: false,
            },
        );
        assert_eq!(m.unit(monk).unwrap().order, Some(Order::DepositRelic { building: monastery }));

        dispatch(
            &mut m,
            0,
            &Command::DropRelicAt {
                unit_ids: vec![monk],
                target: None,
                queue: false,
            },
        );
        assert_eq!(m.unit(monk).unwrap().order, Some(Order::DropRelic { target: pos(40, 40) }));
    }

    #[test]
    fn test_trade_route_setup_and_restart() {
        let mut m = create_test_match(2);
        let trader = place_unit(&mut m, 0, UnitType::Trader, pos(40, 40));
        let market = place_building(&mut m, Some(0), BuildingType::Market, pos(36, 36));
        let post = place_building(&mut m, None, BuildingType::TradePost, pos(2, 90));

        let restart = Command::RestartTrading { unit_ids: vec![trader] };
        assert_eq!(dispatch(&mut m, 0, &restart), CommandOutcome::Rejected(Rejection::NoRoute));

        dispatch(
            &mut m,
            0,
            &Command::SetTradeHome {
                unit_ids: vec![trader],
                building_id: IdField::Id(market),
            },
        );
        assert_eq!(m.unit(trader).unwrap().order, None);
        dispatch(
            &mut m,
            0,
            &Command::SetTradeDestination {
                unit_ids: vec![trader],
                building_id: IdField::Id(post),
            },
        );
        let unit = m.unit(trader).unwrap();
        assert_eq!(unit.order, Some(Order::Trade { building: post }));
        assert_eq!(unit.trade.unwrap().leg, Some(TradeLeg::ToDest));
        assert_eq!(dispatch(&mut m, 0, &restart), CommandOutcome::OK);
    }

    #[test]
    fn test_cheats_need_permission() {
        let mut m = create_test_match(1);
        let grant = Command::Cheat {
            action: "grant_gold".to_string(),
            unit_type: None,
            x: f64::NAN,
            y: f64::NAN,
            target: RawPoint::INVALID,
        };
        dispatch(&mut m, 0, &grant);
        assert_eq!(m.players[0].resources.gold, Fixed::ZERO);

        m.flags.singleplayer = true;
        m.flags.host = Some(0);
        dispatch(&mut m, 0, &grant);
        assert_eq!(m.players[0].resources.gold, fixed(10_000));

        let spawn = Command::Cheat {
            action: "spawn_enemy".to_string(),
            unit_type: Some("Knight".to_string()),
            x: 60.0,
            y: 60.0,
            target: RawPoint::INVALID,
        };
        dispatch(&mut m, 0, &spawn);
        let enemy = m.units.iter().find(|u| u.kind == UnitType::Knight).unwrap();
        assert_eq!(enemy.owner, 1);
        assert!(m.is_enemy(Some(enemy.owner), Some(0)));
    }

    #[test]
    fn test_instant_build_shortens_queued_jobs() {
        let mut m = create_test_match(1);
        m.flags.allow_cheats = true;
        let tc = m.players[0].starting_town_center.unwrap();
        dispatch(
            &mut m,
            0,
            &Command::Produce {
                building_id: IdField::Id(tc),
                unit_type: "Villager".to_string(),
            },
        );
        dispatch(
            &mut m,
            0,
            &Command::Cheat {
                action: "instant_build".to_string(),
                unit_type: None,
                x: f64::NAN,
                y: f64::NAN,
                target: RawPoint::INVALID,
            },
        );
        assert!(m.flags.fast_build);
        let job = m.building(tc).unwrap().production_queue[0];
        assert_eq!(job.remaining, fixed_ratio(1, 10));
    }

    #[test]
    fn test_resign_notifies_others_and_ends_match() {
        let mut m = create_test_match(2);
        let outcome = dispatch(&mut m, 1, &Command::Resign);
        assert_eq!(outcome, CommandOutcome::Silent);
        assert!(m.players[1].eliminated);
        let events = m.outbox.drain();
        assert!(events
            .iter()
            .any(|e| e.audience == Audience::AllExcept(1) && e.event.name() == "playerResigned"));
        assert!(events.iter().any(|e| e.event.name() == "matchEnded"));
        assert!(m.is_over());
    }

    #[test]
    fn test_eliminated_player_commands_are_ignored() {
        let mut m = create_test_match(3);
        let unit = place_unit(&mut m, 2, UnitType::Spearman, pos(50, 50));
        disconnect(&mut m, 2);
        assert!(!m.is_over());
        let cmd = Command::Move {
            unit_ids: vec![unit],
            target: point(10.0, 10.0),
            queue: false,
        };
        assert_eq!(dispatch(&mut m, 2, &cmd), CommandOutcome::Silent);
        assert!(m.outbox.take_snapshot_request());
    }
}
