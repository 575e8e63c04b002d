//! Production queues: unit training, research and age advancement.
//!
//! Each building works on the head of its queue only. Costs are paid when a
//! job is queued, so completion never touches the stockpile except through
//! technology effects.

use tracing::{debug, trace};

use crate::data::TechScope;
use crate::entities::{EntityId, JobKind, PlayerIndex, ProductionJob};
use crate::events::{GameEvent, ResearchComplete, ResearchScope};
use crate::kinds::{BuildingType, TechId, UnitType};
use crate::math::Fixed;
use crate::orders::Order;
use crate::spawn::spawn_unit_near_building;
use crate::state::{Match, DT, MAX_AGE_TIER};
use crate::stats::{
    building_build_time, building_max_hp, can_complete_unit, landmark_tier, spire_max_hp_for_age, unit_production_time,
    unit_stats,
};

/// Raise a player's age. Returns `true` if the tier went up.
pub fn advance_age(m: &mut Match, owner: PlayerIndex, tier: u8) -> bool {
    let tier = tier.min(MAX_AGE_TIER);
    let Some(player) = m.player_mut(owner) else {
        return false;
    };
    if tier <= player.age_tier {
        return false;
    }
    player.advance_age(tier);
    debug!(player = owner, tier, "age advanced");
    true
}

/// Tell a player they reached an age through a landmark.
pub fn announce_landmark_age(m: &mut Match, owner: PlayerIndex, building: EntityId) {
    let Some(tier) = m.player(owner).map(|p| p.age_tier) else {
        return;
    };
    let name = m.content().age_name(tier).to_string();
    m.outbox.to_player(
        owner,
        GameEvent::ResearchComplete(ResearchComplete {
            tech_id: None,
            name: name.clone(),
            is_age: true,
            age_tier: Some(tier),
            age: Some(name),
            building_id: Some(building),
            scope: ResearchScope::Landmark,
        }),
    );
}

/// Remove a queued job and refund what was paid for it.
///
/// Returns the removed job, or `None` if the index is out of range.
pub fn cancel_job(m: &mut Match, building: EntityId, index: usize) -> Option<ProductionJob> {
    let b = m.building_mut(building)?;
    let owner = b.owner?;
    let job = b.production_queue.remove(index)?;
    if let Some(player) = m.player_mut(owner) {
        player.resources.refund(&job.cost);
    }
    trace!(building, ?job.kind, "production cancelled");
    Some(job)
}

/// Health change of an upgraded unit line, applied to living units.
fn apply_unit_upgrade(m: &mut Match, owner: PlayerIndex, unit: UnitType, old_health: Fixed, new_health: Fixed) {
    for u in m.units.iter_mut().filter(|u| u.owner == owner && u.kind == unit) {
        let scaled_old = old_health * u.bonus_hp_multiplier;
        let scaled_new = new_health * u.bonus_hp_multiplier;
        u.max_hp = scaled_new;
        u.hp = (u.hp + scaled_new - scaled_old).min(scaled_new).max(Fixed::ONE);
    }
}

/// Rescale every unit's health to its new maximum, keeping the ratio.
fn rescale_unit_health(m: &mut Match, owner: PlayerIndex) {
    let content = m.content_arc();
    let Some(player) = m.player(owner).cloned() else {
        return;
    };
    for u in m.units.iter_mut().filter(|u| u.owner == owner) {
        let new_max = (unit_stats(&content, Some(&player), u.kind).health * u.bonus_hp_multiplier).max(Fixed::ONE);
        let old_max = u.max_hp.max(Fixed::ONE);
        let ratio = (u.hp / old_max).clamp(Fixed::ZERO, Fixed::ONE);
        u.max_hp = new_max;
        u.hp = (new_max * ratio).min(new_max).max(Fixed::ONE);
    }
}

/// Rescale building health after a building health technology.
fn rescale_building_health(m: &mut Match, owner: PlayerIndex) {
    let content = m.content_arc();
    let Some(player) = m.player(owner).cloned() else {
        return;
    };
    for i in 0..m.buildings.len() {
        let b = &m.buildings[i];
        if !b.is_owned_by(owner) {
            continue;
        }
        let next_max = if b.kind == BuildingType::DominionSpire {
            spire_max_hp_for_age(&content, &player, landmark_tier(m, b).unwrap_or(1))
        } else {
            building_max_hp(m, Some(owner), b.kind)
        };
        let previous_max = b.max_hp.max(Fixed::ONE);
        if next_max <= Fixed::ZERO || next_max == b.max_hp {
            continue;
        }
        let b = &mut m.buildings[i];
        let ratio = (b.hp / previous_max).clamp(Fixed::ZERO, Fixed::ONE);
        b.max_hp = next_max;
        b.hp = if b.under_construction {
            (next_max * construction_ratio(b.build_progress, b.build_time)).round().max(Fixed::ONE)
        } else {
            (next_max * ratio).min(next_max).max(Fixed::ONE)
        };
    }
}

fn construction_ratio(progress: Fixed, total: Fixed) -> Fixed {
    if total <= Fixed::ZERO {
        return Fixed::ONE;
    }
    (progress / total).clamp(Fixed::ZERO, Fixed::ONE)
}

/// Shorten construction sites and queued siege jobs after faster
/// fabrication is researched, keeping relative progress.
fn rescale_build_times(m: &mut Match, owner: PlayerIndex) {
    let content = m.content_arc();
    let Some(player) = m.player(owner).cloned() else {
        return;
    };
    for i in 0..m.buildings.len() {
        if !m.buildings[i].is_owned_by(owner) {
            continue;
        }
        let new_job_times: Vec<Option<Fixed>> = m.buildings[i]
            .production_queue
            .iter()
            .map(|job| {
                job.unit()
                    .filter(|u| content.unit(*u).is_siege())
                    .map(|u| unit_production_time(m, &player, u, Some(&m.buildings[i])))
            })
            .collect();

        let b = &mut m.buildings[i];
        if b.under_construction {
            let previous = b.build_time;
            let next = building_build_time(&content, Some(&player), b.kind);
            if previous > Fixed::ZERO && next > Fixed::ZERO && next != previous {
                let ratio = construction_ratio(b.build_progress, previous);
                b.build_time = next;
                b.build_progress = (ratio * next).min(next);
                b.hp = (b.max_hp * ratio).round().max(Fixed::ONE);
            }
        }
        for (job, next) in b.production_queue.iter_mut().zip(new_job_times) {
            let Some(next) = next else { continue };
            if job.total <= Fixed::ZERO || next <= Fixed::ZERO || next == job.total {
                continue;
            }
            let done = (Fixed::ONE - job.remaining / job.total).clamp(Fixed::ZERO, Fixed::ONE);
            job.total = next;
            job.remaining = (next * (Fixed::ONE - done)).max(Fixed::ZERO);
        }
    }
}

fn complete_tech(m: &mut Match, building: EntityId, owner: PlayerIndex, tech: TechId) {
    let content = m.content_arc();
    let data = content.tech(tech);
    let Some(player) = m.player(owner) else {
        return;
    };
    let upgrade = data
        .upgrade_unit
        .filter(|_| !data.is_building_scoped())
        .map(|unit| (unit, unit_stats(&content, Some(player), unit).health));

    if data.is_building_scoped() {
        if let Some(b) = m.building_mut(building) {
            b.techs.insert(tech);
        }
    } else if let Some(player) = m.player_mut(owner) {
        player.techs.insert(tech);
    }

    if let Some((unit, old_health)) = upgrade {
        let new_health = m
            .player(owner)
            .map_or(old_health, |p| unit_stats(&content, Some(p), unit).health);
        apply_unit_upgrade(m, owner, unit, old_health, new_health);
    }
    if let Some(tier) = data.age_tier {
        advance_age(m, owner, tier);
    }
    match tech {
        TechId::GreaterRations => rescale_unit_health(m, owner),
        TechId::BedrockFoundations => rescale_building_health(m, owner),
        TechId::RapidFabrications => rescale_build_times(m, owner),
        _ => {}
    }

    let age = data
        .age_tier
        .and_then(|_| m.player(owner))
        .map(|p| content.age_name(p.age_tier).to_string());
    let scope = match data.scope {
        TechScope::Player => ResearchScope::Player,
        TechScope::Building => ResearchScope::Building,
    };
    m.outbox.to_player(
        owner,
        GameEvent::ResearchComplete(ResearchComplete {
            tech_id: Some(tech),
            name: data.name.clone(),
            is_age: data.is_age_tech(),
            age_tier: data.age_tier,
            age,
            building_id: data.is_building_scoped().then_some(building),
            scope,
        }),
    );
    debug!(player = owner, ?tech, "research complete");
}

/// Returns `false` if the unit is held back by the population cap.
fn complete_unit(m: &mut Match, building: EntityId, owner: PlayerIndex, unit: UnitType) -> bool {
    if !can_complete_unit(m, owner, unit) {
        return false;
    }
    let Some(id) = spawn_unit_near_building(m, building, unit) else {
        return true;
    };
    m.outbox.to_player(owner, GameEvent::UnitComplete { unit_type: unit });

    let rally = m.building(building).and_then(|b| b.rally);
    if let (Some(rally), Some(u)) = (rally, m.unit_mut(id)) {
        // Traders already on a route keep it.
        if u.order.is_none() {
            u.order = Some(match rally.resource {
                Some(resource) if u.kind == UnitType::Villager => Order::Gather { resource },
                _ => Order::Move {
                    target: rally.position,
                    formation: None,
                },
            });
        }
    }
    trace!(building, unit = id, ?unit, "unit trained");
    true
}

/// Production phase.
pub fn process_production(m: &mut Match) {
    let content = m.content_arc();
    for i in 0..m.buildings.len() {
        let Some(b) = m.buildings.get_mut(i) else {
            break;
        };
        if b.landmark_destroyed && content.building(b.kind).is_landmark() {
            continue;
        }
        let (Some(owner), Some(job)) = (b.owner, b.production_queue.front_mut()) else {
            continue;
        };
        job.remaining -= DT;
        if job.remaining > Fixed::ZERO {
            continue;
        }
        let building = b.id;
        let kind = job.kind;

        let finished = match kind {
            JobKind::Tech(tech) => {
                complete_tech(m, building, owner, tech);
                true
            }
            JobKind::Unit(unit) => complete_unit(m, building, owner, unit),
        };

        let Some(b) = m.building_mut(building) else {
            continue;
        };
        if finished {
            b.production_queue.pop_front();
        } else if let Some(job) = b.production_queue.front_mut() {
            job.remaining = Fixed::ZERO;
            job.stalled = true;
        }
    }
}
