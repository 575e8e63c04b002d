//! Combat phase: unit attacks, shots in flight, attack alerts and deaths.
//!
//! Every ranged unit shot becomes a [`PendingImpact`] that lands after the
//! projectile's travel time and is revalidated on arrival. Melee hits land
//! at once. Building weapons live in [`crate::defenses`].

use serde::Serialize;
use tracing::{debug, info};

use crate::buildings::{distance_to_footprint, is_untargetable};
use crate::data::{ContentTables, DamageBonus, SplashTier};
use crate::defenses::process_building_attacks;
use crate::entities::{EntityId, EntityRef, PlayerIndex, Unit};
use crate::events::{AlertKind, AttackAlert, GameEvent, LandmarkDestroyed};
use crate::kinds::UnitType;
use crate::math::{atan2, fixed_int, fixed_ratio, normalize_angle, rotate_towards, Fixed, Vec2Fixed};
use crate::orders::{break_formation, Order, ReturnTo};
use crate::relics::{drop_carried, release_stored};
use crate::spawn::ungarrison;
use crate::state::{Match, DT, TICK_RATE};
use crate::stats::{
    armor, bonus_damage, damage_multiplier, ranged_resistance, target_class, unit_damage_bonus, unit_min_range,
    unit_range, unit_stats, MELEE_RANGE,
};
use crate::targeting::{
    aim_point, can_player_see, can_player_see_point, entity_center, find_nearest_enemy, find_nearest_enemy_unit,
    is_in_range, target_distance,
};

/// Projectile speed in tiles per second.
pub const PROJECTILE_SPEED: Fixed = fixed_int(12);

/// Shortest projectile flight in seconds.
pub const MIN_TRAVEL_TIME: Fixed = fixed_ratio(12, 100);

/// Unit turn rate in radians per second.
pub const TURN_RATE: Fixed = fixed_int(5);

/// Ranged units fire only when facing within this angle of the target.
pub const FIRE_FACING_TOLERANCE: Fixed = fixed_ratio(14, 100);

/// Melee units are pulled into fights within this radius.
pub const THREAT_RADIUS: Fixed = fixed_int(5);

/// Knights start a charge at targets at least this far away.
pub const CHARGE_MIN_DISTANCE: Fixed = fixed_int(2);

/// Seconds a charge lasts, and the cooldown after it ends.
pub const CHARGE_DURATION: Fixed = fixed_int(10);

/// Side of the square buckets attack alerts are deduplicated in.
pub const ALERT_BUCKET: Fixed = fixed_int(5);

/// Ticks an alert bucket stays quiet.
pub const ALERT_COOLDOWN_TICKS: u64 = 3 * TICK_RATE;

/// Cooldown slot of one attack alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct AlertKey {
    pub recipient: PlayerIndex,
    pub bucket_x: i32,
    pub bucket_y: i32,
    pub kind: AlertKind,
    pub is_ally: bool,
}

/// Visual projectile type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectileKind {
    Arrow,
    Boulder,
    Cannonball,
    Springald,
    Disruptor,
}

impl ProjectileKind {
    /// Projectile a unit type fires.
    #[must_use]
    pub fn for_unit(kind: UnitType) -> Self {
        match kind {
            UnitType::CounterweightTrebuchet => Self::Boulder,
            UnitType::Cannon => Self::Cannonball,
            _ => Self::Arrow,
        }
    }
}

/// A shot fired this tick, for clients to animate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProjectileEvent {
    pub from: Vec2Fixed,
    pub to: Vec2Fixed,
    #[serde(rename = "type")]
    pub kind: ProjectileKind,
}

/// Area damage landing at a point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplashImpact {
    pub center: Vec2Fixed,
    pub damage: Fixed,
    pub bonus: Vec<DamageBonus>,
    pub radius: Fixed,
    /// Rings, innermost first. Empty means full damage inside `radius`.
    pub falloff: Vec<SplashTier>,
    /// Siege damage ignores ranged resistance.
    pub siege: bool,
    pub hits_buildings: bool,
}

/// What a shot does when it lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ImpactEffect {
    /// Fixed damage to one target.
    Direct { target: EntityRef, damage: Fixed },
    /// Area damage.
    Splash(SplashImpact),
}

/// A shot in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingImpact {
    /// Tick the shot lands on.
    pub hit_tick: u64,
    pub attacker: EntityRef,
    pub owner: Option<PlayerIndex>,
    /// Where the shot was fired from.
    pub source: Vec2Fixed,
    pub effect: ImpactEffect,
}

/// Ticks a projectile needs to fly from `from` to `to`.
#[must_use]
pub fn travel_ticks(from: Vec2Fixed, to: Vec2Fixed) -> u64 {
    let seconds = (from.distance(to) / PROJECTILE_SPEED).max(MIN_TRAVEL_TIME);
    (seconds * Fixed::from_num(TICK_RATE)).ceil().to_num::<u64>()
}

/// Damage scale at `distance` from a splash centre.
#[must_use]
pub fn splash_scale(radius: Fixed, falloff: &[SplashTier], distance: Fixed) -> Fixed {
    if falloff.is_empty() {
        return if distance <= radius { Fixed::ONE } else { Fixed::ZERO };
    }
    falloff
        .iter()
        .find(|tier| distance <= tier.radius)
        .map_or(Fixed::ZERO, |tier| tier.scale)
}

/// Check if an owner may attack a target right now.
#[must_use]
pub fn is_attackable(m: &Match, attacker: Option<PlayerIndex>, target: EntityRef) -> bool {
    match target {
        EntityRef::Unit(id) => m
            .unit(id)
            .is_some_and(|u| u.is_alive() && m.is_enemy(Some(u.owner), attacker)),
        EntityRef::Building(id) => m.building(id).is_some_and(|b| {
            let data = m.content().building(b.kind);
            b.owner.is_some()
                && b.hp > Fixed::ZERO
                && !data.is_neutral
                && !data.is_invulnerable
                && !is_untargetable(m.content(), b)
                && m.is_enemy(b.owner, attacker)
        }),
    }
}

/// Subtract health from a unit or building.
pub(crate) fn apply_damage(m: &mut Match, target: EntityRef, amount: Fixed) {
    let tick = m.tick;
    match target {
        EntityRef::Unit(id) => {
            if let Some(u) = m.unit_mut(id) {
                u.hp -= amount;
                u.last_combat_tick = Some(tick);
            }
        }
        EntityRef::Building(id) => {
            if let Some(b) = m.building_mut(id) {
                b.hp -= amount;
            }
        }
    }
}

/// Warn the victim's team that something of theirs is under attack.
///
/// Each recipient hears about one bucket, kind and ally flag at most once
/// per cooldown. The attacker's position is left out when the recipient can
/// already see it.
pub(crate) fn raise_attack_alert(m: &mut Match, victim: EntityRef, attacker: Option<Vec2Fixed>) {
    let content = m.content_arc();
    let Some(owner) = m.owner_of(victim) else {
        return;
    };
    if m.player(owner).map_or(true, |p| p.eliminated) {
        return;
    }
    let (anchor, kind) = match victim {
        EntityRef::Unit(id) => match m.unit(id) {
            Some(u) => (u.position, AlertKind::Unit),
            None => return,
        },
        EntityRef::Building(id) => match m.building(id) {
            Some(b) if content.building(b.kind).is_landmark() => (b.position, AlertKind::Landmark),
            Some(b) => (b.position, AlertKind::Building),
            None => return,
        },
    };
    let Some(spot) = entity_center(m, victim) else {
        return;
    };
    let bucket_x = (anchor.x / ALERT_BUCKET).floor().to_num::<i32>();
    let bucket_y = (anchor.y / ALERT_BUCKET).floor().to_num::<i32>();
    let cooldown = m.flags.alert_cooldown_ticks.unwrap_or(ALERT_COOLDOWN_TICKS);
    let team = m.team_of(owner);
    let recipients: Vec<PlayerIndex> = m
        .players
        .iter()
        .filter(|p| p.connected && !p.eliminated && p.team == team)
        .map(|p| p.index)
        .collect();

    for recipient in recipients {
        let is_ally = recipient != owner;
        let key = AlertKey {
            recipient,
            bucket_x,
            bucket_y,
            kind,
            is_ally,
        };
        if m.alert_cooldowns.get(&key).is_some_and(|until| m.tick < *until) {
            continue;
        }
        m.alert_cooldowns.insert(key, m.tick + cooldown);
        let shown = attacker.filter(|p| !can_player_see_point(m, recipient, *p));
        m.outbox.to_player(
            recipient,
            GameEvent::AttackAlert(AttackAlert {
                kind,
                is_ally,
                x: spot.x,
                y: spot.y,
                attacker_x: shown.map(|p| p.x),
                attacker_y: shown.map(|p| p.y),
            }),
        );
    }
}

/// A melee unit hit from afar with nothing in its own reach turns on the
/// shooter. Villagers, monks and units under a move order do not.
pub(crate) fn retaliate(m: &mut Match, victim: EntityRef, attacker: EntityRef) {
    let EntityRef::Unit(id) = victim else {
        return;
    };
    let Some(u) = m.unit(id) else {
        return;
    };
    if !u.is_alive() || matches!(u.kind, UnitType::Villager | UnitType::Monk) {
        return;
    }
    if matches!(u.order, Some(Order::Move { .. })) {
        return;
    }
    let range = m.content().unit(u.kind).range;
    let reach = if range > Fixed::ZERO { range } else { fixed_ratio(1, 2) };
    if reach > MELEE_RANGE {
        return;
    }
    if find_nearest_enemy_unit(m, Some(u.owner), u.position, reach, Fixed::ZERO).is_some() {
        return;
    }
    if m.health_of(attacker).is_none() {
        return;
    }
    if let Some(u) = m.unit_mut(id) {
        u.attack_target = Some(attacker);
    }
}

fn stop_charge(unit: &mut Unit) {
    unit.charge.active = false;
    unit.charge.time = Fixed::ZERO;
    unit.charge.target = None;
    unit.charge.cooldown = unit.charge.cooldown.max(CHARGE_DURATION);
}

/// Turn a unit towards its target. Returns the remaining angle.
fn face_target(m: &mut Match, index: usize, target: EntityRef) -> Fixed {
    let position = m.units[index].position;
    let Some(aim) = aim_point(m, position, target) else {
        return Fixed::ZERO;
    };
    let delta = aim - position;
    if delta.length() < fixed_ratio(1, 10_000) {
        return Fixed::ZERO;
    }
    let desired = atan2(delta.y, delta.x);
    let unit = &mut m.units[index];
    unit.facing = normalize_angle(rotate_towards(unit.facing, desired, TURN_RATE * DT));
    normalize_angle(desired - unit.facing).abs()
}

/// Land every shot due this tick.
fn resolve_impacts(m: &mut Match) {
    let tick = m.tick;
    let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut m.pending_impacts)
        .into_iter()
        .partition(|impact| impact.hit_tick <= tick);
    m.pending_impacts = pending;

    for impact in due {
        match impact.effect {
            ImpactEffect::Direct { target, damage } => {
                if !is_attackable(m, impact.owner, target) {
                    continue;
                }
                let from = match impact.attacker {
                    EntityRef::Unit(id) => m.unit(id).map_or(impact.source, |u| u.position),
                    EntityRef::Building(_) => impact.source,
                };
                apply_damage(m, target, damage);
                raise_attack_alert(m, target, Some(from));
                retaliate(m, target, impact.attacker);
            }
            ImpactEffect::Splash(ref splash) => resolve_splash(m, &impact, splash),
        }
    }
}

fn resolve_splash(m: &mut Match, impact: &PendingImpact, splash: &SplashImpact) {
    let content = m.content_arc();
    let mut hits: Vec<(EntityRef, Fixed)> = Vec::new();
    for u in m.units.iter().filter(|u| u.is_alive() && m.is_enemy(Some(u.owner), impact.owner)) {
        let scale = splash_scale(splash.radius, &splash.falloff, u.position.distance(splash.center));
        if scale <= Fixed::ZERO {
            continue;
        }
        let target = EntityRef::Unit(u.id);
        let bonus = bonus_damage(&splash.bonus, target_class(m, target));
        let resistance = if splash.siege {
            Fixed::ZERO
        } else {
            ranged_resistance(m, target)
        };
        let damage = (splash.damage + bonus) * scale * (Fixed::ONE - resistance);
        if damage > Fixed::ZERO {
            hits.push((target, damage));
        }
    }
    if splash.hits_buildings {
        for b in &m.buildings {
            let target = EntityRef::Building(b.id);
            if !is_attackable(m, impact.owner, target) {
                continue;
            }
            let distance = distance_to_footprint(&content, b, splash.center);
            let scale = splash_scale(splash.radius, &splash.falloff, distance);
            let damage = (splash.damage + bonus_damage(&splash.bonus, "Building")) * scale;
            if damage > Fixed::ZERO {
                hits.push((target, damage));
            }
        }
    }
    for (target, damage) in hits {
        apply_damage(m, target, damage);
        raise_attack_alert(m, target, Some(impact.source));
        retaliate(m, target, impact.attacker);
    }
}

/// Pick what a unit attacks this tick.
fn choose_target(m: &mut Match, index: usize, manual: bool, attack_move: bool) -> Option<EntityRef> {
    let unit = &m.units[index];
    let (owner, position) = (unit.owner, unit.position);
    let range = unit_range(m, unit);
    let min_range = unit_min_range(m, unit);
    let melee = range <= MELEE_RANGE;

    let mut target = unit.attack_target.filter(|t| is_attackable(m, Some(owner), *t));
    if unit.charge.active && unit.charge.target != target {
        stop_charge(&mut m.units[index]);
    }
    if matches!(target, Some(EntityRef::Building(_))) && !manual {
        if let Some(preferred) = find_nearest_enemy_unit(m, Some(owner), position, range, min_range) {
            target = Some(preferred);
        }
    }
    if target.is_none() && (attack_move || !melee) {
        target = find_nearest_enemy(m, Some(owner), position, range, min_range);
    }
    if target.is_none() && melee {
        target = find_nearest_enemy(m, Some(owner), position, THREAT_RADIUS, Fixed::ZERO);
    }
    m.units[index].attack_target = target;
    target
}

fn unit_attack(m: &mut Match, index: usize, content: &ContentTables) {
    let tick = m.tick;
    let unit = &mut m.units[index];
    let data = content.unit(unit.kind);
    if !unit.is_alive() || unit.kind == UnitType::Trader || data.damage <= Fixed::ZERO {
        return;
    }
    unit.attack_cooldown = (unit.attack_cooldown - DT).max(Fixed::ZERO);
    unit.charge.cooldown = (unit.charge.cooldown - DT).max(Fixed::ZERO);
    if unit.charge.active {
        unit.charge.time += DT;
        if unit.charge.time >= CHARGE_DURATION {
            stop_charge(unit);
        }
    }
    match unit.order {
        Some(Order::Move { .. }) => {
            if unit.charge.active {
                stop_charge(unit);
            }
            unit.attack_target = None;
            return;
        }
        Some(Order::Attack { .. } | Order::AttackMove { .. }) => {}
        _ if unit.kind == UnitType::Villager => {
            unit.attack_target = None;
            return;
        }
        _ => {}
    }
    let (id, owner, kind, position) = (unit.id, unit.owner, unit.kind, unit.position);
    let manual = matches!(unit.order, Some(Order::Attack { manual: true, .. }));
    let attack_move = matches!(unit.order, Some(Order::AttackMove { .. }));
    let formation = match unit.order {
        Some(Order::AttackMove {
            formation: Some(slot), ..
        }) => Some(slot.id),
        _ => None,
    };

    if let Some(formation) = formation {
        if find_nearest_enemy(m, Some(owner), position, THREAT_RADIUS, Fixed::ZERO).is_some() {
            break_formation(m, formation);
        }
    }

    let target = choose_target(m, index, manual, attack_move);
    let lost = manual && target.is_some_and(|t| !t.is_building() && !can_player_see(m, owner, t));
    if lost {
        let unit = &mut m.units[index];
        unit.order = None;
        unit.attack_target = None;
        if unit.charge.active {
            stop_charge(unit);
        }
        debug!(unit = id, "manual target lost from sight");
        return;
    }
    let Some(target) = target else {
        return;
    };

    if kind == UnitType::Knight {
        let distance = target_distance(m, position, target).unwrap_or(Fixed::ZERO);
        let charge = &mut m.units[index].charge;
        if !charge.active && charge.cooldown <= Fixed::ZERO && distance >= CHARGE_MIN_DISTANCE {
            charge.active = true;
            charge.time = Fixed::ZERO;
            charge.target = Some(target);
        }
    }

    let range = unit_range(m, &m.units[index]);
    let min_range = unit_min_range(m, &m.units[index]);
    let ranged = range > MELEE_RANGE;
    let in_range = is_in_range(m, &m.units[index], target, range, min_range);
    if ranged {
        let off = face_target(m, index, target);
        if in_range && off > FIRE_FACING_TOLERANCE {
            return;
        }
    }
    if !in_range {
        if !ranged {
            m.units[index].order = Some(Order::Attack { target, manual });
        }
        return;
    }
    if m.units[index].attack_cooldown > Fixed::ZERO {
        return;
    }

    let unit = &m.units[index];
    let stats = unit_stats(content, m.player(owner), kind);
    let bonus = bonus_damage(stats.bonus, target_class(m, target));
    let charge = if kind == UnitType::Knight && unit.charge.active {
        stats.charge_damage
    } else {
        Fixed::ZERO
    };
    let tech = unit_damage_bonus(m, unit, ranged);
    let siege = data.is_siege();
    let armor = if siege { Fixed::ZERO } else { armor(m, target, ranged) };
    let raw = (stats.damage + bonus + charge + tech) * damage_multiplier(m, unit);
    let hit = (raw - armor).max(Fixed::ONE);
    let resistance = if ranged && !siege && !target.is_building() {
        ranged_resistance(m, target)
    } else {
        Fixed::ZERO
    };
    let damage = hit * (Fixed::ONE - resistance);

    let unit = &mut m.units[index];
    unit.last_combat_tick = Some(tick);
    unit.attack_cooldown = if data.attack_cooldown > Fixed::ZERO {
        data.attack_cooldown
    } else {
        Fixed::ONE
    };
    if unit.charge.active {
        stop_charge(unit);
    }

    if ranged {
        let to = entity_center(m, target).unwrap_or(position);
        m.pending_impacts.push(PendingImpact {
            hit_tick: tick + travel_ticks(position, to),
            attacker: EntityRef::Unit(id),
            owner: Some(owner),
            source: position,
            effect: ImpactEffect::Direct { target, damage },
        });
        m.projectiles.push(ProjectileEvent {
            from: position,
            to,
            kind: ProjectileKind::for_unit(kind),
        });
    } else {
        apply_damage(m, target, damage);
        raise_attack_alert(m, target, Some(position));
    }
}

/// Turn a fallen landmark into a corpse.
fn fell_landmark(m: &mut Match, id: EntityId) {
    let content = m.content_arc();
    let Some(b) = m.building_mut(id) else {
        return;
    };
    b.landmark_destroyed = true;
    b.hp = Fixed::ZERO;
    b.attack_target = None;
    b.rally = None;
    b.production_queue.clear();
    let (owner, kind, garrisoned) = (b.owner, b.kind, b.garrison.len());
    let spot = crate::buildings::center(&content, b);
    info!(building = id, ?kind, ?owner, "landmark destroyed");

    if let Some(owner) = owner {
        m.outbox.to_player(
            owner,
            GameEvent::LandmarkDestroyed(LandmarkDestroyed {
                building_id: id,
                building_type: kind,
                x: spot.x,
                y: spot.y,
            }),
        );
    }
    if garrisoned > 0 {
        ungarrison(m, id, garrisoned);
    }
    for u in &mut m.units {
        let stale = match u.order {
            Some(Order::Garrison { building } | Order::Farm { building }) => building == id,
            Some(Order::Return { building, resume }) => building == id || resume == ReturnTo::Farm(id),
            _ => false,
        };
        if stale {
            u.order = None;
        }
    }
}

/// Remove the dead. Carried and stored relics fall to the ground; landmarks
/// stay behind as corpses.
pub fn remove_dead(m: &mut Match) {
    let content = m.content_arc();
    let dead_units: Vec<EntityId> = m.units.iter().filter(|u| !u.is_alive()).map(|u| u.id).collect();
    for id in dead_units {
        drop_carried(m, id);
    }
    m.units.retain(Unit::is_alive);

    let dead_buildings: Vec<(EntityId, bool)> = m
        .buildings
        .iter()
        .filter(|b| b.hp <= Fixed::ZERO && !b.landmark_destroyed)
        .map(|b| (b.id, content.building(b.kind).is_landmark()))
        .collect();
    for (id, landmark) in dead_buildings {
        release_stored(m, id);
        if landmark {
            fell_landmark(m, id);
        } else {
            debug!(building = id, "building destroyed");
        }
    }
    m.buildings
        .retain(|b| b.hp > Fixed::ZERO || content.building(b.kind).is_landmark());
}

/// Combat phase.
pub fn process_combat(m: &mut Match) {
    let content = m.content_arc();
    resolve_impacts(m);
    for i in 0..m.units.len() {
        unit_attack(m, i, &content);
    }
    process_building_attacks(m);
    remove_dead(m);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::RelicHolder;
    use crate::events::Audience;
    use crate::kinds::BuildingType;
    use crate::test_support::{create_test_match, place_building, place_relic, place_unit};

    fn fixed(n: i32) -> Fixed {
        fixed_int(n)
    }

    fn pos(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(fixed(x), fixed(y))
    }

    fn tick_combat(m: &mut Match) {
        m.tick += 1;
        process_combat(m);
    }

    #[test]
    fn test_travel_ticks_round_up_to_tick_grid() {
        assert_eq!(travel_ticks(pos(0, 0), pos(8, 0)), 14);
        assert_eq!(travel_ticks(pos(0, 0), pos(0, 0)), 3);
        assert_eq!(travel_ticks(pos(0, 0), pos(12, 0)), 20);
    }

    #[test]
    fn test_splash_scale_uses_rings() {
        let falloff = [
            SplashTier {
                radius: fixed_ratio(1, 2),
                scale: Fixed::ONE,
            },
            SplashTier {
                radius: Fixed::ONE,
                scale: fixed_ratio(1, 2),
            },
        ];
        assert_eq!(splash_scale(Fixed::ONE, &falloff, fixed_ratio(1, 4)), Fixed::ONE);
        assert_eq!(splash_scale(Fixed::ONE, &falloff, fixed_ratio(3, 4)), fixed_ratio(1, 2));
        assert_eq!(splash_scale(Fixed::ONE, &falloff, fixed(2)), Fixed::ZERO);
        assert_eq!(splash_scale(Fixed::ONE, &[], fixed_ratio(3, 4)), Fixed::ONE);
    }

    #[test]
    fn test_splash_impact_hits_enemies_around_the_point() {
        let mut m = create_test_match(2);
        let shooter = place_unit(&mut m, 0, UnitType::Spearman, pos(30, 50));
        let friend = place_unit(&mut m, 0, UnitType::Spearman, pos(50, 50));
        let enemy = place_unit(&mut m, 1, UnitType::Spearman, pos(50, 50) + Vec2Fixed::new(fixed_ratio(1, 2), Fixed::ZERO));
        let far = place_unit(&mut m, 1, UnitType::Spearman, pos(60, 50));
        m.pending_impacts.push(PendingImpact {
            hit_tick: m.tick + 1,
            attacker: EntityRef::Unit(shooter),
            owner: Some(0),
            source: pos(30, 50),
            effect: ImpactEffect::Splash(SplashImpact {
                center: pos(50, 50),
                damage: fixed(10),
                bonus: Vec::new(),
                radius: fixed(2),
                falloff: Vec::new(),
                siege: true,
                hits_buildings: false,
            }),
        });
        // Shots in flight are part of the hashed state.
        assert!(crate::simulation::state_hash(&m).is_ok());
        let hp = |m: &Match, id| m.unit(id).unwrap().hp;
        let (friend_hp, enemy_hp, far_hp) = (hp(&m, friend), hp(&m, enemy), hp(&m, far));

        resolve_impacts(&mut m);
        assert_eq!(m.pending_impacts.len(), 1, "not due yet");
        m.tick += 1;
        resolve_impacts(&mut m);
        assert!(m.pending_impacts.is_empty());
        assert!(hp(&m, enemy) < enemy_hp);
        assert_eq!(hp(&m, friend), friend_hp);
        assert_eq!(hp(&m, far), far_hp);
    }

    #[test]
    fn test_melee_hit_lands_at_once_with_armor() {
        let mut m = create_test_match(2);
        let attacker = place_unit(&mut m, 0, UnitType::Spearman, pos(50, 50));
        let victim = place_unit(&mut m, 1, UnitType::Spearman, pos(50, 50) + Vec2Fixed::new(fixed_ratio(6, 10), Fixed::ZERO));
        m.unit_mut(attacker).unwrap().attack_target = Some(EntityRef::Unit(victim));
        let before = m.unit(victim).unwrap().hp;
        tick_combat(&mut m);

        let hp = m.unit(victim).unwrap().hp;
        assert!(hp < before);
        assert!(m.pending_impacts.is_empty());
        assert!(m.unit(attacker).unwrap().attack_cooldown > Fixed::ZERO);
    }

    #[test]
    fn test_ranged_shot_lands_after_travel_time() {
        let mut m = create_test_match(2);
        let archer = place_unit(&mut m, 0, UnitType::Archer, pos(40, 50));
        let victim = place_unit(&mut m, 1, UnitType::Spearman, pos(40, 50) + Vec2Fixed::new(fixed(4), Fixed::ZERO));
        m.unit_mut(archer).unwrap().attack_target = Some(EntityRef::Unit(victim));
        let before = m.unit(victim).unwrap().hp;

        tick_combat(&mut m);
        assert_eq!(m.pending_impacts.len(), 1);
        assert_eq!(m.projectiles.len(), 1);
        let fired = m.tick;
        let landing = m.pending_impacts[0].hit_tick;
        assert_eq!(landing, fired + travel_ticks(pos(40, 50), pos(44, 50)));

        while m.tick + 1 < landing {
            tick_combat(&mut m);
            assert_eq!(m.unit(victim).unwrap().hp, before);
        }
        tick_combat(&mut m);
        assert!(m.unit(victim).unwrap().hp < before);
    }

    #[test]
    fn test_shot_at_dead_target_does_nothing() {
        let mut m = create_test_match(2);
        let victim = place_unit(&mut m, 1, UnitType::Spearman, pos(44, 50));
        m.pending_impacts.push(PendingImpact {
            hit_tick: 1,
            attacker: EntityRef::Unit(9999),
            owner: Some(0),
            source: pos(40, 50),
            effect: ImpactEffect::Direct {
                target: EntityRef::Unit(victim),
                damage: fixed(5),
            },
        });
        m.units.retain(|u| u.id != victim);
        tick_combat(&mut m);
        assert!(m.pending_impacts.is_empty());
        assert!(m.outbox.is_empty());
    }

    #[test]
    fn test_ranged_hit_makes_melee_victim_retaliate() {
        let mut m = create_test_match(2);
        let victim = place_unit(&mut m, 1, UnitType::Spearman, pos(44, 50));
        let archer = place_unit(&mut m, 0, UnitType::Archer, pos(40, 50));
        m.pending_impacts.push(PendingImpact {
            hit_tick: 1,
            attacker: EntityRef::Unit(archer),
            owner: Some(0),
            source: pos(40, 50),
            effect: ImpactEffect::Direct {
                target: EntityRef::Unit(victim),
                damage: fixed(5),
            },
        });
        m.tick = 1;
        resolve_impacts(&mut m);
        assert_eq!(m.unit(victim).unwrap().attack_target, Some(EntityRef::Unit(archer)));
    }

    #[test]
    fn test_attack_alerts_are_rate_limited() {
        let mut m = create_test_match(2);
        let victim = place_unit(&mut m, 0, UnitType::Spearman, pos(30, 30));
        raise_attack_alert(&mut m, EntityRef::Unit(victim), Some(pos(90, 90)));
        raise_attack_alert(&mut m, EntityRef::Unit(victim), Some(pos(90, 90)));
        let alerts: Vec<_> = m.outbox.drain();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].audience, Audience::Player(0));
        match &alerts[0].event {
            GameEvent::AttackAlert(alert) => {
                assert_eq!(alert.kind, AlertKind::Unit);
                assert!(!alert.is_ally);
                assert_eq!(alert.attacker_x, Some(fixed(90)));
            }
            other => panic!("unexpected event {other:?}"),
        }

        m.tick += ALERT_COOLDOWN_TICKS;
        raise_attack_alert(&mut m, EntityRef::Unit(victim), Some(pos(31, 30)));
        let alerts = m.outbox.drain();
        assert_eq!(alerts.len(), 1);
        match &alerts[0].event {
            GameEvent::AttackAlert(alert) => assert_eq!(alert.attacker_x, None),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_dead_monk_drops_relic() {
        let mut m = create_test_match(2);
        let monk = place_unit(&mut m, 0, UnitType::Monk, pos(45, 45));
        let relic = place_relic(&mut m, pos(45, 45));
        m.relic_mut(relic).unwrap().holder = RelicHolder::Carried(monk);
        m.unit_mut(monk).unwrap().relic = Some(relic);
        m.unit_mut(monk).unwrap().hp = Fixed::ZERO;
        remove_dead(&mut m);

        assert!(m.unit(monk).is_none());
        assert!(m.relic(relic).unwrap().is_free());
    }

    #[test]
    fn test_landmark_becomes_corpse() {
        let mut m = create_test_match(2);
        let tc = m.players[0].starting_town_center.unwrap();
        let house = place_building(&mut m, Some(0), BuildingType::House, pos(40, 40));
        m.building_mut(tc).unwrap().hp = fixed(-5);
        m.building_mut(house).unwrap().hp = Fixed::ZERO;
        remove_dead(&mut m);

        let corpse = m.building(tc).unwrap();
        assert!(corpse.landmark_destroyed);
        assert_eq!(corpse.hp, Fixed::ZERO);
        assert!(m.building(house).is_none());
        assert_eq!(m.outbox.events()[0].event.name(), "landmarkDestroyed");
        assert!(!is_attackable(&m, Some(1), EntityRef::Building(tc)));
    }

    #[test]
    fn test_move_order_suppresses_attacks() {
        let mut m = create_test_match(2);
        let attacker = place_unit(&mut m, 0, UnitType::Spearman, pos(50, 50));
        place_unit(&mut m, 1, UnitType::Spearman, pos(50, 50) + Vec2Fixed::new(fixed_ratio(6, 10), Fixed::ZERO));
        m.unit_mut(attacker).unwrap().order = Some(Order::Move {
            target: pos(60, 60),
            formation: None,
        });
        tick_combat(&mut m);
        assert_eq!(m.unit(attacker).unwrap().attack_target, None);
        assert_eq!(m.unit(attacker).unwrap().attack_cooldown, Fixed::ZERO);
    }
}
