//! Building weapons.
//!
//! A building may carry several weapons at once, each with its own cooldown
//! slot: the intrinsic attack from content, researched emplacements, landmark
//! arrowslits and garrison fire. Direct shots land at once; splash weapons
//! queue a [`PendingImpact`].

use tracing::trace;

use crate::buildings::center;
use crate::combat::{
    apply_damage, is_attackable, raise_attack_alert, retaliate, travel_ticks, ImpactEffect, PendingImpact,
    ProjectileEvent, ProjectileKind, SplashImpact,
};
use crate::data::{bonus_index, ContentTables, DamageBonus, SplashTier};
use crate::entities::{AttackProfileId, Building, EntityRef};
use crate::kinds::{BuildingType, TechId};
use crate::math::{fixed_int, fixed_ratio, Fixed, Vec2Fixed};
use crate::state::{Match, DT};
use crate::stats::{bonus_damage, landmark_tier, ranged_resistance, target_class};
use crate::targeting::{can_player_see, target_distance};

/// One weapon of a building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackProfile {
    pub id: AttackProfileId,
    pub range: Fixed,
    pub min_range: Fixed,
    pub cooldown: Fixed,
    pub damage: Fixed,
    /// Shots per volley before garrison fire.
    pub volley: u32,
    /// Garrisoned units add a shot each.
    pub uses_garrison: bool,
    pub projectile: ProjectileKind,
    pub bonus: Vec<DamageBonus>,
    pub splash_radius: Option<Fixed>,
    pub splash_falloff: Vec<SplashTier>,
    /// Targets must be visible to the owner.
    pub requires_vision: bool,
    /// Siege damage skips ranged resistance and technology bonuses.
    pub siege: bool,
}

impl AttackProfile {
    fn arrows(id: AttackProfileId, range: Fixed, cooldown: Fixed, damage: Fixed, volley: u32, uses_garrison: bool) -> Self {
        Self {
            id,
            range,
            min_range: Fixed::ZERO,
            cooldown,
            damage,
            volley,
            uses_garrison,
            projectile: ProjectileKind::Arrow,
            bonus: Vec::new(),
            splash_radius: None,
            splash_falloff: Vec::new(),
            requires_vision: false,
            siege: false,
        }
    }

    fn springald(damage: Fixed) -> Self {
        Self {
            projectile: ProjectileKind::Springald,
            ..Self::arrows(AttackProfileId::Springald, fixed_int(9), fixed_int(4), damage, 1, false)
        }
    }

    /// Check if automatic targeting considers buildings.
    #[must_use]
    pub fn targets_buildings(&self) -> bool {
        self.bonus.iter().any(|b| b.target == "Building")
    }
}

/// Damage of one garrison shot.
#[must_use]
pub fn garrison_shot_damage(kind: BuildingType) -> Fixed {
    match kind {
        BuildingType::TownCenter | BuildingType::Outpost => fixed_int(6),
        BuildingType::StoneTower => fixed_int(9),
        BuildingType::Castle => fixed_int(10),
        _ => Fixed::ZERO,
    }
}

fn disruptor_falloff() -> Vec<SplashTier> {
    [(1, 2, 1, 1), (1, 1, 66, 100), (3, 2, 33, 100)]
        .into_iter()
        .map(|(rn, rd, sn, sd)| SplashTier {
            radius: fixed_ratio(rn, rd),
            scale: fixed_ratio(sn, sd),
        })
        .collect()
}

/// Every weapon a building currently has.
#[must_use]
pub fn attack_profiles(m: &Match, building: &Building) -> Vec<AttackProfile> {
    let content: &ContentTables = m.content();
    let attack = content.building(building.kind).attack.as_ref();
    let has = |tech: TechId| building.techs.contains(&tech);
    let mut profiles = Vec::new();

    if let Some(attack) = attack.filter(|a| building.kind != BuildingType::DisruptorCannon && a.range > Fixed::ZERO) {
        let volley = attack.volley.unwrap_or(0);
        if attack.damage > Fixed::ZERO || volley > 0 {
            let cooldown = if attack.cooldown > Fixed::ZERO { attack.cooldown } else { Fixed::ONE };
            profiles.push(AttackProfile::arrows(
                AttackProfileId::Base,
                attack.range,
                cooldown,
                attack.damage,
                volley,
                true,
            ));
        }
    }

    match building.kind {
        BuildingType::Outpost => {
            if has(TechId::Arrowslits) {
                profiles.push(AttackProfile::arrows(
                    AttackProfileId::Arrowslits,
                    fixed_int(7),
                    fixed_int(2),
                    fixed_int(10),
                    1,
                    true,
                ));
            }
            if has(TechId::SpringaldEmplacement) {
                profiles.push(AttackProfile::springald(fixed_int(40)));
            }
        }
        BuildingType::Castle if has(TechId::SpringaldEmplacement) => {
            profiles.push(AttackProfile::springald(fixed_int(40)));
        }
        BuildingType::DominionSpire => {
            if has(TechId::SpringaldEmplacement) {
                profiles.push(AttackProfile::springald(fixed_int(40)));
            }
            let spire = &content.landmark_bonuses.spire;
            let index = bonus_index(landmark_tier(m, building).unwrap_or(1));
            let volley = spire.arrowslits_by_age.get(index).copied().unwrap_or(2);
            let damage = spire
                .arrowslit_damage_by_age
                .get(index)
                .copied()
                .unwrap_or(fixed_int(10));
            profiles.push(AttackProfile::arrows(
                AttackProfileId::SpireArrowslits,
                fixed_int(8),
                fixed_ratio(1, 2),
                damage,
                volley,
                false,
            ));
            profiles.push(AttackProfile::arrows(
                AttackProfileId::SpireGarrison,
                fixed_int(8),
                fixed_int(2),
                fixed_int(8),
                0,
                true,
            ));
        }
        BuildingType::StoneTower => {
            profiles.push(AttackProfile::arrows(
                AttackProfileId::GarrisonArrows,
                fixed_int(7),
                fixed_int(2),
                Fixed::ZERO,
                0,
                true,
            ));
            profiles.push(AttackProfile::springald(fixed_int(60)));
        }
        BuildingType::DisruptorCannon => {
            let cooldown = attack.map_or(fixed_int(10), |a| a.cooldown);
            profiles.push(AttackProfile {
                id: AttackProfileId::Disruptor,
                range: attack.map_or(fixed_int(30), |a| a.range),
                min_range: attack.map_or(fixed_int(5), |a| a.min_range),
                cooldown: if cooldown > Fixed::ZERO { cooldown } else { fixed_int(10) },
                damage: attack.map_or(fixed_int(100), |a| a.damage),
                volley: 1,
                uses_garrison: false,
                projectile: ProjectileKind::Disruptor,
                bonus: vec![DamageBonus {
                    target: "Building".to_string(),
                    damage: fixed_int(500),
                }],
                splash_radius: Some(attack.and_then(|a| a.splash_radius).unwrap_or(fixed_ratio(3, 2))),
                splash_falloff: attack
                    .map(|a| a.splash_falloff.clone())
                    .filter(|f| !f.is_empty())
                    .unwrap_or_else(disruptor_falloff),
                requires_vision: true,
                siege: true,
            });
        }
        _ => {}
    }
    profiles
}

/// Forced target of a building, if it is still a legal and visible enemy.
fn forced_target(m: &Match, building: &Building) -> Option<EntityRef> {
    let target = building.attack_target?;
    let owner = building.owner?;
    (is_attackable(m, Some(owner), target) && can_player_see(m, owner, target)).then_some(target)
}

/// Nearest target of one weapon.
fn pick_target(
    m: &Match,
    building: &Building,
    profile: &AttackProfile,
    observer: Vec2Fixed,
    forced: Option<EntityRef>,
) -> Option<EntityRef> {
    let owner = building.owner?;
    let in_reach = |target: EntityRef| {
        target_distance(m, observer, target).filter(|d| *d <= profile.range && *d >= profile.min_range)
    };
    let visible = |target: EntityRef| !profile.requires_vision || can_player_see(m, owner, target);

    if let Some(target) = forced.filter(|t| visible(*t) && in_reach(*t).is_some()) {
        return Some(target);
    }
    let nearest_unit = m
        .units
        .iter()
        .map(|u| EntityRef::Unit(u.id))
        .filter(|t| is_attackable(m, Some(owner), *t) && visible(*t))
        .filter_map(|t| in_reach(t).map(|d| (d, t)))
        .min_by_key(|(d, t)| (*d, t.id()));
    if let Some((_, target)) = nearest_unit {
        return Some(target);
    }
    if !profile.targets_buildings() {
        return None;
    }
    m.buildings
        .iter()
        .map(|b| EntityRef::Building(b.id))
        .filter(|t| is_attackable(m, Some(owner), *t) && visible(*t))
        .filter_map(|t| in_reach(t).map(|d| (d, t)))
        .min_by_key(|(d, t)| (*d, t.id()))
        .map(|(_, t)| t)
}

fn ranged_tech_bonus(m: &Match, building: &Building, profile: &AttackProfile) -> Fixed {
    if profile.siege {
        return Fixed::ZERO;
    }
    building
        .owner
        .and_then(|o| m.player(o))
        .map_or(Fixed::ZERO, |p| Fixed::from_num(p.count_techs(&TechId::RANGED_DAMAGE)))
}

/// Fire one weapon of the building at `index`. Returns `true` if it fired.
fn fire_profile(m: &mut Match, index: usize, profile: &AttackProfile, forced: Option<EntityRef>) -> bool {
    let content = m.content_arc();
    let building = &m.buildings[index];
    let observer = center(&content, building);
    let Some(target) = pick_target(m, building, profile, observer, forced) else {
        return false;
    };
    let garrison = if profile.uses_garrison {
        u32::try_from(building.garrison.len()).unwrap_or(u32::MAX)
    } else {
        0
    };
    let volley = if profile.volley == 0 && profile.damage > Fixed::ZERO {
        1
    } else {
        profile.volley
    };
    let shots = volley.saturating_add(garrison);
    if shots == 0 {
        return false;
    }
    let tech = ranged_tech_bonus(m, building, profile);
    let extra = garrison_shot_damage(building.kind);
    let (id, owner) = (building.id, building.owner);
    let shot_damage = |shot: u32| {
        if shot < volley {
            profile.damage + tech
        } else {
            extra + tech
        }
    };

    if let Some(radius) = profile.splash_radius {
        let Some(to) = crate::targeting::entity_center(m, target) else {
            return false;
        };
        let hit_tick = m.tick + travel_ticks(observer, to);
        for shot in 0..shots {
            let damage = shot_damage(shot);
            if damage <= Fixed::ZERO {
                continue;
            }
            m.pending_impacts.push(PendingImpact {
                hit_tick,
                attacker: EntityRef::Building(id),
                owner,
                source: observer,
                effect: ImpactEffect::Splash(SplashImpact {
                    center: to,
                    damage,
                    bonus: profile.bonus.clone(),
                    radius,
                    falloff: profile.splash_falloff.clone(),
                    siege: profile.siege,
                    hits_buildings: profile.targets_buildings() || target.is_building(),
                }),
            });
            m.projectiles.push(ProjectileEvent {
                from: observer,
                to,
                kind: profile.projectile,
            });
        }
        return true;
    }

    let resistance = if !target.is_building() && !profile.siege {
        ranged_resistance(m, target)
    } else {
        Fixed::ZERO
    };
    let bonus = bonus_damage(&profile.bonus, target_class(m, target));
    for shot in 0..shots {
        if m.health_of(target).map_or(true, |(hp, _)| hp <= Fixed::ZERO) {
            break;
        }
        let damage = (shot_damage(shot) + bonus) * (Fixed::ONE - resistance);
        apply_damage(m, target, damage);
        raise_attack_alert(m, target, Some(observer));
        let to = crate::targeting::entity_center(m, target).unwrap_or(observer);
        m.projectiles.push(ProjectileEvent {
            from: observer,
            to,
            kind: profile.projectile,
        });
    }
    retaliate(m, target, EntityRef::Building(id));
    true
}

/// Building attack step of the combat phase.
pub fn process_building_attacks(m: &mut Match) {
    let content = m.content_arc();
    for index in 0..m.buildings.len() {
        let building = &m.buildings[index];
        let data = content.building(building.kind);
        if building.hp <= Fixed::ZERO
            || building.owner.is_none()
            || data.is_neutral
            || data.is_invulnerable
            || building.landmark_destroyed
            || (building.under_construction && content.is_defensive(building.kind))
        {
            continue;
        }
        let profiles = attack_profiles(m, building);
        if profiles.is_empty() {
            continue;
        }
        let forced = forced_target(m, building);
        if forced.is_none() {
            m.buildings[index].attack_target = None;
        }

        for profile in &profiles {
            if profile.range <= Fixed::ZERO {
                continue;
            }
            let slot = m.buildings[index].attack_cooldowns.entry(profile.id).or_insert(Fixed::ZERO);
            *slot = (*slot - DT).max(Fixed::ZERO);
            if *slot > Fixed::ZERO {
                continue;
            }
            if fire_profile(m, index, profile, forced) {
                trace!(building = m.buildings[index].id, profile = ?profile.id, "building fired");
                m.buildings[index]
                    .attack_cooldowns
                    .insert(profile.id, profile.cooldown);
            }
        }
    }
}
