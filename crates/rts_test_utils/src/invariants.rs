//! Invariant checkers run between ticks.
//!
//! Each checker returns every violation it finds instead of stopping at the
//! first, so a failing property test reports the whole picture.

use std::collections::BTreeMap;
use std::fmt;

use rts_core::economy::Stockpile;
use rts_core::entities::{EntityId, PlayerIndex};
use rts_core::kinds::UnitType;
use rts_core::math::Fixed;
use rts_core::state::Match;
use rts_core::stats::{population_cap, population_used};

/// A broken invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// More population in use than the cap allows.
    PopulationOverCap {
        /// Player slot.
        player: PlayerIndex,
        /// Population in use.
        used: u32,
        /// Population cap.
        cap: u32,
    },
    /// A resource went below zero.
    NegativeResource {
        /// Player slot.
        player: PlayerIndex,
        /// Resource name.
        kind: &'static str,
    },
    /// A carried relic's carrier is missing, not a monk, or does not hold it.
    RelicCarrier {
        /// Relic id.
        relic: EntityId,
    },
    /// A stored relic's building is missing or does not list it.
    RelicStorage {
        /// Relic id.
        relic: EntityId,
    },
    /// A unit or building claims a relic that is not held by it.
    RelicClaim {
        /// Claiming entity id.
        holder: EntityId,
        /// Relic id.
        relic: EntityId,
    },
    /// A unit still in the match with no health left.
    DeadUnit {
        /// Unit id.
        unit: EntityId,
    },
    /// Health above maximum, or construction progress past its total.
    BuildingHealth {
        /// Building id.
        building: EntityId,
    },
    /// Health of a building under construction went down without damage, or
    /// a finished building was not at full health when it completed.
    ConstructionProgress {
        /// Building id.
        building: EntityId,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::PopulationOverCap { player, used, cap } => {
                write!(f, "player {player} uses {used} population with cap {cap}")
            }
            Violation::NegativeResource { player, kind } => write!(f, "player {player} has negative {kind}"),
            Violation::RelicCarrier { relic } => write!(f, "relic {relic} has a bad carrier"),
            Violation::RelicStorage { relic } => write!(f, "relic {relic} has a bad store"),
            Violation::RelicClaim { holder, relic } => write!(f, "entity {holder} claims relic {relic}"),
            Violation::DeadUnit { unit } => write!(f, "unit {unit} is dead but present"),
            Violation::BuildingHealth { building } => write!(f, "building {building} has inconsistent health"),
            Violation::ConstructionProgress { building } => {
                write!(f, "building {building} lost construction health")
            }
        }
    }
}

fn negative_kinds(stock: &Stockpile) -> impl Iterator<Item = &'static str> {
    [
        ("food", stock.food),
        ("wood", stock.wood),
        ("gold", stock.gold),
        ("stone", stock.stone),
    ]
    .into_iter()
    .filter(|(_, amount)| *amount < Fixed::ZERO)
    .map(|(kind, _)| kind)
}

/// Resources are never negative.
#[must_use]
pub fn check_resources(m: &Match) -> Vec<Violation> {
    m.players
        .iter()
        .flat_map(|p| negative_kinds(&p.resources).map(|kind| Violation::NegativeResource { player: p.index, kind }))
        .collect()
}

/// Population in use stays within the cap.
///
/// Only meaningful while no houses are lost, since losing one lowers the cap
/// under units that already exist.
#[must_use]
pub fn check_population(m: &Match) -> Vec<Violation> {
    m.players
        .iter()
        .filter(|p| !p.eliminated)
        .filter_map(|p| {
            let used = population_used(m, p.index);
            let cap = population_cap(m, p.index);
            (used > cap).then_some(Violation::PopulationOverCap {
                player: p.index,
                used,
                cap,
            })
        })
        .collect()
}

/// Every relic is in exactly one place, and that place agrees.
#[must_use]
pub fn check_relics(m: &Match) -> Vec<Violation> {
    let mut found = Vec::new();
    for relic in &m.relics {
        if let Some(carrier) = relic.carrier() {
            let ok = m
                .unit(carrier)
                .is_some_and(|u| u.kind == UnitType::Monk && u.is_alive() && u.relic == Some(relic.id));
            if !ok {
                found.push(Violation::RelicCarrier { relic: relic.id });
            }
        }
        if let Some(store) = relic.stored_in() {
            let ok = m.building(store).is_some_and(|b| b.relics.contains(&relic.id));
            if !ok {
                found.push(Violation::RelicStorage { relic: relic.id });
            }
        }
    }
    for unit in &m.units {
        if let Some(relic) = unit.relic {
            if m.relic(relic).and_then(|r| r.carrier()) != Some(unit.id) {
                found.push(Violation::RelicClaim { holder: unit.id, relic });
            }
        }
    }
    for building in &m.buildings {
        for relic in &building.relics {
            if m.relic(*relic).and_then(|r| r.stored_in()) != Some(building.id) {
                found.push(Violation::RelicClaim {
                    holder: building.id,
                    relic: *relic,
                });
            }
        }
    }
    found
}

/// Units alive, buildings within their health and construction bounds.
#[must_use]
pub fn check_entities(m: &Match) -> Vec<Violation> {
    let dead = m
        .units
        .iter()
        .filter(|u| !u.is_alive())
        .map(|u| Violation::DeadUnit { unit: u.id });
    let buildings = m
        .buildings
        .iter()
        .filter(|b| b.hp > b.max_hp || (b.under_construction && b.build_progress > b.build_time))
        .map(|b| Violation::BuildingHealth { building: b.id });
    dead.chain(buildings).collect()
}

/// Every check that holds at all times.
#[must_use]
pub fn check_all(m: &Match) -> Vec<Violation> {
    let mut found = check_resources(m);
    found.extend(check_relics(m));
    found.extend(check_entities(m));
    found
}

/// Assert [`check_all`] finds nothing.
///
/// # Panics
///
/// Panics with every violation found.
pub fn assert_invariants(m: &Match) {
    let found = check_all(m);
    if !found.is_empty() {
        let lines: Vec<String> = found.iter().map(ToString::to_string).collect();
        panic!("tick {}: invariants broken:\n{}", m.tick, lines.join("\n"));
    }
}

/// Watches buildings under construction across ticks.
///
/// Health under construction must not fall while nothing attacks it, and a
/// building must be at full health on the tick it completes.
#[derive(Debug, Default)]
pub struct ConstructionWatch {
    last: BTreeMap<EntityId, Fixed>,
}

impl ConstructionWatch {
    /// Start watching.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare against the previous observation and record this one.
    pub fn observe(&mut self, m: &Match) -> Vec<Violation> {
        let mut found = Vec::new();
        let mut next = BTreeMap::new();
        for b in &m.buildings {
            let previous = self.last.get(&b.id).copied();
            if b.under_construction {
                if previous.is_some_and(|hp| b.hp < hp) {
                    found.push(Violation::ConstructionProgress { building: b.id });
                }
                next.insert(b.id, b.hp);
            } else if previous.is_some() && b.hp != b.max_hp {
                found.push(Violation::ConstructionProgress { building: b.id });
            }
        }
        self.last = next;
        found
    }
}
