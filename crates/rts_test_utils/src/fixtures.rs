//! Test fixtures and helpers.
//!
//! Pre-built matches and entity placement helpers for consistent testing.

use std::sync::Arc;

use fixed::types::I32F32;
use rts_core::commands::{Command, CommandOutcome};
use rts_core::data::ContentTables;
use rts_core::dispatch::dispatch;
use rts_core::elimination::MatchOutcome;
use rts_core::entities::{EntityId, PlayerIndex};
use rts_core::kinds::{BuildingType, ResourceNodeType, UnitType};
use rts_core::math::Vec2Fixed;
use rts_core::setup::{create_match, town_center_positions, MatchSetup};
use rts_core::simulation::tick;
use rts_core::spawn::{spawn_building, spawn_relic, spawn_resource, spawn_unit};
use rts_core::state::{Match, MatchFlags, Player, TICK_RATE};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Whole-tile position.
#[must_use]
pub fn pos(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::new(fixed(x), fixed(y))
}

/// The bundled content tables.
///
/// # Panics
///
/// Panics if the bundled RON does not parse.
#[must_use]
pub fn standard_content() -> Arc<ContentTables> {
    Arc::new(ContentTables::standard().expect("bundled content parses"))
}

/// A fully generated match: resources, relics, trade posts and starting
/// units, exactly as the server creates one.
///
/// # Panics
///
/// Panics if `players` is not 1 to 4.
#[must_use]
pub fn generated_match(players: usize, seed: u64) -> Match {
    create_match(standard_content(), &MatchSetup::new(1, players, seed)).expect("valid player count")
}

/// A match with only a starting Town Centre per player on teams 1.. and no
/// map features. Scenarios place what they need.
#[must_use]
pub fn bare_match(players: usize) -> Match {
    bare_match_with_flags(players, MatchFlags::default())
}

/// [`bare_match`] with switches.
#[must_use]
pub fn bare_match_with_flags(players: usize, flags: MatchFlags) -> Match {
    let content = standard_content();
    let positions = town_center_positions(&content, players);
    let mut m = Match::new(1, Arc::clone(&content), flags);
    for (slot, position) in positions.into_iter().enumerate() {
        let Ok(index) = PlayerIndex::try_from(slot) else {
            break;
        };
        m.players.push(Player::new(index, index + 1, "#2c7be5"));
        m.initial_teams.insert(index + 1);
        let tc = spawn_building(&mut m, Some(index), BuildingType::TownCenter, position);
        if let Some(b) = m.building_mut(tc) {
            b.starting_town_center = true;
        }
        m.players[slot].starting_town_center = Some(tc);
    }
    m.nav.rebuild(&content, &m.buildings);
    m
}

/// Place a unit.
pub fn place_unit(m: &mut Match, owner: PlayerIndex, kind: UnitType, position: Vec2Fixed) -> EntityId {
    spawn_unit(m, owner, kind, position)
}

/// Place a completed building with its top-left corner at `position`.
pub fn place_building(m: &mut Match, owner: Option<PlayerIndex>, kind: BuildingType, position: Vec2Fixed) -> EntityId {
    let id = spawn_building(m, owner, kind, position);
    let content = m.content_arc();
    m.nav.rebuild(&content, &m.buildings);
    id
}

/// Place a resource node with its top-left corner at `position`.
pub fn place_resource(m: &mut Match, node_type: ResourceNodeType, position: Vec2Fixed) -> EntityId {
    spawn_resource(m, node_type, position)
}

/// Place a relic on the ground.
pub fn place_relic(m: &mut Match, position: Vec2Fixed) -> EntityId {
    spawn_relic(m, position)
}

/// Decode a JSON command the way the server does and dispatch it.
///
/// # Panics
///
/// Panics if the JSON is not a known command.
pub fn send(m: &mut Match, player: PlayerIndex, json: &str) -> CommandOutcome {
    let command: Command = serde_json::from_str(json).expect("command json parses");
    dispatch(m, player, &command)
}

/// Tick `n` times, stopping early if the match ends.
pub fn run_ticks(m: &mut Match, n: u64) -> Option<MatchOutcome> {
    for _ in 0..n {
        if let Some(outcome) = tick(m).outcome {
            return Some(outcome);
        }
    }
    None
}

/// Tick for `seconds` of simulated time.
pub fn run_seconds(m: &mut Match, seconds: u64) -> Option<MatchOutcome> {
    run_ticks(m, seconds * TICK_RATE)
}
