//! Match builders shared by the unit tests of this crate.

use std::sync::Arc;

use crate::data::ContentTables;
use crate::entities::{EntityId, PlayerIndex};
use crate::kinds::{BuildingType, ResourceNodeType, UnitType};
use crate::math::Vec2Fixed;
use crate::setup::town_center_positions;
use crate::spawn::{spawn_building, spawn_relic, spawn_resource, spawn_unit};
use crate::state::{Match, MatchFlags, Player};

/// Match with `players` players on teams 1.. and a starting Town Centre
/// each. No villagers, resources or relics.
pub(crate) fn create_test_match(players: usize) -> Match {
    create_test_match_with(players, ContentTables::standard().expect("standard content"))
}

/// Like [`create_test_match`], over edited content tables.
pub(crate) fn create_test_match_with(players: usize, content: ContentTables) -> Match {
    let content = Arc::new(content);
    let positions = town_center_positions(&content, players);
    let mut m = Match::new(1, content, MatchFlags::default());
    for (index, position) in positions.into_iter().enumerate() {
        let index = index as PlayerIndex;
        m.players.push(Player::new(index, index + 1, "#2c7be5"));
        m.initial_teams.insert(index + 1);
        let tc = spawn_building(&mut m, Some(index), BuildingType::TownCenter, position);
        if let Some(b) = m.building_mut(tc) {
            b.starting_town_center = true;
        }
        m.players[usize::from(index)].starting_town_center = Some(tc);
    }
    m.nav.rebuild(&m.content_arc(), &m.buildings);
    m
}

pub(crate) fn place_unit(m: &mut Match, owner: PlayerIndex, kind: UnitType, position: Vec2Fixed) -> EntityId {
    spawn_unit(m, owner, kind, position)
}

pub(crate) fn place_building(
    m: &mut Match,
    owner: Option<PlayerIndex>,
    kind: BuildingType,
    position: Vec2Fixed,
) -> EntityId {
    spawn_building(m, owner, kind, position)
}

pub(crate) fn place_resource(m: &mut Match, node_type: ResourceNodeType, position: Vec2Fixed) -> EntityId {
    spawn_resource(m, node_type, position)
}

pub(crate) fn place_relic(m: &mut Match, position: Vec2Fixed) -> EntityId {
    spawn_relic(m, position)
}
