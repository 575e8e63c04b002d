//! Match and player state.
//!
//! [`Match`] owns every entity collection of one game. Collections are
//! `Vec`s in insertion order so iteration is deterministic; entities are
//! looked up by id at the moment they are needed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::combat::{AlertKey, PendingImpact, ProjectileEvent};
use crate::data::ContentTables;
use crate::economy::Stockpile;
use crate::elimination::{EliminationReason, MatchOutcome};
use crate::entities::{Building, EntityId, EntityRef, PlayerIndex, Relic, ResourceNode, Unit};
use crate::events::Outbox;
use crate::kinds::{BuildingType, TechId};
use crate::math::{fixed_ratio, Fixed, Vec2Fixed};
use crate::pathfinding::NavGrid;

/// Ticks per second for the simulation.
pub const TICK_RATE: u64 = 20;

/// Duration of one tick in milliseconds.
pub const TICK_DURATION_MS: u64 = 1000 / TICK_RATE;

/// Duration of one tick in seconds.
pub const DT: Fixed = fixed_ratio(1, TICK_RATE as i64);

/// Starting stockpile of every player.
pub const STARTING_RESOURCES: Stockpile = Stockpile::new(200, 200, 0, 0);

/// Highest age tier.
pub const MAX_AGE_TIER: u8 = 4;

/// A player slot in a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Stable slot index.
    pub index: PlayerIndex,
    /// Team id; players on the same team are allied.
    pub team: u8,
    /// Colour hex string.
    pub color: String,
    /// Resource stockpile.
    pub resources: Stockpile,
    /// Researched player-scoped technologies.
    pub techs: BTreeSet<TechId>,
    /// Age tier, never decreasing.
    pub age_tier: u8,
    /// Landmarks this player may build to age up.
    pub landmark_choices: Vec<BuildingType>,
    /// Age tier reached by each completed landmark.
    pub landmark_built_ages: BTreeMap<BuildingType, u8>,
    /// Out of the match.
    pub eliminated: bool,
    /// Why the player left the match.
    pub elimination_reason: Option<EliminationReason>,
    /// Town Centre placed at match start.
    pub starting_town_center: Option<EntityId>,
    /// A live connection controls this slot.
    pub connected: bool,
}

impl Player {
    /// Create a player with the starting stockpile.
    #[must_use]
    pub fn new(index: PlayerIndex, team: u8, color: impl Into<String>) -> Self {
        Self {
            index,
            team,
            color: color.into(),
            resources: STARTING_RESOURCES,
            techs: BTreeSet::new(),
            age_tier: 0,
            landmark_choices: Vec::new(),
            landmark_built_ages: BTreeMap::new(),
            eliminated: false,
            elimination_reason: None,
            starting_town_center: None,
            connected: true,
        }
    }

    /// Check if a player-scoped technology is researched.
    #[must_use]
    pub fn has_tech(&self, tech: TechId) -> bool {
        self.techs.contains(&tech)
    }

    /// Count how many of `techs` are researched.
    #[must_use]
    pub fn count_techs(&self, techs: &[TechId]) -> usize {
        techs.iter().filter(|t| self.has_tech(**t)).count()
    }

    /// Raise the age tier. Lower tiers are ignored.
    pub fn advance_age(&mut self, tier: u8) {
        self.age_tier = self.age_tier.max(tier.min(MAX_AGE_TIER));
    }
}

/// Per-match switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchFlags {
    /// Single-player sandbox.
    pub singleplayer: bool,
    /// Cheat commands accepted.
    pub allow_cheats: bool,
    /// Player slot of the host.
    pub host: Option<PlayerIndex>,
    /// Everything is visible to everyone.
    pub fog_reveal: bool,
    /// Construction and production are near-instant.
    pub fast_build: bool,
    /// Ticks an attack alert stays quiet, when not the built-in three seconds.
    pub alert_cooldown_ticks: Option<u64>,
}

/// Authoritative state of one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    /// Match id.
    pub id: u64,
    /// Ticks simulated so far.
    pub tick: u64,
    #[serde(skip)]
    content: Arc<ContentTables>,
    /// Player slots, by index.
    pub players: Vec<Player>,
    /// Living units.
    pub units: Vec<Unit>,
    /// Buildings, including landmark corpses.
    pub buildings: Vec<Building>,
    /// Resource nodes.
    pub resources: Vec<ResourceNode>,
    /// Relics.
    pub relics: Vec<Relic>,
    /// Projectiles fired this tick, for clients to animate.
    pub projectiles: Vec<ProjectileEvent>,
    /// Shots in flight.
    pub pending_impacts: Vec<PendingImpact>,
    /// Tick each attack alert stays quiet until.
    pub alert_cooldowns: BTreeMap<AlertKey, u64>,
    /// Switches.
    pub flags: MatchFlags,
    /// Teams present at match start.
    pub initial_teams: BTreeSet<u8>,
    /// Building occupancy grid, rebuilt every tick.
    #[serde(skip)]
    pub nav: NavGrid,
    next_entity_id: EntityId,
    next_formation_id: u64,
    /// Events waiting for the transport.
    #[serde(skip)]
    pub outbox: Outbox,
    /// Set once the match is decided.
    pub outcome: Option<MatchOutcome>,
}

impl Match {
    /// Create an empty match over the given content.
    #[must_use]
    pub fn new(id: u64, content: Arc<ContentTables>, flags: MatchFlags) -> Self {
        let nav = NavGrid::new(content.map.width.unsigned_abs(), content.map.height.unsigned_abs());
        Self {
            id,
            tick: 0,
            content,
            players: Vec::new(),
            units: Vec::new(),
            buildings: Vec::new(),
            resources: Vec::new(),
            relics: Vec::new(),
            projectiles: Vec::new(),
            pending_impacts: Vec::new(),
            alert_cooldowns: BTreeMap::new(),
            flags,
            initial_teams: BTreeSet::new(),
            nav,
            next_entity_id: 1,
            next_formation_id: 1,
            outbox: Outbox::default(),
            outcome: None,
        }
    }

    /// Content tables.
    #[must_use]
    pub fn content(&self) -> &ContentTables {
        &self.content
    }

    /// Shared handle to the content tables, for use while mutating the match.
    #[must_use]
    pub fn content_arc(&self) -> Arc<ContentTables> {
        Arc::clone(&self.content)
    }

    /// Allocate a fresh entity id.
    pub fn allocate_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    /// Allocate a fresh formation id.
    pub fn allocate_formation_id(&mut self) -> u64 {
        let id = self.next_formation_id;
        self.next_formation_id += 1;
        id
    }

    /// Simulated seconds since match start.
    #[must_use]
    pub fn seconds(&self) -> Fixed {
        ticks_to_seconds(self.tick)
    }

    /// Map width.
    #[must_use]
    pub fn width(&self) -> Fixed {
        self.content.map_width()
    }

    /// Map height.
    #[must_use]
    pub fn height(&self) -> Fixed {
        self.content.map_height()
    }

    /// Clamp a point onto the map, keeping `margin` from the far edges.
    #[must_use]
    pub fn clamp_to_map(&self, point: Vec2Fixed, margin: Fixed) -> Vec2Fixed {
        Vec2Fixed::new(
            point.x.clamp(Fixed::ZERO, self.width() - margin),
            point.y.clamp(Fixed::ZERO, self.height() - margin),
        )
    }

    /// Player slot.
    #[must_use]
    pub fn player(&self, index: PlayerIndex) -> Option<&Player> {
        self.players.get(usize::from(index))
    }

    /// Mutable player slot.
    pub fn player_mut(&mut self, index: PlayerIndex) -> Option<&mut Player> {
        self.players.get_mut(usize::from(index))
    }

    /// Unit by id.
    #[must_use]
    pub fn unit(&self, id: EntityId) -> Option<&Unit> {
        self.units.iter().find(|u| u.id == id)
    }

    /// Mutable unit by id.
    pub fn unit_mut(&mut self, id: EntityId) -> Option<&mut Unit> {
        self.units.iter_mut().find(|u| u.id == id)
    }

    /// Building by id.
    #[must_use]
    pub fn building(&self, id: EntityId) -> Option<&Building> {
        self.buildings.iter().find(|b| b.id == id)
    }

    /// Mutable building by id.
    pub fn building_mut(&mut self, id: EntityId) -> Option<&mut Building> {
        self.buildings.iter_mut().find(|b| b.id == id)
    }

    /// Resource node by id.
    #[must_use]
    pub fn resource(&self, id: EntityId) -> Option<&ResourceNode> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Relic by id.
    #[must_use]
    pub fn relic(&self, id: EntityId) -> Option<&Relic> {
        self.relics.iter().find(|r| r.id == id)
    }

    /// Mutable relic by id.
    pub fn relic_mut(&mut self, id: EntityId) -> Option<&mut Relic> {
        self.relics.iter_mut().find(|r| r.id == id)
    }

    /// Resolve a numeric id against units first, then buildings.
    #[must_use]
    pub fn resolve(&self, id: EntityId) -> Option<EntityRef> {
        if self.unit(id).is_some() {
            Some(EntityRef::Unit(id))
        } else if self.building(id).is_some() {
            Some(EntityRef::Building(id))
        } else {
            None
        }
    }

    /// Owner of a unit or building.
    #[must_use]
    pub fn owner_of(&self, target: EntityRef) -> Option<PlayerIndex> {
        match target {
            EntityRef::Unit(id) => self.unit(id).map(|u| u.owner),
            EntityRef::Building(id) => self.building(id).and_then(|b| b.owner),
        }
    }

    /// Current and maximum health of a unit or building.
    #[must_use]
    pub fn health_of(&self, target: EntityRef) -> Option<(Fixed, Fixed)> {
        match target {
            EntityRef::Unit(id) => self.unit(id).map(|u| (u.hp, u.max_hp)),
            EntityRef::Building(id) => self.building(id).map(|b| (b.hp, b.max_hp)),
        }
    }

    /// Team of a player index. Indices without a slot form their own team.
    #[must_use]
    pub fn team_of(&self, index: PlayerIndex) -> u8 {
        self.player(index).map_or(index.saturating_add(1), |p| p.team)
    }

    /// Check if two owners are on the same side.
    #[must_use]
    pub fn are_allied(&self, a: Option<PlayerIndex>, b: Option<PlayerIndex>) -> bool {
        let (Some(a), Some(b)) = (a, b) else {
            return false;
        };
        if a == b {
            return true;
        }
        match (self.player(a), self.player(b)) {
            (Some(pa), Some(pb)) => pa.team == pb.team,
            _ => false,
        }
    }

    /// Check if `other` is hostile to `player`.
    #[must_use]
    pub fn is_enemy(&self, other: Option<PlayerIndex>, player: Option<PlayerIndex>) -> bool {
        other.is_some() && player.is_some() && !self.are_allied(other, player)
    }

    /// Check if the match has been decided.
    #[must_use]
    pub fn is_over(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Convert a tick count to seconds.
#[must_use]
pub fn ticks_to_seconds(ticks: u64) -> Fixed {
    Fixed::from_num(ticks) / Fixed::from_num(TICK_RATE)
}

/// Ticks needed to cover `seconds`, rounded up.
#[must_use]
pub fn seconds_to_ticks(seconds: Fixed) -> u64 {
    let ticks = (seconds * Fixed::from_num(TICK_RATE)).ceil();
    ticks.max(Fixed::ZERO).to_num::<u64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_match() -> Match {
        let content = Arc::new(ContentTables::standard().unwrap());
        let mut m = Match::new(1, content, MatchFlags::default());
        m.players.push(Player::new(0, 1, "#2c7be5"));
        m.players.push(Player::new(1, 2, "#e25555"));
        m.players.push(Player::new(2, 1, "#f1c40f"));
        m
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut m = create_test_match();
        let a = m.allocate_id();
        let b = m.allocate_id();
        assert!(b > a);
    }

    #[test]
    fn test_alliance_rules() {
        let m = create_test_match();
        assert!(m.are_allied(Some(0), Some(0)));
        assert!(m.are_allied(Some(0), Some(2)));
        assert!(!m.are_allied(Some(0), Some(1)));
        assert!(!m.are_allied(None, Some(0)));
        assert!(m.is_enemy(Some(1), Some(0)));
        assert!(!m.is_enemy(None, Some(0)));
        // Slot 7 has no player: hostile to everyone, but allied with itself.
        assert!(m.is_enemy(Some(7), Some(0)));
        assert!(m.are_allied(Some(7), Some(7)));
        assert_eq!(m.team_of(7), 8);
    }

    #[test]
    fn test_age_never_decreases() {
        let mut player = Player::new(0, 1, "#2c7be5");
        player.advance_age(2);
        player.advance_age(1);
        assert_eq!(player.age_tier, 2);
        player.advance_age(9);
        assert_eq!(player.age_tier, MAX_AGE_TIER);
    }

    #[test]
    fn test_tick_conversions() {
        assert_eq!(ticks_to_seconds(40), Fixed::from_num(2));
        assert_eq!(seconds_to_ticks(Fixed::from_num(8) / 12), 14);
        assert_eq!(seconds_to_ticks(Fixed::ONE), 20);
    }
}
