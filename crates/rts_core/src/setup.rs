//! Match creation: players, starting bases, resources, trade posts, relics.

use std::sync::Arc;

use tracing::info;

use crate::data::ContentTables;
use crate::error::{GameError, Result};
use crate::kinds::{BuildingType, UnitType};
use crate::map_generation::{generate_relics, generate_resources, Area, MapRng};
use crate::math::{fixed_int, fixed_ratio, Fixed, Vec2Fixed};
use crate::spawn::{spawn_building, spawn_relic, spawn_resource, spawn_unit};
use crate::state::{Match, MatchFlags, Player};

/// Most players a match can hold.
pub const MAX_PLAYERS: usize = 4;

/// Gap between the map edge and a Town Centre.
const TOWN_CENTER_MARGIN: i32 = 20;

/// Gap between the map edge and a trade post.
const TRADE_POST_MARGIN: i32 = 2;

/// Starting villagers, relative to the middle of the Town Centre's bottom edge.
const VILLAGER_OFFSETS: [(Fixed, Fixed); 6] = [
    (fixed_ratio(-3, 2), fixed_ratio(4, 5)),
    (fixed_ratio(-1, 2), fixed_ratio(4, 5)),
    (fixed_ratio(1, 2), fixed_ratio(4, 5)),
    (fixed_ratio(3, 2), fixed_ratio(4, 5)),
    (fixed_ratio(-1, 2), fixed_ratio(9, 5)),
    (fixed_ratio(1, 2), fixed_ratio(9, 5)),
];

/// The scout stands this far below the Town Centre.
const SCOUT_OFFSET: Fixed = fixed_ratio(29, 10);

/// Lobby choices for one player slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerSetup {
    /// Team id; defaults to the slot index + 1.
    pub team: Option<u8>,
    /// Colour hex; defaults to the content colour for the slot.
    pub color: Option<String>,
}

/// Everything needed to create a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSetup {
    /// Match id.
    pub id: u64,
    /// Map seed.
    pub seed: u64,
    /// One entry per player.
    pub players: Vec<PlayerSetup>,
    /// Switches.
    pub flags: MatchFlags,
}

impl MatchSetup {
    /// `count` players with default teams and colours.
    #[must_use]
    pub fn new(id: u64, count: usize, seed: u64) -> Self {
        Self {
            id,
            seed,
            players: vec![PlayerSetup::default(); count],
            flags: MatchFlags::default(),
        }
    }

    /// Single-player sandbox with the host in slot 0.
    #[must_use]
    pub fn singleplayer(id: u64, seed: u64) -> Self {
        let mut setup = Self::new(id, 1, seed);
        setup.flags.singleplayer = true;
        setup.flags.host = Some(0);
        setup
    }
}

/// Top-left tiles of the Town Centres for `count` players.
///
/// One player takes the top-left corner, two take opposite corners, three
/// add the top-right corner and four use every corner.
#[must_use]
pub fn start_corners(content: &ContentTables, count: usize) -> Vec<(i32, i32)> {
    let size = content.building(BuildingType::TownCenter).size;
    let far_x = content.map.width - TOWN_CENTER_MARGIN - size;
    let far_y = content.map.height - TOWN_CENTER_MARGIN - size;
    let near = TOWN_CENTER_MARGIN;
    let corners = [(near, near), (far_x, near), (near, far_y), (far_x, far_y)];
    let order: &[usize] = match count.clamp(1, MAX_PLAYERS) {
        1 => &[0],
        2 => &[0, 3],
        3 => &[0, 3, 1],
        _ => &[0, 1, 2, 3],
    };
    order.iter().map(|i| corners[*i]).collect()
}

/// [`start_corners`] as positions.
#[must_use]
pub fn town_center_positions(content: &ContentTables, count: usize) -> Vec<Vec2Fixed> {
    start_corners(content, count)
        .into_iter()
        .map(|(x, y)| Vec2Fixed::new(fixed_int(x), fixed_int(y)))
        .collect()
}

fn player_color(content: &ContentTables, index: usize) -> String {
    content
        .player_colors
        .get(index)
        .cloned()
        .or_else(|| content.color_options.get(index).map(|c| c.hex.clone()))
        .or_else(|| content.player_colors.first().cloned())
        .unwrap_or_default()
}

fn spawn_trade_posts(m: &mut Match) {
    let size = m.content().building(BuildingType::TradePost).size;
    let (w, h) = (m.content().map.width, m.content().map.height);
    let low = TRADE_POST_MARGIN;
    let (high_x, high_y) = (w - size - TRADE_POST_MARGIN, h - size - TRADE_POST_MARGIN);
    for (x, y) in [(low, low), (high_x, low), (low, high_y), (high_x, high_y)] {
        spawn_building(m, None, BuildingType::TradePost, Vec2Fixed::new(fixed_int(x), fixed_int(y)));
    }
}

fn spawn_starting_units(m: &mut Match, index: u8, corner: (i32, i32)) {
    let size = m.content().building(BuildingType::TownCenter).size;
    let center_x = fixed_int(corner.0) + fixed_int(size) / 2;
    let below = fixed_int(corner.1 + size);
    let margin = fixed_ratio(1, 2);
    let max_x = m.width() - margin;
    let max_y = m.height() - margin;
    let place = |dx: Fixed, dy: Fixed| {
        Vec2Fixed::new((center_x + dx).clamp(margin, max_x), (below + dy).clamp(margin, max_y))
    };
    for (dx, dy) in VILLAGER_OFFSETS {
        spawn_unit(m, index, UnitType::Villager, place(dx, dy));
    }
    spawn_unit(m, index, UnitType::Scout, place(Fixed::ZERO, SCOUT_OFFSET));
}

/// Create a match ready for its first tick.
///
/// # Errors
///
/// [`GameError::InvalidSetup`] when the player count is not 1 to
/// [`MAX_PLAYERS`].
pub fn create_match(content: Arc<ContentTables>, setup: &MatchSetup) -> Result<Match> {
    let count = setup.players.len();
    if !(1..=MAX_PLAYERS).contains(&count) {
        return Err(GameError::InvalidSetup(format!("{count} players")));
    }
    let mut rng = MapRng::new(setup.seed);
    let mut m = Match::new(setup.id, Arc::clone(&content), setup.flags);

    for (i, slot) in setup.players.iter().enumerate() {
        let index = u8::try_from(i).map_err(|_| GameError::InvalidSetup(format!("slot {i}")))?;
        let team = slot.team.unwrap_or(index + 1);
        let color = slot.color.clone().unwrap_or_else(|| player_color(&content, i));
        let mut player = Player::new(index, team, color);
        player.landmark_choices = rng.pick(&content.landmark_pool, content.landmarks_per_player);
        m.initial_teams.insert(team);
        m.players.push(player);
    }

    let corners = start_corners(&content, count);
    let resources = generate_resources(&content, &corners, &mut rng);
    let taken: Vec<Area> = resources.iter().map(|r| r.area()).collect();
    let relics = generate_relics(&content, count, &taken, &mut rng);
    for node in &resources {
        spawn_resource(&mut m, node.node_type, node.position());
    }
    for center in relics {
        spawn_relic(&mut m, center);
    }

    for (i, (x, y)) in corners.iter().enumerate() {
        let index = m.players[i].index;
        let tc = spawn_building(&mut m, Some(index), BuildingType::TownCenter, Vec2Fixed::new(fixed_int(*x), fixed_int(*y)));
        if let Some(b) = m.building_mut(tc) {
            b.starting_town_center = true;
        }
        m.players[i].starting_town_center = Some(tc);
    }
    spawn_trade_posts(&mut m);
    for (i, corner) in corners.iter().enumerate() {
        let index = m.players[i].index;
        spawn_starting_units(&mut m, index, *corner);
    }

    m.nav.rebuild(&content, &m.buildings);
    info!(
        match_id = m.id,
        players = count,
        resources = m.resources.len(),
        relics = m.relics.len(),
        "match created"
    );
    Ok(m)
}
