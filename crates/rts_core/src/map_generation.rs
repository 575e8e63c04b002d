//! Procedural placement of resource nodes and relics.
//!
//! Generation is a pure function of the content tables, the start positions
//! and a seed, so two matches created with the same seed get the same map.
//! Nothing here touches a [`crate::state::Match`]; match setup spawns the
//! placements it gets back.

use crate::data::ContentTables;
use crate::kinds::{BuildingType, ResourceNodeType};
use crate::math::{fixed_int, fixed_ratio, Fixed, Vec2Fixed};

/// Deterministic RNG for map generation.
#[derive(Debug, Clone)]
pub struct MapRng {
    state: u64,
}

impl MapRng {
    /// Create a generator from a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(0x9E37_79B9_7F4A_7C15),
        }
    }

    fn next(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        // Low bits of an LCG cycle quickly.
        self.state >> 33
    }

    /// Uniform integer in `min..=max`. Returns `min` for an empty range.
    pub fn range_inclusive(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        let span = u64::from(max.abs_diff(min)) + 1;
        // span fits in u32 + 1, so the remainder fits in i64.
        (i64::from(min) + (self.next() % span) as i64) as i32
    }

    /// Fair coin.
    pub fn coin(&mut self) -> bool {
        self.next() & 1 == 1
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.range_inclusive(0, i32::try_from(i).unwrap_or(i32::MAX)) as usize;
            items.swap(i, j);
        }
    }

    /// `count` distinct items in random order.
    pub fn pick<T: Clone>(&mut self, items: &[T], count: usize) -> Vec<T> {
        let mut pool = items.to_vec();
        self.shuffle(&mut pool);
        pool.truncate(count);
        pool
    }
}

/// A square area in tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Area {
    /// Left edge.
    pub x: Fixed,
    /// Top edge.
    pub y: Fixed,
    /// Side length.
    pub size: Fixed,
}

impl Area {
    fn tiles(x: i32, y: i32, size: i32) -> Self {
        Self {
            x: fixed_int(x),
            y: fixed_int(y),
            size: fixed_int(size),
        }
    }

    /// Strict overlap; touching edges do not count.
    #[must_use]
    pub fn overlaps(&self, other: &Area) -> bool {
        self.x < other.x + other.size
            && self.x + self.size > other.x
            && self.y < other.y + other.size
            && self.y + self.size > other.y
    }
}

fn is_area_free(area: &Area, occupied: &[Area]) -> bool {
    occupied.iter().all(|o| !area.overlaps(o))
}

/// A resource node to spawn, by its top-left tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePlacement {
    /// Node type.
    pub node_type: ResourceNodeType,
    /// Left tile.
    pub x: i32,
    /// Top tile.
    pub y: i32,
    /// Footprint side length.
    pub size: i32,
}

impl ResourcePlacement {
    /// Footprint as an area.
    #[must_use]
    pub fn area(&self) -> Area {
        Area::tiles(self.x, self.y, self.size)
    }

    /// Top-left corner as a position.
    #[must_use]
    pub fn position(&self) -> Vec2Fixed {
        Vec2Fixed::new(fixed_int(self.x), fixed_int(self.y))
    }
}

type Pattern = Vec<Vec<bool>>;

const BERRY_EIGHT: [&str; 3] = ["xxx", "xxx", "xxo"];
const BERRY_SIX: [&str; 3] = ["xxo", "xxx", "oxo"];
const FOREST: [&str; 6] = ["oooxxooo", "ooxxxxoo", "oxxxxxxo", "oxxxxxxo", "ooxxxxoo", "oooxxooo"];

fn parse_pattern(rows: &[&str]) -> Pattern {
    rows.iter().map(|row| row.chars().map(|c| c == 'x').collect()).collect()
}

/// Quarter turn clockwise. Patterns are square.
fn rotate(pattern: &Pattern) -> Pattern {
    let size = pattern.len();
    let mut rotated = vec![vec![false; size]; size];
    for (y, row) in pattern.iter().enumerate() {
        for (x, cell) in row.iter().enumerate() {
            if let Some(slot) = rotated.get_mut(x).and_then(|r| r.get_mut(size - 1 - y)) {
                *slot = *cell;
            }
        }
    }
    rotated
}

fn pattern_extent(pattern: &Pattern) -> i32 {
    i32::try_from(pattern.iter().map(Vec::len).max().unwrap_or(0).max(pattern.len())).unwrap_or(0)
}

struct Placer<'a> {
    content: &'a ContentTables,
    rng: &'a mut MapRng,
    width: i32,
    height: i32,
    occupied: Vec<Area>,
    placed: Vec<ResourcePlacement>,
}

impl Placer<'_> {
    fn node_size(&self, node_type: ResourceNodeType) -> i32 {
        self.content.resource(node_type).size
    }

    fn spin(&mut self, pattern: Pattern) -> Pattern {
        let turns = self.rng.range_inclusive(0, 3);
        (0..turns).fold(pattern, |p, _| rotate(&p))
    }

    fn commit(&mut self, node_type: ResourceNodeType, x: i32, y: i32) {
        let size = self.node_size(node_type);
        self.occupied.push(Area::tiles(x, y, size));
        self.placed.push(ResourcePlacement { node_type, x, y, size });
    }

    fn try_node(&mut self, node_type: ResourceNodeType, x: i32, y: i32) -> bool {
        let area = Area::tiles(x, y, self.node_size(node_type));
        if !is_area_free(&area, &self.occupied) {
            return false;
        }
        self.commit(node_type, x, y);
        true
    }

    fn random_node(&mut self, node_type: ResourceNodeType) -> bool {
        let size = self.node_size(node_type);
        for _ in 0..5 {
            let x = self.rng.range_inclusive(2, self.width - size - 2);
            let y = self.rng.range_inclusive(2, self.height - size - 2);
            if self.try_node(node_type, x, y) {
                return true;
            }
        }
        false
    }

    fn node_near(&mut self, node_type: ResourceNodeType, center: (i32, i32), attempts: u32, radius: i32) -> bool {
        let size = self.node_size(node_type);
        for _ in 0..attempts {
            let dx = self.rng.range_inclusive(-radius, radius);
            let dy = self.rng.range_inclusive(-radius, radius);
            let x = (center.0 + dx).clamp(2, self.width - size - 2);
            let y = (center.1 + dy).clamp(2, self.height - size - 2);
            if self.try_node(node_type, x, y) {
                return true;
            }
        }
        false
    }

    /// Place every cell of `pattern` with its corner at `(bx, by)`, or nothing.
    fn pattern_at(&mut self, node_type: ResourceNodeType, pattern: &Pattern, bx: i32, by: i32) -> bool {
        let size = self.node_size(node_type);
        let mut cells = Vec::new();
        for (y, row) in pattern.iter().enumerate() {
            for (x, _) in row.iter().enumerate().filter(|(_, c)| **c) {
                let (px, py) = (bx + x as i32, by + y as i32);
                if !is_area_free(&Area::tiles(px, py, size), &self.occupied) {
                    return false;
                }
                cells.push((px, py));
            }
        }
        for (x, y) in cells {
            self.commit(node_type, x, y);
        }
        true
    }

    fn random_pattern(&mut self, node_type: ResourceNodeType, pattern: &Pattern) -> bool {
        let extent = pattern_extent(pattern);
        for _ in 0..5 {
            let bx = self.rng.range_inclusive(2, self.width - extent - 2);
            let by = self.rng.range_inclusive(2, self.height - extent - 2);
            if self.pattern_at(node_type, pattern, bx, by) {
                return true;
            }
        }
        false
    }

    fn pattern_near(
        &mut self,
        node_type: ResourceNodeType,
        pattern: &Pattern,
        center: (i32, i32),
        attempts: u32,
        radius: i32,
    ) -> bool {
        let extent = pattern_extent(pattern);
        let half = extent / 2;
        for _ in 0..attempts {
            let dx = self.rng.range_inclusive(-radius, radius);
            let dy = self.rng.range_inclusive(-radius, radius);
            let bx = (center.0 - half + dx).clamp(2, self.width - extent - 2);
            let by = (center.1 - half + dy).clamp(2, self.height - extent - 2);
            if self.pattern_at(node_type, pattern, bx, by) {
                return true;
            }
        }
        false
    }

    /// Jittered grid centres spread over the map, in random cell order.
    fn spread_centers(&mut self, count: u32, padding: i32) -> Vec<(i32, i32)> {
        if count == 0 {
            return Vec::new();
        }
        let cols = (1..=count).find(|c| c * c >= count).unwrap_or(count);
        let rows = count.div_ceil(cols);
        let span_x = fixed_int((self.width - 2 * padding).max(1));
        let span_y = fixed_int((self.height - 2 * padding).max(1));
        let cell_w = span_x / Fixed::from_num(cols);
        let cell_h = span_y / Fixed::from_num(rows);
        let jitter_x = (cell_w * fixed_ratio(28, 100)).to_num::<i32>().max(1);
        let jitter_y = (cell_h * fixed_ratio(28, 100)).to_num::<i32>().max(1);

        let mut cells: Vec<(u32, u32)> = (0..rows).flat_map(|r| (0..cols).map(move |c| (r, c))).collect();
        self.rng.shuffle(&mut cells);
        let half = fixed_ratio(1, 2);
        cells
            .into_iter()
            .take(count as usize)
            .map(|(row, col)| {
                let cx = fixed_int(padding) + (Fixed::from_num(col) + half) * cell_w;
                let cy = fixed_int(padding) + (Fixed::from_num(row) + half) * cell_h;
                let x = cx.to_num::<i32>() + self.rng.range_inclusive(-jitter_x, jitter_x);
                let y = cy.to_num::<i32>() + self.rng.range_inclusive(-jitter_y, jitter_y);
                (x.clamp(2, self.width - 2), y.clamp(2, self.height - 2))
            })
            .collect()
    }

    fn berry_group(&mut self) -> Pattern {
        let rules = self.content.spawn_rules;
        let min = i32::try_from(rules.berry_group_min).unwrap_or(6);
        let max = i32::try_from(rules.berry_group_max).unwrap_or(8);
        let mut cluster = self.rng.range_inclusive(min, max);
        if cluster == 7 {
            cluster = if self.rng.coin() { 6 } else { 8 };
        }
        let base = if cluster == 8 { &BERRY_EIGHT } else { &BERRY_SIX };
        self.spin(parse_pattern(base))
    }

    fn forest(&mut self) -> Pattern {
        self.spin(parse_pattern(&FOREST))
    }

    /// Scatter `count` groups over spread centres, then anywhere until the
    /// count is met or the map is full.
    fn scatter(
        &mut self,
        count: u32,
        padding: i32,
        mut near: impl FnMut(&mut Self, (i32, i32)) -> bool,
        mut anywhere: impl FnMut(&mut Self) -> bool,
    ) {
        let mut placed = 0;
        for center in self.spread_centers(count, padding) {
            if near(self, center) {
                placed += 1;
            }
        }
        while placed < count {
            if !anywhere(self) {
                break;
            }
            placed += 1;
        }
    }
}

/// Lay out resource nodes for a match whose Town Centres sit at `starts`
/// (top-left corners).
///
/// Each start gets a berry patch, a forest, a gold mine and a stone mine
/// nearby; the rest is scattered over the whole map. The 12×12 area around
/// each start stays clear.
pub fn generate_resources(content: &ContentTables, starts: &[(i32, i32)], rng: &mut MapRng) -> Vec<ResourcePlacement> {
    let tc_size = content.building(BuildingType::TownCenter).size;
    let occupied = starts
        .iter()
        .map(|(x, y)| Area::tiles((x - 4).max(0), (y - 4).max(0), 12))
        .collect();
    let mut placer = Placer {
        content,
        rng,
        width: content.map.width,
        height: content.map.height,
        occupied,
        placed: Vec::new(),
    };

    for (x, y) in starts {
        let center = (x + tc_size / 2, y + tc_size / 2);
        let berries = if placer.rng.coin() { &BERRY_SIX } else { &BERRY_EIGHT };
        let berries = placer.spin(parse_pattern(berries));
        placer.pattern_near(ResourceNodeType::Berry, &berries, center, 20, 10);
        let forest = placer.forest();
        placer.pattern_near(ResourceNodeType::Tree, &forest, center, 20, 12);
        placer.node_near(ResourceNodeType::Gold, center, 20, 12);
        placer.node_near(ResourceNodeType::Stone, center, 20, 12);
    }

    let rules = content.spawn_rules;
    placer.scatter(
        rules.berry_groups,
        12,
        |p, c| {
            let pattern = p.berry_group();
            p.pattern_near(ResourceNodeType::Berry, &pattern, c, 8, 7)
        },
        |p| {
            let pattern = p.berry_group();
            p.random_pattern(ResourceNodeType::Berry, &pattern)
        },
    );
    placer.scatter(
        rules.tree_forests,
        12,
        |p, c| {
            let pattern = p.forest();
            p.pattern_near(ResourceNodeType::Tree, &pattern, c, 8, 8)
        },
        |p| {
            let pattern = p.forest();
            p.random_pattern(ResourceNodeType::Tree, &pattern)
        },
    );
    for (node_type, count) in [
        (ResourceNodeType::Gold, rules.gold_mines),
        (ResourceNodeType::Stone, rules.stone_mines),
    ] {
        placer.scatter(
            count,
            14,
            |p, c| p.node_near(node_type, c, 8, 8),
            |p| p.random_node(node_type),
        );
    }
    placer.placed
}

/// Minimum distance between two relics.
pub const RELIC_SPACING: Fixed = fixed_int(10);

/// Relic footprint used for overlap checks.
const RELIC_SIZE: Fixed = fixed_ratio(9, 10);

/// Pick relic centres inside the middle 40% of the map, clear of `occupied`
/// and at least [`RELIC_SPACING`] apart. Relics with no free spot after
/// 120 attempts are skipped.
pub fn generate_relics(content: &ContentTables, player_count: usize, occupied: &[Area], rng: &mut MapRng) -> Vec<Vec2Fixed> {
    let (w, h) = (content.map.width, content.map.height);
    let (min_x, max_x) = (w * 3 / 10, (w * 7 + 9) / 10);
    let (min_y, max_y) = (h * 3 / 10, (h * 7 + 9) / 10);
    let half = fixed_ratio(1, 2);
    let mut occupied = occupied.to_vec();
    let mut relics: Vec<Vec2Fixed> = Vec::new();

    for _ in 0..3 + player_count {
        for _ in 0..120 {
            let x = fixed_int(rng.range_inclusive(min_x, max_x)) + half;
            let y = fixed_int(rng.range_inclusive(min_y, max_y)) + half;
            let area = Area {
                x: x - RELIC_SIZE / 2,
                y: y - RELIC_SIZE / 2,
                size: RELIC_SIZE,
            };
            let center = Vec2Fixed::new(x, y);
            if !is_area_free(&area, &occupied) || relics.iter().any(|r| r.distance(center) < RELIC_SPACING) {
                continue;
            }
            relics.push(center);
            occupied.push(area);
            break;
        }
    }
    relics
}
