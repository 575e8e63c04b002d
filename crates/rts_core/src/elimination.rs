//! Player elimination and match outcome.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::buildings::center;
use crate::entities::{PlayerIndex, RelicHolder};
use crate::events::GameEvent;
use crate::math::Fixed;
use crate::state::Match;

/// Why a player left the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EliminationReason {
    /// Every landmark of the team was destroyed.
    LandmarksDestroyed,
    /// The team has no units and no standing buildings.
    NoAssets,
    /// The player resigned.
    Resigned,
    /// The player's connection dropped.
    PlayerDisconnected,
}

/// How the match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeReason {
    /// No team is left.
    AllEliminated,
    /// One team is left.
    TeamVictory,
}

/// Final result broadcast as `matchEnded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub reason: OutcomeReason,
    pub winner_team: Option<u8>,
}

/// Remove a player from the match.
///
/// Carried and stored relics fall to the ground. Units and buildings are
/// removed, except landmark corpses. Returns `false` if the player was
/// already out.
pub fn eliminate_player(m: &mut Match, index: PlayerIndex, reason: EliminationReason) -> bool {
    let content = m.content_arc();
    let Some(player) = m.player_mut(index) else {
        return false;
    };
    if player.eliminated {
        return false;
    }
    player.eliminated = true;
    player.elimination_reason = Some(reason);
    info!(player = index, ?reason, "player eliminated");

    let carried: Vec<_> = m
        .units
        .iter()
        .filter(|u| u.owner == index)
        .filter_map(|u| u.relic.map(|r| (r, u.position)))
        .collect();
    let stored: Vec<_> = m
        .buildings
        .iter()
        .filter(|b| b.is_owned_by(index))
        .flat_map(|b| {
            let spot = center(&content, b);
            b.relics.iter().map(move |r| (*r, spot))
        })
        .collect();
    for (relic, position) in carried.into_iter().chain(stored) {
        if let Some(r) = m.relic_mut(relic) {
            r.holder = RelicHolder::Ground;
            r.position = position;
        }
    }

    m.units.retain(|u| u.owner != index);
    m.buildings
        .retain(|b| !b.is_owned_by(index) || (b.landmark_destroyed && content.building(b.kind).is_landmark()));
    for b in m.buildings.iter_mut().filter(|b| b.is_owned_by(index)) {
        b.relics.clear();
        b.garrison.clear();
        b.production_queue.clear();
    }
    true
}

fn active_teams(m: &Match) -> BTreeSet<u8> {
    m.players.iter().filter(|p| !p.eliminated).map(|p| p.team).collect()
}

/// Elimination phase. Returns `true` if anyone was eliminated.
pub fn process_eliminations(m: &mut Match) -> bool {
    let content = m.content_arc();
    let mut doomed = Vec::new();
    for team in active_teams(m) {
        let on_team = |owner: Option<PlayerIndex>| owner.is_some_and(|o| m.team_of(o) == team);
        let has_landmark = m.buildings.iter().any(|b| {
            on_team(b.owner) && b.hp > Fixed::ZERO && !b.landmark_destroyed && content.building(b.kind).is_landmark()
        });
        let has_units = m.units.iter().any(|u| on_team(Some(u.owner)));
        let has_buildings = m.buildings.iter().any(|b| on_team(b.owner) && !b.landmark_destroyed);
        let reason = if !has_units && !has_buildings {
            Some(EliminationReason::NoAssets)
        } else if !has_landmark {
            Some(EliminationReason::LandmarksDestroyed)
        } else {
            None
        };
        if let Some(reason) = reason {
            doomed.extend(
                m.players
                    .iter()
                    .filter(|p| !p.eliminated && p.team == team)
                    .map(|p| (p.index, reason)),
            );
        }
    }
    let mut changed = false;
    for (index, reason) in doomed {
        changed |= eliminate_player(m, index, reason);
    }
    changed
}

/// Decide the match, if it is decided.
///
/// Matches that started with fewer than two teams never end this way.
#[must_use]
pub fn match_outcome(m: &Match) -> Option<MatchOutcome> {
    let alive = active_teams(m);
    if alive.is_empty() {
        return Some(MatchOutcome {
            reason: OutcomeReason::AllEliminated,
            winner_team: None,
        });
    }
    if m.initial_teams.len() < 2 {
        return None;
    }
    if alive.len() == 1 {
        return Some(MatchOutcome {
            reason: OutcomeReason::TeamVictory,
            winner_team: alive.first().copied(),
        });
    }
    None
}

/// Record the outcome once the match is decided and announce it to everyone.
///
/// Returns the outcome if the match is over, whether decided now or before.
pub fn settle_outcome(m: &mut Match) -> Option<MatchOutcome> {
    if m.outcome.is_some() {
        return m.outcome;
    }
    let outcome = match_outcome(m)?;
    info!(match_id = m.id, ?outcome, "match ended");
    m.outcome = Some(outcome);
    m.outbox.broadcast(GameEvent::MatchEnded(outcome));
    Some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{BuildingType, UnitType};
    use crate::math::Vec2Fixed;
    use crate::test_support::{create_test_match, place_building, place_relic, place_unit};

    fn pos(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    #[test]
    fn test_losing_last_landmark_eliminates_team() {
        let mut m = create_test_match(2);
        let tc = m.players[1].starting_town_center.unwrap();
        {
            let b = m.building_mut(tc).unwrap();
            b.hp = Fixed::ZERO;
            b.landmark_destroyed = true;
        }
        place_unit(&mut m, 1, UnitType::Spearman, pos(50, 50));
        assert!(process_eliminations(&mut m));
        assert!(m.players[1].eliminated);
        assert_eq!(m.players[1].elimination_reason, Some(EliminationReason::LandmarksDestroyed));
        assert!(m.units.iter().all(|u| u.owner != 1));
        assert!(m.building(tc).is_some(), "landmark corpse stays");
        assert_eq!(
            match_outcome(&m),
            Some(MatchOutcome {
                reason: OutcomeReason::TeamVictory,
                winner_team: Some(1),
            })
        );
    }

    #[test]
    fn test_team_with_nothing_standing_has_no_assets() {
        let mut m = create_test_match(2);
        let tc = m.players[1].starting_town_center.unwrap();
        m.buildings.retain(|b| b.id != tc);
        assert!(process_eliminations(&mut m));
        assert_eq!(m.players[1].elimination_reason, Some(EliminationReason::NoAssets));
        assert!(!m.players[0].eliminated);
    }

    #[test]
    fn test_elimination_drops_relics() {
        let mut m = create_test_match(2);
        let monk = place_unit(&mut m, 1, UnitType::Monk, pos(40, 40));
        let relic = place_relic(&mut m, pos(40, 40));
        m.relic_mut(relic).unwrap().holder = RelicHolder::Carried(monk);
        m.unit_mut(monk).unwrap().relic = Some(relic);
        let monastery = place_building(&mut m, Some(1), BuildingType::Monastery, pos(60, 60));
        let stored = place_relic(&mut m, pos(0, 0));
        m.relic_mut(stored).unwrap().holder = RelicHolder::Stored(monastery);
        m.building_mut(monastery).unwrap().relics.push(stored);

        assert!(eliminate_player(&mut m, 1, EliminationReason::Resigned));
        assert!(!eliminate_player(&mut m, 1, EliminationReason::Resigned));
        assert!(m.relic(relic).unwrap().is_free());
        assert_eq!(m.relic(relic).unwrap().position, pos(40, 40));
        assert!(m.relic(stored).unwrap().is_free());
        assert!(m.building(monastery).is_none());
    }

    #[test]
    fn test_single_team_match_has_no_victory() {
        let mut m = create_test_match(1);
        assert_eq!(match_outcome(&m), None);
        eliminate_player(&mut m, 0, EliminationReason::Resigned);
        assert_eq!(match_outcome(&m).map(|o| o.reason), Some(OutcomeReason::AllEliminated));
    }

    #[test]
    fn test_allies_share_landmarks() {
        let mut m = create_test_match(3);
        m.players[2].team = 1;
        let tc = m.players[2].starting_town_center.unwrap();
        m.buildings.retain(|b| b.id != tc);
        assert!(!process_eliminations(&mut m));
        assert!(!m.players[2].eliminated);
    }

    #[test]
    fn test_settle_outcome_announces_once() {
        let mut m = create_test_match(2);
        assert_eq!(settle_outcome(&mut m), None);
        eliminate_player(&mut m, 1, EliminationReason::PlayerDisconnected);
        let outcome = settle_outcome(&mut m).unwrap();
        assert_eq!(outcome.winner_team, Some(1));
        assert_eq!(settle_outcome(&mut m), Some(outcome));
        let ended = m
            .outbox
            .events()
            .iter()
            .filter(|e| e.event.name() == "matchEnded")
            .count();
        assert_eq!(ended, 1);
    }
}
