//! Determinism testing utilities.
//!
//! Two servers given the same seed and command stream must end in the same
//! state, otherwise replays of a bug report cannot be trusted. Sources of
//! non-determinism include:
//!
//! - **Floating-point math**: positions, hp and stockpiles use
//!   [`rts_core::math::Fixed`] throughout the tick.
//!
//! - **HashMap iteration order**: entity collections are vectors in insertion
//!   order and keyed state lives in `BTreeMap`s.
//!
//! - **System randomness**: map generation draws from a seeded generator
//!   only; the tick draws nothing.
//!
//! State is compared through [`rts_core::simulation::state_hash`], which
//! hashes the bincode encoding of the whole match.

use std::thread;

use tracing::warn;

use rts_core::commands::Command;
use rts_core::dispatch::dispatch;
use rts_core::entities::PlayerIndex;
use rts_core::simulation::{state_hash, tick};
use rts_core::state::Match;

/// Hash of a match.
///
/// # Panics
///
/// Panics if the match cannot be encoded.
#[must_use]
pub fn match_hash(m: &Match) -> u64 {
    state_hash(m).expect("match state encodes")
}

/// A command issued by a player just before a given tick runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedCommand {
    /// Tick number the command lands before.
    pub before_tick: u64,
    /// Issuing player slot.
    pub player: PlayerIndex,
    /// The command.
    pub command: Command,
}

/// Play a command script against a match for `ticks` ticks, discarding
/// whatever the outbox collects.
pub fn play_script(m: &mut Match, script: &[ScriptedCommand], ticks: u64) {
    for _ in 0..ticks {
        let next = m.tick + 1;
        for entry in script.iter().filter(|c| c.before_tick == next) {
            dispatch(m, entry.player, &entry.command);
        }
        tick(m);
        m.outbox.drain();
        m.outbox.take_snapshot_request();
    }
}

/// Final hashes of several runs of one scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHashes {
    /// One per run, in run order.
    pub hashes: Vec<u64>,
    /// Ticks each run lasted.
    pub ticks: u64,
}

impl RunHashes {
    /// Check if every run ended in the same state.
    #[must_use]
    pub fn agree(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Distinct hashes seen.
    #[must_use]
    pub fn distinct(&self) -> Vec<u64> {
        let mut distinct = self.hashes.clone();
        distinct.sort_unstable();
        distinct.dedup();
        distinct
    }

    /// # Panics
    ///
    /// Panics if the runs disagree.
    pub fn assert_agree(&self) {
        assert!(
            self.agree(),
            "{} runs of {} ticks ended in {} different states: {:?}",
            self.hashes.len(),
            self.ticks,
            self.distinct().len(),
            self.hashes
        );
    }
}

/// Build the match `runs` times, play `script` for `ticks` ticks on each and
/// collect the final hashes.
pub fn replay<F>(setup: F, script: &[ScriptedCommand], ticks: u64, runs: usize) -> RunHashes
where
    F: Fn() -> Match,
{
    let hashes = (0..runs)
        .map(|_| {
            let mut m = setup();
            play_script(&mut m, script, ticks);
            match_hash(&m)
        })
        .collect();
    RunHashes { hashes, ticks }
}

/// Like [`replay`], with every run on its own thread at the same time.
///
/// Matches share nothing but their content tables, so this also checks that
/// a server running several at once does not leak state between them.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn replay_in_parallel<F>(setup: F, script: &[ScriptedCommand], ticks: u64, runs: usize) -> RunHashes
where
    F: Fn() -> Match + Sync,
{
    let hashes = thread::scope(|s| {
        let workers: Vec<_> = (0..runs)
            .map(|_| {
                s.spawn(|| {
                    let mut m = setup();
                    play_script(&mut m, script, ticks);
                    match_hash(&m)
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().expect("simulation thread panicked"))
            .collect()
    });
    RunHashes { hashes, ticks }
}

/// Step two copies of a scenario in lockstep and report the first tick
/// after which their states differ; 0 means they differed from the start.
pub fn find_first_divergence<F>(setup: F, script: &[ScriptedCommand], ticks: u64) -> Option<u64>
where
    F: Fn() -> Match,
{
    let mut a = setup();
    let mut b = setup();
    if match_hash(&a) != match_hash(&b) {
        return Some(0);
    }

    for t in 1..=ticks {
        play_script(&mut a, script, 1);
        play_script(&mut b, script, 1);
        if match_hash(&a) != match_hash(&b) {
            warn!(tick = t, "matches diverged");
            return Some(t);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{bare_match, generated_match, place_unit, pos};
    use rts_core::commands::{IdField, RawPoint};
    use rts_core::kinds::UnitType;

    #[test]
    fn test_run_hashes_report_disagreement() {
        let same = RunHashes {
            hashes: vec![7, 7, 7],
            ticks: 10,
        };
        assert!(same.agree());
        let split = RunHashes {
            hashes: vec![7, 8, 7],
            ticks: 10,
        };
        assert!(!split.agree());
        assert_eq!(split.distinct(), vec![7, 8]);
    }

    #[test]
    fn test_generated_match_is_deterministic() {
        replay(|| generated_match(4, 2024), &[], 200, 2).assert_agree();
    }

    #[test]
    fn test_different_seeds_differ() {
        assert_ne!(match_hash(&generated_match(2, 1)), match_hash(&generated_match(2, 2)));
    }

    /// Two Town Centres take ids 1 and 2, so the archers get the odd ids from
    /// 3 and the spearmen the even ids from 4.
    fn skirmish() -> Match {
        let mut m = bare_match(2);
        for i in 0..4 {
            place_unit(&mut m, 0, UnitType::Archer, pos(44, 46 + i));
            place_unit(&mut m, 1, UnitType::Spearman, pos(54, 46 + i));
        }
        m
    }

    fn skirmish_script() -> Vec<ScriptedCommand> {
        vec![
            ScriptedCommand {
                before_tick: 1,
                player: 1,
                command: Command::AttackMove {
                    unit_ids: vec![4, 6, 8, 10],
                    target: RawPoint::new(40.0, 48.0),
                    queue: false,
                },
            },
            ScriptedCommand {
                before_tick: 10,
                player: 0,
                command: Command::AttackTarget {
                    unit_ids: vec![3, 5, 7, 9],
                    target_id: IdField::Id(4),
                    queue: false,
                },
            },
        ]
    }

    #[test]
    fn test_combat_script_is_deterministic() {
        let script = skirmish_script();
        replay(skirmish, &script, 300, 2).assert_agree();
        assert_eq!(find_first_divergence(skirmish, &script, 100), None);
    }

    #[test]
    fn test_parallel_matches_agree() {
        replay_in_parallel(skirmish, &skirmish_script(), 150, 4).assert_agree();
    }
}
