//! The fixed-timestep tick.
//!
//! One call to [`tick`] advances a match by [`DT`](crate::state::DT) seconds.
//! Phases run in a fixed order and never fail: a phase that finds a stale
//! reference drops the order holding it and carries on, so one bad entity
//! cannot stop the match for everyone.
//!
//! # Determinism
//!
//! The tick uses fixed-point math only, iterates entity collections in
//! insertion order and draws no randomness, so two matches created from the
//! same seed and fed the same commands stay identical. [`state_hash`] is the
//! cheap way to check that.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tracing::{debug, trace};

use crate::combat::process_combat;
use crate::construction::{process_construction, process_repairing};
use crate::economy::{process_gathering, process_returns};
use crate::elimination::{process_eliminations, settle_outcome, MatchOutcome};
use crate::error::Result;
use crate::healing::process_healing;
use crate::movement::process_movement;
use crate::orders::activate_queued_orders;
use crate::production::process_production;
use crate::relics::process_relic_income;
use crate::snapshot::{snapshot, Snapshot};
use crate::state::Match;
use crate::steering::{resolve_obstacle_collisions, resolve_unit_collisions};
use crate::trading::process_trading;

/// What happened during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// Tick number after the step.
    pub tick: u64,
    /// Somebody was eliminated this tick.
    pub eliminations: bool,
    /// Set once the match is over. The caller should stop ticking.
    pub outcome: Option<MatchOutcome>,
}

/// Advance the match by one tick.
///
/// A decided match is left untouched.
pub fn tick(m: &mut Match) -> TickReport {
    if m.is_over() {
        return TickReport {
            tick: m.tick,
            eliminations: false,
            outcome: m.outcome,
        };
    }
    m.tick += 1;

    activate_queued_orders(m);
    let content = m.content_arc();
    m.nav.rebuild(&content, &m.buildings);

    process_movement(m);
    resolve_unit_collisions(m);
    resolve_obstacle_collisions(m);

    process_returns(m);
    process_gathering(m);
    process_construction(m);
    process_repairing(m);
    process_production(m);

    process_combat(m);

    let eliminations = process_eliminations(m);
    if let Some(outcome) = settle_outcome(m) {
        debug!(match_id = m.id, tick = m.tick, "tick loop finished");
        return TickReport {
            tick: m.tick,
            eliminations,
            outcome: Some(outcome),
        };
    }

    process_healing(m);
    process_relic_income(m);
    process_trading(m);

    // Orders finished this tick hand over to the queue before the snapshot.
    activate_queued_orders(m);
    m.outbox.request_snapshot();

    #[cfg(debug_assertions)]
    trace!(tick = m.tick, units = m.units.len(), buildings = m.buildings.len(), "tick done");

    TickReport {
        tick: m.tick,
        eliminations,
        outcome: None,
    }
}

/// Snapshot for broadcast. Clears the projectiles fired since the last
/// frame so each one is animated once.
pub fn frame(m: &mut Match) -> Snapshot {
    let view = snapshot(m);
    m.projectiles.clear();
    view
}

/// Hash of the whole simulation state.
///
/// # Errors
///
/// Fails only if the state cannot be encoded.
pub fn state_hash(m: &Match) -> Result<u64> {
    let bytes = bincode::serialize(m)?;
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    Ok(hasher.finish())
}
