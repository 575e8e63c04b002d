//! Property tests over random command streams.

use proptest::prelude::*;
use rts_core::commands::CommandOutcome;
use rts_core::dispatch::dispatch;
use rts_core::entities::EntityId;
use rts_core::simulation::tick;
use rts_core::state::Match;
use rts_test_utils::determinism::match_hash;
use rts_test_utils::fixtures::generated_match;
use rts_test_utils::invariants::{check_all, check_population};
use rts_test_utils::strategies::{arb_command, arb_command_stream};

/// Every entity id in a freshly generated two-player match with seed 9.
fn id_pool() -> Vec<EntityId> {
    let m = generated_match(2, 9);
    m.units
        .iter()
        .map(|u| u.id)
        .chain(m.buildings.iter().map(|b| b.id))
        .chain(m.resources.iter().take(20).map(|r| r.id))
        .chain(m.relics.iter().map(|r| r.id))
        .collect()
}

fn base() -> Match {
    generated_match(2, 9)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_rejected_commands_leave_state_unchanged(player in 0u8..2, command in arb_command(id_pool())) {
        let mut m = base();
        let before = m.clone();
        let hash = match_hash(&m);
        let outcome = dispatch(&mut m, player, &command);
        if let CommandOutcome::Rejected(_) = outcome {
            prop_assert_eq!(match_hash(&m), hash);
            prop_assert!(m == before);
            prop_assert!(m.outbox.events().is_empty());
        }
    }

    #[test]
    fn test_invariants_hold_over_command_streams(stream in arb_command_stream(id_pool(), 40)) {
        let mut m = base();
        for (step, (player, command)) in stream.iter().enumerate() {
            dispatch(&mut m, *player, command);
            for _ in 0..(step % 5 + 1) {
                tick(&mut m);
            }
            m.outbox.drain();
            let found = check_all(&m);
            prop_assert!(found.is_empty(), "{:?}", found);
            prop_assert!(check_population(&m).is_empty());
        }
    }
}
