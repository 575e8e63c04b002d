//! Proptest strategies for command streams.
//!
//! Commands are generated against a pool of entity ids taken from a match,
//! mixed with ids that do not exist, so streams exercise both the accepted
//! and the rejected paths of the dispatcher.

use proptest::prelude::*;
use rts_core::commands::{Command, IdField, RawPoint};
use rts_core::entities::EntityId;

/// Building type names a client might send, including one that is not real.
pub const BUILDING_NAMES: &[&str] = &["House", "Farm", "Barracks", "Mill", "Monastery", "Castle", "Spire", "Nonsense"];

/// Unit type names a client might send.
pub const UNIT_NAMES: &[&str] = &["Villager", "Scout", "Spearman", "Archer", "Monk", "Trader", "Knight", "Ghost"];

/// Technology ids a client might send.
pub const TECH_NAMES: &[&str] = &["CarryingFrame", "Basketry", "Wheelbarrow", "NotATech"];

/// A point, occasionally off the map or not finite.
pub fn arb_point() -> impl Strategy<Value = RawPoint> {
    prop_oneof![
        8 => (0.0f64..100.0, 0.0f64..100.0).prop_map(|(x, y)| RawPoint::new(x, y)),
        1 => (-50.0f64..150.0, -50.0f64..150.0).prop_map(|(x, y)| RawPoint::new(x, y)),
        1 => Just(RawPoint::INVALID),
    ]
}

/// An id from `pool`, or a stray one.
pub fn arb_id(pool: Vec<EntityId>) -> impl Strategy<Value = EntityId> {
    let stray = 10_000u64..10_010;
    if pool.is_empty() {
        stray.boxed()
    } else {
        prop_oneof![4 => proptest::sample::select(pool), 1 => stray].boxed()
    }
}

/// An id field from `pool`, sometimes absent or malformed.
pub fn arb_id_field(pool: Vec<EntityId>) -> impl Strategy<Value = IdField> {
    prop_oneof![
        8 => arb_id(pool).prop_map(IdField::Id),
        1 => Just(IdField::Absent),
        1 => Just(IdField::Invalid),
    ]
}

/// A short list of ids from `pool`.
pub fn arb_ids(pool: Vec<EntityId>) -> impl Strategy<Value = Vec<EntityId>> {
    proptest::collection::vec(arb_id(pool), 0..6).prop_map(|mut ids| {
        let mut seen = std::collections::BTreeSet::new();
        ids.retain(|id| seen.insert(*id));
        ids
    })
}

fn arb_name(names: &'static [&'static str]) -> impl Strategy<Value = String> {
    proptest::sample::select(names).prop_map(str::to_string)
}

/// Any match command except `resign`, over entities in `pool`.
pub fn arb_command(pool: Vec<EntityId>) -> impl Strategy<Value = Command> {
    let ids = || arb_ids(pool.clone());
    let id = || arb_id_field(pool.clone());
    prop_oneof![
        (ids(), arb_point(), any::<bool>()).prop_map(|(unit_ids, target, queue)| Command::Move {
            unit_ids,
            target,
            queue
        }),
        (ids(), arb_point(), any::<bool>()).prop_map(|(unit_ids, target, queue)| Command::AttackMove {
            unit_ids,
            target,
            queue
        }),
        (ids(), id(), any::<bool>()).prop_map(|(unit_ids, target_id, queue)| Command::AttackTarget {
            unit_ids,
            target_id,
            queue
        }),
        (ids(), id(), any::<bool>()).prop_map(|(unit_ids, resource_id, queue)| Command::Gather {
            unit_ids,
            resource_id,
            queue
        }),
        (ids(), id(), any::<bool>()).prop_map(|(unit_ids, relic_id, queue)| Command::PickupRelic {
            unit_ids,
            relic_id,
            queue
        }),
        (ids(), id(), any::<bool>()).prop_map(|(unit_ids, building_id, queue)| Command::DepositRelic {
            unit_ids,
            building_id,
            queue
        }),
        (ids(), proptest::option::of(arb_point()), any::<bool>()).prop_map(|(unit_ids, target, queue)| {
            Command::DropRelicAt {
                unit_ids,
                target,
                queue,
            }
        }),
        (arb_name(BUILDING_NAMES), ids(), 0.0f64..100.0, 0.0f64..100.0).prop_map(
            |(building_type, builder_ids, x, y)| Command::Build {
                building_type,
                builder_ids,
                x,
                y
            }
        ),
        id().prop_map(|building_id| Command::CancelBuild { building_id }),
        (id(), ids(), any::<bool>()).prop_map(|(building_id, builder_ids, queue)| Command::Repair {
            building_id,
            unit_id: IdField::Absent,
            builder_ids,
            queue
        }),
        (id(), arb_name(UNIT_NAMES)).prop_map(|(building_id, unit_type)| Command::Produce {
            building_id,
            unit_type
        }),
        (id(), proptest::option::of(-1.0f64..4.0)).prop_map(|(building_id, index)| Command::CancelQueue {
            building_id,
            index
        }),
        (id(), arb_name(TECH_NAMES)).prop_map(|(building_id, tech)| Command::Research {
            tech_id: tech,
            building_id
        }),
        (id(), ids(), any::<bool>()).prop_map(|(building_id, unit_ids, queue)| Command::Garrison {
            building_id,
            unit_ids,
            queue
        }),
        (id(), 0.0f64..6.0).prop_map(|(building_id, count)| Command::Ungarrison { building_id, count }),
        (id(), arb_point()).prop_map(|(building_id, target)| Command::Rally {
            building_ids: None,
            building_id,
            target
        }),
        ids().prop_map(|unit_ids| Command::RestartTrading { unit_ids }),
    ]
}

/// A stream of commands from either of two players.
pub fn arb_command_stream(pool: Vec<EntityId>, max_len: usize) -> impl Strategy<Value = Vec<(u8, Command)>> {
    proptest::collection::vec((0u8..2, arb_command(pool)), 0..max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn test_stream_ids_come_from_pool_or_strays() {
        let mut runner = TestRunner::deterministic();
        let strategy = arb_command_stream(vec![1, 2, 3], 20);
        for _ in 0..20 {
            let stream = strategy.new_tree(&mut runner).unwrap().current();
            for (player, command) in stream {
                assert!(player < 2);
                if let Command::Move { unit_ids, .. } = command {
                    assert!(unit_ids.iter().all(|id| *id <= 3 || *id >= 10_000));
                }
            }
        }
    }
}
