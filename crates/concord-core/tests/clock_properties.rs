//! Vector clock law tests
//!
//! Properties every node relies on when merging remote events:
//!
//! 1. **Monotonicity**: no entry ever decreases
//! 2. **Local ownership**: the owner's entry only moves through `tick`
//! 3. **Idempotence**: applying the same snapshot twice equals applying it once
//! 4. **Commutativity**: merge order does not change the result

#![allow(clippy::unwrap_used)]

use concord_core::{CausalOrdering, NodeId, VectorClock, VectorClockSnapshot};
use proptest::prelude::*;

const NODES: [&str; 4] = ["n0", "n1", "n2", "n3"];

#[derive(Debug, Clone)]
enum Step {
    Tick,
    Update(VectorClockSnapshot),
}

fn snapshot_strategy() -> impl Strategy<Value = VectorClockSnapshot> {
    prop::collection::vec((0usize..NODES.len(), 0u64..50), 0..6).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(i, c)| (NodeId::new(NODES[i]), c))
            .collect()
    })
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Tick),
        snapshot_strategy().prop_map(Step::Update),
    ]
}

fn owner() -> NodeId {
    NodeId::new(NODES[0])
}

proptest! {
    #[test]
    fn entries_never_decrease(steps in prop::collection::vec(step_strategy(), 0..40)) {
        let mut clock = VectorClock::new(owner());
        let mut previous = clock.snapshot();

        for step in steps {
            match step {
                Step::Tick => { clock.tick(); }
                Step::Update(remote) => clock.update(&remote),
            }
            let current = clock.snapshot();
            prop_assert!(current.dominates(&previous));
            previous = current;
        }
    }

    #[test]
    fn owner_entry_moves_only_through_tick(steps in prop::collection::vec(step_strategy(), 0..40)) {
        let mut clock = VectorClock::new(owner());
        let mut ticks = 0u64;

        for step in steps {
            match step {
                Step::Tick => {
                    clock.tick();
                    ticks += 1;
                }
                Step::Update(remote) => clock.update(&remote),
            }
            prop_assert_eq!(clock.get(&owner()), ticks);
        }
    }

    #[test]
    fn update_is_idempotent(base in snapshot_strategy(), remote in snapshot_strategy()) {
        let mut once = VectorClock::new(owner());
        once.update(&base);
        once.update(&remote);

        let mut twice = once.clone();
        twice.update(&remote);

        prop_assert_eq!(once.snapshot(), twice.snapshot());
    }

    #[test]
    fn update_is_commutative(a in snapshot_strategy(), b in snapshot_strategy()) {
        let mut left = VectorClock::new(owner());
        left.update(&a);
        left.update(&b);

        let mut right = VectorClock::new(owner());
        right.update(&b);
        right.update(&a);

        prop_assert_eq!(left.snapshot(), right.snapshot());
    }

    #[test]
    fn compare_is_antisymmetric(a in snapshot_strategy(), b in snapshot_strategy()) {
        let forward = VectorClock::compare(&a, &b);
        let backward = VectorClock::compare(&b, &a);
        let expected = match forward {
            CausalOrdering::Before => CausalOrdering::After,
            CausalOrdering::After => CausalOrdering::Before,
            other => other,
        };
        prop_assert_eq!(backward, expected);
    }
}

#[test]
fn tick_after_merge_happens_after_remote() {
    let mut remote = VectorClock::new(NodeId::new("n1"));
    let remote_event = remote.tick();

    let mut local = VectorClock::new(owner());
    local.update(&remote_event);
    let reply = local.tick();

    assert_eq!(
        VectorClock::compare(&remote_event, &reply),
        CausalOrdering::Before
    );
}

#[test]
fn independent_ticks_are_concurrent() {
    let mut a = VectorClock::new(NodeId::new("n1"));
    let mut b = VectorClock::new(NodeId::new("n2"));

    assert_eq!(
        VectorClock::compare(&a.tick(), &b.tick()),
        CausalOrdering::Concurrent
    );
}
