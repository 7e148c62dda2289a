//! Property tests for affinity parsing and the protection state machine.

use proptest::prelude::*;
use warden_cpu_guard::*;

/// Disjoint ascending ranges and their total core count.
fn arb_affinity() -> impl Strategy<Value = (String, u32)> {
    prop::collection::vec((0u32..4, 0u32..6, any::<bool>()), 1..8).prop_map(|parts| {
        let mut next = 0u32;
        let mut tokens = Vec::new();
        let mut total = 0;
        for (gap, width, as_range) in parts {
            let lo = next + gap;
            if as_range {
                let hi = lo + width;
                tokens.push(format!("{}-{}", lo, hi));
                total += width + 1;
                next = hi + 2;
            } else {
                tokens.push(lo.to_string());
                total += 1;
                next = lo + 2;
            }
        }
        (tokens.join(","), total)
    })
}

fn arb_usage() -> impl Strategy<Value = f64> {
    prop_oneof![Just(200.0), 0.0f64..400.0]
}

proptest! {
    #[test]
    fn affinity_count_matches_generated((list, expected) in arb_affinity()) {
        prop_assert_eq!(parse_affinity_list(&list).unwrap(), expected);
    }

    #[test]
    fn affinity_garbage_never_panics(list in "\\PC{0,24}") {
        let _ = parse_affinity_list(&list);
    }

    #[test]
    fn affinity_full_width_indices_never_panic(
        parts in prop::collection::vec((any::<u32>(), any::<u32>(), any::<bool>()), 1..4)
    ) {
        let mut tokens = Vec::new();
        let mut exact: Option<u64> = Some(0);
        for (lo, hi, as_range) in parts {
            if as_range {
                tokens.push(format!("{}-{}", lo, hi));
                exact = exact.filter(|_| hi >= lo).map(|t| t + u64::from(hi - lo) + 1);
            } else {
                tokens.push(lo.to_string());
                exact = exact.map(|t| t + 1);
            }
        }
        let list = tokens.join(",");

        match exact.filter(|t| *t <= u64::from(u32::MAX)) {
            Some(total) => prop_assert_eq!(u64::from(parse_affinity_list(&list).unwrap()), total),
            None => prop_assert!(parse_affinity_list(&list).is_err()),
        }
    }

    #[test]
    fn suspended_iff_trailing_run_reaches_capacity(usages in prop::collection::vec(arb_usage(), 0..60)) {
        let budget = 200.0;
        let mut machine = ProtectionStateMachine::new();
        let mut run = 0usize;

        for usage in usages {
            machine.observe(usage, budget);
            run = if usage > budget { run + 1 } else { 0 };

            let expected = if run >= VIOLATION_STREAK_CAPACITY {
                ProtectionState::Suspended
            } else {
                ProtectionState::Armed
            };
            prop_assert_eq!(machine.state(), expected);
            prop_assert_eq!(machine.streak().len(), run.min(VIOLATION_STREAK_CAPACITY));
        }
    }

    #[test]
    fn transitions_alternate(usages in prop::collection::vec(arb_usage(), 0..60)) {
        let mut machine = ProtectionStateMachine::new();
        let mut last = ProtectionState::Armed;
        for usage in usages {
            if let Some(t) = machine.observe(usage, 200.0) {
                prop_assert_eq!(t.from, last);
                prop_assert_ne!(t.from, t.to);
                last = t.to;
            }
        }
        prop_assert_eq!(machine.state(), last);
    }
}
