use dandelion_time::Scheduler;
use proptest::prelude::*;

proptest! {
    // Any mix of schedule calls fires in non-decreasing deadline order, with
    // FIFO order among equal deadlines.
    #[test]
    fn fires_sorted_with_fifo_ties(delays in prop::collection::vec(0u64..5_000, 1..64)) {
        let mut sched = Scheduler::new();
        for (seq, &delay) in delays.iter().enumerate() {
            sched.schedule(delay, seq);
        }

        let mut fired = Vec::new();
        while sched.pending() > 0 {
            sched.tick();
            while let Some(ev) = sched.pop_due() {
                fired.push(ev);
            }
        }

        prop_assert_eq!(fired.len(), delays.len());
        for pair in fired.windows(2) {
            prop_assert!(pair[0].deadline_ns <= pair[1].deadline_ns);
            if pair[0].deadline_ns == pair[1].deadline_ns {
                prop_assert!(pair[0].tag < pair[1].tag);
            }
        }
    }

    // Canceling a subset before firing means exactly the complement fires.
    #[test]
    fn cancel_before_due_never_fires(
        delays in prop::collection::vec(200u64..5_000, 1..32),
        cancel_mask in prop::collection::vec(any::<bool>(), 32),
    ) {
        let mut sched = Scheduler::new();
        let ids: Vec<_> = delays
            .iter()
            .enumerate()
            .map(|(seq, &delay)| sched.schedule(delay, seq))
            .collect();

        let mut kept = Vec::new();
        for (seq, &id) in ids.iter().enumerate() {
            if cancel_mask[seq % cancel_mask.len()] {
                sched.cancel(id);
            } else {
                kept.push(seq);
            }
        }

        let mut fired = Vec::new();
        while sched.pending() > 0 {
            sched.tick();
            while let Some(ev) = sched.pop_due() {
                fired.push(ev.tag);
            }
        }

        fired.sort_unstable();
        prop_assert_eq!(fired, kept);
    }
}
