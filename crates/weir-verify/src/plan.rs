//! Iteration planning for the small-step synchronizer.
//!
//! Pure arithmetic, kept separate from the loop so the window and
//! unwind decisions can be tested directly. The forward boundary is
//! `progress − depth + step` measured from the pre-unwind progress,
//! which from the post-unwind cursor works out to `progress + step`;
//! a window that would overshoot the stop block is clipped to it and
//! kills the remaining unwind depth. The one unwind happens when a
//! window lands exactly on the stop block, re-executing the tail.

use weir_core::types::BlockNumber;

/// The plan of one synchronizer iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IterationPlan {
    /// Forward target of this window, inclusive.
    pub target: BlockNumber,
    /// Whether the raw target overshot the stop block. The caller must
    /// force the unwind depth to 0 for the remainder of the run.
    pub clipped: bool,
    /// Unwind target after the window's checks, if this iteration
    /// unwinds. The caller forces depth to 0 after performing it.
    pub unwind_to: Option<BlockNumber>,
}

/// Plan one iteration from the execution cursor.
pub fn plan_iteration(
    progress: BlockNumber,
    stop: BlockNumber,
    depth: u64,
    step: u64,
) -> IterationPlan {
    let raw = progress.saturating_add(step);
    let (target, clipped) = if raw > stop { (stop, true) } else { (raw, false) };
    let depth = if clipped { 0 } else { depth };
    let unwind_to = (depth > 0 && target == stop).then(|| target.saturating_sub(depth));
    IterationPlan { target, clipped, unwind_to }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The reference trace: stop 10, depth 3, step 5.
    /// Iteration 1 executes 1–5; iteration 2 executes 6–10 and unwinds
    /// to 7; iteration 3 re-executes 8–10 with depth forced to 0.
    #[test]
    fn reference_trace_stop10_d3_s5() {
        let first = plan_iteration(0, 10, 3, 5);
        assert_eq!(first, IterationPlan { target: 5, clipped: false, unwind_to: None });

        let second = plan_iteration(5, 10, 3, 5);
        assert_eq!(second, IterationPlan { target: 10, clipped: false, unwind_to: Some(7) });

        // Depth was forced to 0 by the unwind; the window overshoots
        // and clips to the stop block.
        let third = plan_iteration(7, 10, 0, 5);
        assert_eq!(third, IterationPlan { target: 10, clipped: true, unwind_to: None });
    }

    #[test]
    fn zero_depth_never_unwinds() {
        for progress in [0u64, 5, 9] {
            let plan = plan_iteration(progress, 10, 0, 5);
            assert_eq!(plan.unwind_to, None, "progress {progress}");
        }
    }

    #[test]
    fn depth_equal_to_step_terminates() {
        // D == S: the tail unwind re-executes exactly one window; with
        // depth then zeroed the run cannot oscillate.
        let plan = plan_iteration(5, 10, 5, 5);
        assert_eq!(plan.target, 10);
        assert_eq!(plan.unwind_to, Some(5));

        let after_unwind = plan_iteration(5, 10, 0, 5);
        assert_eq!(after_unwind.target, 10);
        assert_eq!(after_unwind.unwind_to, None);
    }

    #[test]
    fn depth_greater_than_step_unwinds_past_a_window() {
        let plan = plan_iteration(5, 10, 7, 5);
        assert_eq!(plan.target, 10);
        assert_eq!(plan.unwind_to, Some(3));
        // Depth larger than the whole chain saturates at 0.
        let plan = plan_iteration(5, 10, 12, 5);
        assert_eq!(plan.unwind_to, Some(0));
    }

    #[test]
    fn overshoot_clips_and_kills_depth() {
        let plan = plan_iteration(8, 10, 3, 5);
        assert!(plan.clipped);
        assert_eq!(plan.target, 10);
        assert_eq!(plan.unwind_to, None, "a clipped window never unwinds");
    }

    #[test]
    fn intermediate_windows_do_not_unwind() {
        let plan = plan_iteration(0, 100, 3, 5);
        assert_eq!(plan.target, 5);
        assert_eq!(plan.unwind_to, None);
    }

    #[test]
    fn stop_zero_degenerates_to_clipped_noop() {
        let plan = plan_iteration(0, 0, 3, 5);
        assert_eq!(plan.target, 0);
        assert!(plan.clipped);
        assert_eq!(plan.unwind_to, None);
    }

    proptest::proptest! {
        /// Simulating the synchronizer's cursor over the planner must
        /// terminate at the stop block for every (stop, depth, step).
        #[test]
        fn planner_always_terminates(
            stop in 0u64..60,
            depth in 0u64..20,
            step in 1u64..12,
        ) {
            let mut progress = 0u64;
            let mut depth = depth;
            let mut iterations = 0u32;
            loop {
                if progress >= stop && depth == 0 {
                    break;
                }
                let plan = plan_iteration(progress, stop, depth, step);
                if plan.clipped {
                    depth = 0;
                }
                progress = plan.target;
                if let Some(to) = plan.unwind_to {
                    progress = to;
                    depth = 0;
                }
                iterations += 1;
                proptest::prop_assert!(iterations < 1_000, "diverged");
            }
            proptest::prop_assert_eq!(progress, stop);
        }
    }
}
