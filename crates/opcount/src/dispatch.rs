//! Per-execution increment path.
//!
//! Runs once per dynamic instruction. Takes no locks and never allocates:
//! the caller passes the executing thread's own [`ThreadState`].

use opcount_isa::{Bucket, Probe, active_lanes};
use opcount_state::ThreadState;

use crate::engine::{Analysis, RoutineHooks};

/// Count one execution of a classified instruction.
///
/// `mask` is the value of the predicate register for masked SIMD probes;
/// `None` counts every lane. Unmasked probes ignore it.
#[inline(always)]
pub fn execute(state: &mut ThreadState, probe: Probe, mask: Option<u64>) {
    if !state.is_active() {
        return;
    }
    match probe {
        Probe::Count(bucket) => state.add(bucket),
        Probe::Lanes { bucket, lanes } => {
            let active = match bucket {
                Bucket::Simd { masked: true, .. } => active_lanes(lanes, mask),
                _ => u32::from(lanes),
            };
            state.add_lanes(bucket, active);
        }
    }
}

/// Run one analysis attached to an instruction.
#[inline(always)]
pub fn run(state: &mut ThreadState, analysis: &Analysis, mask: Option<u64>) {
    match *analysis {
        Analysis::Region(action) => {
            state.apply(action);
        }
        Analysis::Count(probe) => execute(state, probe, mask),
    }
}

/// Run every analysis of one instruction execution, in order.
#[inline]
pub fn run_all(state: &mut ThreadState, analyses: &[Analysis], mask: Option<u64>) {
    for analysis in analyses {
        run(state, analysis, mask);
    }
}

#[inline]
pub fn enter_routine(state: &mut ThreadState, hooks: &RoutineHooks) {
    if let Some(action) = hooks.entry {
        state.apply(action);
    }
}

#[inline]
pub fn exit_routine(state: &mut ThreadState, hooks: &RoutineHooks) {
    if let Some(action) = hooks.exit {
        state.apply(action);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use opcount_isa::{ArithFamily, Bucket, Locality, SimdFamily};
    use opcount_state::{CounterBlock, GateKind, RegionAction, RegionGate, ThreadId};

    fn state(kind: GateKind) -> ThreadState {
        ThreadState::new(ThreadId(0), Arc::new(CounterBlock::new()), RegionGate::new(kind))
    }

    const ADD_RR: Bucket = Bucket::scalar(ArithFamily::Add, Locality::RegReg);

    #[test]
    fn test_inactive_skips() {
        let mut st = state(GateKind::Flag);
        execute(&mut st, Probe::Count(ADD_RR), None);
        assert_eq!(st.counters().count(ADD_RR), 0);

        st.apply(RegionAction::Activate);
        execute(&mut st, Probe::Count(ADD_RR), None);
        assert_eq!(st.counters().count(ADD_RR), 1);
    }

    #[test]
    fn test_masked_lanes() {
        let mut st = state(GateKind::Open);
        let bucket = Bucket::simd(SimdFamily::AddQ, true);
        let probe = Probe::Lanes { bucket, lanes: 4 };

        execute(&mut st, probe, Some(0b1011));
        assert_eq!(st.counters().count(bucket), 1);
        assert_eq!(st.counters().lane_ops(bucket), 3);

        execute(&mut st, probe, None);
        assert_eq!(st.counters().count(bucket), 2);
        assert_eq!(st.counters().lane_ops(bucket), 7);
    }

    #[test]
    fn test_unmasked_lanes_ignore_mask() {
        let mut st = state(GateKind::Open);
        let bucket = Bucket::simd(SimdFamily::SubQ, false);
        let probe = Probe::Lanes { bucket, lanes: 2 };

        execute(&mut st, probe, Some(0b1));
        execute(&mut st, probe, Some(0));
        assert_eq!(st.counters().count(bucket), 2);
        assert_eq!(st.counters().lane_ops(bucket), 4);
    }

    #[test]
    fn test_region_before_count() {
        let mut st = state(GateKind::Flag);
        let analyses = [
            Analysis::Region(RegionAction::Activate),
            Analysis::Count(Probe::Count(ADD_RR)),
        ];
        run_all(&mut st, &analyses, None);
        assert_eq!(st.counters().count(ADD_RR), 1);
    }

    #[test]
    fn test_routine_hooks_depth() {
        let mut st = state(GateKind::Depth);
        let hooks = RoutineHooks {
            entry: Some(RegionAction::Enter),
            exit: Some(RegionAction::Exit),
        };
        enter_routine(&mut st, &hooks);
        enter_routine(&mut st, &hooks);
        exit_routine(&mut st, &hooks);
        execute(&mut st, Probe::Count(ADD_RR), None);
        exit_routine(&mut st, &hooks);
        execute(&mut st, Probe::Count(ADD_RR), None);
        assert_eq!(st.counters().count(ADD_RR), 1);
    }
}
