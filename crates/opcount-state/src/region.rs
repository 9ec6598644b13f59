//! Per-thread region activation gate.
//!
//! Each thread starts inactive. The gate form is fixed for the process:
//!
//! - `Open`: whole-program counting, always active, transitions ignored.
//! - `Flag`: edge-triggered. Activate sets it, deactivate clears it. Used by
//!   marker regions and by the first-return address trigger.
//! - `Depth`: nesting-safe. Entering the bound routine increments the depth,
//!   exiting decrements it; active while depth > 0.

/// Which gate a thread gets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GateKind {
    Open,
    Flag,
    Depth,
}

/// Event applied to a gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegionAction {
    /// Start marker entered, or target address reached.
    Activate,
    /// Stop marker about to return, or a return while active.
    Deactivate,
    /// Bound routine entered.
    Enter,
    /// Bound routine exited.
    Exit,
}

/// Region state of one thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionGate {
    Open,
    Flag { active: bool },
    Depth { depth: u32 },
}

impl RegionGate {
    /// Initial state for a new thread.
    #[must_use]
    pub const fn new(kind: GateKind) -> Self {
        match kind {
            GateKind::Open => Self::Open,
            GateKind::Flag => Self::Flag { active: false },
            GateKind::Depth => Self::Depth { depth: 0 },
        }
    }

    #[must_use]
    pub const fn kind(&self) -> GateKind {
        match self {
            Self::Open => GateKind::Open,
            Self::Flag { .. } => GateKind::Flag,
            Self::Depth { .. } => GateKind::Depth,
        }
    }

    /// Whether events are counted right now.
    #[inline(always)]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        match *self {
            Self::Open => true,
            Self::Flag { active } => active,
            Self::Depth { depth } => depth > 0,
        }
    }

    /// Apply a transition. Returns true if the active state changed.
    ///
    /// A flag gate treats `Enter`/`Exit` as `Activate`/`Deactivate`; a depth
    /// gate treats `Activate`/`Deactivate` as `Enter`/`Exit`. Exits below
    /// depth zero are ignored.
    pub fn apply(&mut self, action: RegionAction) -> bool {
        let was_active = self.is_active();
        match self {
            Self::Open => {}
            Self::Flag { active } => {
                *active = matches!(action, RegionAction::Activate | RegionAction::Enter);
            }
            Self::Depth { depth } => match action {
                RegionAction::Activate | RegionAction::Enter => {
                    *depth = depth.saturating_add(1);
                }
                RegionAction::Deactivate | RegionAction::Exit => {
                    *depth = depth.saturating_sub(1);
                }
            },
        }
        was_active != self.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_ignores_transitions() {
        let mut gate = RegionGate::new(GateKind::Open);
        assert!(gate.is_active());
        assert!(!gate.apply(RegionAction::Deactivate));
        assert!(!gate.apply(RegionAction::Exit));
        assert!(gate.is_active());
    }

    #[test]
    fn test_flag_toggles() {
        let mut gate = RegionGate::new(GateKind::Flag);
        assert!(!gate.is_active());
        assert!(gate.apply(RegionAction::Activate));
        assert!(!gate.apply(RegionAction::Activate));
        assert!(gate.is_active());
        assert!(gate.apply(RegionAction::Deactivate));
        assert!(!gate.apply(RegionAction::Deactivate));
        assert!(!gate.is_active());
    }

    #[test]
    fn test_flag_closes_on_first_return() {
        // Nested call inside the region: the first return closes it.
        let mut gate = RegionGate::new(GateKind::Flag);
        gate.apply(RegionAction::Activate);
        gate.apply(RegionAction::Deactivate);
        assert!(!gate.is_active());
    }

    #[test]
    fn test_depth_reentrant() {
        let mut gate = RegionGate::new(GateKind::Depth);
        assert!(gate.apply(RegionAction::Enter));
        assert!(gate.is_active());
        assert!(!gate.apply(RegionAction::Enter));
        assert!(!gate.apply(RegionAction::Exit));
        assert!(gate.is_active(), "inner exit must not close the region");
        assert!(gate.apply(RegionAction::Exit));
        assert!(!gate.is_active());
    }

    #[test]
    fn test_depth_ignores_unmatched_exit() {
        let mut gate = RegionGate::new(GateKind::Depth);
        assert!(!gate.apply(RegionAction::Exit));
        assert_eq!(gate, RegionGate::Depth { depth: 0 });
        gate.apply(RegionAction::Enter);
        assert!(gate.is_active());
    }
}
