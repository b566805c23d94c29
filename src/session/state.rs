//! Sensor session state machine.

/// Lifecycle state of a sensor session.
///
/// States only move forward, one step at a time. There is no way back to an
/// earlier state; a session that fails during startup is dropped instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No device handle yet.
    #[default]
    Unopened,
    /// Serial device is open, sensor mode unknown.
    Opened,
    /// Sensor confirmed passive mode.
    PassiveConfirmed,
    /// Sensor cycle matches the configured cycle.
    CycleReconciled,
    /// Sensor switched to active reporting.
    Active,
    /// Measurement loop owns the session.
    Running,
}

impl SessionState {
    /// The only state this one may move to.
    pub fn next(&self) -> Option<SessionState> {
        use SessionState::*;
        match self {
            Unopened => Some(Opened),
            Opened => Some(PassiveConfirmed),
            PassiveConfirmed => Some(CycleReconciled),
            CycleReconciled => Some(Active),
            Active => Some(Running),
            Running => None,
        }
    }

    /// Check if transition to target state is valid.
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        self.next() == Some(target)
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::ExporterError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Running)
    }
}
