//! Reasoner state machine.

/// State of the consensus reasoner.
///
/// `Converged` and `MaxIterationsReached` are both terminal, non-error states: the
/// consensus values present at termination are the result either way, reaching the
/// iteration cap only degrades solution quality.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ReasonerState {
    Initialized,
    Iterating,
    Converged,
    MaxIterationsReached,
}

impl Default for ReasonerState {
    fn default() -> ReasonerState {
        ReasonerState::Initialized
    }
}

impl ReasonerState {
    /// Whether the reasoner reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReasonerState::Converged | ReasonerState::MaxIterationsReached
        )
    }
}
