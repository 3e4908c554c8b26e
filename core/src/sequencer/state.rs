use crate::animation::AnimationSignal;

/// Identifies one enqueued timeline. Strictly increasing per [`super::Sequencer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub(crate) u64);

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "#{}", self.0) }
}

/// Derived from the timeline; never stored on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Phase {
    Idle,
    Executing,
    AwaitingSignal,
}

/// Observable view of the sequencer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerSnapshot {
    pub phase: Phase,
    /// The most recently enqueued timeline (it may have finished already)
    pub generation: Generation,
    pub current_step_index: usize,
    pub len: usize,
    pub waiting_for: Option<AnimationSignal>,
    pub has_pending_cleanup: bool,
    pub last_received: Option<AnimationSignal>,
}

impl SequencerSnapshot {
    pub fn is_idle(&self) -> bool { self.phase == Phase::Idle }
}

impl Default for SequencerSnapshot {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            generation: Generation::default(),
            current_step_index: 0,
            len: 0,
            waiting_for: None,
            has_pending_cleanup: false,
            last_received: None,
        }
    }
}
