//! Runs one linear timeline of visual steps at a time.
//!
//! A timeline is a `Vec<SequenceItem>`. The [`Sequencer`] executes it strictly in order,
//! advancing on fixed timers or on [`AnimationSignal`]s reported by the presentation.
//! Enqueuing a new timeline replaces the current one; timelines never queue behind each other.
//!
//! The state machine itself lives in [`Timeline`], which is synchronous and knows nothing about
//! time. The [`Sequencer`] owns a `Timeline` on a dedicated task and supplies the clock.

mod executor;
mod state;
mod timeline;

pub use executor::*;
pub use state::*;
pub use timeline::*;

use std::{sync::Arc, time::Duration};

use crate::{animation::AnimationSignal, error::EffectError};

/// Side effect of a step. Runs on the sequencer task and must not block.
pub type Effect = Arc<dyn Fn() -> Result<(), EffectError> + Send + Sync>;

/// Performs an effect once, then either advances immediately or waits for a signal and
/// undoes itself through `cleanup` when that signal arrives.
#[derive(Clone)]
pub struct ActionStep {
    label: String,
    effect: Effect,
    wait_for: Option<AnimationSignal>,
    cleanup: Option<Effect>,
}

impl ActionStep {
    pub fn new(label: impl Into<String>, effect: impl Fn() -> Result<(), EffectError> + Send + Sync + 'static) -> Self {
        Self { label: label.into(), effect: Arc::new(effect), wait_for: None, cleanup: None }
    }

    /// Block the timeline after the effect until `signal` is observed
    pub fn wait_for(mut self, signal: AnimationSignal) -> Self {
        self.wait_for = Some(signal);
        self
    }

    /// Run `cleanup` when the timeline moves past this step after waiting
    pub fn cleanup(mut self, cleanup: impl Fn() -> Result<(), EffectError> + Send + Sync + 'static) -> Self {
        self.cleanup = Some(Arc::new(cleanup));
        self
    }

    pub fn label(&self) -> &str { &self.label }

    pub fn waits_for(&self) -> Option<AnimationSignal> { self.wait_for }
}

impl std::fmt::Debug for ActionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionStep")
            .field("label", &self.label)
            .field("wait_for", &self.wait_for)
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum SequenceItem {
    Action(ActionStep),
    /// Advances once the duration has elapsed, measured from when the step became current
    TimedWait(Duration),
    /// Advances when the signal is observed; has no effect of its own
    EventWait(AnimationSignal),
}

impl SequenceItem {
    pub fn timed_wait_ms(ms: u64) -> Self { SequenceItem::TimedWait(Duration::from_millis(ms)) }
}

impl From<ActionStep> for SequenceItem {
    fn from(step: ActionStep) -> Self { SequenceItem::Action(step) }
}
