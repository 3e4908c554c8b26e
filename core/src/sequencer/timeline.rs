use std::time::Duration;

use tracing::{debug, warn};

use super::{Effect, Generation, Phase, SequenceItem, SequencerSnapshot};
use crate::animation::AnimationSignal;

/// Identity of one visit to one step. Timer callbacks carry the token they were armed
/// with so that a late callback cannot move a newer timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepToken {
    pub generation: Generation,
    pub index: usize,
}

/// What the timeline is blocked on after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Idle,
    /// Call [`Timeline::timer_elapsed`] with `token` once `duration` has passed
    Timer { token: StepToken, duration: Duration },
    /// Waiting for `expected`. `guarded` steps may be forced on by [`Timeline::watchdog_elapsed`].
    Signal { token: StepToken, expected: AnimationSignal, guarded: bool },
}

/// The sequencer state machine. Synchronous and clock-free: the caller decides when
/// timers fire.
pub struct Timeline {
    sequence: Vec<SequenceItem>,
    current_step_index: usize,
    is_running: bool,
    waiting_for: Option<AnimationSignal>,
    pending_cleanup: Option<Effect>,
    last_received: Option<AnimationSignal>,
    generation: Generation,
    // the visit whose effect has already run
    entered: Option<StepToken>,
}

impl Default for Timeline {
    fn default() -> Self { Self::new() }
}

impl Timeline {
    pub fn new() -> Self {
        Self {
            sequence: Vec::new(),
            current_step_index: 0,
            is_running: false,
            waiting_for: None,
            pending_cleanup: None,
            last_received: None,
            generation: Generation::default(),
            entered: None,
        }
    }

    /// Replaces whatever is running with `items` and starts at the first step
    pub fn enqueue(&mut self, generation: Generation, items: Vec<SequenceItem>) -> Wake {
        if self.is_running {
            debug!("timeline {} replaced by {} at step {}/{}", self.generation, generation, self.current_step_index, self.sequence.len());
        }
        self.reset();
        self.generation = generation;
        self.sequence = items;
        self.is_running = !self.sequence.is_empty();
        self.reevaluate()
    }

    /// Drives the timeline as far as it can go without outside input.
    ///
    /// Safe to call any number of times: a step's effect runs only on the first
    /// evaluation of each visit.
    pub fn reevaluate(&mut self) -> Wake {
        loop {
            if !self.is_running {
                return Wake::Idle;
            }
            if self.current_step_index >= self.sequence.len() {
                debug!("timeline {} finished", self.generation);
                self.reset();
                return Wake::Idle;
            }

            let token = self.token();
            let item = self.sequence[self.current_step_index].clone();

            if let Some(expected) = self.waiting_for {
                return Wake::Signal { token, expected, guarded: matches!(item, SequenceItem::Action(_)) };
            }

            match item {
                SequenceItem::Action(step) => {
                    if self.entered == Some(token) {
                        self.current_step_index += 1;
                        continue;
                    }
                    self.entered = Some(token);
                    let succeeded = run(step.label(), "effect", &step.effect);
                    match step.wait_for {
                        Some(expected) if succeeded => {
                            self.waiting_for = Some(expected);
                            self.pending_cleanup = step.cleanup;
                            return Wake::Signal { token, expected, guarded: true };
                        }
                        Some(_) => {
                            // nothing is playing, so nothing will signal; undo and move on
                            if let Some(cleanup) = &step.cleanup {
                                run(step.label(), "cleanup", cleanup);
                            }
                            self.current_step_index += 1;
                        }
                        None => self.current_step_index += 1,
                    }
                }
                SequenceItem::TimedWait(duration) => return Wake::Timer { token, duration },
                SequenceItem::EventWait(expected) => {
                    self.waiting_for = Some(expected);
                    return Wake::Signal { token, expected, guarded: false };
                }
            }
        }
    }

    /// Offers a signal to the timeline. Returns `None` when it did not match the awaited
    /// signal; the signal is then discarded and nothing but `last_received` changes.
    pub fn signal(&mut self, signal: AnimationSignal) -> Option<Wake> {
        self.last_received = Some(signal);
        match self.waiting_for {
            Some(expected) if expected == signal => {
                debug!("timeline {} step {} received {}", self.generation, self.current_step_index, signal);
                self.finish_waiting_step();
                Some(self.reevaluate())
            }
            Some(expected) => {
                debug!("ignoring {} while waiting for {}", signal, expected);
                None
            }
            None => {
                debug!("ignoring {}: nothing is waiting", signal);
                None
            }
        }
    }

    pub fn timer_elapsed(&mut self, token: StepToken) -> Option<Wake> {
        let current = self.is_running && token == self.token();
        if !current || !matches!(self.sequence.get(self.current_step_index), Some(SequenceItem::TimedWait(_))) {
            debug!("stale timer for {:?} ignored", token);
            return None;
        }
        self.current_step_index += 1;
        Some(self.reevaluate())
    }

    /// Forces a step that has waited too long for its signal to complete
    pub fn watchdog_elapsed(&mut self, token: StepToken) -> Option<Wake> {
        let expected = self.waiting_for?;
        let Some(SequenceItem::Action(step)) = self.sequence.get(self.current_step_index) else {
            return None;
        };
        if token != self.token() {
            return None;
        }
        warn!(step = step.label(), "{} never arrived; forcing timeline {} on", expected, self.generation);
        self.finish_waiting_step();
        Some(self.reevaluate())
    }

    /// Hard reset to idle, from any state
    pub fn stop(&mut self) {
        if self.is_running {
            debug!("timeline {} stopped at step {}", self.generation, self.current_step_index);
        }
        self.reset();
    }

    pub fn snapshot(&self) -> SequencerSnapshot {
        let phase = match (self.is_running, self.waiting_for) {
            (false, _) => Phase::Idle,
            (true, Some(_)) => Phase::AwaitingSignal,
            (true, None) => Phase::Executing,
        };
        SequencerSnapshot {
            phase,
            generation: self.generation,
            current_step_index: self.current_step_index,
            len: self.sequence.len(),
            waiting_for: self.waiting_for,
            has_pending_cleanup: self.pending_cleanup.is_some(),
            last_received: self.last_received,
        }
    }

    fn finish_waiting_step(&mut self) {
        self.waiting_for = None;
        if let Some(cleanup) = self.pending_cleanup.take() {
            let label = match self.sequence.get(self.current_step_index) {
                Some(SequenceItem::Action(step)) => step.label().to_string(),
                _ => String::new(),
            };
            run(&label, "cleanup", &cleanup);
        }
        self.current_step_index += 1;
    }

    fn reset(&mut self) {
        self.sequence.clear();
        self.current_step_index = 0;
        self.is_running = false;
        self.waiting_for = None;
        self.pending_cleanup = None;
        self.entered = None;
    }

    fn token(&self) -> StepToken { StepToken { generation: self.generation, index: self.current_step_index } }
}

fn run(label: &str, what: &str, effect: &Effect) -> bool {
    match effect() {
        Ok(()) => true,
        Err(e) => {
            warn!(step = label, "{} failed, continuing: {}", what, e);
            false
        }
    }
}
