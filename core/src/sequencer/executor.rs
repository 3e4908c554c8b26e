use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use punchcard_signals::{Mut, Read};
use tokio::{
    select,
    sync::mpsc,
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, info, warn};

use super::{Generation, SequenceItem, SequencerSnapshot, StepToken, Timeline, Wake};
use crate::{animation::AnimationSignal, config::SequencerConfig};

type Builder = Box<dyn FnOnce() -> Vec<SequenceItem> + Send + 'static>;

enum Command {
    Enqueue { generation: Generation, build: Builder },
    Signal(AnimationSignal),
    Stop,
    Shutdown,
}

struct Inner {
    commands: mpsc::UnboundedSender<Command>,
    state: Read<SequencerSnapshot>,
    next_generation: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the sequencer task. Cheap to clone; every clone drives the same timeline.
///
/// All methods are non-blocking: they hand a command to the task, which applies commands
/// one at a time in the order they were sent. The task is the only writer of the timeline.
#[derive(Clone)]
pub struct Sequencer {
    inner: Arc<Inner>,
}

impl Sequencer {
    /// Spawns the sequencer task. Must be called from within a tokio runtime.
    pub fn new(config: SequencerConfig) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let state = Mut::new(SequencerSnapshot::default());
        let reader = state.read();
        let task = tokio::spawn(run(rx, state, config));

        Self { inner: Arc::new(Inner { commands, state: reader, next_generation: AtomicU64::new(0), task: Mutex::new(Some(task)) }) }
    }

    /// Replaces the current timeline with `items`
    pub fn enqueue(&self, items: Vec<SequenceItem>) -> Generation { self.enqueue_with(move || items) }

    /// Replaces the current timeline with the items returned by `build`.
    ///
    /// `build` runs on the sequencer task right before the timeline is swapped, so it sees
    /// every effect and cleanup that ran before it.
    pub fn enqueue_with(&self, build: impl FnOnce() -> Vec<SequenceItem> + Send + 'static) -> Generation {
        let generation = Generation(self.inner.next_generation.fetch_add(1, Ordering::AcqRel) + 1);
        self.send(Command::Enqueue { generation, build: Box::new(build) });
        generation
    }

    pub fn signal(&self, signal: AnimationSignal) { self.send(Command::Signal(signal)) }

    /// Signals by name, as reported by the presentation. Unknown names are dropped.
    pub fn dispatch(&self, name: &str) -> bool {
        match AnimationSignal::parse(name) {
            Some(signal) => {
                self.signal(signal);
                true
            }
            None => {
                debug!("dropping unknown signal {:?}", name);
                false
            }
        }
    }

    /// Resets to idle, discarding the current timeline and any armed timer
    pub fn stop(&self) { self.send(Command::Stop) }

    pub fn state(&self) -> Read<SequencerSnapshot> { self.inner.state.clone() }

    /// Resolves once the timeline `generation` (or a later one) has run to completion or been stopped
    pub async fn wait_settled(&self, generation: Generation) {
        self.inner.state.wait_for(move |s| s.is_idle() && s.generation >= generation).await
    }

    /// Resolves once the timeline enqueued most recently from this handle (if any) has settled
    pub async fn wait_idle(&self) {
        let generation = Generation(self.inner.next_generation.load(Ordering::Acquire));
        self.wait_settled(generation).await
    }

    /// Stops the task after it has applied every command sent before this call
    pub async fn shutdown(&self) {
        let task = self.inner.task.lock().ok().and_then(|mut task| task.take());
        if let Some(task) = task {
            self.send(Command::Shutdown);
            if let Err(e) = task.await {
                warn!("sequencer task join error during shutdown: {}", e);
            }
        }
    }

    fn send(&self, command: Command) {
        if self.inner.commands.send(command).is_err() {
            debug!("sequencer task has stopped; command dropped");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().ok().and_then(|task| task.take()) {
            task.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    Timer,
    Watchdog,
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    token: StepToken,
    kind: Deadline,
    at: Instant,
}

async fn run(mut commands: mpsc::UnboundedReceiver<Command>, state: Mut<SequencerSnapshot>, config: SequencerConfig) {
    let mut timeline = Timeline::new();
    let mut armed: Option<Armed> = None;
    info!("sequencer started");

    loop {
        let deadline = armed.map(|a| a.at);
        let wake = select! {
            command = commands.recv() => match command {
                None | Some(Command::Shutdown) => break,
                Some(Command::Enqueue { generation, build }) => {
                    let items = build();
                    debug!("enqueue timeline {} with {} steps", generation, items.len());
                    Some(timeline.enqueue(generation, items))
                }
                Some(Command::Signal(signal)) => timeline.signal(signal),
                Some(Command::Stop) => {
                    timeline.stop();
                    Some(Wake::Idle)
                }
            },
            _ = async {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            } => match armed.take() {
                Some(Armed { token, kind: Deadline::Timer, .. }) => timeline.timer_elapsed(token),
                Some(Armed { token, kind: Deadline::Watchdog, .. }) => timeline.watchdog_elapsed(token),
                None => None,
            },
        };

        if let Some(wake) = wake {
            armed = rearm(armed, wake, &config);
        }
        state.set_if_changed(timeline.snapshot());
    }

    timeline.stop();
    state.set_if_changed(timeline.snapshot());
    info!("sequencer stopped");
}

/// Arms the deadline `wake` asks for. A deadline already armed for the same visit is kept,
/// so re-evaluating a step never restarts its clock.
fn rearm(current: Option<Armed>, wake: Wake, config: &SequencerConfig) -> Option<Armed> {
    let (token, kind, duration) = match wake {
        Wake::Idle => return None,
        Wake::Timer { token, duration } => (token, Deadline::Timer, duration),
        Wake::Signal { token, guarded: true, .. } => (token, Deadline::Watchdog, config.signal_watchdog?),
        Wake::Signal { guarded: false, .. } => return None,
    };
    match current {
        Some(armed) if armed.token == token && armed.kind == kind => Some(armed),
        _ => Some(Armed { token, kind, at: Instant::now() + duration }),
    }
}
