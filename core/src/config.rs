use std::time::Duration;

/// How long a step may wait for its completion signal before it is forced onward
pub const DEFAULT_SIGNAL_WATCHDOG: Duration = Duration::from_secs(15);
/// Delay before a newly created card is revealed, so it does not land mid-way through another card's animation
pub const DEFAULT_REVEAL_GRACE: Duration = Duration::from_millis(2500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerConfig {
    /// `None` disables the watchdog: a step whose signal never arrives then blocks the
    /// timeline until it is stopped.
    pub signal_watchdog: Option<Duration>,
}

impl Default for SequencerConfig {
    fn default() -> Self { Self { signal_watchdog: Some(DEFAULT_SIGNAL_WATCHDOG) } }
}

impl SequencerConfig {
    pub fn without_watchdog() -> Self { Self { signal_watchdog: None } }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub reveal_grace: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self { Self { reveal_grace: DEFAULT_REVEAL_GRACE } }
}

/// Reconnect pacing for push transports. The delay doubles after every failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self { Self { initial_backoff: Duration::from_secs(1), max_backoff: Duration::from_secs(30) } }
}

impl TransportConfig {
    pub fn next_backoff(&self, current: Duration) -> Duration { (current * 2).min(self.max_backoff) }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletConfig {
    pub sequencer: SequencerConfig,
    pub router: RouterConfig,
    pub transport: TransportConfig,
}
