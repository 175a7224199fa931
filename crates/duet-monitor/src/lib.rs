//! Inactivity watchdog for duet session processes.
//!
//! A session process is short-lived by design: the lobby spawns it, two
//! participants play, and the process should go away once nobody needs
//! it. The monitor watches three signals — whether anyone ever connected,
//! how many connections are live, and when the last activity happened —
//! and fires a one-shot shutdown signal when the process has been idle
//! for the configured timeout:
//!
//! - **cold start** — nobody ever connected since launch
//! - **emptied** — everyone left and nobody came back
//! - **idle** — connections exist but nothing has happened
//!
//! Streaming message kinds (continuous hand-position updates and the
//! like) can be excluded from the activity signal through the ignore
//! set, so a session with two idle-but-connected humans still times out.
//!
//! All timing uses `tokio::time`, so tests drive the monitor with the
//! paused virtual clock.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{self, Instant};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Watchdog configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How long the process may be idle before shutdown.
    pub timeout: Duration,
    /// How often the conditions are checked. The shutdown signal fires
    /// within `[timeout, timeout + check_interval]` of the triggering
    /// idleness.
    pub check_interval: Duration,
    /// Message kinds that do not count as activity.
    pub ignored_kinds: HashSet<String>,
}

impl MonitorConfig {
    /// Default idle timeout: five minutes.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300_000);
    /// Default check cadence: thirty seconds.
    pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(30_000);

    /// Config with the default timeout and cadence and an empty ignore set.
    pub fn new() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            check_interval: Self::DEFAULT_CHECK_INTERVAL,
            ignored_kinds: HashSet::new(),
        }
    }

    /// Overrides the idle timeout.
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout = Duration::from_millis(ms);
        self
    }

    /// Overrides the check cadence.
    pub fn check_interval_ms(mut self, ms: u64) -> Self {
        self.check_interval = Duration::from_millis(ms);
        self
    }

    /// Adds a message kind to the ignore set.
    pub fn ignore_kind(mut self, kind: impl Into<String>) -> Self {
        self.ignored_kinds.insert(kind.into());
        self
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Shutdown reason
// ---------------------------------------------------------------------------

/// Why the watchdog decided to shut the process down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Nobody ever connected.
    NeverConnected { waited: Duration },
    /// Everyone left and nobody returned.
    Emptied { idle: Duration },
    /// Connections exist but produced no activity.
    Idle { idle: Duration },
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NeverConnected { waited } => write!(
                f,
                "No participants connected within {}s of startup",
                waited.as_secs()
            ),
            Self::Emptied { idle } => write!(
                f,
                "All participants left and none returned for {}s",
                idle.as_secs()
            ),
            Self::Idle { idle } => write!(
                f,
                "No activity from connected participants for {}s",
                idle.as_secs()
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

struct State {
    start: Instant,
    last_activity: Instant,
    connection_count: usize,
    has_ever_connected: bool,
    stopped: bool,
}

impl State {
    /// Evaluates the three shutdown conditions against `now`.
    fn due(&self, now: Instant, timeout: Duration) -> Option<ShutdownReason> {
        let idle = now.saturating_duration_since(self.last_activity);
        let waited = now.saturating_duration_since(self.start);

        if !self.has_ever_connected {
            if waited >= timeout {
                return Some(ShutdownReason::NeverConnected { waited });
            }
            return None;
        }
        if idle < timeout {
            return None;
        }
        if self.connection_count == 0 {
            Some(ShutdownReason::Emptied { idle })
        } else {
            Some(ShutdownReason::Idle { idle })
        }
    }
}

/// Handle to a running watchdog. Cheap to clone; one per process.
#[derive(Clone)]
pub struct InactivityMonitor {
    state: Arc<Mutex<State>>,
    ignored_kinds: Arc<HashSet<String>>,
}

impl InactivityMonitor {
    /// Spawns the watchdog task. The returned receiver resolves at most
    /// once, with the shutdown reason; firing stops the monitor.
    pub fn spawn(config: MonitorConfig) -> (Self, oneshot::Receiver<ShutdownReason>) {
        let now = Instant::now();
        let state = Arc::new(Mutex::new(State {
            start: now,
            last_activity: now,
            connection_count: 0,
            has_ever_connected: false,
            stopped: false,
        }));
        let (fired_tx, fired_rx) = oneshot::channel();

        let monitor = Self {
            state: Arc::clone(&state),
            ignored_kinds: Arc::new(config.ignored_kinds.clone()),
        };
        tokio::spawn(check_loop(config, state, fired_tx));
        (monitor, fired_rx)
    }

    /// Records a new connection. Activity by definition.
    pub fn record_connect(&self) {
        let mut s = self.state.lock().unwrap();
        s.connection_count += 1;
        s.has_ever_connected = true;
        s.last_activity = Instant::now();
        debug!(connections = s.connection_count, "monitor: connection opened");
    }

    /// Records a closed connection. Floored at zero; counts as activity
    /// so the emptied clock starts at the departure, not before it.
    pub fn record_disconnect(&self) {
        let mut s = self.state.lock().unwrap();
        s.connection_count = s.connection_count.saturating_sub(1);
        s.last_activity = Instant::now();
        debug!(connections = s.connection_count, "monitor: connection closed");
    }

    /// Records an inbound message of the given kind. Kinds in the ignore
    /// set (continuous streaming traffic) do not refresh the idle clock.
    pub fn record_activity(&self, kind: &str) {
        if self.ignored_kinds.contains(kind) {
            return;
        }
        self.state.lock().unwrap().last_activity = Instant::now();
    }

    /// Stops the watchdog. Idempotent; the shutdown signal will never
    /// fire after this returns.
    pub fn stop(&self) {
        let mut s = self.state.lock().unwrap();
        if !s.stopped {
            s.stopped = true;
            debug!("monitor stopped");
        }
    }

    /// Current live connection count.
    pub fn connection_count(&self) -> usize {
        self.state.lock().unwrap().connection_count
    }
}

async fn check_loop(
    config: MonitorConfig,
    state: Arc<Mutex<State>>,
    fired: oneshot::Sender<ShutdownReason>,
) {
    // First check one full interval after start, then on cadence.
    let mut ticker = time::interval_at(
        Instant::now() + config.check_interval,
        config.check_interval,
    );

    loop {
        ticker.tick().await;

        let reason = {
            let mut s = state.lock().unwrap();
            if s.stopped {
                return;
            }
            let reason = s.due(Instant::now(), config.timeout);
            if reason.is_some() {
                // Firing is final: stop before signaling.
                s.stopped = true;
            }
            reason
        };

        if let Some(reason) = reason {
            info!(%reason, "inactivity shutdown triggered");
            let _ = fired.send(reason);
            return;
        }
    }
}
