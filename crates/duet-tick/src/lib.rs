//! Interval tick scheduler for duet session runtimes.
//!
//! Drives the per-session tick loop: while a session is in its playing
//! phase the scheduler fires every `interval`, and while it is stopped
//! (or the application never enabled ticking) [`TickScheduler::wait_for_tick`]
//! pends forever — the correct behavior inside a `tokio::select!` loop
//! that must keep servicing commands.
//!
//! # Integration
//!
//! The scheduler sits inside the session actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         info = scheduler.wait_for_tick() => {
//!             runtime.tick(info.dt_seconds);
//!             scheduler.record_tick_end();
//!         }
//!     }
//!     if runtime.phase() == SessionPhase::Playing {
//!         scheduler.start();
//!     } else {
//!         scheduler.stop();
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tick loop configuration for one session.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Whether the application wants a tick loop at all.
    pub enabled: bool,
    /// Time between ticks while the loop is running.
    pub interval: Duration,
}

impl TickConfig {
    /// Fallback interval used when a config is built without one.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);

    /// A config with no tick loop. `wait_for_tick` will pend forever.
    pub fn disabled() -> Self {
        Self { enabled: false, interval: Self::DEFAULT_INTERVAL }
    }

    /// An enabled config firing every `ms` milliseconds.
    pub fn every_ms(ms: u64) -> Self {
        Self { enabled: true, interval: Duration::from_millis(ms) }
    }

    /// Clamps out-of-range values so the config is safe to use.
    /// A zero interval is raised to 1 ms.
    pub fn validated(mut self) -> Self {
        if self.enabled && self.interval.is_zero() {
            warn!("tick interval of zero — clamping to 1ms");
            self.interval = Duration::from_millis(1);
        }
        self
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

// ---------------------------------------------------------------------------
// Tick info and metrics
// ---------------------------------------------------------------------------

/// Information about a fired tick, returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// Seconds elapsed since the previous tick fired (or since the loop
    /// started, for the first tick). Wall-clock, not the nominal interval,
    /// so application simulation stays honest under scheduling delay.
    pub dt_seconds: f64,
}

/// Runtime metrics for the tick loop.
///
/// Timing values refer to the application's tick execution time reported
/// via [`TickScheduler::record_tick_end`].
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    /// Total ticks fired.
    pub total_ticks: u64,
    /// Maximum tick execution time observed.
    pub max_tick_time: Duration,
    /// Exponential moving average of tick execution time (α = 0.1).
    pub avg_tick_time: Duration,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The interval tick scheduler. One per session actor.
pub struct TickScheduler {
    config: TickConfig,
    running: bool,
    tick_count: u64,
    /// When the next tick should fire; `None` while stopped.
    next_tick: Option<TokioInstant>,
    /// When the previous tick fired; the base of the next `dt`.
    last_tick: Option<TokioInstant>,
    /// Wall-clock instant when the current tick's application work began.
    /// Set by `wait_for_tick`, consumed by `record_tick_end`.
    tick_start: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// Creates a scheduler from a validated config. The loop starts
    /// stopped; call [`start`](Self::start) when the session enters play.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        if config.enabled {
            debug!(interval_ms = config.interval.as_millis() as u64, "tick scheduler created");
        } else {
            debug!("tick scheduler created in event-driven mode (no tick loop)");
        }
        Self {
            config,
            running: false,
            tick_count: 0,
            next_tick: None,
            last_tick: None,
            tick_start: None,
            metrics: TickMetrics::default(),
        }
    }

    /// Starts the loop. The first tick fires one interval from now.
    /// No-op when already running or when ticking is disabled.
    pub fn start(&mut self) {
        if !self.config.enabled || self.running {
            return;
        }
        let now = TokioInstant::now();
        self.running = true;
        self.last_tick = Some(now);
        self.next_tick = Some(now + self.config.interval);
        debug!(tick = self.tick_count, "tick loop started");
    }

    /// Stops the loop. Idempotent. An in-flight `wait_for_tick` that has
    /// already resolved completes normally; no new tick is scheduled.
    pub fn stop(&mut self) {
        if self.running {
            self.running = false;
            self.next_tick = None;
            self.last_tick = None;
            self.tick_start = None;
            debug!(tick = self.tick_count, "tick loop stopped");
        }
    }

    /// Waits until the next tick is due.
    ///
    /// While stopped or disabled this future pends forever — inside
    /// `tokio::select!` the other branches still run. Cancel-safe: no
    /// state changes happen until the deadline has actually elapsed.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let Some(next) = self.next_tick.filter(|_| self.running) else {
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        let dt_seconds = self
            .last_tick
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .unwrap_or_default();
        self.last_tick = Some(now);
        // Schedule from now, not from the missed deadline, so a slow tick
        // cannot snowball into a backlog.
        self.next_tick = Some(now + self.config.interval);
        self.tick_start = Some(Instant::now());
        self.metrics.total_ticks += 1;

        trace!(tick = self.tick_count, dt_seconds, "tick fired");

        TickInfo { tick: self.tick_count, dt_seconds }
    }

    /// Records that the application work for the current tick finished.
    ///
    /// Feeds the budget warnings and metrics. If never called, budget
    /// warnings won't fire.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        let budget = self.config.interval;
        let utilization = elapsed.as_secs_f64() / budget.as_secs_f64();

        if utilization >= 1.0 {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                interval_ms = budget.as_secs_f64() * 1000.0,
                "tick exceeded its interval"
            );
        } else if utilization >= 0.8 {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                interval_ms = budget.as_secs_f64() * 1000.0,
                "tick approaching its interval"
            );
        }

        if elapsed > self.metrics.max_tick_time {
            self.metrics.max_tick_time = elapsed;
        }
        let alpha = 0.1;
        let prev = self.metrics.avg_tick_time.as_secs_f64();
        self.metrics.avg_tick_time =
            Duration::from_secs_f64(prev * (1.0 - alpha) + elapsed.as_secs_f64() * alpha);
    }

    /// Whether the loop is currently running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether ticking is enabled at all for this session.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Total ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The configured interval.
    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Snapshot of current metrics.
    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }
}
