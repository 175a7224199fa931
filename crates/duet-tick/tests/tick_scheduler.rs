//! Integration tests for the interval tick scheduler.
//!
//! Uses `start_paused` tokio time so `sleep_until` resolves instantly
//! when the virtual clock advances, keeping the tests deterministic.

use std::time::Duration;

use duet_tick::{TickConfig, TickScheduler};

// =========================================================================
// TickConfig
// =========================================================================

#[test]
fn test_default_config_is_disabled() {
    let cfg = TickConfig::default();
    assert!(!cfg.enabled);
}

#[test]
fn test_every_ms_sets_interval() {
    let cfg = TickConfig::every_ms(50);
    assert!(cfg.enabled);
    assert_eq!(cfg.interval, Duration::from_millis(50));
}

#[test]
fn test_validated_clamps_zero_interval() {
    let cfg = TickConfig::every_ms(0).validated();
    assert_eq!(cfg.interval, Duration::from_millis(1));
}

// =========================================================================
// Start / stop gating
// =========================================================================

#[test]
fn test_scheduler_starts_stopped() {
    let s = TickScheduler::new(TickConfig::every_ms(50));
    assert!(!s.is_running());
    assert!(s.is_enabled());
    assert_eq!(s.tick_count(), 0);
}

#[test]
fn test_start_is_noop_when_disabled() {
    let mut s = TickScheduler::new(TickConfig::disabled());
    s.start();
    assert!(!s.is_running());
}

#[test]
fn test_stop_is_idempotent() {
    let mut s = TickScheduler::new(TickConfig::every_ms(50));
    s.start();
    s.stop();
    s.stop();
    assert!(!s.is_running());
}

// =========================================================================
// Tick firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_fires_after_interval() {
    let mut s = TickScheduler::new(TickConfig::every_ms(50));
    s.start();

    let info = s.wait_for_tick().await;
    assert_eq!(info.tick, 1);
    assert!((info.dt_seconds - 0.05).abs() < 1e-6);
    assert_eq!(s.tick_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ticks_increment_monotonically() {
    let mut s = TickScheduler::new(TickConfig::every_ms(10));
    s.start();

    for expected in 1..=5 {
        let info = s.wait_for_tick().await;
        assert_eq!(info.tick, expected);
    }
    assert_eq!(s.tick_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_dt_reflects_elapsed_time() {
    let mut s = TickScheduler::new(TickConfig::every_ms(20));
    s.start();

    // Back-to-back ticks at the nominal cadence.
    let first = s.wait_for_tick().await;
    let second = s.wait_for_tick().await;
    assert!((first.dt_seconds - 0.02).abs() < 1e-6);
    assert!((second.dt_seconds - 0.02).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn test_wait_pends_forever_when_stopped() {
    let mut s = TickScheduler::new(TickConfig::every_ms(10));
    // Never started: waiting must not resolve no matter how far the
    // clock advances.
    let result = tokio::time::timeout(
        Duration::from_secs(60),
        s.wait_for_tick(),
    )
    .await;
    assert!(result.is_err(), "stopped scheduler must never tick");
}

#[tokio::test(start_paused = true)]
async fn test_wait_pends_forever_when_disabled() {
    let mut s = TickScheduler::new(TickConfig::disabled());
    s.start();
    let result = tokio::time::timeout(
        Duration::from_secs(60),
        s.wait_for_tick(),
    )
    .await;
    assert!(result.is_err(), "disabled scheduler must never tick");
}

#[tokio::test(start_paused = true)]
async fn test_stop_prevents_further_ticks() {
    let mut s = TickScheduler::new(TickConfig::every_ms(10));
    s.start();
    s.wait_for_tick().await;

    s.stop();
    let result = tokio::time::timeout(
        Duration::from_secs(1),
        s.wait_for_tick(),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_restart_resets_dt_base() {
    let mut s = TickScheduler::new(TickConfig::every_ms(10));
    s.start();
    s.wait_for_tick().await;
    s.stop();

    // A long pause between stop and restart must not leak into dt.
    tokio::time::advance(Duration::from_secs(30)).await;
    s.start();
    let info = s.wait_for_tick().await;
    assert!(info.dt_seconds < 0.02, "dt should restart at the interval, got {}", info.dt_seconds);
}

#[tokio::test(start_paused = true)]
async fn test_metrics_count_ticks() {
    let mut s = TickScheduler::new(TickConfig::every_ms(10));
    s.start();
    for _ in 0..3 {
        s.wait_for_tick().await;
        s.record_tick_end();
    }
    assert_eq!(s.metrics().total_ticks, 3);
}
