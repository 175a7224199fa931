//! Process configuration from the environment.
//!
//! A session process takes no arguments; the lobby configures it
//! entirely through environment variables when it spawns the process:
//!
//! - `PORT` — listen port (default 3001)
//! - `SESSION_ID` — lobby-assigned identifier, uninterpreted
//! - `APP_ID` — which application this process hosts
//! - `LOBBY_URL` — where the client's return link points
//! - `INACTIVITY_TIMEOUT_MS`, `INACTIVITY_CHECK_INTERVAL_MS` — watchdog
//!   overrides, applied only when parseable as positive integers

use std::str::FromStr;

use duet_monitor::MonitorConfig;
use duet_protocol::SessionDescriptor;

/// Server process configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen port.
    pub port: u16,
    /// Lobby-assigned session identifier, surfaced in logs and the
    /// bootstrap descriptor only.
    pub session_id: Option<String>,
    /// Application identifier for the bootstrap descriptor.
    pub app_id: Option<String>,
    /// Lobby URL for the client's return link.
    pub lobby_url: Option<String>,
    /// Inactivity watchdog configuration.
    pub monitor: MonitorConfig,
}

impl ServerConfig {
    /// Default listen port when `PORT` is absent.
    pub const DEFAULT_PORT: u16 = 3001;

    /// Reads configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration from an arbitrary key lookup. Seam for tests;
    /// `from_env` is this over `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut monitor = MonitorConfig::new();
        if let Some(ms) = parse_positive::<u64>(lookup("INACTIVITY_TIMEOUT_MS")) {
            monitor = monitor.timeout_ms(ms);
        }
        if let Some(ms) =
            parse_positive::<u64>(lookup("INACTIVITY_CHECK_INTERVAL_MS"))
        {
            monitor = monitor.check_interval_ms(ms);
        }

        Self {
            port: parse_positive::<u16>(lookup("PORT")).unwrap_or(Self::DEFAULT_PORT),
            session_id: lookup("SESSION_ID"),
            app_id: lookup("APP_ID"),
            lobby_url: lookup("LOBBY_URL"),
            monitor,
        }
    }

    /// The address the listener binds.
    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    /// The bootstrap document to expose as `session.json`, given the
    /// externally visible WebSocket URL.
    pub fn descriptor(&self, ws_url: impl Into<String>) -> SessionDescriptor {
        SessionDescriptor {
            app_id: self.app_id.clone().unwrap_or_default(),
            session_id: self.session_id.clone().unwrap_or_default(),
            ws_url: ws_url.into(),
            lobby_url: self.lobby_url.clone().unwrap_or_default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: Self::DEFAULT_PORT,
            session_id: None,
            app_id: None,
            lobby_url: None,
            monitor: MonitorConfig::new(),
        }
    }
}

/// Parses a positive integer; anything absent, unparseable, or zero is
/// treated as unset.
fn parse_positive<T: FromStr + PartialOrd + Default>(value: Option<String>) -> Option<T> {
    let parsed = value?.trim().parse::<T>().ok()?;
    (parsed > T::default()).then_some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup_from<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        move |key| map.get(key).map(|v| (*v).to_owned())
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = ServerConfig::from_lookup(|_| None);
        assert_eq!(config.port, 3001);
        assert_eq!(config.session_id, None);
        assert_eq!(config.monitor.timeout, MonitorConfig::DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_reads_port_and_identity() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("SESSION_ID", "s-7"),
            ("APP_ID", "gesture-duel"),
            ("LOBBY_URL", "https://lobby.example"),
        ]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.session_id.as_deref(), Some("s-7"));
        assert_eq!(config.app_id.as_deref(), Some("gesture-duel"));
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_monitor_overrides_require_positive_integers() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("INACTIVITY_TIMEOUT_MS", "60000"),
            ("INACTIVITY_CHECK_INTERVAL_MS", "0"),
        ]));
        assert_eq!(config.monitor.timeout, Duration::from_secs(60));
        // Zero is not a positive integer: the default stays.
        assert_eq!(
            config.monitor.check_interval,
            MonitorConfig::DEFAULT_CHECK_INTERVAL
        );
    }

    #[test]
    fn test_unparseable_values_fall_back_to_defaults() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("PORT", "not-a-port"),
            ("INACTIVITY_TIMEOUT_MS", "soon"),
        ]));
        assert_eq!(config.port, 3001);
        assert_eq!(config.monitor.timeout, MonitorConfig::DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_descriptor_carries_identity_and_ws_url() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("SESSION_ID", "s-1"),
            ("APP_ID", "blocks"),
            ("LOBBY_URL", "https://lobby"),
        ]));
        let doc = config.descriptor("ws://host:3001");
        assert_eq!(doc.session_id, "s-1");
        assert_eq!(doc.app_id, "blocks");
        assert_eq!(doc.ws_url, "ws://host:3001");
        assert_eq!(doc.lobby_url, "https://lobby");
    }
}
