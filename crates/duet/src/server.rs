//! `DuetServer` builder and accept loop.
//!
//! One process hosts one session. The server binds the listener, spawns
//! the session actor and the inactivity watchdog, then runs a single
//! loop over three events: an accepted connection, an operator
//! interrupt, or the watchdog firing. Either shutdown path collapses
//! into the same graceful sequence: stop the watchdog, stop the session
//! actor, drop the listener.

use std::net::SocketAddr;

use duet_monitor::{InactivityMonitor, MonitorConfig, ShutdownReason};
use duet_session::{spawn_session, AppHooks, SessionHandle};
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::handler::drive_connection;
use crate::ws::{WsConnection, WsListener};
use crate::{DuetError, ServerConfig};

/// Builder for configuring and starting a duet session server.
///
/// # Example
///
/// ```rust,ignore
/// use duet::prelude::*;
///
/// let server = DuetServer::builder()
///     .config(ServerConfig::from_env())
///     .build(MyApp::default())
///     .await?;
/// server.run().await
/// ```
pub struct DuetServerBuilder {
    config: ServerConfig,
    bind_addr: Option<String>,
}

impl DuetServerBuilder {
    /// Creates a builder with default (non-environment) configuration.
    pub fn new() -> Self {
        Self { config: ServerConfig::default(), bind_addr: None }
    }

    /// Uses the given process configuration (typically
    /// [`ServerConfig::from_env`]).
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the bind address (the config's port is ignored).
    /// Tests bind `127.0.0.1:0`.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = Some(addr.to_owned());
        self
    }

    /// Overrides the watchdog configuration.
    pub fn monitor_config(mut self, monitor: MonitorConfig) -> Self {
        self.config.monitor = monitor;
        self
    }

    /// Binds the listener and spawns the session actor and watchdog.
    pub async fn build<A: AppHooks>(self, hooks: A) -> Result<DuetServer, DuetError> {
        let addr = self.bind_addr.unwrap_or_else(|| self.config.bind_addr());
        let listener = WsListener::bind(&addr).await?;
        let session = spawn_session::<A, WsConnection>(hooks);
        let (monitor, fired) = InactivityMonitor::spawn(self.config.monitor.clone());

        if let Some(session_id) = &self.config.session_id {
            info!(session_id, "session process configured");
        }

        Ok(DuetServer { listener, session, monitor, fired })
    }
}

impl Default for DuetServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running duet session server.
pub struct DuetServer {
    listener: WsListener,
    session: SessionHandle<WsConnection>,
    monitor: InactivityMonitor,
    fired: oneshot::Receiver<ShutdownReason>,
}

impl DuetServer {
    /// Creates a new builder.
    pub fn builder() -> DuetServerBuilder {
        DuetServerBuilder::new()
    }

    /// The bound local address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the session actor, for app-level orchestration.
    pub fn session(&self) -> SessionHandle<WsConnection> {
        self.session.clone()
    }

    /// Runs the accept loop until an operator interrupt or the watchdog
    /// fires, then performs the graceful shutdown sequence. Returns
    /// `Ok(())` for both shutdown paths, so the process exits zero.
    pub async fn run(mut self) -> Result<(), DuetError> {
        info!("duet server running");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((conn, inbound)) => {
                        tokio::spawn(drive_connection(
                            conn,
                            inbound,
                            self.session.clone(),
                            self.monitor.clone(),
                        ));
                    }
                    Err(err) => error!(%err, "accept failed"),
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    break;
                }
                reason = &mut self.fired => {
                    if let Ok(reason) = reason {
                        info!(%reason, "inactivity shutdown");
                    }
                    break;
                }
            }
        }

        self.monitor.stop();
        let _ = self.session.stop().await;
        // The listener closes when `self` drops.
        info!("duet server stopped");
        Ok(())
    }
}
