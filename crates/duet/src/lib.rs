//! # Duet
//!
//! A framework for two-participant, real-time, WebSocket-networked
//! applications: one short-lived server process per session, a browser
//! (or bot) client per participant, and a fixed lifecycle in between —
//! waiting → playing → finished → waiting.
//!
//! Applications implement a single
//! [`AppHooks`](duet_session::AppHooks) trait and the framework handles
//! transport, admission, the ready gate, message routing, the
//! play-again reset protocol, and idle-process shutdown.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use duet::prelude::*;
//!
//! // Implement AppHooks for your application, then:
//! // let server = DuetServer::builder()
//! //     .config(ServerConfig::from_env())
//! //     .build(MyApp::default())
//! //     .await?;
//! // server.run().await
//! ```

mod config;
mod error;
mod handler;
mod server;
mod ws;

pub use config::ServerConfig;
pub use error::DuetError;
pub use server::{DuetServer, DuetServerBuilder};
pub use ws::{WsConnection, WsInbound, WsListener};

/// Re-exports everything an application developer needs.
pub mod prelude {
    // Meta-crate
    pub use crate::{
        DuetError, DuetServer, DuetServerBuilder, ServerConfig, WsConnection,
    };

    // Protocol types
    pub use duet_protocol::{
        ClientFrame, Codec, EndReason, JsonCodec, ParticipantId,
        ParticipantNumber, ProtocolError, ServerFrame, SessionDescriptor,
        SessionPhase,
    };

    // Session types
    pub use duet_session::{
        spawn_session, AppHooks, Connection, JoinPayloads, Outbound,
        Participant, SessionEnd, SessionError, SessionHandle, SessionRuntime,
        Target,
    };

    // Tick loop
    pub use duet_tick::{TickConfig, TickScheduler};

    // Watchdog
    pub use duet_monitor::{InactivityMonitor, MonitorConfig, ShutdownReason};
}
