//! Session client for duet.
//!
//! The browser-side mirror of the session runtime, for native (tokio)
//! participants — bots, test harnesses, and terminal clients. It owns
//! the socket, tracks the session phase and latched identity, signals
//! ready / play-again, and demultiplexes framework frames from
//! application messages:
//!
//! ```rust,ignore
//! use duet_client::{ClientConfig, SessionClient, SessionEvent};
//!
//! let (client, mut events) = SessionClient::connect(ClientConfig::new("ws://host:3001"));
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::SessionJoin { participant_number, .. } => {
//!             println!("joined as participant {participant_number}");
//!             client.send_ready();
//!         }
//!         SessionEvent::App(message) => { /* application traffic */ }
//!         _ => {}
//!     }
//! }
//! ```

mod client;
mod event;

pub use client::{ClientConfig, ReconnectConfig, SessionClient};
pub use event::{ConnectionState, SessionEvent};
