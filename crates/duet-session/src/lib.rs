//! Session runtime for duet.
//!
//! A session is one conversation between exactly two participants,
//! moving through waiting → playing → finished → waiting. This crate
//! owns the server side of that lifecycle:
//!
//! 1. **Admission** — two slots, lowest vacant number, `welcome` /
//!    `opponent_joined` notification ([`SessionRuntime::handle_connection`])
//! 2. **Ready gate** — the session starts only once both participants
//!    signal readiness (bots are implicitly ready)
//! 3. **Dispatch** — framework frames consumed internally, application
//!    frames routed through [`AppHooks::on_message`]
//! 4. **Reset protocol** — unanimous play-again votes return the session
//!    to waiting
//! 5. **Tick loop** — the application's periodic callback, gated on the
//!    playing phase by the session actor
//!
//! Applications plug in by implementing [`AppHooks`]; the server wrapper
//! binds a transport by implementing [`Connection`] and driving a
//! [`SessionHandle`].

mod connection;
mod error;
mod handle;
mod hooks;
mod participant;
mod runtime;

pub use connection::Connection;
pub use error::SessionError;
pub use handle::{spawn_session, SessionHandle};
pub use hooks::{AppHooks, JoinPayloads, Outbound, SessionEnd, Target};
pub use participant::Participant;
pub use runtime::SessionRuntime;
