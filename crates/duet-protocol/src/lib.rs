//! Wire protocol for duet.
//!
//! This crate defines the "language" that session servers and clients
//! speak:
//!
//! - **Types** ([`ClientFrame`], [`ServerFrame`], [`SessionPhase`],
//!   identity newtypes) — the framework message vocabulary.
//! - **Alias normalization** ([`alias::normalize`]) — the single ingress
//!   pass that rewrites the legacy player-centric vocabulary to canonical
//!   names on both sides.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how messages become
//!   self-delimited text frames.
//! - **Bootstrap** ([`SessionDescriptor`]) — the `session.json` document
//!   a client reads before connecting.
//!
//! The framework vocabulary is closed; applications extend the contract
//! compositionally. Their client messages are any `type` tags outside
//! [`ClientFrame::TYPES`], and their payloads ride opaquely inside the
//! `appData` fields of specific framework frames.

pub mod alias;
mod codec;
mod descriptor;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use descriptor::SessionDescriptor;
pub use error::ProtocolError;
pub use types::{
    ClientFrame, EndReason, ParticipantId, ParticipantNumber, ServerFrame,
    SessionPhase,
};
