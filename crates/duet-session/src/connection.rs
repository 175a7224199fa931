//! The transport seam the runtime depends on.

/// A message-oriented, full-duplex link to one participant.
///
/// This is everything the runtime knows about a transport: it can push a
/// text frame, close the link, and ask whether the link is still open.
/// Deliberately minimal so the runtime is testable with in-memory
/// doubles; the server wrapper provides the WebSocket implementation.
///
/// Sends are fire-and-forget. A send to a closed connection is silently
/// dropped — the runtime skips closed peers but never retries.
pub trait Connection: Send + 'static {
    /// Pushes one text frame toward the participant.
    fn send(&self, text: &str);

    /// Closes the link. Idempotent.
    fn close(&self);

    /// Whether the link is still open.
    fn is_open(&self) -> bool;
}
