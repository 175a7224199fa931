//! Error types for the session layer.

/// Errors that can occur when talking to a session task.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session task's command channel is closed — the task stopped
    /// or panicked.
    #[error("session task is unavailable")]
    Unavailable,
}
