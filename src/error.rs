use thiserror::Error;

/// Errors surfaced by the engine's control surface.
///
/// Render-cycle faults are never returned through this type; the callback
/// logs and emits silence instead of unwinding.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A transport operation that needs an active protocol was attempted
    /// while nothing is loaded.
    #[error("no protocol loaded")]
    NoProtocolLoaded,

    /// A phase descriptor failed validation. The whole protocol load is
    /// rejected; any prior playback state is left untouched.
    #[error("invalid phase {index}: {reason}")]
    InvalidPhase { index: usize, reason: String },

    /// The platform audio output could not be acquired. The engine stays
    /// idle; retrying is up to the caller (typically on the next gesture).
    #[error("audio sink unavailable: {0}")]
    AudioSinkUnavailable(String),
}

impl EngineError {
    pub(crate) fn invalid_phase(index: usize, reason: impl Into<String>) -> Self {
        EngineError::InvalidPhase {
            index,
            reason: reason.into(),
        }
    }
}
