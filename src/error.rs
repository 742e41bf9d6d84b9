//! Orchestrator error taxonomy.

/// Errors surfaced by the event loop, the stage pipeline, and collaborator
/// contracts.
///
/// These are error *kinds*, not a one-to-one mirror of what a given
/// collaborator implementation might throw — `capture`/`asr`/`agent`/
/// `playback` adapters map their own failures onto this taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// The session's cancellation signal was observed before the stage
    /// completed. Always mapped to `VoiceEndReason::Interrupt` (or the
    /// consumed pending reason) rather than propagated to the user.
    #[error("voice operation cancelled")]
    Cancelled,

    /// A per-stage deadline elapsed with no cancellation signalled.
    #[error("voice stage timed out")]
    Timeout,

    /// Capture or playback device could not be acquired or released.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// ASR or agent network/protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Clip or response payload malformed.
    #[error("format error: {0}")]
    Format(String),

    /// Unexpected failure inside the event loop itself.
    #[error("internal orchestrator error: {0}")]
    Internal(String),
}
