//! Orchestrator configuration — the per-stage deadlines and queue-drain
//! grace period.

use std::time::Duration;

/// Tunable timeouts for the stage pipeline and for `stop(grace)`.
///
/// Defaults match the durations named in the transition table: ASR and
/// agent calls get generous ceilings since they cross a network boundary,
/// speaking gets the same ceiling as agent generation, and queue drain is
/// kept short since it only waits out events already in flight.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// Deadline for the ASR stage, from `Transcribing` entry to transcript.
    pub asr_timeout: Duration,
    /// Deadline for the agent stage, from `Thinking` entry to response.
    pub agent_timeout: Duration,
    /// Deadline for the playback stage, from `Speaking` entry to completion.
    pub speaking_timeout: Duration,
    /// How long `stop(grace)` waits for the loop to settle at `Idle`
    /// before giving up and returning anyway.
    pub queue_drain_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            asr_timeout: Duration::from_secs(45),
            agent_timeout: Duration::from_secs(90),
            speaking_timeout: Duration::from_secs(90),
            queue_drain_timeout: Duration::from_secs(2),
        }
    }
}
