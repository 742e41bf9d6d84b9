//! Collaborator contracts — capture, ASR, agent, and playback.
//!
//! These mirror the teacher's backend-agnostic `SttBackend`/`TtsBackend`
//! traits: the orchestrator holds `Arc<dyn Trait>` objects and never knows
//! which concrete device or network client is behind them. Implementations
//! are injected by the embedding application; this crate ships none.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::VoiceError;

/// Opaque audio produced by the capture contract.
///
/// The core never inspects `data` — it only carries the buffer from
/// capture to the ASR collaborator.
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// Raw encoded or PCM bytes, meaningful only to capture/ASR.
    pub data: Vec<u8>,
    /// Transport content-type, e.g. `"audio/wav"`.
    pub content_type: String,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Bits per sample.
    pub bits_per_sample: u16,
}

impl AudioClip {
    /// Whether this clip carries no audio.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The agent's reply to a transcript.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// Text to speak back to the user.
    pub text: String,
    /// Whether the agent considers this turn successful.
    pub success: bool,
    /// An error message, present only when something went wrong upstream
    /// of the agent even though it still returned a response object.
    pub error: Option<String>,
}

/// Captures microphone audio for one session.
///
/// Implementations must honor `cancel`: once triggered, `start`/`stop`
/// should return promptly with [`VoiceError::Cancelled`] after releasing
/// whatever device resources they hold.
#[async_trait]
pub trait Capture: Send + Sync {
    /// Begin recording for `session_id`.
    async fn start(&self, session_id: &str, cancel: CancellationToken) -> Result<(), VoiceError>;

    /// Finalize recording and return the captured clip, or `None` if
    /// nothing was recorded.
    async fn stop(
        &self,
        session_id: &str,
        cancel: CancellationToken,
    ) -> Result<Option<AudioClip>, VoiceError>;

    /// Unconditional release. Never fails.
    async fn abort(&self, session_id: &str);

    /// Observational only — never relied on for correctness.
    fn is_capturing(&self) -> bool;
}

/// Transcribes a captured clip to text.
#[async_trait]
pub trait Asr: Send + Sync {
    /// Transcribe `clip`. May suspend arbitrarily long; must honor `cancel`.
    async fn transcribe(
        &self,
        clip: &AudioClip,
        session_id: &str,
        cancel: CancellationToken,
    ) -> Result<String, VoiceError>;
}

/// Produces a conversational reply to a transcript.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Process `transcript` and return a response. Must honor `cancel`.
    async fn process(
        &self,
        transcript: &str,
        session_id: &str,
        cancel: CancellationToken,
    ) -> Result<AgentResponse, VoiceError>;
}

/// Plays synthesized speech back to the user.
#[async_trait]
pub trait Playback: Send + Sync {
    /// Play `text`, completing when playout finishes. Must honor `cancel`
    /// by stopping the output device immediately.
    async fn play(
        &self,
        text: &str,
        session_id: &str,
        cancel: CancellationToken,
    ) -> Result<(), VoiceError>;

    /// Uncancellable, idempotent: releases the output device immediately.
    async fn stop(&self);

    /// Observational only.
    fn is_playing(&self) -> bool;
}
