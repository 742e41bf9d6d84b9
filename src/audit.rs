//! Audit trail — a structured record of every state transition and stage
//! outcome, distinct from developer-facing `tracing` diagnostics.
//!
//! Grounded on the teacher's `AppEventEmitter`/`NoopEmitter` split: the
//! orchestrator core only ever talks to the `AuditSink` trait, and an
//! embedding application supplies whatever sink it wants (a log file, a
//! metrics pipe, a test probe). `tracing::` calls elsewhere in this crate
//! are for developers; `AuditSink` is for the product.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{VoiceEndReason, VoiceState};

/// One audited occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub session_id: String,
    pub at: DateTime<Utc>,
    pub kind: AuditKind,
}

/// The shape of an audited occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditKind {
    /// The event loop was spawned.
    OrchestratorStarted,
    /// `stop(grace)` observed the loop settle at `Idle`.
    OrchestratorStopped,
    /// `stop(grace)` gave up waiting before the loop reached `Idle`.
    OrchestratorStopTimeout,
    /// The loop moved from `from` to `to`.
    Transition { from: VoiceState, to: VoiceState },
    /// A session concluded.
    SessionEnded { reason: VoiceEndReason },
    /// A second `MicDown` arrived while already `Listening`.
    MicDownIgnored,
    /// `MicUp` arrived with no session in `Listening`.
    MicUpIgnored,
    /// Capture produced no audio; the turn ends without transcribing.
    EmptyClip,
    /// The agent returned `success: false`.
    AgentUnsuccessful { detail: Option<String> },
    /// An unexpected failure surfaced inside the event loop itself.
    LoopError { detail: String },
    /// A stage reported a non-cancellation error.
    StageError { stage: &'static str, detail: String },
}

/// Destination for [`AuditRecord`]s.
///
/// Implementations must not block the event loop for long — the core
/// awaits `record` inline between transitions.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord);
}

/// Discards everything. Default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

#[async_trait::async_trait]
impl AuditSink for NoopAuditSink {
    async fn record(&self, _record: AuditRecord) {}
}

/// Forwards records to `tracing::info!` as structured fields.
///
/// Useful as a default sink in applications that already ship a
/// `tracing` subscriber and don't need a dedicated audit store.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait::async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) {
        match record.kind {
            AuditKind::OrchestratorStarted => {
                tracing::info!("orchestrator started");
            }
            AuditKind::OrchestratorStopped => {
                tracing::info!("orchestrator stopped");
            }
            AuditKind::OrchestratorStopTimeout => {
                tracing::warn!("orchestrator stop grace period elapsed");
            }
            AuditKind::Transition { from, to } => {
                tracing::info!(session_id = %record.session_id, ?from, ?to, "transition");
            }
            AuditKind::SessionEnded { reason } => {
                tracing::info!(session_id = %record.session_id, ?reason, "session ended");
            }
            AuditKind::MicDownIgnored => {
                tracing::debug!(session_id = %record.session_id, "mic-down ignored, already listening");
            }
            AuditKind::MicUpIgnored => {
                tracing::debug!(session_id = %record.session_id, "mic-up ignored, no active capture");
            }
            AuditKind::EmptyClip => {
                tracing::debug!(session_id = %record.session_id, "empty capture, ending turn");
            }
            AuditKind::AgentUnsuccessful { detail } => {
                tracing::warn!(session_id = %record.session_id, ?detail, "agent unsuccessful");
            }
            AuditKind::LoopError { detail } => {
                tracing::error!(session_id = %record.session_id, %detail, "loop error");
            }
            AuditKind::StageError { stage, detail } => {
                tracing::warn!(session_id = %record.session_id, stage, %detail, "stage error");
            }
        }
    }
}
