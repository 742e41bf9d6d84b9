//! Single-writer, event-driven state machine for a push-to-talk voice
//! assistant session: capture → ASR → agent → playback, with barge-in
//! cancellation and session-identity discipline against stale results.

pub mod audit;
pub mod cancellation;
pub mod config;
pub mod contracts;
pub mod error;
pub mod event;
pub mod orchestrator;
pub mod session;
pub mod state;
pub mod supervisor;

pub use audit::{AuditKind, AuditRecord, AuditSink, NoopAuditSink, TracingAuditSink};
pub use config::OrchestratorConfig;
pub use contracts::{Agent, AgentResponse, Asr, AudioClip, Capture, Playback};
pub use error::VoiceError;
pub use event::{Clock, SystemClock, VoiceEvent, VoiceEventKind};
pub use orchestrator::{OrchestratorEvent, ProgressKind, VoiceSessionOrchestrator};
pub use session::next_session_id;
pub use state::{stronger_of, VoiceEndReason, VoiceState};
