//! The event loop: the single task that owns [`VoiceState`] and drives the
//! capture → ASR → agent → playback pipeline.
//!
//! Every stage call is supervised by [`run_stage`] and tagged with the
//! session id that started it. Stage completions are delivered back to the
//! loop as ordinary messages on an internal channel, so the loop remains
//! the only task that ever mutates state — a completion whose session id
//! no longer matches the active session is session-identity discipline in
//! action: it is audited and dropped rather than acted on.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

use crate::audit::{AuditKind, AuditRecord, AuditSink};
use crate::cancellation::{CancellationRouter, Core};
use crate::config::OrchestratorConfig;
use crate::contracts::{Agent, AgentResponse, Asr, Capture, Playback};
use crate::event::{Clock, VoiceEvent, VoiceEventKind};
use crate::session::next_session_id;
use crate::state::{stronger_of, VoiceEndReason, VoiceState};
use crate::supervisor::{run_stage, StageOutcome};

/// A progress notification for observers (a UI, a log tailer). Distinct
/// from [`AuditSink`]: this is a live broadcast for subscribers who don't
/// care about durable history, and lagging subscribers simply miss ticks
/// rather than blocking the loop.
#[derive(Debug, Clone)]
pub struct OrchestratorEvent {
    pub session_id: String,
    pub kind: ProgressKind,
}

#[derive(Debug, Clone)]
pub enum ProgressKind {
    StateChanged(VoiceState),
    TranscriptReady(String),
    AgentResponseReady,
    SessionEnded(VoiceEndReason),
}

enum LoopMessage {
    External(VoiceEvent),
    CaptureStarted {
        session_id: String,
        result: Result<(), crate::error::VoiceError>,
    },
    Transcribed {
        session_id: String,
        outcome: StageOutcome<Option<String>>,
    },
    Responded {
        session_id: String,
        outcome: StageOutcome<AgentResponse>,
    },
    Played {
        session_id: String,
        outcome: StageOutcome<()>,
    },
}

/// A single-writer, event-driven voice session state machine.
///
/// Construct with [`VoiceSessionOrchestrator::new`], call
/// [`VoiceSessionOrchestrator::start`] once to spawn the event loop, then
/// drive it with `enqueue_*`. Dropping the orchestrator stops the loop.
pub struct VoiceSessionOrchestrator {
    core: Arc<std::sync::Mutex<Core>>,
    config: OrchestratorConfig,
    capture: Arc<dyn Capture>,
    asr: Arc<dyn Asr>,
    agent: Arc<dyn Agent>,
    playback: Arc<dyn Playback>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    events_tx: mpsc::UnboundedSender<LoopMessage>,
    events_rx: AsyncMutex<Option<mpsc::UnboundedReceiver<LoopMessage>>>,
    state_tx: watch::Sender<VoiceState>,
    state_rx: watch::Receiver<VoiceState>,
    progress_tx: broadcast::Sender<OrchestratorEvent>,
}

impl VoiceSessionOrchestrator {
    #[must_use]
    pub fn new(
        config: OrchestratorConfig,
        capture: Arc<dyn Capture>,
        asr: Arc<dyn Asr>,
        agent: Arc<dyn Agent>,
        playback: Arc<dyn Playback>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(VoiceState::Idle);
        let (progress_tx, _) = broadcast::channel(64);
        Self {
            core: Arc::new(std::sync::Mutex::new(Core::new())),
            config,
            capture,
            asr,
            agent,
            playback,
            audit,
            clock,
            events_tx,
            events_rx: AsyncMutex::new(Some(events_rx)),
            state_tx,
            state_rx,
            progress_tx,
        }
    }

    /// Current state, read without blocking the loop.
    #[must_use]
    pub fn state(&self) -> VoiceState {
        *self.state_rx.borrow()
    }

    /// A router that may cancel the active session from outside the loop
    /// task — e.g. a hotkey handler or a collaborator's own fault signal.
    #[must_use]
    pub fn cancellation_router(&self) -> CancellationRouter {
        CancellationRouter::new(Arc::clone(&self.core))
    }

    /// Subscribe to live progress notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.progress_tx.subscribe()
    }

    pub fn enqueue_mic_down(&self) {
        self.send(VoiceEventKind::MicDown);
    }

    pub fn enqueue_mic_up(&self) {
        self.send(VoiceEventKind::MicUp);
    }

    pub fn enqueue_stop(&self) {
        self.send(VoiceEventKind::Stop);
    }

    pub fn enqueue_fault(&self, detail: impl Into<String>) {
        self.send(VoiceEventKind::Fault(detail.into()));
    }

    fn send(&self, kind: VoiceEventKind) {
        let event = VoiceEvent {
            kind,
            at: self.clock.now(),
        };
        let _ = self.events_tx.send(LoopMessage::External(event));
    }

    /// Spawn the event loop. Must be called exactly once.
    ///
    /// # Panics
    /// Panics if called more than once on the same orchestrator.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let rx = self
            .events_rx
            .try_lock()
            .expect("start called concurrently")
            .take()
            .expect("start called more than once");
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.audit("", AuditKind::OrchestratorStarted).await;
            this.run(rx).await;
        })
    }

    /// Request an orderly stop and wait up to `grace` for the loop to
    /// settle at `Idle`.
    pub async fn stop(&self, grace: Option<Duration>) {
        self.enqueue_stop();
        let grace = grace.unwrap_or(self.config.queue_drain_timeout);
        let mut rx = self.state_rx.clone();
        let settled = tokio::time::timeout(grace, async {
            while *rx.borrow() != VoiceState::Idle {
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await
        .is_ok();
        if settled {
            self.audit("", AuditKind::OrchestratorStopped).await;
        } else {
            self.audit("", AuditKind::OrchestratorStopTimeout).await;
        }
    }

    async fn run(&self, mut rx: mpsc::UnboundedReceiver<LoopMessage>) {
        while let Some(message) = rx.recv().await {
            match message {
                LoopMessage::External(event) => self.on_external(event).await,
                LoopMessage::CaptureStarted { session_id, result } => {
                    self.on_capture_started(&session_id, result).await;
                }
                LoopMessage::Transcribed {
                    session_id,
                    outcome,
                } => self.on_transcribed(&session_id, outcome).await,
                LoopMessage::Responded {
                    session_id,
                    outcome,
                } => self.on_responded(&session_id, outcome).await,
                LoopMessage::Played {
                    session_id,
                    outcome,
                } => self.on_played(&session_id, outcome).await,
            }
        }
    }

    async fn on_external(&self, event: VoiceEvent) {
        let state = self.state();
        match (&event.kind, state) {
            (VoiceEventKind::MicDown, VoiceState::Idle) => self.begin_session().await,
            (VoiceEventKind::MicDown, VoiceState::Listening) => {
                let session_id = self.current_session_id().unwrap_or_default();
                self.audit(&session_id, AuditKind::MicDownIgnored).await;
            }
            (VoiceEventKind::MicDown, _) => self.barge_in().await,

            (VoiceEventKind::MicUp, VoiceState::Listening) => self.finish_capture().await,
            (VoiceEventKind::MicUp, _) => {
                let session_id = self.current_session_id().unwrap_or_default();
                self.audit(&session_id, AuditKind::MicUpIgnored).await;
            }

            (VoiceEventKind::Stop, VoiceState::Idle) => {}
            (VoiceEventKind::Stop, VoiceState::Listening) => {
                self.immediate_end(VoiceEndReason::Stop).await;
            }
            (VoiceEventKind::Stop, _) => self.request_cancel(VoiceEndReason::Stop),

            (VoiceEventKind::Fault(detail), VoiceState::Idle) => {
                tracing::warn!(%detail, "fault signalled with no active session");
            }
            (VoiceEventKind::Fault(_), VoiceState::Listening) => {
                self.immediate_end(VoiceEndReason::Fault).await;
            }
            (VoiceEventKind::Fault(_), _) => self.request_cancel(VoiceEndReason::Fault),
        }
    }

    fn request_cancel(&self, reason: VoiceEndReason) {
        let mut core = self.core.lock().expect("core mutex poisoned");
        core.pending_cancel_reason = Some(stronger_of(core.pending_cancel_reason, reason));
        if let Some(token) = &core.cancellation {
            token.cancel();
        }
    }

    async fn begin_session(&self) {
        let session_id = next_session_id();
        let token = CancellationToken::new();
        {
            let mut core = self.core.lock().expect("core mutex poisoned");
            core.session_id = Some(session_id.clone());
            core.cancellation = Some(token.clone());
            core.pending_cancel_reason = None;
        }
        self.set_state(&session_id, VoiceState::Listening).await;

        let capture = Arc::clone(&self.capture);
        let tx = self.events_tx.clone();
        let sid = session_id.clone();
        tokio::spawn(async move {
            let result = capture.start(&sid, token).await;
            let _ = tx.send(LoopMessage::CaptureStarted {
                session_id: sid,
                result,
            });
        });
    }

    async fn barge_in(&self) {
        let session_id = {
            let core = self.core.lock().expect("core mutex poisoned");
            core.session_id.clone()
        };
        if let Some(old) = session_id {
            self.request_cancel(VoiceEndReason::Interrupt);
            self.end_session(&old, VoiceEndReason::Interrupt).await;
        }
        self.begin_session().await;
    }

    async fn on_capture_started(&self, session_id: &str, result: Result<(), crate::error::VoiceError>) {
        if !self.is_current(session_id) || self.state() != VoiceState::Listening {
            return;
        }
        if let Err(err) = result {
            self.audit(
                session_id,
                AuditKind::StageError {
                    stage: "capture",
                    detail: err.to_string(),
                },
            )
            .await;
            self.end_session(session_id, VoiceEndReason::Fault).await;
        }
    }

    async fn finish_capture(&self) {
        let (session_id, token) = {
            let core = self.core.lock().expect("core mutex poisoned");
            (core.session_id.clone(), core.cancellation.clone())
        };
        let (Some(session_id), Some(token)) = (session_id, token) else {
            return;
        };
        self.set_state(&session_id, VoiceState::Transcribing).await;

        let capture = Arc::clone(&self.capture);
        let asr = Arc::clone(&self.asr);
        let tx = self.events_tx.clone();
        let deadline = self.config.asr_timeout;
        let sid = session_id.clone();
        tokio::spawn(async move {
            let stage = async {
                match capture.stop(&sid, token.clone()).await? {
                    Some(clip) if !clip.is_empty() => {
                        asr.transcribe(&clip, &sid, token.clone()).await.map(Some)
                    }
                    _ => Ok(None),
                }
            };
            let outcome = run_stage(stage, &token, deadline).await;
            let _ = tx.send(LoopMessage::Transcribed {
                session_id: sid,
                outcome,
            });
        });
    }

    async fn on_transcribed(&self, session_id: &str, outcome: StageOutcome<Option<String>>) {
        if !self.is_current(session_id) || self.state() != VoiceState::Transcribing {
            return;
        }
        match outcome {
            StageOutcome::Completed(Ok(Some(transcript))) if !transcript.trim().is_empty() => {
                self.progress(session_id, ProgressKind::TranscriptReady(transcript.clone()));
                self.begin_thinking(session_id, transcript).await;
            }
            StageOutcome::Completed(Ok(_)) => {
                self.audit(session_id, AuditKind::EmptyClip).await;
                self.end_session(session_id, VoiceEndReason::Complete).await;
            }
            StageOutcome::Completed(Err(err)) => {
                self.audit(
                    session_id,
                    AuditKind::StageError {
                        stage: "asr",
                        detail: err.to_string(),
                    },
                )
                .await;
                self.end_session(session_id, VoiceEndReason::Fault).await;
            }
            StageOutcome::Cancelled => {
                let reason = self.consume_pending(VoiceEndReason::Interrupt);
                self.end_session(session_id, reason).await;
            }
            StageOutcome::TimedOut => {
                self.end_session(session_id, VoiceEndReason::Timeout).await;
            }
        }
    }

    async fn begin_thinking(&self, session_id: &str, transcript: String) {
        let token = {
            let core = self.core.lock().expect("core mutex poisoned");
            core.cancellation.clone()
        };
        let Some(token) = token else { return };
        self.set_state(session_id, VoiceState::Thinking).await;

        let agent = Arc::clone(&self.agent);
        let tx = self.events_tx.clone();
        let deadline = self.config.agent_timeout;
        let sid = session_id.to_string();
        tokio::spawn(async move {
            let stage = agent.process(&transcript, &sid, token.clone());
            let outcome = run_stage(stage, &token, deadline).await;
            let _ = tx.send(LoopMessage::Responded {
                session_id: sid,
                outcome,
            });
        });
    }

    async fn on_responded(&self, session_id: &str, outcome: StageOutcome<AgentResponse>) {
        if !self.is_current(session_id) || self.state() != VoiceState::Thinking {
            return;
        }
        match outcome {
            StageOutcome::Completed(Ok(response)) => {
                self.progress(session_id, ProgressKind::AgentResponseReady);
                if response.success && !response.text.trim().is_empty() {
                    self.begin_speaking(session_id, response.text).await;
                } else {
                    self.audit(
                        session_id,
                        AuditKind::AgentUnsuccessful {
                            detail: response.error.clone(),
                        },
                    )
                    .await;
                    if response.error.is_some() {
                        self.end_session(session_id, VoiceEndReason::Fault).await;
                    } else {
                        self.end_session(session_id, VoiceEndReason::Complete).await;
                    }
                }
            }
            StageOutcome::Completed(Err(err)) => {
                self.audit(
                    session_id,
                    AuditKind::StageError {
                        stage: "agent",
                        detail: err.to_string(),
                    },
                )
                .await;
                self.end_session(session_id, VoiceEndReason::Fault).await;
            }
            StageOutcome::Cancelled => {
                let reason = self.consume_pending(VoiceEndReason::Interrupt);
                self.end_session(session_id, reason).await;
            }
            StageOutcome::TimedOut => {
                self.end_session(session_id, VoiceEndReason::Timeout).await;
            }
        }
    }

    async fn begin_speaking(&self, session_id: &str, text: String) {
        let token = {
            let core = self.core.lock().expect("core mutex poisoned");
            core.cancellation.clone()
        };
        let Some(token) = token else { return };
        self.set_state(session_id, VoiceState::Speaking).await;

        let playback = Arc::clone(&self.playback);
        let tx = self.events_tx.clone();
        let deadline = self.config.speaking_timeout;
        let sid = session_id.to_string();
        tokio::spawn(async move {
            let stage = playback.play(&text, &sid, token.clone());
            let outcome = run_stage(stage, &token, deadline).await;
            let _ = tx.send(LoopMessage::Played {
                session_id: sid,
                outcome,
            });
        });
    }

    async fn on_played(&self, session_id: &str, outcome: StageOutcome<()>) {
        if !self.is_current(session_id) || self.state() != VoiceState::Speaking {
            return;
        }
        match outcome {
            StageOutcome::Completed(Ok(())) => {
                self.end_session(session_id, VoiceEndReason::Complete).await;
            }
            StageOutcome::Completed(Err(err)) => {
                self.audit(
                    session_id,
                    AuditKind::StageError {
                        stage: "playback",
                        detail: err.to_string(),
                    },
                )
                .await;
                self.end_session(session_id, VoiceEndReason::Fault).await;
            }
            StageOutcome::Cancelled => {
                let reason = self.consume_pending(VoiceEndReason::Interrupt);
                self.end_session(session_id, reason).await;
            }
            StageOutcome::TimedOut => {
                self.end_session(session_id, VoiceEndReason::Timeout).await;
            }
        }
    }

    /// Stop+Fault while `Listening`: there is no supervised stage future to
    /// notice the cancellation, so the loop ends the session itself.
    async fn immediate_end(&self, reason: VoiceEndReason) {
        let session_id = {
            let core = self.core.lock().expect("core mutex poisoned");
            core.session_id.clone()
        };
        let Some(session_id) = session_id else { return };
        self.request_cancel(reason);
        let reason = self.consume_pending(reason);
        self.end_session(&session_id, reason).await;
    }

    fn consume_pending(&self, fallback: VoiceEndReason) -> VoiceEndReason {
        let mut core = self.core.lock().expect("core mutex poisoned");
        core.consume_or_default(fallback)
    }

    fn is_current(&self, session_id: &str) -> bool {
        let core = self.core.lock().expect("core mutex poisoned");
        core.session_id.as_deref() == Some(session_id)
    }

    fn current_session_id(&self) -> Option<String> {
        self.core.lock().expect("core mutex poisoned").session_id.clone()
    }

    /// The one cleanup path every session ending runs through, regardless
    /// of whether it completed, was interrupted, stopped, faulted, or
    /// timed out.
    async fn end_session(&self, session_id: &str, reason: VoiceEndReason) {
        if reason == VoiceEndReason::Fault {
            self.set_state(session_id, VoiceState::Faulted).await;
        }
        self.capture.abort(session_id).await;
        self.playback.stop().await;
        {
            let mut core = self.core.lock().expect("core mutex poisoned");
            core.session_id = None;
            core.cancellation = None;
            core.pending_cancel_reason = None;
        }
        self.set_state(session_id, VoiceState::Idle).await;
        self.audit(session_id, AuditKind::SessionEnded { reason }).await;
        self.progress(session_id, ProgressKind::SessionEnded(reason));
    }

    async fn set_state(&self, session_id: &str, to: VoiceState) {
        let from = *self.state_tx.borrow();
        let _ = self.state_tx.send(to);
        self.audit(session_id, AuditKind::Transition { from, to }).await;
        self.progress(session_id, ProgressKind::StateChanged(to));
    }

    async fn audit(&self, session_id: &str, kind: AuditKind) {
        self.audit
            .record(AuditRecord {
                session_id: session_id.to_string(),
                at: self.clock.now(),
                kind,
            })
            .await;
    }

    fn progress(&self, session_id: &str, kind: ProgressKind) {
        let _ = self.progress_tx.send(OrchestratorEvent {
            session_id: session_id.to_string(),
            kind,
        });
    }
}
