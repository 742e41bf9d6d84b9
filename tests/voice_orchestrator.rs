//! Scenario coverage for the event loop: happy path, idempotent double
//! press, MicUp with no session, Stop mid-turn, barge-in preemption,
//! explicit fault, and a stage timeout.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use voice_session_orchestrator::{
    Agent, AgentResponse, Asr, AudioClip, AuditKind, AuditRecord, AuditSink, Capture,
    NoopAuditSink, OrchestratorConfig, Playback, SystemClock, VoiceEndReason,
    VoiceSessionOrchestrator, VoiceState,
};

fn clip(bytes: &[u8]) -> AudioClip {
    AudioClip {
        data: bytes.to_vec(),
        content_type: "audio/wav".into(),
        sample_rate: 16_000,
        channels: 1,
        bits_per_sample: 16,
    }
}

struct MockCapture {
    started: AtomicUsize,
    aborted: AtomicUsize,
}

impl MockCapture {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            started: AtomicUsize::new(0),
            aborted: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Capture for MockCapture {
    async fn start(&self, _session_id: &str, _cancel: CancellationToken) -> Result<(), voice_session_orchestrator::VoiceError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(
        &self,
        _session_id: &str,
        _cancel: CancellationToken,
    ) -> Result<Option<AudioClip>, voice_session_orchestrator::VoiceError> {
        Ok(Some(clip(b"hello-audio")))
    }

    async fn abort(&self, _session_id: &str) {
        self.aborted.fetch_add(1, Ordering::SeqCst);
    }

    fn is_capturing(&self) -> bool {
        false
    }
}

struct MockAsr {
    transcript: String,
    delay: Option<Duration>,
}

#[async_trait]
impl Asr for MockAsr {
    async fn transcribe(
        &self,
        _clip: &AudioClip,
        _session_id: &str,
        cancel: CancellationToken,
    ) -> Result<String, voice_session_orchestrator::VoiceError> {
        if let Some(delay) = self.delay {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return Err(voice_session_orchestrator::VoiceError::Cancelled),
            }
        }
        Ok(self.transcript.clone())
    }
}

struct MockAgent {
    text: String,
}

#[async_trait]
impl Agent for MockAgent {
    async fn process(
        &self,
        _transcript: &str,
        _session_id: &str,
        _cancel: CancellationToken,
    ) -> Result<AgentResponse, voice_session_orchestrator::VoiceError> {
        Ok(AgentResponse {
            text: self.text.clone(),
            success: true,
            error: None,
        })
    }
}

struct MockPlayback {
    delay: Duration,
    cancelled: AtomicBool,
}

impl MockPlayback {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            cancelled: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Playback for MockPlayback {
    async fn play(
        &self,
        _text: &str,
        _session_id: &str,
        cancel: CancellationToken,
    ) -> Result<(), voice_session_orchestrator::VoiceError> {
        tokio::select! {
            () = tokio::time::sleep(self.delay) => Ok(()),
            () = cancel.cancelled() => {
                self.cancelled.store(true, Ordering::SeqCst);
                Err(voice_session_orchestrator::VoiceError::Cancelled)
            }
        }
    }

    async fn stop(&self) {}

    fn is_playing(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct RecordingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, record: AuditRecord) {
        self.records.lock().unwrap().push(record);
    }
}

async fn wait_for_state(orch: &VoiceSessionOrchestrator, target: VoiceState, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if orch.state() == target {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {target:?}, currently {:?}",
            orch.state()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        asr_timeout: Duration::from_millis(200),
        agent_timeout: Duration::from_secs(5),
        speaking_timeout: Duration::from_secs(5),
        queue_drain_timeout: Duration::from_millis(500),
    }
}

#[tokio::test]
async fn s1_happy_path_ends_idle_with_response_spoken() {
    let capture = MockCapture::new();
    let asr = Arc::new(MockAsr {
        transcript: "what time is it".into(),
        delay: None,
    });
    let agent = Arc::new(MockAgent {
        text: "it's three o'clock".into(),
    });
    let playback = MockPlayback::new(Duration::from_millis(20));
    let audit = Arc::new(RecordingAuditSink::default());

    let orch = Arc::new(VoiceSessionOrchestrator::new(
        fast_config(),
        capture,
        asr,
        agent,
        playback,
        audit.clone(),
        Arc::new(SystemClock),
    ));
    orch.start();

    orch.enqueue_mic_down();
    wait_for_state(&orch, VoiceState::Listening, Duration::from_secs(1)).await;
    orch.enqueue_mic_up();
    wait_for_state(&orch, VoiceState::Idle, Duration::from_secs(2)).await;

    let records = audit.records.lock().unwrap();
    let ended = records
        .iter()
        .find_map(|r| match r.kind {
            AuditKind::SessionEnded { reason } => Some(reason),
            _ => None,
        })
        .expect("a SessionEnded record");
    assert_eq!(ended, VoiceEndReason::Complete);
}

#[tokio::test]
async fn s2_double_mic_down_is_idempotent() {
    let capture = MockCapture::new();
    let asr = Arc::new(MockAsr {
        transcript: "hi".into(),
        delay: None,
    });
    let agent = Arc::new(MockAgent { text: String::new() });
    let playback = MockPlayback::new(Duration::from_millis(10));

    let orch = Arc::new(VoiceSessionOrchestrator::new(
        fast_config(),
        capture.clone(),
        asr,
        agent,
        playback,
        Arc::new(NoopAuditSink),
        Arc::new(SystemClock),
    ));
    orch.start();

    orch.enqueue_mic_down();
    wait_for_state(&orch, VoiceState::Listening, Duration::from_secs(1)).await;
    orch.enqueue_mic_down();
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(orch.state(), VoiceState::Listening);
    assert_eq!(capture.started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn s3_mic_up_without_mic_down_is_a_no_op() {
    let capture = MockCapture::new();
    let asr = Arc::new(MockAsr {
        transcript: "hi".into(),
        delay: None,
    });
    let agent = Arc::new(MockAgent { text: String::new() });
    let playback = MockPlayback::new(Duration::from_millis(10));

    let orch = Arc::new(VoiceSessionOrchestrator::new(
        fast_config(),
        capture,
        asr,
        agent,
        playback,
        Arc::new(NoopAuditSink),
        Arc::new(SystemClock),
    ));
    orch.start();

    orch.enqueue_mic_up();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(orch.state(), VoiceState::Idle);
}

#[tokio::test]
async fn s4_stop_during_speaking_ends_with_stop_not_complete() {
    let capture = MockCapture::new();
    let asr = Arc::new(MockAsr {
        transcript: "hi".into(),
        delay: None,
    });
    let agent = Arc::new(MockAgent {
        text: "a long reply".into(),
    });
    let playback = MockPlayback::new(Duration::from_secs(5));
    let audit = Arc::new(RecordingAuditSink::default());

    let orch = Arc::new(VoiceSessionOrchestrator::new(
        fast_config(),
        capture,
        asr,
        agent,
        playback.clone(),
        audit.clone(),
        Arc::new(SystemClock),
    ));
    orch.start();

    orch.enqueue_mic_down();
    wait_for_state(&orch, VoiceState::Listening, Duration::from_secs(1)).await;
    orch.enqueue_mic_up();
    wait_for_state(&orch, VoiceState::Speaking, Duration::from_secs(1)).await;

    orch.enqueue_stop();
    wait_for_state(&orch, VoiceState::Idle, Duration::from_secs(1)).await;

    assert!(playback.cancelled.load(Ordering::SeqCst));
    let records = audit.records.lock().unwrap();
    let ended = records.iter().find_map(|r| match r.kind {
        AuditKind::SessionEnded { reason } => Some(reason),
        _ => None,
    });
    assert_eq!(ended, Some(VoiceEndReason::Stop));
}

#[tokio::test]
async fn s5_barge_in_preempts_and_stale_result_is_dropped() {
    let capture = MockCapture::new();
    let asr = Arc::new(MockAsr {
        transcript: "hi".into(),
        delay: None,
    });
    let agent = Arc::new(MockAgent {
        text: "a long reply".into(),
    });
    let playback = MockPlayback::new(Duration::from_secs(5));
    let audit = Arc::new(RecordingAuditSink::default());

    let orch = Arc::new(VoiceSessionOrchestrator::new(
        fast_config(),
        capture,
        asr,
        agent,
        playback.clone(),
        audit.clone(),
        Arc::new(SystemClock),
    ));
    orch.start();

    orch.enqueue_mic_down();
    wait_for_state(&orch, VoiceState::Listening, Duration::from_secs(1)).await;
    orch.enqueue_mic_up();
    wait_for_state(&orch, VoiceState::Speaking, Duration::from_secs(1)).await;

    // Barge in while the first turn is still speaking.
    orch.enqueue_mic_down();
    wait_for_state(&orch, VoiceState::Listening, Duration::from_secs(1)).await;

    assert!(playback.cancelled.load(Ordering::SeqCst));

    let records = audit.records.lock().unwrap();
    let interrupt_count = records
        .iter()
        .filter(|r| matches!(r.kind, AuditKind::SessionEnded { reason: VoiceEndReason::Interrupt }))
        .count();
    assert_eq!(interrupt_count, 1);
}

#[tokio::test]
async fn s6_fault_event_ends_session_as_faulted() {
    let capture = MockCapture::new();
    let asr = Arc::new(MockAsr {
        transcript: "hi".into(),
        delay: None,
    });
    let agent = Arc::new(MockAgent {
        text: "reply".into(),
    });
    let playback = MockPlayback::new(Duration::from_secs(5));
    let audit = Arc::new(RecordingAuditSink::default());

    let orch = Arc::new(VoiceSessionOrchestrator::new(
        fast_config(),
        capture,
        asr,
        agent,
        playback,
        audit.clone(),
        Arc::new(SystemClock),
    ));
    orch.start();

    orch.enqueue_mic_down();
    wait_for_state(&orch, VoiceState::Listening, Duration::from_secs(1)).await;
    orch.enqueue_mic_up();
    wait_for_state(&orch, VoiceState::Speaking, Duration::from_secs(1)).await;

    orch.enqueue_fault("device disconnected");
    wait_for_state(&orch, VoiceState::Idle, Duration::from_secs(1)).await;

    let records = audit.records.lock().unwrap();
    let saw_faulted_transition = records.iter().any(|r| {
        matches!(
            r.kind,
            AuditKind::Transition {
                to: VoiceState::Faulted,
                ..
            }
        )
    });
    assert!(saw_faulted_transition);
    let ended = records.iter().find_map(|r| match r.kind {
        AuditKind::SessionEnded { reason } => Some(reason),
        _ => None,
    });
    assert_eq!(ended, Some(VoiceEndReason::Fault));
}

#[tokio::test]
async fn s7_asr_timeout_ends_session_as_timeout() {
    let capture = MockCapture::new();
    let asr = Arc::new(MockAsr {
        transcript: "hi".into(),
        delay: Some(Duration::from_secs(5)),
    });
    let agent = Arc::new(MockAgent { text: String::new() });
    let playback = MockPlayback::new(Duration::from_millis(10));
    let audit = Arc::new(RecordingAuditSink::default());

    let orch = Arc::new(VoiceSessionOrchestrator::new(
        fast_config(),
        capture,
        asr,
        agent,
        playback,
        audit.clone(),
        Arc::new(SystemClock),
    ));
    orch.start();

    orch.enqueue_mic_down();
    wait_for_state(&orch, VoiceState::Listening, Duration::from_secs(1)).await;
    orch.enqueue_mic_up();
    wait_for_state(&orch, VoiceState::Idle, Duration::from_secs(2)).await;

    let records = audit.records.lock().unwrap();
    let ended = records.iter().find_map(|r| match r.kind {
        AuditKind::SessionEnded { reason } => Some(reason),
        _ => None,
    });
    assert_eq!(ended, Some(VoiceEndReason::Timeout));
}
