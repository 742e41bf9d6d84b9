//! The shared core and the cancellation router.
//!
//! `Core` is mutated by exactly one task under normal operation: the event
//! loop. The one sanctioned exception is [`CancellationRouter`], which may
//! set `pending_cancel_reason` and trigger the current session's token from
//! outside the loop task — e.g. a synchronous `Fault` signal raised by a
//! collaborator callback. No I/O happens while the lock is held, so the
//! `std::sync::Mutex` here never contends with an `.await` point, matching
//! the teacher's own use of a plain (non-async) `RwLock` for small
//! synchronously-guarded state in `service.rs`.

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::state::{stronger_of, VoiceEndReason};

/// State touched by both the event loop and the cancellation router.
///
/// `VoiceState` itself is published through a `watch` channel rather than
/// kept here — callers need to read it without taking this lock, and the
/// loop is the only writer of both regardless of which channel carries it.
pub struct Core {
    pub session_id: Option<String>,
    pub cancellation: Option<CancellationToken>,
    pub pending_cancel_reason: Option<VoiceEndReason>,
}

impl Core {
    pub fn new() -> Self {
        Self {
            session_id: None,
            cancellation: None,
            pending_cancel_reason: None,
        }
    }

    /// Take the pending reason, defaulting to `fallback` if none was set.
    ///
    /// Used by the loop when a stage observes cancellation but the router
    /// raced ahead and hasn't recorded a reason yet (shouldn't happen, but
    /// the loop must still make progress).
    pub fn consume_or_default(&mut self, fallback: VoiceEndReason) -> VoiceEndReason {
        self.pending_cancel_reason.take().unwrap_or(fallback)
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes external cancellation intents (barge-in, Stop, Fault) onto the
/// currently active session's token, recording the strongest reason seen.
///
/// This is the one object outside the event loop task permitted to touch
/// `pending_cancel_reason` and to call `.cancel()` on the live token — it
/// never touches `state` or `session_id` directly.
#[derive(Clone)]
pub struct CancellationRouter {
    core: std::sync::Arc<Mutex<Core>>,
}

impl CancellationRouter {
    pub(crate) fn new(core: std::sync::Arc<Mutex<Core>>) -> Self {
        Self { core }
    }

    /// Signal the active session to cancel for `reason`, strengthening any
    /// previously recorded pending reason rather than overwriting it.
    ///
    /// A no-op if no session is currently active.
    pub fn signal(&self, reason: VoiceEndReason) {
        let mut core = self.core.lock().expect("core mutex poisoned");
        if core.session_id.is_none() {
            return;
        }
        core.pending_cancel_reason = Some(stronger_of(core.pending_cancel_reason, reason));
        if let Some(token) = &core.cancellation {
            token.cancel();
        }
    }
}
