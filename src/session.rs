//! Session identity.

use std::sync::atomic::{AtomicU64, Ordering};

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Mint the next session id, formatted as `voice-000001`.
///
/// Monotonic for the lifetime of the process; never reused. Used to stamp
/// every event, stage call, and audit record so late results from a
/// superseded session can be recognized and dropped.
#[must_use]
pub fn next_session_id() -> String {
    let n = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("voice-{n:06}")
}
