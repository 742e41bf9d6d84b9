//! Voice state machine and end-of-turn reasons.

use serde::{Deserialize, Serialize};

/// Current state of the voice session orchestrator.
///
/// Exactly one is active at any time. `Idle` is both the initial state and
/// the state every turn returns to. `Faulted` is transient — the cleanup
/// path always drives it back to `Idle` before another turn may begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceState {
    /// No session is active; waiting for `MicDown`.
    Idle,

    /// Capture is running; waiting for `MicUp`.
    Listening,

    /// Captured audio is being sent to the ASR collaborator.
    Transcribing,

    /// The transcript is being sent to the agent collaborator.
    Thinking,

    /// The agent's response is being played back.
    Speaking,

    /// A fault was recorded for the current (about to end) session.
    Faulted,
}

/// Why a session ended. Recorded for audit and surfaced as the reason
/// string on the final `Idle` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceEndReason {
    /// A new `MicDown` barged in on a session that was still producing
    /// output.
    Interrupt,

    /// The user (or caller) explicitly requested `Stop`.
    Stop,

    /// The turn ran to completion.
    Complete,

    /// A stage failed, or a `Fault` event was delivered.
    Fault,

    /// A per-stage deadline elapsed with no cancellation signalled.
    Timeout,
}

/// Combine a previously-recorded pending reason with a newly signalled one,
/// preserving the user's strongest intent.
///
/// `Stop` dominates `Interrupt` and `Fault`; once a session's pending
/// reason is `Stop` it can never be downgraded. Any other combination
/// simply takes the newest signal — `Interrupt` and `Fault` are an
/// equivalence class for this ordering.
#[must_use]
pub fn stronger_of(current: Option<VoiceEndReason>, incoming: VoiceEndReason) -> VoiceEndReason {
    if matches!(current, Some(VoiceEndReason::Stop)) {
        VoiceEndReason::Stop
    } else {
        incoming
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_dominates_interrupt() {
        let r = stronger_of(Some(VoiceEndReason::Stop), VoiceEndReason::Interrupt);
        assert_eq!(r, VoiceEndReason::Stop);
    }

    #[test]
    fn stop_dominates_fault() {
        let r = stronger_of(Some(VoiceEndReason::Stop), VoiceEndReason::Fault);
        assert_eq!(r, VoiceEndReason::Stop);
    }

    #[test]
    fn interrupt_and_fault_are_equivalent_and_latest_wins() {
        let r = stronger_of(Some(VoiceEndReason::Interrupt), VoiceEndReason::Fault);
        assert_eq!(r, VoiceEndReason::Fault);
    }

    #[test]
    fn stop_cannot_be_set_then_overwritten() {
        let mut pending = Some(VoiceEndReason::Interrupt);
        pending = Some(stronger_of(pending, VoiceEndReason::Stop));
        pending = Some(stronger_of(pending, VoiceEndReason::Interrupt));
        assert_eq!(pending, Some(VoiceEndReason::Stop));
    }

    #[test]
    fn none_takes_incoming() {
        let r = stronger_of(None, VoiceEndReason::Fault);
        assert_eq!(r, VoiceEndReason::Fault);
    }
}
