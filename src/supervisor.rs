//! Stage supervision — races a collaborator call against a per-stage
//! deadline and the session's cancellation token, with cancellation always
//! taking precedence when both fire together.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::VoiceError;

/// How a supervised stage call concluded.
pub enum StageOutcome<T> {
    /// The collaborator call finished on its own.
    Completed(Result<T, VoiceError>),
    /// The session's cancellation token fired before completion.
    Cancelled,
    /// The deadline elapsed with no cancellation signalled.
    TimedOut,
}

/// Run `fut` under `cancel` and `deadline`.
///
/// Session cancellation always wins a simultaneous race against the
/// deadline: if both the timer and the stage future are ready on the same
/// poll, the cancellation token is re-checked before trusting a timeout,
/// so a `Stop`/barge-in delivered in the same instant as a deadline is
/// never misreported as `TimedOut`.
pub async fn run_stage<T, F>(
    fut: F,
    cancel: &CancellationToken,
    deadline: Duration,
) -> StageOutcome<T>
where
    F: Future<Output = Result<T, VoiceError>>,
{
    tokio::select! {
        biased;

        () = cancel.cancelled() => StageOutcome::Cancelled,

        result = fut => {
            if cancel.is_cancelled() {
                StageOutcome::Cancelled
            } else {
                StageOutcome::Completed(result)
            }
        }

        () = tokio::time::sleep(deadline) => {
            if cancel.is_cancelled() {
                StageOutcome::Cancelled
            } else {
                StageOutcome::TimedOut
            }
        }
    }
}
