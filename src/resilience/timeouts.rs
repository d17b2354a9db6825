//! Timeout enforcement.
//!
//! # Responsibilities
//! - Race an operation against a per-attempt deadline
//! - Compose the deadline with the caller's cancellation token so either
//!   one ends the attempt
//! - Provide a backoff sleep that the caller can cancel
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - A deadline is distinct from cancellation: the former is a transient
//!   failure, the latter an abort

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why an operation did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("deadline of {0:?} elapsed")]
    TimedOut(Duration),
    #[error("cancelled by caller")]
    Cancelled,
}

/// Run `fut` with a deadline, aborting early if `cancel` fires.
pub async fn run_with_deadline<F>(
    deadline: Duration,
    cancel: Option<&CancellationToken>,
    fut: F,
) -> Result<F::Output, Interrupted>
where
    F: Future,
{
    let timed = tokio::time::timeout(deadline, fut);
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(Interrupted::Cancelled),
                result = timed => result.map_err(|_| Interrupted::TimedOut(deadline)),
            }
        }
        None => timed.await.map_err(|_| Interrupted::TimedOut(deadline)),
    }
}

/// Sleep for `delay` unless `cancel` fires first.
pub async fn cancellable_sleep(delay: Duration, cancel: Option<&CancellationToken>) -> Result<(), Interrupted> {
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(Interrupted::Cancelled),
                _ = tokio::time::sleep(delay) => Ok(()),
            }
        }
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }
}
