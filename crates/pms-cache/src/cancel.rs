//! Cooperative cancellation at suspension points.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::Cancelled;

/// Races `fut` against `cancel`. An already-cancelled token wins without
/// polling `fut`, so a handler is never started for an abandoned request.
pub async fn cancellable<F>(cancel: &CancellationToken, fut: F) -> Result<F::Output, Cancelled>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        out = fut => Ok(out),
    }
}
