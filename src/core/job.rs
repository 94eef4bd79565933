//! Titled job scopes for startup progress.

use std::future::Future;

use tokio::time::Instant;
use tracing::{Instrument, debug, info_span};

/// Runs `fut` inside a `job` span titled `title`, logging its duration.
pub async fn run_job<F: Future>(title: &str, fut: F) -> F::Output {
    let span = info_span!("job", title);
    let started = Instant::now();
    let out = fut.instrument(span.clone()).await;
    span.in_scope(|| debug!(elapsed = ?started.elapsed(), "job finished"));
    out
}
