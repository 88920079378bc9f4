//! Retry utilities: backoff builders and startup connection retry.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::{fmt::Display, future::Future, time::Duration};

use backon::{ExponentialBuilder, Retryable as _};
use mqttmirror_core::store::{Classify, Fault};

/// Backoff between transaction attempts on an unavailable backend.
///
/// - Min delay: 50ms
/// - Max delay: 5s
/// - Max retries: `max_times`
/// - Jitter enabled
pub fn transaction_backoff(max_times: usize) -> ExponentialBuilder {
  ExponentialBuilder::default()
    .with_min_delay(Duration::from_millis(50))
    .with_max_delay(Duration::from_secs(5))
    .with_max_times(max_times)
    .with_jitter()
}

/// Backoff for the database connection at startup.
///
/// - Min delay: `start`
/// - Max delay: 60s
/// - Max retries: `max_times`
/// - Jitter enabled
pub fn connection_backoff(start: Duration, max_times: usize) -> ExponentialBuilder {
  ExponentialBuilder::default()
    .with_min_delay(start)
    .with_max_delay(Duration::from_secs(60))
    .with_max_times(max_times)
    .with_jitter()
}

/// Run `connect` until it succeeds, retrying only errors classified as
/// [`Fault::Unavailable`].
pub async fn connect_with_retry<T, E, F, Fut>(
  what: &str,
  backoff: ExponentialBuilder,
  connect: F,
) -> Result<T, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: Classify + Display,
{
  connect
    .retry(backoff)
    .when(|e: &E| e.fault() == Fault::Unavailable)
    .notify(|e: &E, delay: Duration| {
      tracing::warn!(target_db = what, error = %e, ?delay, "database not reachable, retrying");
    })
    .await
}
