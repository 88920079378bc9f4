//! The consistency coordinator: one event, one transaction.
//!
//! An attempt runs `begin → upsert → evaluate history → append or skip →
//! commit`. Any error rolls the whole attempt back, so a row update never
//! commits without the history record the policy asked for, and a history
//! record never commits without its row update.
//!
//! The event deadline covers everything before `commit`. Once `commit` has
//! been sent its result alone decides the outcome, so a `Timeout` always
//! means the attempt was rolled back.

use std::{sync::Arc, time::Duration};

use backon::{BackoffBuilder as _, ExponentialBuilder};
use mqttmirror_core::{
  event::Event,
  history::{self, HistoryRecord},
  row::TopicRow,
  store::{Classify, Fault, StorageBackend, StorageTransaction},
  upsert::upsert,
};
use tracing::{debug, error, warn};

use crate::{
  error::IngestError,
  locks::TopicLocks,
  retry,
  stats::{IngestStats, bump},
};

/// What happened to the history table for a committed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOutcome {
  Appended(HistoryRecord),
  Skipped,
}

/// A successfully committed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
  pub row:     TopicRow,
  pub is_new:  bool,
  pub history: HistoryOutcome,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
  /// Deadline for one attempt, from `begin` up to the point `commit` is
  /// sent.
  pub event_timeout: Duration,
  /// Backoff between attempts that failed with an unavailable backend.
  /// Its retry limit bounds the number of extra attempts.
  pub backoff:       ExponentialBuilder,
}

impl Default for CoordinatorConfig {
  fn default() -> Self {
    Self {
      event_timeout: Duration::from_secs(10),
      backoff:       retry::transaction_backoff(10),
    }
  }
}

pub struct Coordinator<S> {
  store:  S,
  locks:  TopicLocks,
  config: CoordinatorConfig,
  stats:  Arc<IngestStats>,
}

impl<S: StorageBackend> Coordinator<S> {
  pub fn new(store: S, config: CoordinatorConfig) -> Self {
    Self {
      store,
      locks: TopicLocks::new(),
      config,
      stats: Arc::new(IngestStats::default()),
    }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn stats(&self) -> &Arc<IngestStats> { &self.stats }

  /// Drive one event to `committed` or `failed`.
  ///
  /// Events for the same topic are serialized here; the caller is free to
  /// run events for different topics concurrently.
  pub async fn process(&self, event: Event) -> Result<Committed, IngestError> {
    bump(&self.stats.received);
    debug!(topic = %event.topic, stage = "received");

    let _topic_guard = self.locks.lock(&event.topic).await;

    let mut delays = self.config.backoff.build();
    let mut constraint_retried = false;
    let mut attempts = 0u32;

    loop {
      attempts += 1;
      let err = match self.attempt(&event).await {
        Err(Attempt::TimedOut) => {
          return Err(self.fail(&event, IngestError::Timeout {
            topic: event.topic.clone(),
            after: self.config.event_timeout,
          }));
        }
        Err(Attempt::Store(err)) => err,
        Ok(committed) => {
          bump(&self.stats.committed);
          match &committed.history {
            HistoryOutcome::Appended(_) => bump(&self.stats.history_appended),
            HistoryOutcome::Skipped => bump(&self.stats.history_skipped),
          }
          debug!(
            topic = %event.topic,
            id = committed.row.id,
            is_new = committed.is_new,
            attempts,
            stage = "committed"
          );
          return Ok(committed);
        }
      };

      match err.fault() {
        Fault::Unavailable => match delays.next() {
          Some(delay) => {
            bump(&self.stats.retries);
            warn!(topic = %event.topic, attempts, error = %err, ?delay, "storage unavailable, retrying");
            tokio::time::sleep(delay).await;
          }
          None => {
            return Err(self.fail(&event, IngestError::StorageUnavailable {
              attempts,
              source: Box::new(err),
            }));
          }
        },
        Fault::Constraint if !constraint_retried => {
          constraint_retried = true;
          bump(&self.stats.retries);
          warn!(topic = %event.topic, error = %err, "concurrent insert, re-reading");
        }
        Fault::Constraint => {
          return Err(self.fail(&event, IngestError::ConstraintViolation {
            topic:  event.topic.clone(),
            source: Box::new(err),
          }));
        }
        Fault::Permanent => {
          return Err(self.fail(&event, IngestError::Storage(Box::new(err))));
        }
      }
    }
  }

  fn fail(&self, event: &Event, err: IngestError) -> IngestError {
    bump(&self.stats.failed);
    error!(topic = %event.topic, kind = err.kind(), error = %err, stage = "failed");
    err
  }

  /// One transaction. Staging runs under the event deadline; dropping it
  /// mid-flight drops the transaction, which rolls it back. `commit` runs
  /// outside the deadline.
  async fn attempt(&self, event: &Event) -> Result<Committed, Attempt<S::Error>> {
    let staged = tokio::time::timeout(self.config.event_timeout, async {
      let mut tx = self.store.begin().await?;
      match stage(&mut tx, event).await {
        Ok(committed) => Ok::<_, S::Error>((tx, committed)),
        Err(err) => {
          if let Err(rollback_err) = tx.rollback().await {
            debug!(topic = %event.topic, error = %rollback_err, "rollback failed");
          }
          Err(err)
        }
      }
    })
    .await;

    let (tx, committed) = staged.map_err(|_| Attempt::TimedOut)?.map_err(Attempt::Store)?;
    tx.commit().await.map_err(Attempt::Store)?;
    Ok(committed)
  }
}

/// Why an attempt did not commit.
enum Attempt<E> {
  TimedOut,
  Store(E),
}

/// Everything inside the transaction that precedes `commit`.
async fn stage<T: StorageTransaction>(tx: &mut T, event: &Event) -> Result<Committed, T::Error> {
  let up = upsert(tx, event).await?;
  debug!(topic = %event.topic, id = up.row.id, is_new = up.is_new, stage = "upserted");

  let due = up.history_due();
  debug!(
    topic = %event.topic,
    enable = up.row.history.enable,
    diffonly = up.row.history.diffonly,
    due,
    stage = "history-evaluated"
  );

  let history = if due {
    let record = history::append_row(tx, &up.row).await?;
    debug!(topic = %event.topic, history_id = record.id, stage = "history-appended");
    HistoryOutcome::Appended(record)
  } else {
    debug!(topic = %event.topic, stage = "skipped-history");
    HistoryOutcome::Skipped
  };

  Ok(Committed {
    row: up.row,
    is_new: up.is_new,
    history,
  })
}
