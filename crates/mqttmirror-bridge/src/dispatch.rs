//! Fan-out of inbound events to coordinator workers.
//!
//! Each topic hashes to one worker queue, so events for a topic are
//! processed in arrival order while distinct topics run in parallel. The
//! queues are bounded; a full queue makes [`Dispatcher::dispatch`] wait.

use std::{
  hash::{DefaultHasher, Hash, Hasher},
  sync::Arc,
  time::Duration,
};

use mqttmirror_core::{
  event::{Event, RawEvent},
  store::StorageBackend,
};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{debug, info, warn};

use crate::{
  coordinator::Coordinator,
  filter::TopicFilter,
  stats::{IngestStats, bump},
};

/// Acknowledges an event to the broker. Called at most once: after the
/// event committed, or when it was dropped for good.
pub type Ack = Box<dyn FnOnce() + Send + 'static>;

/// What [`Dispatcher::dispatch`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
  /// Handed to a worker; the ack fires once it commits.
  Queued,
  /// On the exclude list; acked and dropped.
  Excluded,
  /// Failed validation; acked and dropped.
  Malformed,
}

#[derive(Debug, Error)]
#[error("dispatcher is shut down")]
pub struct DispatchClosed;

struct Job {
  event: Event,
  ack:   Ack,
}

pub struct Dispatcher {
  queues:  Vec<mpsc::Sender<Job>>,
  workers: JoinSet<()>,
  filter:  TopicFilter,
  stats:   Arc<IngestStats>,
}

impl Dispatcher {
  /// Spawn `workers` tasks on the current runtime, each with a queue of
  /// `queue_depth` events.
  pub fn start<S>(
    coordinator: Arc<Coordinator<S>>,
    filter: TopicFilter,
    workers: usize,
    queue_depth: usize,
  ) -> Self
  where
    S: StorageBackend + 'static,
  {
    let workers_n = workers.max(1);
    let stats = coordinator.stats().clone();
    let mut queues = Vec::with_capacity(workers_n);
    let mut set = JoinSet::new();

    for worker in 0..workers_n {
      let (tx, rx) = mpsc::channel(queue_depth.max(1));
      queues.push(tx);
      set.spawn(run_worker(worker, coordinator.clone(), rx));
    }

    Self {
      queues,
      workers: set,
      filter,
      stats,
    }
  }

  /// Filter and validate `raw`, then queue it for its topic's worker.
  pub async fn dispatch(&self, raw: RawEvent, ack: Ack) -> Result<Dispatched, DispatchClosed> {
    if !self.filter.allows(&raw.topic) {
      bump(&self.stats.excluded);
      debug!(topic = %raw.topic, "excluded topic dropped");
      ack();
      return Ok(Dispatched::Excluded);
    }

    let event = match raw.validate() {
      Ok(event) => event,
      Err(e) => {
        bump(&self.stats.malformed);
        warn!(error = %e, "malformed event dropped");
        ack();
        return Ok(Dispatched::Malformed);
      }
    };

    let queue = &self.queues[shard(&event.topic, self.queues.len())];
    queue
      .send(Job { event, ack })
      .await
      .map_err(|_| DispatchClosed)?;
    Ok(Dispatched::Queued)
  }

  pub fn stats(&self) -> &Arc<IngestStats> { &self.stats }

  /// Close the queues and wait up to `grace` for the workers to drain them.
  ///
  /// Returns `false` if the grace period lapsed; the remaining workers are
  /// aborted, which rolls back their in-flight transactions.
  pub async fn shutdown(mut self, grace: Duration) -> bool {
    self.queues.clear();
    let drained = tokio::time::timeout(grace, async {
      while self.workers.join_next().await.is_some() {}
    })
    .await
    .is_ok();

    if !drained {
      warn!(?grace, "shutdown grace period lapsed, aborting workers");
      self.workers.shutdown().await;
    }
    info!(drained, "dispatcher stopped");
    drained
  }
}

async fn run_worker<S: StorageBackend>(
  worker: usize,
  coordinator: Arc<Coordinator<S>>,
  mut rx: mpsc::Receiver<Job>,
) {
  while let Some(Job { event, ack }) = rx.recv().await {
    // Failures are logged and counted by the coordinator and stay
    // unacknowledged so the broker can redeliver.
    if coordinator.process(event).await.is_ok() {
      ack();
    }
  }
  debug!(worker, "worker finished");
}

fn shard(topic: &str, shards: usize) -> usize {
  let mut hasher = DefaultHasher::new();
  topic.hash(&mut hasher);
  (hasher.finish() % shards as u64) as usize
}
