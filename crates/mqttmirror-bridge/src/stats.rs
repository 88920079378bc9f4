//! Process-wide ingestion counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct IngestStats {
  pub(crate) received:         AtomicU64,
  pub(crate) committed:        AtomicU64,
  pub(crate) history_appended: AtomicU64,
  pub(crate) history_skipped:  AtomicU64,
  pub(crate) malformed:        AtomicU64,
  pub(crate) excluded:         AtomicU64,
  pub(crate) failed:           AtomicU64,
  pub(crate) retries:          AtomicU64,
}

/// A point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
  pub received:         u64,
  pub committed:        u64,
  pub history_appended: u64,
  pub history_skipped:  u64,
  pub malformed:        u64,
  pub excluded:         u64,
  pub failed:           u64,
  pub retries:          u64,
}

pub(crate) fn bump(counter: &AtomicU64) { counter.fetch_add(1, Ordering::Relaxed); }

impl IngestStats {
  pub fn snapshot(&self) -> StatsSnapshot {
    let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
    StatsSnapshot {
      received:         get(&self.received),
      committed:        get(&self.committed),
      history_appended: get(&self.history_appended),
      history_skipped:  get(&self.history_skipped),
      malformed:        get(&self.malformed),
      excluded:         get(&self.excluded),
      failed:           get(&self.failed),
      retries:          get(&self.retries),
    }
  }
}
