//! Per-topic mutual exclusion.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex as StdMutex, PoisonError, Weak},
};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Hands out one async lock per topic string.
///
/// The map only holds weak handles; a topic's entry dies with its last
/// guard and is pruned the next time a new topic is registered.
#[derive(Debug, Default)]
pub struct TopicLocks {
  map: StdMutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl TopicLocks {
  pub fn new() -> Self { Self::default() }

  /// Wait until no other holder has `topic`, then hold it until the guard
  /// is dropped.
  pub async fn lock(&self, topic: &str) -> OwnedMutexGuard<()> {
    let lock = {
      let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
      match map.get(topic).and_then(Weak::upgrade) {
        Some(lock) => lock,
        None => {
          map.retain(|_, weak| weak.strong_count() > 0);
          let lock = Arc::new(Mutex::new(()));
          map.insert(topic.to_owned(), Arc::downgrade(&lock));
          lock
        }
      }
    };
    lock.lock_owned().await
  }

  /// Number of registered topics, live or awaiting pruning.
  pub fn len(&self) -> usize {
    self.map.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}
