//! Topic rows: the latest-value table, one row per topic.
//!
//! A row is created once, on the first event for its topic, and from then
//! on only mutated in place. The identifier and the two history-control
//! flags are never touched by ingestion; the flags belong to whoever
//! administers the database.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::event::{Event, QoS};

/// Surrogate identifier of a topic row, assigned by the backend on insert.
pub type RowId = i64;

/// Per-topic switches that govern history recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryFlags {
  /// Record any history at all for this topic.
  pub enable:   bool,
  /// Record only updates that change the value.
  pub diffonly: bool,
}

impl Default for HistoryFlags {
  fn default() -> Self {
    Self {
      enable:   true,
      diffonly: true,
    }
  }
}

/// A persisted row of the latest-value table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRow {
  pub id:      RowId,
  pub topic:   String,
  pub value:   Bytes,
  /// Time of the last write, UTC.
  pub ts:      DateTime<Utc>,
  pub qos:     QoS,
  pub retain:  bool,
  pub history: HistoryFlags,
}

/// A row staged for insertion; it has no identifier until the backend
/// assigns one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTopicRow {
  pub topic:   String,
  pub value:   Bytes,
  pub ts:      DateTime<Utc>,
  pub qos:     QoS,
  pub retain:  bool,
  pub history: HistoryFlags,
}

impl NewTopicRow {
  /// Attach the identifier the backend assigned on insert.
  pub fn with_id(self, id: RowId) -> TopicRow {
    TopicRow {
      id,
      topic: self.topic,
      value: self.value,
      ts: self.ts,
      qos: self.qos,
      retain: self.retain,
      history: self.history,
    }
  }
}

/// A single row write handed to the backend.
#[derive(Debug, Clone, Copy)]
pub enum RowWrite<'a> {
  /// Insert a new row; the backend assigns the identifier.
  Insert(&'a NewTopicRow),
  /// Overwrite the mutable columns of the row with this identifier.
  Update(&'a TopicRow),
}

impl TopicRow {
  /// Stage a first-seen topic with default history flags.
  pub fn create(
    topic: impl Into<String>,
    value: Bytes,
    qos: QoS,
    retain: bool,
    ts: DateTime<Utc>,
  ) -> NewTopicRow {
    NewTopicRow {
      topic: topic.into(),
      value,
      ts,
      qos,
      retain,
      history: HistoryFlags::default(),
    }
  }

  /// Stage a row for `event`.
  pub fn create_from(event: &Event) -> NewTopicRow {
    Self::create(
      event.topic.clone(),
      event.payload.clone(),
      event.qos,
      event.retain,
      event.received_at,
    )
  }

  /// Overwrite value, timestamp and delivery metadata in place and return
  /// the previous value. `id`, `topic` and `history` are preserved.
  pub fn apply_update(
    &mut self,
    value: Bytes,
    qos: QoS,
    retain: bool,
    ts: DateTime<Utc>,
  ) -> Bytes {
    self.ts = ts;
    self.qos = qos;
    self.retain = retain;
    std::mem::replace(&mut self.value, value)
  }
}
