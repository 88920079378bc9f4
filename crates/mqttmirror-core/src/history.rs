//! History records and the history writer.
//!
//! History is strictly append-only: the writer exposes no way to update or
//! delete a record. Retention and pruning are left to the database owner.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::{
  row::{RowId, TopicRow},
  store::StorageTransaction,
};

/// Identifier of a history record; strictly increasing in insertion order.
pub type HistoryId = i64;

/// One appended record of the history table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
  pub id:        HistoryId,
  /// Equal to the write timestamp of the topic row that produced it.
  pub ts:        DateTime<Utc>,
  pub topic_ref: RowId,
  pub value:     Bytes,
}

/// A row of the history view: a record joined with its owning topic row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
  pub id:      HistoryId,
  /// When the record was appended.
  pub ts:      DateTime<Utc>,
  /// The owning row's current last-write time.
  pub ts_last: DateTime<Utc>,
  pub topic:   String,
  pub value:   Bytes,
}

/// Append a history record for a topic row.
///
/// Call only inside the transaction that wrote `topic_id`, after the write;
/// the row must exist before anything references it.
pub async fn append<T: StorageTransaction>(
  tx: &mut T,
  topic_id: RowId,
  value: &Bytes,
  ts: DateTime<Utc>,
) -> Result<HistoryRecord, T::Error> {
  tx.append_history_row(topic_id, value, ts).await
}

/// Append the current state of a freshly written row.
pub async fn append_row<T: StorageTransaction>(
  tx: &mut T,
  row: &TopicRow,
) -> Result<HistoryRecord, T::Error> {
  append(tx, row.id, &row.value, row.ts).await
}
