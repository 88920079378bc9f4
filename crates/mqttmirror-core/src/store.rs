//! The storage adapter traits.
//!
//! [`StorageBackend`] is implemented by the backends (`mqttmirror-store-sqlite`,
//! `mqttmirror-store-mysql`). The ingestion path only ever touches the tables
//! through a [`StorageTransaction`], so a row write and its history record
//! commit or roll back together.
//!
//! All methods return `Send` futures so backends can be driven from
//! multi-threaded tokio workers.

use std::future::Future;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::{
  history::{HistoryEntry, HistoryRecord},
  row::{HistoryFlags, RowId, RowWrite, TopicRow},
};

// ─── Fault classification ────────────────────────────────────────────────────

/// How the ingestion core should react to a storage error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
  /// Connection, transport, lock contention: worth retrying after a pause.
  Unavailable,
  /// A uniqueness constraint rejected the write.
  Constraint,
  /// Anything else; retrying will not help.
  Permanent,
}

/// Implemented by every backend error type.
pub trait Classify {
  fn fault(&self) -> Fault;
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// One open transaction against the latest-value and history tables.
///
/// Dropping a transaction without calling [`commit`](Self::commit) rolls it
/// back.
pub trait StorageTransaction: Send {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  /// Look up the row for an exact, case-sensitive topic.
  fn read_row_by_topic<'a>(
    &'a mut self,
    topic: &'a str,
  ) -> impl Future<Output = Result<Option<TopicRow>, Self::Error>> + Send + 'a;

  /// Insert a new row or update an existing one by identifier, returning
  /// the row as persisted.
  ///
  /// An insert that collides with an existing topic fails with an error
  /// classified as [`Fault::Constraint`].
  fn write_row<'a>(
    &'a mut self,
    write: RowWrite<'a>,
  ) -> impl Future<Output = Result<TopicRow, Self::Error>> + Send + 'a;

  /// Append one history record referencing `topic_id`.
  fn append_history_row<'a>(
    &'a mut self,
    topic_id: RowId,
    value: &'a Bytes,
    ts: DateTime<Utc>,
  ) -> impl Future<Output = Result<HistoryRecord, Self::Error>> + Send + 'a;

  fn commit(self) -> impl Future<Output = Result<(), Self::Error>> + Send;

  fn rollback(self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Abstraction over a storage backend holding the `mqtt` tables.
pub trait StorageBackend: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;
  type Transaction: StorageTransaction<Error = Self::Error>;

  /// Open a transaction.
  fn begin(&self) -> impl Future<Output = Result<Self::Transaction, Self::Error>> + Send + '_;

  /// The single source of "now" for event timestamps: UTC, truncated to
  /// the precision the backend stores.
  fn current_time(&self) -> DateTime<Utc>;

  // ── Reads and administration ──────────────────────────────────────────

  /// Read the committed row for `topic`.
  fn get_row<'a>(
    &'a self,
    topic: &'a str,
  ) -> impl Future<Output = Result<Option<TopicRow>, Self::Error>> + Send + 'a;

  /// All committed rows, in identifier order.
  fn list_rows(&self) -> impl Future<Output = Result<Vec<TopicRow>, Self::Error>> + Send + '_;

  /// History of `topic` through the history view, oldest first.
  fn history<'a>(
    &'a self,
    topic: &'a str,
  ) -> impl Future<Output = Result<Vec<HistoryEntry>, Self::Error>> + Send + 'a;

  /// Overwrite the history flags of `topic` the way an operator would by
  /// hand. Returns `false` if the topic has no row.
  fn set_history_flags<'a>(
    &'a self,
    topic: &'a str,
    flags: HistoryFlags,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}
