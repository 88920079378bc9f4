//! An in-memory transaction for exercising the engine without a database.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
  history::HistoryRecord,
  row::{RowId, RowWrite, TopicRow},
  store::{Classify, Fault, StorageTransaction},
};

#[derive(Debug, Error)]
pub enum MemoryError {
  #[error("duplicate topic {0:?}")]
  Duplicate(String),
  #[error("no row with id {0}")]
  Missing(RowId),
}

impl Classify for MemoryError {
  fn fault(&self) -> Fault {
    match self {
      MemoryError::Duplicate(_) => Fault::Constraint,
      MemoryError::Missing(_) => Fault::Permanent,
    }
  }
}

#[derive(Debug, Default)]
pub struct MemoryTables {
  pub rows:    Vec<TopicRow>,
  pub history: Vec<HistoryRecord>,
  pub writes:  usize,
}

impl StorageTransaction for MemoryTables {
  type Error = MemoryError;

  async fn read_row_by_topic(&mut self, topic: &str) -> Result<Option<TopicRow>, MemoryError> {
    Ok(self.rows.iter().find(|r| r.topic == topic).cloned())
  }

  async fn write_row(&mut self, write: RowWrite<'_>) -> Result<TopicRow, MemoryError> {
    self.writes += 1;
    match write {
      RowWrite::Insert(staged) => {
        if self.rows.iter().any(|r| r.topic == staged.topic) {
          return Err(MemoryError::Duplicate(staged.topic.clone()));
        }
        let id = self.rows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let row = staged.clone().with_id(id);
        self.rows.push(row.clone());
        Ok(row)
      }
      RowWrite::Update(row) => {
        let slot = self
          .rows
          .iter_mut()
          .find(|r| r.id == row.id)
          .ok_or(MemoryError::Missing(row.id))?;
        slot.value = row.value.clone();
        slot.ts = row.ts;
        slot.qos = row.qos;
        slot.retain = row.retain;
        Ok(slot.clone())
      }
    }
  }

  async fn append_history_row(
    &mut self,
    topic_id: RowId,
    value: &Bytes,
    ts: DateTime<Utc>,
  ) -> Result<HistoryRecord, MemoryError> {
    let record = HistoryRecord {
      id: self.history.len() as i64 + 1,
      ts,
      topic_ref: topic_id,
      value: value.clone(),
    };
    self.history.push(record.clone());
    Ok(record)
  }

  async fn commit(self) -> Result<(), MemoryError> { Ok(()) }

  async fn rollback(self) -> Result<(), MemoryError> { Ok(()) }
}
