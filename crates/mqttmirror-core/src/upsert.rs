//! The upsert engine: apply one event to the latest-value table.

use bytes::Bytes;

use crate::{
  event::Event,
  policy::should_record,
  row::{RowWrite, TopicRow},
  store::StorageTransaction,
};

/// The result of one upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
  /// The row as persisted by this write.
  pub row:       TopicRow,
  /// `true` when this write created the row.
  pub is_new:    bool,
  /// The value the row held before this write; `None` for a new row.
  pub old_value: Option<Bytes>,
}

impl Upserted {
  /// Run the history policy against the pre- and post-write state, using
  /// the flags persisted on the row.
  pub fn history_due(&self) -> bool {
    should_record(
      self.old_value.as_deref(),
      &self.row.value,
      self.row.history.enable,
      self.row.history.diffonly,
    )
  }
}

/// Insert the row for `event.topic` if absent, otherwise update it in place.
///
/// Performs exactly one row write. A concurrent first insert of the same
/// topic surfaces as the backend's [`Fault::Constraint`](crate::store::Fault)
/// error; the caller decides whether to re-read and retry.
pub async fn upsert<T: StorageTransaction>(
  tx: &mut T,
  event: &Event,
) -> Result<Upserted, T::Error> {
  match tx.read_row_by_topic(&event.topic).await? {
    None => {
      let staged = TopicRow::create_from(event);
      let row = tx.write_row(RowWrite::Insert(&staged)).await?;
      Ok(Upserted {
        row,
        is_new: true,
        old_value: None,
      })
    }
    Some(mut current) => {
      let old = current.apply_update(
        event.payload.clone(),
        event.qos,
        event.retain,
        event.received_at,
      );
      let row = tx.write_row(RowWrite::Update(&current)).await?;
      Ok(Upserted {
        row,
        is_new: false,
        old_value: Some(old),
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use bytes::Bytes;
  use chrono::{Duration, Utc};

  use super::*;
  use crate::{
    event::QoS,
    history,
    row::HistoryFlags,
    testing::MemoryTables,
  };

  fn event(topic: &str, value: &'static [u8], offset_secs: i64) -> Event {
    Event::new(
      topic,
      Bytes::from_static(value),
      QoS::AtMostOnce,
      false,
      Utc::now() + Duration::seconds(offset_secs),
    )
    .unwrap()
  }

  #[tokio::test]
  async fn first_event_inserts_with_defaults() {
    let mut tx = MemoryTables::default();
    let up = upsert(&mut tx, &event("home/temp", b"20", 0)).await.unwrap();

    assert!(up.is_new);
    assert_eq!(up.old_value, None);
    assert_eq!(up.row.id, 1);
    assert_eq!(up.row.history, HistoryFlags::default());
    assert_eq!(tx.rows.len(), 1);
    assert!(up.history_due());
  }

  #[tokio::test]
  async fn later_event_updates_in_place() {
    let mut tx = MemoryTables::default();
    let first = upsert(&mut tx, &event("home/temp", b"20", 0)).await.unwrap();
    let ev = Event::new(
      "home/temp",
      Bytes::from_static(b"21"),
      QoS::ExactlyOnce,
      true,
      Utc::now() + Duration::seconds(10),
    )
    .unwrap();
    let second = upsert(&mut tx, &ev).await.unwrap();

    assert!(!second.is_new);
    assert_eq!(second.row.id, first.row.id);
    assert_eq!(second.old_value.as_deref(), Some(&b"20"[..]));
    assert_eq!(&second.row.value[..], b"21");
    assert_eq!(second.row.ts, ev.received_at);
    assert_eq!(second.row.qos, QoS::ExactlyOnce);
    assert!(second.row.retain);
    assert_eq!(tx.rows.len(), 1);
    assert_eq!(tx.writes, 2);
  }

  #[tokio::test]
  async fn distinct_topics_get_distinct_ids() {
    let mut tx = MemoryTables::default();
    let a = upsert(&mut tx, &event("a", b"1", 0)).await.unwrap();
    let b = upsert(&mut tx, &event("b", b"1", 0)).await.unwrap();
    let upper = upsert(&mut tx, &event("A", b"1", 0)).await.unwrap();

    assert!(a.row.id < b.row.id && b.row.id < upper.row.id);
    assert_eq!(tx.rows.len(), 3);
  }

  #[tokio::test]
  async fn persisted_flags_drive_the_policy() {
    let mut tx = MemoryTables::default();
    upsert(&mut tx, &event("t", b"1", 0)).await.unwrap();
    tx.rows[0].history = HistoryFlags { enable: true, diffonly: false };

    let repeat = upsert(&mut tx, &event("t", b"1", 1)).await.unwrap();
    assert!(repeat.history_due());

    tx.rows[0].history = HistoryFlags { enable: false, diffonly: false };
    let off = upsert(&mut tx, &event("t", b"2", 2)).await.unwrap();
    assert!(!off.history_due());
  }

  #[tokio::test]
  async fn writer_appends_row_state() {
    let mut tx = MemoryTables::default();
    let up = upsert(&mut tx, &event("t", b"1", 0)).await.unwrap();
    let rec = history::append_row(&mut tx, &up.row).await.unwrap();

    assert_eq!(rec.topic_ref, up.row.id);
    assert_eq!(rec.ts, up.row.ts);
    assert_eq!(&rec.value[..], b"1");
    assert_eq!(tx.history.len(), 1);
  }
}
