//! Integration tests for `SqliteStore` against in-memory and temporary
//! file databases.

use bytes::Bytes;
use chrono::{Duration, Utc};
use mqttmirror_core::{
  event::{Event, QoS},
  history,
  row::{HistoryFlags, RowWrite, TopicRow},
  schema::TableNames,
  store::{Classify, Fault, StorageBackend, StorageTransaction},
  upsert::upsert,
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory(&TableNames::default())
    .await
    .expect("in-memory store")
}

fn event(topic: &str, value: &'static str, offset_secs: i64) -> Event {
  Event::new(
    topic,
    Bytes::from_static(value.as_bytes()),
    QoS::AtMostOnce,
    false,
    Utc::now() + Duration::seconds(offset_secs),
  )
  .unwrap()
}

/// Upsert plus conditional history in one committed transaction.
async fn ingest(s: &SqliteStore, ev: &Event) {
  let mut tx = s.begin().await.unwrap();
  let up = upsert(&mut tx, ev).await.unwrap();
  if up.history_due() {
    history::append_row(&mut tx, &up.row).await.unwrap();
  }
  tx.commit().await.unwrap();
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_store_is_empty() {
  let s = store().await;
  assert!(s.list_rows().await.unwrap().is_empty());
  assert!(s.get_row("home/temp").await.unwrap().is_none());
  assert!(s.history("home/temp").await.unwrap().is_empty());
}

#[tokio::test]
async fn custom_table_names() {
  let names = TableNames::new("sensors").unwrap();
  let s = SqliteStore::open_in_memory(&names).await.unwrap();
  ingest(&s, &event("a", "1", 0)).await;

  let count: i64 = s
    .conn
    .call(|conn| {
      Ok(conn.query_row("SELECT COUNT(*) FROM sensors_history_view", [], |r| r.get(0))?)
    })
    .await
    .unwrap();
  assert_eq!(count, 1);
}

// ─── Rows ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_read_back() {
  let s = store().await;
  let ev = event("home/temp", "20", 0);
  ingest(&s, &ev).await;

  let row = s.get_row("home/temp").await.unwrap().unwrap();
  assert_eq!(row.topic, "home/temp");
  assert_eq!(&row.value[..], b"20");
  assert_eq!(row.ts, ev.received_at);
  assert_eq!(row.qos, QoS::AtMostOnce);
  assert!(!row.retain);
  assert_eq!(row.history, HistoryFlags::default());
}

#[tokio::test]
async fn update_keeps_id_and_flags() {
  let s = store().await;
  ingest(&s, &event("home/temp", "20", 0)).await;
  let before = s.get_row("home/temp").await.unwrap().unwrap();

  s.set_history_flags("home/temp", HistoryFlags { enable: true, diffonly: false })
    .await
    .unwrap();

  let ev = Event::new(
    "home/temp",
    Bytes::from_static(b"21"),
    QoS::ExactlyOnce,
    true,
    Utc::now() + Duration::seconds(30),
  )
  .unwrap();
  ingest(&s, &ev).await;

  let after = s.get_row("home/temp").await.unwrap().unwrap();
  assert_eq!(after.id, before.id);
  assert_eq!(&after.value[..], b"21");
  assert_eq!(after.ts, ev.received_at);
  assert_eq!(after.qos, QoS::ExactlyOnce);
  assert!(after.retain);
  assert_eq!(after.history, HistoryFlags { enable: true, diffonly: false });
}

#[tokio::test]
async fn duplicate_insert_is_a_constraint_fault() {
  let s = store().await;
  ingest(&s, &event("dup", "1", 0)).await;

  let staged = TopicRow::create("dup", Bytes::from_static(b"2"), QoS::AtMostOnce, false, Utc::now());
  let mut tx = s.begin().await.unwrap();
  let err = tx.write_row(RowWrite::Insert(&staged)).await.unwrap_err();
  assert_eq!(err.fault(), Fault::Constraint);
  tx.rollback().await.unwrap();

  assert_eq!(s.list_rows().await.unwrap().len(), 1);
}

#[tokio::test]
async fn topics_are_case_sensitive() {
  let s = store().await;
  ingest(&s, &event("Home/Temp", "1", 0)).await;
  ingest(&s, &event("home/temp", "2", 0)).await;
  assert_eq!(s.list_rows().await.unwrap().len(), 2);
}

#[tokio::test]
async fn ids_are_not_reused_after_delete() {
  let s = store().await;
  ingest(&s, &event("a", "1", 0)).await;
  ingest(&s, &event("b", "1", 0)).await;
  let b_id = s.get_row("b").await.unwrap().unwrap().id;

  s.conn
    .call(|conn| {
      conn.execute("DELETE FROM mqtt WHERE topic = 'b'", [])?;
      Ok(())
    })
    .await
    .unwrap();

  ingest(&s, &event("c", "1", 0)).await;
  let c_id = s.get_row("c").await.unwrap().unwrap().id;
  assert!(c_id > b_id);
}

#[tokio::test]
async fn text_payload_written_by_other_tools_reads_as_bytes() {
  let s = store().await;
  s.conn
    .call(|conn| {
      conn.execute(
        "INSERT INTO mqtt (ts, topic, value) VALUES ('2024-01-01T00:00:00.000000Z', 'legacy', 'on')",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let row = s.get_row("legacy").await.unwrap().unwrap();
  assert_eq!(&row.value[..], b"on");
  assert_eq!(row.history, HistoryFlags::default());
}

// ─── Transactions ────────────────────────────────────────────────────────────

#[tokio::test]
async fn rollback_discards_row_and_history() {
  let s = store().await;
  let mut tx = s.begin().await.unwrap();
  let up = upsert(&mut tx, &event("t", "1", 0)).await.unwrap();
  history::append_row(&mut tx, &up.row).await.unwrap();
  tx.rollback().await.unwrap();

  assert!(s.get_row("t").await.unwrap().is_none());
  assert!(s.history("t").await.unwrap().is_empty());
}

#[tokio::test]
async fn dropped_transaction_rolls_back() {
  let s = store().await;
  {
    let mut tx = s.begin().await.unwrap();
    upsert(&mut tx, &event("t", "1", 0)).await.unwrap();
  }

  // The next transaction waits for the scheduled rollback.
  let mut tx = s.begin().await.unwrap();
  assert!(tx.read_row_by_topic("t").await.unwrap().is_none());
  tx.commit().await.unwrap();
}

#[tokio::test]
async fn uncommitted_update_is_invisible_after_rollback() {
  let s = store().await;
  ingest(&s, &event("t", "1", 0)).await;

  let mut tx = s.begin().await.unwrap();
  upsert(&mut tx, &event("t", "2", 5)).await.unwrap();
  tx.rollback().await.unwrap();

  let row = s.get_row("t").await.unwrap().unwrap();
  assert_eq!(&row.value[..], b"1");
}

// ─── History ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_view_joins_topic_and_last_write() {
  let s = store().await;
  let e1 = event("home/temp", "20", 0);
  let e2 = event("home/temp", "21", 10);
  ingest(&s, &e1).await;
  ingest(&s, &e2).await;

  let hist = s.history("home/temp").await.unwrap();
  assert_eq!(hist.len(), 2);
  assert!(hist[0].id < hist[1].id);
  assert_eq!(&hist[0].value[..], b"20");
  assert_eq!(hist[0].ts, e1.received_at);
  assert_eq!(&hist[1].value[..], b"21");
  assert_eq!(hist[1].ts, e2.received_at);
  assert!(hist.iter().all(|h| h.topic == "home/temp"));
  assert!(hist.iter().all(|h| h.ts_last == e2.received_at));
}

#[tokio::test]
async fn set_history_flags_on_unknown_topic() {
  let s = store().await;
  let changed = s
    .set_history_flags("nope", HistoryFlags { enable: false, diffonly: false })
    .await
    .unwrap();
  assert!(!changed);
}

// ─── File-backed ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn file_store_persists_across_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("mqtt.db");
  let names = TableNames::default();

  {
    let s = SqliteStore::open(&path, &names).await.unwrap();
    ingest(&s, &event("home/temp", "20", 0)).await;
  }

  let s = SqliteStore::open(&path, &names).await.unwrap();
  let row = s.get_row("home/temp").await.unwrap().unwrap();
  assert_eq!(&row.value[..], b"20");
  assert_eq!(s.history("home/temp").await.unwrap().len(), 1);
}
