//! The SQLite implementation of [`StorageBackend`].

use std::{path::Path, sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use mqttmirror_core::{
  event::normalize_ts,
  history::{HistoryEntry, HistoryRecord},
  row::{HistoryFlags, RowId, RowWrite, TopicRow},
  schema::TableNames,
  store::{StorageBackend, StorageTransaction},
};
use rusqlite::OptionalExtension as _;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
  encode::{encode_dt, encode_qos, RawEntry, RawRow},
  schema::Statements,
  Error, Result,
};

/// How long SQLite waits on a lock held by another process before
/// reporting `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// The mqttmirror tables in a single SQLite file.
///
/// There is one connection. A transaction holds `gate` from `BEGIN` until it
/// finishes, so statements of different transactions never interleave on
/// it. Clones share the connection and the gate.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  gate: Arc<Mutex<()>>,
  sql:  Arc<Statements>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, names: &TableNames) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, names).await
  }

  /// Open an in-memory store.
  pub async fn open_in_memory(names: &TableNames) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, names).await
  }

  async fn init(conn: tokio_rusqlite::Connection, names: &TableNames) -> Result<Self> {
    let store = Self {
      conn,
      gate: Arc::new(Mutex::new(())),
      sql: Arc::new(Statements::new(names)),
    };
    let sql = store.sql.clone();
    store
      .conn
      .call(move |conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(&sql.ddl)?;
        Ok(())
      })
      .await?;
    Ok(store)
  }
}

// ─── Transaction ─────────────────────────────────────────────────────────────

/// An open `BEGIN IMMEDIATE` transaction on a [`SqliteStore`].
///
/// Dropping it unfinished schedules a `ROLLBACK` on the connection; the gate
/// is released only once that has run.
pub struct SqliteTransaction {
  conn:  tokio_rusqlite::Connection,
  sql:   Arc<Statements>,
  guard: Option<OwnedMutexGuard<()>>,
}

impl SqliteTransaction {
  async fn begin(store: &SqliteStore) -> Result<Self> {
    let guard = store.gate.clone().lock_owned().await;
    // Constructed before BEGIN runs so that a cancelled or failed BEGIN is
    // still followed by a ROLLBACK from `drop`.
    let tx = Self {
      conn:  store.conn.clone(),
      sql:   store.sql.clone(),
      guard: Some(guard),
    };
    tx.conn
      .call(|conn| {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
      })
      .await?;
    Ok(tx)
  }

  async fn finish(mut self, statement: &'static str) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(statement)?;
        Ok(())
      })
      .await?;
    self.guard.take();
    Ok(())
  }
}

impl Drop for SqliteTransaction {
  fn drop(&mut self) {
    let Some(guard) = self.guard.take() else { return };
    let conn = self.conn.clone();
    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        handle.spawn(async move {
          let result = conn
            .call(|conn| {
              conn.execute_batch("ROLLBACK")?;
              Ok(())
            })
            .await;
          if let Err(e) = result {
            tracing::debug!(error = %e, "rollback of abandoned transaction failed");
          }
          drop(guard);
        });
      }
      Err(_) => {
        tracing::warn!("sqlite transaction dropped outside a runtime; rollback skipped");
      }
    }
  }
}

impl StorageTransaction for SqliteTransaction {
  type Error = Error;

  async fn read_row_by_topic(&mut self, topic: &str) -> Result<Option<TopicRow>> {
    let sql = self.sql.clone();
    let topic = topic.to_owned();

    let raw: Option<RawRow> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(&sql.select_by_topic, rusqlite::params![topic], RawRow::from_row)
          .optional()?)
      })
      .await?;

    raw.map(RawRow::into_row).transpose()
  }

  async fn write_row(&mut self, write: RowWrite<'_>) -> Result<TopicRow> {
    let sql = self.sql.clone();

    match write {
      RowWrite::Insert(staged) => {
        let topic   = staged.topic.clone();
        let value   = staged.value.to_vec();
        let ts_str  = encode_dt(staged.ts);
        let qos     = encode_qos(staged.qos);
        let retain  = staged.retain;
        let history = staged.history;

        let id: RowId = self
          .conn
          .call(move |conn| {
            conn.execute(
              &sql.insert_row,
              rusqlite::params![
                ts_str,
                topic,
                value,
                qos,
                retain,
                history.enable,
                history.diffonly,
              ],
            )?;
            Ok(conn.last_insert_rowid())
          })
          .await?;

        Ok(staged.clone().with_id(id))
      }
      RowWrite::Update(row) => {
        let id     = row.id;
        let value  = row.value.to_vec();
        let ts_str = encode_dt(row.ts);
        let qos    = encode_qos(row.qos);
        let retain = row.retain;

        let changed = self
          .conn
          .call(move |conn| {
            Ok(conn.execute(
              &sql.update_row,
              rusqlite::params![ts_str, value, qos, retain, id],
            )?)
          })
          .await?;

        if changed != 1 {
          return Err(Error::RowMissing(id));
        }
        Ok(row.clone())
      }
    }
  }

  async fn append_history_row(
    &mut self,
    topic_id: RowId,
    value: &Bytes,
    ts: DateTime<Utc>,
  ) -> Result<HistoryRecord> {
    let sql    = self.sql.clone();
    let blob   = value.to_vec();
    let ts_str = encode_dt(ts);

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(&sql.insert_history, rusqlite::params![ts_str, topic_id, blob])?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(HistoryRecord {
      id,
      ts,
      topic_ref: topic_id,
      value: value.clone(),
    })
  }

  async fn commit(self) -> Result<()> { self.finish("COMMIT").await }

  async fn rollback(self) -> Result<()> { self.finish("ROLLBACK").await }
}

// ─── StorageBackend impl ─────────────────────────────────────────────────────

impl StorageBackend for SqliteStore {
  type Error = Error;
  type Transaction = SqliteTransaction;

  async fn begin(&self) -> Result<SqliteTransaction> { SqliteTransaction::begin(self).await }

  fn current_time(&self) -> DateTime<Utc> { normalize_ts(Utc::now()) }

  async fn get_row(&self, topic: &str) -> Result<Option<TopicRow>> {
    let _gate = self.gate.lock().await;
    let sql = self.sql.clone();
    let topic = topic.to_owned();

    let raw: Option<RawRow> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(&sql.select_by_topic, rusqlite::params![topic], RawRow::from_row)
          .optional()?)
      })
      .await?;

    raw.map(RawRow::into_row).transpose()
  }

  async fn list_rows(&self) -> Result<Vec<TopicRow>> {
    let _gate = self.gate.lock().await;
    let sql = self.sql.clone();

    let raws: Vec<RawRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql.select_all)?;
        let rows = stmt
          .query_map([], RawRow::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRow::into_row).collect()
  }

  async fn history(&self, topic: &str) -> Result<Vec<HistoryEntry>> {
    let _gate = self.gate.lock().await;
    let sql = self.sql.clone();
    let topic = topic.to_owned();

    let raws: Vec<RawEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql.select_history)?;
        let rows = stmt
          .query_map(rusqlite::params![topic], RawEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntry::into_entry).collect()
  }

  async fn set_history_flags(&self, topic: &str, flags: HistoryFlags) -> Result<bool> {
    let _gate = self.gate.lock().await;
    let sql = self.sql.clone();
    let topic = topic.to_owned();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          &sql.update_flags,
          rusqlite::params![flags.enable, flags.diffonly, topic],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }
}
