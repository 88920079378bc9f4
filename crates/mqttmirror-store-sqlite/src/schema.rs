//! SQL schema and statements for the mqttmirror SQLite store.
//!
//! Executed once at connection startup. Table names come from
//! [`TableNames`], which only admits plain identifiers.

use mqttmirror_core::schema::TableNames;

use crate::encode::{ENTRY_COLUMNS, ROW_COLUMNS};

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
///
/// `AUTOINCREMENT` keeps row ids from being reused after a delete.
/// `topic_ref` carries no FOREIGN KEY: the embedded store assumes
/// referential integrity rather than enforcing it.
pub fn schema(names: &TableNames) -> String {
  let TableNames { topics, history, view } = names;
  format!(
    "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS \"{topics}\" (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    ts               TEXT    NOT NULL,              -- RFC 3339 UTC, last write
    topic            TEXT    NOT NULL UNIQUE,
    value            BLOB    NOT NULL,
    qos              INTEGER NOT NULL DEFAULT 0,
    retain           INTEGER NOT NULL DEFAULT 0,
    history_enable   INTEGER NOT NULL DEFAULT 1,
    history_diffonly INTEGER NOT NULL DEFAULT 1
);

-- Strictly append-only; ingestion never issues UPDATE or DELETE here.
CREATE TABLE IF NOT EXISTS \"{history}\" (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    ts        TEXT    NOT NULL,
    topic_ref INTEGER NOT NULL,
    value     BLOB
);

CREATE INDEX IF NOT EXISTS \"{history}_topic_ref_idx\" ON \"{history}\"(topic_ref);

CREATE VIEW IF NOT EXISTS \"{view}\" AS
    SELECT h.id    AS id,
           h.ts    AS ts,
           m.ts    AS ts_last,
           m.topic AS topic,
           h.value AS value
      FROM \"{history}\" h
      JOIN \"{topics}\"  m ON m.id = h.topic_ref;

PRAGMA user_version = 1;
"
  )
}

/// Prepared SQL text for one set of table names.
pub struct Statements {
  pub ddl:             String,
  pub select_by_topic: String,
  pub select_all:      String,
  pub insert_row:      String,
  pub update_row:      String,
  pub insert_history:  String,
  pub select_history:  String,
  pub update_flags:    String,
}

impl Statements {
  pub fn new(names: &TableNames) -> Self {
    let TableNames { topics, history, view } = names;
    Self {
      ddl:             schema(names),
      select_by_topic: format!("SELECT {ROW_COLUMNS} FROM \"{topics}\" WHERE topic = ?1"),
      select_all:      format!("SELECT {ROW_COLUMNS} FROM \"{topics}\" ORDER BY id"),
      insert_row:      format!(
        "INSERT INTO \"{topics}\" (ts, topic, value, qos, retain, history_enable, history_diffonly)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
      ),
      update_row:      format!(
        "UPDATE \"{topics}\" SET ts = ?1, value = ?2, qos = ?3, retain = ?4 WHERE id = ?5"
      ),
      insert_history:  format!(
        "INSERT INTO \"{history}\" (ts, topic_ref, value) VALUES (?1, ?2, ?3)"
      ),
      select_history:  format!(
        "SELECT {ENTRY_COLUMNS} FROM \"{view}\" WHERE topic = ?1 ORDER BY id"
      ),
      update_flags:    format!(
        "UPDATE \"{topics}\" SET history_enable = ?1, history_diffonly = ?2 WHERE topic = ?3"
      ),
    }
  }
}
