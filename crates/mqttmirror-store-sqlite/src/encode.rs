//! Encoding and decoding helpers between the core row types and the plain
//! column values stored in SQLite.
//!
//! Timestamps are stored as RFC 3339 UTC strings with microsecond precision,
//! so they sort lexically. Payloads are stored as BLOBs; rows written by
//! other tools as TEXT are read back as their UTF-8 bytes.

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use mqttmirror_core::{
  event::QoS,
  history::HistoryEntry,
  row::{HistoryFlags, TopicRow},
};
use rusqlite::types::{FromSqlError, ValueRef};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── QoS ─────────────────────────────────────────────────────────────────────

pub fn encode_qos(q: QoS) -> i64 { q.level().into() }

// ─── Payload ─────────────────────────────────────────────────────────────────

/// Read a payload column that may hold either a BLOB or TEXT.
pub fn payload_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Vec<u8>> {
  match row.get_ref(idx)? {
    ValueRef::Blob(b) | ValueRef::Text(b) => Ok(b.to_vec()),
    ValueRef::Null => Ok(Vec::new()),
    other => Err(rusqlite::Error::FromSqlConversionFailure(
      idx,
      other.data_type(),
      Box::new(FromSqlError::InvalidType),
    )),
  }
}

// ─── Raw row types (plain column values from SQLite) ─────────────────────────

pub const ROW_COLUMNS: &str =
  "id, topic, value, ts, qos, retain, history_enable, history_diffonly";

pub struct RawRow {
  pub id:               i64,
  pub topic:            String,
  pub value:            Vec<u8>,
  pub ts:               String,
  pub qos:              i64,
  pub retain:           bool,
  pub history_enable:   bool,
  pub history_diffonly: bool,
}

impl RawRow {
  /// Map a row selected with [`ROW_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      topic:            row.get(1)?,
      value:            payload_at(row, 2)?,
      ts:               row.get(3)?,
      qos:              row.get(4)?,
      retain:           row.get(5)?,
      history_enable:   row.get(6)?,
      history_diffonly: row.get(7)?,
    })
  }

  pub fn into_row(self) -> Result<TopicRow> {
    Ok(TopicRow {
      id:      self.id,
      topic:   self.topic,
      value:   Bytes::from(self.value),
      ts:      decode_dt(&self.ts)?,
      qos:     QoS::try_from(self.qos)?,
      retain:  self.retain,
      history: HistoryFlags {
        enable:   self.history_enable,
        diffonly: self.history_diffonly,
      },
    })
  }
}

pub const ENTRY_COLUMNS: &str = "id, ts, ts_last, topic, value";

pub struct RawEntry {
  pub id:      i64,
  pub ts:      String,
  pub ts_last: String,
  pub topic:   String,
  pub value:   Vec<u8>,
}

impl RawEntry {
  /// Map a row selected with [`ENTRY_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:      row.get(0)?,
      ts:      row.get(1)?,
      ts_last: row.get(2)?,
      topic:   row.get(3)?,
      value:   payload_at(row, 4)?,
    })
  }

  pub fn into_entry(self) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
      id:      self.id,
      ts:      decode_dt(&self.ts)?,
      ts_last: decode_dt(&self.ts_last)?,
      topic:   self.topic,
      value:   Bytes::from(self.value),
    })
  }
}
