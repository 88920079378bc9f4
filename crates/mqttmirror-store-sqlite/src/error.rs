//! Error type for `mqttmirror-store-sqlite`.

use mqttmirror_core::store::{Classify, Fault};
use rusqlite::{ErrorCode, ffi};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] mqttmirror_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// An update targeted a row id that no longer exists.
  #[error("row {0} vanished during the transaction")]
  RowMissing(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Classify for Error {
  fn fault(&self) -> Fault {
    match self {
      Error::Database(tokio_rusqlite::Error::ConnectionClosed) => Fault::Unavailable,
      Error::Database(tokio_rusqlite::Error::Rusqlite(e)) => classify_rusqlite(e),
      _ => Fault::Permanent,
    }
  }
}

fn classify_rusqlite(e: &rusqlite::Error) -> Fault {
  let rusqlite::Error::SqliteFailure(err, _) = e else {
    return Fault::Permanent;
  };
  match err.code {
    ErrorCode::DatabaseBusy
    | ErrorCode::DatabaseLocked
    | ErrorCode::SystemIoFailure
    | ErrorCode::CannotOpen => Fault::Unavailable,
    ErrorCode::ConstraintViolation
      if matches!(
        err.extended_code,
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
      ) =>
    {
      Fault::Constraint
    }
    _ => Fault::Permanent,
  }
}
