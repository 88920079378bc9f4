//! Error type for `mqttmirror-store-mysql`.

use mqttmirror_core::store::{Classify, Fault};
use sqlx::mysql::MySqlDatabaseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] mqttmirror_core::Error),

  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("identifier {0} out of range")]
  IdOutOfRange(u64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Classify for Error {
  fn fault(&self) -> Fault {
    match self {
      Error::Database(e) => classify_sqlx(e),
      _ => Fault::Permanent,
    }
  }
}

fn classify_sqlx(e: &sqlx::Error) -> Fault {
  match e {
    sqlx::Error::Io(_)
    | sqlx::Error::Tls(_)
    | sqlx::Error::PoolTimedOut
    | sqlx::Error::PoolClosed
    | sqlx::Error::WorkerCrashed => Fault::Unavailable,
    sqlx::Error::Database(db) => match db.try_downcast_ref::<MySqlDatabaseError>() {
      Some(my) => classify_code(my.number()),
      None if db.is_unique_violation() => Fault::Constraint,
      None => Fault::Permanent,
    },
    _ => Fault::Permanent,
  }
}

/// Map a MySQL server error number to a [`Fault`].
///
/// - 1040 too many connections, 1205 lock wait timeout, 1213 deadlock,
///   2006 server gone away, 2013 lost connection: retry.
/// - 1062 duplicate entry: constraint.
pub fn classify_code(number: u16) -> Fault {
  match number {
    1040 | 1205 | 1213 | 2006 | 2013 => Fault::Unavailable,
    1062 => Fault::Constraint,
    _ => Fault::Permanent,
  }
}
