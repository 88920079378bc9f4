//! Error types for `mqttmirror-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("malformed event: {0}")]
  MalformedEvent(String),

  #[error("invalid table name: {0:?}")]
  InvalidTableName(String),

  #[error("invalid qos level: {0}")]
  InvalidQos(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
