//! Terminal failures of one event.

use std::time::Duration;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why an event ended in the `failed` state. Every variant means the
/// event's transaction was rolled back.
#[derive(Debug, Error)]
pub enum IngestError {
  /// The backend stayed unreachable through every retry.
  #[error("storage unavailable after {attempts} attempt(s): {source}")]
  StorageUnavailable {
    attempts: u32,
    #[source]
    source:   BoxError,
  },
  /// A uniqueness race recurred after the single re-read.
  #[error("constraint violation on {topic:?}: {source}")]
  ConstraintViolation {
    topic:  String,
    #[source]
    source: BoxError,
  },
  #[error("malformed event: {0}")]
  MalformedEvent(#[from] mqttmirror_core::Error),
  #[error("processing {topic:?} exceeded {after:?}")]
  Timeout { topic: String, after: Duration },
  /// A storage error that retrying cannot fix.
  #[error("storage error: {0}")]
  Storage(#[source] BoxError),
}

impl IngestError {
  /// Short, stable name for log fields.
  pub fn kind(&self) -> &'static str {
    match self {
      IngestError::StorageUnavailable { .. } => "storage_unavailable",
      IngestError::ConstraintViolation { .. } => "constraint_violation",
      IngestError::MalformedEvent(_) => "malformed_event",
      IngestError::Timeout { .. } => "timeout",
      IngestError::Storage(_) => "storage",
    }
  }
}
