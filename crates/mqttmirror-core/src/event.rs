//! Inbound broker events.
//!
//! A [`RawEvent`] is what the broker collaborator hands over; it carries
//! whatever the wire delivered. [`RawEvent::validate`] turns it into an
//! [`Event`], the only form the ingestion core accepts.

use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};

use crate::{Error, Result};

/// Longest topic name an MQTT string can carry.
pub const MAX_TOPIC_LEN: usize = 65_535;

/// Broker delivery guarantee of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QoS {
  AtMostOnce,
  AtLeastOnce,
  ExactlyOnce,
}

impl QoS {
  pub fn level(self) -> u8 {
    match self {
      QoS::AtMostOnce => 0,
      QoS::AtLeastOnce => 1,
      QoS::ExactlyOnce => 2,
    }
  }
}

impl TryFrom<u8> for QoS {
  type Error = Error;

  fn try_from(level: u8) -> Result<Self> {
    match level {
      0 => Ok(QoS::AtMostOnce),
      1 => Ok(QoS::AtLeastOnce),
      2 => Ok(QoS::ExactlyOnce),
      other => Err(Error::InvalidQos(other.into())),
    }
  }
}

impl TryFrom<i64> for QoS {
  type Error = Error;

  fn try_from(level: i64) -> Result<Self> {
    u8::try_from(level)
      .map_err(|_| Error::InvalidQos(level))
      .and_then(QoS::try_from)
  }
}

/// Truncate a timestamp to the microsecond precision both backends store.
pub fn normalize_ts(ts: DateTime<Utc>) -> DateTime<Utc> { ts.trunc_subsecs(6) }

/// An event exactly as delivered by the broker collaborator.
#[derive(Debug, Clone)]
pub struct RawEvent {
  pub topic:       String,
  pub payload:     Bytes,
  pub qos:         u8,
  pub retain:      bool,
  pub received_at: DateTime<Utc>,
}

impl RawEvent {
  /// Check the topic and delivery metadata.
  ///
  /// Rejections are final: a malformed event is dropped, never retried.
  pub fn validate(self) -> Result<Event> {
    validate_topic(&self.topic)?;
    let qos = QoS::try_from(self.qos)
      .map_err(|e| Error::MalformedEvent(format!("topic {:?}: {e}", self.topic)))?;

    Ok(Event {
      topic: self.topic,
      payload: self.payload,
      qos,
      retain: self.retain,
      received_at: normalize_ts(self.received_at),
    })
  }
}

fn validate_topic(topic: &str) -> Result<()> {
  if topic.is_empty() {
    return Err(Error::MalformedEvent("missing topic".into()));
  }
  if topic.len() > MAX_TOPIC_LEN {
    return Err(Error::MalformedEvent(format!(
      "topic is {} bytes, limit is {MAX_TOPIC_LEN}",
      topic.len()
    )));
  }
  if topic.contains('\0') {
    return Err(Error::MalformedEvent(format!("topic {topic:?} contains NUL")));
  }
  if topic.contains(['+', '#']) {
    return Err(Error::MalformedEvent(format!(
      "topic {topic:?} contains a subscription wildcard"
    )));
  }
  Ok(())
}

/// A validated event ready for the ingestion core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
  pub topic:       String,
  pub payload:     Bytes,
  pub qos:         QoS,
  pub retain:      bool,
  /// Receipt time, UTC, microsecond precision.
  pub received_at: DateTime<Utc>,
}

impl Event {
  pub fn new(
    topic: impl Into<String>,
    payload: impl Into<Bytes>,
    qos: QoS,
    retain: bool,
    received_at: DateTime<Utc>,
  ) -> Result<Self> {
    let topic = topic.into();
    validate_topic(&topic)?;
    Ok(Self {
      topic,
      payload: payload.into(),
      qos,
      retain,
      received_at: normalize_ts(received_at),
    })
  }
}
