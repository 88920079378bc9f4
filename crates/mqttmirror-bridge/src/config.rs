//! Bridge configuration: a TOML file layered with `MQTTMIRROR_*`
//! environment variables.
//!
//! ```toml
//! [mqtt]
//! host = "broker.local"
//! topics = ["home/#"]
//! exclude_topics = ["home/debug"]
//!
//! [sql]
//! backend = "mysql"
//! url = "mysql://mqtt:secret@db:3306/mqtt"
//!
//! [ingest]
//! workers = 4
//! ```
//!
//! Environment keys use `__` between section and field, for example
//! `MQTTMIRROR_SQL__BACKEND=sqlite`.

use std::{path::{Path, PathBuf}, time::Duration};

use mqttmirror_core::schema::{DEFAULT_TABLE, TableNames};
use serde::Deserialize;
use thiserror::Error;

use crate::{coordinator::CoordinatorConfig, retry};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to load configuration: {0}")]
  Load(#[from] config::ConfigError),
  #[error("invalid configuration: {0}")]
  Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
  pub mqtt:   MqttConfig,
  pub sql:    SqlConfig,
  pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
  pub host:             String,
  pub port:             u16,
  pub client_id:        String,
  pub username:         Option<String>,
  pub password:         Option<String>,
  /// Subscription filters, all at QoS 1.
  pub topics:           Vec<String>,
  /// Exact topics to drop.
  pub exclude_topics:   Vec<String>,
  pub keep_alive_secs:  u64,
  /// Capacity of the client's request channel.
  pub channel_capacity: usize,
}

impl Default for MqttConfig {
  fn default() -> Self {
    Self {
      host:             "localhost".to_string(),
      port:             1883,
      client_id:        "mqttmirror".to_string(),
      username:         None,
      password:         None,
      topics:           vec!["#".to_string()],
      exclude_topics:   Vec::new(),
      keep_alive_secs:  60,
      channel_capacity: 1024,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlBackend {
  #[default]
  Sqlite,
  Mysql,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
  pub backend:                         SqlBackend,
  /// SQLite database file; `~/` is expanded.
  pub path:                            PathBuf,
  /// MySQL connection URL.
  pub url:                             Option<String>,
  /// Base table name; the history table and view derive from it.
  pub table:                           String,
  pub max_connections:                 u32,
  pub connection_retry:                usize,
  pub connection_retry_start_delay_ms: u64,
  pub transaction_retry:               usize,
}

impl Default for SqlConfig {
  fn default() -> Self {
    Self {
      backend:                         SqlBackend::Sqlite,
      path:                            PathBuf::from("mqttmirror.db"),
      url:                             None,
      table:                           DEFAULT_TABLE.to_string(),
      max_connections:                 50,
      connection_retry:                10,
      connection_retry_start_delay_ms: 1000,
      transaction_retry:               10,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
  pub workers:           usize,
  pub queue_depth:       usize,
  pub event_timeout_ms:  u64,
  pub shutdown_grace_ms: u64,
}

impl Default for IngestConfig {
  fn default() -> Self {
    Self {
      workers:           8,
      queue_depth:       256,
      event_timeout_ms:  10_000,
      shutdown_grace_ms: 10_000,
    }
  }
}

impl BridgeConfig {
  /// Read `path` (optional) and the environment, then validate.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("MQTTMIRROR")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true)
          .list_separator(",")
          .with_list_parse_key("mqtt.topics")
          .with_list_parse_key("mqtt.exclude_topics"),
      )
      .build()?;
    let cfg: BridgeConfig = settings.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    self.table_names()?;
    if self.mqtt.topics.is_empty() {
      return Err(ConfigError::Invalid("mqtt.topics is empty".into()));
    }
    if self.ingest.workers == 0 || self.ingest.queue_depth == 0 {
      return Err(ConfigError::Invalid(
        "ingest.workers and ingest.queue_depth must be at least 1".into(),
      ));
    }
    if self.sql.backend == SqlBackend::Mysql && self.sql.url.is_none() {
      return Err(ConfigError::Invalid("sql.url is required for the mysql backend".into()));
    }
    if self.sql.max_connections == 0 {
      return Err(ConfigError::Invalid("sql.max_connections must be at least 1".into()));
    }
    Ok(())
  }

  pub fn table_names(&self) -> Result<TableNames, ConfigError> {
    TableNames::new(&self.sql.table).map_err(|e| ConfigError::Invalid(e.to_string()))
  }

  pub fn coordinator(&self) -> CoordinatorConfig {
    CoordinatorConfig {
      event_timeout: Duration::from_millis(self.ingest.event_timeout_ms),
      backoff:       retry::transaction_backoff(self.sql.transaction_retry),
    }
  }

  pub fn shutdown_grace(&self) -> Duration { Duration::from_millis(self.ingest.shutdown_grace_ms) }

  pub fn connection_backoff(&self) -> backon::ExponentialBuilder {
    retry::connection_backoff(
      Duration::from_millis(self.sql.connection_retry_start_delay_ms),
      self.sql.connection_retry,
    )
  }
}
