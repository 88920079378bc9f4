//! mqttmirror binary.
//!
//! Reads `mqttmirror.toml` (or the path given with `--config`), connects to
//! the configured database, subscribes to the broker, and mirrors every
//! publish into the latest-value and history tables until Ctrl-C or
//! SIGTERM.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use mqttmirror_bridge::{
  broker,
  config::{BridgeConfig, SqlBackend},
  coordinator::Coordinator,
  dispatch::Dispatcher,
  filter::TopicFilter,
  retry::connect_with_retry,
};
use mqttmirror_core::store::StorageBackend;
use mqttmirror_store_mysql::MysqlStore;
use mqttmirror_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Mirror MQTT topics into SQL tables")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "mqttmirror.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg = BridgeConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;
  let names = cfg.table_names()?;

  match cfg.sql.backend {
    SqlBackend::Sqlite => {
      let path = expand_tilde(&cfg.sql.path);
      let store = connect_with_retry("sqlite", cfg.connection_backoff(), || {
        SqliteStore::open(&path, &names)
      })
      .await
      .with_context(|| format!("failed to open store at {path:?}"))?;
      tracing::info!(path = %path.display(), table = %names.topics, "sqlite store open");
      run(store, &cfg).await
    }
    SqlBackend::Mysql => {
      let url = cfg.sql.url.as_deref().context("sql.url is not set")?;
      let store = connect_with_retry("mysql", cfg.connection_backoff(), || {
        MysqlStore::connect(url, &names, cfg.sql.max_connections)
      })
      .await
      .context("failed to connect to mysql")?;
      tracing::info!(table = %names.topics, "mysql store connected");
      run(store, &cfg).await
    }
  }
}

async fn run<S>(store: S, cfg: &BridgeConfig) -> anyhow::Result<()>
where
  S: StorageBackend + 'static,
{
  let coordinator = Arc::new(Coordinator::new(store, cfg.coordinator()));
  let dispatcher = Dispatcher::start(
    coordinator.clone(),
    TopicFilter::new(cfg.mqtt.exclude_topics.iter().cloned()),
    cfg.ingest.workers,
    cfg.ingest.queue_depth,
  );

  let drained = broker::run(
    &cfg.mqtt,
    coordinator.store(),
    dispatcher,
    cfg.shutdown_grace(),
    shutdown_signal(),
  )
  .await;

  let stats = coordinator.stats().snapshot();
  tracing::info!(?stats, drained, "stopped");
  Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      tracing::error!(error = %e, "cannot listen for ctrl-c");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut signal) => {
        signal.recv().await;
      }
      Err(e) => {
        tracing::error!(error = %e, "cannot listen for SIGTERM");
        std::future::pending::<()>().await;
      }
    }
  };
  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }
  tracing::info!("shutdown signal received");
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
