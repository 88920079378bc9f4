//! The ingestion side of mqttmirror: everything between a broker
//! subscription and a committed row.
//!
//! Events flow [`broker`] → [`dispatch::Dispatcher`] (filtering, validation,
//! per-topic sharding) → [`coordinator::Coordinator`] (one transaction per
//! event, retries, timeout) → a [`StorageBackend`].
//!
//! [`StorageBackend`]: mqttmirror_core::store::StorageBackend

pub mod broker;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod locks;
pub mod retry;
pub mod stats;

pub use error::IngestError;
