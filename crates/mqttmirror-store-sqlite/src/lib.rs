//! SQLite backend for the mqttmirror tables.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. This is the embedded,
//! single-file variant of the storage adapter.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, SqliteTransaction};

#[cfg(test)]
mod tests;
