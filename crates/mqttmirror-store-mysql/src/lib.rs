//! MySQL backend for the mqttmirror tables.
//!
//! The client/server variant of the storage adapter, built on a
//! [`sqlx::MySqlPool`]. Each transaction owns one pooled connection; rows
//! are locked with `SELECT ... FOR UPDATE` before they are rewritten.

mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{MysqlStore, MysqlTransaction};
