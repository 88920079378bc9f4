//! Core types and trait definitions for the mqttmirror ingestion core.
//!
//! This crate is deliberately free of broker and database dependencies.
//! Storage backends implement [`store::StorageBackend`]; the bridge drives
//! the [`upsert`] engine and the [`history`] writer through it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod event;
pub mod history;
pub mod policy;
pub mod row;
pub mod schema;
pub mod store;
pub mod upsert;

pub use error::{Error, Result};

#[cfg(test)]
mod testing;
