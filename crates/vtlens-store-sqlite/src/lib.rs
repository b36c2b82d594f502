//! SQLite backend for the vtlens entity store and bounded persistent cache.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{DEFAULT_CACHE_CAPACITY, SqliteStore, SqliteTx};

#[cfg(test)]
mod tests;
