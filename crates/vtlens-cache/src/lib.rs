//! Fast cache tier backends for vtlens.
//!
//! [`FastCacheBackend`] dispatches to either a shared Redis instance or an
//! bounded in-process cache, chosen at startup from configuration.

mod backend;
mod memory;
mod remote;

pub mod error;

pub use backend::FastCacheBackend;
pub use error::{Error, Result};
pub use memory::{DEFAULT_MEMORY_CAPACITY, MemoryCache};
pub use remote::RedisCache;
