//! Core types and trait definitions for vtlens.
//!
//! This crate is deliberately free of HTTP, cache and database dependencies.
//! The store, cache, upstream and server crates all depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod cache;
pub mod envelope;
pub mod error;
pub mod normalize;
pub mod report;
pub mod store;
pub mod subject;
pub mod upstream;

pub use error::{Error, Result};
