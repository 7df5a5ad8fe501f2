//! SQLite backend for the MentorLink match store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The uniqueness and compare-and-set
//! guarantees the core relies on are enforced by the schema and by
//! conditional writes, not by in-process locks.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
