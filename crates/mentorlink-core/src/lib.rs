//! Core types and workflow components for the MentorLink matching service.
//!
//! The crate has no HTTP or database dependencies. The components
//! ([`ProfileDirectory`], [`ChatResolver`], [`RequestMachine`],
//! [`MatchOrchestrator`], [`MessageChannel`]) are generic over a
//! [`store::MatchStore`] backend, so they run unchanged against SQLite in
//! production and against [`memory::MemoryStore`] in tests.

pub mod channel;
pub mod chat;
pub mod clock;
pub mod directory;
pub mod error;
pub mod live;
pub mod memory;
pub mod orchestrator;
pub mod profile;
pub mod request;
pub mod requests;
pub mod resolver;
pub mod session;
pub mod store;

pub use channel::MessageChannel;
pub use directory::ProfileDirectory;
pub use error::{Error, Result};
pub use live::Subscription;
pub use orchestrator::{AcceptedMatch, MatchOrchestrator};
pub use requests::RequestMachine;
pub use resolver::{ChatResolver, Resolution};
pub use session::Session;

/// Snapshot queue depth used by live views unless configured otherwise.
pub const DEFAULT_LIVE_BUFFER: usize = 16;

#[cfg(test)]
mod tests;
