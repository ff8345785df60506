//! Transcript module for the persisted chat history.
//!
//! Provides:
//! - `TranscriptEntry`: One `{user, assistant}` exchange
//! - `Transcript`: Append-only log with atomic persistence

mod history;

pub use history::*;
