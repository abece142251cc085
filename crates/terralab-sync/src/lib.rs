//! TerraLab Sync - Offline request replay
//!
//! Drains the durable request queue when connectivity returns, replaying
//! deferred mutating requests in priority order through the
//! `RequestReplayer` port.
//!
//! ## Modules
//!
//! - [`agent`] - The [`SyncAgent`](agent::SyncAgent) drain loop and report

pub mod agent;

pub use agent::{SyncAgent, SyncCommand, SyncReport};
