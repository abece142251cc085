//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`TokenStore`] - Durable storage for tokens, expiry, and cached profile
//! - [`RequestQueue`] - Durable, ordered store of deferred mutating requests
//! - [`AuthGateway`] - The auth endpoints of the REST backend
//! - [`RequestReplayer`] - Replay of a queued request (implemented by the
//!   HTTP client, consumed by the sync agent)
//! - [`Connectivity`] - The host's online/offline signal
//! - [`Clock`] - Wall-clock time, injectable for expiry tests

pub mod auth_gateway;
pub mod clock;
pub mod connectivity;
pub mod replayer;
pub mod request_queue;
pub mod token_store;

pub use auth_gateway::{AuthGateway, AuthGrant, GatewayError, ProfileUpdate, Registration};
pub use clock::{Clock, ManualClock, SystemClock};
pub use connectivity::{Connectivity, SharedConnectivity};
pub use replayer::{ReplayError, RequestReplayer};
pub use request_queue::RequestQueue;
pub use token_store::TokenStore;
