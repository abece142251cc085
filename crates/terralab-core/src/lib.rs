//! TerraLab Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Tokens`, `UserProfile`, `QueuedRequest`, `SessionState`
//! - **Use cases** - `AuthSession`, the login/logout/refresh state machine
//! - **Port definitions** - Traits for adapters: `TokenStore`, `RequestQueue`,
//!   `AuthGateway`, `RequestReplayer`, `Connectivity`, `Clock`
//! - **Event bus** - Typed in-process pub/sub for session lifecycle events
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external dependencies.
//! Ports define trait interfaces that adapter crates implement.
//! The `AuthSession` use case orchestrates domain entities through port
//! interfaces; it never touches a socket or a database directly.

pub mod config;
pub mod domain;
pub mod events;
pub mod ports;
pub mod usecases;
