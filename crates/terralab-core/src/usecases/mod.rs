//! Use cases orchestrating domain entities through ports

pub mod session;

pub use session::{AuthSession, LoginOutcome, SessionPhase, SessionState};
