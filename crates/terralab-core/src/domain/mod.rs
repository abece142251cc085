//! Domain entities and value types
//!
//! Pure business objects with no I/O dependencies. Adapter crates map
//! these to and from their wire/storage representations.

pub mod errors;
pub mod profile;
pub mod request;
pub mod tokens;

pub use errors::DomainError;
pub use profile::UserProfile;
pub use request::{NewQueuedRequest, QueuedRequest, RequestMethod, DEFAULT_PRIORITY};
pub use tokens::Tokens;
