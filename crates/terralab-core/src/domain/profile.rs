//! Cached user profile
//!
//! The last profile the server reported for the signed-in user. Not
//! authoritative: it is a fallback for display while offline or when a
//! fresh profile fetch fails after a successful token check, and it is
//! overwritten whenever a fresh profile or refresh response arrives.

use serde::{Deserialize, Serialize};

/// Profile of the signed-in user as last reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Server-assigned user identifier
    pub id: String,
    /// User's email address
    pub email: String,
    /// User's display name
    pub name: String,
    /// Role used for authorization checks (e.g. "admin", "technician")
    pub role: String,
}

impl UserProfile {
    /// Returns true if this profile carries exactly the given role
    ///
    /// Comparison is case-sensitive; role strings are server-defined.
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    /// Returns true if this profile carries any of the given roles
    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        roles.iter().any(|r| self.role == r.as_ref())
    }
}
