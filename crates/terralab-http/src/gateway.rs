//! Auth gateway adapter
//!
//! Implements the core's `AuthGateway` port over [`ApiClient`], owning
//! the wire shapes of the auth endpoints and the mapping from pipeline
//! errors to the port's classified [`GatewayError`].

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use terralab_core::domain::UserProfile;
use terralab_core::ports::{AuthGateway, AuthGrant, GatewayError, ProfileUpdate, Registration};

use crate::client::{ApiClient, ApiRequest};
use crate::envelope::{self, Envelope};
use crate::HttpError;

// ============================================================================
// Wire shapes
// ============================================================================

/// Token grant as the backend sends it
///
/// Tolerates both snake_case and camelCase field names; some deployments
/// also call the access token just `token`.
#[derive(Debug, Deserialize)]
struct GrantDto {
    #[serde(alias = "accessToken", alias = "token")]
    access_token: String,
    #[serde(default, alias = "refreshToken")]
    refresh_token: Option<String>,
    #[serde(default, alias = "expiresIn")]
    expires_in: Option<u64>,
    #[serde(default)]
    user: Option<UserProfile>,
}

impl GrantDto {
    fn into_grant(self) -> AuthGrant {
        AuthGrant {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_in_secs: self.expires_in,
            profile: self.user,
        }
    }
}

/// Parses a grant out of a raw response body (enveloped or bare)
pub(crate) fn grant_from_value(value: Value) -> Result<AuthGrant, HttpError> {
    let envelope: Envelope<GrantDto> = envelope::from_value(value)?;
    Ok(envelope.data.into_grant())
}

/// Builds the PATCH body for a partial profile update
///
/// Only fields actually being changed are serialized; a `null` would
/// clear the field server-side.
fn update_body(update: &ProfileUpdate) -> Value {
    let mut body = serde_json::Map::new();
    if let Some(ref name) = update.name {
        body.insert("name".to_string(), json!(name));
    }
    if let Some(ref email) = update.email {
        body.insert("email".to_string(), json!(email));
    }
    Value::Object(body)
}

// ============================================================================
// HttpAuthGateway
// ============================================================================

/// `AuthGateway` implementation over the shared API client
pub struct HttpAuthGateway {
    client: Arc<ApiClient>,
}

impl HttpAuthGateway {
    /// Creates a gateway over the given client
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, GatewayError> {
        debug!("Submitting login");
        let request = ApiRequest::post(
            "/auth/login",
            json!({"email": email, "password": password}),
        )
        .auth_endpoint();

        let envelope: Envelope<GrantDto> =
            self.client.request(request).await.map_err(map_http_error)?;
        Ok(envelope.data.into_grant())
    }

    async fn register(&self, registration: &Registration) -> Result<AuthGrant, GatewayError> {
        debug!("Submitting registration");
        let request = ApiRequest::post(
            "/auth/register",
            json!({
                "email": registration.email,
                "password": registration.password,
                "name": registration.name,
            }),
        )
        .auth_endpoint();

        let envelope: Envelope<GrantDto> =
            self.client.request(request).await.map_err(map_http_error)?;
        Ok(envelope.data.into_grant())
    }

    async fn refresh(&self) -> Result<AuthGrant, GatewayError> {
        // Shares the client's single-flight slot with 401-triggered
        // refreshes; concurrent callers get one wire call.
        self.client.refresh_session().await.map_err(map_http_error)
    }

    async fn logout(&self) -> Result<(), GatewayError> {
        let request = ApiRequest::post("/auth/logout", json!({})).auth_endpoint();
        self.client
            .request::<Value>(request)
            .await
            .map_err(map_http_error)?;
        Ok(())
    }

    async fn fetch_profile(&self) -> Result<UserProfile, GatewayError> {
        let envelope: Envelope<UserProfile> = self
            .client
            .get("/auth/profile")
            .await
            .map_err(map_http_error)?;
        Ok(envelope.data)
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, GatewayError> {
        let request = ApiRequest::patch("/auth/profile", update_body(update));
        let envelope: Envelope<UserProfile> =
            self.client.request(request).await.map_err(map_http_error)?;
        Ok(envelope.data)
    }
}

/// Maps pipeline errors onto the port's classification
fn map_http_error(err: HttpError) -> GatewayError {
    match err {
        HttpError::Auth {
            status,
            message,
            wait_minutes,
            remaining_attempts,
        } => {
            // A 401 carrying rate-limit hints is a structured rejection
            // (locked-out login), not a stale-token symptom.
            if wait_minutes.is_some() || remaining_attempts.is_some() {
                GatewayError::Rejected {
                    status,
                    message,
                    wait_minutes,
                    remaining_attempts,
                }
            } else {
                GatewayError::Unauthorized { message }
            }
        }
        HttpError::Validation {
            status,
            message,
            wait_minutes,
            remaining_attempts,
        } => GatewayError::Rejected {
            status,
            message,
            wait_minutes,
            remaining_attempts,
        },
        HttpError::Network { message, .. } => GatewayError::Network { message },
        HttpError::Server { status, message } => GatewayError::Server { status, message },
        HttpError::OfflineQueued { id } => GatewayError::Offline { id },
        HttpError::InvalidResponse(message) => GatewayError::Other { message },
    }
}
