//! Auth session use case
//!
//! The login/logout/refresh state machine the UI observes. Orchestrates
//! the token store, the auth gateway, the connectivity signal, and the
//! event bus; owns no I/O of its own.
//!
//! ## State machine
//!
//! ```text
//! Init ──initialize()──→ Checking ──→ Authenticated
//!                            │              │ logout() / failed silent refresh
//!                            └──────────→ Unauthenticated
//! ```
//!
//! Startup favors keeping the user working: a transient validation
//! failure degrades to the cached profile instead of bouncing to login.
//! Only a definitive credential failure (refresh rejected, no token at
//! all) lands in `Unauthenticated`.

use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::domain::UserProfile;
use crate::events::{SessionEvent, SessionEvents};
use crate::ports::{
    AuthGateway, AuthGrant, Connectivity, GatewayError, ProfileUpdate, Registration, TokenStore,
};

// ============================================================================
// Session state
// ============================================================================

/// Phase of the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Not yet initialized
    Init,
    /// Startup validation in progress
    Checking,
    /// Signed in (possibly on a cached profile while degraded)
    Authenticated,
    /// Signed out or credentials definitively rejected
    Unauthenticated,
}

/// Observable session state, recomputed on every transition
///
/// Derived from the token store plus server validation; never persisted
/// directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Current phase
    pub phase: SessionPhase,
    /// Profile shown to the UI (fresh or cached)
    pub user: Option<UserProfile>,
    /// True while an operation that will change the phase is in flight
    pub loading: bool,
}

impl SessionState {
    /// Returns true when the session is in the authenticated phase
    pub fn is_authenticated(&self) -> bool {
        self.phase == SessionPhase::Authenticated
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Init,
            user: None,
            loading: false,
        }
    }
}

/// Result of a login or register attempt
///
/// Rejections are data, not errors: the UI renders the message and the
/// rate-limit hints directly. Only local storage failures surface as
/// `Err` from the session methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Tokens and profile were persisted; the session is authenticated
    Success {
        /// Profile from the grant, when the backend returned one
        profile: Option<UserProfile>,
    },
    /// The attempt did not authenticate
    Rejected {
        /// Human-readable reason
        message: String,
        /// Minutes to wait before retrying, when rate-limited
        wait_minutes: Option<u32>,
        /// Remaining attempts before lockout, when rate-limited
        remaining_attempts: Option<u32>,
    },
}

impl LoginOutcome {
    /// Returns true for the success variant
    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::Success { .. })
    }

    fn rejected(message: impl Into<String>) -> Self {
        LoginOutcome::Rejected {
            message: message.into(),
            wait_minutes: None,
            remaining_attempts: None,
        }
    }
}

// ============================================================================
// AuthSession
// ============================================================================

/// The session state machine exposed to the UI
pub struct AuthSession {
    gateway: Arc<dyn AuthGateway>,
    tokens: Arc<dyn TokenStore>,
    connectivity: Arc<dyn Connectivity>,
    events: Arc<dyn SessionEvents>,
    state: RwLock<SessionState>,
}

impl AuthSession {
    /// Creates a session in the `Init` phase
    pub fn new(
        gateway: Arc<dyn AuthGateway>,
        tokens: Arc<dyn TokenStore>,
        connectivity: Arc<dyn Connectivity>,
        events: Arc<dyn SessionEvents>,
    ) -> Self {
        Self {
            gateway,
            tokens,
            connectivity,
            events,
            state: RwLock::new(SessionState::default()),
        }
    }

    /// Returns a snapshot of the current session state
    pub fn state(&self) -> SessionState {
        self.state.read().unwrap().clone()
    }

    /// Returns true when the session is authenticated
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Returns true if the current user carries exactly the given role
    pub fn has_role(&self, role: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .user
            .as_ref()
            .map(|u| u.has_role(role))
            .unwrap_or(false)
    }

    /// Returns true if the current user carries any of the given roles
    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        self.state
            .read()
            .unwrap()
            .user
            .as_ref()
            .map(|u| u.has_any_role(roles))
            .unwrap_or(false)
    }

    // ========================================================================
    // Startup
    // ========================================================================

    /// Recomputes the session state at process start
    ///
    /// Decision sequence:
    /// 1. No cached profile ⇒ `Unauthenticated`.
    /// 2. Cached profile, host offline ⇒ trust the cache (if a token
    ///    exists at all) and go `Authenticated`.
    /// 3. Online ⇒ validate against the profile endpoint. A 401 gets one
    ///    silent refresh and a re-validation; a refresh failure clears
    ///    credentials; any other validation error degrades to the cached
    ///    profile rather than bouncing the user to login.
    pub async fn initialize(&self) -> anyhow::Result<SessionState> {
        self.set_state(SessionPhase::Checking, None, true);

        let cached = self.tokens.user_data().await?;
        let has_token = self.tokens.access_token().await?.is_some();

        let Some(cached) = cached else {
            debug!("No cached profile; starting unauthenticated");
            self.set_state(SessionPhase::Unauthenticated, None, false);
            return Ok(self.state());
        };

        // Access token absent means unauthenticated regardless of cache.
        if !has_token {
            debug!("Cached profile without access token; starting unauthenticated");
            self.set_state(SessionPhase::Unauthenticated, None, false);
            return Ok(self.state());
        }

        if !self.connectivity.is_online() {
            info!("Offline at startup; trusting cached profile");
            self.set_state(SessionPhase::Authenticated, Some(cached), false);
            return Ok(self.state());
        }

        match self.gateway.fetch_profile().await {
            Ok(profile) => {
                self.tokens.set_user_data(&profile).await?;
                self.set_state(SessionPhase::Authenticated, Some(profile), false);
            }
            Err(err) if err.is_unauthorized() => {
                debug!("Startup validation returned 401; attempting silent refresh");
                match self.silent_refresh().await {
                    Ok(()) => self.revalidate_after_refresh(cached).await?,
                    Err(_) => {
                        info!("Silent refresh failed at startup; clearing session");
                        self.tokens.clear_tokens().await?;
                        self.set_state(SessionPhase::Unauthenticated, None, false);
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "Startup validation failed; degrading to cached profile");
                self.set_state(SessionPhase::Authenticated, Some(cached), false);
            }
        }

        Ok(self.state())
    }

    /// Re-validates the profile after a successful startup refresh
    async fn revalidate_after_refresh(&self, cached: UserProfile) -> anyhow::Result<()> {
        match self.gateway.fetch_profile().await {
            Ok(profile) => {
                self.tokens.set_user_data(&profile).await?;
                self.set_state(SessionPhase::Authenticated, Some(profile), false);
            }
            Err(err) if err.is_unauthorized() => {
                // Fresh token still rejected: the credentials are gone.
                self.tokens.clear_tokens().await?;
                self.set_state(SessionPhase::Unauthenticated, None, false);
            }
            Err(err) => {
                warn!(error = %err, "Re-validation failed after refresh; using cached profile");
                self.set_state(SessionPhase::Authenticated, Some(cached), false);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Login / register
    // ========================================================================

    /// Exchanges credentials for a session
    ///
    /// On success persists tokens and profile before reporting
    /// `Authenticated`. All gateway failures come back as
    /// [`LoginOutcome::Rejected`]; only local persistence failures are
    /// `Err`.
    pub async fn login(&self, email: &str, password: &str) -> anyhow::Result<LoginOutcome> {
        self.set_loading(true);

        let outcome = match self.gateway.login(email, password).await {
            Ok(grant) => self.accept_grant(grant).await?,
            Err(err) => {
                self.set_loading(false);
                rejection_from(err)
            }
        };

        Ok(outcome)
    }

    /// Creates an account and signs it in
    pub async fn register(&self, registration: &Registration) -> anyhow::Result<LoginOutcome> {
        self.set_loading(true);

        let outcome = match self.gateway.register(registration).await {
            Ok(grant) => self.accept_grant(grant).await?,
            Err(err) => {
                self.set_loading(false);
                rejection_from(err)
            }
        };

        Ok(outcome)
    }

    /// Persists a grant and moves the session to `Authenticated`
    async fn accept_grant(&self, grant: AuthGrant) -> anyhow::Result<LoginOutcome> {
        self.tokens
            .set_tokens(
                &grant.access_token,
                grant.refresh_token.as_deref(),
                grant.expires_in_secs,
            )
            .await?;

        let profile = match grant.profile {
            Some(profile) => Some(profile),
            // Some backends return a bare token grant; fetch the profile
            // best-effort so the cache starts populated.
            None => self.gateway.fetch_profile().await.ok(),
        };

        if let Some(ref profile) = profile {
            self.tokens.set_user_data(profile).await?;
        }

        info!("Login succeeded");
        self.set_state(SessionPhase::Authenticated, profile.clone(), false);
        self.events.publish(SessionEvent::LoggedIn);

        Ok(LoginOutcome::Success { profile })
    }

    // ========================================================================
    // Logout
    // ========================================================================

    /// Ends the session
    ///
    /// The server call is best-effort (skipped offline, failures logged);
    /// local tokens and profile are cleared unconditionally and the
    /// session reports `Unauthenticated` even if the server throws.
    pub async fn logout(&self) -> anyhow::Result<()> {
        self.set_loading(true);

        if self.connectivity.is_online() {
            if let Err(err) = self.gateway.logout().await {
                warn!(error = %err, "Logout notification failed; clearing local state anyway");
            }
        } else {
            debug!("Offline; skipping logout notification");
        }

        self.tokens.clear_tokens().await?;
        self.set_state(SessionPhase::Unauthenticated, None, false);
        self.events.publish(SessionEvent::LoggedOut);
        info!("Logged out");

        Ok(())
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Refreshes the access token; returns whether it succeeded
    ///
    /// Never propagates an error. A definitive rejection of the refresh
    /// token transitions the session to `Unauthenticated`; a transient
    /// failure leaves the state untouched.
    pub async fn refresh_token(&self) -> bool {
        match self.silent_refresh().await {
            Ok(()) => true,
            Err(err) if err.is_transient() => {
                debug!(error = %err, "Token refresh failed transiently");
                false
            }
            Err(err) => {
                info!(error = %err, "Refresh token rejected; session is unauthenticated");
                if let Err(store_err) = self.tokens.clear_tokens().await {
                    warn!(error = %store_err, "Failed to clear tokens after rejected refresh");
                }
                self.set_state(SessionPhase::Unauthenticated, None, false);
                false
            }
        }
    }

    /// Runs a refresh through the gateway and persists the grant
    async fn silent_refresh(&self) -> Result<(), GatewayError> {
        let grant = self.gateway.refresh().await?;
        self.tokens
            .set_tokens(
                &grant.access_token,
                grant.refresh_token.as_deref(),
                grant.expires_in_secs,
            )
            .await
            .map_err(|e| GatewayError::Other {
                message: format!("failed to persist refreshed tokens: {}", e),
            })?;
        Ok(())
    }

    // ========================================================================
    // Profile
    // ========================================================================

    /// Applies a partial profile update and refreshes the cache
    ///
    /// An [`GatewayError::Offline`] result means the change was queued
    /// for later sync; the cache is left untouched until the replay
    /// brings back a fresh profile.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, GatewayError> {
        let profile = self.gateway.update_profile(update).await?;

        self.tokens
            .set_user_data(&profile)
            .await
            .map_err(|e| GatewayError::Other {
                message: format!("failed to cache updated profile: {}", e),
            })?;

        let mut state = self.state.write().unwrap();
        state.user = Some(profile.clone());

        Ok(profile)
    }

    // ========================================================================
    // State helpers
    // ========================================================================

    fn set_state(&self, phase: SessionPhase, user: Option<UserProfile>, loading: bool) {
        let mut state = self.state.write().unwrap();
        state.phase = phase;
        state.user = user;
        state.loading = loading;
    }

    fn set_loading(&self, loading: bool) {
        self.state.write().unwrap().loading = loading;
    }
}

/// Maps a gateway failure to the structured rejection the UI renders
fn rejection_from(err: GatewayError) -> LoginOutcome {
    match err {
        GatewayError::Rejected {
            message,
            wait_minutes,
            remaining_attempts,
            ..
        } => LoginOutcome::Rejected {
            message,
            wait_minutes,
            remaining_attempts,
        },
        GatewayError::Unauthorized { message } => LoginOutcome::rejected(message),
        other => LoginOutcome::rejected(other.to_string()),
    }
}

// ============================================================================
// Unit tests
// ============================================================================


#[cfg(test)]
impl AuthSession {
    /// Test-only: force the session into a known phase with a user
    fn initialize_state_for_test(&self, phase: SessionPhase, user: UserProfile) {
        self.set_state(phase, Some(user), false);
    }
}
