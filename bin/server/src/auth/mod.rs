//! Authentication module for the gatehouse server.
//!
//! This module provides:
//! - The `/login` and `/callback` handlers of the OIDC authorization code flow
//! - The session middleware guarding `/api` and the `CurrentUser` extractor
//! - The openidconnect-backed identity provider and the Postgres user directory
//!
//! Sessions are stateless on the server: the browser carries the raw ID
//! token and the refresh token in cookies, and every protected request
//! re-verifies them. Pending login attempts are kept by a pluggable
//! [`PendingAttemptStore`].

pub mod attempt;
pub mod cookies;
pub mod db;
pub mod middleware;
pub mod oidc;
pub mod routes;

use crate::config::SessionConfig;
use gatehouse_platform_access::{AuthorizationState, EntropyError, IdentityProvider, UserDirectory};
use std::sync::Arc;

pub use attempt::{CookieAttemptStore, MemoryAttemptStore, PendingAttemptStore};
pub use middleware::{CurrentUser, protect};
pub use oidc::OidcClient;
pub use routes::{callback, login};

/// Source of the correlators for a new login attempt.
pub type AttemptGenerator = fn() -> Result<AuthorizationState, EntropyError>;

/// Shared application state.
pub struct AppState {
    /// Identity provider for the code exchange, verification, and refresh.
    pub provider: Arc<dyn IdentityProvider>,
    /// Directory of registered users.
    pub directory: Arc<dyn UserDirectory>,
    /// Where in-flight logins keep their correlators.
    pub attempts: Arc<dyn PendingAttemptStore>,
    /// Session configuration.
    pub session_config: SessionConfig,
    /// Mints the correlators for `/login`. OS randomness unless replaced.
    pub generate_attempt: AttemptGenerator,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        directory: Arc<dyn UserDirectory>,
        attempts: Arc<dyn PendingAttemptStore>,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            provider,
            directory,
            attempts,
            session_config,
            generate_attempt: AuthorizationState::generate,
        }
    }

    /// Replaces the source of login correlators.
    #[must_use]
    pub fn with_attempt_generator(mut self, generate_attempt: AttemptGenerator) -> Self {
        self.generate_attempt = generate_attempt;
        self
    }
}
