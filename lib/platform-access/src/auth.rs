//! Values that carry a login from the provider redirect to downstream handlers.

use gatehouse_core::UserId;
use serde::{Deserialize, Serialize};

use crate::error::EntropyError;
use crate::token::{self, TOKEN_BYTES, VERIFIER_BYTES};

/// Correlation values for one in-flight login attempt.
///
/// Created when the login redirect is issued and consumed by the first
/// callback that presents it. Never persisted beyond the pending-attempt store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationState {
    /// CSRF correlator echoed back by the provider in the `state` parameter.
    pub state: String,
    /// Replay correlator the provider embeds in the ID token.
    pub nonce: String,
    /// PKCE code verifier; only its S256 challenge leaves the server.
    pub pkce_verifier: String,
}

impl AuthorizationState {
    /// Generates a fresh state, nonce, and PKCE verifier.
    ///
    /// # Errors
    ///
    /// Returns `EntropyError` if the secure random source is unavailable.
    pub fn generate() -> Result<Self, EntropyError> {
        Ok(Self {
            state: token::generate(TOKEN_BYTES)?,
            nonce: token::generate(TOKEN_BYTES)?,
            pkce_verifier: token::generate(VERIFIER_BYTES)?,
        })
    }
}

/// The tokens a successful login hands to the browser.
///
/// The server never stores these; they live only in the browser's cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    /// The raw signed ID token, exactly as the provider issued it.
    pub id_token: String,
    /// Opaque credential for minting new tokens without user interaction.
    pub refresh_token: String,
}

/// Identity resolved for the current request.
///
/// Inserted into the request's extensions by the session middleware and
/// read by downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedIdentity {
    /// Directory-assigned identifier.
    pub user_id: UserId,
    /// Provider-verified email address.
    pub email: String,
    /// Display name from the directory record.
    pub name: String,
}
