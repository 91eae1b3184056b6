//! Contract for the external OIDC identity provider.
//!
//! The login flows only ever talk to the provider through this trait. The
//! server implements it with the `openidconnect` crate; tests use a stub.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::AuthorizationState;
use crate::error::ProviderError;

/// Tokens returned by the authorization-code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenExchange {
    /// Access token for the user-info endpoint.
    pub access_token: String,
    /// Raw signed ID token, if the provider returned one.
    pub id_token: Option<String>,
    /// Refresh token, present only when offline access was granted.
    pub refresh_token: Option<String>,
}

/// Claims from an ID token whose signature, issuer, audience, and expiry checked out.
///
/// The nonce is reported, not checked; callers compare it themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdToken {
    /// Provider-scoped subject identifier.
    pub subject: String,
    /// Nonce embedded at authorization time.
    pub nonce: Option<String>,
    /// When the token stops being valid.
    pub expires_at: DateTime<Utc>,
    /// Email claim, if present.
    pub email: Option<String>,
    /// Whether the provider has verified the email. Absent counts as false.
    pub email_verified: bool,
}

/// Claims returned by the provider's user-info endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserInfo {
    /// Email address; empty when the provider returned none.
    pub email: String,
    /// Display name; empty when the provider returned none.
    pub name: String,
    /// Whether the provider has verified the email.
    pub email_verified: bool,
}

/// A usable ID/refresh token pair for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    /// Raw ID token to verify.
    pub id_token: String,
    /// Refresh token to keep for the next request.
    pub refresh_token: String,
    /// True when the provider minted new tokens during this call.
    pub refreshed: bool,
}

/// Operations the login flows need from an OIDC provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Builds the URL of the provider's consent screen.
    ///
    /// The request carries the attempt's `state` and `nonce`, the S256
    /// challenge of its PKCE verifier, the configured scopes, and asks for
    /// offline access so a refresh token is issued.
    fn authorization_url(&self, attempt: &AuthorizationState) -> String;

    /// Exchanges an authorization code for tokens, proving possession of the
    /// PKCE verifier the authorization request was bound to.
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> gatehouse_core::Result<TokenExchange, ProviderError>;

    /// Verifies a raw ID token's signature, issuer, audience, and expiry.
    async fn verify_id_token(
        &self,
        raw: &str,
    ) -> gatehouse_core::Result<VerifiedIdToken, ProviderError>;

    /// Fetches the user-info claims the access token entitles us to.
    async fn fetch_user_info(
        &self,
        access_token: &str,
    ) -> gatehouse_core::Result<UserInfo, ProviderError>;

    /// Returns a usable token pair for a session.
    ///
    /// If `stale_id_token` still verifies, the presented pair comes back
    /// unchanged with `refreshed == false`. Otherwise the refresh grant runs.
    /// An unparseable stale token is handled the same as a missing one.
    async fn refresh_session(
        &self,
        refresh_token: &str,
        stale_id_token: Option<&str>,
    ) -> gatehouse_core::Result<SessionTokens, ProviderError>;
}
