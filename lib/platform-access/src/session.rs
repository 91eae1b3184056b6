//! Session resumption for protected requests.
//!
//! A session is nothing more than the ID/refresh token pair in the browser's
//! cookies. [`resume_session`] turns that pair into an
//! [`AuthenticatedIdentity`], refreshing through the provider when the
//! cached ID token no longer verifies.
//!
//! ```text
//! Unauthenticated --refresh cookie?--> Refreshing --verified?--> Authenticated
//!        ^                                  |                        |
//!        +--------------- any failure ------+------------------------+
//! ```

use tracing::{debug, instrument};

use crate::auth::AuthenticatedIdentity;
use crate::directory::UserDirectory;
use crate::error::SessionError;
use crate::provider::{IdentityProvider, SessionTokens};

/// Session cookies presented with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCookies {
    /// Last issued ID token. May be expired, malformed, or absent.
    pub id_token: Option<String>,
    /// Refresh token. Without it there is no session.
    pub refresh_token: Option<String>,
}

/// A session that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumedSession {
    /// Who is making the request.
    pub identity: AuthenticatedIdentity,
    /// The token pair now in effect. Re-issue it when `tokens.refreshed` is set.
    pub tokens: SessionTokens,
}

/// Verifies or refreshes a session and resolves its user.
///
/// # Errors
///
/// Returns the [`SessionError`] for the first failed step.
/// [`SessionError::UnknownUser`] means the provider verified an email
/// that has no directory record, which should never happen.
#[instrument(skip_all)]
pub async fn resume_session(
    provider: &dyn IdentityProvider,
    directory: &dyn UserDirectory,
    cookies: SessionCookies,
) -> Result<ResumedSession, SessionError> {
    let refresh_token = cookies
        .refresh_token
        .filter(|token| !token.is_empty())
        .ok_or(SessionError::MissingRefreshToken)?;

    if cookies.id_token.is_none() {
        debug!("no ID token presented, relying on refresh token");
    }

    let tokens = provider
        .refresh_session(&refresh_token, cookies.id_token.as_deref())
        .await
        .map_err(|e| SessionError::RefreshFailed {
            details: e.to_string(),
        })?;

    let id_token = provider
        .verify_id_token(&tokens.id_token)
        .await
        .map_err(|e| SessionError::TokenVerificationFailed {
            details: e.to_string(),
        })?;

    let email = id_token
        .email
        .filter(|email| !email.is_empty())
        .ok_or(SessionError::UnverifiableIdentity)?;
    if !id_token.email_verified {
        return Err(SessionError::EmailNotVerified);
    }

    let record = directory
        .find(&email)
        .await
        .map_err(|e| SessionError::DirectoryFailed {
            details: e.to_string(),
        })?
        .ok_or_else(|| SessionError::UnknownUser {
            email: email.clone(),
        })?;

    Ok(ResumedSession {
        identity: AuthenticatedIdentity {
            user_id: record.id(),
            email,
            name: record.name().to_string(),
        },
        tokens,
    })
}
