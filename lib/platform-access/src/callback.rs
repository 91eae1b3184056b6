//! Completion of the authorization-code flow.
//!
//! [`complete_login`] turns the provider's redirect back to us into a
//! [`SessionCredential`]. Every step depends on the one before it, so they
//! run strictly in order and the first failure ends the attempt.

use tracing::{debug, instrument};

use crate::auth::SessionCredential;
use crate::directory::{InsertOutcome, UserDirectory};
use crate::error::CallbackError;
use crate::provider::IdentityProvider;

/// The correlators recorded when the login redirect was issued.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingAttempt {
    /// Recorded state, if the browser presented one.
    pub state: Option<String>,
    /// Recorded nonce, if one was found.
    pub nonce: Option<String>,
    /// Recorded PKCE code verifier, if one was found.
    pub pkce_verifier: Option<String>,
}

/// Everything the callback needs from the incoming request.
#[derive(Debug, Clone, Default)]
pub struct CallbackRequest {
    /// What the pending-attempt store had for this browser.
    pub attempt: PendingAttempt,
    /// The `state` query parameter.
    pub state: Option<String>,
    /// The `code` query parameter.
    pub code: Option<String>,
}

/// Validates a provider callback and registers the user on first login.
///
/// On success the caller must set both returned tokens as cookies in the
/// same response.
///
/// # Errors
///
/// Returns the [`CallbackError`] for the first check that failed. No
/// directory write happens unless every protocol and trust check passed.
#[instrument(skip_all)]
pub async fn complete_login(
    provider: &dyn IdentityProvider,
    directory: &dyn UserDirectory,
    request: CallbackRequest,
) -> Result<SessionCredential, CallbackError> {
    let expected_state = request.attempt.state.ok_or(CallbackError::MissingState)?;

    // Exact comparison; an absent parameter never matches.
    if request.state.as_deref() != Some(expected_state.as_str()) {
        return Err(CallbackError::StateMismatch);
    }

    let expected_nonce = request.attempt.nonce.ok_or(CallbackError::MissingNonce)?;
    let pkce_verifier = request
        .attempt
        .pkce_verifier
        .ok_or(CallbackError::MissingVerifier)?;

    let code = request
        .code
        .filter(|code| !code.is_empty())
        .ok_or(CallbackError::MissingCode)?;

    let tokens = provider
        .exchange_code(&code, &pkce_verifier)
        .await
        .map_err(|e| CallbackError::ExchangeFailed {
            details: e.to_string(),
        })?;

    let raw_id_token = tokens
        .id_token
        .filter(|raw| !raw.is_empty())
        .ok_or(CallbackError::MalformedTokenResponse)?;

    let id_token = provider
        .verify_id_token(&raw_id_token)
        .await
        .map_err(|e| CallbackError::TokenVerificationFailed {
            details: e.to_string(),
        })?;

    if id_token.nonce.as_deref() != Some(expected_nonce.as_str()) {
        return Err(CallbackError::NonceMismatch);
    }

    let refresh_token = tokens
        .refresh_token
        .filter(|token| !token.is_empty())
        .ok_or(CallbackError::MissingRefreshToken)?;

    let user_info = provider
        .fetch_user_info(&tokens.access_token)
        .await
        .map_err(|e| CallbackError::UserInfoFailed {
            details: e.to_string(),
        })?;

    if user_info.email.is_empty() {
        return Err(CallbackError::UnverifiableIdentity);
    }
    if !user_info.email_verified {
        return Err(CallbackError::EmailNotVerified);
    }

    register(directory, &user_info.email, &user_info.name).await?;

    Ok(SessionCredential {
        id_token: raw_id_token,
        refresh_token,
    })
}

/// Ensures exactly one directory record exists for `email`.
async fn register(
    directory: &dyn UserDirectory,
    email: &str,
    name: &str,
) -> Result<(), CallbackError> {
    let registered = directory
        .exists(email)
        .await
        .map_err(|e| CallbackError::DirectoryFailed {
            details: e.to_string(),
        })?;
    if registered {
        return Ok(());
    }

    let outcome = directory
        .insert(email, name)
        .await
        .map_err(|e| CallbackError::DirectoryFailed {
            details: e.to_string(),
        })?;

    match outcome {
        InsertOutcome::Created => debug!(%email, "registered new user"),
        InsertOutcome::AlreadyExists => {
            debug!(%email, "user registered concurrently, treating as existing")
        }
    }
    Ok(())
}
