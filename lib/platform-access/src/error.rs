//! Error types for the platform-access crate.
//!
//! Collaborator errors (`ProviderError`, `DirectoryError`) travel wrapped in a
//! rootcause `Report`. Flow errors (`CallbackError`, `SessionError`) are what
//! the HTTP layer sees; it logs them and never reveals which one occurred.

use std::fmt;

/// How a failed login or session check should be treated by operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// State or nonce did not line up. Possible attack signal.
    ProtocolIntegrity,
    /// The provider or the directory could not be reached or refused us.
    Transport,
    /// The provider vouched for an identity we will not trust.
    TrustPolicy,
    /// Local failure, such as no entropy.
    Internal,
    /// The directory and the provider disagree about a verified user.
    InvariantViolation,
}

impl FailureClass {
    /// Returns true for classes that should be logged at error level.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Internal | Self::InvariantViolation)
    }
}

/// The secure random source could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntropyError {
    /// Error reported by the operating system.
    pub details: String,
}

impl fmt::Display for EntropyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entropy unavailable: {}", self.details)
    }
}

impl std::error::Error for EntropyError {}

/// Errors from the OIDC provider adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Configuration error (invalid URLs, missing endpoints).
    Configuration { details: String },
    /// Failed to discover provider metadata.
    Discovery { details: String },
    /// The authorization code could not be exchanged.
    TokenExchange { details: String },
    /// An ID token failed signature, issuer, audience, or expiry checks.
    TokenValidation { details: String },
    /// The user-info endpoint could not be queried.
    UserInfo { details: String },
    /// The refresh grant failed.
    Refresh { details: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { details } => write!(f, "OIDC configuration error: {details}"),
            Self::Discovery { details } => write!(f, "OIDC discovery error: {details}"),
            Self::TokenExchange { details } => write!(f, "OIDC token exchange error: {details}"),
            Self::TokenValidation { details } => {
                write!(f, "OIDC token validation error: {details}")
            }
            Self::UserInfo { details } => write!(f, "OIDC user info error: {details}"),
            Self::Refresh { details } => write!(f, "OIDC token refresh error: {details}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Errors from the user directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// A query against the directory failed.
    Query { details: String },
    /// A stored row could not be decoded.
    Decode { details: String },
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query { details } => write!(f, "user directory query failed: {details}"),
            Self::Decode { details } => write!(f, "user directory row is invalid: {details}"),
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Reasons a provider callback did not produce a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    /// No `state` was recorded for this browser.
    MissingState,
    /// The `state` query parameter differs from the recorded one.
    StateMismatch,
    /// No `nonce` was recorded for this browser.
    MissingNonce,
    /// No PKCE code verifier was recorded for this browser.
    MissingVerifier,
    /// The provider redirect carried no authorization code.
    MissingCode,
    /// The code-for-token exchange was rejected or did not complete.
    ExchangeFailed { details: String },
    /// The token response carried no ID token.
    MalformedTokenResponse,
    /// The ID token did not verify.
    TokenVerificationFailed { details: String },
    /// The ID token was minted for a different authorization transaction.
    NonceMismatch,
    /// Offline access was not granted, so no refresh token was issued.
    MissingRefreshToken,
    /// The user-info endpoint could not be queried.
    UserInfoFailed { details: String },
    /// The provider did not supply an email address.
    UnverifiableIdentity,
    /// The provider has not verified the email address.
    EmailNotVerified,
    /// The user directory could not be queried or updated.
    DirectoryFailed { details: String },
}

impl CallbackError {
    /// Returns the failure class used to pick a log level.
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            Self::MissingState
            | Self::StateMismatch
            | Self::MissingNonce
            | Self::MissingVerifier
            | Self::NonceMismatch => FailureClass::ProtocolIntegrity,
            Self::MissingCode
            | Self::ExchangeFailed { .. }
            | Self::MalformedTokenResponse
            | Self::TokenVerificationFailed { .. }
            | Self::MissingRefreshToken
            | Self::UserInfoFailed { .. }
            | Self::DirectoryFailed { .. } => FailureClass::Transport,
            Self::UnverifiableIdentity | Self::EmailNotVerified => FailureClass::TrustPolicy,
        }
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingState => write!(f, "state not found"),
            Self::StateMismatch => write!(f, "invalid state"),
            Self::MissingNonce => write!(f, "nonce not found"),
            Self::MissingVerifier => write!(f, "PKCE code verifier not found"),
            Self::MissingCode => write!(f, "authorization code not found"),
            Self::ExchangeFailed { details } => {
                write!(f, "could not exchange auth code: {details}")
            }
            Self::MalformedTokenResponse => write!(f, "token response has no ID token"),
            Self::TokenVerificationFailed { details } => {
                write!(f, "ID token verification failed: {details}")
            }
            Self::NonceMismatch => write!(f, "invalid OIDC nonce"),
            Self::MissingRefreshToken => write!(f, "token response has no refresh token"),
            Self::UserInfoFailed { details } => write!(f, "could not get user info: {details}"),
            Self::UnverifiableIdentity => write!(f, "no registered email"),
            Self::EmailNotVerified => write!(f, "email not verified"),
            Self::DirectoryFailed { details } => write!(f, "user directory error: {details}"),
        }
    }
}

impl std::error::Error for CallbackError {}

/// Reasons a protected request was not allowed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No `refreshToken` cookie was presented.
    MissingRefreshToken,
    /// The provider would not mint a fresh token pair.
    RefreshFailed { details: String },
    /// The current ID token did not verify.
    TokenVerificationFailed { details: String },
    /// The ID token carries no email address.
    UnverifiableIdentity,
    /// The ID token's email address is not verified.
    EmailNotVerified,
    /// A verified email has no directory record.
    UnknownUser { email: String },
    /// The user directory could not be queried.
    DirectoryFailed { details: String },
}

impl SessionError {
    /// Returns the failure class used to pick a log level.
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            Self::MissingRefreshToken
            | Self::RefreshFailed { .. }
            | Self::TokenVerificationFailed { .. }
            | Self::DirectoryFailed { .. } => FailureClass::Transport,
            Self::UnverifiableIdentity | Self::EmailNotVerified => FailureClass::TrustPolicy,
            Self::UnknownUser { .. } => FailureClass::InvariantViolation,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRefreshToken => write!(f, "refresh token not found"),
            Self::RefreshFailed { details } => write!(f, "failed to refresh token: {details}"),
            Self::TokenVerificationFailed { details } => {
                write!(f, "ID token verification failed: {details}")
            }
            Self::UnverifiableIdentity => write!(f, "no registered email"),
            Self::EmailNotVerified => write!(f, "email not verified"),
            // The address itself stays out of the message; callers log it at debug.
            Self::UnknownUser { .. } => write!(f, "verified user has no directory record"),
            Self::DirectoryFailed { details } => write!(f, "user directory error: {details}"),
        }
    }
}

impl std::error::Error for SessionError {}
