//! OIDC login and session resumption for gatehouse.
//!
//! This crate provides:
//! - The identity provider and user directory contracts (`IdentityProvider`, `UserDirectory`)
//! - The callback flow that turns a provider redirect into session tokens (`complete_login`)
//! - The per-request session check that verifies or refreshes those tokens (`resume_session`)
//! - Random state, nonce, and PKCE verifier generation and the error taxonomy shared by both flows
//!
//! It knows nothing about HTTP. The server crate moves values between
//! cookies, query strings, and these functions.
//!
//! # Example
//!
//! ```
//! use gatehouse_platform_access::{AuthorizationState, OidcConfig};
//!
//! let config = OidcConfig::new(
//!     "https://accounts.google.com".to_string(),
//!     "client-id".to_string(),
//!     "client-secret".to_string(),
//!     "https://app.example.com/callback".to_string(),
//! );
//! assert_eq!(config.scopes(), vec!["openid", "email", "profile"]);
//!
//! // Fresh correlators per login redirect.
//! let attempt = AuthorizationState::generate().expect("entropy available");
//! assert_ne!(attempt.state, attempt.nonce);
//! assert_eq!(attempt.pkce_verifier.len(), 43);
//! ```

pub mod auth;
pub mod callback;
pub mod directory;
pub mod error;
pub mod oidc;
pub mod provider;
pub mod session;
pub mod token;
pub mod user;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export main types at crate root
pub use auth::{AuthenticatedIdentity, AuthorizationState, SessionCredential};
pub use callback::{CallbackRequest, PendingAttempt, complete_login};
pub use directory::{InMemoryUserDirectory, InsertOutcome, UserDirectory};
pub use error::{
    CallbackError, DirectoryError, EntropyError, FailureClass, ProviderError, SessionError,
};
pub use oidc::OidcConfig;
pub use provider::{IdentityProvider, SessionTokens, TokenExchange, UserInfo, VerifiedIdToken};
pub use session::{ResumedSession, SessionCookies, resume_session};
pub use user::UserRecord;
