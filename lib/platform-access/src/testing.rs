//! In-process stand-ins for the identity provider.
//!
//! Enabled for this crate's tests and, through the `test-util` feature, for
//! downstream crates' tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::auth::AuthorizationState;
use crate::error::ProviderError;
use crate::provider::{IdentityProvider, SessionTokens, TokenExchange, UserInfo, VerifiedIdToken};

/// Builds verified claims for a token that expires in an hour.
#[must_use]
pub fn claims(email: &str, nonce: Option<&str>) -> VerifiedIdToken {
    VerifiedIdToken {
        subject: format!("sub-{email}"),
        nonce: nonce.map(str::to_string),
        expires_at: Utc::now() + Duration::hours(1),
        email: Some(email.to_string()),
        email_verified: true,
    }
}

/// A provider whose every answer is scripted up front.
///
/// ID tokens verify only if registered with [`StubProvider::with_id_token`]
/// and not yet expired. Operations with no scripted answer fail.
#[derive(Debug, Default)]
pub struct StubProvider {
    id_tokens: HashMap<String, VerifiedIdToken>,
    exchange: Option<TokenExchange>,
    user_info: Option<UserInfo>,
    minted: Option<(String, String)>,
    exchanged_codes: Mutex<Vec<String>>,
    presented_verifiers: Mutex<Vec<String>>,
    refresh_calls: AtomicUsize,
}

impl StubProvider {
    /// Creates a provider that fails every network operation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a raw ID token and the claims it verifies to.
    #[must_use]
    pub fn with_id_token(mut self, raw: &str, claims: VerifiedIdToken) -> Self {
        self.id_tokens.insert(raw.to_string(), claims);
        self
    }

    /// Sets the response to any code exchange.
    #[must_use]
    pub fn with_exchange(mut self, exchange: TokenExchange) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Sets the user-info response.
    #[must_use]
    pub fn with_user_info(mut self, email: &str, name: &str, email_verified: bool) -> Self {
        self.user_info = Some(UserInfo {
            email: email.to_string(),
            name: name.to_string(),
            email_verified,
        });
        self
    }

    /// Sets the token pair a refresh grant mints.
    #[must_use]
    pub fn with_refresh(mut self, id_token: &str, refresh_token: &str) -> Self {
        self.minted = Some((id_token.to_string(), refresh_token.to_string()));
        self
    }

    /// Returns how many refresh grants were performed.
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Returns the authorization codes that were exchanged, in order.
    pub fn exchanged_codes(&self) -> Vec<String> {
        self.exchanged_codes
            .lock()
            .map(|codes| codes.clone())
            .unwrap_or_default()
    }

    /// Returns the PKCE verifiers presented with each exchange, in order.
    pub fn presented_verifiers(&self) -> Vec<String> {
        self.presented_verifiers
            .lock()
            .map(|verifiers| verifiers.clone())
            .unwrap_or_default()
    }

    fn verify(&self, raw: &str) -> Result<VerifiedIdToken, ProviderError> {
        let claims = self
            .id_tokens
            .get(raw)
            .ok_or_else(|| ProviderError::TokenValidation {
                details: "unknown token".to_string(),
            })?;
        if claims.expires_at <= Utc::now() {
            return Err(ProviderError::TokenValidation {
                details: "token expired".to_string(),
            });
        }
        Ok(claims.clone())
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    /// Carries the verifier itself as the challenge (the `plain` method).
    fn authorization_url(&self, attempt: &AuthorizationState) -> String {
        format!(
            "https://idp.example.com/authorize?response_type=code&state={}&nonce={}&code_challenge={}&access_type=offline",
            attempt.state, attempt.nonce, attempt.pkce_verifier
        )
    }

    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> gatehouse_core::Result<TokenExchange, ProviderError> {
        if let Ok(mut codes) = self.exchanged_codes.lock() {
            codes.push(code.to_string());
        }
        if let Ok(mut verifiers) = self.presented_verifiers.lock() {
            verifiers.push(pkce_verifier.to_string());
        }
        Ok(self
            .exchange
            .clone()
            .ok_or_else(|| ProviderError::TokenExchange {
                details: "invalid_grant".to_string(),
            })?)
    }

    async fn verify_id_token(
        &self,
        raw: &str,
    ) -> gatehouse_core::Result<VerifiedIdToken, ProviderError> {
        Ok(self.verify(raw)?)
    }

    async fn fetch_user_info(
        &self,
        _access_token: &str,
    ) -> gatehouse_core::Result<UserInfo, ProviderError> {
        Ok(self
            .user_info
            .clone()
            .ok_or_else(|| ProviderError::UserInfo {
                details: "connection refused".to_string(),
            })?)
    }

    async fn refresh_session(
        &self,
        refresh_token: &str,
        stale_id_token: Option<&str>,
    ) -> gatehouse_core::Result<SessionTokens, ProviderError> {
        if let Some(stale) = stale_id_token.filter(|raw| self.verify(raw).is_ok()) {
            return Ok(SessionTokens {
                id_token: stale.to_string(),
                refresh_token: refresh_token.to_string(),
                refreshed: false,
            });
        }

        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let (id_token, refresh_token) =
            self.minted.clone().ok_or_else(|| ProviderError::Refresh {
                details: "invalid_grant".to_string(),
            })?;
        Ok(SessionTokens {
            id_token,
            refresh_token,
            refreshed: true,
        })
    }
}
