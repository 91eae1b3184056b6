//! OIDC client implementation using the openidconnect crate.

use async_trait::async_trait;
use gatehouse_platform_access::{
    AuthorizationState, IdentityProvider, OidcConfig, ProviderError, SessionTokens, TokenExchange, UserInfo,
    VerifiedIdToken,
};
use openidconnect::core::{
    CoreAuthenticationFlow, CoreClient, CoreIdToken, CoreProviderMetadata, CoreUserInfoClaims,
};
use openidconnect::{
    AccessToken, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointMaybeSet,
    EndpointNotSet, EndpointSet, IssuerUrl, Nonce, OAuth2TokenResponse, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, Scope,
};
use tracing::{debug, info, instrument};

/// Client as built from discovered metadata: the authorization endpoint is
/// always known, token and user-info endpoints only if the provider lists them.
type DiscoveredClient = CoreClient<
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointMaybeSet,
    EndpointMaybeSet,
>;

/// OIDC client for authenticating users.
pub struct OidcClient {
    client: DiscoveredClient,
    http_client: reqwest::Client,
    config: OidcConfig,
}

impl OidcClient {
    /// Creates a new OIDC client by discovering the provider metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] for unusable URLs and
    /// [`ProviderError::Discovery`] if the provider metadata cannot be fetched.
    #[instrument(skip_all, fields(issuer = %config.issuer_url()))]
    pub async fn discover(config: OidcConfig) -> gatehouse_core::Result<Self, ProviderError> {
        let issuer_url = IssuerUrl::new(config.issuer_url().to_string()).map_err(|e| {
            ProviderError::Configuration {
                details: format!("invalid issuer URL: {e}"),
            }
        })?;

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProviderError::Configuration {
                details: format!("failed to create HTTP client: {e}"),
            })?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| ProviderError::Discovery {
                details: format!("failed to discover provider: {e}"),
            })?;

        let redirect_url = RedirectUrl::new(config.redirect_uri().to_string()).map_err(|e| {
            ProviderError::Configuration {
                details: format!("invalid redirect URI: {e}"),
            }
        })?;

        let client = CoreClient::from_provider_metadata(
            provider_metadata,
            ClientId::new(config.client_id().to_string()),
            Some(ClientSecret::new(config.client_secret().to_string())),
        )
        .set_redirect_uri(redirect_url);

        info!("discovered OIDC provider");

        Ok(Self {
            client,
            http_client,
            config,
        })
    }

    fn verify(&self, raw: &str) -> Result<VerifiedIdToken, ProviderError> {
        let id_token: CoreIdToken =
            serde_json::from_value(serde_json::Value::String(raw.to_string())).map_err(|e| {
                ProviderError::TokenValidation {
                    details: format!("malformed ID token: {e}"),
                }
            })?;

        let claims = id_token
            .claims(&self.client.id_token_verifier(), report_nonce_only)
            .map_err(|e| ProviderError::TokenValidation {
                details: format!("ID token validation failed: {e}"),
            })?;

        Ok(VerifiedIdToken {
            subject: claims.subject().as_str().to_string(),
            nonce: claims.nonce().map(|n| n.secret().clone()),
            expires_at: claims.expiration(),
            email: claims.email().map(|e| e.as_str().to_string()),
            email_verified: claims.email_verified().unwrap_or(false),
        })
    }
}

/// The callback compares the nonce itself, against the pending attempt.
fn report_nonce_only(_nonce: Option<&Nonce>) -> Result<(), String> {
    Ok(())
}

/// S256 challenge sent in place of the verifier.
fn pkce_challenge(verifier: &str) -> PkceCodeChallenge {
    PkceCodeChallenge::from_code_verifier_sha256(&PkceCodeVerifier::new(verifier.to_string()))
}

/// Reads the raw ID token out of a token response.
fn raw_id_token<TR>(token_response: &TR) -> Result<Option<String>, serde_json::Error>
where
    TR: serde::Serialize,
{
    let response_json = serde_json::to_value(token_response)?;
    Ok(response_json
        .get("id_token")
        .and_then(|v| v.as_str())
        .map(str::to_string))
}

#[async_trait]
impl IdentityProvider for OidcClient {
    fn authorization_url(&self, attempt: &AuthorizationState) -> String {
        let state = attempt.state.clone();
        let nonce = attempt.nonce.clone();
        let challenge = pkce_challenge(&attempt.pkce_verifier);

        let mut auth_request = self
            .client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                move || CsrfToken::new(state),
                move || Nonce::new(nonce),
            )
            .set_pkce_challenge(challenge);

        // `openid` is always requested by the flow itself.
        for scope in self.config.scopes() {
            if scope != "openid" {
                auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
            }
        }

        if self.config.offline_access() {
            auth_request = auth_request.add_extra_param("access_type", "offline");
        }

        let (auth_url, _csrf_token, _nonce) = auth_request.url();
        auth_url.to_string()
    }

    #[instrument(skip_all)]
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> gatehouse_core::Result<TokenExchange, ProviderError> {
        let token_request = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| ProviderError::Configuration {
                details: format!("token endpoint error: {e}"),
            })?
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()));

        let token_response = token_request
            .request_async(&self.http_client)
            .await
            .map_err(|e| ProviderError::TokenExchange {
                details: format!("token exchange failed: {e}"),
            })?;

        let id_token = raw_id_token(&token_response).map_err(|e| ProviderError::TokenExchange {
            details: format!("failed to read token response: {e}"),
        })?;

        Ok(TokenExchange {
            access_token: token_response.access_token().secret().clone(),
            id_token,
            refresh_token: token_response.refresh_token().map(|t| t.secret().clone()),
        })
    }

    async fn verify_id_token(
        &self,
        raw: &str,
    ) -> gatehouse_core::Result<VerifiedIdToken, ProviderError> {
        Ok(self.verify(raw)?)
    }

    #[instrument(skip_all)]
    async fn fetch_user_info(
        &self,
        access_token: &str,
    ) -> gatehouse_core::Result<UserInfo, ProviderError> {
        let request = self
            .client
            .user_info(AccessToken::new(access_token.to_string()), None)
            .map_err(|e| ProviderError::Configuration {
                details: format!("user info endpoint error: {e}"),
            })?;

        let claims: CoreUserInfoClaims = request
            .request_async(&self.http_client)
            .await
            .map_err(|e| ProviderError::UserInfo {
                details: format!("user info request failed: {e}"),
            })?;

        Ok(UserInfo {
            email: claims
                .email()
                .map(|e| e.as_str().to_string())
                .unwrap_or_default(),
            name: claims
                .name()
                .and_then(|n| n.get(None))
                .map(|n| n.as_str().to_string())
                .unwrap_or_default(),
            email_verified: claims.email_verified().unwrap_or(false),
        })
    }

    #[instrument(skip_all)]
    async fn refresh_session(
        &self,
        refresh_token: &str,
        stale_id_token: Option<&str>,
    ) -> gatehouse_core::Result<SessionTokens, ProviderError> {
        if let Some(raw) = stale_id_token {
            match self.verify(raw) {
                Ok(_) => {
                    return Ok(SessionTokens {
                        id_token: raw.to_string(),
                        refresh_token: refresh_token.to_string(),
                        refreshed: false,
                    });
                }
                Err(e) => debug!(error = %e, "cached ID token unusable, refreshing"),
            }
        }

        let refresh = RefreshToken::new(refresh_token.to_string());
        let token_request =
            self.client
                .exchange_refresh_token(&refresh)
                .map_err(|e| ProviderError::Configuration {
                    details: format!("token endpoint error: {e}"),
                })?;

        let token_response = token_request
            .request_async(&self.http_client)
            .await
            .map_err(|e| ProviderError::Refresh {
                details: format!("refresh grant failed: {e}"),
            })?;

        let id_token = raw_id_token(&token_response)
            .map_err(|e| ProviderError::Refresh {
                details: format!("failed to read token response: {e}"),
            })?
            .ok_or_else(|| ProviderError::Refresh {
                details: "no ID token in refresh response".to_string(),
            })?;

        let refresh_token = token_response
            .refresh_token()
            .map(|t| t.secret().clone())
            .unwrap_or_else(|| refresh_token.to_string());

        Ok(SessionTokens {
            id_token,
            refresh_token,
            refreshed: true,
        })
    }
}
