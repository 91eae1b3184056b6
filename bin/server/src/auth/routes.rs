//! Authentication routes for login and the provider callback.

use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use gatehouse_platform_access::{CallbackError, CallbackRequest, complete_login};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{
    AppState,
    cookies::{self, CookieOptions, ID_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE},
};

/// Where the browser lands after every callback.
const HOME: &str = "/";

/// Query parameters for the OIDC callback.
///
/// Both are optional so that a provider error redirect (which carries
/// neither) still reaches the flow and is logged.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Initiates the OIDC login flow by redirecting to the identity provider.
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let attempt = match (state.generate_attempt)() {
        Ok(attempt) => attempt,
        Err(e) => {
            error!(error = %e, "could not generate login state");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response();
        }
    };

    let auth_url = state.provider.authorization_url(&attempt);
    let options = CookieOptions::for_request(&state.session_config, &headers);
    let jar = state.attempts.begin(jar, attempt, options).await;

    (jar, Redirect::temporary(&auth_url)).into_response()
}

/// Handles the OIDC callback after the user authenticates with the identity provider.
///
/// Always redirects home. Whether the login worked is visible only in the
/// session cookies and the server log.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<CallbackQuery>, QueryRejection>,
    jar: CookieJar,
) -> impl IntoResponse {
    let query = match query {
        Ok(Query(query)) => query,
        Err(e) => {
            warn!(error = %e, "unreadable callback query");
            CallbackQuery::default()
        }
    };

    let (jar, attempt) = state.attempts.take(jar).await;
    let request = CallbackRequest {
        attempt,
        state: query.state,
        code: query.code,
    };

    let jar = match complete_login(state.provider.as_ref(), state.directory.as_ref(), request)
        .await
    {
        Ok(credential) => {
            info!("login completed");
            let options = CookieOptions::for_request(&state.session_config, &headers);
            jar.add(cookies::issue(ID_TOKEN_COOKIE, credential.id_token, options))
                .add(cookies::issue(
                    REFRESH_TOKEN_COOKIE,
                    credential.refresh_token,
                    options,
                ))
        }
        Err(e) => {
            log_failure(&e);
            jar
        }
    };

    (jar, Redirect::temporary(HOME))
}

fn log_failure(e: &CallbackError) {
    let class = e.class();
    if class.is_fault() {
        error!(error = %e, ?class, "login failed");
    } else {
        warn!(error = %e, ?class, "login failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CookieAttemptStore, login};
    use crate::config::SessionConfig;
    use axum::{
        Router,
        body::Body,
        http::{Request, header},
        routing::get,
    };
    use gatehouse_platform_access::testing::{StubProvider, claims};
    use gatehouse_platform_access::{
        AuthorizationState, EntropyError, InMemoryUserDirectory, TokenExchange,
    };
    use tower::ServiceExt;

    const SESSION_COOKIES: &str = "state=st4te; nonce=n0nce; pkceVerifier=v3rifier";

    fn router(provider: Arc<StubProvider>, directory: Arc<InMemoryUserDirectory>) -> Router {
        with_state(AppState::new(
            provider,
            directory,
            Arc::new(CookieAttemptStore),
            SessionConfig::default(),
        ))
    }

    fn with_state(state: AppState) -> Router {
        Router::new()
            .route("/login", get(login))
            .route("/callback", get(callback))
            .with_state(Arc::new(state))
    }

    fn no_entropy() -> Result<AuthorizationState, EntropyError> {
        Err(EntropyError {
            details: "getrandom unavailable".to_string(),
        })
    }

    fn alice_provider() -> StubProvider {
        StubProvider::new()
            .with_exchange(TokenExchange {
                access_token: "at".to_string(),
                id_token: Some("id-1".to_string()),
                refresh_token: Some("rt-1".to_string()),
            })
            .with_id_token("id-1", claims("alice@example.com", Some("n0nce")))
            .with_user_info("alice@example.com", "Alice", true)
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
    }

    fn callback_request(uri: &str, cookie: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn login_redirects_with_fresh_state_and_nonce() {
        let app = router(
            Arc::new(StubProvider::new()),
            Arc::new(InMemoryUserDirectory::new()),
        );

        let response = app
            .oneshot(Request::builder().uri("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let cookies = set_cookies(&response);
        let state = cookies
            .iter()
            .find_map(|c| c.strip_prefix("state="))
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        assert!(!state.is_empty());
        assert!(cookies.iter().any(|c| c.starts_with("nonce=")));
        let verifier = cookies
            .iter()
            .find_map(|c| c.strip_prefix("pkceVerifier="))
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        assert_eq!(verifier.len(), 43);
        assert!(location(&response).starts_with("https://idp.example.com/authorize"));
        assert!(location(&response).contains(&format!("state={state}")));
        assert!(location(&response).contains(&format!("code_challenge={verifier}")));
    }

    #[tokio::test]
    async fn login_without_entropy_fails_closed() {
        let app = with_state(
            AppState::new(
                Arc::new(StubProvider::new()),
                Arc::new(InMemoryUserDirectory::new()),
                Arc::new(CookieAttemptStore),
                SessionConfig::default(),
            )
            .with_attempt_generator(no_entropy),
        );

        let response = app
            .oneshot(Request::builder().uri("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::LOCATION).is_none());
        assert!(set_cookies(&response).is_empty());
    }

    #[tokio::test]
    async fn successful_callback_sets_session_cookies_and_goes_home() {
        let provider = Arc::new(alice_provider());
        let directory = Arc::new(InMemoryUserDirectory::new());
        let app = router(provider.clone(), directory.clone());

        let response = app
            .oneshot(callback_request(
                "/callback?state=st4te&code=abc",
                SESSION_COOKIES,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "/");
        let cookies = set_cookies(&response);
        assert!(cookies.iter().any(|c| c.starts_with("idToken=id-1")));
        assert!(cookies.iter().any(|c| c.starts_with("refreshToken=rt-1")));
        for name in ["state", "nonce", "pkceVerifier"] {
            assert!(
                cookies
                    .iter()
                    .any(|c| c.starts_with(&format!("{name}=;")) && c.contains("Max-Age=0")),
                "{name} not cleared: {cookies:?}"
            );
        }
        assert_eq!(directory.len().await, 1);
        assert_eq!(provider.presented_verifiers(), vec!["v3rifier".to_string()]);
    }

    #[tokio::test]
    async fn state_mismatch_goes_home_without_side_effects() {
        let provider = Arc::new(alice_provider());
        let directory = Arc::new(InMemoryUserDirectory::new());
        let app = router(provider.clone(), directory.clone());

        let response = app
            .oneshot(callback_request(
                "/callback?state=X&code=abc",
                "state=Y; nonce=n0nce; pkceVerifier=v3rifier",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "/");
        let cookies = set_cookies(&response);
        assert!(!cookies.iter().any(|c| c.starts_with("idToken=")));
        assert!(!cookies.iter().any(|c| c.starts_with("refreshToken=")));
        assert!(provider.exchanged_codes().is_empty());
        assert!(directory.is_empty().await);
    }

    #[tokio::test]
    async fn callback_without_verifier_never_exchanges_the_code() {
        let provider = Arc::new(alice_provider());
        let directory = Arc::new(InMemoryUserDirectory::new());
        let app = router(provider.clone(), directory.clone());

        let response = app
            .oneshot(callback_request(
                "/callback?state=st4te&code=abc",
                "state=st4te; nonce=n0nce",
            ))
            .await
            .unwrap();

        assert_eq!(location(&response), "/");
        assert!(
            !set_cookies(&response)
                .iter()
                .any(|c| c.starts_with("idToken="))
        );
        assert!(provider.exchanged_codes().is_empty());
        assert!(directory.is_empty().await);
    }

    #[tokio::test]
    async fn provider_error_redirect_still_goes_home() {
        let provider = Arc::new(alice_provider());
        let app = router(provider.clone(), Arc::new(InMemoryUserDirectory::new()));

        let response = app
            .oneshot(callback_request(
                "/callback?error=access_denied",
                SESSION_COOKIES,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "/");
        assert!(provider.exchanged_codes().is_empty());
    }

    #[tokio::test]
    async fn unverified_email_sets_no_session() {
        let provider = StubProvider::new()
            .with_exchange(TokenExchange {
                access_token: "at".to_string(),
                id_token: Some("id-1".to_string()),
                refresh_token: Some("rt-1".to_string()),
            })
            .with_id_token("id-1", claims("mallory@example.com", Some("n0nce")))
            .with_user_info("mallory@example.com", "Mallory", false);
        let directory = Arc::new(InMemoryUserDirectory::new());
        let app = router(Arc::new(provider), directory.clone());

        let response = app
            .oneshot(callback_request(
                "/callback?state=st4te&code=abc",
                SESSION_COOKIES,
            ))
            .await
            .unwrap();

        assert_eq!(location(&response), "/");
        assert!(
            !set_cookies(&response)
                .iter()
                .any(|c| c.starts_with("idToken="))
        );
        assert!(directory.is_empty().await);
    }
}
