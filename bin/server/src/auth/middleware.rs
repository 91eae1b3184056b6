//! Session middleware and extractors for Axum.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use gatehouse_platform_access::{
    AuthenticatedIdentity, SessionCookies, SessionError, resume_session,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::{
    AppState,
    cookies::{self, CookieOptions, ID_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE},
};

/// Where denied requests are sent.
const LOGIN: &str = "/login";

/// Guards the wrapped routes with the session carried in cookies.
///
/// On success the resolved [`AuthenticatedIdentity`] is inserted into the
/// request's extensions and, if the provider minted new tokens, the response
/// carries them back as cookies. Any failure redirects to `/login` without
/// running the wrapped handler.
pub async fn protect(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let presented = SessionCookies {
        id_token: cookies::read(&jar, ID_TOKEN_COOKIE),
        refresh_token: cookies::read(&jar, REFRESH_TOKEN_COOKIE),
    };

    let resumed =
        match resume_session(state.provider.as_ref(), state.directory.as_ref(), presented).await {
            Ok(resumed) => resumed,
            Err(e) => {
                log_denial(&e);
                return Redirect::temporary(LOGIN).into_response();
            }
        };

    let options = CookieOptions::for_request(&state.session_config, request.headers());
    request.extensions_mut().insert(resumed.identity);
    let response = next.run(request).await;

    if !resumed.tokens.refreshed {
        return response;
    }

    debug!("re-issuing refreshed session cookies");
    let jar = jar
        .add(cookies::issue(ID_TOKEN_COOKIE, resumed.tokens.id_token, options))
        .add(cookies::issue(
            REFRESH_TOKEN_COOKIE,
            resumed.tokens.refresh_token,
            options,
        ));
    (jar, response).into_response()
}

fn log_denial(e: &SessionError) {
    let class = e.class();
    if class.is_fault() {
        error!(error = %e, ?class, "session check failed");
    } else if matches!(e, SessionError::MissingRefreshToken) {
        debug!("no session presented");
    } else {
        warn!(error = %e, ?class, "session check failed");
    }
}

/// Extractor for the identity resolved by [`protect`].
///
/// Only meaningful on routes behind the middleware; elsewhere it redirects
/// to the login page.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthenticatedIdentity);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedIdentity>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| Redirect::temporary(LOGIN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CookieAttemptStore;
    use crate::config::SessionConfig;
    use axum::{
        Router,
        body::Body,
        http::{StatusCode, header},
        routing::get,
    };
    use chrono::{Duration, Utc};
    use gatehouse_platform_access::testing::{StubProvider, claims};
    use gatehouse_platform_access::{InMemoryUserDirectory, UserDirectory};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    async fn whoami(CurrentUser(identity): CurrentUser) -> String {
        identity.email
    }

    async fn alice_directory() -> Arc<InMemoryUserDirectory> {
        let directory = Arc::new(InMemoryUserDirectory::new());
        directory
            .insert("alice@example.com", "Alice")
            .await
            .expect("insert");
        directory
    }

    fn router(
        provider: Arc<StubProvider>,
        directory: Arc<InMemoryUserDirectory>,
        hits: Arc<AtomicUsize>,
    ) -> Router {
        let state = Arc::new(AppState::new(
            provider,
            directory,
            Arc::new(CookieAttemptStore),
            SessionConfig::default(),
        ));
        Router::new()
            .route(
                "/whoami",
                get(move |user: CurrentUser| {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        whoami(user).await
                    }
                }),
            )
            .layer(axum::middleware::from_fn_with_state(state, protect))
    }

    fn request(cookie: Option<&str>) -> Request {
        let builder = axum::http::Request::builder().uri("/whoami");
        let builder = match cookie {
            Some(cookie) => builder.header(header::COOKIE, cookie),
            None => builder,
        };
        builder.body(Body::empty()).unwrap()
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn valid_session_reaches_handler_without_new_cookies() {
        let provider =
            Arc::new(StubProvider::new().with_id_token("id-1", claims("alice@example.com", None)));
        let hits = Arc::new(AtomicUsize::new(0));
        let app = router(provider.clone(), alice_directory().await, hits.clone());

        let response = app
            .oneshot(request(Some("idToken=id-1; refreshToken=rt-1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookies(&response).is_empty());
        assert_eq!(provider.refresh_calls(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(body_text(response).await, "alice@example.com");
    }

    #[tokio::test]
    async fn missing_refresh_token_redirects_to_login() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = router(
            Arc::new(StubProvider::new()),
            alice_directory().await,
            hits.clone(),
        );

        let response = app.oneshot(request(Some("idToken=id-1"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/login");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_cookies_at_all_redirects_to_login() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = router(
            Arc::new(StubProvider::new()),
            alice_directory().await,
            hits.clone(),
        );

        let response = app.oneshot(request(None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_id_token_is_refreshed_and_reissued() {
        let mut stale = claims("alice@example.com", None);
        stale.expires_at = Utc::now() - Duration::minutes(5);
        let provider = Arc::new(
            StubProvider::new()
                .with_id_token("id-old", stale)
                .with_id_token("id-new", claims("alice@example.com", None))
                .with_refresh("id-new", "rt-new"),
        );
        let hits = Arc::new(AtomicUsize::new(0));
        let app = router(provider.clone(), alice_directory().await, hits.clone());

        let response = app
            .oneshot(request(Some("idToken=id-old; refreshToken=rt-old")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(provider.refresh_calls(), 1);
        let cookies = set_cookies(&response);
        assert!(cookies.iter().any(|c| c.starts_with("idToken=id-new")));
        assert!(cookies.iter().any(|c| c.starts_with("refreshToken=rt-new")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_redirects_to_login() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = router(
            Arc::new(StubProvider::new()),
            alice_directory().await,
            hits.clone(),
        );

        let response = app
            .oneshot(request(Some("refreshToken=revoked")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn verified_user_missing_from_directory_is_denied() {
        let provider =
            Arc::new(StubProvider::new().with_id_token("id-1", claims("bob@example.com", None)));
        let hits = Arc::new(AtomicUsize::new(0));
        let app = router(provider, alice_directory().await, hits.clone());

        let response = app
            .oneshot(request(Some("idToken=id-1; refreshToken=rt-1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn current_user_outside_middleware_redirects() {
        let app = Router::new().route("/whoami", get(whoami));

        let response = app.oneshot(request(None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }
}
