//! HTTP routing for the gatehouse server.

use axum::{
    Json, Router,
    http::Method,
    middleware::from_fn_with_state,
    routing::get,
};
use gatehouse_platform_access::AuthenticatedIdentity;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::auth::{self, AppState, CurrentUser};

/// Builds the application router.
///
/// `/login` and `/callback` are public. Everything under `/api` runs behind
/// the session middleware. Any other path is served from `static_dir`.
pub fn router(state: Arc<AppState>, static_dir: &str) -> Router {
    let api = Router::new()
        .route("/me", get(me))
        .layer(from_fn_with_state(state.clone(), auth::protect));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/login", get(auth::login))
        .route("/callback", get(auth::callback))
        .nest("/api", api)
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Returns the identity of the signed-in user.
async fn me(CurrentUser(identity): CurrentUser) -> Json<AuthenticatedIdentity> {
    Json(identity)
}
