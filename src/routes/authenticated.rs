use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Endpoints that need a valid bearer token. Handlers here take `AuthUser`, which
/// the token filter attached before the policy let the request through.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/auth/me
        // Profile of the user the token was issued to.
        .route("/api/auth/me", get(handlers::get_me))
}
