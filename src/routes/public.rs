use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints opened by the public rules of the access table. Swagger UI and the
/// OpenAPI document are merged separately in `create_router`.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // POST /api/auth/login
        // Verifies username and password and issues a bearer token.
        .route("/api/auth/login", post(handlers::login))
        // GET /swagger-ui.html
        // Redirects to the Swagger UI served under /swagger-ui/.
        .route("/swagger-ui.html", get(handlers::swagger_ui_html))
}
