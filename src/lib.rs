use axum::{
    Router,
    extract::FromRef,
    http::{HeaderName, HeaderValue, header},
    middleware,
};
use std::sync::Arc;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod accounts;
pub mod auth;
pub mod config;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod models;
pub mod password;
pub mod policy;
pub mod repository;

pub mod routes;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use accounts::Authenticator;
pub use config::AppConfig;
pub use error::{ApiError, ConfigError};
pub use policy::AccessPolicy;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document served at `/v3/api-docs`, browsable under `/swagger-ui/`.
#[derive(OpenApi)]
#[openapi(
    paths(handlers::login, handlers::get_me),
    components(schemas(models::LoginRequest, models::LoginResponse, models::UserProfile)),
    modifiers(&BearerSecurity),
    tags((name = "essia-gateway", description = "Authentication gateway API"))
)]
struct ApiDoc;

/// Registers the `bearer` scheme referenced by protected operations.
struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// AppState
///
/// Shared, read-only container handed to every request: the user store, the loaded
/// configuration and the access rule table.
#[derive(Clone)]
pub struct AppState {
    /// User persistence (Postgres in production, in-memory in tests).
    pub repo: RepositoryState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
    /// First-match access rules, built once at startup.
    pub policy: Arc<AccessPolicy>,
    /// Login credential check, holding the dummy hash for unknown usernames.
    pub authenticator: Arc<Authenticator>,
}

impl AppState {
    /// State with the default access table.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        let authenticator = Arc::new(Authenticator::new(repo.clone(), config.bcrypt_cost));
        Self {
            repo,
            config,
            policy: Arc::new(AccessPolicy::default()),
            authenticator,
        }
    }

    /// Replaces the access table.
    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }
}

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles routes and the security chain. Request processing order, outermost first:
///
/// 1. `X-Frame-Options: SAMEORIGIN` on every response, preflights included
/// 2. CORS (answers preflights, filters `Access-Control-Allow-Origin`)
/// 3. request id + tracing span
/// 4. token authentication (`auth::authenticate`)
/// 5. access policy (`policy::authorize`)
/// 6. handler, or the 404 fallback
///
/// No session layer exists: every request proves its identity with its own token.
pub fn create_router(state: AppState) -> Result<Router, ConfigError> {
    // 1. CORS Configuration (validated; fails on wildcard + credentials)
    let cors = cors::cors_layer(&state.config.cors)?;

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Routes. The fallback is registered before the layers so unknown paths
    //    are also subject to the access policy.
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/v3/api-docs", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(authenticated::authenticated_routes())
        .fallback(handlers::not_found)
        // Inner layer runs last: authorization sees the principal set by authentication.
        .layer(middleware::from_fn_with_state(state.clone(), policy::authorize))
        .layer(middleware::from_fn_with_state(state.clone(), auth::authenticate))
        .with_state(state);

    // 3. Observability, CORS, then the framing header (outermost).
    Ok(base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        )))
}

/// trace_span_logger
///
/// Span for `TraceLayer`: method, uri and the `x-request-id` set one layer out,
/// so every log line of a request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
