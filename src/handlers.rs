use crate::{
    AppState,
    auth::{self, AuthUser},
    error::ApiError,
    models::{LoginRequest, LoginResponse, UserProfile},
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Redirect},
};

// --- Handlers ---

/// login
///
/// [Public Route] Exchanges a username and password for a bearer token.
/// Unknown user and wrong password both answer 401 with the same message.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 400, description = "Malformed body or missing username or password"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    // Malformed or incomplete bodies answer with the same error shape as every other failure.
    let Json(payload) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "username and password are required".to_string(),
        ));
    }

    let user = state
        .authenticator
        .check_credentials(payload.username.trim(), &payload.password)
        .await
        .inspect_err(|e| tracing::info!(username = %payload.username, error = %e, "login failed"))?;

    let token = auth::issue_token(&state.config, &user.username)?;
    tracing::info!(user_id = user.id, "login succeeded");

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.jwt_expiration_secs,
    }))
}

/// get_me
///
/// [Authenticated Route] The stored profile of the user behind the presented token.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "User removed since the token was checked")
    ),
    security(("bearer" = []))
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, ApiError> {
    let user = state.repo.find_by_id(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(UserProfile::from(&user)))
}

/// swagger_ui_html
///
/// [Public Route] Legacy entry point for the Swagger UI.
pub async fn swagger_ui_html() -> Redirect {
    Redirect::permanent("/swagger-ui/")
}

/// not_found
///
/// Fallback for every path without a handler. Only reached once the request has
/// passed the access policy.
pub async fn not_found() -> impl IntoResponse {
    ApiError::NotFound
}
