use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{
    DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    config::AppConfig,
    error::{ApiError, AuthError},
    repository::RepositoryState,
};

/// Claims
///
/// Payload of the bearer tokens issued at login. Signed with HS256 and the
/// configured secret; checked on every request that carries one.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the username the token was issued to.
    pub sub: String,
    /// Expiration Time (exp): seconds since the epoch after which the token is refused.
    pub exp: usize,
    /// Issued At (iat): seconds since the epoch when the token was signed.
    pub iat: usize,
}

/// AuthUser
///
/// The principal resolved from a valid bearer token. Placed in the request
/// extensions by [`authenticate`] and read back by the extractor below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
}

/// issue_token
///
/// Signs a token for `username` valid for `jwt_expiration_secs`.
pub fn issue_token(config: &AppConfig, username: &str) -> Result<String, AuthError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: username.to_string(),
        iat: now as usize,
        exp: (now + config.jwt_expiration_secs) as usize,
    };

    let key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
    encode(&Header::default(), &claims, &key).map_err(|e| AuthError::Signing(e.to_string()))
}

/// decode_token
///
/// Checks signature and expiry and returns the claims.
pub fn decode_token(config: &AppConfig, token: &str) -> Result<Claims, AuthError> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = 0;

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(data) => Ok(data.claims),
        Err(e) => match e.kind() {
            ErrorKind::ExpiredSignature => Err(AuthError::ExpiredToken),
            _ => Err(AuthError::InvalidToken),
        },
    }
}

/// bearer_token
///
/// `Ok(None)` when no `Authorization` header is present, an error when the header
/// is there but is not a `Bearer` credential.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value.to_str().map_err(|_| AuthError::MalformedHeader)?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MalformedHeader)?;

    Ok(Some(token))
}

/// resolve_principal
///
/// Full token check for one request:
/// 1. Extract the bearer token (absent header means anonymous).
/// 2. Validate signature and expiry.
/// 3. Look the subject up in the store so deleted users lose access immediately.
pub async fn resolve_principal(
    headers: &HeaderMap,
    config: &AppConfig,
    repo: &RepositoryState,
) -> Result<Option<AuthUser>, AuthError> {
    let Some(token) = bearer_token(headers)? else {
        return Ok(None);
    };

    let claims = decode_token(config, token)?;

    let user = repo
        .find_by_username(&claims.sub)
        .await?
        .ok_or(AuthError::UnknownUser(claims.sub))?;

    Ok(Some(AuthUser {
        id: user.id,
        username: user.username,
    }))
}

/// authenticate
///
/// Token filter of the chain. Never rejects on its own: a valid token attaches an
/// `AuthUser` to the request, anything else leaves the request anonymous and the
/// authorization step decides.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let resolved = resolve_principal(request.headers(), &state.config, &state.repo).await;

    match resolved {
        Ok(Some(user)) => {
            tracing::debug!(user_id = user.id, username = %user.username, "bearer token accepted");
            request.extensions_mut().insert(user);
        }
        Ok(None) => {}
        Err(AuthError::Store(e)) => {
            tracing::error!(error = %e, "principal lookup failed, continuing anonymously");
        }
        Err(e) => {
            tracing::debug!(error = %e, "bearer token rejected");
        }
    }

    next.run(request).await
}

/// AuthUser Extractor
///
/// Handlers that take `AuthUser` get the principal attached by [`authenticate`].
/// Rejects with 401 when the request is anonymous.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}
