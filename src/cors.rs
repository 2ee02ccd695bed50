use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::{config::CorsSettings, error::ConfigError};

/// cors_layer
///
/// Builds the CORS layer from the settings after validating them. Origins are
/// matched against an exact list, so a request from any other origin gets no
/// `Access-Control-Allow-Origin` header and the browser blocks the read.
/// Preflight requests are answered here and never reach authentication.
///
/// A `*` entry becomes tower-http's `Any`; `validate` only lets that through when
/// credentials are off.
pub fn cors_layer(settings: &CorsSettings) -> Result<CorsLayer, ConfigError> {
    settings.validate()?;

    let allow_origin = if is_wildcard(&settings.allowed_origins) {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(parse_all(&settings.allowed_origins, "origin", |o| {
            HeaderValue::from_str(o).ok()
        })?)
    };

    let allow_methods = if is_wildcard(&settings.allowed_methods) {
        AllowMethods::any()
    } else {
        AllowMethods::list(parse_all(&settings.allowed_methods, "method", |m| {
            Method::from_bytes(m.as_bytes()).ok()
        })?)
    };

    let allow_headers = if is_wildcard(&settings.allowed_headers) {
        AllowHeaders::any()
    } else {
        AllowHeaders::list(parse_all(&settings.allowed_headers, "header", |h| {
            HeaderName::from_bytes(h.as_bytes()).ok()
        })?)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(allow_methods)
        .allow_headers(allow_headers)
        .allow_credentials(settings.allow_credentials))
}

fn is_wildcard(entries: &[String]) -> bool {
    entries.iter().any(|e| e == "*")
}

fn parse_all<T>(
    entries: &[String],
    kind: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Vec<T>, ConfigError> {
    entries
        .iter()
        .map(|e| parse(e).ok_or_else(|| ConfigError::InvalidCors(format!("invalid {kind} `{e}`"))))
        .collect()
}
