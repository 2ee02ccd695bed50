use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};

use crate::{AppState, auth::AuthUser, error::ApiError};

/// What a matched rule demands of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Anyone, token or not.
    Public,
    /// Any caller with a valid token.
    Authenticated,
    /// Nobody. Anonymous callers get 401, authenticated ones 403.
    DenyAll,
}

/// Outcome of evaluating a request against the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Permit,
    Unauthorized,
    Forbidden,
}

/// One segment of a compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `**`: zero or more whole segments.
    AnyDepth,
    /// A segment possibly containing `*` wildcards.
    Glob(String),
}

/// PathPattern
///
/// Ant-style route glob: `/api/filesystem/**`, `/swagger-ui.html`, `/files/*.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn new(raw: &str) -> Self {
        let segments = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s {
                "**" => Segment::AnyDepth,
                other => Segment::Glob(other.to_string()),
            })
            .collect();

        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches an already-normalized path.
    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match_segments(&self.segments, &parts)
    }
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::AnyDepth, rest)) => {
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        Some((Segment::Glob(glob), rest)) => match path.split_first() {
            Some((head, tail)) => glob_matches(glob.as_bytes(), head.as_bytes()) && match_segments(rest, tail),
            None => false,
        },
    }
}

/// `*` matches any run of bytes inside a single segment.
fn glob_matches(glob: &[u8], text: &[u8]) -> bool {
    match glob.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|skip| glob_matches(rest, &text[skip..])),
        Some((c, rest)) => text.first() == Some(c) && glob_matches(rest, &text[1..]),
    }
}

/// normalize_path
///
/// Collapses repeated slashes and resolves `.` and `..` segments, never climbing
/// above the root. Rules are matched against this form so a public prefix cannot
/// be used to reach a protected path.
pub fn normalize_path(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    format!("/{}", stack.join("/"))
}

/// AccessRule
///
/// `(pattern, method, requirement)`. A rule without a method matches every method.
#[derive(Debug, Clone)]
pub struct AccessRule {
    pub pattern: PathPattern,
    pub method: Option<Method>,
    pub requirement: Requirement,
}

impl AccessRule {
    pub fn new(pattern: &str, method: Option<Method>, requirement: Requirement) -> Self {
        Self {
            pattern: PathPattern::new(pattern),
            method,
            requirement,
        }
    }

    pub fn any_method(pattern: &str, requirement: Requirement) -> Self {
        Self::new(pattern, None, requirement)
    }

    pub fn applies_to(&self, method: &Method, path: &str) -> bool {
        self.method.as_ref().is_none_or(|m| m == method) && self.pattern.matches(path)
    }
}

/// AccessPolicy
///
/// The ordered rule table. Evaluated top to bottom, first match wins. Built once at
/// startup and shared read-only, so evaluation needs no locking.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    rules: Vec<AccessRule>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(Self::default_rules())
    }
}

impl AccessPolicy {
    pub fn new(rules: Vec<AccessRule>) -> Self {
        Self { rules }
    }

    /// default_rules
    ///
    /// The gateway's table:
    /// 1. API docs and Swagger UI are public.
    /// 2. `POST /api/auth/login` is public.
    /// 3. The H2 console path is public.
    /// 4. `/api/filesystem/**` needs a token.
    /// 5. Everything else needs a token.
    pub fn default_rules() -> Vec<AccessRule> {
        use Requirement::*;

        vec![
            AccessRule::any_method("/v3/api-docs/**", Public),
            AccessRule::any_method("/swagger-ui/**", Public),
            AccessRule::any_method("/swagger-ui.html", Public),
            AccessRule::new("/api/auth/login", Some(Method::POST), Public),
            AccessRule::any_method("/h2-console/**", Public),
            AccessRule::any_method("/api/filesystem/**", Authenticated),
            AccessRule::any_method("/**", Authenticated),
        ]
    }

    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }

    /// Index of the first rule that applies, if any.
    pub fn matching_rule(&self, method: &Method, path: &str) -> Option<usize> {
        let path = normalize_path(path);
        self.rules.iter().position(|r| r.applies_to(method, &path))
    }

    /// Requirement of the first matching rule. Unmatched requests need a token.
    pub fn requirement_for(&self, method: &Method, path: &str) -> Requirement {
        self.matching_rule(method, path)
            .map(|i| self.rules[i].requirement)
            .unwrap_or(Requirement::Authenticated)
    }

    /// evaluate
    ///
    /// Decides one request from its method, path and the principal (if any) the
    /// token filter resolved.
    pub fn evaluate(&self, method: &Method, path: &str, principal: Option<&AuthUser>) -> Decision {
        match (self.requirement_for(method, path), principal) {
            (Requirement::Public, _) => Decision::Permit,
            (Requirement::Authenticated, Some(_)) => Decision::Permit,
            (Requirement::Authenticated, None) => Decision::Unauthorized,
            (Requirement::DenyAll, Some(_)) => Decision::Forbidden,
            (Requirement::DenyAll, None) => Decision::Unauthorized,
        }
    }
}

/// authorize
///
/// Authorization step of the chain, after [`crate::auth::authenticate`]. Rejected
/// requests never reach a handler.
pub async fn authorize(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let principal = request.extensions().get::<AuthUser>();

    let rule = state.policy.matching_rule(&method, &path);
    let decision = state.policy.evaluate(&method, &path, principal);
    tracing::debug!(%method, %path, ?rule, ?decision, "access decision");

    match decision {
        Decision::Permit => Ok(next.run(request).await),
        Decision::Unauthorized => {
            tracing::info!(%method, %path, ?rule, "rejected: authentication required");
            Err(ApiError::Unauthorized)
        }
        Decision::Forbidden => {
            tracing::info!(%method, %path, ?rule, "rejected: access denied");
            Err(ApiError::Forbidden)
        }
    }
}
