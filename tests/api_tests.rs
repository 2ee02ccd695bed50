use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use essia_gateway::{
    AppConfig, AppState, InMemoryRepository, RepositoryState, accounts, auth, create_router,
    policy::{AccessPolicy, AccessRule, Requirement},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt;

const TEST_COST: u32 = 4;
const ALLOWED_ORIGIN: &str = "http://localhost:3000";

struct TestApp {
    router: Router,
    repo: Arc<InMemoryRepository>,
    config: AppConfig,
}

/// Router over an in-memory store holding `alice` / `secret`.
async fn spawn_app() -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let state_repo: RepositoryState = repo.clone();
    accounts::register(&state_repo, "alice", "secret", TEST_COST)
        .await
        .expect("seed user");

    let config = AppConfig {
        bcrypt_cost: TEST_COST,
        ..AppConfig::default()
    };
    let router = create_router(AppState::new(state_repo, config.clone())).expect("router");

    TestApp {
        router,
        repo,
        config,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn login_request(username: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "username": username, "password": password }).to_string(),
        ))
        .unwrap()
}

async fn login(app: &TestApp) -> String {
    let response = send(app, login_request("alice", "secret")).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string()
}

// --- Login ---

#[tokio::test]
async fn test_login_is_public_and_issues_token() {
    let app = spawn_app().await;

    let response = send(&app, login_request("alice", "secret")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    let token = body["token"].as_str().unwrap();
    assert_eq!(auth::decode_token(&app.config, token).unwrap().sub, "alice");
}

#[tokio::test]
async fn test_login_with_bad_credentials_is_unauthorized() {
    let app = spawn_app().await;

    let wrong = send(&app, login_request("alice", "wrong")).await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(wrong).await;
    assert_eq!(body["error"], "invalid username or password");

    let unknown = send(&app, login_request("mallory", "secret")).await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_with_blank_fields_is_bad_request() {
    let app = spawn_app().await;

    let response = send(&app, login_request("", "")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

fn raw_login_request(body: &'static str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_login_with_malformed_body_is_bad_request_json() {
    let app = spawn_app().await;

    for body in [r#"{"username":"alice"}"#, "username=alice&password=secret", ""] {
        let response = send(&app, raw_login_request(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("application/json"), "{body}: {content_type}");
        let error = body_json(response).await;
        assert!(error["error"].is_string(), "{body}: {error}");
    }
}

#[tokio::test]
async fn test_login_only_public_for_post() {
    let app = spawn_app().await;

    let response = send(&app, get("/api/auth/login")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// --- Protected Routes ---

#[tokio::test]
async fn test_me_requires_token() {
    let app = spawn_app().await;

    let anonymous = send(&app, get("/api/auth/me")).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let token = login(&app).await;
    let response = send(&app, get_with_token("/api/auth/me", &token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["username"], "alice");
    assert_eq!(body["id"], 1);
    assert!(body.get("password").is_none());
}

#[tokio::test]
async fn test_filesystem_with_valid_token_passes_policy() {
    let app = spawn_app().await;
    let token = login(&app).await;

    let anonymous = send(&app, get("/api/filesystem/anything")).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    // No handler is mounted there, so a permitted request ends in the 404 fallback.
    let permitted = send(&app, get_with_token("/api/filesystem/anything", &token)).await;
    assert_eq!(permitted.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unlisted_paths_reject_missing_or_invalid_tokens() {
    let app = spawn_app().await;

    for uri in ["/", "/api/anything", "/api/filesystem", "/random/path"] {
        let response = send(&app, get(uri)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");

        let response = send(&app, get_with_token(uri, "garbage")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn test_token_of_deleted_user_is_rejected() {
    let app = spawn_app().await;
    let token = login(&app).await;

    app.repo.remove(1);

    let response = send(&app, get_with_token("/api/auth/me", &token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_reads_profile_from_store() {
    let app = spawn_app().await;
    let state_repo: RepositoryState = app.repo.clone();
    let bob = accounts::register(&state_repo, "bob", "hunter2", TEST_COST)
        .await
        .unwrap();
    let token = auth::issue_token(&app.config, "bob").unwrap();

    let response = send(&app, get_with_token("/api/auth/me", &token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], bob.id());
    assert_eq!(body["username"], "bob");
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let app = spawn_app().await;
    let foreign = AppConfig {
        jwt_secret: "another-secret".to_string(),
        ..AppConfig::default()
    };
    let token = auth::issue_token(&foreign, "alice").unwrap();

    let response = send(&app, get_with_token("/api/auth/me", &token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_dot_segments_do_not_bypass_policy() {
    let app = spawn_app().await;

    let response = send(&app, get("/swagger-ui/../api/auth/me")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// --- Public Routes ---

#[tokio::test]
async fn test_api_docs_are_public_even_with_garbage_token() {
    let app = spawn_app().await;

    let response = send(&app, get_with_token("/v3/api-docs", "garbage")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["paths"]["/api/auth/login"].is_object());
    assert!(body["components"]["securitySchemes"]["bearer"].is_object());
}

#[tokio::test]
async fn test_swagger_ui_html_redirects() {
    let app = spawn_app().await;

    let response = send(&app, get("/swagger-ui.html")).await;
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/swagger-ui/");
}

#[tokio::test]
async fn test_h2_console_path_is_public() {
    let app = spawn_app().await;

    // Public but nothing is served there.
    let response = send(&app, get("/h2-console/login.jsp")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// --- Response Headers ---

#[tokio::test]
async fn test_frame_options_on_every_response() {
    let app = spawn_app().await;

    for request in [get("/v3/api-docs"), get("/api/auth/me"), login_request("alice", "secret")] {
        let response = send(&app, request).await;
        assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "SAMEORIGIN");
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = spawn_app().await;

    let response = send(&app, get("/api/auth/me")).await;
    assert!(response.headers().contains_key("x-request-id"));
}

// --- CORS ---

fn with_origin(origin: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::ORIGIN, origin)
        .body(Body::empty())
        .unwrap()
}

fn preflight(origin: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::OPTIONS)
        .uri(uri)
        .header(header::ORIGIN, origin)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_cors_allows_configured_origin_with_credentials() {
    let app = spawn_app().await;

    let response = send(&app, with_origin(ALLOWED_ORIGIN, "/v3/api-docs")).await;
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], ALLOWED_ORIGIN);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
}

#[tokio::test]
async fn test_cors_ignores_foreign_origin() {
    let app = spawn_app().await;

    let response = send(&app, with_origin("http://evil.com", "/v3/api-docs")).await;
    let allow_origin = response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN);
    assert!(allow_origin.is_none_or(|v| v != "http://evil.com"));

    let response = send(&app, preflight("http://evil.com", "/api/auth/me")).await;
    let allow_origin = response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN);
    assert!(allow_origin.is_none_or(|v| v != "http://evil.com"));
}

#[tokio::test]
async fn test_preflight_skips_authentication() {
    let app = spawn_app().await;

    let response = send(&app, preflight(ALLOWED_ORIGIN, "/api/auth/me")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], ALLOWED_ORIGIN);
    let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
    for method in ["GET", "POST", "PUT", "DELETE", "OPTIONS"] {
        assert!(methods.contains(method), "{method} missing from {methods}");
    }
    let allowed_headers = headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed_headers.contains("authorization"));
    assert!(allowed_headers.contains("content-type"));
    assert_eq!(headers[header::X_FRAME_OPTIONS], "SAMEORIGIN");
}

#[tokio::test]
async fn test_wildcard_origin_with_credentials_refuses_to_build() {
    let mut config = AppConfig::default();
    config.cors.allowed_origins = vec!["*".to_string()];

    let state = AppState::new(Arc::new(InMemoryRepository::new()), config);
    assert!(create_router(state).is_err());
}

// --- Custom Policy ---

#[tokio::test]
async fn test_deny_all_rule_answers_forbidden_for_authenticated_callers() {
    let app = spawn_app().await;
    let token = login(&app).await;

    let mut rules = vec![AccessRule::any_method("/api/auth/me", Requirement::DenyAll)];
    rules.extend(AccessPolicy::default_rules());
    let state = AppState::new(app.repo.clone(), app.config.clone())
        .with_policy(AccessPolicy::new(rules));
    let router = create_router(state).unwrap();

    let anonymous = router.clone().oneshot(get("/api/auth/me")).await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let authenticated = router
        .oneshot(get_with_token("/api/auth/me", &token))
        .await
        .unwrap();
    assert_eq!(authenticated.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(authenticated).await["error"], "access denied");
}

// --- Over the Wire ---

#[tokio::test]
async fn test_login_over_http() {
    let app = spawn_app().await;
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let address = format!("http://{}", listener.local_addr().unwrap());
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{address}/api/auth/login"))
        .json(&json!({ "username": "alice", "password": "secret" }))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
    let token = response.json::<Value>().await.unwrap()["token"]
        .as_str()
        .unwrap()
        .to_string();

    let me = client
        .get(format!("{address}/api/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("req fail");
    assert!(me.status().is_success());
}
