use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Persisted Records ---

/// User
///
/// A row of the `tb_users` table. `id` is assigned by the store on insert and never
/// reused; `password` always holds a bcrypt hash.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    // Hash only. Kept out of every serialized representation.
    #[serde(skip_serializing)]
    pub password: String,
}

impl User {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password_hash(&self) -> &str {
        &self.password
    }
}

/// Insert payload for `tb_users`. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
}

// --- Request Payloads ---

/// LoginRequest
///
/// Body of `POST /api/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    #[schema(example = "admin")]
    pub username: String,
    #[schema(example = "secret")]
    pub password: String,
}

// --- Responses ---

/// LoginResponse
///
/// The bearer token the client sends back in `Authorization` on every later request.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    /// Always `Bearer`.
    pub token_type: String,
    /// Token lifetime in seconds.
    pub expires_in: i64,
}

/// UserProfile
///
/// Public view of the authenticated user (`GET /api/auth/me`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq, Eq)]
#[ts(export)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}
