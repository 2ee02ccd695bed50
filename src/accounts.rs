use crate::{
    error::{ApiError, AuthError},
    models::{NewUser, User},
    password::{BcryptVerifier, PasswordVerifier, hash_password, validate_password},
    repository::RepositoryState,
};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// register
///
/// Creates a user: the password is validated, hashed with bcrypt at `cost`, and only
/// the hash is handed to the store.
pub async fn register(
    repo: &RepositoryState,
    username: &str,
    password: &str,
    cost: u32,
) -> Result<User, ApiError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ApiError::BadRequest("Username must not be empty".to_string()));
    }
    validate_password(password).map_err(ApiError::BadRequest)?;

    let password_hash = hash_password(password, cost).await?;
    let user = repo
        .create_user(NewUser {
            username: username.to_string(),
            password_hash,
        })
        .await?;

    tracing::info!(user_id = user.id, username = %user.username, "user registered");
    Ok(user)
}

/// ensure_user
///
/// Returns the stored user named `username` (trimmed), registering it first when
/// absent. A concurrent registration of the same name is treated as present.
pub async fn ensure_user(
    repo: &RepositoryState,
    username: &str,
    password: &str,
    cost: u32,
) -> Result<User, ApiError> {
    let username = username.trim();
    if let Some(user) = repo.find_by_username(username).await? {
        tracing::info!(%username, "user already present");
        return Ok(user);
    }

    match register(repo, username, password, cost).await {
        Err(ApiError::Conflict(_)) => {
            tracing::info!(%username, "user created concurrently");
            repo.find_by_username(username)
                .await?
                .ok_or_else(|| ApiError::Internal(format!("user `{username}` vanished after conflict")))
        }
        other => other,
    }
}

/// Hashed once per `Authenticator` and compared against when the username is
/// unknown, so both failure paths cost one bcrypt verification.
const DUMMY_PASSWORD: &str = "essia-dummy-password-for-unknown-users";

/// Authenticator
///
/// Login check over the user store. An unknown username and a wrong password
/// produce the same error and take the same bcrypt work.
pub struct Authenticator {
    repo: RepositoryState,
    verifier: Arc<dyn PasswordVerifier>,
    cost: u32,
    dummy_hash: OnceCell<String>,
}

impl Authenticator {
    pub fn new(repo: RepositoryState, cost: u32) -> Self {
        Self::with_verifier(repo, cost, Arc::new(BcryptVerifier))
    }

    pub fn with_verifier(
        repo: RepositoryState,
        cost: u32,
        verifier: Arc<dyn PasswordVerifier>,
    ) -> Self {
        Self {
            repo,
            verifier,
            cost,
            dummy_hash: OnceCell::new(),
        }
    }

    /// Hash compared against for unknown usernames, computed at the configured cost
    /// on first use.
    pub async fn dummy_hash(&self) -> Result<&str, AuthError> {
        self.dummy_hash
            .get_or_try_init(|| hash_password(DUMMY_PASSWORD, self.cost))
            .await
            .map(String::as_str)
    }

    /// check_credentials
    ///
    /// Returns the user when `password` matches its stored hash.
    pub async fn check_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let Some(user) = self.repo.find_by_username(username).await? else {
            let dummy = self.dummy_hash().await?;
            self.verifier.verify(password, dummy).await?;
            return Err(AuthError::InvalidCredentials);
        };

        if self.verifier.verify(password, user.password_hash()).await? {
            Ok(user)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}
