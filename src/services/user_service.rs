use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::auth::{hash_password, verify_password, AuthError, AuthHandler};
use crate::database::models::{FieldErrors, LoginRequest, RegisterUser, User, UserProfile};
use crate::database::{DatabaseError, DocumentStore, Repository, WriteRule};

#[derive(Debug, Error)]
pub enum UserError {
    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("User {0} not found")]
    NotFound(Uuid),

    #[error("Invalid registration: {0:?}")]
    Invalid(FieldErrors),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Successful login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    /// Seconds until the token expires
    pub expires_in: i64,
}

pub struct UserService {
    users: Repository<User>,
    auth: Arc<AuthHandler>,
}

impl UserService {
    pub fn new(store: Arc<dyn DocumentStore>, auth: Arc<AuthHandler>) -> Self {
        Self {
            users: Repository::new(store),
            auth,
        }
    }

    pub async fn register(&self, registration: RegisterUser) -> Result<UserProfile, UserError> {
        registration.validate().map_err(UserError::Invalid)?;

        let username = registration.username.trim().to_string();
        if self.users.find_one_by("username", &username).await?.is_some() {
            return Err(UserError::UsernameTaken(username));
        }

        let password_hash = hash_blocking(registration.password).await?;
        let user = User {
            id: None,
            username: username.clone(),
            email: registration.email.trim().to_string(),
            password_hash,
            created_at: Utc::now(),
        };

        // The unique index catches a concurrent registration that passed the lookup
        let user = match self.users.insert(user, WriteRule::DoNothing).await {
            Ok(user) => user,
            Err(DatabaseError::Conflict(_)) => return Err(UserError::UsernameTaken(username)),
            Err(e) => return Err(e.into()),
        };

        info!("Registered user {}", user.username);
        Ok(user.into())
    }

    pub async fn login(&self, request: LoginRequest) -> Result<TokenResponse, UserError> {
        let user = self
            .users
            .find_one_by("username", request.username.trim())
            .await?
            .ok_or(UserError::InvalidCredentials)?;
        let user_id = user.id.ok_or(UserError::InvalidCredentials)?;

        if !verify_blocking(request.password, user.password_hash).await? {
            return Err(UserError::InvalidCredentials);
        }

        let token = self.auth.issue_token(user_id, &user.username)?;
        info!("User {} logged in", user.username);
        Ok(TokenResponse {
            token,
            token_type: "bearer".to_string(),
            expires_in: self.auth.expires_in(),
        })
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<UserProfile, UserError> {
        self.users
            .get(user_id)
            .await?
            .map(UserProfile::from)
            .ok_or(UserError::NotFound(user_id))
    }
}

// Argon2 is deliberately slow; keep it off the async workers
async fn hash_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?
}
