//! User service: registration, login and profile lookup.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use courier_common::error::AppError;
use courier_common::types::User;

use crate::password::{hash_password, verify_password};
use crate::token::encode_jwt;

/// Service layer for user accounts.
pub struct UserService;

/// Parameters for registering a new user.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterParams {
    pub username: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

/// Public view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            phone: user.phone,
        }
    }
}

/// Issued token plus the user it belongs to.
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub token: String,
    pub user: UserProfile,
}

const USER_EXISTS: &str = "User already exists";
const INVALID_CREDENTIALS: &str = "Invalid credentials";

impl UserService {
    /// Create a user with an Argon2-hashed password.
    pub async fn register(pool: &PgPool, params: &RegisterParams) -> Result<UserProfile, AppError> {
        let existing: Option<(i32,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
            .bind(&params.email)
            .fetch_optional(pool)
            .await?;
        if existing.is_some() {
            return Err(AppError::Validation(USER_EXISTS.to_string()));
        }

        let password_hash = hash_password(&params.password)?;
        let phone = params
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        let user: User = sqlx::query_as(
            r#"
            INSERT INTO users (username, email, password_hash, phone)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&params.username)
        .bind(&params.email)
        .bind(&password_hash)
        .bind(phone)
        .fetch_one(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Validation(USER_EXISTS.to_string())
            }
            other => AppError::Database(other),
        })?;

        tracing::info!(user_id = user.id, username = %user.username, "User registered");

        Ok(user.into())
    }

    /// Verify credentials and issue a JWT.
    pub async fn login(
        pool: &PgPool,
        email: &str,
        password: &str,
        jwt_secret: &str,
        jwt_expiry_hours: u64,
    ) -> Result<LoginSession, AppError> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(pool)
            .await?;

        let user = match user {
            Some(user) if verify_password(password, &user.password_hash) => user,
            _ => {
                tracing::debug!(email = %email, "Login rejected");
                return Err(AppError::Auth(INVALID_CREDENTIALS.to_string()));
            }
        };

        let token = encode_jwt(&user, jwt_secret, jwt_expiry_hours)?;

        tracing::info!(user_id = user.id, "User logged in");

        Ok(LoginSession {
            token,
            user: user.into(),
        })
    }

    /// Get a single user by ID.
    pub async fn get_user(pool: &PgPool, user_id: i32) -> Result<UserProfile, AppError> {
        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        Ok(user.into())
    }
}
