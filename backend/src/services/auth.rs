//! Authentication service for login and token management

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bcrypt::verify;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use shared::Role;

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub branch_id: Option<String>,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

/// Authentication tokens
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// User info from database
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    branch_id: Option<Uuid>,
    password_hash: String,
    role: Role,
    is_active: bool,
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt.secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
            refresh_token_expiry: config.jwt.refresh_token_expiry,
        }
    }

    /// Authenticate a staff member with username and password
    pub async fn login(&self, username: &str, password: &str) -> AppResult<AuthTokens> {
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, branch_id, password_hash, role, is_active
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AppError::Unauthorized("Account is disabled".to_string()));
        }

        let valid = verify(password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;
        if !valid {
            return Err(AppError::InvalidCredentials);
        }

        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(&self.db)
            .await?;

        let tokens = self.generate_tokens(user.id, user.branch_id, user.role)?;
        self.store_refresh_token(user.id, &tokens.refresh_token).await?;

        tracing::info!(user_id = %user.id, role = %user.role, "User logged in");
        Ok(tokens)
    }

    /// Exchange a refresh token for a new token pair. The old refresh token
    /// is revoked.
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthTokens> {
        let token_hash = Self::hash_token(refresh_token);

        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.branch_id, u.password_hash, u.role, u.is_active
            FROM refresh_tokens rt
            JOIN users u ON u.id = rt.user_id
            WHERE rt.token_hash = $1
              AND rt.expires_at > NOW()
              AND rt.revoked_at IS NULL
              AND u.is_active = true
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired refresh token".to_string()))?;

        sqlx::query("UPDATE refresh_tokens SET revoked_at = NOW() WHERE token_hash = $1")
            .bind(&token_hash)
            .execute(&self.db)
            .await?;

        let tokens = self.generate_tokens(user.id, user.branch_id, user.role)?;
        self.store_refresh_token(user.id, &tokens.refresh_token).await?;

        Ok(tokens)
    }

    /// Decode an access token into the authenticated user
    pub fn authenticate(token: &str, secret: &str) -> AppResult<AuthUser> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::InvalidToken,
        })?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)?;
        let branch_id = claims
            .branch_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|_| AppError::InvalidToken)?;

        Ok(AuthUser {
            user_id,
            branch_id,
            role: claims.role,
        })
    }

    /// Generate access and refresh tokens
    fn generate_tokens(
        &self,
        user_id: Uuid,
        branch_id: Option<Uuid>,
        role: Role,
    ) -> AppResult<AuthTokens> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.access_token_expiry);

        let access_claims = Claims {
            sub: user_id.to_string(),
            branch_id: branch_id.map(|id| id.to_string()),
            role,
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &access_claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        // Refresh token (simple random token)
        let refresh_token = Uuid::new_v4().to_string();

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
        })
    }

    /// Store refresh token in database
    async fn store_refresh_token(&self, user_id: Uuid, token: &str) -> AppResult<()> {
        let token_hash = Self::hash_token(token);
        let expires_at = Utc::now() + Duration::seconds(self.refresh_token_expiry);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(&token_hash)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Hash a token for storage
    fn hash_token(token: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
    }
}
