// src/auth.rs
use crate::error::ApiError;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::{Filter, Rejection};

pub const TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub iat: usize,
    pub exp: usize,
}

/// Identity decoded from a valid bearer token.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

/// Password hashing and token signing around a shared secret.
pub struct Credentials {
    secret: String,
    bcrypt_cost: u32,
}

impl Credentials {
    pub fn new(secret: impl Into<String>, bcrypt_cost: u32) -> Self {
        Credentials {
            secret: secret.into(),
            bcrypt_cost,
        }
    }

    pub fn create_token(&self, user_id: &str, email: &str) -> Result<String, ApiError> {
        self.create_token_at(user_id, email, Utc::now())
    }

    pub fn create_token_at(
        &self,
        user_id: &str,
        email: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, ApiError> {
        let expires_at = issued_at + Duration::hours(TOKEN_LIFETIME_HOURS);
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            iat: issued_at.timestamp().max(0) as usize,
            exp: expires_at.timestamp().max(0) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ApiError::internal("Could not issue token", e))
    }

    pub fn validate_token(&self, token: &str) -> Result<AuthUser, ApiError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => ApiError::unauthorized("Token expired"),
            _ => {
                warn!("Rejected bearer token: {}", e);
                ApiError::unauthorized("Invalid token")
            }
        })?;
        Ok(AuthUser {
            id: data.claims.sub,
            email: data.claims.email,
        })
    }

    /// Salted bcrypt hash, computed on the blocking pool.
    pub async fn hash_password(&self, password: &str) -> Result<String, ApiError> {
        let password = password.to_string();
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| ApiError::internal("Could not hash password", e))?
            .map_err(|e| ApiError::internal("Could not hash password", e))
    }

    pub async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, ApiError> {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| ApiError::internal("Could not verify password", e))?
            .map_err(|e| ApiError::internal("Could not verify password", e))
    }
}

fn bearer_token(header: Option<&str>) -> Result<&str, ApiError> {
    let header = header.ok_or_else(|| ApiError::unauthorized("No token provided"))?;
    match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(ApiError::unauthorized("Invalid token")),
    }
}

/// Extracts the caller's identity from `Authorization: Bearer <token>`.
pub fn with_auth(
    credentials: Arc<Credentials>,
) -> impl Filter<Extract = (AuthUser,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let credentials = credentials.clone();
        async move {
            bearer_token(header.as_deref())
                .and_then(|token| credentials.validate_token(token))
                .map_err(warp::reject::custom)
        }
    })
}
