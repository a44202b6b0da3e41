// src/accounts.rs
use crate::auth::Credentials;
use crate::db::UserStore;
use crate::error::ApiError;
use crate::models::{present, AuthResponse, LoginRequest, Profile, RegisterRequest, User};
use crate::watchlist::Watchlist;
use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

pub struct AccountService {
    users: Arc<dyn UserStore>,
    credentials: Arc<Credentials>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, credentials: Arc<Credentials>) -> Self {
        AccountService { users, credentials }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, ApiError> {
        let (email, password, first_name, last_name) = match (
            present(&request.email),
            request.password.as_deref().filter(|p| !p.is_empty()),
            present(&request.first_name),
            present(&request.last_name),
        ) {
            (Some(email), Some(password), Some(first), Some(last)) => (email, password, first, last),
            _ => return Err(ApiError::validation("All fields are required")),
        };

        // Cheap early answer; the store's conditional insert is what
        // actually guarantees uniqueness.
        let existing = self
            .users
            .user_by_email(email)
            .await
            .map_err(|e| ApiError::internal("Could not register user", e))?;
        if existing.is_some() {
            return Err(ApiError::business_rule("User already exists"));
        }

        let now = Utc::now();
        let user = User {
            id: format!("USER#{}", Uuid::new_v4()),
            email: email.to_string(),
            password_hash: self.credentials.hash_password(password).await?,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            created_at: now,
            updated_at: now,
            watchlist: Watchlist::default(),
        };

        let created = self
            .users
            .create_user(&user)
            .await
            .map_err(|e| ApiError::internal("Could not register user", e))?;
        if !created {
            return Err(ApiError::business_rule("User already exists"));
        }
        info!("Registered user {}", user.id);

        let token = self.credentials.create_token(&user.id, &user.email)?;
        Ok(AuthResponse {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            token,
        })
    }

    /// Unknown email and wrong password fail identically.
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, ApiError> {
        let (email, password) = match (
            present(&request.email),
            request.password.as_deref().filter(|p| !p.is_empty()),
        ) {
            (Some(email), Some(password)) => (email, password),
            _ => return Err(ApiError::validation("Email and password are required")),
        };

        let user = self
            .users
            .user_by_email(email)
            .await
            .map_err(|e| ApiError::internal("Could not login", e))?;
        let user = match user {
            Some(user) => user,
            None => {
                warn!("Login attempt for unknown email");
                return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
            }
        };

        if !self
            .credentials
            .verify_password(password, &user.password_hash)
            .await?
        {
            warn!("Wrong password for {}", user.id);
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        }

        let token = self.credentials.create_token(&user.id, &user.email)?;
        info!("User {} logged in", user.id);
        Ok(AuthResponse {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            token,
        })
    }

    pub async fn profile(&self, user_id: &str) -> Result<Profile, ApiError> {
        match self.users.user_by_id(user_id).await {
            Ok(Some(user)) => Ok(Profile::from(&user)),
            Ok(None) => Err(ApiError::not_found("User not found")),
            Err(e) => Err(ApiError::internal("Could not retrieve profile", e)),
        }
    }
}
