use std::sync::Arc;

use argon2::{self, Config as ArgonConfig};
use chrono::Utc;
use rand::Rng;

use crate::error::{AppError, AppResult, StoreError};
use crate::models::{SessionIdentity, SignInInput, SignUpInput, User};
use crate::session::SessionContext;
use crate::store::UserStore;

pub const USER_ID_SEQUENCE: &str = "user_id";

/// Signup, login and logout.
#[derive(Clone)]
pub struct Identity {
    users: Arc<dyn UserStore>,
}

impl Identity {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Identity { users }
    }

    /// Registers a user and returns the id drawn from the `user_id` sequence.
    ///
    /// A sequence value consumed by a signup that later fails is not reused.
    pub async fn signup(&self, input: SignUpInput) -> AppResult<i64> {
        let input = input.validate().map_err(AppError::InvalidInput)?;

        if self.users.find_by_email(&input.email).await?.is_some() {
            return Err(AppError::DuplicateEmail);
        }

        let user_id = self.users.next_sequence(USER_ID_SEQUENCE).await?;
        let user = User {
            user_id,
            username: input.username,
            email: input.email,
            password_hash: hash_password(&input.password)?,
            created_at: Utc::now(),
        };

        match self.users.insert(&user).await {
            Ok(()) => {
                log::info!("registered user {} ({})", user.user_id, user.email);
                Ok(user.user_id)
            }
            // Lost a race with a concurrent signup for the same email.
            Err(StoreError::Duplicate(_)) => Err(AppError::DuplicateEmail),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn login(&self, input: SignInInput) -> AppResult<SessionIdentity> {
        let email = input.email.trim().to_lowercase();
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !argon2::verify_encoded(&user.password_hash, input.password.as_bytes()).unwrap_or(false) {
            log::debug!("password mismatch for {}", email);
            return Err(AppError::InvalidCredentials);
        }

        Ok(SessionIdentity {
            user_id: user.user_id,
            username: user.username,
            email: user.email,
        })
    }

    /// Drops the identity and any guest state. Safe to call repeatedly.
    pub fn logout(&self, context: &mut SessionContext) {
        *context = SessionContext::default();
    }
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt: [u8; 16] = rand::thread_rng().gen();
    let config = ArgonConfig::default();
    argon2::hash_encoded(password.as_bytes(), &salt, &config).map_err(|e| AppError::Hashing(e.to_string()))
}
