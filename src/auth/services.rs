use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::{claims::Claims, dto::AuthResponse, jwt::JwtKeys};
use crate::{
    error::AppError,
    users::{repo_types::User, services::UserService},
};

/// Same message for unknown email and wrong password.
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const INVALID_TOKEN: &str = "Invalid or expired token";

/// Registration, login and token checks on top of [`UserService`].
#[derive(Clone)]
pub struct AuthService {
    users: UserService,
    keys: Arc<JwtKeys>,
}

impl AuthService {
    pub fn new(users: UserService, keys: JwtKeys) -> Self {
        Self {
            users,
            keys: Arc::new(keys),
        }
    }

    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Result<AuthResponse, AppError> {
        let user = self
            .users
            .create(email, password, first_name, last_name)
            .await?;
        info!(user_id = user.id, "user registered");
        self.issue(user)
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AppError> {
        let Some(user) = self.users.find_by_email(email).await? else {
            warn!("login unknown email");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
        };

        if !self.users.validate_password(password, &user.password_hash).await {
            warn!(user_id = user.id, "login invalid password");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
        }

        info!(user_id = user.id, "user logged in");
        self.issue(user)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        self.keys.verify(token).map_err(|e| {
            warn!(error = %e, "token rejected");
            AppError::Unauthorized(INVALID_TOKEN.into())
        })
    }

    pub async fn get_current_user(&self, user_id: i64) -> Result<User, AppError> {
        self.users.find_by_id(user_id).await
    }

    fn issue(&self, user: User) -> Result<AuthResponse, AppError> {
        let access_token = self.keys.sign(user.id, &user.email)?;
        Ok(AuthResponse {
            access_token,
            user: user.into(),
        })
    }
}
