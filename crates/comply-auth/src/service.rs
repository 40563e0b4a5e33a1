//! Password login.

use comply_core::context::{AccessContext, AuthMode};
use comply_core::error::{ComplyError, ComplyResult};
use comply_core::models::user::normalize_email;
use comply_core::repository::UserRepository;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::password;
use crate::token;

#[derive(Debug)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Successful login result.
#[derive(Debug)]
pub struct LoginOutput {
    /// Signed EdDSA session token.
    pub access_token: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
    /// The context the token resolves to right now.
    pub context: AccessContext,
}

/// Authentication service.
///
/// Generic over the user repository so that the auth layer has no
/// dependency on the database crate.
pub struct AuthService<U: UserRepository> {
    users: U,
    config: AuthConfig,
}

impl<U: UserRepository> AuthService<U> {
    pub fn new(users: U, config: AuthConfig) -> Self {
        Self { users, config }
    }

    /// Authenticate with e-mail and password and issue a session token.
    ///
    /// Unknown e-mail and wrong password fail identically.
    pub async fn login(&self, input: LoginInput) -> ComplyResult<LoginOutput> {
        let email = normalize_email(&input.email);
        let user = match self.users.get_by_email(&email).await {
            Ok(user) => user,
            Err(ComplyError::NotFound { .. }) => return Err(AuthError::InvalidCredentials.into()),
            Err(e) => return Err(e),
        };

        let valid = password::verify_password(
            &input.password,
            &user.password_hash,
            self.config.pepper.as_deref(),
        )?;
        if !valid {
            warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }
        if !user.can_sign_in() {
            warn!(
                user_id = %user.id,
                status = user.status.as_str(),
                "Login refused: account not active"
            );
            return Err(AuthError::AccountInactive.into());
        }

        let access_token = token::issue_session_token(&user, &self.config)?;
        info!(user_id = %user.id, role = %user.role, "User logged in");

        Ok(LoginOutput {
            access_token,
            expires_in: self.config.session_lifetime_secs,
            context: AccessContext::for_user(&user, AuthMode::Session),
        })
    }
}
