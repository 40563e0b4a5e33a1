//! Inbound credentials → [`AccessContext`].
//!
//! A bearer session token wins whenever one is present; a token that fails
//! validation is an error and never falls through to the development
//! bypass. Role, institution and regions always come from the stored
//! account, not from the token.

use comply_core::context::{AccessContext, AuthMode};
use comply_core::error::{ComplyError, ComplyResult};
use comply_core::models::user::User;
use comply_core::repository::UserRepository;
use tracing::debug;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::token;

pub const AUTHORIZATION_HEADER: &str = "authorization";
pub const DEV_BYPASS_HEADER: &str = "x-dev-bypass-token";

/// Credentials as they arrive with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundCredentials {
    pub bearer_token: Option<String>,
    pub dev_bypass_token: Option<String>,
}

impl InboundCredentials {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
            dev_bypass_token: None,
        }
    }

    /// Extract credentials from header pairs. Names are matched
    /// case-insensitively. An `Authorization` value without the `Bearer`
    /// scheme is kept as-is so that it fails validation instead of being
    /// ignored.
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut creds = Self::default();
        for (name, value) in headers {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            if name.eq_ignore_ascii_case(AUTHORIZATION_HEADER) {
                let token = match value.split_once(' ') {
                    Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
                    _ => value,
                };
                creds.bearer_token = Some(token.to_string());
            } else if name.eq_ignore_ascii_case(DEV_BYPASS_HEADER) {
                creds.dev_bypass_token = Some(value.to_string());
            }
        }
        creds
    }
}

/// Resolves credentials against the account store.
///
/// Generic over the user repository so that this crate has no dependency
/// on the database crate.
#[derive(Clone)]
pub struct AccessContextResolver<U: UserRepository> {
    users: U,
    config: AuthConfig,
}

impl<U: UserRepository> AccessContextResolver<U> {
    pub fn new(users: U, config: AuthConfig) -> Self {
        Self { users, config }
    }

    pub async fn resolve(&self, creds: &InboundCredentials) -> ComplyResult<AccessContext> {
        if let Some(token) = &creds.bearer_token {
            return self.resolve_session(token).await;
        }
        if let Some(token) = &creds.dev_bypass_token {
            return self.resolve_dev_bypass(token).await;
        }
        Err(AuthError::MissingCredentials.into())
    }

    async fn resolve_session(&self, raw: &str) -> ComplyResult<AccessContext> {
        let claims = token::decode_session_token(raw, &self.config)?;
        let user = self.active_user(self.users.get_by_id(claims.user_id()?)).await?;
        if claims.role != user.role {
            debug!(user_id = %user.id, token_role = %claims.role, "Stale session token role");
            return Err(AuthError::RoleMismatch.into());
        }
        Ok(AccessContext::for_user(&user, AuthMode::Session))
    }

    #[cfg(feature = "dev-bypass")]
    async fn resolve_dev_bypass(&self, raw: &str) -> ComplyResult<AccessContext> {
        use comply_core::models::user::normalize_email;
        use sha2::{Digest, Sha256};

        if !self.config.dev_bypass_enabled() {
            return Err(AuthError::InvalidCredentials.into());
        }
        let expected = self
            .config
            .dev_bypass
            .token_sha256
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let supplied = hex::encode(Sha256::digest(raw.as_bytes()));
        if !digests_match(&supplied, &expected) {
            return Err(AuthError::InvalidCredentials.into());
        }

        let email = self.config.dev_bypass.user_email.as_deref().ok_or_else(|| {
            ComplyError::Internal("dev bypass is enabled without a user_email".into())
        })?;
        let user = self
            .active_user(self.users.get_by_email(&normalize_email(email)))
            .await?;
        tracing::warn!(
            user_id = %user.id,
            environment = %self.config.environment,
            "Request authenticated through the development bypass"
        );
        Ok(AccessContext::for_user(&user, AuthMode::DevBypass))
    }

    #[cfg(not(feature = "dev-bypass"))]
    async fn resolve_dev_bypass(&self, _raw: &str) -> ComplyResult<AccessContext> {
        debug!("Development bypass header ignored in this build");
        Err(AuthError::InvalidCredentials.into())
    }

    async fn active_user(
        &self,
        lookup: impl Future<Output = ComplyResult<User>>,
    ) -> ComplyResult<User> {
        let user = match lookup.await {
            Err(ComplyError::NotFound { .. }) => return Err(AuthError::InvalidCredentials.into()),
            other => other?,
        };
        if !user.can_sign_in() {
            return Err(AuthError::AccountInactive.into());
        }
        Ok(user)
    }
}

/// Compare two hex digests without short-circuiting on the first mismatch.
#[cfg_attr(not(feature = "dev-bypass"), allow(dead_code))]
fn digests_match(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}
