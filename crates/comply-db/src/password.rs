//! Password hashing.
//!
//! Argon2id with OWASP-recommended parameters (memory: 19 MiB,
//! iterations: 2, parallelism: 1) and a random salt per hash. An optional
//! pepper is prepended before hashing; verification lives in
//! `comply-auth` and must use the same pepper.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use comply_core::error::{ComplyError, ComplyResult};

/// Shortest password accepted when an account is created.
pub const MIN_PASSWORD_LENGTH: usize = 12;

pub fn validate_password(password: &str) -> ComplyResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ComplyError::validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

pub fn hash_password(password: &str, pepper: Option<&str>) -> ComplyResult<String> {
    let params = argon2::Params::new(19456, 2, 1, None)
        .map_err(|e| ComplyError::Internal(format!("argon2 params error: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let peppered: String;
    let input = match pepper {
        Some(p) => {
            peppered = format!("{p}{password}");
            peppered.as_bytes()
        }
        None => password.as_bytes(),
    };

    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = argon2
        .hash_password(input, &salt)
        .map_err(|e| ComplyError::Internal(format!("password hash error: {e}")))?;

    Ok(hash.to_string())
}
