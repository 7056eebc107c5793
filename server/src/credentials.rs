//! Username and password rules, and password hashing

use sha2::{Digest, Sha256};
use thiserror::Error;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 16;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    #[error("username must be non-empty and contain no whitespace")]
    InvalidUsername,
    #[error(
        "password must be 8 to 16 characters with a lowercase letter, an uppercase letter \
         and a digit, and no whitespace"
    )]
    InvalidPassword,
}

pub fn validate_username(username: &str) -> Result<(), CredentialError> {
    if username.is_empty() || username.chars().any(char::is_whitespace) {
        return Err(CredentialError::InvalidUsername);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), CredentialError> {
    let length = password.chars().count();
    let acceptable = (MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&length)
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && !password.chars().any(char::is_whitespace);

    if acceptable {
        Ok(())
    } else {
        Err(CredentialError::InvalidPassword)
    }
}

/// SHA-256 of the password, as lowercase hex
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    hash_password(password) == hash
}
