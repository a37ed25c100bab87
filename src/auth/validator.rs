//! Authentication validator
//!
//! Implements FTP user authentication against the `[server.users]` table,
//! plus optional anonymous access.

use crate::config::ServerConfig;
use crate::error::AuthError;

/// Names that log in anonymously when anonymous access is enabled.
pub const ANONYMOUS_USERS: [&str; 2] = ["anonymous", "ftp"];

const MAX_CREDENTIAL_LENGTH: usize = 64;

/// Performs basic input sanitation to check for malicious or malformed usernames/passwords.
fn is_valid_input(input: &str) -> bool {
    input.len() <= MAX_CREDENTIAL_LENGTH && !input.contains(['\r', '\n', '\0'])
}

pub fn is_anonymous(username: &str) -> bool {
    ANONYMOUS_USERS
        .iter()
        .any(|name| name.eq_ignore_ascii_case(username))
}

/// Validates that the given username may attempt to log in.
pub fn validate_user(username: &str, config: &ServerConfig) -> Result<(), AuthError> {
    if username.trim().is_empty() || !is_valid_input(username) {
        return Err(AuthError::MalformedInput("Invalid username format".into()));
    }

    if username.contains(['@', '#', ',', '%']) || username.starts_with(char::is_numeric) {
        return Err(AuthError::InvalidUsername(username.to_string()));
    }

    if is_anonymous(username) {
        return if config.allow_anonymous {
            Ok(())
        } else {
            Err(AuthError::UserNotFound(username.to_string()))
        };
    }

    if config.users.contains_key(username) {
        Ok(())
    } else {
        Err(AuthError::UserNotFound(username.to_string()))
    }
}

/// Validates that the provided password matches the stored password for the username.
///
/// Anonymous users may give any password (conventionally an e-mail address).
pub fn validate_password(
    username: &str,
    password: &str,
    config: &ServerConfig,
) -> Result<(), AuthError> {
    if !is_valid_input(password) {
        return Err(AuthError::MalformedInput("Invalid password format".into()));
    }

    if is_anonymous(username) && config.allow_anonymous {
        return Ok(());
    }

    match config.users.get(username) {
        Some(stored) if stored == password => Ok(()),
        Some(_) => Err(AuthError::InvalidPassword(username.to_string())),
        None => Err(AuthError::UserNotFound(username.to_string())),
    }
}
