/// Input validation for query routes and bot commands
use thiserror::Error;

pub const MAX_SERVER_NAME_LEN: usize = 100;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Server name cannot be empty")]
    ServerNameEmpty,

    #[error("Server name too long (max 100 characters, got {0})")]
    ServerNameTooLong(usize),

    #[error("Server name contains control characters")]
    ServerNameControlChars,
}

/// Validates a server name used as a lookup key
///
/// Rules:
/// - Cannot be empty
/// - Max 100 characters
/// - No control characters
pub fn validate_server_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::ServerNameEmpty);
    }

    let len = name.chars().count();
    if len > MAX_SERVER_NAME_LEN {
        return Err(ValidationError::ServerNameTooLong(len));
    }

    if name.chars().any(char::is_control) {
        return Err(ValidationError::ServerNameControlChars);
    }

    Ok(())
}
