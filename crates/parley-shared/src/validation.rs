//! Input checks applied before any request is issued.

use crate::constants::{CHANNEL_NAME_MAX_LEN, CHANNEL_NAME_MIN_LEN};
use crate::error::ValidationError;

/// Validate a channel name against length bounds and the names already in use.
///
/// Returns the trimmed name on success. Comparison is case-sensitive.
pub fn validate_channel_name<'a, I>(name: &str, existing: I) -> Result<String, ValidationError>
where
    I: IntoIterator<Item = &'a str>,
{
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }

    let len = trimmed.chars().count();
    if len < CHANNEL_NAME_MIN_LEN {
        return Err(ValidationError::TooShort {
            min: CHANNEL_NAME_MIN_LEN,
        });
    }
    if len > CHANNEL_NAME_MAX_LEN {
        return Err(ValidationError::TooLong {
            max: CHANNEL_NAME_MAX_LEN,
        });
    }

    if existing.into_iter().any(|n| n == trimmed) {
        return Err(ValidationError::Duplicate);
    }

    Ok(trimmed.to_string())
}

/// A message body must contain something other than whitespace.
pub fn validate_message_body(body: &str) -> Result<String, ValidationError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_and_trims() {
        assert_eq!(validate_channel_name("  memes ", ["general"]).unwrap(), "memes");
    }

    #[test]
    fn rejects_bounds() {
        assert_eq!(validate_channel_name("   ", []), Err(ValidationError::Empty));
        assert_eq!(
            validate_channel_name("ab", []),
            Err(ValidationError::TooShort { min: 3 })
        );
        assert_eq!(
            validate_channel_name(&"x".repeat(21), []),
            Err(ValidationError::TooLong { max: 20 })
        );
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        assert!(validate_channel_name("канал", []).is_ok());
    }

    #[test]
    fn rejects_duplicates() {
        assert_eq!(
            validate_channel_name("general", ["general", "random"]),
            Err(ValidationError::Duplicate)
        );
        assert!(validate_channel_name("General", ["general"]).is_ok());
    }

    #[test]
    fn message_body_must_not_be_blank() {
        assert_eq!(validate_message_body(" \n"), Err(ValidationError::Empty));
        assert_eq!(validate_message_body(" hi ").unwrap(), "hi");
    }
}
