/// Maximum length for a Postgres replication slot name in bytes.
pub const MAX_SLOT_NAME_LENGTH: usize = 63;

/// Error type for slot operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("Invalid slot name length: {0}")]
    InvalidSlotNameLength(String),

    #[error("Invalid slot name `{0}`, only lower case letters, digits and underscores are allowed")]
    InvalidSlotNameCharacters(String),
}

/// Checks that `slot_name` is accepted by Postgres as a replication slot name.
pub fn validate_slot_name(slot_name: &str) -> Result<(), SlotError> {
    if slot_name.is_empty() || slot_name.len() > MAX_SLOT_NAME_LENGTH {
        return Err(SlotError::InvalidSlotNameLength(slot_name.to_owned()));
    }

    let valid = slot_name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    if !valid {
        return Err(SlotError::InvalidSlotNameCharacters(slot_name.to_owned()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_slot_name_is_valid() {
        assert!(validate_slot_name("debezium").is_ok());
        assert!(validate_slot_name("cdc_slot_42").is_ok());
    }

    #[test]
    fn test_slot_name_length_validation() {
        let longest = "a".repeat(MAX_SLOT_NAME_LENGTH);
        assert!(validate_slot_name(&longest).is_ok());

        let too_long = "a".repeat(MAX_SLOT_NAME_LENGTH + 1);
        assert_eq!(
            validate_slot_name(&too_long),
            Err(SlotError::InvalidSlotNameLength(too_long.clone()))
        );
        assert!(validate_slot_name("").is_err());
    }

    #[test]
    fn test_slot_name_character_validation() {
        assert!(matches!(
            validate_slot_name("Debezium"),
            Err(SlotError::InvalidSlotNameCharacters(_))
        ));
        assert!(validate_slot_name("my-slot").is_err());
    }
}
