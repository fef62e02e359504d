//! Input checks that run before any store access.

use crate::error::{CommissionError, CommissionResult};

pub const MAX_ID_LEN: usize = 64;

/// Ids are 1..=64 chars of ASCII letters, digits, `-`, `_`, `.` or `:`.
pub fn require_id(field: &str, value: &str) -> CommissionResult<()> {
    if value.is_empty() {
        return Err(CommissionError::validation(format!("{field} is required")));
    }
    if value.len() > MAX_ID_LEN {
        return Err(CommissionError::validation(format!(
            "{field} exceeds {MAX_ID_LEN} characters"
        )));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')))
    {
        return Err(CommissionError::validation(format!(
            "{field} contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_uuid_ids() {
        assert!(require_id("promoter_id", "P-001").is_ok());
        assert!(require_id("customer_id", "7f0c2f7e-8d5e-4a57-9b59-0f7f6a1e2b3c").is_ok());
    }

    #[test]
    fn rejects_blank_long_and_odd_ids() {
        assert!(require_id("promoter_id", "").is_err());
        assert!(require_id("promoter_id", " P1").is_err());
        assert!(require_id("promoter_id", "a;drop").is_err());
        assert!(require_id("promoter_id", &"x".repeat(MAX_ID_LEN + 1)).is_err());
    }

    #[test]
    fn admin_wallet_key_is_not_a_valid_id() {
        assert!(require_id("promoter_id", crate::types::ADMIN_WALLET_KEY).is_err());
        assert!(require_id("promoter_id", "__admin__").is_ok());
    }
}
