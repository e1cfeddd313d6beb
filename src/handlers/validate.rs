//! Input validation shared by the procedure handlers.

use rust_decimal::Decimal;

use crate::error::{AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 8;

/// `NUMERIC(14, 2)`: two fractional digits, twelve integer digits.
pub const AMOUNT_SCALE: u32 = 2;
const AMOUNT_INTEGER_DIGITS: u32 = 12;

pub trait Validate {
    fn validate(&self) -> AppResult<()>;
}

pub fn required(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::bad_request(format!("{} is required", field)));
    }
    Ok(())
}

pub fn email(value: &str) -> AppResult<()> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        return Err(AppError::bad_request("Invalid email address"));
    }
    Ok(())
}

pub fn password(value: &str) -> AppResult<()> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub fn amount(value: Decimal) -> AppResult<()> {
    if value < Decimal::ONE {
        return Err(AppError::bad_request("Amount must be at least 1"));
    }
    if value.normalize().scale() > AMOUNT_SCALE {
        return Err(AppError::bad_request(format!(
            "Amount may have at most {} decimal places",
            AMOUNT_SCALE
        )));
    }
    if value >= Decimal::from(10i64.pow(AMOUNT_INTEGER_DIGITS)) {
        return Err(AppError::bad_request("Amount is too large"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails() {
        assert!(email("hanako@example.com").is_ok());
        assert!(email("hanako@example").is_err());
        assert!(email("@example.com").is_err());
        assert!(email("hanako@@example.com").is_err());
        assert!(email("hana ko@example.com").is_err());
        assert!(email("").is_err());
    }

    #[test]
    fn passwords_need_eight_characters() {
        assert!(password("1234567").is_err());
        assert!(password("12345678").is_ok());
    }

    #[test]
    fn amounts_start_at_one() {
        assert!(amount(Decimal::new(99, 2)).is_err());
        assert!(amount(Decimal::ZERO).is_err());
        assert!(amount(Decimal::ONE).is_ok());
        assert!(amount(Decimal::new(123456, 2)).is_ok());
    }

    #[test]
    fn amounts_fit_the_stored_precision() {
        assert!(amount(Decimal::new(1005, 3)).is_err());
        assert!(amount(Decimal::new(1500, 3)).is_ok());
        assert!(amount(Decimal::new(99_999_999_999_999, 2)).is_ok());
        assert!(amount(Decimal::new(1_000_000_000_000, 0)).is_err());

        let err = amount(Decimal::new(1_000_000_000_000, 0)).unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");
    }

    #[test]
    fn blank_text_is_missing() {
        assert!(required("title", "  ").is_err());
        assert!(required("title", "Taxi").is_ok());
    }
}
