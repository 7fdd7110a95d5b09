//! Field checks for customer-submitted bookings.

use crate::error::{BookingError, Result};
use crate::types::NewBooking;

/// Longest accepted address, in characters.
pub const MAX_ADDRESS_LEN: usize = 255;
/// Longest accepted phone number, in characters.
pub const MAX_PHONE_LEN: usize = 32;

/// Validate a booking before it is inserted.
///
/// # Errors
///
/// Returns [`BookingError::Validation`] naming the first offending field.
pub fn validate_new_booking(new: &NewBooking) -> Result<()> {
    validate_address(&new.address)?;
    validate_phone(&new.phone)?;
    if new.quoted_amount.is_zero() {
        return Err(BookingError::validation(
            "quoted_amount",
            "must be greater than zero",
        ));
    }
    Ok(())
}

fn validate_address(address: &str) -> Result<()> {
    let address = address.trim();
    if address.is_empty() {
        return Err(BookingError::validation("address", "must not be empty"));
    }
    if address.chars().count() > MAX_ADDRESS_LEN {
        return Err(BookingError::validation(
            "address",
            format!("must be at most {MAX_ADDRESS_LEN} characters"),
        ));
    }
    Ok(())
}

fn validate_phone(phone: &str) -> Result<()> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err(BookingError::validation("phone", "must not be empty"));
    }
    if phone.chars().count() > MAX_PHONE_LEN {
        return Err(BookingError::validation(
            "phone",
            format!("must be at most {MAX_PHONE_LEN} characters"),
        ));
    }
    let allowed = |c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.');
    if !phone.chars().all(allowed) || !phone.chars().any(|c| c.is_ascii_digit()) {
        return Err(BookingError::validation(
            "phone",
            "may contain only digits, spaces and + - ( ) .",
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use crate::types::{BookingKind, CategoryId, Money, Schedule, UserId};
    use chrono::{NaiveDate, NaiveTime};

    fn request() -> NewBooking {
        NewBooking {
            kind: BookingKind::Service,
            customer_id: UserId::new(1),
            category_id: CategoryId::new(1),
            schedule: Schedule::new(
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            ),
            address: "12 Elm Street".to_string(),
            phone: "+1 (555) 010-0200".to_string(),
            quoted_amount: Money::from_cents(9_900),
        }
    }

    #[test]
    fn accepts_well_formed_request() {
        assert!(validate_new_booking(&request()).is_ok());
    }

    #[test]
    fn rejects_missing_fields() {
        let mut blank_address = request();
        blank_address.address = "  ".to_string();
        assert_eq!(
            validate_new_booking(&blank_address),
            Err(BookingError::validation("address", "must not be empty"))
        );

        let mut blank_phone = request();
        blank_phone.phone = String::new();
        assert!(matches!(
            validate_new_booking(&blank_phone),
            Err(BookingError::Validation { field: "phone", .. })
        ));
    }

    #[test]
    fn rejects_zero_quote() {
        let mut free = request();
        free.quoted_amount = Money::from_cents(0);
        assert!(matches!(
            validate_new_booking(&free),
            Err(BookingError::Validation { field: "quoted_amount", .. })
        ));
    }

    #[test]
    fn rejects_garbage_phone() {
        let mut bad = request();
        bad.phone = "call me maybe".to_string();
        assert!(validate_new_booking(&bad).is_err());
    }
}
