//! Canned parties and booking requests.

use chrono::{NaiveDate, NaiveTime};
use homeservice_core::{BookingKind, CategoryId, Money, NewBooking, Schedule, UserId};

/// Customer who owns the fixture bookings.
pub const CUSTOMER: UserId = UserId(100);
/// A second customer, for scoping tests.
pub const OTHER_CUSTOMER: UserId = UserId(101);
/// Platform admin.
pub const ADMIN: UserId = UserId(1);
/// Provider the fixtures assign.
pub const PROVIDER: UserId = UserId(200);
/// A second provider, for races and scoping tests.
pub const OTHER_PROVIDER: UserId = UserId(201);

/// Requested slot used by every fixture: 2025-02-03 09:30.
#[must_use]
pub fn schedule() -> Schedule {
    Schedule::new(
        NaiveDate::from_ymd_opt(2025, 2, 3).unwrap_or_default(),
        NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
    )
}

/// A valid booking request of the given kind for [`CUSTOMER`].
#[must_use]
pub fn request(kind: BookingKind) -> NewBooking {
    request_for(kind, CUSTOMER)
}

/// A valid booking request of the given kind for any customer.
#[must_use]
pub fn request_for(kind: BookingKind, customer_id: UserId) -> NewBooking {
    NewBooking {
        kind,
        customer_id,
        category_id: CategoryId::new(10),
        schedule: schedule(),
        address: "221B Baker Street".to_string(),
        phone: "+44 20 7946 0000".to_string(),
        quoted_amount: Money::from_cents(12_000),
    }
}

/// A valid service booking request for [`CUSTOMER`].
#[must_use]
pub fn service_request() -> NewBooking {
    request(BookingKind::Service)
}

/// A valid subscription booking request for [`CUSTOMER`].
#[must_use]
pub fn subscription_request() -> NewBooking {
    request(BookingKind::Subscription)
}
