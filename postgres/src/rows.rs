//! Table names and row mapping.
//!
//! Every string column is parsed strictly: a value outside the vocabulary is
//! reported as a persistence error rather than normalised.

use homeservice_core::notification::{Audience, Notification, Topic, Visibility, VisibilityFlags};
use homeservice_core::{
    Allocation, AllocationId, Booking, BookingError, BookingId, BookingKind, BookingRef,
    BookingStatus, CategoryId, Money, NotificationId, Result, Schedule, UserId,
};
use sqlx::Row;
use sqlx::postgres::PgRow;

/// Columns selected for a booking row.
pub(crate) const BOOKING_COLUMNS: &str = "id, customer_id, provider_id, category_id, \
     scheduled_date, scheduled_time, address, phone, quoted_amount, settled_amount, \
     status, cancellation_reason, created_at, updated_at";

/// Columns selected for a notification row, qualified by alias `n`.
pub(crate) const NOTIFICATION_COLUMNS: &str = "n.id, n.actor_id, n.provider_id, \
     n.service_booking_id, n.subscription_booking_id, n.description, \
     n.admin_visibility, n.provider_visibility, n.customer_visibility, n.created_at";

pub(crate) const fn booking_table(kind: BookingKind) -> &'static str {
    match kind {
        BookingKind::Service => "service_bookings",
        BookingKind::Subscription => "subscription_bookings",
    }
}

/// Foreign key column pointing at a booking of this kind.
pub(crate) const fn booking_column(kind: BookingKind) -> &'static str {
    match kind {
        BookingKind::Service => "service_booking_id",
        BookingKind::Subscription => "subscription_booking_id",
    }
}

pub(crate) const fn visibility_column(audience: Audience) -> &'static str {
    match audience {
        Audience::Admin => "admin_visibility",
        Audience::Provider => "provider_visibility",
        Audience::Customer => "customer_visibility",
    }
}

/// `(service_booking_id, subscription_booking_id)` bind values.
pub(crate) const fn booking_keys(booking: BookingRef) -> (Option<i64>, Option<i64>) {
    match booking.kind {
        BookingKind::Service => (Some(booking.id.get()), None),
        BookingKind::Subscription => (None, Some(booking.id.get())),
    }
}

pub(crate) fn db_error(context: &str) -> impl FnOnce(sqlx::Error) -> BookingError + '_ {
    move |e| BookingError::Persistence(format!("{context}: {e}"))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| BookingError::Persistence(format!("Failed to read column {name}: {e}")))
}

fn booking_ref(row: &PgRow) -> Result<BookingRef> {
    let service: Option<i64> = column(row, "service_booking_id")?;
    let subscription: Option<i64> = column(row, "subscription_booking_id")?;
    match (service, subscription) {
        (Some(id), None) => Ok(BookingRef::new(BookingKind::Service, BookingId::new(id))),
        (None, Some(id)) => Ok(BookingRef::new(BookingKind::Subscription, BookingId::new(id))),
        _ => Err(BookingError::Persistence(
            "row must reference exactly one booking".to_string(),
        )),
    }
}

pub(crate) fn row_to_booking(kind: BookingKind, row: &PgRow) -> Result<Booking> {
    let status: String = column(row, "status")?;
    let settled: Option<i64> = column(row, "settled_amount")?;

    Ok(Booking {
        id: BookingId::new(column(row, "id")?),
        kind,
        customer_id: UserId::new(column(row, "customer_id")?),
        provider_id: column::<Option<i64>>(row, "provider_id")?.map(UserId::new),
        category_id: CategoryId::new(column(row, "category_id")?),
        schedule: Schedule::new(
            column(row, "scheduled_date")?,
            column(row, "scheduled_time")?,
        ),
        address: column(row, "address")?,
        phone: column(row, "phone")?,
        quoted_amount: Money::from_db(column(row, "quoted_amount")?)?,
        settled_amount: settled.map(Money::from_db).transpose()?,
        status: BookingStatus::parse(&status)?,
        cancellation_reason: column(row, "cancellation_reason")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) fn row_to_allocation(row: &PgRow) -> Result<Allocation> {
    Ok(Allocation {
        id: AllocationId::new(column(row, "id")?),
        booking: booking_ref(row)?,
        provider_id: UserId::new(column(row, "provider_id")?),
        allocated_at: column(row, "allocated_at")?,
    })
}

pub(crate) fn row_to_notification(row: &PgRow) -> Result<Notification> {
    let booking = booking_ref(row)?;
    let description: String = column(row, "description")?;
    let topic = match Topic::from_description(&description) {
        Some((topic, kind)) if kind == booking.kind => topic,
        _ => {
            return Err(BookingError::Persistence(format!(
                "Unknown notification description for {booking}: {description}"
            )));
        }
    };
    let flag = |name: &str| -> Result<Visibility> {
        let value: String = column(row, name)?;
        Visibility::parse(&value)
    };

    Ok(Notification {
        id: NotificationId::new(column(row, "id")?),
        actor_id: UserId::new(column(row, "actor_id")?),
        provider_id: column::<Option<i64>>(row, "provider_id")?.map(UserId::new),
        booking,
        topic,
        description,
        visibility: VisibilityFlags {
            admin: flag("admin_visibility")?,
            provider: flag("provider_visibility")?,
            customer: flag("customer_visibility")?,
        },
        created_at: column(row, "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_keys_fill_exactly_one_column() {
        let service = BookingRef::new(BookingKind::Service, BookingId::new(7));
        let subscription = BookingRef::new(BookingKind::Subscription, BookingId::new(7));
        assert_eq!(booking_keys(service), (Some(7), None));
        assert_eq!(booking_keys(subscription), (None, Some(7)));
    }

    #[test]
    fn every_audience_has_its_own_column() {
        let columns: Vec<_> = Audience::ALL.into_iter().map(visibility_column).collect();
        assert_eq!(
            columns,
            vec!["admin_visibility", "provider_visibility", "customer_visibility"]
        );
    }
}
