//! Transaction-backed unit of work.

use crate::rows::{booking_column, booking_keys, booking_table, db_error};
use chrono::{DateTime, Utc};
use homeservice_core::notification::NewNotification;
use homeservice_core::store::UnitOfWork;
use homeservice_core::transition::{Guard, PriorState, ProviderUpdate, StatusChange};
use homeservice_core::{
    Allocation, AllocationId, Booking, BookingId, BookingKind, BookingRef, BookingStatus, Money,
    NewBooking, NotificationId, Result, UserId,
};
use sqlx::{Postgres, Row, Transaction};

/// One `PostgreSQL` transaction.
///
/// Dropping it without calling [`UnitOfWork::commit`] rolls back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PgUnitOfWork {
    pub(crate) const fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

impl std::fmt::Debug for PgUnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgUnitOfWork").finish_non_exhaustive()
    }
}

impl UnitOfWork for PgUnitOfWork {
    async fn insert_booking(&mut self, new: &NewBooking, at: DateTime<Utc>) -> Result<Booking> {
        let sql = format!(
            "INSERT INTO {} (customer_id, category_id, scheduled_date, scheduled_time, \
             address, phone, quoted_amount, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) \
             RETURNING id",
            booking_table(new.kind)
        );
        let (id,): (i64,) = sqlx::query_as(&sql)
            .bind(new.customer_id.get())
            .bind(new.category_id.get())
            .bind(new.schedule.date)
            .bind(new.schedule.time)
            .bind(&new.address)
            .bind(&new.phone)
            .bind(new.quoted_amount.to_db()?)
            .bind(BookingStatus::Pending.as_str())
            .bind(at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_error("Failed to insert booking"))?;

        Ok(Booking::from_new(BookingId::new(id), new.clone(), at))
    }

    async fn apply_transition(
        &mut self,
        kind: BookingKind,
        id: BookingId,
        guard: &Guard,
        change: &StatusChange,
        at: DateTime<Utc>,
    ) -> Result<Option<PriorState>> {
        // The locked subquery yields the pre-update row; the outer predicate
        // repeats the guard, so a racing caller re-checks against the winner's
        // committed row and matches nothing.
        let table = booking_table(kind);
        let sql = format!(
            "UPDATE {table} AS b \
             SET status = $3, \
                 provider_id = CASE WHEN $4 THEN $5::BIGINT ELSE b.provider_id END, \
                 settled_amount = COALESCE($6::BIGINT, b.settled_amount), \
                 cancellation_reason = COALESCE($7::TEXT, b.cancellation_reason), \
                 updated_at = $8 \
             FROM (SELECT id, status, customer_id, provider_id FROM {table} WHERE id = $1 FOR UPDATE) AS prior \
             WHERE b.id = prior.id \
               AND b.status = ANY($2::TEXT[]) \
               AND ($9::BIGINT IS NULL OR b.provider_id = $9) \
               AND ($10::BIGINT IS NULL OR b.customer_id = $10) \
             RETURNING prior.status, prior.customer_id, prior.provider_id"
        );
        let (set_provider, provider) = match change.provider {
            ProviderUpdate::Keep => (false, None),
            ProviderUpdate::Set(provider) => (true, Some(provider.get())),
            ProviderUpdate::Clear => (true, None),
        };
        let settled = change.settled_amount.map(Money::to_db).transpose()?;

        let row = sqlx::query(&sql)
            .bind(id.get())
            .bind(guard.expected_strs())
            .bind(change.status.as_str())
            .bind(set_provider)
            .bind(provider)
            .bind(settled)
            .bind(change.cancellation_reason.as_deref())
            .bind(at)
            .bind(guard.assignee.map(|u| u.get()))
            .bind(guard.customer.map(|u| u.get()))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("Failed to apply transition"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row
            .try_get("status")
            .map_err(db_error("Failed to read prior status"))?;
        let customer_id: i64 = row
            .try_get("customer_id")
            .map_err(db_error("Failed to read prior customer"))?;
        let provider_id: Option<i64> = row
            .try_get("provider_id")
            .map_err(db_error("Failed to read prior provider"))?;

        Ok(Some(PriorState {
            status: BookingStatus::parse(&status)?,
            customer_id: UserId::new(customer_id),
            provider_id: provider_id.map(UserId::new),
        }))
    }

    async fn record_allocation(
        &mut self,
        booking: BookingRef,
        provider_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<AllocationId> {
        // The booking row lock serialises writers for the same booking, so the
        // existence check and the insert cannot interleave.
        let current: Option<(String, Option<i64>)> = sqlx::query_as(&format!(
            "SELECT status, provider_id FROM {} WHERE id = $1 FOR UPDATE",
            booking_table(booking.kind)
        ))
        .bind(booking.id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("Failed to lock booking for allocation"))?;
        let current = current
            .map(|(status, provider)| {
                BookingStatus::parse(&status).map(|status| (status, provider.map(UserId::new)))
            })
            .transpose()?;

        let existing: Option<(i64, i64)> = sqlx::query_as(&format!(
            "SELECT id, provider_id FROM allocations WHERE {} = $1",
            booking_column(booking.kind)
        ))
        .bind(booking.id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("Failed to read existing allocation"))?;
        let existing = existing.map(|(id, provider)| (AllocationId::new(id), UserId::new(provider)));

        if let Some(id) = Allocation::admit(booking, provider_id, current, existing)? {
            return Ok(id);
        }

        let (service, subscription) = booking_keys(booking);
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO allocations (service_booking_id, subscription_booking_id, provider_id, allocated_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            ",
        )
        .bind(service)
        .bind(subscription)
        .bind(provider_id.get())
        .bind(at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error("Failed to record allocation"))?;

        Ok(AllocationId::new(id))
    }

    async fn emit_notification(
        &mut self,
        notification: &NewNotification,
        at: DateTime<Utc>,
    ) -> Result<NotificationId> {
        notification.visibility.validate_initial()?;
        let (service, subscription) = booking_keys(notification.booking);

        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO notifications (
                actor_id, provider_id, service_booking_id, subscription_booking_id, description,
                admin_visibility, provider_visibility, customer_visibility, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            ",
        )
        .bind(notification.actor_id.get())
        .bind(notification.provider_id.map(|u| u.get()))
        .bind(service)
        .bind(subscription)
        .bind(notification.description())
        .bind(notification.visibility.admin.as_str())
        .bind(notification.visibility.provider.as_str())
        .bind(notification.visibility.customer.as_str())
        .bind(at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error("Failed to insert notification"))?;

        Ok(NotificationId::new(id))
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(db_error("Failed to commit transaction"))
    }

    async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(db_error("Failed to roll back transaction"))
    }
}
