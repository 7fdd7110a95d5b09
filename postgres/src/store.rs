//! `PostgreSQL` implementation of the storage traits.

use crate::rows::{
    BOOKING_COLUMNS, NOTIFICATION_COLUMNS, booking_column, booking_table, db_error,
    row_to_allocation, row_to_booking, row_to_notification, visibility_column,
};
use crate::unit_of_work::PgUnitOfWork;
use chrono::{DateTime, Utc};
use homeservice_core::notification::{Audience, Notification, NotificationFilter};
use homeservice_core::store::{
    AllocationLedger, BookingRepository, NotificationRepository, UnitOfWork,
};
use homeservice_core::{
    Allocation, AllocationId, Booking, BookingError, BookingId, BookingKind, BookingQuery,
    BookingRef, NotificationId, Result, UserId,
};
use sqlx::PgPool;
use std::future::Future;

/// Booking, allocation and notification storage over a connection pool.
///
/// Cloning is cheap; clones share the pool.
///
/// # Example
///
/// ```no_run
/// use homeservice_postgres::{PostgresBookingStore, PostgresConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PostgresConfig::from_env().connect().await?;
/// let store = PostgresBookingStore::new(pool);
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail.
    pub async fn migrate(&self) -> Result<()> {
        crate::MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| BookingError::Persistence(format!("Migration failed: {e}")))
    }
}

/// `WHERE` clause selecting one audience's active feed.
///
/// Binds `$1` (descriptions) and `$2` (kind or NULL); the subject, when the
/// audience is scoped, is `$3`.
struct FeedSelection {
    clause: String,
    descriptions: Vec<&'static str>,
    kind: Option<&'static str>,
    subject: Option<i64>,
}

impl FeedSelection {
    fn new(audience: Audience, filter: &NotificationFilter) -> Result<Self> {
        let scope = filter.scope(audience)?;
        let visibility = visibility_column(audience);
        let subject_clause = match audience {
            Audience::Admin => "",
            Audience::Provider => " AND n.provider_id = $3",
            Audience::Customer => " AND COALESCE(sb.customer_id, ub.customer_id) = $3",
        };
        let clause = format!(
            "FROM notifications n \
             LEFT JOIN service_bookings sb ON sb.id = n.service_booking_id \
             LEFT JOIN subscription_bookings ub ON ub.id = n.subscription_booking_id \
             WHERE n.{visibility} = 'active' \
               AND n.description = ANY($1::TEXT[]) \
               AND ($2::TEXT IS NULL OR ($2 = 'service') = (n.service_booking_id IS NOT NULL))\
             {subject_clause}"
        );

        Ok(Self {
            clause,
            descriptions: filter.descriptions(audience),
            kind: filter.kind.map(|k| k.as_str()),
            subject: scope.map(|s| s.get()),
        })
    }

    fn bind<'q>(
        &'q self,
        sql: &'q str,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        let query = sqlx::query(sql)
            .bind(&self.descriptions)
            .bind(self.kind);
        match self.subject {
            Some(subject) => query.bind(subject),
            None => query,
        }
    }
}

impl BookingRepository for PostgresBookingStore {
    type UnitOfWork = PgUnitOfWork;

    fn begin(&self) -> impl Future<Output = Result<PgUnitOfWork>> + Send {
        let pool = self.pool.clone();

        async move {
            let tx = pool
                .begin()
                .await
                .map_err(db_error("Failed to start transaction"))?;
            Ok(PgUnitOfWork::new(tx))
        }
    }

    fn get_booking(
        &self,
        kind: BookingKind,
        id: BookingId,
    ) -> impl Future<Output = Result<Option<Booking>>> + Send {
        let pool = self.pool.clone();

        async move {
            let sql = format!(
                "SELECT {BOOKING_COLUMNS} FROM {} WHERE id = $1",
                booking_table(kind)
            );
            let row = sqlx::query(&sql)
                .bind(id.get())
                .fetch_optional(&pool)
                .await
                .map_err(db_error("Failed to get booking"))?;

            row.map(|row| row_to_booking(kind, &row)).transpose()
        }
    }

    fn list_bookings(
        &self,
        kind: BookingKind,
        query: &BookingQuery,
    ) -> impl Future<Output = Result<Vec<Booking>>> + Send {
        let pool = self.pool.clone();
        let query = query.clone();

        async move {
            let (limit, offset) = query.page();
            let sql = format!(
                "SELECT {BOOKING_COLUMNS} FROM {} \
                 WHERE ($1::TEXT IS NULL OR status = $1) \
                   AND ($2::BIGINT IS NULL OR customer_id = $2) \
                   AND ($3::BIGINT IS NULL OR provider_id = $3) \
                 ORDER BY created_at DESC, id DESC \
                 LIMIT $4 OFFSET $5",
                booking_table(kind)
            );
            let rows = sqlx::query(&sql)
                .bind(query.status.map(|s| s.as_str()))
                .bind(query.customer_id.map(|u| u.get()))
                .bind(query.provider_id.map(|u| u.get()))
                .bind(limit)
                .bind(offset)
                .fetch_all(&pool)
                .await
                .map_err(db_error("Failed to list bookings"))?;

            rows.iter().map(|row| row_to_booking(kind, row)).collect()
        }
    }
}

impl AllocationLedger for PostgresBookingStore {
    fn record_allocation(
        &self,
        booking: BookingRef,
        provider_id: UserId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<AllocationId>> + Send {
        let store = self.clone();

        async move {
            let mut uow = store.begin().await?;
            match uow.record_allocation(booking, provider_id, at).await {
                Ok(id) => {
                    uow.commit().await?;
                    Ok(id)
                }
                Err(e) => {
                    if let Err(rollback) = uow.rollback().await {
                        tracing::warn!(error = %rollback, "Rollback failed");
                    }
                    Err(e)
                }
            }
        }
    }

    fn lookup_allocation(
        &self,
        booking: BookingRef,
    ) -> impl Future<Output = Result<Option<Allocation>>> + Send {
        let pool = self.pool.clone();

        async move {
            let sql = format!(
                "SELECT id, service_booking_id, subscription_booking_id, provider_id, allocated_at \
                 FROM allocations WHERE {} = $1",
                booking_column(booking.kind)
            );
            let row = sqlx::query(&sql)
                .bind(booking.id.get())
                .fetch_optional(&pool)
                .await
                .map_err(db_error("Failed to look up allocation"))?;

            row.as_ref().map(row_to_allocation).transpose()
        }
    }
}

impl NotificationRepository for PostgresBookingStore {
    fn get_notification(
        &self,
        id: NotificationId,
    ) -> impl Future<Output = Result<Option<Notification>>> + Send {
        let pool = self.pool.clone();

        async move {
            let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications n WHERE n.id = $1");
            let row = sqlx::query(&sql)
                .bind(id.get())
                .fetch_optional(&pool)
                .await
                .map_err(db_error("Failed to get notification"))?;

            row.as_ref().map(row_to_notification).transpose()
        }
    }

    fn list_active(
        &self,
        audience: Audience,
        filter: &NotificationFilter,
    ) -> impl Future<Output = Result<Vec<Notification>>> + Send {
        let pool = self.pool.clone();
        let selection = FeedSelection::new(audience, filter);

        async move {
            let selection = selection?;
            let sql = format!(
                "SELECT {NOTIFICATION_COLUMNS} {} ORDER BY n.created_at DESC, n.id DESC",
                selection.clause
            );
            let rows = selection
                .bind(&sql)
                .fetch_all(&pool)
                .await
                .map_err(db_error("Failed to list notifications"))?;

            rows.iter().map(row_to_notification).collect()
        }
    }

    fn hide_oldest_active(
        &self,
        audience: Audience,
        filter: &NotificationFilter,
    ) -> impl Future<Output = Result<Option<NotificationId>>> + Send {
        let pool = self.pool.clone();
        let selection = FeedSelection::new(audience, filter);

        async move {
            let selection = selection?;
            let column = visibility_column(audience);
            // SKIP LOCKED: two concurrent callers hide two different rows.
            let sql = format!(
                "UPDATE notifications SET {column} = 'hidden' \
                 WHERE id = (SELECT n.id {} ORDER BY n.created_at, n.id LIMIT 1 FOR UPDATE OF n SKIP LOCKED) \
                 RETURNING id",
                selection.clause
            );
            let row = selection
                .bind(&sql)
                .fetch_optional(&pool)
                .await
                .map_err(db_error("Failed to dismiss oldest notification"))?;

            row.map(|row| {
                sqlx::Row::try_get::<i64, _>(&row, "id")
                    .map(NotificationId::new)
                    .map_err(db_error("Failed to read notification id"))
            })
            .transpose()
        }
    }

    fn hide_all(
        &self,
        audience: Audience,
        filter: &NotificationFilter,
    ) -> impl Future<Output = Result<u64>> + Send {
        let pool = self.pool.clone();
        let selection = FeedSelection::new(audience, filter);

        async move {
            let selection = selection?;
            let column = visibility_column(audience);
            let sql = format!(
                "UPDATE notifications SET {column} = 'hidden' \
                 WHERE {column} = 'active' AND id IN (SELECT n.id {})",
                selection.clause
            );
            let result = selection
                .bind(&sql)
                .execute(&pool)
                .await
                .map_err(db_error("Failed to dismiss notifications"))?;

            Ok(result.rows_affected())
        }
    }

    fn hide_by_id(
        &self,
        id: NotificationId,
        audience: Audience,
    ) -> impl Future<Output = Result<bool>> + Send {
        let pool = self.pool.clone();

        async move {
            let column = visibility_column(audience);
            let sql = format!(
                "UPDATE notifications SET {column} = 'hidden' WHERE id = $1 AND {column} = 'active'"
            );
            let result = sqlx::query(&sql)
                .bind(id.get())
                .execute(&pool)
                .await
                .map_err(db_error("Failed to dismiss notification"))?;

            Ok(result.rows_affected() == 1)
        }
    }
}
