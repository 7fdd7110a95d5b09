//! Storage seams.
//!
//! The lifecycle never talks to a database handle directly. It is handed a
//! store implementing these traits (PostgreSQL in production, the in-memory
//! store in tests) and drives every transition through a [`UnitOfWork`].
//!
//! # Unit of work
//!
//! `begin` opens a transaction. Within it the lifecycle performs the guarded
//! conditional update, the allocation insert and the notification inserts,
//! then calls `commit`. Dropping or rolling back a unit of work discards every
//! write made through it.

use crate::error::Result;
use crate::notification::{Audience, NewNotification, Notification, NotificationFilter};
use crate::transition::{Guard, PriorState, StatusChange};
use crate::types::{
    Allocation, AllocationId, Booking, BookingId, BookingKind, BookingQuery, BookingRef,
    NewBooking, NotificationId, UserId,
};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Booking persistence.
///
/// Reads run outside any unit of work; every write goes through
/// [`BookingRepository::begin`].
pub trait BookingRepository: Send + Sync {
    /// Transaction handle produced by [`BookingRepository::begin`].
    type UnitOfWork: UnitOfWork;

    /// Open a unit of work.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BookingError::Persistence`] if no transaction could be started.
    fn begin(&self) -> impl Future<Output = Result<Self::UnitOfWork>> + Send;

    /// Get a booking by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails or the stored row is malformed.
    fn get_booking(
        &self,
        kind: BookingKind,
        id: BookingId,
    ) -> impl Future<Output = Result<Option<Booking>>> + Send;

    /// List bookings of one kind, newest first.
    ///
    /// # Pagination
    ///
    /// See [`BookingQuery::page`]: default 100, capped at 500.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails or a stored row is malformed.
    fn list_bookings(
        &self,
        kind: BookingKind,
        query: &BookingQuery,
    ) -> impl Future<Output = Result<Vec<Booking>>> + Send;
}

/// Writes performed atomically inside one transaction.
pub trait UnitOfWork: Send {
    /// Insert a new booking with status `pending`.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    fn insert_booking(
        &mut self,
        new: &NewBooking,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Booking>> + Send;

    /// Conditional update: write `change` only if `guard` holds for the row.
    ///
    /// Returns the row as it was before the update, or `None` when the
    /// booking does not exist or the guard does not hold. Check and write
    /// are a single atomic step, so of two racing callers only one gets
    /// `Some`.
    ///
    /// # Errors
    ///
    /// Returns error only for storage failures; a failed guard is `Ok(None)`.
    fn apply_transition(
        &mut self,
        kind: BookingKind,
        id: BookingId,
        guard: &Guard,
        change: &StatusChange,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<PriorState>>> + Send;

    /// Record an allocation; returns the existing id if the booking already has
    /// one for `provider_id`. Admission follows [`crate::Allocation::admit`]
    /// against the booking row, locked for the rest of the unit.
    ///
    /// # Errors
    ///
    /// - [`crate::BookingError::StateConflict`] if the booking is missing, not
    ///   accepted, or accepted by another provider
    /// - a persistence error if the read or insert fails
    fn record_allocation(
        &mut self,
        booking: BookingRef,
        provider_id: UserId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<AllocationId>> + Send;

    /// Insert one notification row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BookingError::Validation`] if the initial visibility is
    /// not allowed, or a persistence error if the insert fails.
    fn emit_notification(
        &mut self,
        notification: &NewNotification,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<NotificationId>> + Send;

    /// Make every write of this unit durable.
    ///
    /// # Errors
    ///
    /// Returns error if the commit fails; nothing is then persisted.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;

    /// Discard every write of this unit.
    ///
    /// # Errors
    ///
    /// Returns error if the rollback itself fails.
    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}

/// Append-only provider ↔ booking ledger.
pub trait AllocationLedger: Send + Sync {
    /// Record an allocation in its own transaction (idempotent per booking).
    ///
    /// Only the provider who accepted the booking can be allocated; this never
    /// creates an allocation ahead of `accept`.
    ///
    /// # Errors
    ///
    /// Same as [`UnitOfWork::record_allocation`].
    fn record_allocation(
        &self,
        booking: BookingRef,
        provider_id: UserId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<AllocationId>> + Send;

    /// Allocation of a booking, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn lookup_allocation(
        &self,
        booking: BookingRef,
    ) -> impl Future<Output = Result<Option<Allocation>>> + Send;
}

/// Notification reads and dismissals.
///
/// # Scoping
///
/// - admin: every notification
/// - provider: rows whose `provider_id` is the subject
/// - customer: rows whose booking belongs to the subject
///
/// Every read and dismissal is further restricted to the audience's feed
/// (see [`crate::notification::Topic::is_relevant_to`]).
pub trait NotificationRepository: Send + Sync {
    /// Get a notification by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn get_notification(
        &self,
        id: NotificationId,
    ) -> impl Future<Output = Result<Option<Notification>>> + Send;

    /// Active notifications for an audience, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn list_active(
        &self,
        audience: Audience,
        filter: &NotificationFilter,
    ) -> impl Future<Output = Result<Vec<Notification>>> + Send;

    /// Hide the single oldest matching active notification.
    ///
    /// Returns the hidden row's id, or `None` if nothing matched.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn hide_oldest_active(
        &self,
        audience: Audience,
        filter: &NotificationFilter,
    ) -> impl Future<Output = Result<Option<NotificationId>>> + Send;

    /// Hide every matching active notification; returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn hide_all(
        &self,
        audience: Audience,
        filter: &NotificationFilter,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Hide one notification for one audience.
    ///
    /// Returns `false` if it was not active for that audience (already
    /// hidden, never addressed to it, or unknown id).
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn hide_by_id(
        &self,
        id: NotificationId,
        audience: Audience,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// Everything the lifecycle needs from storage.
pub trait BookingStore: BookingRepository + AllocationLedger + NotificationRepository {}

impl<T> BookingStore for T where T: BookingRepository + AllocationLedger + NotificationRepository {}
