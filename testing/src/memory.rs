//! In-memory booking store.
//!
//! Implements every storage trait with the same observable semantics as the
//! PostgreSQL store: guarded conditional updates, an idempotent allocation
//! ledger, role-scoped notification reads and dismissals.
//!
//! A unit of work holds the store lock for its whole lifetime and mutates a
//! private copy of the state; `commit` swaps the copy in, dropping the unit
//! discards it. Transactions are therefore fully serialised.
//!
//! Failures can be injected at any step with [`InMemoryBookingStore::fail_next`].

use chrono::{DateTime, Utc};
use homeservice_core::notification::{
    Audience, NewNotification, Notification, NotificationFilter, Visibility,
};
use homeservice_core::store::{
    AllocationLedger, BookingRepository, NotificationRepository, UnitOfWork,
};
use homeservice_core::transition::{Guard, PriorState, StatusChange};
use homeservice_core::{
    Allocation, AllocationId, Booking, BookingError, BookingId, BookingKind, BookingQuery,
    BookingRef, NewBooking, NotificationId, Result, UserId,
};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Step at which an injected failure fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    /// Opening a unit of work
    Begin,
    /// Inserting a booking
    InsertBooking,
    /// The guarded conditional update
    ApplyTransition,
    /// Writing the allocation
    RecordAllocation,
    /// Writing a notification
    EmitNotification,
    /// Committing
    Commit,
}

impl FailurePoint {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::InsertBooking => "insert_booking",
            Self::ApplyTransition => "apply_transition",
            Self::RecordAllocation => "record_allocation",
            Self::EmitNotification => "emit_notification",
            Self::Commit => "commit",
        }
    }
}

#[derive(Clone, Debug, Default)]
struct MemoryState {
    service: BTreeMap<BookingId, Booking>,
    subscription: BTreeMap<BookingId, Booking>,
    allocations: Vec<Allocation>,
    notifications: BTreeMap<NotificationId, Notification>,
    last_service_id: i64,
    last_subscription_id: i64,
    last_allocation_id: i64,
    last_notification_id: i64,
}

impl MemoryState {
    const fn table(&self, kind: BookingKind) -> &BTreeMap<BookingId, Booking> {
        match kind {
            BookingKind::Service => &self.service,
            BookingKind::Subscription => &self.subscription,
        }
    }

    const fn table_mut(&mut self, kind: BookingKind) -> &mut BTreeMap<BookingId, Booking> {
        match kind {
            BookingKind::Service => &mut self.service,
            BookingKind::Subscription => &mut self.subscription,
        }
    }

    fn next_booking_id(&mut self, kind: BookingKind) -> BookingId {
        let last = match kind {
            BookingKind::Service => &mut self.last_service_id,
            BookingKind::Subscription => &mut self.last_subscription_id,
        };
        *last += 1;
        BookingId::new(*last)
    }

    fn allocation(&self, booking: BookingRef) -> Option<&Allocation> {
        self.allocations.iter().find(|a| a.booking == booking)
    }

    fn record_allocation(
        &mut self,
        booking: BookingRef,
        provider_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<AllocationId> {
        let current = self
            .table(booking.kind)
            .get(&booking.id)
            .map(|b| (b.status, b.provider_id));
        let existing = self.allocation(booking).map(|a| (a.id, a.provider_id));
        if let Some(id) = Allocation::admit(booking, provider_id, current, existing)? {
            return Ok(id);
        }
        self.last_allocation_id += 1;
        let id = AllocationId::new(self.last_allocation_id);
        self.allocations.push(Allocation {
            id,
            booking,
            provider_id,
            allocated_at: at,
        });
        Ok(id)
    }

    /// Matching rows that are active for the audience, oldest first.
    fn matching(
        &self,
        audience: Audience,
        filter: &NotificationFilter,
    ) -> Result<Vec<NotificationId>> {
        let scope = filter.scope(audience)?;
        let descriptions = filter.descriptions(audience);
        Ok(self
            .notifications
            .values()
            .filter(|n| n.visibility.get(audience) == Visibility::Active)
            .filter(|n| descriptions.iter().any(|d| *d == n.description))
            .filter(|n| filter.kind.is_none_or(|k| n.booking.kind == k))
            .filter(|n| scope.is_none_or(|subject| self.belongs_to(n, audience, subject)))
            .map(|n| n.id)
            .collect())
    }

    fn belongs_to(&self, notification: &Notification, audience: Audience, subject: UserId) -> bool {
        match audience {
            Audience::Admin => true,
            Audience::Provider => notification.provider_id == Some(subject),
            Audience::Customer => self
                .table(notification.booking.kind)
                .get(&notification.booking.id)
                .is_some_and(|b| b.customer_id == subject),
        }
    }

    fn hide(&mut self, id: NotificationId, audience: Audience) -> bool {
        match self.notifications.get_mut(&id) {
            Some(n) if n.visibility.get(audience) == Visibility::Active => {
                n.visibility.set(audience, Visibility::Hidden);
                true
            }
            _ => false,
        }
    }
}

/// In-memory implementation of every storage trait.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookingStore {
    state: Arc<AsyncMutex<MemoryState>>,
    faults: Arc<Mutex<HashMap<FailurePoint, u32>>>,
}

impl InMemoryBookingStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call at `point` fail with a persistence error.
    pub fn fail_next(&self, point: FailurePoint) {
        self.fail_times(point, 1);
    }

    /// Make the next `times` calls at `point` fail with a persistence error.
    pub fn fail_times(&self, point: FailurePoint, times: u32) {
        let mut faults = self
            .faults
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *faults.entry(point).or_default() += times;
    }

    /// Every notification row, in insertion order.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.values().cloned().collect()
    }

    /// Every allocation row, in insertion order.
    pub async fn allocations(&self) -> Vec<Allocation> {
        self.state.lock().await.allocations.clone()
    }

    fn check(faults: &Mutex<HashMap<FailurePoint, u32>>, point: FailurePoint) -> Result<()> {
        let mut faults = faults
            .lock()
            .map_err(|_| BookingError::Persistence("Mutex lock failed".to_string()))?;
        match faults.get_mut(&point) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(BookingError::Persistence(format!(
                    "injected failure at {}",
                    point.as_str()
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Unit of work over an [`InMemoryBookingStore`].
#[derive(Debug)]
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    faults: Arc<Mutex<HashMap<FailurePoint, u32>>>,
}

impl MemoryUnitOfWork {
    fn check(&self, point: FailurePoint) -> Result<()> {
        InMemoryBookingStore::check(&self.faults, point)
    }
}

impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_booking(&mut self, new: &NewBooking, at: DateTime<Utc>) -> Result<Booking> {
        self.check(FailurePoint::InsertBooking)?;
        let id = self.working.next_booking_id(new.kind);
        let booking = Booking::from_new(id, new.clone(), at);
        self.working.table_mut(new.kind).insert(id, booking.clone());
        Ok(booking)
    }

    async fn apply_transition(
        &mut self,
        kind: BookingKind,
        id: BookingId,
        guard: &Guard,
        change: &StatusChange,
        at: DateTime<Utc>,
    ) -> Result<Option<PriorState>> {
        self.check(FailurePoint::ApplyTransition)?;
        let Some(booking) = self.working.table_mut(kind).get_mut(&id) else {
            return Ok(None);
        };
        if !guard.admits(booking) {
            return Ok(None);
        }
        let prior = PriorState::from(&*booking);
        change.apply(booking, at);
        Ok(Some(prior))
    }

    async fn record_allocation(
        &mut self,
        booking: BookingRef,
        provider_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<AllocationId> {
        self.check(FailurePoint::RecordAllocation)?;
        self.working.record_allocation(booking, provider_id, at)
    }

    async fn emit_notification(
        &mut self,
        notification: &NewNotification,
        at: DateTime<Utc>,
    ) -> Result<NotificationId> {
        notification.visibility.validate_initial()?;
        self.check(FailurePoint::EmitNotification)?;
        if !self
            .working
            .table(notification.booking.kind)
            .contains_key(&notification.booking.id)
        {
            return Err(BookingError::Persistence(format!(
                "notification references unknown booking {}",
                notification.booking
            )));
        }
        self.working.last_notification_id += 1;
        let id = NotificationId::new(self.working.last_notification_id);
        self.working
            .notifications
            .insert(id, Notification::from_new(id, notification, at));
        Ok(id)
    }

    async fn commit(mut self) -> Result<()> {
        self.check(FailurePoint::Commit)?;
        *self.guard = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

impl BookingRepository for InMemoryBookingStore {
    type UnitOfWork = MemoryUnitOfWork;

    fn begin(&self) -> impl Future<Output = Result<MemoryUnitOfWork>> + Send {
        let state = Arc::clone(&self.state);
        let faults = Arc::clone(&self.faults);

        async move {
            Self::check(&faults, FailurePoint::Begin)?;
            let guard = state.lock_owned().await;
            let working = guard.clone();
            Ok(MemoryUnitOfWork {
                guard,
                working,
                faults,
            })
        }
    }

    fn get_booking(
        &self,
        kind: BookingKind,
        id: BookingId,
    ) -> impl Future<Output = Result<Option<Booking>>> + Send {
        let state = Arc::clone(&self.state);

        async move { Ok(state.lock().await.table(kind).get(&id).cloned()) }
    }

    fn list_bookings(
        &self,
        kind: BookingKind,
        query: &BookingQuery,
    ) -> impl Future<Output = Result<Vec<Booking>>> + Send {
        let state = Arc::clone(&self.state);
        let query = query.clone();

        async move {
            let (limit, offset) = query.page();
            let state = state.lock().await;
            let mut bookings: Vec<Booking> = state
                .table(kind)
                .values()
                .filter(|b| query.matches(b))
                .cloned()
                .collect();
            bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(bookings
                .into_iter()
                .skip(usize::try_from(offset).unwrap_or(0))
                .take(usize::try_from(limit).unwrap_or(0))
                .collect())
        }
    }
}

impl AllocationLedger for InMemoryBookingStore {
    fn record_allocation(
        &self,
        booking: BookingRef,
        provider_id: UserId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<AllocationId>> + Send {
        let state = Arc::clone(&self.state);
        let faults = Arc::clone(&self.faults);

        async move {
            Self::check(&faults, FailurePoint::RecordAllocation)?;
            state.lock().await.record_allocation(booking, provider_id, at)
        }
    }

    fn lookup_allocation(
        &self,
        booking: BookingRef,
    ) -> impl Future<Output = Result<Option<Allocation>>> + Send {
        let state = Arc::clone(&self.state);

        async move { Ok(state.lock().await.allocation(booking).cloned()) }
    }
}

impl NotificationRepository for InMemoryBookingStore {
    fn get_notification(
        &self,
        id: NotificationId,
    ) -> impl Future<Output = Result<Option<Notification>>> + Send {
        let state = Arc::clone(&self.state);

        async move { Ok(state.lock().await.notifications.get(&id).cloned()) }
    }

    fn list_active(
        &self,
        audience: Audience,
        filter: &NotificationFilter,
    ) -> impl Future<Output = Result<Vec<Notification>>> + Send {
        let state = Arc::clone(&self.state);
        let filter = filter.clone();

        async move {
            let state = state.lock().await;
            let mut rows: Vec<Notification> = state
                .matching(audience, &filter)?
                .into_iter()
                .filter_map(|id| state.notifications.get(&id).cloned())
                .collect();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(rows)
        }
    }

    fn hide_oldest_active(
        &self,
        audience: Audience,
        filter: &NotificationFilter,
    ) -> impl Future<Output = Result<Option<NotificationId>>> + Send {
        let state = Arc::clone(&self.state);
        let filter = filter.clone();

        async move {
            let mut state = state.lock().await;
            let oldest = state
                .matching(audience, &filter)?
                .into_iter()
                .filter_map(|id| state.notifications.get(&id))
                .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
                .map(|n| n.id);
            Ok(oldest.filter(|id| state.hide(*id, audience)))
        }
    }

    fn hide_all(
        &self,
        audience: Audience,
        filter: &NotificationFilter,
    ) -> impl Future<Output = Result<u64>> + Send {
        let state = Arc::clone(&self.state);
        let filter = filter.clone();

        async move {
            let mut state = state.lock().await;
            let ids = state.matching(audience, &filter)?;
            let mut hidden = 0;
            for id in ids {
                if state.hide(id, audience) {
                    hidden += 1;
                }
            }
            Ok(hidden)
        }
    }

    fn hide_by_id(
        &self,
        id: NotificationId,
        audience: Audience,
    ) -> impl Future<Output = Result<bool>> + Send {
        let state = Arc::clone(&self.state);

        async move { Ok(state.lock().await.hide(id, audience)) }
    }
}
