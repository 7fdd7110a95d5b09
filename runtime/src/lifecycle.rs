//! Booking lifecycle executor.
//!
//! [`BookingLifecycle`] turns a [`Transition`] into one unit of work:
//!
//! 1. reject transitions the booking kind does not have, and bad parameters
//! 2. open a unit of work
//! 3. run the guarded conditional update; no match means [`BookingError::StateConflict`]
//! 4. write the transition's effects (allocation, notifications)
//! 5. commit, or roll everything back on the first failure
//!
//! One lifecycle is bound to one [`BookingKind`]; build it with
//! [`BookingLifecycle::service`] or [`BookingLifecycle::subscription`].

use crate::config::LifecycleConfig;
use crate::feed::NotificationFeed;
use crate::metrics::{BookingMetrics, NotificationMetrics};
use crate::retry::{RetryPolicy, retry_with_predicate};
use chrono::{DateTime, Utc};
use homeservice_core::environment::{Clock, SystemClock};
use homeservice_core::store::{AllocationLedger, BookingStore, UnitOfWork};
use homeservice_core::transition::{Actor, Effect, Transition, TransitionOutcome};
use homeservice_core::validation::validate_new_booking;
use homeservice_core::{
    Allocation, AllocationId, Booking, BookingError, BookingId, BookingKind, BookingQuery,
    BookingRef, Money, NewBooking, Result, Topic, UserId,
};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// The booking state machine for one booking kind, bound to a store.
#[derive(Debug, Clone)]
pub struct BookingLifecycle<S, C = SystemClock> {
    kind: BookingKind,
    store: S,
    clock: C,
    retry: RetryPolicy,
}

impl<S: BookingStore> BookingLifecycle<S> {
    /// Service-booking lifecycle on the system clock.
    #[must_use]
    pub fn service(store: S) -> Self {
        Self::new(BookingKind::Service, store, SystemClock)
    }

    /// Subscription-booking lifecycle on the system clock.
    #[must_use]
    pub fn subscription(store: S) -> Self {
        Self::new(BookingKind::Subscription, store, SystemClock)
    }
}

impl<S: BookingStore, C: Clock> BookingLifecycle<S, C> {
    /// Lifecycle for `kind` with an explicit clock and retries disabled.
    #[must_use]
    pub fn new(kind: BookingKind, store: S, clock: C) -> Self {
        Self {
            kind,
            store,
            clock,
            retry: RetryPolicy::disabled(),
        }
    }

    /// Apply a loaded configuration.
    #[must_use]
    pub fn with_config(mut self, config: &LifecycleConfig) -> Self {
        self.retry = config.retry.clone();
        self
    }

    /// Retry storage failures of guarded transitions with this policy.
    ///
    /// A failed commit is returned without retrying: the commit may have
    /// landed before the error reached us, and a second attempt would then
    /// report a conflict for a transition that did apply.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Booking kind this lifecycle manages.
    #[must_use]
    pub const fn kind(&self) -> BookingKind {
        self.kind
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Notification feed over the same store.
    #[must_use]
    pub fn feed(&self) -> NotificationFeed<S>
    where
        S: Clone,
    {
        NotificationFeed::new(self.store.clone())
    }

    // ═══════════════════════════════════════════════════════════
    // Creation
    // ═══════════════════════════════════════════════════════════

    /// Create a booking in `pending` and notify the admin queue.
    ///
    /// Not retried, even when a retry policy is configured.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`] for a request of the other kind or with
    ///   invalid fields
    /// - [`BookingError::Persistence`] if any write fails; nothing is persisted
    pub async fn create_booking(&self, new: NewBooking) -> Result<BookingId> {
        if new.kind != self.kind {
            return Err(BookingError::validation(
                "kind",
                format!("expected a {} booking, got {}", self.kind, new.kind),
            ));
        }
        validate_new_booking(&new)?;

        let at = self.clock.now();
        let mut uow = self.store.begin().await?;
        let created = async {
            let booking = uow.insert_booking(&new, at).await?;
            let effect = Effect::booking_created();
            if let Some(notification) = effect.notification(new.customer_id, booking.reference()) {
                uow.emit_notification(&notification, at).await?;
            }
            Ok::<_, BookingError>(booking)
        }
        .await;

        let booking = match created {
            Ok(booking) => booking,
            Err(err) => {
                self.abandon(uow, "create", &err).await;
                return Err(err);
            }
        };
        if let Err(err) = uow.commit().await {
            BookingMetrics::record_failure(self.kind, "create");
            tracing::warn!(kind = %self.kind, error = %err, "Booking creation failed to commit");
            return Err(err);
        }

        BookingMetrics::record_created(self.kind);
        NotificationMetrics::record_emitted(Topic::NewBooking, self.kind);
        tracing::info!(
            kind = %self.kind,
            booking_id = %booking.id,
            customer_id = %booking.customer_id,
            "Booking created"
        );
        Ok(booking.id)
    }

    // ═══════════════════════════════════════════════════════════
    // Transitions
    // ═══════════════════════════════════════════════════════════

    /// Admin assigns a pending booking to a provider.
    ///
    /// # Errors
    ///
    /// See [`BookingLifecycle::apply`].
    pub async fn assign_provider(
        &self,
        booking_id: BookingId,
        admin_id: UserId,
        provider_id: UserId,
    ) -> Result<TransitionOutcome> {
        self.apply(
            booking_id,
            Transition::Assign {
                admin_id,
                provider_id,
            },
        )
        .await
    }

    /// The assigned provider accepts; records the allocation.
    ///
    /// # Errors
    ///
    /// See [`BookingLifecycle::apply`].
    pub async fn accept_assignment(
        &self,
        booking_id: BookingId,
        provider_id: UserId,
    ) -> Result<TransitionOutcome> {
        self.apply(booking_id, Transition::Accept { provider_id }).await
    }

    /// The assigned provider declines; the booking returns to `pending`.
    ///
    /// # Errors
    ///
    /// See [`BookingLifecycle::apply`].
    pub async fn decline_assignment(
        &self,
        booking_id: BookingId,
        provider_id: UserId,
    ) -> Result<TransitionOutcome> {
        self.apply(booking_id, Transition::Decline { provider_id }).await
    }

    /// The provider reports the work done with the final price (service only).
    ///
    /// # Errors
    ///
    /// See [`BookingLifecycle::apply`].
    pub async fn report_completion(
        &self,
        booking_id: BookingId,
        provider_id: UserId,
        settled_amount: Money,
    ) -> Result<TransitionOutcome> {
        self.apply(
            booking_id,
            Transition::ReportCompletion {
                provider_id,
                settled_amount,
            },
        )
        .await
    }

    /// The customer confirms the reported completion (service only).
    ///
    /// # Errors
    ///
    /// See [`BookingLifecycle::apply`].
    pub async fn confirm_completion(
        &self,
        booking_id: BookingId,
        customer_id: UserId,
    ) -> Result<TransitionOutcome> {
        self.apply(booking_id, Transition::ConfirmCompletion { customer_id })
            .await
    }

    /// The provider closes an in-progress subscription booking (subscription only).
    ///
    /// # Errors
    ///
    /// See [`BookingLifecycle::apply`].
    pub async fn complete_subscription(
        &self,
        booking_id: BookingId,
        provider_id: UserId,
    ) -> Result<TransitionOutcome> {
        self.apply(booking_id, Transition::CompleteSubscription { provider_id })
            .await
    }

    /// Cancel a non-terminal booking.
    ///
    /// # Errors
    ///
    /// See [`BookingLifecycle::apply`].
    pub async fn cancel(
        &self,
        booking_id: BookingId,
        actor: Actor,
        reason: impl Into<String>,
    ) -> Result<TransitionOutcome> {
        self.apply(
            booking_id,
            Transition::Cancel {
                actor,
                reason: reason.into(),
            },
        )
        .await
    }

    /// Execute any transition.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Unsupported`] if the transition does not exist for this kind
    /// - [`BookingError::Validation`] for bad transition parameters
    /// - [`BookingError::StateConflict`] if the booking is missing, in another
    ///   status, or not owned/assigned as the transition requires
    /// - [`BookingError::Persistence`] on storage failure; nothing is persisted
    pub async fn apply(&self, booking_id: BookingId, transition: Transition) -> Result<TransitionOutcome> {
        let name = transition.name();
        if !transition.supports(self.kind) {
            return Err(BookingError::Unsupported {
                kind: self.kind,
                transition: name,
            });
        }
        transition.validate()?;

        let started = Instant::now();
        let transition = &transition;
        let commit_failed = AtomicBool::new(false);
        let commit_failed = &commit_failed;
        let result = retry_with_predicate(
            &self.retry,
            move || self.try_apply(booking_id, transition, commit_failed),
            |err: &BookingError| err.is_retryable() && !commit_failed.load(Ordering::SeqCst),
        )
        .await;

        match &result {
            Ok((outcome, effects)) => {
                BookingMetrics::record_applied(self.kind, name, started.elapsed());
                self.record_effects(effects);
                tracing::info!(
                    kind = %self.kind,
                    booking_id = %booking_id,
                    transition = name,
                    from = %outcome.from,
                    to = %outcome.to,
                    "Transition applied"
                );
            }
            Err(BookingError::StateConflict { .. }) => {
                BookingMetrics::record_conflict(self.kind, name);
                tracing::warn!(
                    kind = %self.kind,
                    booking_id = %booking_id,
                    transition = name,
                    "Transition rejected: booking not in expected state"
                );
            }
            Err(err) => {
                BookingMetrics::record_failure(self.kind, name);
                tracing::warn!(
                    kind = %self.kind,
                    booking_id = %booking_id,
                    transition = name,
                    error = %err,
                    "Transition failed"
                );
            }
        }

        result.map(|(outcome, _)| outcome)
    }

    /// One attempt in a fresh unit of work; flags `commit_failed` when the
    /// outcome of the attempt is unknown.
    async fn try_apply(
        &self,
        booking_id: BookingId,
        transition: &Transition,
        commit_failed: &AtomicBool,
    ) -> Result<(TransitionOutcome, SmallVec<[Effect; 2]>)> {
        let at = self.clock.now();
        let mut uow = self.store.begin().await?;

        match self.run(&mut uow, booking_id, transition, at).await {
            Ok(applied) => {
                if let Err(err) = uow.commit().await {
                    commit_failed.store(true, Ordering::SeqCst);
                    return Err(err);
                }
                Ok(applied)
            }
            Err(err) => {
                self.abandon(uow, transition.name(), &err).await;
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        uow: &mut S::UnitOfWork,
        booking_id: BookingId,
        transition: &Transition,
        at: DateTime<Utc>,
    ) -> Result<(TransitionOutcome, SmallVec<[Effect; 2]>)> {
        let guard = transition.guard();
        let change = transition.change();

        let Some(prior) = uow
            .apply_transition(self.kind, booking_id, &guard, &change, at)
            .await?
        else {
            return Err(BookingError::StateConflict {
                kind: self.kind,
                booking_id,
                transition: transition.name(),
            });
        };

        let booking = BookingRef::new(self.kind, booking_id);
        let effects = transition.effects(&prior);
        for effect in &effects {
            match effect {
                Effect::RecordAllocation { provider_id } => {
                    let allocation_id = uow.record_allocation(booking, *provider_id, at).await?;
                    tracing::debug!(%booking, %provider_id, %allocation_id, "Allocation recorded");
                }
                Effect::Notify { .. } => {
                    if let Some(notification) = effect.notification(transition.actor_id(), booking) {
                        let notification_id = uow.emit_notification(&notification, at).await?;
                        tracing::debug!(
                            %booking,
                            %notification_id,
                            description = notification.description(),
                            "Notification emitted"
                        );
                    }
                }
            }
        }

        Ok((
            TransitionOutcome {
                booking,
                from: prior.status,
                to: change.status,
            },
            effects,
        ))
    }

    async fn abandon(&self, uow: S::UnitOfWork, step: &'static str, cause: &BookingError) {
        if let Err(err) = uow.rollback().await {
            tracing::error!(
                kind = %self.kind,
                step,
                cause = %cause,
                error = %err,
                "Rollback failed"
            );
        }
    }

    fn record_effects(&self, effects: &[Effect]) {
        for effect in effects {
            match effect {
                Effect::RecordAllocation { .. } => BookingMetrics::record_allocation(self.kind),
                Effect::Notify { topic, .. } => NotificationMetrics::record_emitted(*topic, self.kind),
            }
        }
    }

    // ═══════════════════════════════════════════════════════════
    // Reads and ledger
    // ═══════════════════════════════════════════════════════════

    /// Get a booking of this kind.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>> {
        self.store.get_booking(self.kind, booking_id).await
    }

    /// List bookings of this kind, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list_bookings(&self, query: &BookingQuery) -> Result<Vec<Booking>> {
        self.store.list_bookings(self.kind, query).await
    }

    /// Allocation of a booking, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn lookup_allocation(&self, booking_id: BookingId) -> Result<Option<Allocation>> {
        self.store
            .lookup_allocation(BookingRef::new(self.kind, booking_id))
            .await
    }

    /// Record an allocation outside a transition (idempotent per booking).
    ///
    /// Only the provider who accepted the booking is admitted, so this can
    /// repair a missing ledger row but never allocate ahead of `accept`.
    ///
    /// # Errors
    ///
    /// - [`BookingError::StateConflict`] if the booking is missing, not yet
    ///   accepted, or accepted by someone else
    /// - [`BookingError::Persistence`] if the write fails
    pub async fn record_allocation(
        &self,
        booking_id: BookingId,
        provider_id: UserId,
    ) -> Result<AllocationId> {
        let booking = BookingRef::new(self.kind, booking_id);
        let allocation_id = AllocationLedger::record_allocation(
            &self.store,
            booking,
            provider_id,
            self.clock.now(),
        )
        .await?;
        tracing::info!(%booking, %provider_id, %allocation_id, "Allocation recorded");
        Ok(allocation_id)
    }
}
