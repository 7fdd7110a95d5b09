//! A transition and its side effects commit together or not at all.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use chrono::{DateTime, Utc};
use homeservice_core::environment::Clock;
use homeservice_core::{Actor, BookingError, BookingKind, BookingStatus};
use homeservice_runtime::{BookingLifecycle, RetryPolicy};
use homeservice_testing::fixtures::{ADMIN, CUSTOMER, PROVIDER};
use homeservice_testing::{FailurePoint, InMemoryBookingStore, fixtures, stepping_clock, test_clock};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn fast_retries(max_retries: usize) -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(max_retries)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
        .build()
}

#[tokio::test]
async fn failed_notification_rolls_back_status_change() {
    let store = InMemoryBookingStore::new();
    let lifecycle = BookingLifecycle::new(BookingKind::Service, store.clone(), stepping_clock());
    let id = lifecycle.create_booking(fixtures::service_request()).await.unwrap();
    let before = store.notifications().await.len();

    store.fail_next(FailurePoint::EmitNotification);
    let err = lifecycle.assign_provider(id, ADMIN, PROVIDER).await.unwrap_err();

    assert!(matches!(err, BookingError::Persistence(_)));
    assert!(err.is_retryable());
    let booking = lifecycle.get_booking(id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.provider_id, None);
    assert_eq!(store.notifications().await.len(), before);
}

#[tokio::test]
async fn failed_allocation_rolls_back_accept() {
    let store = InMemoryBookingStore::new();
    let lifecycle = BookingLifecycle::new(BookingKind::Subscription, store.clone(), stepping_clock());
    let id = lifecycle.create_booking(fixtures::subscription_request()).await.unwrap();
    lifecycle.assign_provider(id, ADMIN, PROVIDER).await.unwrap();
    let before = store.notifications().await.len();

    store.fail_next(FailurePoint::RecordAllocation);
    assert!(lifecycle.accept_assignment(id, PROVIDER).await.is_err());

    let booking = lifecycle.get_booking(id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Waiting);
    assert!(store.allocations().await.is_empty());
    assert_eq!(store.notifications().await.len(), before);

    // The booking is untouched, so the same call succeeds afterwards.
    lifecycle.accept_assignment(id, PROVIDER).await.unwrap();
    assert_eq!(store.allocations().await.len(), 1);
}

#[tokio::test]
async fn failed_commit_persists_nothing() {
    let store = InMemoryBookingStore::new();
    let lifecycle = BookingLifecycle::new(BookingKind::Service, store.clone(), stepping_clock());
    let id = lifecycle.create_booking(fixtures::service_request()).await.unwrap();

    store.fail_next(FailurePoint::Commit);
    assert!(lifecycle.cancel(id, Actor::Customer(CUSTOMER), "Changed plans").await.is_err());

    let booking = lifecycle.get_booking(id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.cancellation_reason, None);
    assert_eq!(store.notifications().await.len(), 1);
}

#[tokio::test]
async fn failed_commit_is_not_retried() {
    let store = InMemoryBookingStore::new();
    let lifecycle = BookingLifecycle::new(BookingKind::Service, store.clone(), stepping_clock())
        .with_retry_policy(fast_retries(3));
    let id = lifecycle.create_booking(fixtures::service_request()).await.unwrap();

    // A second attempt would succeed; the first failure must still surface.
    store.fail_next(FailurePoint::Commit);
    assert!(matches!(
        lifecycle.assign_provider(id, ADMIN, PROVIDER).await,
        Err(BookingError::Persistence(_))
    ));
    assert_eq!(
        lifecycle.get_booking(id).await.unwrap().unwrap().status,
        BookingStatus::Pending
    );

    lifecycle.assign_provider(id, ADMIN, PROVIDER).await.unwrap();
    assert_eq!(store.notifications().await.len(), 2);
}

#[tokio::test]
async fn failed_create_leaves_no_booking() {
    let store = InMemoryBookingStore::new();
    let lifecycle = BookingLifecycle::new(BookingKind::Service, store.clone(), stepping_clock())
        .with_retry_policy(fast_retries(3));

    store.fail_next(FailurePoint::EmitNotification);
    assert!(lifecycle.create_booking(fixtures::service_request()).await.is_err());

    assert!(lifecycle.list_bookings(&Default::default()).await.unwrap().is_empty());
    assert!(store.notifications().await.is_empty());
}

#[tokio::test]
async fn retry_recovers_from_transient_failure() {
    let store = InMemoryBookingStore::new();
    let lifecycle = BookingLifecycle::new(BookingKind::Service, store.clone(), stepping_clock())
        .with_retry_policy(fast_retries(2));
    let id = lifecycle.create_booking(fixtures::service_request()).await.unwrap();

    store.fail_times(FailurePoint::Begin, 2);
    lifecycle.assign_provider(id, ADMIN, PROVIDER).await.unwrap();

    assert_eq!(
        lifecycle.get_booking(id).await.unwrap().unwrap().status,
        BookingStatus::Waiting
    );
    // One assignment notification, not one per attempt.
    assert_eq!(store.notifications().await.len(), 2);
}

#[tokio::test]
async fn retries_stop_at_the_limit() {
    let store = InMemoryBookingStore::new();
    let lifecycle = BookingLifecycle::new(BookingKind::Service, store.clone(), stepping_clock())
        .with_retry_policy(fast_retries(1));
    let id = lifecycle.create_booking(fixtures::service_request()).await.unwrap();

    store.fail_times(FailurePoint::ApplyTransition, 2);
    assert!(matches!(
        lifecycle.assign_provider(id, ADMIN, PROVIDER).await,
        Err(BookingError::Persistence(_))
    ));
    assert_eq!(
        lifecycle.get_booking(id).await.unwrap().unwrap().status,
        BookingStatus::Pending
    );
}

/// Counts clock readings; the lifecycle reads the clock once per attempt.
#[derive(Clone, Default)]
struct CountingClock(Arc<AtomicUsize>);

impl Clock for CountingClock {
    fn now(&self) -> DateTime<Utc> {
        self.0.fetch_add(1, Ordering::SeqCst);
        test_clock().now()
    }
}

#[tokio::test]
async fn conflicts_are_never_retried() {
    let clock = CountingClock::default();
    let reads = Arc::clone(&clock.0);
    let lifecycle = BookingLifecycle::new(BookingKind::Service, InMemoryBookingStore::new(), clock)
        .with_retry_policy(fast_retries(5));
    let id = lifecycle.create_booking(fixtures::service_request()).await.unwrap();
    let before = reads.load(Ordering::SeqCst);

    assert!(matches!(
        lifecycle.accept_assignment(id, PROVIDER).await,
        Err(BookingError::StateConflict { .. })
    ));
    assert_eq!(reads.load(Ordering::SeqCst) - before, 1);
}

#[tokio::test]
async fn validation_errors_are_never_retried() {
    let clock = CountingClock::default();
    let reads = Arc::clone(&clock.0);
    let lifecycle = BookingLifecycle::new(BookingKind::Service, InMemoryBookingStore::new(), clock)
        .with_retry_policy(fast_retries(5));
    let id = lifecycle.create_booking(fixtures::service_request()).await.unwrap();
    let before = reads.load(Ordering::SeqCst);

    assert!(lifecycle.cancel(id, Actor::Admin(ADMIN), "").await.is_err());
    assert_eq!(reads.load(Ordering::SeqCst), before);
}
