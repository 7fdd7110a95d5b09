//! End-to-end lifecycle scenarios against the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use homeservice_core::{
    Actor, Audience, BookingError, BookingId, BookingKind, BookingQuery, BookingStatus, Money,
    Topic, Visibility,
};
use homeservice_runtime::BookingLifecycle;
use homeservice_testing::fixtures::{ADMIN, CUSTOMER, OTHER_CUSTOMER, OTHER_PROVIDER, PROVIDER};
use homeservice_testing::{InMemoryBookingStore, SteppingClock, fixtures, init_test_tracing, stepping_clock};

type Lifecycle = BookingLifecycle<InMemoryBookingStore, SteppingClock>;

fn lifecycle(kind: BookingKind) -> (InMemoryBookingStore, Lifecycle) {
    init_test_tracing();
    let store = InMemoryBookingStore::new();
    (store.clone(), BookingLifecycle::new(kind, store, stepping_clock()))
}

async fn status(lifecycle: &Lifecycle, id: BookingId) -> BookingStatus {
    lifecycle.get_booking(id).await.unwrap().unwrap().status
}

async fn assigned(lifecycle: &Lifecycle) -> BookingId {
    let id = lifecycle.create_booking(fixtures::request(lifecycle.kind())).await.unwrap();
    lifecycle.assign_provider(id, ADMIN, PROVIDER).await.unwrap();
    id
}

async fn in_process(lifecycle: &Lifecycle) -> BookingId {
    let id = assigned(lifecycle).await;
    lifecycle.accept_assignment(id, PROVIDER).await.unwrap();
    id
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn created_booking_is_pending_and_notifies_admin() {
    let (store, lifecycle) = lifecycle(BookingKind::Service);

    let id = lifecycle.create_booking(fixtures::service_request()).await.unwrap();

    let booking = lifecycle.get_booking(id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.provider_id, None);
    assert_eq!(booking.settled_amount, None);

    let notifications = store.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].description, "New service booking");
    assert_eq!(notifications[0].actor_id, CUSTOMER);
    assert_eq!(notifications[0].visibility.admin, Visibility::Active);
    assert_eq!(notifications[0].visibility.provider, Visibility::None);
    assert_eq!(notifications[0].visibility.customer, Visibility::None);
}

#[tokio::test]
async fn create_rejects_invalid_fields_and_wrong_kind() {
    let (store, lifecycle) = lifecycle(BookingKind::Service);

    let mut blank = fixtures::service_request();
    blank.address = String::new();
    assert!(matches!(
        lifecycle.create_booking(blank).await,
        Err(BookingError::Validation { field: "address", .. })
    ));

    assert!(matches!(
        lifecycle.create_booking(fixtures::subscription_request()).await,
        Err(BookingError::Validation { field: "kind", .. })
    ));

    assert!(store.notifications().await.is_empty());
}

// ============================================================================
// Scenario A: assign, wrong-provider decline, decline
// ============================================================================

#[tokio::test]
async fn scenario_a_decline_by_assignee_returns_to_queue() {
    let (store, lifecycle) = lifecycle(BookingKind::Service);
    let id = assigned(&lifecycle).await;

    let booking = lifecycle.get_booking(id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Waiting);
    assert_eq!(booking.provider_id, Some(PROVIDER));

    let err = lifecycle.decline_assignment(id, OTHER_PROVIDER).await.unwrap_err();
    assert_eq!(
        err,
        BookingError::StateConflict {
            kind: BookingKind::Service,
            booking_id: id,
            transition: "decline",
        }
    );
    assert_eq!(status(&lifecycle, id).await, BookingStatus::Waiting);

    let outcome = lifecycle.decline_assignment(id, PROVIDER).await.unwrap();
    assert_eq!(outcome.from, BookingStatus::Waiting);
    assert_eq!(outcome.to, BookingStatus::Pending);

    let booking = lifecycle.get_booking(id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.provider_id, None);

    let descriptions: Vec<_> = store.notifications().await.into_iter().map(|n| n.description).collect();
    assert_eq!(
        descriptions,
        vec![
            "New service booking",
            "You have a new service request",
            "Service booking is declined",
        ]
    );
}

#[tokio::test]
async fn declined_booking_can_be_reassigned() {
    let (_, lifecycle) = lifecycle(BookingKind::Subscription);
    let id = assigned(&lifecycle).await;
    lifecycle.decline_assignment(id, PROVIDER).await.unwrap();

    lifecycle.assign_provider(id, ADMIN, OTHER_PROVIDER).await.unwrap();
    lifecycle.accept_assignment(id, OTHER_PROVIDER).await.unwrap();

    let allocation = lifecycle.lookup_allocation(id).await.unwrap().unwrap();
    assert_eq!(allocation.provider_id, OTHER_PROVIDER);
}

#[tokio::test]
async fn assign_requires_pending() {
    let (_, lifecycle) = lifecycle(BookingKind::Service);
    let id = assigned(&lifecycle).await;

    assert!(matches!(
        lifecycle.assign_provider(id, ADMIN, OTHER_PROVIDER).await,
        Err(BookingError::StateConflict { transition: "assign", .. })
    ));
}

#[tokio::test]
async fn unknown_booking_is_a_conflict() {
    let (_, lifecycle) = lifecycle(BookingKind::Service);

    assert!(matches!(
        lifecycle.assign_provider(BookingId::new(404), ADMIN, PROVIDER).await,
        Err(BookingError::StateConflict { .. })
    ));
}

// ============================================================================
// Scenario B: accept records exactly one allocation
// ============================================================================

#[tokio::test]
async fn scenario_b_accept_records_one_allocation() {
    let (store, lifecycle) = lifecycle(BookingKind::Service);
    let id = assigned(&lifecycle).await;

    let outcome = lifecycle.accept_assignment(id, PROVIDER).await.unwrap();
    assert_eq!(outcome.to, BookingStatus::Process);

    let allocation = lifecycle.lookup_allocation(id).await.unwrap().unwrap();
    assert_eq!(allocation.provider_id, PROVIDER);
    assert_eq!(allocation.booking.id, id);

    assert!(matches!(
        lifecycle.accept_assignment(id, PROVIDER).await,
        Err(BookingError::StateConflict { transition: "accept", .. })
    ));
    assert_eq!(store.allocations().await.len(), 1);

    let accepted = store
        .notifications()
        .await
        .into_iter()
        .find(|n| n.topic == Topic::Accepted)
        .unwrap();
    assert_eq!(accepted.visibility.admin, Visibility::Active);
    assert_eq!(accepted.visibility.customer, Visibility::Active);
    assert_eq!(accepted.visibility.provider, Visibility::None);
    assert_eq!(accepted.provider_id, Some(PROVIDER));
}

#[tokio::test]
async fn accept_by_non_assignee_is_a_conflict() {
    let (store, lifecycle) = lifecycle(BookingKind::Service);
    let id = assigned(&lifecycle).await;

    assert!(matches!(
        lifecycle.accept_assignment(id, OTHER_PROVIDER).await,
        Err(BookingError::StateConflict { .. })
    ));
    assert_eq!(status(&lifecycle, id).await, BookingStatus::Waiting);
    assert!(store.allocations().await.is_empty());
}

#[tokio::test]
async fn standalone_allocation_is_idempotent() {
    let (store, lifecycle) = lifecycle(BookingKind::Service);
    let id = in_process(&lifecycle).await;
    let accepted = lifecycle.lookup_allocation(id).await.unwrap().unwrap();

    let first = lifecycle.record_allocation(id, PROVIDER).await.unwrap();
    let second = lifecycle.record_allocation(id, PROVIDER).await.unwrap();

    assert_eq!(first, accepted.id);
    assert_eq!(second, accepted.id);
    assert_eq!(store.allocations().await.len(), 1);
}

#[tokio::test]
async fn allocation_cannot_precede_accept() {
    let (store, lifecycle) = lifecycle(BookingKind::Service);
    let id = lifecycle.create_booking(fixtures::service_request()).await.unwrap();

    assert!(matches!(
        lifecycle.record_allocation(id, OTHER_PROVIDER).await,
        Err(BookingError::StateConflict { transition: "record_allocation", .. })
    ));
    lifecycle.assign_provider(id, ADMIN, PROVIDER).await.unwrap();
    assert!(matches!(
        lifecycle.record_allocation(id, PROVIDER).await,
        Err(BookingError::StateConflict { .. })
    ));
    lifecycle.accept_assignment(id, PROVIDER).await.unwrap();

    let booking = lifecycle.get_booking(id).await.unwrap().unwrap();
    let allocation = lifecycle.lookup_allocation(id).await.unwrap().unwrap();
    assert_eq!(booking.provider_id, Some(PROVIDER));
    assert_eq!(allocation.provider_id, PROVIDER);
    assert_eq!(store.allocations().await.len(), 1);
}

#[tokio::test]
async fn allocation_is_refused_to_other_providers() {
    let (store, lifecycle) = lifecycle(BookingKind::Subscription);
    let id = in_process(&lifecycle).await;

    assert!(matches!(
        lifecycle.record_allocation(id, OTHER_PROVIDER).await,
        Err(BookingError::StateConflict { .. })
    ));
    assert!(matches!(
        lifecycle.record_allocation(BookingId::new(404), PROVIDER).await,
        Err(BookingError::StateConflict { .. })
    ));
    assert_eq!(store.allocations().await.len(), 1);
    assert_eq!(store.allocations().await[0].provider_id, PROVIDER);
}

// ============================================================================
// Scenario C: cancel during process
// ============================================================================

#[tokio::test]
async fn scenario_c_customer_cancels_in_process_booking() {
    let (store, lifecycle) = lifecycle(BookingKind::Service);
    let id = in_process(&lifecycle).await;

    let outcome = lifecycle
        .cancel(id, Actor::Customer(CUSTOMER), "Found someone closer")
        .await
        .unwrap();
    assert_eq!(outcome.from, BookingStatus::Process);
    assert_eq!(outcome.to, BookingStatus::Cancel);

    let booking = lifecycle.get_booking(id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Cancel);
    assert_eq!(booking.cancellation_reason.as_deref(), Some("Found someone closer"));

    let last = store.notifications().await.pop().unwrap();
    assert_eq!(last.description, "Service booking is completed");
    assert_eq!(last.actor_id, CUSTOMER);
    for audience in Audience::ALL {
        assert_eq!(last.visibility.get(audience), Visibility::Active);
    }
}

#[tokio::test]
async fn cancel_before_process_notifies_as_canceled() {
    let (store, lifecycle) = lifecycle(BookingKind::Subscription);
    let id = assigned(&lifecycle).await;

    lifecycle.cancel(id, Actor::Admin(ADMIN), "Duplicate request").await.unwrap();

    let last = store.notifications().await.pop().unwrap();
    assert_eq!(last.description, "Subscription booking is canceled");
    assert_eq!(last.visibility.admin, Visibility::Active);
    assert_eq!(last.visibility.provider, Visibility::Active);
    assert_eq!(last.visibility.customer, Visibility::Active);
}

#[tokio::test]
async fn terminal_bookings_cannot_be_cancelled() {
    let (_, lifecycle) = lifecycle(BookingKind::Subscription);
    let id = in_process(&lifecycle).await;
    lifecycle.complete_subscription(id, PROVIDER).await.unwrap();

    assert!(matches!(
        lifecycle.cancel(id, Actor::Admin(ADMIN), "too late").await,
        Err(BookingError::StateConflict { transition: "cancel", .. })
    ));
    assert_eq!(status(&lifecycle, id).await, BookingStatus::Complete);
}

#[tokio::test]
async fn only_stakeholders_can_cancel() {
    let (_, lifecycle) = lifecycle(BookingKind::Service);
    let id = assigned(&lifecycle).await;

    assert!(lifecycle.cancel(id, Actor::Customer(OTHER_CUSTOMER), "not mine").await.is_err());
    assert!(lifecycle.cancel(id, Actor::Provider(OTHER_PROVIDER), "not mine").await.is_err());
    assert_eq!(status(&lifecycle, id).await, BookingStatus::Waiting);

    lifecycle.cancel(id, Actor::Provider(PROVIDER), "Fell ill").await.unwrap();
    assert_eq!(status(&lifecycle, id).await, BookingStatus::Cancel);
}

#[tokio::test]
async fn cancel_requires_a_reason() {
    let (_, lifecycle) = lifecycle(BookingKind::Service);
    let id = lifecycle.create_booking(fixtures::service_request()).await.unwrap();

    assert!(matches!(
        lifecycle.cancel(id, Actor::Customer(CUSTOMER), "   ").await,
        Err(BookingError::Validation { field: "reason", .. })
    ));
    assert_eq!(status(&lifecycle, id).await, BookingStatus::Pending);
}

// ============================================================================
// Scenario D: report and confirm completion
// ============================================================================

#[tokio::test]
async fn scenario_d_report_then_confirm() {
    let (store, lifecycle) = lifecycle(BookingKind::Service);
    let id = in_process(&lifecycle).await;

    assert!(matches!(
        lifecycle.confirm_completion(id, CUSTOMER).await,
        Err(BookingError::StateConflict { transition: "confirm_completion", .. })
    ));

    let settled = Money::checked_from_units(150).unwrap();
    lifecycle.report_completion(id, PROVIDER, settled).await.unwrap();

    let booking = lifecycle.get_booking(id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Request);
    assert_eq!(booking.settled_amount, Some(settled));
    assert_eq!(booking.settled_amount.unwrap().to_string(), "150.00");

    assert!(lifecycle.confirm_completion(id, OTHER_CUSTOMER).await.is_err());
    lifecycle.confirm_completion(id, CUSTOMER).await.unwrap();
    assert_eq!(status(&lifecycle, id).await, BookingStatus::Complete);

    let descriptions: Vec<_> = store
        .notifications()
        .await
        .into_iter()
        .map(|n| n.description)
        .skip(3)
        .collect();
    assert_eq!(
        descriptions,
        vec![
            "Service completion is awaiting confirmation",
            "Service booking is completed",
        ]
    );
}

#[tokio::test]
async fn report_requires_a_positive_amount() {
    let (_, lifecycle) = lifecycle(BookingKind::Service);
    let id = in_process(&lifecycle).await;

    assert!(matches!(
        lifecycle.report_completion(id, PROVIDER, Money::from_cents(0)).await,
        Err(BookingError::Validation { field: "settled_amount", .. })
    ));
    assert_eq!(status(&lifecycle, id).await, BookingStatus::Process);
}

#[tokio::test]
async fn completion_steps_are_bound_to_their_kind() {
    let (_, subscriptions) = lifecycle(BookingKind::Subscription);
    let id = in_process(&subscriptions).await;

    assert_eq!(
        subscriptions.report_completion(id, PROVIDER, Money::from_cents(100)).await,
        Err(BookingError::Unsupported {
            kind: BookingKind::Subscription,
            transition: "report_completion",
        })
    );

    let (_, services) = lifecycle(BookingKind::Service);
    let id = in_process(&services).await;
    assert!(matches!(
        services.complete_subscription(id, PROVIDER).await,
        Err(BookingError::Unsupported { .. })
    ));
}

#[tokio::test]
async fn subscription_completion_notifies_admin_and_customer() {
    let (store, lifecycle) = lifecycle(BookingKind::Subscription);
    let id = in_process(&lifecycle).await;

    lifecycle.complete_subscription(id, PROVIDER).await.unwrap();

    let last = store.notifications().await.pop().unwrap();
    assert_eq!(last.description, "Subscription booking is completed");
    assert_eq!(last.visibility.admin, Visibility::Active);
    assert_eq!(last.visibility.customer, Visibility::Active);
    assert_eq!(last.visibility.provider, Visibility::None);
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn list_filters_by_status_and_party() {
    let (_, lifecycle) = lifecycle(BookingKind::Service);
    let waiting = assigned(&lifecycle).await;
    let pending = lifecycle
        .create_booking(fixtures::request_for(BookingKind::Service, OTHER_CUSTOMER))
        .await
        .unwrap();

    let pending_only = lifecycle
        .list_bookings(&BookingQuery {
            status: Some(BookingStatus::Pending),
            ..BookingQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(pending_only.iter().map(|b| b.id).collect::<Vec<_>>(), vec![pending]);

    let for_provider = lifecycle
        .list_bookings(&BookingQuery {
            provider_id: Some(PROVIDER),
            ..BookingQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(for_provider.iter().map(|b| b.id).collect::<Vec<_>>(), vec![waiting]);

    let newest_first = lifecycle.list_bookings(&BookingQuery::default()).await.unwrap();
    assert_eq!(newest_first.iter().map(|b| b.id).collect::<Vec<_>>(), vec![pending, waiting]);

    let paged = lifecycle
        .list_bookings(&BookingQuery {
            limit: Some(1),
            offset: Some(1),
            ..BookingQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].id, waiting);
}

#[tokio::test]
async fn kinds_do_not_see_each_other() {
    let store = InMemoryBookingStore::new();
    let services = BookingLifecycle::new(BookingKind::Service, store.clone(), stepping_clock());
    let subscriptions = BookingLifecycle::new(BookingKind::Subscription, store, stepping_clock());

    let id = services.create_booking(fixtures::service_request()).await.unwrap();

    assert!(subscriptions.get_booking(id).await.unwrap().is_none());
    assert!(matches!(
        subscriptions.assign_provider(id, ADMIN, PROVIDER).await,
        Err(BookingError::StateConflict { .. })
    ));
}
