//! Property tests: arbitrary transition sequences never break the lifecycle invariants.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use homeservice_core::transition::Transition;
use homeservice_core::{BookingError, BookingKind, BookingStatus, UserId};
use homeservice_runtime::BookingLifecycle;
use homeservice_testing::fixtures::{ADMIN, CUSTOMER, OTHER_CUSTOMER, OTHER_PROVIDER, PROVIDER};
use homeservice_testing::properties::{booking_kind, transition};
use homeservice_testing::{InMemoryBookingStore, fixtures, test_clock};
use proptest::prelude::*;

const ADMINS: &[UserId] = &[ADMIN];
const PROVIDERS: &[UserId] = &[PROVIDER, OTHER_PROVIDER];
const CUSTOMERS: &[UserId] = &[CUSTOMER, OTHER_CUSTOMER];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn transition_sequences_preserve_invariants(
        kind in booking_kind(),
        steps in prop::collection::vec(transition(ADMINS, PROVIDERS, CUSTOMERS), 1..24),
    ) {
        tokio_test::block_on(async {
            let store = InMemoryBookingStore::new();
            let lifecycle = BookingLifecycle::new(kind, store.clone(), test_clock());
            let id = lifecycle.create_booking(fixtures::request(kind)).await.unwrap();

            let mut applied = 0_usize;
            let mut ever_accepted = false;

            for step in steps {
                let before = lifecycle.get_booking(id).await.unwrap().unwrap();
                let is_accept = matches!(step, Transition::Accept { .. });

                match lifecycle.apply(id, step).await {
                    Ok(outcome) => {
                        applied += 1;
                        ever_accepted |= is_accept;
                        prop_assert!(!before.status.is_terminal());
                        prop_assert_eq!(outcome.from, before.status);
                        let after = lifecycle.get_booking(id).await.unwrap().unwrap();
                        prop_assert_eq!(after.status, outcome.to);
                        match after.status {
                            BookingStatus::Pending => prop_assert_eq!(after.provider_id, None),
                            BookingStatus::Cancel => {}
                            _ => prop_assert!(after.provider_id.is_some()),
                        }
                        if after.status == BookingStatus::Cancel {
                            prop_assert!(after.cancellation_reason.is_some());
                        }
                    }
                    Err(err) => {
                        let rejected = matches!(
                            err,
                            BookingError::StateConflict { .. } | BookingError::Unsupported { .. }
                        );
                        prop_assert!(rejected, "unexpected error: {}", err);
                        let after = lifecycle.get_booking(id).await.unwrap().unwrap();
                        prop_assert_eq!(after, before);
                    }
                }
            }

            let booking = lifecycle.get_booking(id).await.unwrap().unwrap();
            if kind == BookingKind::Subscription {
                prop_assert_ne!(booking.status, BookingStatus::Request);
                prop_assert_eq!(booking.settled_amount, None);
            }

            // One notification per applied step, plus creation.
            prop_assert_eq!(store.notifications().await.len(), applied + 1);
            // The ledger holds at most one row, and only after an accept.
            let allocations = store.allocations().await;
            prop_assert!(allocations.len() <= 1);
            prop_assert_eq!(!allocations.is_empty(), ever_accepted);
            Ok(())
        })?;
    }
}
