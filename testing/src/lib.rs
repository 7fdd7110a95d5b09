//! # Homeservice Testing
//!
//! Testing utilities for the home-service booking engine.
//!
//! This crate provides:
//! - [`InMemoryBookingStore`]: every storage trait, in memory, with fault injection
//! - Deterministic clocks
//! - Fixtures for parties and booking requests
//! - proptest strategies for domain types
//!
//! ## Example
//!
//! ```ignore
//! use homeservice_core::{BookingKind, BookingStatus};
//! use homeservice_runtime::BookingLifecycle;
//! use homeservice_testing::{InMemoryBookingStore, fixtures, test_clock};
//!
//! #[tokio::test]
//! async fn booking_starts_pending() {
//!     let store = InMemoryBookingStore::new();
//!     let lifecycle = BookingLifecycle::new(BookingKind::Service, store, test_clock());
//!
//!     let id = lifecycle.create_booking(fixtures::service_request()).await.unwrap();
//!     let booking = lifecycle.get_booking(id).await.unwrap().unwrap();
//!     assert_eq!(booking.status, BookingStatus::Pending);
//! }
//! ```

use chrono::{DateTime, Utc};
use homeservice_core::environment::Clock;

pub mod fixtures;
pub mod memory;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use homeservice_testing::mocks::FixedClock;
    /// use homeservice_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that moves forward by a fixed step on every reading.
    ///
    /// Gives successive notifications distinct, ordered timestamps.
    #[derive(Debug)]
    pub struct SteppingClock {
        next: Mutex<DateTime<Utc>>,
        step: chrono::Duration,
    }

    impl SteppingClock {
        /// Start at `start`, advancing by `step` per call.
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: chrono::Duration) -> Self {
            Self {
                next: Mutex::new(start),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let mut next = self
                .next
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let now = *next;
            *next = now + self.step;
            now
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Stepping clock starting at the [`test_clock`] time, one second per reading.
    #[must_use]
    pub fn stepping_clock() -> SteppingClock {
        SteppingClock::new(test_clock().now(), chrono::Duration::seconds(1))
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use homeservice_core::transition::{Actor, Transition};
    use homeservice_core::{BookingKind, BookingStatus, Money, UserId};
    use proptest::prelude::*;

    /// Any booking kind.
    pub fn booking_kind() -> impl Strategy<Value = BookingKind> {
        prop::sample::select(BookingKind::ALL.to_vec())
    }

    /// Any booking status.
    pub fn booking_status() -> impl Strategy<Value = BookingStatus> {
        prop::sample::select(BookingStatus::ALL.to_vec())
    }

    /// A user id from a small pool, so generated transitions hit the
    /// fixture parties often enough to pass guards.
    pub fn party(pool: &'static [UserId]) -> impl Strategy<Value = UserId> {
        prop::sample::select(pool.to_vec())
    }

    /// Any actor drawn from the given pools.
    pub fn actor(
        admins: &'static [UserId],
        providers: &'static [UserId],
        customers: &'static [UserId],
    ) -> impl Strategy<Value = Actor> {
        prop_oneof![
            party(admins).prop_map(Actor::Admin),
            party(providers).prop_map(Actor::Provider),
            party(customers).prop_map(Actor::Customer),
        ]
    }

    /// Any transition with parties drawn from the given pools.
    pub fn transition(
        admins: &'static [UserId],
        providers: &'static [UserId],
        customers: &'static [UserId],
    ) -> impl Strategy<Value = Transition> {
        prop_oneof![
            (party(admins), party(providers)).prop_map(|(admin_id, provider_id)| {
                Transition::Assign {
                    admin_id,
                    provider_id,
                }
            }),
            party(providers).prop_map(|provider_id| Transition::Accept { provider_id }),
            party(providers).prop_map(|provider_id| Transition::Decline { provider_id }),
            (party(providers), 1..100_000_u64).prop_map(|(provider_id, cents)| {
                Transition::ReportCompletion {
                    provider_id,
                    settled_amount: Money::from_cents(cents),
                }
            }),
            party(customers).prop_map(|customer_id| Transition::ConfirmCompletion { customer_id }),
            party(providers).prop_map(|provider_id| Transition::CompleteSubscription { provider_id }),
            actor(admins, providers, customers).prop_map(|actor| Transition::Cancel {
                actor,
                reason: "generated".to_string(),
            }),
        ]
    }
}

// Re-export commonly used items
pub use memory::{FailurePoint, InMemoryBookingStore, MemoryUnitOfWork};
pub use mocks::{FixedClock, SteppingClock, stepping_clock, test_clock};

/// Install a `tracing` subscriber for tests, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
