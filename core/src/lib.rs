//! # Homeservice Core
//!
//! Domain types, the booking state machine and the storage traits of the
//! home-service booking engine.
//!
//! ## Core Concepts
//!
//! - **Booking**: a customer's request for a service or a subscription visit,
//!   moving through `pending → waiting → process → [request] → complete`
//!   (or `cancel` from any non-terminal status)
//! - **Transition**: one requested status change, carrying its guard, its
//!   column changes and its side effects
//! - **Allocation**: the immutable record that a provider accepted a booking
//! - **Notification**: an audit-trail fact with one visibility flag per audience
//! - **Store**: injected persistence (`BookingRepository` + `UnitOfWork`)
//!
//! ## Architecture Principles
//!
//! - Pure decision, effectful execution: [`transition`] computes what must
//!   change; the runtime crate executes it in one unit of work
//! - Guards are evaluated by storage inside the conditional write, never in a
//!   separate read
//! - No global database handle; every component receives its store
//!
//! ## Example
//!
//! ```
//! use homeservice_core::transition::{PriorState, Transition};
//! use homeservice_core::{BookingStatus, UserId};
//!
//! let accept = Transition::Accept { provider_id: UserId::new(7) };
//! let prior = PriorState {
//!     status: BookingStatus::Waiting,
//!     customer_id: UserId::new(1),
//!     provider_id: Some(UserId::new(7)),
//! };
//!
//! assert_eq!(accept.change().status, BookingStatus::Process);
//! assert_eq!(accept.effects(&prior).len(), 2); // allocation + notification
//! ```

pub mod envelope;
pub mod error;
pub mod notification;
pub mod store;
pub mod transition;
pub mod types;
pub mod validation;

pub use envelope::{Envelope, ErrorBody};
pub use error::{BookingError, Result};
pub use notification::{
    Audience, NewNotification, Notification, NotificationFilter, Topic, Visibility,
    VisibilityFlags,
};
pub use store::{AllocationLedger, BookingRepository, BookingStore, NotificationRepository, UnitOfWork};
pub use transition::{Actor, Effect, Guard, PriorState, StatusChange, Transition, TransitionOutcome};
pub use types::{
    Allocation, AllocationId, Booking, BookingId, BookingKind, BookingQuery, BookingRef,
    BookingStatus, CategoryId, Money, NewBooking, NotificationId, Schedule, UserId,
};

/// Injected dependencies.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Every timestamp the engine writes (`created_at`, `updated_at`,
    /// `allocated_at`) comes from the injected clock.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
