//! Domain types for the booking engine.
//!
//! Identifiers, money, the booking status vocabulary and the booking and
//! allocation records shared by every storage backend.

use crate::error::{BookingError, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! surrogate_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap a raw database key.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the raw database key.
            #[must_use]
            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

surrogate_id!(
    /// Booking identifier, unique within one [`BookingKind`].
    BookingId
);
surrogate_id!(
    /// Identifier of a user of any role (admin, provider or customer).
    UserId
);
surrogate_id!(
    /// Service category (service bookings) or plan (subscription bookings).
    CategoryId
);
surrogate_id!(
    /// Allocation ledger row identifier.
    AllocationId
);
surrogate_id!(
    /// Notification row identifier.
    NotificationId
);

// ============================================================================
// Money
// ============================================================================

/// Monetary amount in minor units (cents).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole units with overflow checking
    #[must_use]
    pub const fn checked_from_units(units: u64) -> Option<Self> {
        match units.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Convert to the signed representation used by `BIGINT` columns.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] if the amount exceeds `i64::MAX` cents.
    pub fn to_db(self) -> Result<i64> {
        i64::try_from(self.0).map_err(|_| BookingError::validation("amount", "amount is too large"))
    }

    /// Convert from the signed representation used by `BIGINT` columns.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Persistence`] if the stored value is negative.
    pub fn from_db(cents: i64) -> Result<Self> {
        u64::try_from(cents)
            .map(Self)
            .map_err(|_| BookingError::Persistence(format!("negative amount stored: {cents}")))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Booking kind and status
// ============================================================================

/// The two parallel booking entities.
///
/// Both share the status vocabulary and transition rules; only service
/// bookings go through the `request` (awaiting customer confirmation) step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingKind {
    /// One-off service booking
    Service,
    /// Recurring subscription booking
    Subscription,
}

impl BookingKind {
    /// Both kinds, in a stable order.
    pub const ALL: [Self; 2] = [Self::Service, Self::Subscription];

    /// Canonical storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Subscription => "subscription",
        }
    }

    /// Capitalised label used in notification descriptions.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Service => "Service",
            Self::Subscription => "Subscription",
        }
    }

    /// Parse a stored kind.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Persistence`] for anything but the canonical strings.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "service" => Ok(Self::Service),
            "subscription" => Ok(Self::Subscription),
            _ => Err(BookingError::Persistence(format!("Invalid booking kind: {s}"))),
        }
    }
}

impl fmt::Display for BookingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Booking status vocabulary.
///
/// Canonical casing is lowercase and is the only form ever written; parsing
/// is strict so a non-canonical value in storage surfaces as an error instead
/// of being silently normalised.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Created by the customer, waiting for an admin to assign a provider
    Pending,
    /// Assigned to a provider, waiting for their answer
    Waiting,
    /// Accepted by the provider, work in progress
    Process,
    /// Provider reported completion, waiting for customer confirmation (service only)
    Request,
    /// Done
    Complete,
    /// Cancelled
    Cancel,
}

impl BookingStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Waiting,
        Self::Process,
        Self::Request,
        Self::Complete,
        Self::Cancel,
    ];

    /// Statuses from which `cancel` is still possible.
    pub const NON_TERMINAL: [Self; 4] = [Self::Pending, Self::Waiting, Self::Process, Self::Request];

    /// Canonical storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Waiting => "waiting",
            Self::Process => "process",
            Self::Request => "request",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
        }
    }

    /// Parse a stored status.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Persistence`] if the string is not one of the
    /// canonical lowercase statuses.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "waiting" => Ok(Self::Waiting),
            "process" => Ok(Self::Process),
            "request" => Ok(Self::Request),
            "complete" => Ok(Self::Complete),
            "cancel" => Ok(Self::Cancel),
            _ => Err(BookingError::Persistence(format!("Invalid booking status: {s}"))),
        }
    }

    /// `complete` and `cancel` accept no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Cancel)
    }

    /// A provider has accepted the booking and it was not cancelled.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Process | Self::Request | Self::Complete)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Records
// ============================================================================

/// Requested date and time slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Requested day
    pub date: NaiveDate,
    /// Requested time of day
    pub time: NaiveTime,
}

impl Schedule {
    /// Creates a new schedule.
    #[must_use]
    pub const fn new(date: NaiveDate, time: NaiveTime) -> Self {
        Self { date, time }
    }
}

/// A customer's request, before it has been persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    /// Which booking entity to create
    pub kind: BookingKind,
    /// Requesting customer
    pub customer_id: UserId,
    /// Service category or subscription plan
    pub category_id: CategoryId,
    /// Requested slot
    pub schedule: Schedule,
    /// Where the work happens
    pub address: String,
    /// Contact phone
    pub phone: String,
    /// Price quoted at creation
    pub quoted_amount: Money,
}

/// A persisted booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Surrogate key
    pub id: BookingId,
    /// Service or subscription
    pub kind: BookingKind,
    /// Requesting customer
    pub customer_id: UserId,
    /// Assigned provider, `None` until an admin assigns one
    pub provider_id: Option<UserId>,
    /// Service category or subscription plan
    pub category_id: CategoryId,
    /// Requested slot
    pub schedule: Schedule,
    /// Where the work happens
    pub address: String,
    /// Contact phone
    pub phone: String,
    /// Price quoted at creation
    pub quoted_amount: Money,
    /// Final price reported by the provider (service bookings only)
    pub settled_amount: Option<Money>,
    /// Current status
    pub status: BookingStatus,
    /// Set only when the booking was cancelled
    pub cancellation_reason: Option<String>,
    /// When the customer created the booking
    pub created_at: DateTime<Utc>,
    /// Last transition time
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Materialise a freshly inserted booking.
    #[must_use]
    pub fn from_new(id: BookingId, new: NewBooking, at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: new.kind,
            customer_id: new.customer_id,
            provider_id: None,
            category_id: new.category_id,
            schedule: new.schedule,
            address: new.address,
            phone: new.phone,
            quoted_amount: new.quoted_amount,
            settled_amount: None,
            status: BookingStatus::Pending,
            cancellation_reason: None,
            created_at: at,
            updated_at: at,
        }
    }

    /// Reference used by allocations and notifications.
    #[must_use]
    pub const fn reference(&self) -> BookingRef {
        BookingRef::new(self.kind, self.id)
    }
}

/// Typed pointer to a booking of either kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingRef {
    /// Which table the id belongs to
    pub kind: BookingKind,
    /// The booking id
    pub id: BookingId,
}

impl BookingRef {
    /// Creates a new booking reference.
    #[must_use]
    pub const fn new(kind: BookingKind, id: BookingId) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for BookingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.id)
    }
}

/// Immutable record that a provider was matched to and accepted a booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Ledger row id
    pub id: AllocationId,
    /// The allocated booking
    pub booking: BookingRef,
    /// The provider who accepted it
    pub provider_id: UserId,
    /// When the allocation was recorded
    pub allocated_at: DateTime<Utc>,
}

impl Allocation {
    /// Decide a ledger write for `provider_id`.
    ///
    /// `current` is the booking's `(status, provider_id)` read under lock,
    /// `existing` the ledger row's `(id, provider_id)`. Returns the id to
    /// reuse, or `None` when a new row must be inserted.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::StateConflict`] if the booking is missing, has
    /// not been accepted, or was accepted (or allocated) by another provider.
    pub fn admit(
        booking: BookingRef,
        provider_id: UserId,
        current: Option<(BookingStatus, Option<UserId>)>,
        existing: Option<(AllocationId, UserId)>,
    ) -> Result<Option<AllocationId>> {
        let conflict = || BookingError::StateConflict {
            kind: booking.kind,
            booking_id: booking.id,
            transition: "record_allocation",
        };
        let Some((status, assignee)) = current else {
            return Err(conflict());
        };
        match existing {
            Some((id, allocated)) if allocated == provider_id => Ok(Some(id)),
            Some(_) => Err(conflict()),
            None if status.is_accepted() && assignee == Some(provider_id) => Ok(None),
            None => Err(conflict()),
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Filter for listing bookings of one kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookingQuery {
    /// Only bookings in this status
    pub status: Option<BookingStatus>,
    /// Only bookings of this customer
    pub customer_id: Option<UserId>,
    /// Only bookings assigned to this provider
    pub provider_id: Option<UserId>,
    /// Page size (default 100, capped at 500)
    pub limit: Option<i64>,
    /// Rows to skip
    pub offset: Option<i64>,
}

impl BookingQuery {
    /// Default page size.
    pub const DEFAULT_LIMIT: i64 = 100;
    /// Largest page a caller may request.
    pub const MAX_LIMIT: i64 = 500;

    /// Effective `(limit, offset)` after defaults and clamping.
    #[must_use]
    pub fn page(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(0, Self::MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }

    /// Whether a booking passes the filter (paging excluded).
    #[must_use]
    pub fn matches(&self, booking: &Booking) -> bool {
        self.status.is_none_or(|s| booking.status == s)
            && self.customer_id.is_none_or(|c| booking.customer_id == c)
            && self.provider_id.is_none_or(|p| booking.provider_id == Some(p))
    }
}
