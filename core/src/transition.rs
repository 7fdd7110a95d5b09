//! The booking state machine.
//!
//! Every status change is a [`Transition`] variant. A variant knows three
//! things and nothing else:
//!
//! - its [`Guard`]: the statuses (and party) the booking must currently have,
//!   which storage repeats in the predicate of the conditional update;
//! - its [`StatusChange`]: the columns the conditional update writes;
//! - its [`Effect`]s: allocation and notification rows written in the same
//!   unit of work, computed from the row as it was before the update.
//!
//! ```text
//! pending ──assign──▶ waiting ──accept──▶ process ──report──▶ request ──confirm──▶ complete
//!    ▲                   │                   │ (subscription: complete_subscription)    ▲
//!    └─────decline───────┘                   └───────────────────────────────────────────┘
//!
//! any non-terminal ──cancel──▶ cancel
//! ```
//!
//! This module is pure: no I/O, no clock. Executing a transition is the
//! runtime's job.

use crate::error::{BookingError, Result};
use crate::notification::{Audience, NewNotification, Topic, VisibilityFlags};
use crate::types::{Booking, BookingKind, BookingRef, BookingStatus, Money, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

/// Longest accepted cancellation reason, in characters.
pub const MAX_REASON_LEN: usize = 500;

/// Who is acting, as established by the (external) authentication layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "lowercase")]
pub enum Actor {
    /// Platform administrator
    Admin(UserId),
    /// Service provider
    Provider(UserId),
    /// Customer
    Customer(UserId),
}

impl Actor {
    /// User id of the actor.
    #[must_use]
    pub const fn id(&self) -> UserId {
        match self {
            Self::Admin(id) | Self::Provider(id) | Self::Customer(id) => *id,
        }
    }

    /// Audience the actor belongs to.
    #[must_use]
    pub const fn audience(&self) -> Audience {
        match self {
            Self::Admin(_) => Audience::Admin,
            Self::Provider(_) => Audience::Provider,
            Self::Customer(_) => Audience::Customer,
        }
    }
}

/// A requested status change of an existing booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Transition {
    /// Admin hands a pending booking to a provider.
    Assign {
        /// Admin performing the assignment
        admin_id: UserId,
        /// Provider receiving the request
        provider_id: UserId,
    },
    /// Assigned provider accepts.
    Accept {
        /// Must be the assigned provider
        provider_id: UserId,
    },
    /// Assigned provider declines; the booking returns to the admin queue.
    Decline {
        /// Must be the assigned provider
        provider_id: UserId,
    },
    /// Provider reports the work done with the final price (service only).
    ReportCompletion {
        /// Must be the assigned provider
        provider_id: UserId,
        /// Final price
        settled_amount: Money,
    },
    /// Customer confirms the reported completion (service only).
    ConfirmCompletion {
        /// Must own the booking
        customer_id: UserId,
    },
    /// Provider closes an in-progress subscription booking (subscription only).
    CompleteSubscription {
        /// Must be the assigned provider
        provider_id: UserId,
    },
    /// Anyone with a stake cancels a non-terminal booking.
    Cancel {
        /// Who cancels; customers must own the booking, providers must be assigned
        actor: Actor,
        /// Free-text reason
        reason: String,
    },
}

/// What the provider column becomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderUpdate {
    /// Leave as is
    Keep,
    /// Assign this provider
    Set(UserId),
    /// Unassign
    Clear,
}

/// Precondition repeated in the conditional update's predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Guard {
    /// The booking must currently be in one of these statuses
    pub expected: &'static [BookingStatus],
    /// The booking's provider must be this user
    pub assignee: Option<UserId>,
    /// The booking's customer must be this user
    pub customer: Option<UserId>,
}

impl Guard {
    /// Evaluate the guard against a row.
    #[must_use]
    pub fn admits(&self, booking: &Booking) -> bool {
        self.expected.contains(&booking.status)
            && self.assignee.is_none_or(|p| booking.provider_id == Some(p))
            && self.customer.is_none_or(|c| booking.customer_id == c)
    }

    /// Expected statuses as canonical strings, for SQL array binds.
    #[must_use]
    pub fn expected_strs(&self) -> Vec<&'static str> {
        self.expected.iter().map(BookingStatus::as_str).collect()
    }
}

/// Columns written by a successful conditional update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusChange {
    /// New status
    pub status: BookingStatus,
    /// Provider column update
    pub provider: ProviderUpdate,
    /// Settled amount to record, if any
    pub settled_amount: Option<Money>,
    /// Cancellation reason to record, if any
    pub cancellation_reason: Option<String>,
}

impl StatusChange {
    const fn to(status: BookingStatus) -> Self {
        Self {
            status,
            provider: ProviderUpdate::Keep,
            settled_amount: None,
            cancellation_reason: None,
        }
    }

    /// Apply the change to an in-memory row.
    pub fn apply(&self, booking: &mut Booking, at: DateTime<Utc>) {
        booking.status = self.status;
        match self.provider {
            ProviderUpdate::Keep => {}
            ProviderUpdate::Set(provider) => booking.provider_id = Some(provider),
            ProviderUpdate::Clear => booking.provider_id = None,
        }
        if let Some(amount) = self.settled_amount {
            booking.settled_amount = Some(amount);
        }
        if let Some(reason) = &self.cancellation_reason {
            booking.cancellation_reason = Some(reason.clone());
        }
        booking.updated_at = at;
    }
}

/// The row as it was immediately before a successful conditional update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriorState {
    /// Status before the update
    pub status: BookingStatus,
    /// Owning customer
    pub customer_id: UserId,
    /// Provider before the update
    pub provider_id: Option<UserId>,
}

impl From<&Booking> for PriorState {
    fn from(booking: &Booking) -> Self {
        Self {
            status: booking.status,
            customer_id: booking.customer_id,
            provider_id: booking.provider_id,
        }
    }
}

/// Result of an applied transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    /// The booking that moved
    pub booking: BookingRef,
    /// Status before
    pub from: BookingStatus,
    /// Status after
    pub to: BookingStatus,
}

/// Side effect written in the same unit of work as the status change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Append to the allocation ledger (idempotent per booking).
    RecordAllocation {
        /// Provider being allocated
        provider_id: UserId,
    },
    /// Write one notification row.
    Notify {
        /// Catalog entry
        topic: Topic,
        /// Provider the fact is about
        provider_id: Option<UserId>,
        /// Audiences that start with `active`
        audiences: SmallVec<[Audience; 3]>,
    },
}

impl Effect {
    /// Notification row for a `Notify` effect.
    #[must_use]
    pub fn notification(&self, actor_id: UserId, booking: BookingRef) -> Option<NewNotification> {
        match self {
            Self::RecordAllocation { .. } => None,
            Self::Notify {
                topic,
                provider_id,
                audiences,
            } => Some(NewNotification {
                actor_id,
                provider_id: *provider_id,
                booking,
                topic: *topic,
                visibility: VisibilityFlags::active_for(audiences),
            }),
        }
    }
}

impl Effect {
    /// Effect of creating a booking: the admin queue learns about it.
    #[must_use]
    pub fn booking_created() -> Self {
        Self::Notify {
            topic: Topic::NewBooking,
            provider_id: None,
            audiences: smallvec![Audience::Admin],
        }
    }
}

impl Transition {
    /// Stable transition name, used in errors, logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Assign { .. } => "assign",
            Self::Accept { .. } => "accept",
            Self::Decline { .. } => "decline",
            Self::ReportCompletion { .. } => "report_completion",
            Self::ConfirmCompletion { .. } => "confirm_completion",
            Self::CompleteSubscription { .. } => "complete_subscription",
            Self::Cancel { .. } => "cancel",
        }
    }

    /// Whether the transition exists for a booking kind.
    #[must_use]
    pub const fn supports(&self, kind: BookingKind) -> bool {
        match self {
            Self::ReportCompletion { .. } | Self::ConfirmCompletion { .. } => {
                matches!(kind, BookingKind::Service)
            }
            Self::CompleteSubscription { .. } => matches!(kind, BookingKind::Subscription),
            Self::Assign { .. } | Self::Accept { .. } | Self::Decline { .. } | Self::Cancel { .. } => {
                true
            }
        }
    }

    /// User recorded as the actor of the resulting notifications.
    #[must_use]
    pub const fn actor_id(&self) -> UserId {
        match self {
            Self::Assign { admin_id, .. } => *admin_id,
            Self::Accept { provider_id }
            | Self::Decline { provider_id }
            | Self::ReportCompletion { provider_id, .. }
            | Self::CompleteSubscription { provider_id } => *provider_id,
            Self::ConfirmCompletion { customer_id } => *customer_id,
            Self::Cancel { actor, .. } => actor.id(),
        }
    }

    /// Check the parameters carried by the transition.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] for a zero settled amount or an
    /// empty or oversized cancellation reason.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::ReportCompletion { settled_amount, .. } if settled_amount.is_zero() => Err(
                BookingError::validation("settled_amount", "must be greater than zero"),
            ),
            Self::Cancel { reason, .. } if reason.trim().is_empty() => {
                Err(BookingError::validation("reason", "must not be empty"))
            }
            Self::Cancel { reason, .. } if reason.chars().count() > MAX_REASON_LEN => Err(
                BookingError::validation("reason", format!("must be at most {MAX_REASON_LEN} characters")),
            ),
            _ => Ok(()),
        }
    }

    /// Precondition for the conditional update.
    #[must_use]
    pub fn guard(&self) -> Guard {
        const PENDING: &[BookingStatus] = &[BookingStatus::Pending];
        const WAITING: &[BookingStatus] = &[BookingStatus::Waiting];
        const PROCESS: &[BookingStatus] = &[BookingStatus::Process];
        const REQUEST: &[BookingStatus] = &[BookingStatus::Request];

        let unrestricted = |expected: &'static [BookingStatus]| Guard {
            expected,
            assignee: None,
            customer: None,
        };
        let assignee = |expected: &'static [BookingStatus], provider_id: UserId| Guard {
            expected,
            assignee: Some(provider_id),
            customer: None,
        };

        match self {
            Self::Assign { .. } => unrestricted(PENDING),
            Self::Accept { provider_id } | Self::Decline { provider_id } => {
                assignee(WAITING, *provider_id)
            }
            Self::ReportCompletion { provider_id, .. } | Self::CompleteSubscription { provider_id } => {
                assignee(PROCESS, *provider_id)
            }
            Self::ConfirmCompletion { customer_id } => Guard {
                expected: REQUEST,
                assignee: None,
                customer: Some(*customer_id),
            },
            Self::Cancel { actor, .. } => match actor {
                Actor::Admin(_) => unrestricted(&BookingStatus::NON_TERMINAL),
                Actor::Provider(id) => assignee(&BookingStatus::NON_TERMINAL, *id),
                Actor::Customer(id) => Guard {
                    expected: &BookingStatus::NON_TERMINAL,
                    assignee: None,
                    customer: Some(*id),
                },
            },
        }
    }

    /// Columns written when the guard holds.
    #[must_use]
    pub fn change(&self) -> StatusChange {
        match self {
            Self::Assign { provider_id, .. } => StatusChange {
                provider: ProviderUpdate::Set(*provider_id),
                ..StatusChange::to(BookingStatus::Waiting)
            },
            Self::Accept { .. } => StatusChange::to(BookingStatus::Process),
            Self::Decline { .. } => StatusChange {
                provider: ProviderUpdate::Clear,
                ..StatusChange::to(BookingStatus::Pending)
            },
            Self::ReportCompletion { settled_amount, .. } => StatusChange {
                settled_amount: Some(*settled_amount),
                ..StatusChange::to(BookingStatus::Request)
            },
            Self::ConfirmCompletion { .. } | Self::CompleteSubscription { .. } => {
                StatusChange::to(BookingStatus::Complete)
            }
            Self::Cancel { reason, .. } => StatusChange {
                cancellation_reason: Some(reason.trim().to_string()),
                ..StatusChange::to(BookingStatus::Cancel)
            },
        }
    }

    /// Side effects of an applied transition, given the row before the update.
    #[must_use]
    pub fn effects(&self, prior: &PriorState) -> SmallVec<[Effect; 2]> {
        let notify = |topic, provider_id, audiences: &[Audience]| Effect::Notify {
            topic,
            provider_id,
            audiences: audiences.iter().copied().collect(),
        };

        match self {
            Self::Assign { provider_id, .. } => {
                smallvec![notify(Topic::NewRequest, Some(*provider_id), &[Audience::Provider])]
            }
            Self::Accept { provider_id } => smallvec![
                Effect::RecordAllocation {
                    provider_id: *provider_id
                },
                notify(
                    Topic::Accepted,
                    Some(*provider_id),
                    &[Audience::Admin, Audience::Customer]
                ),
            ],
            Self::Decline { provider_id } => {
                smallvec![notify(Topic::Declined, Some(*provider_id), &[Audience::Admin])]
            }
            Self::ReportCompletion { provider_id, .. } => smallvec![notify(
                Topic::CompletionReported,
                Some(*provider_id),
                &[Audience::Customer]
            )],
            Self::ConfirmCompletion { .. } => smallvec![notify(
                Topic::Completed,
                prior.provider_id,
                &[Audience::Admin, Audience::Provider]
            )],
            Self::CompleteSubscription { provider_id } => smallvec![notify(
                Topic::Completed,
                Some(*provider_id),
                &[Audience::Admin, Audience::Customer]
            )],
            Self::Cancel { actor, .. } => {
                if prior.status == BookingStatus::Process {
                    // Closes out the in-progress views of all three parties.
                    return smallvec![notify(Topic::Completed, prior.provider_id, &Audience::ALL)];
                }
                let mut audiences: SmallVec<[Audience; 3]> = smallvec![Audience::Admin];
                if prior.provider_id.is_some() {
                    audiences.push(Audience::Provider);
                }
                if !matches!(actor, Actor::Customer(_)) {
                    audiences.push(Audience::Customer);
                }
                smallvec![Effect::Notify {
                    topic: Topic::Canceled,
                    provider_id: prior.provider_id,
                    audiences,
                }]
            }
        }
    }
}
