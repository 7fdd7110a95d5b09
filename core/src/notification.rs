//! Notification fan-out model.
//!
//! A notification is an audit-trail fact, not a push message. Each row carries
//! one visibility flag per [`Audience`] so every role can dismiss its own view
//! without touching the others. Descriptions come from a closed catalog
//! ([`Topic`] × [`BookingKind`]); reads are restricted to the topics relevant
//! to the reading audience.

use crate::error::{BookingError, Result};
use crate::types::{BookingKind, BookingRef, NotificationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three roles a notification can be addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    /// Platform administrator
    Admin,
    /// Service provider
    Provider,
    /// Customer who owns the booking
    Customer,
}

impl Audience {
    /// All audiences.
    pub const ALL: [Self; 3] = [Self::Admin, Self::Provider, Self::Customer];

    /// Canonical name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Provider => "provider",
            Self::Customer => "customer",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-audience visibility of a notification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// The audience was never meant to see this fact
    #[default]
    None,
    /// Visible and unread
    Active,
    /// Dismissed by the audience
    Hidden,
}

impl Visibility {
    /// Canonical storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Active => "active",
            Self::Hidden => "hidden",
        }
    }

    /// Parse a stored flag.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Persistence`] for anything but the canonical strings.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "active" => Ok(Self::Active),
            "hidden" => Ok(Self::Hidden),
            _ => Err(BookingError::Persistence(format!("Invalid visibility: {s}"))),
        }
    }
}

/// The three independent visibility flags of one notification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisibilityFlags {
    /// Admin view
    pub admin: Visibility,
    /// Provider view
    pub provider: Visibility,
    /// Customer view
    pub customer: Visibility,
}

impl VisibilityFlags {
    /// Flags with `active` for the given audiences and `none` for the rest.
    #[must_use]
    pub fn active_for(audiences: &[Audience]) -> Self {
        let mut flags = Self::default();
        for audience in audiences {
            flags.set(*audience, Visibility::Active);
        }
        flags
    }

    /// Flag for one audience.
    #[must_use]
    pub const fn get(&self, audience: Audience) -> Visibility {
        match audience {
            Audience::Admin => self.admin,
            Audience::Provider => self.provider,
            Audience::Customer => self.customer,
        }
    }

    /// Set the flag for one audience.
    pub const fn set(&mut self, audience: Audience, visibility: Visibility) {
        match audience {
            Audience::Admin => self.admin = visibility,
            Audience::Provider => self.provider = visibility,
            Audience::Customer => self.customer = visibility,
        }
    }

    /// Whether any audience starts out seeing the notification.
    #[must_use]
    pub fn any_active(&self) -> bool {
        Audience::ALL.iter().any(|a| self.get(*a) == Visibility::Active)
    }

    /// Initial flags may only be `none` or `active`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] if a flag is `hidden` or no
    /// audience is `active`.
    pub fn validate_initial(&self) -> Result<()> {
        if Audience::ALL.iter().any(|a| self.get(*a) == Visibility::Hidden) {
            return Err(BookingError::validation(
                "visibility",
                "hidden is only set by a dismissal",
            ));
        }
        if !self.any_active() {
            return Err(BookingError::validation(
                "visibility",
                "at least one audience must be active",
            ));
        }
        Ok(())
    }
}

/// Notification catalog entry, independent of booking kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// A customer created a booking
    NewBooking,
    /// An admin assigned the booking to a provider
    NewRequest,
    /// The provider accepted the assignment
    Accepted,
    /// The provider declined the assignment
    Declined,
    /// The provider reported the work done with a final price
    CompletionReported,
    /// The booking is closed out (completed, or cancelled while in progress)
    Completed,
    /// The booking was cancelled before work started
    Canceled,
}

impl Topic {
    /// Every topic.
    pub const ALL: [Self; 7] = [
        Self::NewBooking,
        Self::NewRequest,
        Self::Accepted,
        Self::Declined,
        Self::CompletionReported,
        Self::Completed,
        Self::Canceled,
    ];

    /// Fixed description string stored with the notification.
    #[must_use]
    pub const fn description(&self, kind: BookingKind) -> &'static str {
        match (self, kind) {
            (Self::NewBooking, BookingKind::Service) => "New service booking",
            (Self::NewBooking, BookingKind::Subscription) => "New subscription booking",
            (Self::NewRequest, BookingKind::Service) => "You have a new service request",
            (Self::NewRequest, BookingKind::Subscription) => "You have a new subscription request",
            (Self::Accepted, BookingKind::Service) => "Service booking is accepted",
            (Self::Accepted, BookingKind::Subscription) => "Subscription booking is accepted",
            (Self::Declined, BookingKind::Service) => "Service booking is declined",
            (Self::Declined, BookingKind::Subscription) => "Subscription booking is declined",
            (Self::CompletionReported, BookingKind::Service) => {
                "Service completion is awaiting confirmation"
            }
            (Self::CompletionReported, BookingKind::Subscription) => {
                "Subscription completion is awaiting confirmation"
            }
            (Self::Completed, BookingKind::Service) => "Service booking is completed",
            (Self::Completed, BookingKind::Subscription) => "Subscription booking is completed",
            (Self::Canceled, BookingKind::Service) => "Service booking is canceled",
            (Self::Canceled, BookingKind::Subscription) => "Subscription booking is canceled",
        }
    }

    /// Reverse lookup of a stored description.
    #[must_use]
    pub fn from_description(description: &str) -> Option<(Self, BookingKind)> {
        Self::ALL.into_iter().find_map(|topic| {
            BookingKind::ALL
                .into_iter()
                .find(|kind| topic.description(*kind) == description)
                .map(|kind| (topic, kind))
        })
    }

    /// Whether an audience's feed includes this topic.
    #[must_use]
    pub const fn is_relevant_to(&self, audience: Audience) -> bool {
        match audience {
            Audience::Admin => matches!(
                self,
                Self::NewBooking | Self::Accepted | Self::Declined | Self::Completed | Self::Canceled
            ),
            Audience::Provider => matches!(self, Self::NewRequest | Self::Completed | Self::Canceled),
            Audience::Customer => matches!(
                self,
                Self::Accepted | Self::CompletionReported | Self::Completed | Self::Canceled
            ),
        }
    }

    /// Topics in an audience's feed.
    #[must_use]
    pub fn relevant_to(audience: Audience) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|topic| topic.is_relevant_to(audience))
            .collect()
    }
}

/// A notification row to be written inside a unit of work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    /// Who triggered the transition
    pub actor_id: UserId,
    /// Provider the fact is about, if any
    pub provider_id: Option<UserId>,
    /// Booking the fact is about
    pub booking: BookingRef,
    /// Catalog entry
    pub topic: Topic,
    /// Initial visibility
    pub visibility: VisibilityFlags,
}

impl NewNotification {
    /// Stored description string.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        self.topic.description(self.booking.kind)
    }
}

/// A persisted notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Row id
    pub id: NotificationId,
    /// Who triggered the transition
    pub actor_id: UserId,
    /// Provider the fact is about, if any
    pub provider_id: Option<UserId>,
    /// Booking the fact is about
    pub booking: BookingRef,
    /// Catalog entry
    pub topic: Topic,
    /// Stored description
    pub description: String,
    /// Current visibility
    pub visibility: VisibilityFlags,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Materialise a freshly inserted notification.
    #[must_use]
    pub fn from_new(id: NotificationId, new: &NewNotification, at: DateTime<Utc>) -> Self {
        Self {
            id,
            actor_id: new.actor_id,
            provider_id: new.provider_id,
            booking: new.booking,
            topic: new.topic,
            description: new.description().to_string(),
            visibility: new.visibility,
            created_at: at,
        }
    }
}

/// Selection used by the dismiss operations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    /// Provider id (provider audience) or customer id (customer audience).
    /// Ignored for the admin audience.
    pub subject: Option<UserId>,
    /// Only notifications about this booking kind
    pub kind: Option<BookingKind>,
    /// Only these topics; empty means the audience's whole feed
    pub topics: Vec<Topic>,
}

impl NotificationFilter {
    /// Filter scoped to one subject.
    #[must_use]
    pub fn for_subject(subject: UserId) -> Self {
        Self {
            subject: Some(subject),
            ..Self::default()
        }
    }

    /// Restrict to a booking kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: BookingKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Restrict to the given topics.
    #[must_use]
    pub fn with_topics(mut self, topics: impl IntoIterator<Item = Topic>) -> Self {
        self.topics = topics.into_iter().collect();
        self
    }

    /// Subject the rows must belong to; `None` for the admin audience.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] if a provider or customer read has
    /// no subject, which would otherwise expose every party's rows.
    pub fn scope(&self, audience: Audience) -> Result<Option<UserId>> {
        match audience {
            Audience::Admin => Ok(None),
            Audience::Provider | Audience::Customer => self.subject.map(Some).ok_or_else(|| {
                BookingError::validation("subject", format!("required for the {audience} audience"))
            }),
        }
    }

    /// Descriptions this filter selects for an audience, always intersected
    /// with the audience's feed.
    #[must_use]
    pub fn descriptions(&self, audience: Audience) -> Vec<&'static str> {
        let topics = if self.topics.is_empty() {
            Topic::relevant_to(audience)
        } else {
            self.topics
                .iter()
                .copied()
                .filter(|t| t.is_relevant_to(audience))
                .collect()
        };
        let kinds: &[BookingKind] = match &self.kind {
            Some(kind) => std::slice::from_ref(kind),
            None => &BookingKind::ALL,
        };
        topics
            .iter()
            .flat_map(|topic| kinds.iter().map(|kind| topic.description(*kind)))
            .collect()
    }
}
