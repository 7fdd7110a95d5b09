//! Role-scoped notification feed.
//!
//! Reads return the `active` notifications an audience should see, newest
//! first. Dismissals flip only the caller's own visibility flag and are
//! idempotent: dismissing something already hidden is a successful no-op.

use crate::metrics::NotificationMetrics;
use homeservice_core::store::NotificationRepository;
use homeservice_core::{Audience, Notification, NotificationFilter, NotificationId, Result, UserId};

/// Notification reads and dismissals for admins, providers and customers.
#[derive(Debug, Clone)]
pub struct NotificationFeed<S> {
    store: S,
}

impl<S: NotificationRepository> NotificationFeed<S> {
    /// Create a feed over a store.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Active notifications for an audience, newest first.
    ///
    /// `subject` is the provider or customer id; it is ignored for admins.
    ///
    /// # Errors
    ///
    /// - [`homeservice_core::BookingError::Validation`] if a provider or
    ///   customer read has no subject
    /// - persistence errors from the store
    pub async fn list_notifications(
        &self,
        audience: Audience,
        subject: Option<UserId>,
    ) -> Result<Vec<Notification>> {
        let filter = NotificationFilter {
            subject,
            ..NotificationFilter::default()
        };
        self.list_filtered(audience, &filter).await
    }

    /// Active notifications matching a filter, newest first.
    ///
    /// # Errors
    ///
    /// See [`NotificationFeed::list_notifications`].
    pub async fn list_filtered(
        &self,
        audience: Audience,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>> {
        filter.scope(audience)?;
        self.store.list_active(audience, filter).await
    }

    /// Hide one notification for one audience.
    ///
    /// Returns `false` when there was nothing to hide.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn dismiss_notification(&self, id: NotificationId, audience: Audience) -> Result<bool> {
        let hidden = self.store.hide_by_id(id, audience).await?;
        NotificationMetrics::record_dismissed(audience, u64::from(hidden));
        tracing::debug!(notification_id = %id, %audience, hidden, "Notification dismissed");
        Ok(hidden)
    }

    /// Hide the oldest matching active notification.
    ///
    /// # Errors
    ///
    /// See [`NotificationFeed::list_notifications`].
    pub async fn dismiss_oldest(
        &self,
        audience: Audience,
        filter: &NotificationFilter,
    ) -> Result<Option<NotificationId>> {
        filter.scope(audience)?;
        let hidden = self.store.hide_oldest_active(audience, filter).await?;
        NotificationMetrics::record_dismissed(audience, u64::from(hidden.is_some()));
        if let Some(id) = hidden {
            tracing::debug!(notification_id = %id, %audience, "Oldest notification dismissed");
        }
        Ok(hidden)
    }

    /// Hide every matching active notification; returns how many changed.
    ///
    /// # Errors
    ///
    /// See [`NotificationFeed::list_notifications`].
    pub async fn dismiss_all(&self, audience: Audience, filter: &NotificationFilter) -> Result<u64> {
        filter.scope(audience)?;
        let hidden = self.store.hide_all(audience, filter).await?;
        NotificationMetrics::record_dismissed(audience, hidden);
        tracing::debug!(%audience, hidden, "Notifications dismissed");
        Ok(hidden)
    }
}
