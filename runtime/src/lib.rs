//! # Homeservice Runtime
//!
//! Executes booking transitions against an injected store.
//!
//! ## Core Components
//!
//! - **`BookingLifecycle`**: runs each transition as one unit of work (guarded
//!   update, allocation, notifications, commit)
//! - **`NotificationFeed`**: role-scoped notification reads and dismissals
//! - **Retry**: optional bounded retry of storage failures
//! - **Metrics**: counters and histograms through the `metrics` facade
//!
//! ## Example
//!
//! ```ignore
//! use homeservice_runtime::BookingLifecycle;
//!
//! let lifecycle = BookingLifecycle::service(store);
//!
//! let id = lifecycle.create_booking(request).await?;
//! lifecycle.assign_provider(id, admin_id, provider_id).await?;
//! lifecycle.accept_assignment(id, provider_id).await?;
//!
//! let inbox = lifecycle
//!     .feed()
//!     .list_notifications(Audience::Customer, Some(customer_id))
//!     .await?;
//! ```

/// Lifecycle configuration from the environment
pub mod config;

/// Role-scoped notification feed
pub mod feed;

/// Transition executor
pub mod lifecycle;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

pub use config::LifecycleConfig;
pub use feed::NotificationFeed;
pub use lifecycle::BookingLifecycle;
pub use retry::RetryPolicy;
