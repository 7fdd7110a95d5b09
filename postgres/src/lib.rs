//! `PostgreSQL` storage for the home-service booking engine.
//!
//! Implements the storage traits from `homeservice-core` over a `sqlx`
//! connection pool:
//!
//! - Guarded conditional updates (`UPDATE … RETURNING` the prior row)
//! - Transactions as units of work
//! - An idempotent allocation ledger
//! - Role-scoped notification reads and dismissals
//!
//! # Example
//!
//! ```ignore
//! use homeservice_postgres::{PostgresBookingStore, PostgresConfig};
//! use homeservice_runtime::BookingLifecycle;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = PostgresConfig::from_env().connect().await?;
//!     let store = PostgresBookingStore::new(pool);
//!     store.migrate().await?;
//!     let services = BookingLifecycle::service(store);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
mod rows;
pub mod store;
pub mod unit_of_work;

pub use config::PostgresConfig;
pub use store::PostgresBookingStore;
pub use unit_of_work::PgUnitOfWork;

/// Schema migrations shipped with this crate.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
