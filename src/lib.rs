//! A cache-aware data-access layer over SQLite.
//!
//! The [`Connector`] is the entry point. Queries marked cacheable are read
//! through a bounded in-memory cache whose eviction weighs each entry by
//! age, idle time and how often it was read; a background scheduler
//! re-executes cached statements to keep their results warm. Batches run
//! inside one transaction and roll back as a unit, and completion callbacks
//! can issue follow-up statements over the same transaction.
//!
//! ```no_run
//! use sqlcache::{Config, Connector, Query};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let connector = Connector::open_sqlite(&config).await?;
//!
//! let count = connector
//!     .execute_single(&Query::scalar("SELECT COUNT(*) FROM users").cacheable())
//!     .await?;
//! println!("{:?}", count.value);
//! # Ok(())
//! # }
//! ```

mod application;
mod domain;
mod infrastructure;

pub use application::connector::Connector;
pub use application::refresh::RefreshScheduler;
pub use domain::error::SqlCacheError;
pub use domain::model::{
    Column, KeyComparer, Query, QueryKind, QueryOutput, QueryValue, Row,
};
pub use domain::traits::{ConnectionHandle, FnCallback, QueryCallback, StatementExecutor};
pub use infrastructure::config::{get_config_path, CacheConfig, Config, DatabaseConfig};
pub use infrastructure::storage::cache::{Capacity, QueryCache};
pub use infrastructure::storage::eviction::{EvictionPolicy, WeightedEviction};
pub use infrastructure::storage::sqlite::SqliteExecutor;
