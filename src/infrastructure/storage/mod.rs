pub mod cache;
pub mod eviction;
pub mod sqlite;
