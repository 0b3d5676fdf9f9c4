use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqlCacheError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query execution error: {0}")]
    Execution(String),

    #[error("Callback error: {0}")]
    Callback(#[source] anyhow::Error),

    #[error("Invalid cache capacity: {0} (must be positive when caching is enabled)")]
    InvalidCacheCapacity(i64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}
