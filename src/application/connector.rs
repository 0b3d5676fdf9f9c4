// Facade tying the executor, the cache and the refresh scheduler together.
use crate::application::refresh::RefreshScheduler;
use crate::domain::error::SqlCacheError;
use crate::domain::model::{KeyComparer, Query, QueryOutput, QueryValue};
use crate::domain::traits::{ConnectionHandle, StatementExecutor};
use crate::infrastructure::config::Config;
use crate::infrastructure::storage::cache::{Capacity, QueryCache};
use crate::infrastructure::storage::sqlite::SqliteExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// The crate's main entry point: a cache-aware database access layer.
///
/// Single statements are read through the cache when marked cacheable;
/// batches run inside one transaction and roll back as a unit. When the
/// cache is enabled a background [`RefreshScheduler`] keeps the stored
/// results warm.
pub struct Connector {
    executor: Arc<dyn StatementExecutor>,
    cache: Option<Arc<QueryCache>>,
    scheduler: Option<RefreshScheduler>,
}

impl Connector {
    /// Builds a connector over an arbitrary executor. Opens and drops one
    /// probe connection so an unreachable database fails construction
    /// instead of the first query.
    pub async fn new(
        executor: Arc<dyn StatementExecutor>,
        config: &Config,
    ) -> Result<Self, SqlCacheError> {
        let probe = executor.open().await?;
        drop(probe);

        let (cache, scheduler) = if config.cache.enable {
            let capacity = Capacity::from_config(config.cache.capacity)?;
            let cache = Arc::new(QueryCache::new(capacity, config.cache.comparer));
            let scheduler = RefreshScheduler::start(
                executor.clone(),
                cache.clone(),
                config.cache.refresh_interval(),
            );
            info!(
                "cache enabled, capacity {} refresh every {}ms",
                config.cache.capacity, config.cache.refresh_interval_ms
            );
            (Some(cache), Some(scheduler))
        } else {
            debug!("cache disabled, every query goes to the database");
            (None, None)
        };

        Ok(Self {
            executor,
            cache,
            scheduler,
        })
    }

    /// Convenience constructor wiring up the bundled SQLite executor from
    /// the database section of the config.
    pub async fn open_sqlite(config: &Config) -> Result<Self, SqlCacheError> {
        let executor = Arc::new(SqliteExecutor::new(config.database.path.clone()));
        Self::new(executor, config).await
    }

    /// Executes one statement, reading through the cache when the query is
    /// cacheable. Callbacks fire after execution; on a cache hit they get no
    /// connection handle since nothing was executed.
    pub async fn execute_single(&self, query: &Query) -> Result<QueryOutput, SqlCacheError> {
        if query.should_cache {
            if let Some(cache) = &self.cache {
                if let Some(value) = cache.get(query.cache_key()) {
                    let output = QueryOutput {
                        key: query.cache_key().to_string(),
                        value,
                    };
                    fire_callbacks(query, &output, None).await?;
                    return Ok(output);
                }
            }
        }

        let mut handle = self.executor.open().await?;
        let value = handle.execute(query).await?;
        let output = QueryOutput {
            key: query.cache_key().to_string(),
            value,
        };

        if query.should_cache {
            if let Some(cache) = &self.cache {
                cache.put(query, output.value.clone())?;
            }
        }

        fire_callbacks(query, &output, Some(&mut handle)).await?;
        Ok(output)
    }

    /// Executes the statements inside a single transaction. Each query
    /// follows the same cache-check sequence as [`execute_single`]; cache
    /// hits skip the database but their callbacks still receive the open
    /// transaction handle. Any execution or callback failure rolls the
    /// whole batch back and nothing is committed.
    ///
    /// [`execute_single`]: Connector::execute_single
    pub async fn execute_batch(
        &self,
        queries: &[Query],
    ) -> Result<Vec<QueryOutput>, SqlCacheError> {
        let mut handle = self.executor.open().await?;
        handle.begin().await?;

        let mut outputs = Vec::with_capacity(queries.len());
        for query in queries {
            if query.should_cache {
                if let Some(cache) = &self.cache {
                    if let Some(value) = cache.get(query.cache_key()) {
                        let output = QueryOutput {
                            key: query.cache_key().to_string(),
                            value,
                        };
                        if let Err(e) =
                            fire_callbacks(query, &output, Some(&mut handle)).await
                        {
                            rollback_quietly(handle.as_mut()).await;
                            return Err(e);
                        }
                        outputs.push(output);
                        continue;
                    }
                }
            }

            let value = match handle.execute(query).await {
                Ok(value) => value,
                Err(e) => {
                    rollback_quietly(handle.as_mut()).await;
                    return Err(e);
                }
            };
            let output = QueryOutput {
                key: query.cache_key().to_string(),
                value,
            };

            // Cached results track what the database reported, even when the
            // batch later rolls back; the refresh cycle re-reads the
            // committed state soon after.
            if query.should_cache {
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache.put(query, output.value.clone()) {
                        rollback_quietly(handle.as_mut()).await;
                        return Err(e);
                    }
                }
            }

            if let Err(e) = fire_callbacks(query, &output, Some(&mut handle)).await {
                rollback_quietly(handle.as_mut()).await;
                return Err(e);
            }
            outputs.push(output);
        }

        handle.commit().await?;
        Ok(outputs)
    }

    /// The cached value for a key, if present. Counts as a use.
    pub fn get_cached(&self, key: &str) -> Option<QueryValue> {
        self.cache.as_ref()?.get(key)
    }

    /// Drops one cached entry; returns whether it existed.
    pub fn invalidate(&self, key: &str) -> bool {
        match &self.cache {
            Some(cache) => cache.invalidate(key),
            None => false,
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map(|c| c.len()).unwrap_or(0)
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Changes how often the background refresh runs. No-op when the cache
    /// is disabled.
    pub fn set_refresh_interval(&self, interval: Duration) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.set_interval(interval);
        }
    }

    /// Applies a new capacity and key comparer to the live cache.
    pub fn reconfigure_cache(
        &self,
        capacity: Capacity,
        comparer: KeyComparer,
    ) -> Result<(), SqlCacheError> {
        match &self.cache {
            Some(cache) => {
                cache.reconfigure(capacity, comparer);
                Ok(())
            }
            None => Err(SqlCacheError::Config(
                "cache is disabled, nothing to reconfigure".to_string(),
            )),
        }
    }

    /// Stops the background refresh permanently. Cached values remain
    /// readable but go stale.
    pub fn stop_refresh(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.stop();
        }
    }
}

// Takes the boxed handle so each iteration can hand out a fresh reborrow;
// a bare `&mut dyn` argument would stay borrowed across the whole loop.
async fn fire_callbacks(
    query: &Query,
    output: &QueryOutput,
    mut handle: Option<&mut Box<dyn ConnectionHandle>>,
) -> Result<(), SqlCacheError> {
    for callback in &query.callbacks {
        let conn: Option<&mut dyn ConnectionHandle> = match handle.as_mut() {
            Some(h) => Some(&mut ***h),
            None => None,
        };
        callback
            .on_complete(output, conn)
            .await
            .map_err(SqlCacheError::Callback)?;
    }
    Ok(())
}

/// Rollback on an already-failing path. Its own error is logged and
/// swallowed so the original failure is the one callers see.
async fn rollback_quietly(handle: &mut dyn ConnectionHandle) {
    if let Err(e) = handle.rollback().await {
        tracing::warn!("rollback after failed batch also failed: {}", e);
    }
}
