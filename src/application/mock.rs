//! In-memory executor fake used by the application-layer tests.

use crate::domain::error::SqlCacheError;
use crate::domain::model::{Query, QueryKind, QueryValue};
use crate::domain::traits::{ConnectionHandle, StatementExecutor};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct MockState {
    /// Writes visible outside any transaction.
    committed: Vec<String>,
    /// Writes made since `begin`, discarded on rollback.
    pending: Vec<String>,
    in_transaction: bool,
}

/// A scriptable [`StatementExecutor`] with transaction bookkeeping.
///
/// Scalar queries yield a globally increasing counter so tests can tell a
/// fresh execution from a cached value. Non-queries are recorded as either
/// pending or committed depending on transaction state, which is enough to
/// assert rollback behavior without a real database.
pub(crate) struct MockExecutor {
    state: Arc<Mutex<MockState>>,
    fail_on: HashSet<String>,
    delay: Option<Duration>,
    open_failures_left: AtomicUsize,
    counter: Arc<AtomicU64>,
    executions: Arc<AtomicU64>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl MockExecutor {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            fail_on: HashSet::new(),
            delay: None,
            open_failures_left: AtomicUsize::new(0),
            counter: Arc::new(AtomicU64::new(0)),
            executions: Arc::new(AtomicU64::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every execution of the given statement text fails.
    pub(crate) fn fail_on(mut self, text: impl Into<String>) -> Self {
        self.fail_on.insert(text.into());
        self
    }

    /// Each execution holds the connection for this long.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The next `n` calls to `open` fail with a connection error.
    pub(crate) fn fail_open_times(self, n: usize) -> Self {
        self.open_failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Total statements executed, across all connections.
    pub(crate) fn executions(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }

    /// High-water mark of concurrently executing statements.
    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Statements committed so far, in execution order.
    pub(crate) fn committed(&self) -> Vec<String> {
        self.state.lock().committed.clone()
    }
}

struct MockHandle {
    state: Arc<Mutex<MockState>>,
    fail_on: HashSet<String>,
    delay: Option<Duration>,
    counter: Arc<AtomicU64>,
    executions: Arc<AtomicU64>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

#[async_trait]
impl StatementExecutor for MockExecutor {
    async fn open(&self) -> Result<Box<dyn ConnectionHandle>, SqlCacheError> {
        // Atomic decrement so concurrent opens consume exactly one failure
        // each.
        let should_fail = self
            .open_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(SqlCacheError::Connection(
                "mock connection refused".to_string(),
            ));
        }

        Ok(Box::new(MockHandle {
            state: self.state.clone(),
            fail_on: self.fail_on.clone(),
            delay: self.delay,
            counter: self.counter.clone(),
            executions: self.executions.clone(),
            active: self.active.clone(),
            max_active: self.max_active.clone(),
        }))
    }
}

#[async_trait]
impl ConnectionHandle for MockHandle {
    async fn execute(&mut self, query: &Query) -> Result<QueryValue, SqlCacheError> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.fail_on.contains(&query.text) {
            Err(SqlCacheError::Execution(format!(
                "mock failure for \"{}\"",
                query.text
            )))
        } else {
            self.executions.fetch_add(1, Ordering::SeqCst);
            match query.kind {
                QueryKind::NonQuery => {
                    let mut state = self.state.lock();
                    if state.in_transaction {
                        state.pending.push(query.text.clone());
                    } else {
                        state.committed.push(query.text.clone());
                    }
                    Ok(QueryValue::NonQuery(1))
                }
                QueryKind::Scalar => {
                    let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(QueryValue::Scalar(json!(n)))
                }
                QueryKind::Reader => Ok(QueryValue::Rows(Vec::new())),
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn begin(&mut self) -> Result<(), SqlCacheError> {
        self.state.lock().in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlCacheError> {
        let mut state = self.state.lock();
        let pending = std::mem::take(&mut state.pending);
        state.committed.extend(pending);
        state.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlCacheError> {
        let mut state = self.state.lock();
        state.pending.clear();
        state.in_transaction = false;
        Ok(())
    }
}

mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_opens_consume_exactly_the_scripted_failures() {
        let executor = Arc::new(MockExecutor::new().fail_open_times(2));

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let executor = executor.clone();
            tasks.push(tokio::spawn(async move { executor.open().await.is_err() }));
        }

        let mut failures = 0;
        for task in tasks {
            if task.await.unwrap() {
                failures += 1;
            }
        }
        assert_eq!(failures, 2);
    }
}
