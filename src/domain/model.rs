use crate::domain::traits::QueryCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What the statement returns when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// INSERT/UPDATE/DELETE/DDL; yields an affected-row count.
    NonQuery,
    /// First column of the first row, or null when there are no rows.
    Scalar,
    /// The full row set.
    Reader,
}

/// A single column of a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub value: serde_json::Value,
}

/// One row of a Reader result, columns in select order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub columns: Vec<Column>,
}

impl Row {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Looks a column up by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| &c.value)
    }
}

/// The result of executing a statement, tagged by the query kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
    NonQuery(i64),
    Scalar(serde_json::Value),
    Rows(Vec<Row>),
}

impl QueryValue {
    pub fn rows_affected(&self) -> Option<i64> {
        match self {
            Self::NonQuery(n) => Some(*n),
            _ => None,
        }
    }

    pub fn scalar(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            Self::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

/// A completed execution handed to callbacks and returned to callers.
#[derive(Debug, Clone)]
pub struct QueryOutput {
    /// The resolved cache key of the query (its text when no key was set).
    pub key: String,
    pub value: QueryValue,
}

/// A keyed, parameterized statement plus its execution options.
#[derive(Clone)]
pub struct Query {
    /// Explicit cache identity; falls back to the statement text.
    pub key: Option<String>,
    pub text: String,
    pub kind: QueryKind,
    pub should_cache: bool,
    pub parameters: Vec<serde_json::Value>,
    pub callbacks: Vec<Arc<dyn QueryCallback>>,
}

impl Query {
    pub fn new(text: impl Into<String>, kind: QueryKind) -> Self {
        Self {
            key: None,
            text: text.into(),
            kind,
            should_cache: false,
            parameters: Vec::new(),
            callbacks: Vec::new(),
        }
    }

    pub fn non_query(text: impl Into<String>) -> Self {
        Self::new(text, QueryKind::NonQuery)
    }

    pub fn scalar(text: impl Into<String>) -> Self {
        Self::new(text, QueryKind::Scalar)
    }

    pub fn reader(text: impl Into<String>) -> Self {
        Self::new(text, QueryKind::Reader)
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn cacheable(mut self) -> Self {
        self.should_cache = true;
        self
    }

    pub fn param(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.push(value.into());
        self
    }

    pub fn on_complete<C: QueryCallback + 'static>(mut self, callback: C) -> Self {
        self.callbacks.push(Arc::new(callback));
        self
    }

    /// The identity this query caches under.
    pub fn cache_key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.text)
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("key", &self.key)
            .field("text", &self.text)
            .field("kind", &self.kind)
            .field("should_cache", &self.should_cache)
            .field("parameters", &self.parameters)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// How cache keys compare for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyComparer {
    Exact,
    /// ASCII case-insensitive, the historical default for SQL text keys.
    #[default]
    IgnoreCase,
}

impl KeyComparer {
    pub fn normalize(&self, key: &str) -> String {
        match self {
            Self::Exact => key.to_string(),
            Self::IgnoreCase => key.to_ascii_lowercase(),
        }
    }
}
