//! Data access for the course platform backend.
//!
//! Handlers never talk to a concrete backend. They go through two traits:
//!
//! - [`DataStore`]: table-oriented reads and writes over JSON rows
//! - [`IdentityProvider`]: credential resolution, sign-in and sign-up
//!
//! Two implementations are provided. [`MemoryStore`] keeps everything in
//! process and backs local development and tests; [`RestStore`] speaks to a
//! PostgREST-style hosted backend over HTTP.

pub mod memory;
pub mod rest;

pub use memory::MemoryStore;
pub use rest::{RestStore, RestStoreConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::middleware::auth::{Credential, Identity};

/// A table row.
pub type Row = serde_json::Map<String, Value>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Data access errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// The backend understood the request and refused it.
    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("backend request failed: {0}")]
    Transport(String),

    #[error("unexpected backend payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for DbError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Filters
// ═══════════════════════════════════════════════════════════════════════════════

/// A single row predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column = value`
    Eq(String, Value),
    /// `column IN (values)`
    In(String, Vec<Value>),
    /// Case-insensitive substring match against any of `columns`.
    Search { columns: Vec<String>, term: String },
}

/// Conjunction of conditions. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(column.into(), value.into()));
        self
    }

    pub fn in_list<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition::In(
            column.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn search<I, S>(mut self, columns: I, term: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conditions.push(Condition::Search {
            columns: columns.into_iter().map(Into::into).collect(),
            term: term.into(),
        });
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Evaluate the filter against an in-memory row.
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Eq(column, value) => row
                .get(column)
                .map(|v| value_text(v) == value_text(value))
                .unwrap_or(false),
            Condition::In(column, values) => row
                .get(column)
                .map(|v| {
                    let text = value_text(v);
                    values.iter().any(|candidate| value_text(candidate) == text)
                })
                .unwrap_or(false),
            Condition::Search { columns, term } => {
                let needle = term.to_lowercase();
                columns.iter().any(|column| {
                    row.get(column)
                        .and_then(Value::as_str)
                        .map(|s| s.to_lowercase().contains(&needle))
                        .unwrap_or(false)
                })
            }
        })
    }
}

/// Render a JSON scalar the way it appears in a query string.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Offset/limit window over a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub const fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, 10)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Traits
// ═══════════════════════════════════════════════════════════════════════════════

/// Table-oriented data access.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// First row matching `filter`, if any.
    async fn query_one(&self, table: &str, filter: &Filter) -> Result<Option<Row>, DbError>;

    /// Rows matching `filter`, optionally windowed.
    async fn query(&self, table: &str, filter: &Filter, page: Option<Page>) -> Result<Vec<Row>, DbError>;

    async fn count(&self, table: &str, filter: &Filter) -> Result<u64, DbError>;

    /// Insert `row` and return it as stored.
    async fn insert(&self, table: &str, row: Row) -> Result<Row, DbError>;

    /// Insert `row`, or merge it into the existing row that agrees with it on
    /// every column in `conflict_columns`.
    async fn upsert(&self, table: &str, row: Row, conflict_columns: &[&str]) -> Result<Row, DbError>;

    /// Merge `patch` into every row matching `filter`; returns the updated rows.
    async fn update(&self, table: &str, patch: Row, filter: &Filter) -> Result<Vec<Row>, DbError>;

    /// Delete every row matching `filter`; returns how many were removed.
    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64, DbError>;
}

/// An authenticated session returned by sign-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: Identity,
}

/// External identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the identity behind a credential. `Ok(None)` when the
    /// credential is unknown or no longer valid.
    async fn resolve(&self, credential: &Credential) -> Result<Option<Identity>, DbError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, DbError>;

    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<Identity, DbError>;
}
