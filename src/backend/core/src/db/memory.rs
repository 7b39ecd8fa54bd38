//! In-process backend.
//!
//! Tables are vectors of JSON rows kept in insertion order. Users live in a
//! separate map keyed by email with salted SHA-256 password hashes, and
//! access tokens are random opaque strings that never expire.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use super::{DataStore, DbError, Filter, IdentityProvider, Page, Row, Session};
use crate::middleware::auth::{Credential, Identity};

const TOKEN_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone)]
struct UserRecord {
    id: String,
    email: String,
    full_name: String,
    salt: String,
    password_hash: String,
}

/// In-memory implementation of [`DataStore`] and [`IdentityProvider`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: DashMap<String, Vec<Row>>,
    users: DashMap<String, UserRecord>,
    tokens: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held in `table`.
    pub fn table_len(&self, table: &str) -> usize {
        self.tables.get(table).map(|rows| rows.len()).unwrap_or(0)
    }

    fn identity_for(&self, user_id: &str) -> Option<Identity> {
        self.users
            .iter()
            .find(|user| user.id == user_id)
            .map(|user| to_identity(&user))
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn to_identity(user: &UserRecord) -> Identity {
    let mut attributes = Row::new();
    attributes.insert("full_name".to_string(), Value::String(user.full_name.clone()));

    Identity {
        id: user.id.clone(),
        email: Some(user.email.clone()),
        role: None,
        attributes,
    }
}

fn with_defaults(mut row: Row) -> Row {
    row.entry("id")
        .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
    row.entry("created_at")
        .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
    row
}

fn merge(target: &mut Row, patch: &Row) {
    for (key, value) in patch {
        target.insert(key.clone(), value.clone());
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn query_one(&self, table: &str, filter: &Filter) -> Result<Option<Row>, DbError> {
        Ok(self
            .tables
            .get(table)
            .and_then(|rows| rows.iter().find(|row| filter.matches(row)).cloned()))
    }

    async fn query(&self, table: &str, filter: &Filter, page: Option<Page>) -> Result<Vec<Row>, DbError> {
        let Some(rows) = self.tables.get(table) else {
            return Ok(Vec::new());
        };

        let matching = rows.iter().filter(|row| filter.matches(row)).cloned();
        Ok(match page {
            Some(page) => matching.skip(page.offset).take(page.limit).collect(),
            None => matching.collect(),
        })
    }

    async fn count(&self, table: &str, filter: &Filter) -> Result<u64, DbError> {
        Ok(self
            .tables
            .get(table)
            .map(|rows| rows.iter().filter(|row| filter.matches(row)).count() as u64)
            .unwrap_or(0))
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, DbError> {
        let row = with_defaults(row);
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        debug!(table, "Inserted row");
        Ok(row)
    }

    async fn upsert(&self, table: &str, row: Row, conflict_columns: &[&str]) -> Result<Row, DbError> {
        let mut rows = self.tables.entry(table.to_string()).or_default();

        let existing = rows.iter_mut().find(|candidate| {
            !conflict_columns.is_empty()
                && conflict_columns
                    .iter()
                    .all(|column| candidate.get(*column).is_some() && candidate.get(*column) == row.get(*column))
        });

        if let Some(existing) = existing {
            merge(existing, &row);
            return Ok(existing.clone());
        }

        let row = with_defaults(row);
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, patch: Row, filter: &Filter) -> Result<Vec<Row>, DbError> {
        let Some(mut rows) = self.tables.get_mut(table) else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|row| filter.matches(row)) {
            merge(row, &patch);
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64, DbError> {
        let Some(mut rows) = self.tables.get_mut(table) else {
            return Ok(0);
        };

        let before = rows.len();
        rows.retain(|row| !filter.matches(row));
        Ok((before - rows.len()) as u64)
    }
}

#[async_trait]
impl IdentityProvider for MemoryStore {
    async fn resolve(&self, credential: &Credential) -> Result<Option<Identity>, DbError> {
        let Some(user_id) = self.tokens.get(credential.expose()).map(|id| id.value().clone()) else {
            return Ok(None);
        };
        Ok(self.identity_for(&user_id))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, DbError> {
        let user = self
            .users
            .get(&email.to_lowercase())
            .map(|user| user.value().clone())
            .ok_or(DbError::InvalidCredentials)?;

        if hash_password(&user.salt, password) != user.password_hash {
            return Err(DbError::InvalidCredentials);
        }

        let token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(token.clone(), user.id.clone());

        Ok(Session {
            access_token: token,
            token_type: "bearer".to_string(),
            expires_in: TOKEN_TTL_SECS,
            user: to_identity(&user),
        })
    }

    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<Identity, DbError> {
        let key = email.to_lowercase();
        if self.users.contains_key(&key) {
            return Err(DbError::Rejected {
                status: 422,
                message: "User already registered".to_string(),
            });
        }

        let salt = Uuid::new_v4().simple().to_string();
        let user = UserRecord {
            id: Uuid::new_v4().to_string(),
            email: key.clone(),
            full_name: full_name.to_string(),
            password_hash: hash_password(&salt, password),
            salt,
        };
        let identity = to_identity(&user);
        self.users.insert(key, user);

        Ok(identity)
    }
}
