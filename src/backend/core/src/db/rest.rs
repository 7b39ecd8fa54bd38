//! HTTP adapter for a PostgREST-style hosted backend.
//!
//! Data requests go to `{url}/rest/v1/{table}` with filters encoded as query
//! parameters (`col=eq.v`, `col=in.(a,b)`, `or=(a.ilike."*t*",b.ilike."*t*")`).
//! Identity requests go to `{url}/auth/v1/...`. Every request carries the
//! service key; identity resolution additionally carries the caller's token.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{value_text, Condition, DataStore, DbError, Filter, IdentityProvider, Page, Row, Session};
use crate::middleware::auth::{Credential, Identity};

/// Connection settings for [`RestStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestStoreConfig {
    /// Base URL of the backend, without a trailing slash
    pub url: String,

    /// Service key sent as `apikey` on every request
    pub service_key: String,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl RestStoreConfig {
    pub fn new(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service_key: service_key.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// PostgREST-style backend client.
#[derive(Debug, Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    service_key: String,
}

impl RestStore {
    pub fn new(config: RestStoreConfig) -> Result<Self, DbError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    /// Attach the service key as both `apikey` and bearer token.
    fn service(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

/// Encode a filter as PostgREST query parameters.
pub fn filter_params(filter: &Filter) -> Vec<(String, String)> {
    filter
        .conditions()
        .iter()
        .map(|condition| match condition {
            Condition::Eq(column, value) => (column.clone(), format!("eq.{}", value_text(value))),
            Condition::In(column, values) => {
                let items: Vec<String> = values.iter().map(quote_list_item).collect();
                (column.clone(), format!("in.({})", items.join(",")))
            }
            Condition::Search { columns, term } => {
                let pattern = search_pattern(term);
                let clauses: Vec<String> = columns
                    .iter()
                    .map(|column| format!("{}.ilike.{}", column, pattern))
                    .collect();
                ("or".to_string(), format!("({})", clauses.join(",")))
            }
        })
        .collect()
}

/// Quote a search term as a `*term*` pattern.
///
/// `*` is the backend's wildcard and is dropped from the term; the quoting
/// keeps `,` `(` `)` and `.` from being read as filter syntax.
fn search_pattern(term: &str) -> String {
    let escaped: String = term
        .chars()
        .filter(|c| *c != '*')
        .flat_map(|c| match c {
            '"' | '\\' => vec!['\\', c],
            other => vec![other],
        })
        .collect();
    format!("\"*{}*\"", escaped)
}

fn quote_list_item(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
        other => value_text(other),
    }
}

fn page_params(page: Page) -> [(String, String); 2] {
    [
        ("offset".to_string(), page.offset.to_string()),
        ("limit".to_string(), page.limit.to_string()),
    ]
}

/// Fail non-2xx responses with the backend's own message.
async fn check(response: Response) -> Result<Response, DbError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());

    warn!(status = status.as_u16(), %message, "Backend rejected request");
    Err(DbError::Rejected {
        status: status.as_u16(),
        message,
    })
}

async fn rows(response: Response) -> Result<Vec<Row>, DbError> {
    let body: Value = check(response).await?.json().await?;
    match body {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect()),
        Value::Object(row) => Ok(vec![row]),
        other => Err(DbError::Decode(format!("expected rows, got {}", other))),
    }
}

async fn first_row(response: Response) -> Result<Row, DbError> {
    rows(response)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| DbError::Decode("empty representation".to_string()))
}

/// Parse the total out of a `Content-Range: 0-9/42` header.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next().and_then(|total| total.parse().ok())
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Row,
}

impl From<AuthUser> for Identity {
    fn from(user: AuthUser) -> Self {
        Identity {
            id: user.id,
            email: user.email,
            role: None,
            attributes: user.user_metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: u64,
    user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[async_trait]
impl DataStore for RestStore {
    async fn query_one(&self, table: &str, filter: &Filter) -> Result<Option<Row>, DbError> {
        let response = self
            .service(self.client.get(self.table_url(table)))
            .query(&[("select", "*"), ("limit", "1")])
            .query(&filter_params(filter))
            .send()
            .await?;

        Ok(rows(response).await?.into_iter().next())
    }

    async fn query(&self, table: &str, filter: &Filter, page: Option<Page>) -> Result<Vec<Row>, DbError> {
        let mut request = self
            .service(self.client.get(self.table_url(table)))
            .query(&[("select", "*")])
            .query(&filter_params(filter));
        if let Some(page) = page {
            request = request.query(&page_params(page));
        }

        let rows = rows(request.send().await?).await?;
        debug!(table, count = rows.len(), "Queried rows");
        Ok(rows)
    }

    async fn count(&self, table: &str, filter: &Filter) -> Result<u64, DbError> {
        let response = self
            .service(self.client.head(self.table_url(table)))
            .header("Prefer", "count=exact")
            .query(&[("select", "*")])
            .query(&filter_params(filter))
            .send()
            .await?;
        let response = check(response).await?;

        response
            .headers()
            .get("content-range")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| DbError::Decode("missing Content-Range total".to_string()))
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, DbError> {
        let response = self
            .service(self.client.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;

        first_row(response).await
    }

    async fn upsert(&self, table: &str, row: Row, conflict_columns: &[&str]) -> Result<Row, DbError> {
        let mut request = self
            .service(self.client.post(self.table_url(table)))
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&row);
        if !conflict_columns.is_empty() {
            request = request.query(&[("on_conflict", conflict_columns.join(","))]);
        }

        first_row(request.send().await?).await
    }

    async fn update(&self, table: &str, patch: Row, filter: &Filter) -> Result<Vec<Row>, DbError> {
        let response = self
            .service(self.client.patch(self.table_url(table)))
            .header("Prefer", "return=representation")
            .query(&filter_params(filter))
            .json(&patch)
            .send()
            .await?;

        rows(response).await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64, DbError> {
        let response = self
            .service(self.client.delete(self.table_url(table)))
            .header("Prefer", "return=representation")
            .query(&filter_params(filter))
            .send()
            .await?;

        Ok(rows(response).await?.len() as u64)
    }
}

#[async_trait]
impl IdentityProvider for RestStore {
    async fn resolve(&self, credential: &Credential) -> Result<Option<Identity>, DbError> {
        let response = self
            .client
            .get(self.auth_url("user"))
            .header("apikey", &self.service_key)
            .bearer_auth(credential.expose())
            .send()
            .await?;

        match check(response).await {
            Ok(response) => Ok(Some(response.json::<AuthUser>().await?.into())),
            Err(DbError::Rejected { status: 401 | 403 | 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, DbError> {
        let response = self
            .service(self.client.post(self.auth_url("token")))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let token: TokenResponse = check(response).await?.json().await?;
        Ok(Session {
            access_token: token.access_token,
            token_type: token.token_type,
            expires_in: token.expires_in,
            user: token.user.into(),
        })
    }

    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<Identity, DbError> {
        let response = self
            .service(self.client.post(self.auth_url("signup")))
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "full_name": full_name },
            }))
            .send()
            .await?;

        // With auto-confirm the user comes wrapped in a session.
        let body: Value = check(response).await?.json().await?;
        let user = if body.get("user").is_some() {
            body["user"].clone()
        } else {
            body
        };

        Ok(serde_json::from_value::<AuthUser>(user)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_params_encoding() {
        let filter = Filter::new()
            .eq("is_published", true)
            .in_list("lesson_id", ["a", "b"])
            .search(["title", "description"], "rust");

        let params = filter_params(&filter);
        assert_eq!(params[0], ("is_published".to_string(), "eq.true".to_string()));
        assert_eq!(params[1], ("lesson_id".to_string(), "in.(\"a\",\"b\")".to_string()));
        assert_eq!(
            params[2],
            ("or".to_string(), "(title.ilike.\"*rust*\",description.ilike.\"*rust*\")".to_string())
        );
    }

    #[test]
    fn test_search_term_cannot_break_filter_grammar() {
        let filter = Filter::new().search(["title"], "a,b) or(x*");
        let params = filter_params(&filter);
        assert_eq!(params[0], ("or".to_string(), "(title.ilike.\"*a,b) or(x*\")".to_string()));

        let filter = Filter::new().search(["title"], r#"say "hi" \ bye"#);
        let params = filter_params(&filter);
        assert_eq!(params[0].1, r#"(title.ilike."*say \"hi\" \\ bye*")"#);
    }

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("0-9/42"), Some(42));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-9/*"), None);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let store = RestStore::new(RestStoreConfig::new("http://localhost:54321/", "key")).unwrap();
        assert_eq!(store.table_url("courses"), "http://localhost:54321/rest/v1/courses");
        assert_eq!(store.auth_url("user"), "http://localhost:54321/auth/v1/user");
    }
}
