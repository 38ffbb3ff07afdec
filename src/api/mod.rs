//! Backend API surface.
//!
//! Everything the client knows about the managed backend goes through the
//! [`Backend`] trait: table CRUD, RPC calls, object storage, auth and the
//! serverless functions. [`BackendClient`] is the HTTP implementation;
//! tests use an in-memory fake.

mod client;
#[cfg(test)]
pub(crate) mod fake;

pub use client::BackendClient;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use zeroize::Zeroize;

use crate::error::{AppError, AppResult};

// ---------------------------------------------------------------------------
// Query building
// ---------------------------------------------------------------------------

/// A row filter, rendered as a PostgREST operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, String),
    Neq(String, String),
    Gte(String, String),
    Lte(String, String),
    ILike(String, String),
    IsNull(String),
    In(String, Vec<String>),
}

impl Filter {
    pub fn eq(column: &str, value: impl ToString) -> Self {
        Filter::Eq(column.to_string(), value.to_string())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _)
            | Filter::Neq(c, _)
            | Filter::Gte(c, _)
            | Filter::Lte(c, _)
            | Filter::ILike(c, _)
            | Filter::IsNull(c)
            | Filter::In(c, _) => c,
        }
    }

    /// Right-hand side of the query pair, e.g. `eq.42`.
    pub fn operand(&self) -> String {
        match self {
            Filter::Eq(_, v) => format!("eq.{v}"),
            Filter::Neq(_, v) => format!("neq.{v}"),
            Filter::Gte(_, v) => format!("gte.{v}"),
            Filter::Lte(_, v) => format!("lte.{v}"),
            Filter::ILike(_, v) => format!("ilike.*{v}*"),
            Filter::IsNull(_) => "is.null".to_string(),
            Filter::In(_, values) => format!("in.({})", values.join(",")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// A `select` against one relation (table or view).
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub relation: String,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Vec<(String, Order)>,
    pub limit: Option<usize>,
}

impl Select {
    pub fn from(relation: &str) -> Self {
        Self {
            relation: relation.to_string(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn columns(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl ToString) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn order(mut self, column: &str, order: Order) -> Self {
        self.order.push((column.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query pairs in PostgREST syntax.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), self.columns.clone())];
        for f in &self.filters {
            pairs.push((f.column().to_string(), f.operand()));
        }
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|(col, dir)| match dir {
                    Order::Asc => format!("{col}.asc"),
                    Order::Desc => format!("{col}.desc"),
                })
                .collect::<Vec<_>>()
                .join(",");
            pairs.push(("order".to_string(), order));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

// ---------------------------------------------------------------------------
// Auth payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens returned by a password or refresh-token grant.
#[derive(Clone, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("user", &self.user)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl Drop for AuthSession {
    fn drop(&mut self) {
        self.access_token.zeroize();
        self.refresh_token.zeroize();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub content_type: String,
    pub upsert: bool,
}

// ---------------------------------------------------------------------------
// Backend contract
// ---------------------------------------------------------------------------

/// The remote backend as consumed by the client.
///
/// Every method performs exactly one round trip. Backend-side rejections
/// come back as [`AppError::Backend`].
#[async_trait]
pub trait Backend: Send + Sync {
    async fn select(&self, query: &Select) -> AppResult<Vec<Value>>;

    /// Insert one object or an array of objects; returns inserted rows.
    async fn insert(&self, relation: &str, rows: Value) -> AppResult<Vec<Value>>;

    /// Patch every row matching `filters`; returns updated rows.
    async fn update(&self, relation: &str, filters: &[Filter], patch: Value)
        -> AppResult<Vec<Value>>;

    async fn delete(&self, relation: &str, filters: &[Filter]) -> AppResult<()>;

    async fn rpc(&self, function: &str, params: Value) -> AppResult<Value>;

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        options: UploadOptions,
    ) -> AppResult<()>;

    async fn remove(&self, bucket: &str, paths: &[String]) -> AppResult<()>;

    fn public_url(&self, bucket: &str, path: &str) -> String;

    async fn create_signed_url(&self, bucket: &str, path: &str, ttl_secs: u64)
        -> AppResult<String>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<AuthSession>;

    async fn refresh_session(&self, refresh_token: &str) -> AppResult<AuthSession>;

    async fn sign_out(&self) -> AppResult<()>;

    async fn update_password(&self, new_password: &str) -> AppResult<()>;

    async fn get_user(&self) -> AppResult<AuthUser>;

    /// Bearer token used for subsequent calls; `None` reverts to the anon key.
    fn set_access_token(&self, token: Option<String>);

    async fn invoke_function(&self, name: &str, body: Value) -> AppResult<Value>;
}

// ---------------------------------------------------------------------------
// Typed boundary helpers
// ---------------------------------------------------------------------------

/// Run a select and decode every row into `T`.
pub async fn fetch_rows<T: DeserializeOwned>(
    backend: &dyn Backend,
    query: &Select,
) -> AppResult<Vec<T>> {
    let rows = backend.select(query).await?;
    decode_rows(&query.relation, rows)
}

/// Call an RPC whose result is a single JSON value.
pub async fn call_rpc<T: DeserializeOwned>(
    backend: &dyn Backend,
    function: &str,
    params: Value,
) -> AppResult<T> {
    let value = backend.rpc(function, params).await?;
    serde_json::from_value(value).map_err(|e| AppError::decode(function, e))
}

/// Call an RPC that returns a row set. `null` is treated as no rows and a
/// single object as one row.
pub async fn rpc_rows<T: DeserializeOwned>(
    backend: &dyn Backend,
    function: &str,
    params: Value,
) -> AppResult<Vec<T>> {
    match backend.rpc(function, params).await? {
        Value::Null => Ok(Vec::new()),
        Value::Array(rows) => decode_rows(function, rows),
        single => Ok(vec![
            serde_json::from_value(single).map_err(|e| AppError::decode(function, e))?
        ]),
    }
}

fn decode_rows<T: DeserializeOwned>(what: &str, rows: Vec<Value>) -> AppResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(|e| AppError::decode(what, e)))
        .collect()
}
