//! In-memory [`Backend`] used by unit tests.
//!
//! Tables are plain JSON rows, RPCs are closures over the table map, and
//! every call is recorded so tests can assert what went over the "wire".

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::{AuthSession, AuthUser, Backend, Filter, Order, Select, UploadOptions};
use crate::error::{AppError, AppResult};

pub(crate) type Tables = HashMap<String, Vec<Value>>;
type RpcHandler = Box<dyn Fn(&mut Tables, &Value) -> AppResult<Value> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Select(String),
    Insert(String, Value),
    Update(String, Vec<Filter>, Value),
    Delete(String, Vec<Filter>),
    Rpc(String, Value),
    Upload {
        bucket: String,
        path: String,
        size: usize,
        content_type: String,
    },
    Remove(String, Vec<String>),
    SignedUrl(String, String, u64),
    SignIn(String),
    Refresh,
    SignOut,
    UpdatePassword,
    GetUser,
    Invoke(String, Value),
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    tables: Mutex<Tables>,
    rpcs: Mutex<HashMap<String, RpcHandler>>,
    failures: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<Call>>,
    select_delays: Mutex<VecDeque<Duration>>,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    accounts: Mutex<HashMap<String, (String, String)>>,
    access_token: Mutex<Option<String>>,
    session_ttl: Mutex<Option<i64>>,
    next_id: Mutex<i64>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self {
            next_id: Mutex::new(1),
            ..Self::default()
        }
    }

    pub(crate) fn with_table(self, relation: &str, rows: Vec<Value>) -> Self {
        self.tables
            .lock()
            .unwrap()
            .insert(relation.to_string(), rows);
        self
    }

    pub(crate) fn set_table(&self, relation: &str, rows: Vec<Value>) {
        self.tables
            .lock()
            .unwrap()
            .insert(relation.to_string(), rows);
    }

    pub(crate) fn table(&self, relation: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(relation)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn on_rpc<F>(&self, function: &str, handler: F)
    where
        F: Fn(&mut Tables, &Value) -> AppResult<Value> + Send + Sync + 'static,
    {
        self.rpcs
            .lock()
            .unwrap()
            .insert(function.to_string(), Box::new(handler));
    }

    /// Every subsequent call keyed by `key` (relation, function,
    /// `storage:{bucket}` or `auth`) is rejected with `message` until [`Self::recover`].
    pub(crate) fn fail(&self, key: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(key.to_string(), message.to_string());
    }

    pub(crate) fn recover(&self, key: &str) {
        self.failures.lock().unwrap().remove(key);
    }

    /// Lifetime of the sessions handed out from now on, in seconds.
    /// Defaults to one hour; negative values issue already expired sessions.
    pub(crate) fn set_session_ttl(&self, secs: i64) {
        *self.session_ttl.lock().unwrap() = Some(secs);
    }

    pub(crate) fn delay_selects(&self, delays: Vec<Duration>) {
        *self.select_delays.lock().unwrap() = delays.into();
    }

    pub(crate) fn add_account(&self, email: &str, password: &str, user_id: &str) {
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            (password.to_string(), user_id.to_string()),
        );
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub(crate) fn count_calls(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|&c| pred(c)).count()
    }

    pub(crate) fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&format!("{bucket}/{path}"))
            .cloned()
    }

    pub(crate) fn current_token(&self) -> Option<String> {
        self.access_token.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, key: &str) -> AppResult<()> {
        match self.failures.lock().unwrap().get(key) {
            Some(message) => Err(AppError::Backend {
                status: 400,
                code: Some("P0001".into()),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn allocate_id(&self) -> i64 {
        let mut next = self.next_id.lock().unwrap();
        let id = *next;
        *next += 1;
        id
    }

    fn session_for(&self, user_id: &str, email: &str) -> AuthSession {
        AuthSession {
            access_token: format!("access-{user_id}"),
            refresh_token: format!("refresh-{user_id}"),
            expires_at: Some(
                chrono::Utc::now().timestamp() + self.session_ttl.lock().unwrap().unwrap_or(3600),
            ),
            user: AuthUser {
                id: user_id.to_string(),
                email: Some(email.to_string()),
            },
        }
    }
}

pub(crate) fn value_matches(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        Value::Number(n) => {
            n.to_string() == expected
                || matches!((n.as_f64(), expected.parse::<f64>()), (Some(a), Ok(b)) if a == b)
        }
        Value::Bool(b) => b.to_string() == expected,
        Value::Null => expected == "null",
        _ => false,
    }
}

fn row_matches(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|f| {
        let field = row.get(f.column()).unwrap_or(&Value::Null);
        match f {
            Filter::Eq(_, v) => value_matches(field, v),
            Filter::Neq(_, v) => !value_matches(field, v),
            Filter::IsNull(_) => field.is_null(),
            Filter::In(_, values) => values.iter().any(|v| value_matches(field, v)),
            Filter::ILike(_, v) => field
                .as_str()
                .map(|s| s.to_lowercase().contains(&v.to_lowercase()))
                .unwrap_or(false),
            Filter::Gte(_, v) => compare_field(field, v).is_some_and(|o| o.is_ge()),
            Filter::Lte(_, v) => compare_field(field, v).is_some_and(|o| o.is_le()),
        }
    })
}

fn compare_field(field: &Value, other: &str) -> Option<std::cmp::Ordering> {
    match field {
        Value::Number(n) => n.as_f64()?.partial_cmp(&other.parse::<f64>().ok()?),
        Value::String(s) => Some(s.as_str().cmp(other)),
        _ => None,
    }
}

fn sort_key(row: &Value, column: &str) -> String {
    match row.get(column) {
        Some(Value::Number(n)) => format!("{:020.4}", n.as_f64().unwrap_or(0.0)),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn select(&self, query: &Select) -> AppResult<Vec<Value>> {
        self.record(Call::Select(query.relation.clone()));
        let delay = self.select_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(&query.relation)?;

        let mut rows: Vec<Value> = self
            .table(&query.relation)
            .into_iter()
            .filter(|row| row_matches(row, &query.filters))
            .collect();
        for (column, order) in query.order.iter().rev() {
            rows.sort_by(|a, b| {
                let ord = sort_key(a, column).cmp(&sort_key(b, column));
                match order {
                    Order::Asc => ord,
                    Order::Desc => ord.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, relation: &str, rows: Value) -> AppResult<Vec<Value>> {
        self.record(Call::Insert(relation.to_string(), rows.clone()));
        self.check(relation)?;

        let items = match rows {
            Value::Array(items) => items,
            single => vec![single],
        };
        let mut inserted = Vec::new();
        for mut item in items {
            if let Value::Object(ref mut obj) = item {
                if !obj.contains_key("id") {
                    obj.insert("id".into(), json!(self.allocate_id()));
                }
            }
            inserted.push(item);
        }
        self.tables
            .lock()
            .unwrap()
            .entry(relation.to_string())
            .or_default()
            .extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn update(
        &self,
        relation: &str,
        filters: &[Filter],
        patch: Value,
    ) -> AppResult<Vec<Value>> {
        self.record(Call::Update(
            relation.to_string(),
            filters.to_vec(),
            patch.clone(),
        ));
        self.check(relation)?;

        let patch: Map<String, Value> = patch.as_object().cloned().unwrap_or_default();
        let mut tables = self.tables.lock().unwrap();
        let mut updated = Vec::new();
        for row in tables.entry(relation.to_string()).or_default().iter_mut() {
            if row_matches(row, filters) {
                if let Value::Object(obj) = row {
                    for (k, v) in &patch {
                        obj.insert(k.clone(), v.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, relation: &str, filters: &[Filter]) -> AppResult<()> {
        self.record(Call::Delete(relation.to_string(), filters.to_vec()));
        self.check(relation)?;
        if let Some(rows) = self.tables.lock().unwrap().get_mut(relation) {
            rows.retain(|row| !row_matches(row, filters));
        }
        Ok(())
    }

    async fn rpc(&self, function: &str, params: Value) -> AppResult<Value> {
        self.record(Call::Rpc(function.to_string(), params.clone()));
        self.check(function)?;
        let rpcs = self.rpcs.lock().unwrap();
        let handler = rpcs.get(function).ok_or_else(|| AppError::Backend {
            status: 404,
            code: Some("PGRST202".into()),
            message: format!("function {function} not found"),
        })?;
        let mut tables = self.tables.lock().unwrap();
        handler(&mut tables, &params)
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        options: UploadOptions,
    ) -> AppResult<()> {
        self.record(Call::Upload {
            bucket: bucket.to_string(),
            path: path.to_string(),
            size: bytes.len(),
            content_type: options.content_type.clone(),
        });
        self.check(&format!("storage:{bucket}"))?;
        let key = format!("{bucket}/{path}");
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) && !options.upsert {
            return Err(AppError::Backend {
                status: 409,
                code: None,
                message: "The resource already exists".into(),
            });
        }
        objects.insert(key, bytes);
        Ok(())
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> AppResult<()> {
        self.record(Call::Remove(bucket.to_string(), paths.to_vec()));
        self.check(&format!("storage:{bucket}"))?;
        let mut objects = self.objects.lock().unwrap();
        for path in paths {
            objects.remove(&format!("{bucket}/{path}"));
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("https://fake.local/storage/v1/object/public/{bucket}/{path}")
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl_secs: u64,
    ) -> AppResult<String> {
        self.record(Call::SignedUrl(
            bucket.to_string(),
            path.to_string(),
            ttl_secs,
        ));
        self.check(&format!("storage:{bucket}"))?;
        Ok(format!(
            "https://fake.local/storage/v1/object/sign/{bucket}/{path}?token=t&ttl={ttl_secs}"
        ))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        self.record(Call::SignIn(email.to_string()));
        self.check("auth")?;
        let accounts = self.accounts.lock().unwrap();
        match accounts.get(email) {
            Some((pw, user_id)) if pw == password => Ok(self.session_for(user_id, email)),
            _ => Err(AppError::Backend {
                status: 400,
                code: Some("invalid_grant".into()),
                message: "Invalid login credentials".into(),
            }),
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> AppResult<AuthSession> {
        self.record(Call::Refresh);
        self.check("auth")?;
        let user_id = refresh_token
            .strip_prefix("refresh-")
            .ok_or_else(|| AppError::Backend {
                status: 400,
                code: Some("invalid_grant".into()),
                message: "Invalid Refresh Token".into(),
            })?;
        let email = self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|(_, (_, id))| id == user_id)
            .map(|(email, _)| email.clone())
            .unwrap_or_default();
        Ok(self.session_for(user_id, &email))
    }

    async fn sign_out(&self) -> AppResult<()> {
        self.record(Call::SignOut);
        self.check("auth")?;
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> AppResult<()> {
        self.record(Call::UpdatePassword);
        self.check("auth")?;
        let token = self
            .current_token()
            .ok_or_else(|| AppError::Auth("not signed in".into()))?;
        let mut accounts = self.accounts.lock().unwrap();
        for (pw, user_id) in accounts.values_mut() {
            if token == format!("access-{user_id}") {
                *pw = new_password.to_string();
            }
        }
        Ok(())
    }

    async fn get_user(&self) -> AppResult<AuthUser> {
        self.record(Call::GetUser);
        self.check("auth")?;
        let token = self
            .current_token()
            .ok_or_else(|| AppError::Auth("not signed in".into()))?;
        let user_id = token.trim_start_matches("access-").to_string();
        let email = self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|(_, (_, id))| *id == user_id)
            .map(|(email, _)| email.clone());
        Ok(AuthUser { id: user_id, email })
    }

    fn set_access_token(&self, token: Option<String>) {
        *self.access_token.lock().unwrap() = token;
    }

    async fn invoke_function(&self, name: &str, body: Value) -> AppResult<Value> {
        self.record(Call::Invoke(name.to_string(), body.clone()));
        self.check(name)?;
        let rpcs = self.rpcs.lock().unwrap();
        let handler = rpcs.get(name).ok_or_else(|| AppError::Backend {
            status: 404,
            code: None,
            message: format!("function {name} not deployed"),
        })?;
        let mut tables = self.tables.lock().unwrap();
        handler(&mut tables, &body)
    }
}
