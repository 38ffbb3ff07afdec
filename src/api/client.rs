//! HTTP implementation of [`Backend`] over `reqwest`.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde_json::{json, Value};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

use super::{AuthSession, AuthUser, Backend, Filter, Select, UploadOptions};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// Default timeout for backend requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Uploads carry image bodies and get more time.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

pub struct BackendClient {
    http: Client,
    base_url: String,
    anon_key: String,
    access_token: RwLock<Option<String>>,
}

impl BackendClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.backend_url.clone(),
            anon_key: config.anon_key.clone(),
            access_token: RwLock::new(None),
        })
    }

    fn bearer(&self) -> String {
        self.access_token
            .read()
            .ok()
            .and_then(|t| t.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn url(&self, path: &str) -> AppResult<Url> {
        Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|e| AppError::Config(format!("invalid backend URL: {e}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.bearer()))
    }

    fn rest_url(&self, relation: &str, filters: &[Filter]) -> AppResult<Url> {
        let mut url = self.url(&format!("/rest/v1/{relation}"))?;
        {
            let mut qp = url.query_pairs_mut();
            for f in filters {
                qp.append_pair(f.column(), &f.operand());
            }
        }
        Ok(url)
    }

    /// Send, map error bodies to [`AppError::Backend`] and parse JSON.
    /// Empty bodies (204) come back as `Value::Null`.
    async fn execute(&self, req: RequestBuilder, what: &str) -> AppResult<Value> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            warn!(target_call = %what, status = status.as_u16(), "backend call rejected");
            return Err(AppError::from_response(status, &body));
        }
        debug!(target_call = %what, status = status.as_u16(), "backend call ok");

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| AppError::decode(what, e))
    }

    fn into_rows(value: Value) -> Vec<Value> {
        match value {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }
}

#[async_trait]
impl Backend for BackendClient {
    async fn select(&self, query: &Select) -> AppResult<Vec<Value>> {
        let mut url = self.url(&format!("/rest/v1/{}", query.relation))?;
        {
            let mut qp = url.query_pairs_mut();
            for (k, v) in query.query_pairs() {
                qp.append_pair(&k, &v);
            }
        }
        let value = self
            .execute(self.request(Method::GET, url), &query.relation)
            .await?;
        Ok(Self::into_rows(value))
    }

    async fn insert(&self, relation: &str, rows: Value) -> AppResult<Vec<Value>> {
        let url = self.rest_url(relation, &[])?;
        let req = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(&rows);
        Ok(Self::into_rows(self.execute(req, relation).await?))
    }

    async fn update(
        &self,
        relation: &str,
        filters: &[Filter],
        patch: Value,
    ) -> AppResult<Vec<Value>> {
        if filters.is_empty() {
            return Err(AppError::validation("update without filters is not allowed"));
        }
        let url = self.rest_url(relation, filters)?;
        let req = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(&patch);
        Ok(Self::into_rows(self.execute(req, relation).await?))
    }

    async fn delete(&self, relation: &str, filters: &[Filter]) -> AppResult<()> {
        if filters.is_empty() {
            return Err(AppError::validation("delete without filters is not allowed"));
        }
        let url = self.rest_url(relation, filters)?;
        let req = self
            .request(Method::DELETE, url)
            .header("Prefer", "return=minimal");
        self.execute(req, relation).await?;
        Ok(())
    }

    async fn rpc(&self, function: &str, params: Value) -> AppResult<Value> {
        let url = self.url(&format!("/rest/v1/rpc/{function}"))?;
        let req = self.request(Method::POST, url).json(&params);
        self.execute(req, function).await
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        options: UploadOptions,
    ) -> AppResult<()> {
        let url = self.url(&format!("/storage/v1/object/{bucket}/{path}"))?;
        let req = self
            .request(Method::POST, url)
            .timeout(UPLOAD_TIMEOUT)
            .header("Content-Type", options.content_type)
            .header("x-upsert", if options.upsert { "true" } else { "false" })
            .body(bytes);
        self.execute(req, "storage upload").await?;
        Ok(())
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> AppResult<()> {
        let url = self.url(&format!("/storage/v1/object/{bucket}"))?;
        let req = self
            .request(Method::DELETE, url)
            .json(&json!({ "prefixes": paths }));
        self.execute(req, "storage remove").await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl_secs: u64,
    ) -> AppResult<String> {
        let url = self.url(&format!("/storage/v1/object/sign/{bucket}/{path}"))?;
        let req = self
            .request(Method::POST, url)
            .json(&json!({ "expiresIn": ttl_secs }));
        let value = self.execute(req, "storage sign").await?;
        let signed = value
            .get("signedURL")
            .or_else(|| value.get("signedUrl"))
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::decode("storage sign", "missing signedURL"))?;
        if signed.starts_with("http") {
            Ok(signed.to_string())
        } else {
            Ok(format!("{}/storage/v1{signed}", self.base_url))
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        let url = self.url("/auth/v1/token?grant_type=password")?;
        let req = self
            .request(Method::POST, url)
            .json(&json!({ "email": email, "password": password }));
        let value = self.execute(req, "auth token").await?;
        serde_json::from_value(value).map_err(|e| AppError::decode("auth token", e))
    }

    async fn refresh_session(&self, refresh_token: &str) -> AppResult<AuthSession> {
        let url = self.url("/auth/v1/token?grant_type=refresh_token")?;
        let req = self
            .request(Method::POST, url)
            .json(&json!({ "refresh_token": refresh_token }));
        let value = self.execute(req, "auth refresh").await?;
        serde_json::from_value(value).map_err(|e| AppError::decode("auth refresh", e))
    }

    async fn sign_out(&self) -> AppResult<()> {
        let url = self.url("/auth/v1/logout")?;
        self.execute(self.request(Method::POST, url), "auth logout")
            .await?;
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> AppResult<()> {
        let url = self.url("/auth/v1/user")?;
        let req = self
            .request(Method::PUT, url)
            .json(&json!({ "password": new_password }));
        self.execute(req, "auth user").await?;
        Ok(())
    }

    async fn get_user(&self) -> AppResult<AuthUser> {
        let url = self.url("/auth/v1/user")?;
        let value = self
            .execute(self.request(Method::GET, url), "auth user")
            .await?;
        serde_json::from_value(value).map_err(|e| AppError::decode("auth user", e))
    }

    fn set_access_token(&self, token: Option<String>) {
        match self.access_token.write() {
            Ok(mut guard) => *guard = token,
            Err(e) => warn!(error = %e, "access token lock poisoned"),
        }
    }

    async fn invoke_function(&self, name: &str, body: Value) -> AppResult<Value> {
        let url = self.url(&format!("/functions/v1/{name}"))?;
        let req = self.request(Method::POST, url).json(&body);
        self.execute(req, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> BackendClient {
        let config = AppConfig::new("db.example.com/", "anon-key").unwrap();
        BackendClient::new(&config).unwrap()
    }

    #[test]
    fn public_url_uses_normalized_base() {
        assert_eq!(
            client().public_url("logos", "brand/logo.png"),
            "https://db.example.com/storage/v1/object/public/logos/brand/logo.png"
        );
    }

    #[test]
    fn bearer_falls_back_to_anon_key() {
        let c = client();
        assert_eq!(c.bearer(), "anon-key");
        c.set_access_token(Some("user-token".into()));
        assert_eq!(c.bearer(), "user-token");
        c.set_access_token(None);
        assert_eq!(c.bearer(), "anon-key");
    }

    #[test]
    fn rest_url_encodes_filters() {
        let url = client()
            .rest_url("cost_centers", &[Filter::eq("id", 7)])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://db.example.com/rest/v1/cost_centers?id=eq.7"
        );
    }
}
