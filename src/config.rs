//! Startup configuration.
//!
//! Read once from the process environment when the application context is
//! built and never re-read afterwards.

use crate::error::{AppError, AppResult};

pub const ENV_BACKEND_URL: &str = "BACKOFFICE_BACKEND_URL";
pub const ENV_ANON_KEY: &str = "BACKOFFICE_ANON_KEY";
pub const ENV_APP_NAME: &str = "BACKOFFICE_APP_NAME";
pub const ENV_LOGO_URL: &str = "BACKOFFICE_LOGO_URL";
pub const ENV_FAVICON_URL: &str = "BACKOFFICE_FAVICON_URL";

const DEFAULT_APP_NAME: &str = "Back Office";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub backend_url: String,
    pub anon_key: String,
    pub app_name: String,
    pub logo_url: Option<String>,
    pub favicon_url: Option<String>,
}

impl AppConfig {
    pub fn new(backend_url: &str, anon_key: &str) -> AppResult<Self> {
        let backend_url = normalize_backend_url(backend_url);
        if backend_url.is_empty() {
            return Err(AppError::Config("missing backend URL".into()));
        }
        let anon_key = anon_key.trim().to_string();
        if anon_key.is_empty() {
            return Err(AppError::Config("missing anonymous API key".into()));
        }
        Ok(Self {
            backend_url,
            anon_key,
            app_name: DEFAULT_APP_NAME.to_string(),
            logo_url: None,
            favicon_url: None,
        })
    }

    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as missing.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let backend_url = read(ENV_BACKEND_URL)
            .ok_or_else(|| AppError::Config(format!("{ENV_BACKEND_URL} is not set")))?;
        let anon_key = read(ENV_ANON_KEY)
            .ok_or_else(|| AppError::Config(format!("{ENV_ANON_KEY} is not set")))?;

        let mut config = Self::new(&backend_url, &anon_key)?;
        if let Some(name) = read(ENV_APP_NAME) {
            config.app_name = name;
        }
        config.logo_url = read(ENV_LOGO_URL);
        config.favicon_url = read(ENV_FAVICON_URL);
        Ok(config)
    }
}

/// Normalise the backend base URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - strip a trailing `/rest/v1` segment
pub fn normalize_backend_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    if url.ends_with("/rest/v1") {
        url.truncate(url.len() - "/rest/v1".len());
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}
