//! Application context: everything a screen needs, passed explicitly.
//!
//! One value per running app owns the configuration, the backend client,
//! the notifier, the auth service and the local preference store. Screens
//! receive it (or the `Arc`s it hands out) instead of reaching for
//! globals. Lifecycle: [`AppContext::init`] (restore session, load theme),
//! [`AppContext::login`] / [`AppContext::logout`], a background
//! [`AppContext::spawn_session_refresh`] that renews the access token
//! before it expires, and [`AppContext::teardown`] at exit.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::{Backend, BackendClient};
use crate::attachments::AttachmentService;
use crate::auth::{AuthService, Role, Session};
use crate::compression::CompressionSettings;
use crate::config::AppConfig;
use crate::db::{self, user_category, DbState};
use crate::error::{AppError, AppResult};
use crate::notify::Notifier;
use crate::storage::SessionStore;

const THEME_KEY: &str = "theme";
const APP_CATEGORY: &str = "app";

/// Shorter than the auth refresh margin, so a token is renewed before
/// it lapses.
pub const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

pub struct AppContext {
    config: AppConfig,
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    auth: AuthService,
    settings: DbState,
    theme: Mutex<Theme>,
}

impl AppContext {
    /// Build the HTTP client from `config`, open the preference store in
    /// `data_dir` (in memory when `None`) and resume a saved session.
    pub async fn init(
        config: AppConfig,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn SessionStore>,
        data_dir: Option<&Path>,
    ) -> AppResult<Self> {
        let backend: Arc<dyn Backend> = Arc::new(BackendClient::new(&config)?);
        let settings = match data_dir {
            Some(dir) => db::init(dir)?,
            None => db::in_memory()?,
        };
        Self::with_parts(config, backend, notifier, store, settings).await
    }

    /// Same as [`Self::init`] with a caller-supplied backend.
    pub async fn with_parts(
        config: AppConfig,
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn SessionStore>,
        settings: DbState,
    ) -> AppResult<Self> {
        let auth = AuthService::new(backend.clone(), store);
        let ctx = Self {
            config,
            backend,
            notifier,
            auth,
            settings,
            theme: Mutex::new(Theme::default()),
        };

        match ctx.auth.restore().await {
            Ok(Some(session)) => ctx.load_theme(Some(&session)),
            Ok(None) => ctx.load_theme(None),
            Err(e) => {
                // offline start: stay signed out, keep the stored token
                warn!(error = %e, "could not restore session");
                ctx.load_theme(None);
            }
        }
        info!(app = %ctx.config.app_name, signed_in = ctx.is_authenticated(), "context ready");
        Ok(ctx)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn settings(&self) -> &DbState {
        &self.settings
    }

    pub fn session(&self) -> Option<Session> {
        self.auth.current_user()
    }

    pub fn role(&self) -> Option<Role> {
        self.auth.role()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    pub fn require_session(&self) -> AppResult<Session> {
        self.session()
            .ok_or_else(|| AppError::Auth("Você precisa estar conectado".into()))
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<Session> {
        match self.auth.sign_in(email, password).await {
            Ok(session) => {
                self.load_theme(Some(&session));
                Ok(session)
            }
            Err(e) => {
                self.notifier.error(&e.user_message("Erro ao entrar"));
                Err(e)
            }
        }
    }

    /// End the session and reset per-user state to defaults.
    pub async fn logout(&self) -> AppResult<()> {
        self.auth.sign_out().await?;
        self.load_theme(None);
        Ok(())
    }

    /// Renew the access token when it is close to expiry. A refresh token
    /// the backend rejects ends the session; a transport failure keeps it
    /// for the next attempt.
    pub async fn ensure_session_fresh(&self) -> AppResult<()> {
        match self.auth.refresh_if_needed().await {
            Ok(()) => Ok(()),
            Err(e @ (AppError::Backend { .. } | AppError::Auth(_))) => {
                warn!(error = %e, "session refresh rejected, signing out");
                if let Err(clear) = self.auth.sign_out().await {
                    warn!(error = %clear, "could not clear rejected session");
                }
                self.load_theme(None);
                let expired = AppError::Auth("Sessão expirada. Entre novamente.".into());
                self.notifier.error(&expired.user_message("Sessão expirada"));
                Err(expired)
            }
            Err(e) => {
                warn!(error = %e, "session refresh failed, will retry");
                Err(e)
            }
        }
    }

    /// Check the session every `every` until the handle is aborted.
    pub fn spawn_session_refresh(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let ctx = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if ctx.is_authenticated() {
                    // failures are logged and toasted inside
                    let _ = ctx.ensure_session_fresh().await;
                }
            }
        })
    }

    /// App exit. The stored refresh token survives so the next start can
    /// resume; only in-memory state is dropped.
    pub fn teardown(&self) {
        info!("context torn down");
        self.backend.set_access_token(None);
    }

    // -- Theme ---------------------------------------------------------------

    pub fn theme(&self) -> Theme {
        self.theme.lock().map(|t| *t).unwrap_or_default()
    }

    /// Persisted per user when signed in, app-wide otherwise.
    pub fn set_theme(&self, theme: Theme) -> AppResult<()> {
        let category = self
            .session()
            .map(|s| user_category(s.user_id()))
            .unwrap_or_else(|| APP_CATEGORY.to_string());
        self.settings.set(&category, THEME_KEY, theme.as_str())?;
        if let Ok(mut current) = self.theme.lock() {
            *current = theme;
        }
        Ok(())
    }

    fn load_theme(&self, session: Option<&Session>) {
        let user_theme = session.and_then(|s| {
            self.settings
                .get(&user_category(s.user_id()), THEME_KEY)
                .and_then(|v| Theme::parse(&v))
        });
        let theme = user_theme
            .or_else(|| {
                self.settings
                    .get(APP_CATEGORY, THEME_KEY)
                    .and_then(|v| Theme::parse(&v))
            })
            .unwrap_or_default();
        if let Ok(mut current) = self.theme.lock() {
            *current = theme;
        }
    }

    // -- Per-user preferences --------------------------------------------------

    pub fn compression_settings(&self) -> CompressionSettings {
        match self.session() {
            Some(s) => CompressionSettings::load(&self.settings, s.user_id()),
            None => CompressionSettings::default(),
        }
    }

    pub fn save_compression_settings(&self, settings: CompressionSettings) -> AppResult<()> {
        let session = self.require_session()?;
        settings.save(&self.settings, session.user_id())
    }

    pub fn attachments(&self) -> AttachmentService {
        AttachmentService::new(self.backend.clone(), self.notifier.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{Call, FakeBackend};
    use crate::notify::{ToastKind, ToastQueue};
    use crate::storage::MemorySessionStore;

    fn config() -> AppConfig {
        AppConfig::new("https://demo.supabase.co", "anon").unwrap()
    }

    async fn context(
        store: Arc<MemorySessionStore>,
    ) -> (AppContext, Arc<FakeBackend>, Arc<ToastQueue>) {
        let backend = Arc::new(FakeBackend::new());
        backend.add_account("ana@loja.com", "segredo1", "u-1");
        let toasts = Arc::new(ToastQueue::new());
        let ctx = AppContext::with_parts(
            config(),
            backend.clone(),
            toasts.clone(),
            store,
            db::in_memory().unwrap(),
        )
        .await
        .unwrap();
        (ctx, backend, toasts)
    }

    #[tokio::test]
    async fn starts_signed_out_without_stored_session() {
        let (ctx, _, _) = context(Arc::new(MemorySessionStore::new())).await;
        assert!(!ctx.is_authenticated());
        assert!(ctx.require_session().is_err());
        assert_eq!(ctx.theme(), Theme::Light);
    }

    #[tokio::test]
    async fn init_resumes_stored_session() {
        let store = Arc::new(MemorySessionStore::new());
        store.save_refresh_token("refresh-u-1").unwrap();
        let (ctx, backend, _) = context(store).await;
        assert_eq!(ctx.session().unwrap().user_id(), "u-1");
        assert_eq!(ctx.role(), Some(Role::Seller));
        assert_eq!(backend.current_token().as_deref(), Some("access-u-1"));
    }

    #[tokio::test]
    async fn theme_is_per_user_and_reset_on_logout() {
        let (ctx, _, _) = context(Arc::new(MemorySessionStore::new())).await;
        ctx.login("ana@loja.com", "segredo1").await.unwrap();
        ctx.set_theme(Theme::Dark).unwrap();
        assert_eq!(ctx.theme(), Theme::Dark);

        ctx.logout().await.unwrap();
        assert_eq!(ctx.theme(), Theme::Light);
        assert!(!ctx.is_authenticated());

        ctx.login("ana@loja.com", "segredo1").await.unwrap();
        assert_eq!(ctx.theme(), Theme::Dark);
    }

    #[tokio::test]
    async fn failed_login_toasts_backend_independent_message() {
        let (ctx, _, toasts) = context(Arc::new(MemorySessionStore::new())).await;
        assert!(ctx.login("ana@loja.com", "nope").await.is_err());
        let errors = toasts.of_kind(ToastKind::Error);
        assert_eq!(errors[0].message, "E-mail ou senha inválidos");
    }

    #[tokio::test]
    async fn compression_settings_need_a_session() {
        let (ctx, _, _) = context(Arc::new(MemorySessionStore::new())).await;
        let custom = CompressionSettings {
            quality: 60,
            ..CompressionSettings::default()
        };
        assert!(ctx.save_compression_settings(custom).is_err());

        ctx.login("ana@loja.com", "segredo1").await.unwrap();
        ctx.save_compression_settings(custom).unwrap();
        assert_eq!(ctx.compression_settings(), custom);
    }

    #[tokio::test]
    async fn teardown_keeps_refresh_token() {
        let store = Arc::new(MemorySessionStore::new());
        let (ctx, backend, _) = context(store.clone()).await;
        ctx.login("ana@loja.com", "segredo1").await.unwrap();
        ctx.teardown();
        assert!(backend.current_token().is_none());
        assert!(store.refresh_token().is_some());
    }

    #[tokio::test]
    async fn expired_session_is_refreshed_before_use() {
        let store = Arc::new(MemorySessionStore::new());
        let (ctx, backend, _) = context(store).await;
        backend.set_session_ttl(-10);
        ctx.login("ana@loja.com", "segredo1").await.unwrap();
        backend.set_access_token(Some("stale".into()));
        backend.clear_calls();

        ctx.ensure_session_fresh().await.unwrap();
        assert_eq!(backend.count_calls(|c| matches!(c, Call::Refresh)), 1);
        assert_eq!(backend.current_token().as_deref(), Some("access-u-1"));
        assert!(ctx.is_authenticated());
    }

    #[tokio::test]
    async fn fresh_session_is_left_alone() {
        let (ctx, backend, _) = context(Arc::new(MemorySessionStore::new())).await;
        ctx.login("ana@loja.com", "segredo1").await.unwrap();
        backend.clear_calls();

        ctx.ensure_session_fresh().await.unwrap();
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn rejected_refresh_signs_out() {
        let store = Arc::new(MemorySessionStore::new());
        let (ctx, backend, toasts) = context(store.clone()).await;
        backend.set_session_ttl(-10);
        ctx.login("ana@loja.com", "segredo1").await.unwrap();
        backend.fail("auth", "Invalid Refresh Token: Already Used");

        let err = ctx.ensure_session_fresh().await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
        assert!(!ctx.is_authenticated());
        assert!(store.refresh_token().is_none());
        assert_eq!(
            toasts.last().unwrap().message,
            "Sessão expirada. Entre novamente."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn background_check_refreshes_an_expiring_session() {
        let (ctx, backend, _) = context(Arc::new(MemorySessionStore::new())).await;
        backend.set_session_ttl(-10);
        ctx.login("ana@loja.com", "segredo1").await.unwrap();
        backend.set_access_token(Some("stale".into()));
        backend.clear_calls();

        let ctx = Arc::new(ctx);
        let handle = ctx.spawn_session_refresh(SESSION_CHECK_INTERVAL);
        tokio::time::sleep(SESSION_CHECK_INTERVAL / 2).await;
        handle.abort();

        assert!(backend.count_calls(|c| matches!(c, Call::Refresh)) >= 1);
        assert_eq!(backend.current_token().as_deref(), Some("access-u-1"));
    }
}
