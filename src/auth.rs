//! Session-based authentication against the backend auth service.
//!
//! Signing in runs the password grant; the refresh token is kept in the
//! [`SessionStore`] so the next start can restore the session without
//! asking again. The access token only lives in memory and in the
//! backend client's bearer header. The role comes from `user_roles`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::api::{fetch_rows, AuthSession, AuthUser, Backend, Select};
use crate::error::{AppError, AppResult};
use crate::storage::SessionStore;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const MIN_PASSWORD_LEN: usize = 6;

/// Refresh the access token when it expires within this window.
const REFRESH_MARGIN_SECS: i64 = 60;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    #[default]
    Seller,
}

/// Reads through [`Role::parse`], so rows with an unknown or null role
/// load as `Seller`.
impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Role::parse).unwrap_or_default())
    }
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Seller => "seller",
        }
    }

    /// Unknown values fall back to the least privileged role.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "manager" => Role::Manager,
            _ => Role::Seller,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Admin => "Administrador",
            Role::Manager => "Gerente",
            Role::Seller => "Vendedor",
        }
    }

    pub fn can_manage_users(self) -> bool {
        self == Role::Admin
    }

    /// Reports, partners and commissions payout.
    pub fn can_view_financials(self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }
}

/// The signed-in user as the rest of the app sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: AuthUser,
    pub role: Role,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    fn expires_soon(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at - now <= Duration::seconds(REFRESH_MARGIN_SECS))
    }
}

#[derive(Debug, Deserialize)]
struct RoleRow {
    role: String,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct AuthService {
    backend: Arc<dyn Backend>,
    store: Arc<dyn SessionStore>,
    current: Mutex<Option<Session>>,
}

impl AuthService {
    pub fn new(backend: Arc<dyn Backend>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            backend,
            store,
            current: Mutex::new(None),
        }
    }

    pub fn current_user(&self) -> Option<Session> {
        self.current.lock().ok().and_then(|s| s.clone())
    }

    pub fn role(&self) -> Option<Role> {
        self.current_user().map(|s| s.role)
    }

    pub fn last_email(&self) -> Option<String> {
        self.store.last_email()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::validation("Informe um e-mail válido"));
        }
        if password.is_empty() {
            return Err(AppError::validation("Informe a senha"));
        }

        let grant = self
            .backend
            .sign_in_with_password(email, password)
            .await
            .map_err(|e| match e {
                AppError::Backend { status: 400, .. } => {
                    AppError::Auth("E-mail ou senha inválidos".into())
                }
                other => other,
            })?;
        if let Err(e) = self.store.save_last_email(email) {
            warn!(error = %e, "could not remember last email");
        }
        let session = self.establish(&grant).await?;
        info!(user_id = %session.user.id, role = session.role.as_str(), "signed in");
        Ok(session)
    }

    /// Resume the session saved by a previous run. `Ok(None)` when there is
    /// nothing to resume or the backend no longer accepts the token; a
    /// transport failure keeps the token for the next attempt.
    pub async fn restore(&self) -> AppResult<Option<Session>> {
        let Some(token) = self.store.refresh_token() else {
            return Ok(None);
        };
        match self.backend.refresh_session(&token).await {
            Ok(grant) => {
                let session = self.establish(&grant).await?;
                info!(user_id = %session.user.id, "session restored");
                Ok(Some(session))
            }
            Err(e @ AppError::Backend { .. }) => {
                warn!(error = %e, "stored session rejected, signing out");
                self.store.clear_session()?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Refresh the access token when it is about to expire.
    pub async fn refresh_if_needed(&self) -> AppResult<()> {
        let Some(session) = self.current_user() else {
            return Ok(());
        };
        if !session.expires_soon(Utc::now()) {
            return Ok(());
        }
        let token = self
            .store
            .refresh_token()
            .ok_or_else(|| AppError::Auth("Sessão expirada. Entre novamente.".into()))?;
        let grant = self.backend.refresh_session(&token).await?;
        self.establish(&grant).await?;
        Ok(())
    }

    /// Always ends the local session, even when the backend call fails.
    pub async fn sign_out(&self) -> AppResult<()> {
        if let Err(e) = self.backend.sign_out().await {
            warn!(error = %e, "backend sign-out failed, clearing local session anyway");
        }
        self.backend.set_access_token(None);
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
        self.store.clear_session()?;
        info!("signed out");
        Ok(())
    }

    pub async fn update_password(&self, new_password: &str, confirmation: &str) -> AppResult<()> {
        validate_new_password(new_password, confirmation)?;
        if self.current_user().is_none() {
            return Err(AppError::Auth("Você precisa estar conectado".into()));
        }
        self.backend.update_password(new_password).await?;
        info!("password updated");
        Ok(())
    }

    async fn establish(&self, grant: &AuthSession) -> AppResult<Session> {
        self.backend
            .set_access_token(Some(grant.access_token.clone()));
        self.store.save_refresh_token(&grant.refresh_token)?;

        let role = self.fetch_role(&grant.user.id).await;
        let session = Session {
            user: grant.user.clone(),
            role,
            expires_at: grant
                .expires_at
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        };
        if let Ok(mut current) = self.current.lock() {
            *current = Some(session.clone());
        }
        Ok(session)
    }

    /// Missing row or failed lookup both mean [`Role::Seller`].
    async fn fetch_role(&self, user_id: &str) -> Role {
        let query = Select::from("user_roles")
            .columns("role")
            .eq("user_id", user_id)
            .limit(1);
        match fetch_rows::<RoleRow>(self.backend.as_ref(), &query).await {
            Ok(rows) => rows
                .first()
                .map(|r| Role::parse(&r.role))
                .unwrap_or_default(),
            Err(e) => {
                warn!(user_id, error = %e, "role lookup failed, using seller");
                Role::Seller
            }
        }
    }
}

pub fn validate_new_password(new_password: &str, confirmation: &str) -> AppResult<()> {
    if new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "A senha deve ter pelo menos {MIN_PASSWORD_LEN} caracteres"
        )));
    }
    if new_password != confirmation {
        return Err(AppError::validation("As senhas não coincidem"));
    }
    Ok(())
}
