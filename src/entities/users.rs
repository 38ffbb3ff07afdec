//! User administration: role assignments and invitations. Admins only.
//!
//! Accounts are created by the `invite-user` function, which runs with
//! service privileges and assigns the default role; the client never
//! creates auth users itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::api::{fetch_rows, Backend, Filter, Order, Select};
use crate::auth::Role;
use crate::error::{AppError, AppResult};
use crate::filter::Filterable;
use crate::form::{EntityForm, FormMode};
use crate::notify::Notifier;
use crate::page::ListPage;
use crate::remote::ListQuery;
use crate::table::{CellValue, Column};

const TABLE: &str = "user_roles";
const INVITE_FN: &str = "invite-user";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserRole {
    pub id: super::Id,
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Filterable for UserRole {
    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.role.label()];
        fields.extend(self.email.as_deref());
        fields
    }
}

pub struct UserRoles;

#[async_trait]
impl ListQuery for UserRoles {
    type Row = UserRole;

    fn source(&self) -> &str {
        TABLE
    }

    async fn fetch(&self, backend: &dyn Backend) -> AppResult<Vec<UserRole>> {
        fetch_rows(backend, &Select::from(TABLE).order("email", Order::Asc)).await
    }

    fn failure_message(&self) -> &str {
        "Erro ao carregar usuários"
    }
}

/// Changes the role of an existing assignment. New users come in through
/// [`invite`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleForm;

#[async_trait]
impl EntityForm for RoleForm {
    type Row = UserRole;
    type Draft = Role;

    fn blank(&self) -> Role {
        Role::default()
    }

    fn from_row(&self, row: &UserRole) -> Role {
        row.role
    }

    fn validate(&self, _: &Role, mode: &FormMode<UserRole>) -> AppResult<()> {
        if !mode.is_edit() {
            return Err(AppError::validation("Use o convite para adicionar usuários"));
        }
        Ok(())
    }

    async fn submit(
        &self,
        backend: &dyn Backend,
        role: &Role,
        mode: &FormMode<UserRole>,
    ) -> AppResult<()> {
        let Some(assignment) = mode.entity() else {
            return Err(AppError::validation("Use o convite para adicionar usuários"));
        };
        backend
            .update(
                TABLE,
                &[Filter::eq("id", assignment.id)],
                json!({ "role": role }),
            )
            .await?;
        info!(user_id = %assignment.user_id, role = role.as_str(), "role updated");
        Ok(())
    }

    fn success_message(&self, _: &FormMode<UserRole>) -> String {
        "Permissão atualizada com sucesso".into()
    }

    fn failure_message(&self) -> &str {
        "Erro ao atualizar permissão"
    }
}

#[derive(Debug, Deserialize)]
struct InviteReply {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Invite a new user by e-mail. Returns the function's confirmation text.
pub async fn invite(backend: &dyn Backend, email: &str) -> AppResult<String> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::validation("Informe um e-mail válido"));
    }
    let reply: Value = backend
        .invoke_function(INVITE_FN, json!({ "email": email }))
        .await?;
    let reply: InviteReply =
        serde_json::from_value(reply).map_err(|e| AppError::decode(INVITE_FN, e))?;
    if let Some(error) = reply.error {
        return Err(AppError::Backend {
            status: 400,
            code: None,
            message: error,
        });
    }
    info!(email, "user invited");
    Ok(reply
        .message
        .unwrap_or_else(|| "Convite enviado com sucesso".to_string()))
}

pub fn columns() -> Vec<Column<UserRole>> {
    vec![
        Column::accessor("E-mail", "email", |u: &UserRole| {
            CellValue::opt_text(u.email.as_deref())
        }),
        Column::custom(
            "Permissão",
            "role",
            |u: &UserRole| CellValue::text(u.role.as_str()),
            |u: &UserRole| u.role.label().to_string(),
        ),
        Column::accessor("Desde", "created_at", |u: &UserRole| {
            u.created_at.map_or(CellValue::Empty, CellValue::DateTime)
        }),
    ]
}

pub type UserPage = ListPage<UserRoles, RoleForm>;

/// Mount the screen for `viewer`; anyone but an admin is turned away
/// before any request is made.
pub async fn mount(
    viewer: Role,
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
) -> AppResult<UserPage> {
    if !viewer.can_manage_users() {
        return Err(AppError::Auth("Acesso restrito a administradores".into()));
    }
    Ok(ListPage::mount(UserRoles, RoleForm, columns(), backend, notifier).await)
}
