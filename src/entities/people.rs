//! People and companies (customers, suppliers, sellers). One person can
//! hold several roles; the person row and its role rows are written
//! together by a backend function so they never diverge.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{delete_by_id, non_blank, require_text, status_label, Id, SelectOption};
use crate::api::{fetch_rows, Backend, Order, Select};
use crate::error::{AppError, AppResult};
use crate::filter::Filterable;
use crate::form::{EntityForm, FormMode};
use crate::notify::Notifier;
use crate::page::ListPage;
use crate::remote::ListQuery;
use crate::table::{CellValue, Column};

const TABLE: &str = "entities";
const COLUMNS: &str = "*,entity_roles(role)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonRole {
    Customer,
    Supplier,
    Seller,
}

impl PersonRole {
    pub fn label(self) -> &'static str {
        match self {
            PersonRole::Customer => "Cliente",
            PersonRole::Supplier => "Fornecedor",
            PersonRole::Seller => "Vendedor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoleRef {
    pub role: PersonRole,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Person {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub entity_roles: Vec<RoleRef>,
}

impl Person {
    pub fn roles(&self) -> BTreeSet<PersonRole> {
        self.entity_roles.iter().map(|r| r.role).collect()
    }

    pub fn has_role(&self, role: PersonRole) -> bool {
        self.entity_roles.iter().any(|r| r.role == role)
    }

    fn roles_label(&self) -> String {
        self.roles()
            .into_iter()
            .map(PersonRole::label)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Filterable for Person {
    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str()];
        fields.extend(self.document.as_deref());
        fields.extend(self.email.as_deref());
        fields
    }

    fn is_active(&self) -> Option<bool> {
        Some(self.is_active)
    }
}

/// All people, or only those holding `role`.
#[derive(Debug, Clone, Copy, Default)]
pub struct People {
    pub role: Option<PersonRole>,
}

#[async_trait]
impl ListQuery for People {
    type Row = Person;

    fn source(&self) -> &str {
        TABLE
    }

    async fn fetch(&self, backend: &dyn Backend) -> AppResult<Vec<Person>> {
        let query = Select::from(TABLE)
            .columns(COLUMNS)
            .order("name", Order::Asc);
        let rows: Vec<Person> = fetch_rows(backend, &query).await?;
        Ok(match self.role {
            Some(role) => rows.into_iter().filter(|p| p.has_role(role)).collect(),
            None => rows,
        })
    }

    fn failure_message(&self) -> &str {
        "Erro ao carregar cadastros"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonDraft {
    pub name: String,
    pub document: String,
    pub email: String,
    pub phone: String,
    pub is_active: bool,
    pub roles: BTreeSet<PersonRole>,
}

impl Default for PersonDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            document: String::new(),
            email: String::new(),
            phone: String::new(),
            is_active: true,
            roles: BTreeSet::from([PersonRole::Customer]),
        }
    }
}

impl PersonDraft {
    pub fn toggle_role(&mut self, role: PersonRole) {
        if !self.roles.remove(&role) {
            self.roles.insert(role);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PersonForm;

#[async_trait]
impl EntityForm for PersonForm {
    type Row = Person;
    type Draft = PersonDraft;

    fn blank(&self) -> PersonDraft {
        PersonDraft::default()
    }

    fn from_row(&self, row: &Person) -> PersonDraft {
        PersonDraft {
            name: row.name.clone(),
            document: row.document.clone().unwrap_or_default(),
            email: row.email.clone().unwrap_or_default(),
            phone: row.phone.clone().unwrap_or_default(),
            is_active: row.is_active,
            roles: row.roles(),
        }
    }

    fn validate(&self, draft: &PersonDraft, _: &FormMode<Person>) -> AppResult<()> {
        require_text(&draft.name, "O nome é obrigatório")?;
        if draft.roles.is_empty() {
            return Err(AppError::validation("Selecione ao menos um papel"));
        }
        let email = draft.email.trim();
        if !email.is_empty() && !email.contains('@') {
            return Err(AppError::validation("E-mail inválido"));
        }
        Ok(())
    }

    async fn submit(
        &self,
        backend: &dyn Backend,
        draft: &PersonDraft,
        mode: &FormMode<Person>,
    ) -> AppResult<()> {
        let mut params = json!({
            "p_name": draft.name.trim(),
            "p_document": non_blank(&draft.document),
            "p_email": non_blank(&draft.email),
            "p_phone": non_blank(&draft.phone),
            "p_roles": draft.roles,
        });
        let function = match mode {
            FormMode::Create => "create_entity_with_roles",
            FormMode::Edit(person) => {
                params["p_entity_id"] = json!(person.id);
                params["p_is_active"] = json!(draft.is_active);
                "update_entity_with_roles"
            }
        };
        backend.rpc(function, params).await?;
        Ok(())
    }

    fn success_message(&self, mode: &FormMode<Person>) -> String {
        if mode.is_edit() {
            "Cadastro atualizado com sucesso".into()
        } else {
            "Cadastro criado com sucesso".into()
        }
    }

    fn failure_message(&self) -> &str {
        "Erro ao salvar cadastro"
    }
}

pub async fn delete(backend: &dyn Backend, person: &Person) -> AppResult<()> {
    delete_by_id(backend, TABLE, person.id).await
}

/// Active people holding `role`, for dropdowns.
pub async fn options(backend: &dyn Backend, role: PersonRole) -> AppResult<Vec<SelectOption>> {
    let rows = People { role: Some(role) }.fetch(backend).await?;
    Ok(rows
        .into_iter()
        .filter(|p| p.is_active)
        .map(|p| SelectOption {
            id: p.id,
            label: p.name,
        })
        .collect())
}

pub fn columns() -> Vec<Column<Person>> {
    vec![
        Column::accessor("Nome", "name", |p: &Person| CellValue::text(&p.name)),
        Column::accessor("Documento", "document", |p: &Person| {
            CellValue::opt_text(p.document.as_deref())
        }),
        Column::accessor("E-mail", "email", |p: &Person| {
            CellValue::opt_text(p.email.as_deref())
        }),
        Column::accessor("Telefone", "phone", |p: &Person| {
            CellValue::opt_text(p.phone.as_deref())
        })
        .unsortable(),
        Column::custom(
            "Papéis",
            "roles",
            |p: &Person| CellValue::text(p.roles_label()),
            |p: &Person| p.roles_label(),
        )
        .unsortable(),
        Column::custom(
            "Status",
            "is_active",
            |p: &Person| CellValue::Bool(p.is_active),
            |p: &Person| status_label(p.is_active),
        ),
    ]
}

pub type PersonPage = ListPage<People, PersonForm>;

pub async fn mount(
    role: Option<PersonRole>,
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
) -> PersonPage {
    ListPage::mount(People { role }, PersonForm, columns(), backend, notifier).await
}
