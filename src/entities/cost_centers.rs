//! Cost centers: the reporting dimension attached to sales, purchases and
//! expenses. Deactivating one stamps the finalization date; reactivating
//! clears it. Both go through a plain update.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{delete_by_id, non_blank, require_text, status_label, today, Id, SelectOption};
use crate::api::{fetch_rows, Backend, Filter, Order, Select};
use crate::error::AppResult;
use crate::filter::Filterable;
use crate::form::{EntityForm, FormMode};
use crate::notify::Notifier;
use crate::page::ListPage;
use crate::remote::ListQuery;
use crate::table::{CellValue, Column};

const TABLE: &str = "cost_centers";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CostCenter {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub finalized_at: Option<NaiveDate>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Filterable for CostCenter {
    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str()];
        fields.extend(self.description.as_deref());
        fields
    }

    fn is_active(&self) -> Option<bool> {
        Some(self.is_active)
    }
}

pub struct CostCenters;

#[async_trait]
impl ListQuery for CostCenters {
    type Row = CostCenter;

    fn source(&self) -> &str {
        TABLE
    }

    async fn fetch(&self, backend: &dyn Backend) -> AppResult<Vec<CostCenter>> {
        fetch_rows(backend, &Select::from(TABLE).order("name", Order::Asc)).await
    }

    fn failure_message(&self) -> &str {
        "Erro ao carregar centros de custo"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CostCenterDraft {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CostCenterForm;

#[async_trait]
impl EntityForm for CostCenterForm {
    type Row = CostCenter;
    type Draft = CostCenterDraft;

    fn blank(&self) -> CostCenterDraft {
        CostCenterDraft::default()
    }

    fn from_row(&self, row: &CostCenter) -> CostCenterDraft {
        CostCenterDraft {
            name: row.name.clone(),
            description: row.description.clone().unwrap_or_default(),
        }
    }

    fn validate(&self, draft: &CostCenterDraft, _: &FormMode<CostCenter>) -> AppResult<()> {
        require_text(&draft.name, "O nome é obrigatório")
    }

    async fn submit(
        &self,
        backend: &dyn Backend,
        draft: &CostCenterDraft,
        mode: &FormMode<CostCenter>,
    ) -> AppResult<()> {
        let fields = json!({
            "name": draft.name.trim(),
            "description": non_blank(&draft.description),
        });
        match mode {
            FormMode::Create => {
                let mut row = fields;
                row["is_active"] = Value::Bool(true);
                backend.insert(TABLE, row).await?;
            }
            FormMode::Edit(center) => {
                backend
                    .update(TABLE, &[Filter::eq("id", center.id)], fields)
                    .await?;
            }
        }
        Ok(())
    }

    fn success_message(&self, mode: &FormMode<CostCenter>) -> String {
        if mode.is_edit() {
            "Centro de custo atualizado com sucesso".into()
        } else {
            "Centro de custo criado com sucesso".into()
        }
    }

    fn failure_message(&self) -> &str {
        "Erro ao salvar centro de custo"
    }
}

/// Flip active status. Finalizing records today's date; reopening clears
/// it.
pub async fn toggle_status(backend: &dyn Backend, center: &CostCenter) -> AppResult<()> {
    let activate = !center.is_active;
    let finalized_at = if activate {
        Value::Null
    } else {
        json!(today())
    };
    backend
        .update(
            TABLE,
            &[Filter::eq("id", center.id)],
            json!({ "is_active": activate, "finalized_at": finalized_at }),
        )
        .await?;
    Ok(())
}

pub async fn delete(backend: &dyn Backend, center: &CostCenter) -> AppResult<()> {
    delete_by_id(backend, TABLE, center.id).await
}

/// Active centers for the sale, purchase and expense forms.
pub async fn options(backend: &dyn Backend) -> AppResult<Vec<SelectOption>> {
    let query = Select::from(TABLE)
        .columns("id,name,is_active")
        .eq("is_active", true)
        .order("name", Order::Asc);
    let rows: Vec<CostCenter> = fetch_rows(backend, &query).await?;
    Ok(rows
        .into_iter()
        .map(|c| SelectOption {
            id: c.id,
            label: c.name,
        })
        .collect())
}

pub fn columns() -> Vec<Column<CostCenter>> {
    vec![
        Column::accessor("Nome", "name", |c: &CostCenter| CellValue::text(&c.name)),
        Column::accessor("Descrição", "description", |c: &CostCenter| {
            CellValue::opt_text(c.description.as_deref())
        })
        .unsortable(),
        Column::custom(
            "Status",
            "is_active",
            |c: &CostCenter| CellValue::Bool(c.is_active),
            |c: &CostCenter| {
                if c.is_active {
                    status_label(true)
                } else {
                    "Finalizado".to_string()
                }
            },
        ),
        Column::accessor("Finalizado em", "finalized_at", |c: &CostCenter| {
            CellValue::opt_date(c.finalized_at)
        }),
    ]
}

pub type CostCenterPage = ListPage<CostCenters, CostCenterForm>;

pub async fn mount(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> CostCenterPage {
    ListPage::mount(CostCenters, CostCenterForm, columns(), backend, notifier).await
}
