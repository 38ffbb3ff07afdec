//! Purchases from suppliers. Stored with their items by one backend
//! function that also raises stock and opens the payable when bought on
//! credit. Only the header is editable afterwards.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::line_items::LineItems;
use super::{delete_by_id, non_blank, today, Id, PaymentMethod};
use crate::api::{fetch_rows, Backend, Filter, Order, Select};
use crate::error::{AppError, AppResult};
use crate::filter::Filterable;
use crate::form::{EntityForm, FormMode};
use crate::notify::Notifier;
use crate::page::ListPage;
use crate::remote::ListQuery;
use crate::table::{CellValue, Column, SortDirection, TableState};

const VIEW: &str = "purchases_view";
const TABLE: &str = "purchases";
const CREATE_FN: &str = "create_purchase_with_items";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Purchase {
    pub id: Id,
    pub purchase_date: NaiveDate,
    #[serde(default)]
    pub supplier_id: Option<Id>,
    #[serde(default)]
    pub supplier_name: Option<String>,
    #[serde(default)]
    pub cost_center_id: Option<Id>,
    #[serde(default)]
    pub cost_center_name: Option<String>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    pub total_amount: f64,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Filterable for Purchase {
    fn search_fields(&self) -> Vec<&str> {
        [
            self.supplier_name.as_deref(),
            self.invoice_number.as_deref(),
            self.cost_center_name.as_deref(),
            self.notes.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

pub struct Purchases;

#[async_trait]
impl ListQuery for Purchases {
    type Row = Purchase;

    fn source(&self) -> &str {
        VIEW
    }

    async fn fetch(&self, backend: &dyn Backend) -> AppResult<Vec<Purchase>> {
        let query = Select::from(VIEW)
            .order("purchase_date", Order::Desc)
            .order("id", Order::Desc);
        fetch_rows(backend, &query).await
    }

    fn failure_message(&self) -> &str {
        "Erro ao carregar compras"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseDraft {
    pub purchase_date: NaiveDate,
    pub supplier_id: Option<Id>,
    pub cost_center_id: Option<Id>,
    pub invoice_number: String,
    pub payment_method: PaymentMethod,
    pub notes: String,
    pub items: LineItems,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PurchaseForm;

#[async_trait]
impl EntityForm for PurchaseForm {
    type Row = Purchase;
    type Draft = PurchaseDraft;

    fn blank(&self) -> PurchaseDraft {
        PurchaseDraft {
            purchase_date: today(),
            supplier_id: None,
            cost_center_id: None,
            invoice_number: String::new(),
            payment_method: PaymentMethod::default(),
            notes: String::new(),
            items: LineItems::default(),
        }
    }

    fn from_row(&self, row: &Purchase) -> PurchaseDraft {
        PurchaseDraft {
            purchase_date: row.purchase_date,
            supplier_id: row.supplier_id,
            cost_center_id: row.cost_center_id,
            invoice_number: row.invoice_number.clone().unwrap_or_default(),
            payment_method: row.payment_method.unwrap_or_default(),
            notes: row.notes.clone().unwrap_or_default(),
            items: LineItems::default(),
        }
    }

    fn validate(&self, draft: &PurchaseDraft, mode: &FormMode<Purchase>) -> AppResult<()> {
        if mode.is_edit() {
            return Ok(());
        }
        if draft.supplier_id.is_none() {
            return Err(AppError::validation("Selecione o fornecedor"));
        }
        draft.items.validate()
    }

    async fn submit(
        &self,
        backend: &dyn Backend,
        draft: &PurchaseDraft,
        mode: &FormMode<Purchase>,
    ) -> AppResult<()> {
        match mode {
            FormMode::Create => {
                let params = json!({
                    "p_purchase": {
                        "purchase_date": draft.purchase_date,
                        "supplier_id": draft.supplier_id,
                        "cost_center_id": draft.cost_center_id,
                        "invoice_number": non_blank(&draft.invoice_number),
                        "payment_method": draft.payment_method,
                        "notes": non_blank(&draft.notes),
                    },
                    "p_items": draft.items.to_json("unit_cost"),
                });
                backend.rpc(CREATE_FN, params).await?;
            }
            FormMode::Edit(purchase) => {
                backend
                    .update(
                        TABLE,
                        &[Filter::eq("id", purchase.id)],
                        json!({
                            "purchase_date": draft.purchase_date,
                            "cost_center_id": draft.cost_center_id,
                            "invoice_number": non_blank(&draft.invoice_number),
                            "notes": non_blank(&draft.notes),
                        }),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    fn success_message(&self, mode: &FormMode<Purchase>) -> String {
        if mode.is_edit() {
            "Compra atualizada com sucesso".into()
        } else {
            "Compra registrada com sucesso".into()
        }
    }

    fn failure_message(&self) -> &str {
        "Erro ao salvar compra"
    }
}

pub async fn delete(backend: &dyn Backend, purchase: &Purchase) -> AppResult<()> {
    delete_by_id(backend, TABLE, purchase.id).await
}

pub fn columns() -> Vec<Column<Purchase>> {
    vec![
        Column::accessor("Data", "purchase_date", |p: &Purchase| {
            CellValue::Date(p.purchase_date)
        }),
        Column::accessor("Fornecedor", "supplier_name", |p: &Purchase| {
            CellValue::opt_text(p.supplier_name.as_deref())
        }),
        Column::accessor("Nota fiscal", "invoice_number", |p: &Purchase| {
            CellValue::opt_text(p.invoice_number.as_deref())
        }),
        Column::accessor("Centro de custo", "cost_center_name", |p: &Purchase| {
            CellValue::opt_text(p.cost_center_name.as_deref())
        }),
        Column::accessor("Total", "total_amount", |p: &Purchase| {
            CellValue::Money(p.total_amount)
        }),
    ]
}

pub type PurchasePage = ListPage<Purchases, PurchaseForm>;

pub async fn mount(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> PurchasePage {
    ListPage::mount(Purchases, PurchaseForm, columns(), backend, notifier)
        .await
        .with_table_state(TableState::with_sort(
            "purchase_date",
            SortDirection::Descending,
        ))
}
