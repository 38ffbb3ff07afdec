//! Sales. A sale and its items are stored by one backend function, which
//! also moves stock and opens the receivable for credit sales. After
//! creation only the header can be edited.
//!
//! The list is searched on the server by customer name; the search box is
//! debounced so typing does not fire one request per keystroke.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};

use super::line_items::LineItems;
use super::{delete_by_id, non_blank, today, Id, PaymentMethod};
use crate::api::{fetch_rows, Backend, Filter, Order, Select};
use crate::error::{AppError, AppResult};
use crate::filter::Filterable;
use crate::form::{EntityForm, FormMode};
use crate::money::format_currency;
use crate::notify::Notifier;
use crate::page::ListPage;
use crate::remote::ListQuery;
use crate::table::{CellValue, Column, SortDirection, TableState};

const VIEW: &str = "sales_view";
const TABLE: &str = "sales";
const CREATE_FN: &str = "create_sale_with_items";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Sale {
    pub id: Id,
    pub sale_date: NaiveDate,
    #[serde(default)]
    pub customer_id: Option<Id>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub seller_id: Option<Id>,
    #[serde(default)]
    pub seller_name: Option<String>,
    #[serde(default)]
    pub cost_center_id: Option<Id>,
    #[serde(default)]
    pub cost_center_name: Option<String>,
    pub total_amount: f64,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Filterable for Sale {
    fn search_fields(&self) -> Vec<&str> {
        [
            self.customer_name.as_deref(),
            self.seller_name.as_deref(),
            self.cost_center_name.as_deref(),
            self.notes.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Sales list, optionally narrowed on the server by customer name.
#[derive(Debug, Default)]
pub struct Sales {
    search: Mutex<String>,
}

impl Sales {
    pub fn set_search(&self, text: &str) {
        if let Ok(mut search) = self.search.lock() {
            *search = text.trim().to_string();
        }
    }

    pub fn search(&self) -> String {
        self.search.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ListQuery for Sales {
    type Row = Sale;

    fn source(&self) -> &str {
        VIEW
    }

    async fn fetch(&self, backend: &dyn Backend) -> AppResult<Vec<Sale>> {
        let mut query = Select::from(VIEW)
            .order("sale_date", Order::Desc)
            .order("id", Order::Desc);
        let search = self.search();
        if !search.is_empty() {
            query = query.filter(Filter::ILike("customer_name".into(), search));
        }
        fetch_rows(backend, &query).await
    }

    fn failure_message(&self) -> &str {
        "Erro ao carregar vendas"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaleDraft {
    pub sale_date: NaiveDate,
    pub customer_id: Option<Id>,
    pub seller_id: Option<Id>,
    pub cost_center_id: Option<Id>,
    pub payment_method: PaymentMethod,
    pub notes: String,
    pub items: LineItems,
}

impl SaleDraft {
    /// Preview shown before submit.
    pub fn total(&self) -> f64 {
        self.items.total()
    }

    pub fn total_display(&self) -> String {
        format_currency(self.total())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SaleForm;

#[async_trait]
impl EntityForm for SaleForm {
    type Row = Sale;
    type Draft = SaleDraft;

    fn blank(&self) -> SaleDraft {
        SaleDraft {
            sale_date: today(),
            customer_id: None,
            seller_id: None,
            cost_center_id: None,
            payment_method: PaymentMethod::default(),
            notes: String::new(),
            items: LineItems::default(),
        }
    }

    fn from_row(&self, row: &Sale) -> SaleDraft {
        SaleDraft {
            sale_date: row.sale_date,
            customer_id: row.customer_id,
            seller_id: row.seller_id,
            cost_center_id: row.cost_center_id,
            payment_method: row.payment_method.unwrap_or_default(),
            notes: row.notes.clone().unwrap_or_default(),
            items: LineItems::default(),
        }
    }

    fn validate(&self, draft: &SaleDraft, mode: &FormMode<Sale>) -> AppResult<()> {
        if mode.is_edit() {
            return Ok(());
        }
        if draft.customer_id.is_none() {
            return Err(AppError::validation("Selecione o cliente"));
        }
        draft.items.validate()
    }

    async fn submit(
        &self,
        backend: &dyn Backend,
        draft: &SaleDraft,
        mode: &FormMode<Sale>,
    ) -> AppResult<()> {
        match mode {
            FormMode::Create => {
                let params = json!({
                    "p_sale": {
                        "sale_date": draft.sale_date,
                        "customer_id": draft.customer_id,
                        "seller_id": draft.seller_id,
                        "cost_center_id": draft.cost_center_id,
                        "payment_method": draft.payment_method,
                        "notes": non_blank(&draft.notes),
                    },
                    "p_items": draft.items.to_json("unit_price"),
                });
                backend.rpc(CREATE_FN, params).await?;
            }
            FormMode::Edit(sale) => {
                backend
                    .update(
                        TABLE,
                        &[Filter::eq("id", sale.id)],
                        json!({
                            "sale_date": draft.sale_date,
                            "seller_id": draft.seller_id,
                            "cost_center_id": draft.cost_center_id,
                            "notes": non_blank(&draft.notes),
                        }),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    fn success_message(&self, mode: &FormMode<Sale>) -> String {
        if mode.is_edit() {
            "Venda atualizada com sucesso".into()
        } else {
            "Venda registrada com sucesso".into()
        }
    }

    fn failure_message(&self) -> &str {
        "Erro ao salvar venda"
    }
}

pub async fn delete(backend: &dyn Backend, sale: &Sale) -> AppResult<()> {
    delete_by_id(backend, TABLE, sale.id).await
}

pub fn columns() -> Vec<Column<Sale>> {
    vec![
        Column::accessor("Data", "sale_date", |s: &Sale| CellValue::Date(s.sale_date)),
        Column::accessor("Cliente", "customer_name", |s: &Sale| {
            CellValue::opt_text(s.customer_name.as_deref())
        }),
        Column::accessor("Vendedor", "seller_name", |s: &Sale| {
            CellValue::opt_text(s.seller_name.as_deref())
        }),
        Column::accessor("Centro de custo", "cost_center_name", |s: &Sale| {
            CellValue::opt_text(s.cost_center_name.as_deref())
        }),
        Column::custom(
            "Pagamento",
            "payment_method",
            |s: &Sale| CellValue::opt_text(s.payment_method.map(PaymentMethod::label)),
            |s: &Sale| {
                s.payment_method
                    .map(PaymentMethod::label)
                    .unwrap_or("-")
                    .to_string()
            },
        ),
        Column::accessor("Total", "total_amount", |s: &Sale| CellValue::Money(s.total_amount)),
    ]
}

pub type SalePage = ListPage<Sales, SaleForm>;

pub async fn mount(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> SalePage {
    ListPage::mount(Sales::default(), SaleForm, columns(), backend, notifier)
        .await
        .with_table_state(TableState::with_sort("sale_date", SortDirection::Descending))
}

/// Run a settled search box value against the server.
pub async fn apply_search(page: &mut SalePage, text: &str) {
    page.set_remote_filter(|query| query.set_search(text)).await;
}
