//! Product catalogue. Stock is maintained by the backend (sales and
//! purchases move it) and is never sent from here.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{delete_by_id, non_blank, require_text, status_label, Id};
use crate::api::{fetch_rows, Backend, Filter, Order, Select};
use crate::error::{AppError, AppResult};
use crate::filter::Filterable;
use crate::form::{EntityForm, FormMode};
use crate::money::{round2, CurrencyInput};
use crate::notify::Notifier;
use crate::page::ListPage;
use crate::remote::ListQuery;
use crate::table::{CellValue, Column};

const TABLE: &str = "products";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Product {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub sale_price: f64,
    #[serde(default)]
    pub cost_price: f64,
    #[serde(default)]
    pub stock_quantity: f64,
    pub is_active: bool,
}

impl Filterable for Product {
    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str()];
        fields.extend(self.sku.as_deref());
        fields
    }

    fn is_active(&self) -> Option<bool> {
        Some(self.is_active)
    }
}

pub struct Products;

#[async_trait]
impl ListQuery for Products {
    type Row = Product;

    fn source(&self) -> &str {
        TABLE
    }

    async fn fetch(&self, backend: &dyn Backend) -> AppResult<Vec<Product>> {
        fetch_rows(backend, &Select::from(TABLE).order("name", Order::Asc)).await
    }

    fn failure_message(&self) -> &str {
        "Erro ao carregar produtos"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    pub name: String,
    pub sku: String,
    pub description: String,
    pub sale_price: CurrencyInput,
    pub cost_price: CurrencyInput,
    pub is_active: bool,
}

impl Default for ProductDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            sku: String::new(),
            description: String::new(),
            sale_price: CurrencyInput::default(),
            cost_price: CurrencyInput::default(),
            is_active: true,
        }
    }
}

impl ProductDraft {
    /// Display-only margin over cost, in percent.
    pub fn margin_percent(&self) -> Option<f64> {
        let cost = self.cost_price.value();
        (cost > 0.0).then(|| round2((self.sale_price.value() - cost) / cost * 100.0))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProductForm;

#[async_trait]
impl EntityForm for ProductForm {
    type Row = Product;
    type Draft = ProductDraft;

    fn blank(&self) -> ProductDraft {
        ProductDraft::default()
    }

    fn from_row(&self, row: &Product) -> ProductDraft {
        ProductDraft {
            name: row.name.clone(),
            sku: row.sku.clone().unwrap_or_default(),
            description: row.description.clone().unwrap_or_default(),
            sale_price: CurrencyInput::new(row.sale_price),
            cost_price: CurrencyInput::new(row.cost_price),
            is_active: row.is_active,
        }
    }

    fn validate(&self, draft: &ProductDraft, _: &FormMode<Product>) -> AppResult<()> {
        require_text(&draft.name, "O nome do produto é obrigatório")?;
        if draft.sale_price.value() < 0.0 || draft.cost_price.value() < 0.0 {
            return Err(AppError::validation("Os preços não podem ser negativos"));
        }
        Ok(())
    }

    async fn submit(
        &self,
        backend: &dyn Backend,
        draft: &ProductDraft,
        mode: &FormMode<Product>,
    ) -> AppResult<()> {
        let fields = json!({
            "name": draft.name.trim(),
            "sku": non_blank(&draft.sku),
            "description": non_blank(&draft.description),
            "sale_price": draft.sale_price.value(),
            "cost_price": draft.cost_price.value(),
            "is_active": draft.is_active,
        });
        match mode {
            FormMode::Create => {
                backend.insert(TABLE, fields).await?;
            }
            FormMode::Edit(product) => {
                backend
                    .update(TABLE, &[Filter::eq("id", product.id)], fields)
                    .await?;
            }
        }
        Ok(())
    }

    fn success_message(&self, mode: &FormMode<Product>) -> String {
        if mode.is_edit() {
            "Produto atualizado com sucesso".into()
        } else {
            "Produto criado com sucesso".into()
        }
    }

    fn failure_message(&self) -> &str {
        "Erro ao salvar produto"
    }
}

pub async fn delete(backend: &dyn Backend, product: &Product) -> AppResult<()> {
    delete_by_id(backend, TABLE, product.id).await
}

/// Active products for line-item pickers.
pub async fn active(backend: &dyn Backend) -> AppResult<Vec<Product>> {
    let query = Select::from(TABLE)
        .eq("is_active", true)
        .order("name", Order::Asc);
    fetch_rows(backend, &query).await
}

pub fn columns() -> Vec<Column<Product>> {
    vec![
        Column::accessor("Nome", "name", |p: &Product| CellValue::text(&p.name)),
        Column::accessor("SKU", "sku", |p: &Product| CellValue::opt_text(p.sku.as_deref())),
        Column::accessor("Preço de venda", "sale_price", |p: &Product| {
            CellValue::Money(p.sale_price)
        }),
        Column::accessor("Custo", "cost_price", |p: &Product| CellValue::Money(p.cost_price)),
        Column::accessor("Estoque", "stock_quantity", |p: &Product| {
            CellValue::Number(p.stock_quantity)
        }),
        Column::custom(
            "Status",
            "is_active",
            |p: &Product| CellValue::Bool(p.is_active),
            |p: &Product| status_label(p.is_active),
        ),
    ]
}

pub type ProductPage = ListPage<Products, ProductForm>;

pub async fn mount(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> ProductPage {
    ListPage::mount(Products, ProductForm, columns(), backend, notifier).await
}
