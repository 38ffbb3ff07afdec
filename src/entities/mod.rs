//! Per-entity rows, list queries, forms and table columns.
//!
//! Every row is a serde struct decoded at the API boundary, so a renamed
//! backend column fails loudly in one place instead of rendering blanks.

pub mod commissions;
pub mod cost_centers;
pub mod debts;
pub mod expenses;
pub mod line_items;
pub mod partners;
pub mod people;
pub mod products;
pub mod purchases;
pub mod reports;
pub mod sales;
pub mod users;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{Backend, Filter};
use crate::error::{AppError, AppResult};

/// Backend primary keys.
pub type Id = i64;

/// One entry of a dropdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub id: Id,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Pix,
    DebitCard,
    CreditCard,
    BankTransfer,
    /// Settled later; the backend opens a receivable or payable.
    OnCredit,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 6] = [
        PaymentMethod::Cash,
        PaymentMethod::Pix,
        PaymentMethod::DebitCard,
        PaymentMethod::CreditCard,
        PaymentMethod::BankTransfer,
        PaymentMethod::OnCredit,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Dinheiro",
            PaymentMethod::Pix => "Pix",
            PaymentMethod::DebitCard => "Cartão de débito",
            PaymentMethod::CreditCard => "Cartão de crédito",
            PaymentMethod::BankTransfer => "Transferência",
            PaymentMethod::OnCredit => "A prazo",
        }
    }
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Decode the first row of an insert/update response.
pub(crate) fn first_row<T: DeserializeOwned>(relation: &str, rows: Vec<Value>) -> AppResult<T> {
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| AppError::decode(relation, "no row returned"))?;
    serde_json::from_value(row).map_err(|e| AppError::decode(relation, e))
}

pub(crate) async fn delete_by_id(backend: &dyn Backend, relation: &str, id: Id) -> AppResult<()> {
    backend.delete(relation, &[Filter::eq("id", id)]).await
}

/// `None` for blank input, trimmed text otherwise.
pub(crate) fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub(crate) fn require_text(text: &str, message: &str) -> AppResult<()> {
    if text.trim().is_empty() {
        return Err(AppError::validation(message));
    }
    Ok(())
}

pub(crate) fn status_label(active: bool) -> String {
    if active { "Ativo" } else { "Inativo" }.to_string()
}
