//! Seller commissions. Amounts are computed by the backend from each sale;
//! the client only lists them and records payouts.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{non_blank, today, Id};
use crate::api::{fetch_rows, Backend, Order, Select};
use crate::error::{AppError, AppResult};
use crate::filter::Filterable;
use crate::form::{EntityForm, FormMode};
use crate::money::{validate_payment_amount, CurrencyInput, PAYMENT_EPSILON};
use crate::notify::Notifier;
use crate::page::ListPage;
use crate::remote::ListQuery;
use crate::table::{CellValue, Column};

const VIEW: &str = "commissions_view";
const PAY_FN: &str = "pay_commission";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Commission {
    pub id: Id,
    #[serde(default)]
    pub seller_id: Option<Id>,
    #[serde(default)]
    pub seller_name: Option<String>,
    #[serde(default)]
    pub sale_id: Option<Id>,
    #[serde(default)]
    pub sale_date: Option<NaiveDate>,
    /// Percentage applied to the sale total.
    #[serde(default)]
    pub rate: f64,
    pub commission_amount: f64,
    #[serde(default)]
    pub paid_amount: f64,
    pub balance: f64,
}

impl Commission {
    pub fn is_paid(&self) -> bool {
        self.balance <= PAYMENT_EPSILON
    }
}

impl Filterable for Commission {
    fn search_fields(&self) -> Vec<&str> {
        self.seller_name.as_deref().into_iter().collect()
    }

    fn is_active(&self) -> Option<bool> {
        Some(!self.is_paid())
    }
}

pub struct Commissions;

#[async_trait]
impl ListQuery for Commissions {
    type Row = Commission;

    fn source(&self) -> &str {
        VIEW
    }

    async fn fetch(&self, backend: &dyn Backend) -> AppResult<Vec<Commission>> {
        fetch_rows(backend, &Select::from(VIEW).order("sale_date", Order::Desc)).await
    }

    fn failure_message(&self) -> &str {
        "Erro ao carregar comissões"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayoutDraft {
    pub amount: CurrencyInput,
    pub payment_date: NaiveDate,
    pub notes: String,
}

/// Payout form bound to one commission. Payouts are never edited; a wrong
/// one is reversed on the backend.
#[derive(Debug, Clone, Default)]
pub struct PayoutForm {
    commission: Option<Commission>,
}

impl PayoutForm {
    pub fn for_commission(commission: Commission) -> Self {
        Self {
            commission: Some(commission),
        }
    }

    pub fn max_allowed(&self) -> f64 {
        self.commission.as_ref().map_or(0.0, |c| c.balance)
    }
}

#[async_trait]
impl EntityForm for PayoutForm {
    type Row = Commission;
    type Draft = PayoutDraft;

    fn blank(&self) -> PayoutDraft {
        PayoutDraft {
            amount: CurrencyInput::new(self.max_allowed()),
            payment_date: today(),
            notes: String::new(),
        }
    }

    fn from_row(&self, _: &Commission) -> PayoutDraft {
        self.blank()
    }

    fn validate(&self, draft: &PayoutDraft, mode: &FormMode<Commission>) -> AppResult<()> {
        if mode.is_edit() {
            return Err(AppError::validation("Pagamentos de comissão não podem ser editados"));
        }
        if self.commission.is_none() {
            return Err(AppError::validation("Selecione a comissão"));
        }
        validate_payment_amount(draft.amount.value(), self.max_allowed())
    }

    async fn submit(
        &self,
        backend: &dyn Backend,
        draft: &PayoutDraft,
        _: &FormMode<Commission>,
    ) -> AppResult<()> {
        let commission = self
            .commission
            .as_ref()
            .ok_or_else(|| AppError::validation("Selecione a comissão"))?;
        backend
            .rpc(
                PAY_FN,
                json!({
                    "p_commission_id": commission.id,
                    "p_amount": draft.amount.value(),
                    "p_payment_date": draft.payment_date,
                    "p_notes": non_blank(&draft.notes),
                }),
            )
            .await?;
        Ok(())
    }

    fn success_message(&self, _: &FormMode<Commission>) -> String {
        "Comissão paga com sucesso".into()
    }

    fn failure_message(&self) -> &str {
        "Erro ao pagar comissão"
    }
}

pub fn columns() -> Vec<Column<Commission>> {
    vec![
        Column::accessor("Vendedor", "seller_name", |c: &Commission| {
            CellValue::opt_text(c.seller_name.as_deref())
        }),
        Column::accessor("Data da venda", "sale_date", |c: &Commission| {
            CellValue::opt_date(c.sale_date)
        }),
        Column::custom(
            "Taxa",
            "rate",
            |c: &Commission| CellValue::Number(c.rate),
            |c: &Commission| format!("{}%", c.rate),
        ),
        Column::accessor("Comissão", "commission_amount", |c: &Commission| {
            CellValue::Money(c.commission_amount)
        }),
        Column::accessor("Pago", "paid_amount", |c: &Commission| CellValue::Money(c.paid_amount)),
        Column::accessor("Saldo", "balance", |c: &Commission| CellValue::Money(c.balance)),
    ]
}

pub type CommissionPage = ListPage<Commissions, PayoutForm>;

pub async fn mount(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> CommissionPage {
    ListPage::mount(Commissions, PayoutForm::default(), columns(), backend, notifier).await
}

pub fn open_payout(page: &mut CommissionPage, commission: Commission) {
    page.open_form(PayoutForm::for_commission(commission), None);
}
