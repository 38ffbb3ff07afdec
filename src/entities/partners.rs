//! Partner equity: who owns what share, and the capital each one put in or
//! took out. Rows are read from `partners_view`, which carries the capital
//! balance the backend nets from `partner_transactions`.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::{delete_by_id, non_blank, require_text, status_label, today, Id};
use crate::api::{fetch_rows, Backend, Filter, Order, Select};
use crate::error::{AppError, AppResult};
use crate::filter::Filterable;
use crate::form::{EntityForm, FormMode};
use crate::money::CurrencyInput;
use crate::notify::Notifier;
use crate::page::ListPage;
use crate::remote::ListQuery;
use crate::table::{CellValue, Column};

const TABLE: &str = "partners";
const VIEW: &str = "partners_view";
const TRANSACTIONS: &str = "partner_transactions";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Partner {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub share_percent: f64,
    pub is_active: bool,
    /// Contributions minus withdrawals, computed by the backend.
    #[serde(default)]
    pub capital_balance: f64,
}

impl Filterable for Partner {
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

pub struct Partners;

#[async_trait]
impl ListQuery for Partners {
    type Row = Partner;

    fn source(&self) -> &str {
        VIEW
    }

    async fn fetch(&self, backend: &dyn Backend) -> AppResult<Vec<Partner>> {
        fetch_rows(backend, &Select::from(VIEW).order("name", Order::Asc)).await
    }

    fn failure_message(&self) -> &str {
        "Erro ao carregar sócios"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartnerDraft {
    pub name: String,
    pub document: String,
    pub email: String,
    pub share_percent: f64,
    pub is_active: bool,
}

impl Default for PartnerDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            document: String::new(),
            email: String::new(),
            share_percent: 0.0,
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PartnerForm;

#[async_trait]
impl EntityForm for PartnerForm {
    type Row = Partner;
    type Draft = PartnerDraft;

    fn blank(&self) -> PartnerDraft {
        PartnerDraft::default()
    }

    fn from_row(&self, row: &Partner) -> PartnerDraft {
        PartnerDraft {
            name: row.name.clone(),
            document: row.document.clone().unwrap_or_default(),
            email: row.email.clone().unwrap_or_default(),
            share_percent: row.share_percent,
            is_active: row.is_active,
        }
    }

    fn validate(&self, draft: &PartnerDraft, _: &FormMode<Partner>) -> AppResult<()> {
        require_text(&draft.name, "O nome do sócio é obrigatório")?;
        if !(0.0..=100.0).contains(&draft.share_percent) {
            return Err(AppError::validation(
                "A participação deve estar entre 0% e 100%",
            ));
        }
        Ok(())
    }

    async fn submit(
        &self,
        backend: &dyn Backend,
        draft: &PartnerDraft,
        mode: &FormMode<Partner>,
    ) -> AppResult<()> {
        let fields = json!({
            "name": draft.name.trim(),
            "document": non_blank(&draft.document),
            "email": non_blank(&draft.email),
            "share_percent": draft.share_percent,
            "is_active": draft.is_active,
        });
        match mode {
            FormMode::Create => {
                backend.insert(TABLE, fields).await?;
            }
            FormMode::Edit(partner) => {
                backend
                    .update(TABLE, &[Filter::eq("id", partner.id)], fields)
                    .await?;
            }
        }
        Ok(())
    }

    fn success_message(&self, mode: &FormMode<Partner>) -> String {
        if mode.is_edit() {
            "Sócio atualizado com sucesso".into()
        } else {
            "Sócio cadastrado com sucesso".into()
        }
    }

    fn failure_message(&self) -> &str {
        "Erro ao salvar sócio"
    }
}

pub async fn delete(backend: &dyn Backend, partner: &Partner) -> AppResult<()> {
    delete_by_id(backend, TABLE, partner.id).await
}

// -- Capital movements --------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Contribution,
    Withdrawal,
}

impl TransactionKind {
    pub fn label(self) -> &'static str {
        match self {
            TransactionKind::Contribution => "Aporte",
            TransactionKind::Withdrawal => "Retirada",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PartnerTransaction {
    pub id: Id,
    pub partner_id: Id,
    pub kind: TransactionKind,
    pub amount: f64,
    pub transaction_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDraft {
    pub kind: TransactionKind,
    pub amount: CurrencyInput,
    pub transaction_date: NaiveDate,
    pub notes: String,
}

impl TransactionDraft {
    pub fn new(kind: TransactionKind) -> Self {
        Self {
            kind,
            amount: CurrencyInput::default(),
            transaction_date: today(),
            notes: String::new(),
        }
    }
}

pub async fn transactions(
    backend: &dyn Backend,
    partner_id: Id,
) -> AppResult<Vec<PartnerTransaction>> {
    let query = Select::from(TRANSACTIONS)
        .eq("partner_id", partner_id)
        .order("transaction_date", Order::Desc);
    fetch_rows(backend, &query).await
}

/// Registers a contribution or withdrawal for one partner, or corrects an
/// existing one. The partner's balance is re-read from the view afterwards.
#[derive(Debug, Clone)]
pub struct TransactionForm {
    pub kind: TransactionKind,
    pub partner: Option<Partner>,
}

impl Default for TransactionForm {
    fn default() -> Self {
        Self {
            kind: TransactionKind::Contribution,
            partner: None,
        }
    }
}

impl TransactionForm {
    pub fn for_partner(kind: TransactionKind, partner: Partner) -> Self {
        Self {
            kind,
            partner: Some(partner),
        }
    }
}

#[async_trait]
impl EntityForm for TransactionForm {
    type Row = PartnerTransaction;
    type Draft = TransactionDraft;

    fn blank(&self) -> TransactionDraft {
        TransactionDraft::new(self.kind)
    }

    fn from_row(&self, row: &PartnerTransaction) -> TransactionDraft {
        TransactionDraft {
            kind: row.kind,
            amount: CurrencyInput::new(row.amount),
            transaction_date: row.transaction_date,
            notes: row.notes.clone().unwrap_or_default(),
        }
    }

    fn validate(
        &self,
        draft: &TransactionDraft,
        _: &FormMode<PartnerTransaction>,
    ) -> AppResult<()> {
        if self.partner.is_none() {
            return Err(AppError::validation("Selecione um sócio"));
        }
        if draft.amount.value() <= 0.0 {
            return Err(AppError::validation("O valor deve ser maior que zero"));
        }
        Ok(())
    }

    async fn submit(
        &self,
        backend: &dyn Backend,
        draft: &TransactionDraft,
        mode: &FormMode<PartnerTransaction>,
    ) -> AppResult<()> {
        let fields = json!({
            "kind": draft.kind,
            "amount": draft.amount.value(),
            "transaction_date": draft.transaction_date,
            "notes": non_blank(&draft.notes),
        });
        match (mode, &self.partner) {
            (FormMode::Create, Some(partner)) => {
                let mut row = fields;
                row["partner_id"] = json!(partner.id);
                backend.insert(TRANSACTIONS, row).await?;
            }
            (FormMode::Create, None) => {
                return Err(AppError::validation("Selecione um sócio"));
            }
            (FormMode::Edit(tx), _) => {
                backend
                    .update(TRANSACTIONS, &[Filter::eq("id", tx.id)], fields)
                    .await?;
            }
        }
        Ok(())
    }

    fn success_message(&self, mode: &FormMode<PartnerTransaction>) -> String {
        match (mode.is_edit(), self.kind) {
            (true, _) => "Movimentação atualizada".into(),
            (false, TransactionKind::Contribution) => "Aporte registrado com sucesso".into(),
            (false, TransactionKind::Withdrawal) => "Retirada registrada com sucesso".into(),
        }
    }

    fn failure_message(&self) -> &str {
        "Erro ao registrar movimentação"
    }
}

pub fn columns() -> Vec<Column<Partner>> {
    vec![
        Column::accessor("Nome", "name", |p: &Partner| CellValue::text(&p.name)),
        Column::accessor("Documento", "document", |p: &Partner| {
            CellValue::opt_text(p.document.as_deref())
        }),
        Column::custom(
            "Participação",
            "share_percent",
            |p: &Partner| CellValue::Number(p.share_percent),
            |p: &Partner| format!("{:.2}%", p.share_percent).replace('.', ","),
        ),
        Column::accessor("Capital", "capital_balance", |p: &Partner| {
            CellValue::Money(p.capital_balance)
        }),
        Column::custom(
            "Status",
            "is_active",
            |p: &Partner| CellValue::Bool(p.is_active),
            |p: &Partner| status_label(p.is_active),
        ),
    ]
}

pub type PartnerPage = ListPage<Partners, PartnerForm>;

pub async fn mount(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> PartnerPage {
    ListPage::mount(Partners, PartnerForm, columns(), backend, notifier).await
}

/// The same partner list, with contributions and withdrawals as its form.
pub type CapitalPage = ListPage<Partners, TransactionForm>;

pub async fn mount_capital(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> CapitalPage {
    ListPage::mount(Partners, TransactionForm::default(), columns(), backend, notifier).await
}

pub fn open_transaction(page: &mut CapitalPage, partner: Partner, kind: TransactionKind) {
    page.open_form(TransactionForm::for_partner(kind, partner), None);
}

/// Correct a recorded movement of `partner`.
pub fn open_transaction_edit(page: &mut CapitalPage, partner: Partner, tx: PartnerTransaction) {
    page.open_form(TransactionForm::for_partner(tx.kind, partner), Some(tx));
}
