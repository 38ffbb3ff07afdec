//! Accounts receivable and payable, and the payments that settle them.
//!
//! Balances are computed by the backend. The payment form only guards
//! against paying more than the balance it last read; a stale ceiling is
//! corrected by the refetch that follows every mutation.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{delete_by_id, non_blank, today, Id, PaymentMethod};
use crate::api::{fetch_rows, Backend, Filter, Order, Select};
use crate::error::{AppError, AppResult};
use crate::filter::Filterable;
use crate::form::{EntityForm, FormMode};
use crate::money::{validate_payment_amount, CurrencyInput, PAYMENT_EPSILON};
use crate::notify::Notifier;
use crate::page::ListPage;
use crate::remote::ListQuery;
use crate::table::{CellValue, Column};

const PAYMENTS_TABLE: &str = "debt_payments";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebtKind {
    Receivable,
    Payable,
}

impl DebtKind {
    pub fn view(self) -> &'static str {
        match self {
            DebtKind::Receivable => "accounts_receivable_view",
            DebtKind::Payable => "accounts_payable_view",
        }
    }

    fn pay_function(self) -> &'static str {
        match self {
            DebtKind::Receivable => "pay_receivable",
            DebtKind::Payable => "pay_payable",
        }
    }

    /// Discriminator stored on `debt_payments.debt_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            DebtKind::Receivable => "receivable",
            DebtKind::Payable => "payable",
        }
    }

    pub fn party_label(self) -> &'static str {
        match self {
            DebtKind::Receivable => "Cliente",
            DebtKind::Payable => "Fornecedor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Debt {
    pub id: Id,
    /// Customer for receivables, supplier for payables.
    #[serde(alias = "customer_name", alias = "supplier_name", default)]
    pub party_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub original_amount: f64,
    #[serde(default)]
    pub paid_amount: f64,
    pub balance: f64,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl Debt {
    pub fn is_settled(&self) -> bool {
        self.balance <= PAYMENT_EPSILON
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_settled() {
            "Quitado"
        } else if self.paid_amount > 0.0 {
            "Parcial"
        } else {
            "Em aberto"
        }
    }
}

impl Filterable for Debt {
    fn search_fields(&self) -> Vec<&str> {
        [self.party_name.as_deref(), self.description.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }

    /// Open debts count as active.
    fn is_active(&self) -> Option<bool> {
        Some(!self.is_settled())
    }
}

pub struct Debts {
    kind: DebtKind,
}

impl Debts {
    pub fn new(kind: DebtKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl ListQuery for Debts {
    type Row = Debt;

    fn source(&self) -> &str {
        self.kind.view()
    }

    async fn fetch(&self, backend: &dyn Backend) -> AppResult<Vec<Debt>> {
        let query = Select::from(self.kind.view()).order("due_date", Order::Asc);
        fetch_rows(backend, &query).await
    }

    fn failure_message(&self) -> &str {
        match self.kind {
            DebtKind::Receivable => "Erro ao carregar contas a receber",
            DebtKind::Payable => "Erro ao carregar contas a pagar",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DebtPayment {
    pub id: Id,
    pub debt_type: String,
    pub debt_id: Id,
    pub amount: f64,
    pub payment_date: NaiveDate,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Payment history of one debt, newest first.
pub async fn payments(
    backend: &dyn Backend,
    kind: DebtKind,
    debt_id: Id,
) -> AppResult<Vec<DebtPayment>> {
    let query = Select::from(PAYMENTS_TABLE)
        .eq("debt_type", kind.as_str())
        .eq("debt_id", debt_id)
        .order("payment_date", Order::Desc);
    fetch_rows(backend, &query).await
}

pub async fn delete_payment(backend: &dyn Backend, payment: &DebtPayment) -> AppResult<()> {
    delete_by_id(backend, PAYMENTS_TABLE, payment.id).await
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentDraft {
    pub amount: CurrencyInput,
    pub payment_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub notes: String,
}

/// Payment form bound to the debt it settles.
#[derive(Debug, Clone)]
pub struct PaymentForm {
    kind: DebtKind,
    debt: Option<Debt>,
}

impl PaymentForm {
    pub fn new(kind: DebtKind) -> Self {
        Self { kind, debt: None }
    }

    pub fn for_debt(kind: DebtKind, debt: Debt) -> Self {
        Self {
            kind,
            debt: Some(debt),
        }
    }

    pub fn debt(&self) -> Option<&Debt> {
        self.debt.as_ref()
    }

    /// Ceiling for the amount field: the backend balance, plus the edited
    /// payment's own amount since it is already counted in that balance.
    pub fn max_allowed(&self, mode: &FormMode<DebtPayment>) -> f64 {
        let balance = self.debt.as_ref().map_or(0.0, |d| d.balance);
        match mode {
            FormMode::Create => balance,
            FormMode::Edit(payment) => balance + payment.amount,
        }
    }
}

#[async_trait]
impl EntityForm for PaymentForm {
    type Row = DebtPayment;
    type Draft = PaymentDraft;

    /// Pre-filled with the full balance.
    fn blank(&self) -> PaymentDraft {
        PaymentDraft {
            amount: CurrencyInput::new(self.debt.as_ref().map_or(0.0, |d| d.balance)),
            payment_date: today(),
            payment_method: PaymentMethod::default(),
            notes: String::new(),
        }
    }

    fn from_row(&self, row: &DebtPayment) -> PaymentDraft {
        PaymentDraft {
            amount: CurrencyInput::new(row.amount),
            payment_date: row.payment_date,
            payment_method: row.payment_method.unwrap_or_default(),
            notes: row.notes.clone().unwrap_or_default(),
        }
    }

    fn validate(&self, draft: &PaymentDraft, mode: &FormMode<DebtPayment>) -> AppResult<()> {
        if self.debt.is_none() {
            return Err(AppError::validation("Selecione a conta a ser paga"));
        }
        validate_payment_amount(draft.amount.value(), self.max_allowed(mode))
    }

    async fn submit(
        &self,
        backend: &dyn Backend,
        draft: &PaymentDraft,
        mode: &FormMode<DebtPayment>,
    ) -> AppResult<()> {
        let debt = self
            .debt
            .as_ref()
            .ok_or_else(|| AppError::validation("Selecione a conta a ser paga"))?;
        match mode {
            FormMode::Create => {
                backend
                    .rpc(
                        self.kind.pay_function(),
                        json!({
                            "p_debt_id": debt.id,
                            "p_amount": draft.amount.value(),
                            "p_payment_date": draft.payment_date,
                            "p_payment_method": draft.payment_method,
                            "p_notes": non_blank(&draft.notes),
                        }),
                    )
                    .await?;
            }
            FormMode::Edit(payment) => {
                backend
                    .update(
                        PAYMENTS_TABLE,
                        &[Filter::eq("id", payment.id)],
                        json!({
                            "amount": draft.amount.value(),
                            "payment_date": draft.payment_date,
                            "payment_method": draft.payment_method,
                            "notes": non_blank(&draft.notes),
                        }),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    fn success_message(&self, mode: &FormMode<DebtPayment>) -> String {
        if mode.is_edit() {
            "Pagamento atualizado com sucesso".into()
        } else {
            "Pagamento registrado com sucesso".into()
        }
    }

    fn failure_message(&self) -> &str {
        "Erro ao registrar pagamento"
    }
}

pub fn columns(kind: DebtKind) -> Vec<Column<Debt>> {
    vec![
        Column::accessor(kind.party_label(), "party_name", |d: &Debt| {
            CellValue::opt_text(d.party_name.as_deref())
        }),
        Column::accessor("Descrição", "description", |d: &Debt| {
            CellValue::opt_text(d.description.as_deref())
        }),
        Column::accessor("Vencimento", "due_date", |d: &Debt| CellValue::opt_date(d.due_date)),
        Column::accessor("Valor", "original_amount", |d: &Debt| {
            CellValue::Money(d.original_amount)
        }),
        Column::accessor("Pago", "paid_amount", |d: &Debt| CellValue::Money(d.paid_amount)),
        Column::accessor("Saldo", "balance", |d: &Debt| CellValue::Money(d.balance)),
        Column::custom(
            "Situação",
            "status",
            |d: &Debt| CellValue::text(d.status_label()),
            |d: &Debt| d.status_label().to_string(),
        ),
    ]
}

pub type DebtPage = ListPage<Debts, PaymentForm>;

pub async fn mount(
    kind: DebtKind,
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
) -> DebtPage {
    ListPage::mount(
        Debts::new(kind),
        PaymentForm::new(kind),
        columns(kind),
        backend,
        notifier,
    )
    .await
}

/// Open the payment modal for `debt` as currently listed.
pub fn open_payment(page: &mut DebtPage, debt: Debt) {
    let kind = page.remote().query().kind;
    page.open_form(PaymentForm::for_debt(kind, debt), None);
}

/// Open an existing payment of `debt` for editing.
pub fn open_payment_edit(page: &mut DebtPage, debt: Debt, payment: DebtPayment) {
    let kind = page.remote().query().kind;
    page.open_form(PaymentForm::for_debt(kind, debt), Some(payment));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{Call, FakeBackend};
    use crate::form::SubmitOutcome;
    use crate::notify::{ToastKind, ToastQueue};
    use serde_json::Value;

    const VIEW: &str = "accounts_receivable_view";

    fn debt_row(id: i64, original: f64, paid: f64) -> Value {
        json!({
            "id": id, "customer_name": "Maria", "description": "Venda #12",
            "original_amount": original, "paid_amount": paid,
            "balance": original - paid, "due_date": "2026-03-01",
        })
    }

    fn debt(original: f64, paid: f64) -> Debt {
        serde_json::from_value(debt_row(1, original, paid)).unwrap()
    }

    fn payment(amount: f64) -> DebtPayment {
        serde_json::from_value(json!({
            "id": 9, "debt_type": "receivable", "debt_id": 1,
            "amount": amount, "payment_date": "2026-02-01",
        }))
        .unwrap()
    }

    fn check(form: &PaymentForm, amount: f64, mode: &FormMode<DebtPayment>) -> AppResult<()> {
        let mut draft = form.blank();
        draft.amount.set_value(amount);
        form.validate(&draft, mode)
    }

    #[test]
    fn amount_is_capped_at_balance_plus_epsilon() {
        let form = PaymentForm::for_debt(DebtKind::Receivable, debt(100.0, 0.0));
        assert!(check(&form, 100.0, &FormMode::Create).is_ok());
        assert!(check(&form, 99.99, &FormMode::Create).is_ok());
        let err = check(&form, 100.02, &FormMode::Create).unwrap_err();
        assert!(err.to_string().contains("R$ 100,00"));
        assert!(check(&form, 0.0, &FormMode::Create).is_err());
        assert!(check(&form, -5.0, &FormMode::Create).is_err());
    }

    #[test]
    fn edit_mode_adds_back_the_payment_being_edited() {
        let form = PaymentForm::for_debt(DebtKind::Receivable, debt(100.0, 60.0));
        let editing = FormMode::Edit(payment(60.0));
        assert_eq!(form.max_allowed(&editing), 100.0);
        assert!(check(&form, 100.0, &editing).is_ok());
        assert!(check(&form, 100.0, &FormMode::Create).is_err());
    }

    #[test]
    fn party_name_reads_either_view() {
        let payable: Debt = serde_json::from_value(json!({
            "id": 2, "supplier_name": "Tecidos SA",
            "original_amount": 10.0, "balance": 10.0,
        }))
        .unwrap();
        assert_eq!(payable.party_name.as_deref(), Some("Tecidos SA"));
        assert_eq!(payable.status_label(), "Em aberto");
        assert_eq!(debt(10.0, 10.0).status_label(), "Quitado");
        assert_eq!(debt(10.0, 4.0).status_label(), "Parcial");
    }

    #[tokio::test]
    async fn pay_goes_through_rpc_and_refetches() {
        let backend = Arc::new(FakeBackend::new().with_table(VIEW, vec![debt_row(1, 100.0, 0.0)]));
        backend.on_rpc("pay_receivable", |tables, p| {
            let amount = p["p_amount"].as_f64().unwrap_or(0.0);
            if let Some(row) = tables.get_mut(VIEW).and_then(|rows| rows.first_mut()) {
                let paid = row["paid_amount"].as_f64().unwrap_or(0.0) + amount;
                row["paid_amount"] = json!(paid);
                row["balance"] = json!(row["original_amount"].as_f64().unwrap_or(0.0) - paid);
            }
            Ok(Value::Null)
        });
        let toasts = Arc::new(ToastQueue::new());
        let mut page = mount(DebtKind::Receivable, backend.clone(), toasts.clone()).await;

        let row = page.rows()[0].clone();
        open_payment(&mut page, row);
        assert_eq!(page.modal().unwrap().draft().amount.value(), 100.0);
        page.modal_mut().unwrap().draft_mut().amount.on_input("4000");
        assert_eq!(page.submit_modal().await, SubmitOutcome::Saved);

        assert!(page.modal().is_none());
        assert_eq!(page.rows()[0].balance, 60.0);
        assert!(backend.calls().iter().any(|c| matches!(
            c,
            Call::Rpc(name, p) if name == "pay_receivable" && p["p_debt_id"] == 1 && p["p_amount"] == 40.0
        )));
        assert_eq!(toasts.of_kind(ToastKind::Success).len(), 1);
    }

    #[tokio::test]
    async fn ceiling_follows_the_refetched_balance_after_a_delete() {
        let backend = Arc::new(FakeBackend::new().with_table(VIEW, vec![debt_row(1, 100.0, 60.0)]));
        backend.set_table(
            PAYMENTS_TABLE,
            vec![json!({
                "id": 9, "debt_type": "receivable", "debt_id": 1,
                "amount": 60.0, "payment_date": "2026-02-01",
            })],
        );
        backend.on_rpc("pay_receivable", |_, _| Ok(Value::Null));
        let mut page = mount(DebtKind::Receivable, backend.clone(), Arc::new(ToastQueue::new())).await;

        let stale = page.rows()[0].clone();
        let history = payments(backend.as_ref(), DebtKind::Receivable, stale.id).await.unwrap();
        assert_eq!(history.len(), 1);

        // The backend recomputes the balance once the payment is gone.
        backend.set_table(VIEW, vec![debt_row(1, 100.0, 0.0)]);
        let b = backend.clone();
        let target = history[0].clone();
        let ok = page
            .mutate(
                async move { delete_payment(b.as_ref(), &target).await },
                "Pagamento excluído",
                "Erro ao excluir pagamento",
            )
            .await;
        assert!(ok);
        assert!(payments(backend.as_ref(), DebtKind::Receivable, 1).await.unwrap().is_empty());

        let refreshed = page.rows()[0].clone();
        assert_eq!(refreshed.balance, 100.0);
        open_payment(&mut page, refreshed);
        let modal = page.modal().unwrap();
        assert_eq!(modal.form().max_allowed(modal.mode()), 100.0);

        // A form opened from the stale row would have refused this amount.
        let stale_form = PaymentForm::for_debt(DebtKind::Receivable, stale);
        assert!(check(&stale_form, 100.0, &FormMode::Create).is_err());
        page.modal_mut().unwrap().draft_mut().amount.set_value(100.0);
        assert_eq!(page.submit_modal().await, SubmitOutcome::Saved);
    }

    #[tokio::test]
    async fn editing_a_payment_updates_debt_payments() {
        let backend = Arc::new(FakeBackend::new().with_table(VIEW, vec![debt_row(1, 100.0, 60.0)]));
        let mut page = mount(DebtKind::Receivable, backend.clone(), Arc::new(ToastQueue::new())).await;

        let row = page.rows()[0].clone();
        open_payment_edit(&mut page, row, payment(60.0));
        page.modal_mut().unwrap().draft_mut().amount.set_value(90.0);
        assert_eq!(page.submit_modal().await, SubmitOutcome::Saved);
        assert!(backend.calls().iter().any(|c| matches!(
            c,
            Call::Update(t, _, patch) if t == PAYMENTS_TABLE && patch["amount"] == 90.0
        )));
    }

    #[tokio::test]
    async fn create_without_a_debt_is_refused() {
        let backend = Arc::new(FakeBackend::new());
        let mut page = mount(DebtKind::Payable, backend.clone(), Arc::new(ToastQueue::new())).await;
        backend.clear_calls();
        page.open_create();
        assert_eq!(page.submit_modal().await, SubmitOutcome::Rejected);
        assert!(backend.calls().is_empty());
    }
}
