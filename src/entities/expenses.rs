//! Operating expenses. Read from `expenses_view` (joined cost center name),
//! written to `expenses`.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{delete_by_id, non_blank, require_text, today, Id, PaymentMethod};
use crate::api::{fetch_rows, Backend, Filter, Order, Select};
use crate::error::{AppError, AppResult};
use crate::filter::Filterable;
use crate::form::{EntityForm, FormMode};
use crate::money::CurrencyInput;
use crate::notify::Notifier;
use crate::page::ListPage;
use crate::remote::ListQuery;
use crate::table::{CellValue, Column};

const VIEW: &str = "expenses_view";
const TABLE: &str = "expenses";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Expense {
    pub id: Id,
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    pub amount: f64,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub paid_at: Option<NaiveDate>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub cost_center_id: Option<Id>,
    #[serde(default)]
    pub cost_center_name: Option<String>,
}

impl Expense {
    pub fn is_paid(&self) -> bool {
        self.paid_at.is_some()
    }

    pub fn is_overdue(&self, on: NaiveDate) -> bool {
        !self.is_paid() && self.due_date < on
    }
}

impl Filterable for Expense {
    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.description.as_str()];
        fields.extend(self.category.as_deref());
        fields.extend(self.cost_center_name.as_deref());
        fields
    }

    /// "Active" here means still open.
    fn is_active(&self) -> Option<bool> {
        Some(!self.is_paid())
    }
}

pub struct Expenses;

#[async_trait]
impl ListQuery for Expenses {
    type Row = Expense;

    fn source(&self) -> &str {
        VIEW
    }

    async fn fetch(&self, backend: &dyn Backend) -> AppResult<Vec<Expense>> {
        fetch_rows(backend, &Select::from(VIEW).order("due_date", Order::Asc)).await
    }

    fn failure_message(&self) -> &str {
        "Erro ao carregar despesas"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseDraft {
    pub description: String,
    pub category: String,
    pub amount: CurrencyInput,
    pub due_date: Option<NaiveDate>,
    pub cost_center_id: Option<Id>,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExpenseForm;

#[async_trait]
impl EntityForm for ExpenseForm {
    type Row = Expense;
    type Draft = ExpenseDraft;

    fn blank(&self) -> ExpenseDraft {
        ExpenseDraft {
            description: String::new(),
            category: String::new(),
            amount: CurrencyInput::default(),
            due_date: Some(today()),
            cost_center_id: None,
            payment_method: PaymentMethod::default(),
        }
    }

    fn from_row(&self, row: &Expense) -> ExpenseDraft {
        ExpenseDraft {
            description: row.description.clone(),
            category: row.category.clone().unwrap_or_default(),
            amount: CurrencyInput::new(row.amount),
            due_date: Some(row.due_date),
            cost_center_id: row.cost_center_id,
            payment_method: row.payment_method.unwrap_or_default(),
        }
    }

    fn validate(&self, draft: &ExpenseDraft, _: &FormMode<Expense>) -> AppResult<()> {
        require_text(&draft.description, "A descrição é obrigatória")?;
        if draft.amount.value() <= 0.0 {
            return Err(AppError::validation("O valor deve ser maior que zero"));
        }
        if draft.due_date.is_none() {
            return Err(AppError::validation("Informe a data de vencimento"));
        }
        Ok(())
    }

    async fn submit(
        &self,
        backend: &dyn Backend,
        draft: &ExpenseDraft,
        mode: &FormMode<Expense>,
    ) -> AppResult<()> {
        let fields = json!({
            "description": draft.description.trim(),
            "category": non_blank(&draft.category),
            "amount": draft.amount.value(),
            "due_date": draft.due_date,
            "cost_center_id": draft.cost_center_id,
            "payment_method": draft.payment_method,
        });
        match mode {
            FormMode::Create => {
                backend.insert(TABLE, fields).await?;
            }
            FormMode::Edit(expense) => {
                backend
                    .update(TABLE, &[Filter::eq("id", expense.id)], fields)
                    .await?;
            }
        }
        Ok(())
    }

    fn success_message(&self, mode: &FormMode<Expense>) -> String {
        if mode.is_edit() {
            "Despesa atualizada com sucesso".into()
        } else {
            "Despesa registrada com sucesso".into()
        }
    }

    fn failure_message(&self) -> &str {
        "Erro ao salvar despesa"
    }
}

/// Mark paid today, or reopen a paid expense.
pub async fn toggle_paid(backend: &dyn Backend, expense: &Expense) -> AppResult<()> {
    let paid_at = if expense.is_paid() {
        Value::Null
    } else {
        json!(today())
    };
    backend
        .update(
            TABLE,
            &[Filter::eq("id", expense.id)],
            json!({ "paid_at": paid_at }),
        )
        .await?;
    Ok(())
}

pub async fn delete(backend: &dyn Backend, expense: &Expense) -> AppResult<()> {
    delete_by_id(backend, TABLE, expense.id).await
}

pub fn columns() -> Vec<Column<Expense>> {
    vec![
        Column::accessor("Descrição", "description", |e: &Expense| {
            CellValue::text(&e.description)
        }),
        Column::accessor("Categoria", "category", |e: &Expense| {
            CellValue::opt_text(e.category.as_deref())
        }),
        Column::accessor("Centro de custo", "cost_center_name", |e: &Expense| {
            CellValue::opt_text(e.cost_center_name.as_deref())
        }),
        Column::accessor("Vencimento", "due_date", |e: &Expense| CellValue::Date(e.due_date)),
        Column::accessor("Valor", "amount", |e: &Expense| CellValue::Money(e.amount)),
        Column::custom(
            "Situação",
            "paid_at",
            |e: &Expense| CellValue::opt_date(e.paid_at),
            |e: &Expense| {
                if e.is_paid() {
                    "Pago".to_string()
                } else if e.is_overdue(today()) {
                    "Vencido".to_string()
                } else {
                    "Em aberto".to_string()
                }
            },
        ),
    ]
}

pub type ExpensePage = ListPage<Expenses, ExpenseForm>;

pub async fn mount(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> ExpensePage {
    ListPage::mount(Expenses, ExpenseForm, columns(), backend, notifier).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{Call, FakeBackend};
    use crate::filter::StatusFilter;
    use crate::form::SubmitOutcome;
    use crate::notify::ToastQueue;

    fn expense(id: i64, amount: f64, due: &str, paid: Option<&str>) -> Value {
        json!({
            "id": id, "description": format!("Conta {id}"), "amount": amount,
            "due_date": due, "paid_at": paid, "cost_center_name": "Loja 1",
        })
    }

    #[tokio::test]
    async fn amount_must_be_positive() {
        let backend = Arc::new(FakeBackend::new());
        let mut page = mount(backend.clone(), Arc::new(ToastQueue::new())).await;
        backend.clear_calls();

        page.open_create();
        let draft = page.modal_mut().unwrap().draft_mut();
        draft.description = "Aluguel".into();
        assert_eq!(page.submit_modal().await, SubmitOutcome::Rejected);

        let draft = page.modal_mut().unwrap().draft_mut();
        draft.amount.on_input("R$ 1.500,00");
        draft.due_date = None;
        assert_eq!(page.submit_modal().await, SubmitOutcome::Rejected);
        assert!(backend.calls().is_empty());

        page.modal_mut().unwrap().draft_mut().due_date = NaiveDate::from_ymd_opt(2026, 2, 5);
        assert_eq!(page.submit_modal().await, SubmitOutcome::Saved);
        assert!(backend.calls().iter().any(|c| matches!(
            c,
            Call::Insert(t, row) if t == TABLE && row["amount"] == 1500.0 && row["due_date"] == "2026-02-05"
        )));
    }

    #[tokio::test]
    async fn status_filter_separates_open_and_paid() {
        let backend = Arc::new(FakeBackend::new().with_table(
            VIEW,
            vec![
                expense(1, 100.0, "2026-01-10", None),
                expense(2, 50.0, "2026-01-05", Some("2026-01-04")),
            ],
        ));
        let mut page = mount(backend, Arc::new(ToastQueue::new())).await;
        page.set_status(StatusFilter::Inactive);
        let view = page.view();
        assert_eq!(view.total_rows, 1);
        assert_eq!(view.rows()[0][0], "Conta 2");
        assert_eq!(view.rows()[0][5], "Pago");
    }

    #[test]
    fn overdue_only_while_open() {
        let row: Expense =
            serde_json::from_value(expense(1, 10.0, "2026-01-10", None)).unwrap();
        let after = NaiveDate::from_ymd_opt(2026, 1, 11).unwrap();
        assert!(row.is_overdue(after));
        assert!(!row.is_overdue(row.due_date));

        let paid: Expense =
            serde_json::from_value(expense(2, 10.0, "2026-01-10", Some("2026-01-12"))).unwrap();
        assert!(!paid.is_overdue(after));
    }

    #[tokio::test]
    async fn toggle_paid_sets_and_clears_date() {
        let backend = FakeBackend::new();
        let open: Expense = serde_json::from_value(expense(1, 10.0, "2026-01-10", None)).unwrap();
        toggle_paid(&backend, &open).await.unwrap();
        let paid: Expense =
            serde_json::from_value(expense(1, 10.0, "2026-01-10", Some("2026-01-12"))).unwrap();
        toggle_paid(&backend, &paid).await.unwrap();

        let patches: Vec<Value> = backend
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Update(_, _, patch) => Some(patch),
                _ => None,
            })
            .collect();
        assert_eq!(patches[0]["paid_at"], json!(today()));
        assert!(patches[1]["paid_at"].is_null());
    }
}
