//! Dashboard and financial report. Both are aggregated by backend
//! functions and loaded through [`RemoteData`] like any list; the client
//! only totals the rows for the footer.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use super::{today, Id};
use crate::api::{rpc_rows, Backend};
use crate::error::{AppError, AppResult};
use crate::money::round2;
use crate::notify::Notifier;
use crate::remote::{ListQuery, RemoteData};

const DASHBOARD_FN: &str = "get_dashboard_summary";
const FINANCIAL_FN: &str = "get_financial_report";

/// Inclusive date range, optionally narrowed to one cost center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    start: NaiveDate,
    end: NaiveDate,
    cost_center_id: Option<Id>,
}

impl ReportPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate, cost_center_id: Option<Id>) -> AppResult<Self> {
        if start > end {
            return Err(AppError::validation(
                "A data inicial deve ser anterior à data final",
            ));
        }
        Ok(Self {
            start,
            end,
            cost_center_id,
        })
    }

    /// First day of `on`'s month through `on`.
    pub fn month_to_date(on: NaiveDate) -> Self {
        Self {
            start: on.with_day(1).unwrap_or(on),
            end: on,
            cost_center_id: None,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn cost_center_id(&self) -> Option<Id> {
        self.cost_center_id
    }

    fn params(&self) -> Value {
        json!({
            "p_start_date": self.start,
            "p_end_date": self.end,
            "p_cost_center_id": self.cost_center_id,
        })
    }
}

// -- Dashboard ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct DashboardSummary {
    pub total_sales: f64,
    pub sales_count: i64,
    pub total_purchases: f64,
    pub total_expenses: f64,
    pub receivables_open: f64,
    pub payables_open: f64,
    pub commissions_open: f64,
    pub low_stock_count: i64,
}

impl DashboardSummary {
    pub fn average_ticket(&self) -> f64 {
        if self.sales_count == 0 {
            0.0
        } else {
            round2(self.total_sales / self.sales_count as f64)
        }
    }
}

pub struct Dashboard {
    period: ReportPeriod,
}

#[async_trait]
impl ListQuery for Dashboard {
    type Row = DashboardSummary;

    fn source(&self) -> &str {
        DASHBOARD_FN
    }

    async fn fetch(&self, backend: &dyn Backend) -> AppResult<Vec<DashboardSummary>> {
        let params = json!({
            "p_start_date": self.period.start,
            "p_end_date": self.period.end,
        });
        rpc_rows(backend, DASHBOARD_FN, params).await
    }

    fn failure_message(&self) -> &str {
        "Erro ao carregar o painel"
    }
}

/// Month-to-date dashboard.
pub async fn mount_dashboard(
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
) -> RemoteData<Dashboard> {
    let query = Dashboard {
        period: ReportPeriod::month_to_date(today()),
    };
    RemoteData::mount(query, backend, notifier).await
}

/// The single summary row, or zeros before the first successful load.
pub fn summary(remote: &RemoteData<Dashboard>) -> DashboardSummary {
    remote.data().into_iter().next().unwrap_or_default()
}

// -- Financial report -----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FinancialLine {
    /// Month label as produced by the backend, e.g. `2026-01`.
    pub period: String,
    #[serde(default)]
    pub cost_center_name: Option<String>,
    #[serde(default)]
    pub revenue: f64,
    #[serde(default)]
    pub cost_of_goods: f64,
    #[serde(default)]
    pub expenses: f64,
    #[serde(default)]
    pub commissions: f64,
}

impl FinancialLine {
    pub fn net_result(&self) -> f64 {
        round2(self.revenue - self.cost_of_goods - self.expenses - self.commissions)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FinancialTotals {
    pub revenue: f64,
    pub cost_of_goods: f64,
    pub expenses: f64,
    pub commissions: f64,
    pub net_result: f64,
}

impl FinancialTotals {
    /// Net result over revenue, in percent.
    pub fn margin_percent(&self) -> Option<f64> {
        (self.revenue > 0.0).then(|| round2(self.net_result / self.revenue * 100.0))
    }
}

pub fn totals(lines: &[FinancialLine]) -> FinancialTotals {
    let sum = |f: fn(&FinancialLine) -> f64| round2(lines.iter().map(f).sum());
    FinancialTotals {
        revenue: sum(|l| l.revenue),
        cost_of_goods: sum(|l| l.cost_of_goods),
        expenses: sum(|l| l.expenses),
        commissions: sum(|l| l.commissions),
        net_result: sum(FinancialLine::net_result),
    }
}

pub struct FinancialReport {
    period: Mutex<ReportPeriod>,
}

impl FinancialReport {
    pub fn new(period: ReportPeriod) -> Self {
        Self {
            period: Mutex::new(period),
        }
    }

    pub fn period(&self) -> ReportPeriod {
        self.period
            .lock()
            .map(|p| *p)
            .unwrap_or_else(|_| ReportPeriod::month_to_date(today()))
    }

    fn set_period(&self, period: ReportPeriod) {
        if let Ok(mut current) = self.period.lock() {
            *current = period;
        }
    }
}

#[async_trait]
impl ListQuery for FinancialReport {
    type Row = FinancialLine;

    fn source(&self) -> &str {
        FINANCIAL_FN
    }

    async fn fetch(&self, backend: &dyn Backend) -> AppResult<Vec<FinancialLine>> {
        rpc_rows(backend, FINANCIAL_FN, self.period().params()).await
    }

    fn failure_message(&self) -> &str {
        "Erro ao gerar relatório"
    }
}

pub async fn mount_financial(
    period: ReportPeriod,
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
) -> RemoteData<FinancialReport> {
    RemoteData::mount(FinancialReport::new(period), backend, notifier).await
}

/// Re-run the report for another period.
pub async fn change_period(remote: &RemoteData<FinancialReport>, period: ReportPeriod) {
    remote.query().set_period(period);
    remote.refetch().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{Call, FakeBackend};
    use crate::notify::ToastQueue;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn period_must_be_ordered() {
        let err = ReportPeriod::new(date(2026, 2, 1), date(2026, 1, 31), None).unwrap_err();
        assert!(err.is_validation());
        assert!(ReportPeriod::new(date(2026, 1, 31), date(2026, 1, 31), Some(3)).is_ok());
        assert_eq!(
            ReportPeriod::month_to_date(date(2026, 3, 17)).start(),
            date(2026, 3, 1)
        );
    }

    #[tokio::test]
    async fn dashboard_reads_a_single_object() {
        let backend = Arc::new(FakeBackend::new());
        backend.on_rpc(DASHBOARD_FN, |_, _| {
            Ok(json!({ "total_sales": 1000.0, "sales_count": 8, "receivables_open": 150.0 }))
        });
        let remote = mount_dashboard(backend, Arc::new(ToastQueue::new())).await;
        let s = summary(&remote);
        assert_eq!(s.total_sales, 1000.0);
        assert_eq!(s.average_ticket(), 125.0);
        assert_eq!(s.payables_open, 0.0);
    }

    #[tokio::test]
    async fn dashboard_failure_leaves_zeros_and_toasts() {
        let backend = Arc::new(FakeBackend::new());
        let toasts = Arc::new(ToastQueue::new());
        let remote = mount_dashboard(backend, toasts.clone()).await;
        assert_eq!(summary(&remote), DashboardSummary::default());
        assert_eq!(toasts.visible().len(), 1);
    }

    #[tokio::test]
    async fn financial_report_sends_period_and_totals_rows() {
        let backend = Arc::new(FakeBackend::new());
        backend.on_rpc(FINANCIAL_FN, |_, p| {
            if p["p_start_date"] == "2026-01-01" {
                Ok(json!([
                    { "period": "2026-01", "revenue": 1000.0, "cost_of_goods": 400.0,
                      "expenses": 200.0, "commissions": 50.0 },
                    { "period": "2026-02", "revenue": 500.0, "cost_of_goods": 300.0,
                      "expenses": 250.0 },
                ]))
            } else {
                Ok(Value::Null)
            }
        });
        let period = ReportPeriod::new(date(2026, 1, 1), date(2026, 2, 28), Some(4)).unwrap();
        let remote = mount_financial(period, backend.clone(), Arc::new(ToastQueue::new())).await;

        let lines = remote.data();
        assert_eq!(lines[0].net_result(), 350.0);
        assert_eq!(lines[1].net_result(), -50.0);
        let t = totals(&lines);
        assert_eq!(t.revenue, 1500.0);
        assert_eq!(t.net_result, 300.0);
        assert_eq!(t.margin_percent(), Some(20.0));
        assert!(matches!(
            &backend.calls()[0],
            Call::Rpc(name, p) if name == FINANCIAL_FN && p["p_cost_center_id"] == 4
        ));

        let march = ReportPeriod::new(date(2026, 3, 1), date(2026, 3, 31), None).unwrap();
        change_period(&remote, march).await;
        assert!(remote.data().is_empty());
        assert_eq!(remote.query().period(), march);
    }
}
