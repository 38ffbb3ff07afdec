//! Generic table model: column descriptors, sorting and pagination over an
//! in-memory row slice.
//!
//! Rendering order is fixed: sort by the active [`SortConfig`] (stable, so
//! equal keys keep their input order), then cut the current page window of
//! [`PAGE_SIZE`] rows.

use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Ordering;

use crate::money::format_currency;

pub const PAGE_SIZE: usize = 10;

pub const NO_DATA_PLACEHOLDER: &str = "Nenhum registro encontrado.";

// ---------------------------------------------------------------------------
// Cell values
// ---------------------------------------------------------------------------

/// A typed cell, used both for display and as the sort key.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Money(f64),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Bool(bool),
    Empty,
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    pub fn opt_text(s: Option<&str>) -> Self {
        match s {
            Some(s) if !s.is_empty() => CellValue::Text(s.to_string()),
            _ => CellValue::Empty,
        }
    }

    pub fn opt_date(d: Option<NaiveDate>) -> Self {
        d.map(CellValue::Date).unwrap_or(CellValue::Empty)
    }

    pub fn display(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{n:.0}")
                } else {
                    format!("{n:.2}").replace('.', ",")
                }
            }
            CellValue::Money(v) => format_currency(*v),
            CellValue::Date(d) => d.format("%d/%m/%Y").to_string(),
            CellValue::DateTime(dt) => dt.format("%d/%m/%Y %H:%M").to_string(),
            CellValue::Bool(true) => "Sim".to_string(),
            CellValue::Bool(false) => "Não".to_string(),
            CellValue::Empty => "-".to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            CellValue::Bool(_) => 0,
            CellValue::Number(_) | CellValue::Money(_) => 1,
            CellValue::Date(_) | CellValue::DateTime(_) => 2,
            CellValue::Text(_) => 3,
            CellValue::Empty => 4,
        }
    }

    /// Total order: numbers by value, dates chronologically, text
    /// case-insensitively, empty cells last. Mixed kinds order by kind.
    pub fn compare(&self, other: &Self) -> Ordering {
        use CellValue::*;
        match (self, other) {
            (Number(a) | Money(a), Number(b) | Money(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Date(a), Date(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (Date(a), DateTime(b)) => a.cmp(&b.date_naive()),
            (DateTime(a), Date(b)) => a.date_naive().cmp(b),
            (Text(a), Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            (Bool(a), Bool(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// How a column produces its cell.
pub enum ColumnKind<T> {
    /// Display is derived from the cell value.
    Accessor(fn(&T) -> CellValue),
    /// Display comes from a dedicated renderer; `sort_value` still drives
    /// ordering.
    Custom {
        sort_value: fn(&T) -> CellValue,
        render: fn(&T) -> String,
    },
}

pub struct Column<T> {
    pub header: &'static str,
    pub key: &'static str,
    pub sortable: bool,
    pub kind: ColumnKind<T>,
}

impl<T> Column<T> {
    pub fn accessor(header: &'static str, key: &'static str, get: fn(&T) -> CellValue) -> Self {
        Self {
            header,
            key,
            sortable: true,
            kind: ColumnKind::Accessor(get),
        }
    }

    pub fn custom(
        header: &'static str,
        key: &'static str,
        sort_value: fn(&T) -> CellValue,
        render: fn(&T) -> String,
    ) -> Self {
        Self {
            header,
            key,
            sortable: true,
            kind: ColumnKind::Custom { sort_value, render },
        }
    }

    pub fn unsortable(mut self) -> Self {
        self.sortable = false;
        self
    }

    pub fn value(&self, row: &T) -> CellValue {
        match &self.kind {
            ColumnKind::Accessor(get) => get(row),
            ColumnKind::Custom { sort_value, .. } => sort_value(row),
        }
    }

    pub fn render(&self, row: &T) -> String {
        match &self.kind {
            ColumnKind::Accessor(get) => get(row).display(),
            ColumnKind::Custom { render, .. } => render(row),
        }
    }
}

// ---------------------------------------------------------------------------
// Sort + page state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortConfig {
    pub key: &'static str,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableState {
    page: usize,
    sort: Option<SortConfig>,
}

impl Default for TableState {
    fn default() -> Self {
        Self { page: 1, sort: None }
    }
}

impl TableState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sort(key: &'static str, direction: SortDirection) -> Self {
        Self {
            page: 1,
            sort: Some(SortConfig { key, direction }),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn sort(&self) -> Option<&SortConfig> {
        self.sort.as_ref()
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn reset_page(&mut self) {
        self.page = 1;
    }

    /// Header click. Toggles direction on the active key, otherwise sorts
    /// ascending by the new key. Always returns to page 1.
    pub fn toggle_sort<T>(&mut self, columns: &[Column<T>], key: &'static str) {
        if !columns.iter().any(|c| c.key == key && c.sortable) {
            return;
        }
        self.sort = Some(match self.sort.take() {
            Some(SortConfig {
                key: active,
                direction,
            }) if active == key => SortConfig {
                key,
                direction: match direction {
                    SortDirection::Ascending => SortDirection::Descending,
                    SortDirection::Descending => SortDirection::Ascending,
                },
            },
            _ => SortConfig {
                key,
                direction: SortDirection::Ascending,
            },
        });
        self.reset_page();
    }

    /// Sort then paginate. Pure: identical inputs give identical output.
    pub fn render<T>(&self, columns: &[Column<T>], rows: &[T]) -> TableView {
        let mut ordered: Vec<&T> = rows.iter().collect();
        if let Some(sort) = &self.sort {
            if let Some(column) = columns.iter().find(|c| c.key == sort.key) {
                ordered.sort_by(|a, b| {
                    let ord = column.value(a).compare(&column.value(b));
                    match sort.direction {
                        SortDirection::Ascending => ord,
                        SortDirection::Descending => ord.reverse(),
                    }
                });
            }
        }

        let total_rows = ordered.len();
        let total_pages = total_rows.div_ceil(PAGE_SIZE).max(1);
        let page = self.page.min(total_pages);
        let start = (page - 1) * PAGE_SIZE;

        let headers = columns
            .iter()
            .map(|c| HeaderView {
                label: c.header,
                key: c.key,
                sortable: c.sortable,
                sorted: self
                    .sort
                    .as_ref()
                    .filter(|s| s.key == c.key)
                    .map(|s| s.direction),
            })
            .collect();

        let body = if total_rows == 0 {
            TableBody::Placeholder(NO_DATA_PLACEHOLDER)
        } else {
            TableBody::Rows(
                ordered
                    .into_iter()
                    .skip(start)
                    .take(PAGE_SIZE)
                    .map(|row| columns.iter().map(|c| c.render(row)).collect())
                    .collect(),
            )
        };

        TableView {
            headers,
            body,
            total_rows,
            pagination: (total_pages > 1).then_some(Pagination {
                current: page,
                total_pages,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Rendered output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderView {
    pub label: &'static str,
    pub key: &'static str,
    pub sortable: bool,
    pub sorted: Option<SortDirection>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableBody {
    Rows(Vec<Vec<String>>),
    /// Shown as a single full-width row.
    Placeholder(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub current: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableView {
    pub headers: Vec<HeaderView>,
    pub body: TableBody,
    pub total_rows: usize,
    /// `None` when everything fits on one page.
    pub pagination: Option<Pagination>,
}

impl TableView {
    pub fn rows(&self) -> &[Vec<String>] {
        match &self.body {
            TableBody::Rows(rows) => rows,
            TableBody::Placeholder(_) => &[],
        }
    }
}
