//! Screen composer: remote rows + filters + table + modal form.
//!
//! Every list screen has the same life: fetch on open, render the current
//! page of the locally filtered and sorted rows, open a modal, submit, then
//! close the modal and refetch. Any filter or sort change returns the table
//! to page 1.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use crate::api::Backend;
use crate::error::AppResult;
use crate::filter::{FilterState, Filterable, StatusFilter};
use crate::form::{EntityForm, FormHost, ModalForm, SubmitOutcome};
use crate::notify::Notifier;
use crate::remote::{ListQuery, RemoteData};
use crate::table::{Column, TableState, TableView};

pub struct ListPage<Q, F>
where
    Q: ListQuery,
    F: EntityForm + Clone,
{
    remote: RemoteData<Q>,
    filter: FilterState,
    table: TableState,
    columns: Vec<Column<Q::Row>>,
    form: F,
    modal: Option<ModalForm<F>>,
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
}

impl<Q, F> ListPage<Q, F>
where
    Q: ListQuery,
    Q::Row: Filterable,
    F: EntityForm + Clone,
{
    /// Build the screen and run the initial fetch.
    pub async fn mount(
        query: Q,
        form: F,
        columns: Vec<Column<Q::Row>>,
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let remote = RemoteData::mount(query, backend.clone(), notifier.clone()).await;
        Self {
            remote,
            filter: FilterState::default(),
            table: TableState::new(),
            columns,
            form,
            modal: None,
            backend,
            notifier,
        }
    }

    pub fn with_table_state(mut self, table: TableState) -> Self {
        self.table = table;
        self
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn remote(&self) -> &RemoteData<Q> {
        &self.remote
    }

    pub fn rows(&self) -> Vec<Q::Row> {
        self.remote.data()
    }

    pub fn loading(&self) -> bool {
        self.remote.loading()
    }

    pub fn filtered_rows(&self) -> Vec<Q::Row> {
        self.filter.apply(&self.remote.data())
    }

    pub fn view(&self) -> TableView {
        self.table.render(&self.columns, &self.filtered_rows())
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn table(&self) -> &TableState {
        &self.table
    }

    pub fn set_search(&mut self, text: &str) {
        if self.filter.set_search(text) {
            self.table.reset_page();
        }
    }

    pub fn set_status(&mut self, status: StatusFilter) {
        if self.filter.set_status(status) {
            self.table.reset_page();
        }
    }

    pub fn toggle_sort(&mut self, key: &'static str) {
        self.table.toggle_sort(&self.columns, key);
    }

    pub fn set_page(&mut self, page: usize) {
        self.table.set_page(page);
    }

    pub async fn refetch(&self) {
        self.remote.refetch().await;
    }

    /// Change a server-side filter held by the query, back to page 1, and
    /// re-read.
    pub async fn set_remote_filter(&mut self, apply: impl FnOnce(&Q)) {
        apply(self.remote.query());
        self.table.reset_page();
        self.remote.refetch().await;
    }

    // -- Modal ---------------------------------------------------------------

    pub fn open_create(&mut self) {
        self.open_form(self.form.clone(), None);
    }

    pub fn open_edit(&mut self, row: F::Row) {
        self.open_form(self.form.clone(), Some(row));
    }

    /// Open with a form configured for this one use, e.g. a payment form
    /// bound to the debt it settles.
    pub fn open_form(&mut self, form: F, entity: Option<F::Row>) {
        self.modal = Some(ModalForm::open(
            form,
            entity,
            self.backend.clone(),
            self.notifier.clone(),
        ));
    }

    pub fn modal(&self) -> Option<&ModalForm<F>> {
        self.modal.as_ref()
    }

    pub fn modal_mut(&mut self) -> Option<&mut ModalForm<F>> {
        self.modal.as_mut()
    }

    /// Cancel: the draft is discarded.
    pub fn close_modal(&mut self) {
        self.modal = None;
    }

    /// Submit the open modal. On success the modal is gone and the rows
    /// have been re-read; otherwise the modal stays open with its draft.
    pub async fn submit_modal(&mut self) -> SubmitOutcome {
        let Some(mut modal) = self.modal.take() else {
            return SubmitOutcome::Rejected;
        };
        let outcome = modal.submit(self).await;
        if outcome != SubmitOutcome::Saved {
            self.modal = Some(modal);
        }
        outcome
    }

    // -- Inline mutations ----------------------------------------------------

    /// Run one direct mutation (toggle, delete) from the list, toast the
    /// result and refetch on success.
    pub async fn mutate<Fut>(&mut self, op: Fut, success: &str, failure: &str) -> bool
    where
        Fut: Future<Output = AppResult<()>>,
    {
        match op.await {
            Ok(()) => {
                self.notifier.success(success);
                self.remote.refetch().await;
                true
            }
            Err(e) => {
                warn!(source = %self.remote.query().source(), error = %e, "list mutation failed");
                self.notifier.error(&e.user_message(failure));
                false
            }
        }
    }
}

#[async_trait]
impl<Q, F> FormHost for ListPage<Q, F>
where
    Q: ListQuery,
    Q::Row: Filterable,
    F: EntityForm + Clone,
{
    fn on_close(&mut self) {
        self.modal = None;
    }

    async fn on_mutated(&mut self) {
        self.remote.refetch().await;
    }
}
