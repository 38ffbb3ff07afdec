//! Modal-hosted create/edit forms.
//!
//! A [`ModalForm`] owns the draft while the modal is open. Submitting runs
//! client-side validation, performs exactly one mutation and reports the
//! outcome through the notifier. On success the host is told twice,
//! through two separate callbacks: [`FormHost::on_close`] and then
//! [`FormHost::on_mutated`], each exactly once. On failure neither runs and
//! the draft is left as the user typed it.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::Backend;
use crate::error::AppResult;
use crate::notify::Notifier;

#[derive(Debug, Clone, PartialEq)]
pub enum FormMode<R> {
    Create,
    Edit(R),
}

impl<R> FormMode<R> {
    pub fn is_edit(&self) -> bool {
        matches!(self, FormMode::Edit(_))
    }

    pub fn entity(&self) -> Option<&R> {
        match self {
            FormMode::Create => None,
            FormMode::Edit(row) => Some(row),
        }
    }
}

/// Per-entity form behaviour.
#[async_trait]
pub trait EntityForm: Send + Sync {
    type Row: Clone + Send + Sync + 'static;
    type Draft: Clone + Send + Sync + 'static;

    /// Defaults for create mode.
    fn blank(&self) -> Self::Draft;

    /// Initial values for edit mode.
    fn from_row(&self, row: &Self::Row) -> Self::Draft;

    /// Checks that mirror backend constraints; runs before any request.
    fn validate(&self, _draft: &Self::Draft, _mode: &FormMode<Self::Row>) -> AppResult<()> {
        Ok(())
    }

    /// The single mutation call (insert, update or a transactional RPC).
    async fn submit(
        &self,
        backend: &dyn Backend,
        draft: &Self::Draft,
        mode: &FormMode<Self::Row>,
    ) -> AppResult<()>;

    fn success_message(&self, mode: &FormMode<Self::Row>) -> String;

    fn failure_message(&self) -> &str;
}

/// The screen that opened the modal.
#[async_trait]
pub trait FormHost: Send {
    /// Hide the modal.
    fn on_close(&mut self);

    /// The backend state changed; re-read whatever depends on it.
    async fn on_mutated(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Saved,
    Rejected,
}

/// Clears the loading flag however the submit future ends.
struct BusyFlag<'a>(&'a mut bool);

impl<'a> BusyFlag<'a> {
    fn raise(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for BusyFlag<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

pub struct ModalForm<F: EntityForm> {
    form: F,
    mode: FormMode<F::Row>,
    draft: F::Draft,
    loading: bool,
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
}

impl<F: EntityForm> ModalForm<F> {
    pub fn open(
        form: F,
        entity_to_edit: Option<F::Row>,
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (mode, draft) = match entity_to_edit {
            Some(row) => {
                let draft = form.from_row(&row);
                (FormMode::Edit(row), draft)
            }
            None => (FormMode::Create, form.blank()),
        };
        Self {
            form,
            mode,
            draft,
            loading: false,
            backend,
            notifier,
        }
    }

    pub fn form(&self) -> &F {
        &self.form
    }

    pub fn mode(&self) -> &FormMode<F::Row> {
        &self.mode
    }

    pub fn draft(&self) -> &F::Draft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut F::Draft {
        &mut self.draft
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    /// `&mut self` rules out a second submit while one is in flight.
    pub async fn submit<H: FormHost + ?Sized>(&mut self, host: &mut H) -> SubmitOutcome {
        let result = {
            let _busy = BusyFlag::raise(&mut self.loading);
            match self.form.validate(&self.draft, &self.mode) {
                Ok(()) => {
                    self.form
                        .submit(self.backend.as_ref(), &self.draft, &self.mode)
                        .await
                }
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(()) => {
                info!(edit = self.mode.is_edit(), "form saved");
                self.notifier.success(&self.form.success_message(&self.mode));
                host.on_close();
                host.on_mutated().await;
                SubmitOutcome::Saved
            }
            Err(e) => {
                if !e.is_validation() {
                    warn!(error = %e, "form submit failed");
                }
                self.notifier
                    .error(&e.user_message(self.form.failure_message()));
                SubmitOutcome::Rejected
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::fake::{Call, FakeBackend};
    use crate::error::AppError;
    use crate::notify::{ToastKind, ToastQueue};
    use serde_json::json;

    /// Host that only counts callbacks.
    #[derive(Default)]
    pub(crate) struct RecordingHost {
        pub closed: usize,
        pub mutated: usize,
    }

    #[async_trait]
    impl FormHost for RecordingHost {
        fn on_close(&mut self) {
            self.closed += 1;
        }

        async fn on_mutated(&mut self) {
            self.mutated += 1;
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: i64,
        text: String,
    }

    struct NoteForm;

    #[async_trait]
    impl EntityForm for NoteForm {
        type Row = Note;
        type Draft = String;

        fn blank(&self) -> String {
            String::new()
        }

        fn from_row(&self, row: &Note) -> String {
            row.text.clone()
        }

        fn validate(&self, draft: &String, _mode: &FormMode<Note>) -> AppResult<()> {
            if draft.trim().is_empty() {
                return Err(AppError::validation("Texto obrigatório"));
            }
            Ok(())
        }

        async fn submit(
            &self,
            backend: &dyn Backend,
            draft: &String,
            mode: &FormMode<Note>,
        ) -> AppResult<()> {
            match mode {
                FormMode::Create => {
                    backend.insert("notes", json!({ "text": draft })).await?;
                }
                FormMode::Edit(note) => {
                    backend
                        .update(
                            "notes",
                            &[crate::api::Filter::eq("id", note.id)],
                            json!({ "text": draft }),
                        )
                        .await?;
                }
            }
            Ok(())
        }

        fn success_message(&self, mode: &FormMode<Note>) -> String {
            if mode.is_edit() {
                "Nota atualizada".into()
            } else {
                "Nota criada".into()
            }
        }

        fn failure_message(&self) -> &str {
            "Erro ao salvar nota"
        }
    }

    fn open(edit: Option<Note>) -> (ModalForm<NoteForm>, Arc<FakeBackend>, Arc<ToastQueue>) {
        let backend = Arc::new(FakeBackend::new());
        let toasts = Arc::new(ToastQueue::new());
        let modal = ModalForm::open(NoteForm, edit, backend.clone(), toasts.clone());
        (modal, backend, toasts)
    }

    #[test]
    fn edit_mode_initializes_from_entity() {
        let (modal, _, _) = open(Some(Note {
            id: 3,
            text: "hello".into(),
        }));
        assert!(modal.mode().is_edit());
        assert_eq!(modal.draft(), "hello");

        let (modal, _, _) = open(None);
        assert_eq!(modal.mode(), &FormMode::Create);
        assert_eq!(modal.draft(), "");
    }

    #[tokio::test]
    async fn validation_failure_sends_nothing_and_keeps_modal_open() {
        let (mut modal, backend, toasts) = open(None);
        modal.draft_mut().push_str("   ");
        let mut host = RecordingHost::default();

        assert_eq!(modal.submit(&mut host).await, SubmitOutcome::Rejected);
        assert!(backend.calls().is_empty());
        assert_eq!((host.closed, host.mutated), (0, 0));
        assert!(!modal.loading());
        assert_eq!(modal.draft(), "   ");
        assert_eq!(toasts.last().unwrap().message, "Texto obrigatório");
    }

    #[tokio::test]
    async fn success_calls_each_callback_exactly_once() {
        let (mut modal, backend, toasts) = open(None);
        modal.draft_mut().push_str("primeira nota");
        let mut host = RecordingHost::default();

        assert_eq!(modal.submit(&mut host).await, SubmitOutcome::Saved);
        assert_eq!((host.closed, host.mutated), (1, 1));
        assert_eq!(backend.count_calls(|c| matches!(c, Call::Insert(..))), 1);
        assert_eq!(backend.table("notes").len(), 1);
        assert_eq!(toasts.of_kind(ToastKind::Success)[0].message, "Nota criada");
        assert!(!modal.loading());
    }

    #[tokio::test]
    async fn backend_rejection_keeps_draft_and_clears_loading() {
        let (mut modal, backend, toasts) = open(Some(Note {
            id: 1,
            text: "old".into(),
        }));
        backend.fail("notes", "duplicate key value violates unique constraint");
        *modal.draft_mut() = "new".into();
        let mut host = RecordingHost::default();

        assert_eq!(modal.submit(&mut host).await, SubmitOutcome::Rejected);
        assert_eq!((host.closed, host.mutated), (0, 0));
        assert_eq!(modal.draft(), "new");
        assert!(!modal.loading());
        assert_eq!(
            toasts.last().unwrap().message,
            "duplicate key value violates unique constraint"
        );

        backend.recover("notes");
        assert_eq!(modal.submit(&mut host).await, SubmitOutcome::Saved);
        assert_eq!((host.closed, host.mutated), (1, 1));
    }

    /// Saves like [`NoteForm`] after a delay.
    struct SlowNoteForm;

    #[async_trait]
    impl EntityForm for SlowNoteForm {
        type Row = Note;
        type Draft = String;

        fn blank(&self) -> String {
            NoteForm.blank()
        }

        fn from_row(&self, row: &Note) -> String {
            NoteForm.from_row(row)
        }

        fn validate(&self, draft: &String, mode: &FormMode<Note>) -> AppResult<()> {
            NoteForm.validate(draft, mode)
        }

        async fn submit(
            &self,
            backend: &dyn Backend,
            draft: &String,
            mode: &FormMode<Note>,
        ) -> AppResult<()> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            NoteForm.submit(backend, draft, mode).await
        }

        fn success_message(&self, mode: &FormMode<Note>) -> String {
            NoteForm.success_message(mode)
        }

        fn failure_message(&self) -> &str {
            "Erro ao salvar nota"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_submit_clears_loading_and_allows_retry() {
        let backend = Arc::new(FakeBackend::new());
        let toasts = Arc::new(ToastQueue::new());
        let mut modal = ModalForm::open(SlowNoteForm, None, backend.clone(), toasts.clone());
        modal.draft_mut().push_str("nota lenta");
        let mut host = RecordingHost::default();

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            modal.submit(&mut host),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(!modal.loading());
        assert!(backend.calls().is_empty());
        assert_eq!((host.closed, host.mutated), (0, 0));

        assert_eq!(modal.submit(&mut host).await, SubmitOutcome::Saved);
        assert_eq!(backend.table("notes").len(), 1);
        assert_eq!((host.closed, host.mutated), (1, 1));
    }
}
