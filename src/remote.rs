//! Remote data holder: one query, its last result and a loading flag.
//!
//! `refetch` performs exactly one backend call and replaces the rows
//! wholesale. The loading flag is cleared by a drop guard, so success,
//! backend rejection, decode failure and cancellation all leave it `false`.
//! Overlapping refetches are not deduplicated; whichever resolves last
//! wins.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::api::Backend;
use crate::error::AppResult;
use crate::notify::Notifier;

/// One list source: a table select or an RPC with fixed parameters.
#[async_trait]
pub trait ListQuery: Send + Sync {
    type Row: Clone + Send + Sync + 'static;

    /// Relation or function name, used in logs.
    fn source(&self) -> &str;

    async fn fetch(&self, backend: &dyn Backend) -> AppResult<Vec<Self::Row>>;

    /// Toast text when the failure carries no message of its own.
    fn failure_message(&self) -> &str {
        "Erro ao carregar dados"
    }
}

struct State<R> {
    data: Vec<R>,
    loading: bool,
    generation: u64,
}

struct LoadingGuard<'a, R> {
    state: &'a Mutex<State<R>>,
}

impl<'a, R> LoadingGuard<'a, R> {
    fn start(state: &'a Mutex<State<R>>) -> Self {
        if let Ok(mut s) = state.lock() {
            s.loading = true;
        }
        Self { state }
    }
}

impl<R> Drop for LoadingGuard<'_, R> {
    fn drop(&mut self) {
        if let Ok(mut s) = self.state.lock() {
            s.loading = false;
        }
    }
}

pub struct RemoteData<Q: ListQuery> {
    query: Q,
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<State<Q::Row>>,
}

impl<Q: ListQuery> RemoteData<Q> {
    pub fn new(query: Q, backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            query,
            backend,
            notifier,
            state: Mutex::new(State {
                data: Vec::new(),
                loading: false,
                generation: 0,
            }),
        }
    }

    /// Build and run the initial fetch, as a screen does when it opens.
    pub async fn mount(query: Q, backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> Self {
        let remote = Self::new(query, backend, notifier);
        remote.refetch().await;
        remote
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    pub async fn refetch(&self) {
        let _guard = LoadingGuard::start(&self.state);
        let source = self.query.source().to_string();

        match self.query.fetch(self.backend.as_ref()).await {
            Ok(rows) => {
                debug!(source = %source, rows = rows.len(), "list refreshed");
                if let Ok(mut s) = self.state.lock() {
                    s.data = rows;
                    s.generation += 1;
                }
            }
            Err(e) => {
                warn!(source = %source, error = %e, "list fetch failed");
                self.notifier
                    .error(&e.user_message(self.query.failure_message()));
            }
        }
    }

    pub fn loading(&self) -> bool {
        self.state.lock().map(|s| s.loading).unwrap_or(false)
    }

    pub fn data(&self) -> Vec<Q::Row> {
        self.state
            .lock()
            .map(|s| s.data.clone())
            .unwrap_or_default()
    }

    /// Number of successful loads so far.
    pub fn generation(&self) -> u64 {
        self.state.lock().map(|s| s.generation).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{Call, FakeBackend};
    use crate::api::{fetch_rows, Select};
    use crate::notify::{ToastKind, ToastQueue};
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Thing {
        id: i64,
        name: String,
    }

    struct Things;

    #[async_trait]
    impl ListQuery for Things {
        type Row = Thing;

        fn source(&self) -> &str {
            "things"
        }

        async fn fetch(&self, backend: &dyn Backend) -> AppResult<Vec<Thing>> {
            fetch_rows(backend, &Select::from("things")).await
        }

        fn failure_message(&self) -> &str {
            "Erro ao carregar itens"
        }
    }

    fn setup(rows: Vec<serde_json::Value>) -> (Arc<FakeBackend>, Arc<ToastQueue>) {
        (
            Arc::new(FakeBackend::new().with_table("things", rows)),
            Arc::new(ToastQueue::new()),
        )
    }

    #[tokio::test]
    async fn mount_fetches_once_and_replaces_data() {
        let (backend, toasts) = setup(vec![json!({"id": 1, "name": "a"})]);
        let remote = RemoteData::mount(Things, backend.clone(), toasts.clone()).await;

        assert_eq!(remote.data(), vec![Thing { id: 1, name: "a".into() }]);
        assert!(!remote.loading());
        assert_eq!(backend.count_calls(|c| matches!(c, Call::Select(_))), 1);

        backend.set_table("things", vec![]);
        remote.refetch().await;
        assert!(remote.data().is_empty());
        assert_eq!(remote.generation(), 2);
        assert!(toasts.visible().is_empty());
    }

    #[tokio::test]
    async fn backend_error_clears_loading_and_toasts() {
        let (backend, toasts) = setup(vec![json!({"id": 1, "name": "a"})]);
        let remote = RemoteData::mount(Things, backend.clone(), toasts.clone()).await;

        backend.fail("things", "permission denied for table things");
        remote.refetch().await;

        assert!(!remote.loading());
        assert_eq!(remote.data().len(), 1, "failed refetch keeps last rows");
        let errors = toasts.of_kind(ToastKind::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "permission denied for table things");
    }

    #[tokio::test]
    async fn shape_mismatch_uses_fallback_message() {
        let (backend, toasts) = setup(vec![json!({"id": "not-a-number"})]);
        let remote = RemoteData::mount(Things, backend, toasts.clone()).await;

        assert!(!remote.loading());
        assert!(remote.data().is_empty());
        assert_eq!(
            toasts.last().map(|t| t.message),
            Some("Erro ao carregar itens".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn loading_is_true_while_in_flight() {
        let (backend, toasts) = setup(vec![]);
        backend.delay_selects(vec![Duration::from_millis(100)]);
        let remote = Arc::new(RemoteData::new(Things, backend, toasts));

        let r = remote.clone();
        let task = tokio::spawn(async move { r.refetch().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(remote.loading());

        task.await.unwrap();
        assert!(!remote.loading());
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_refetches_last_resolver_wins() {
        let (backend, toasts) = setup(vec![json!({"id": 1, "name": "old"})]);
        // first call resolves at 300ms, second at 100ms
        backend.delay_selects(vec![Duration::from_millis(300), Duration::from_millis(100)]);
        let remote = RemoteData::new(Things, backend.clone(), toasts);

        let swap = async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            backend.set_table("things", vec![json!({"id": 2, "name": "new"})]);
        };
        tokio::join!(remote.refetch(), remote.refetch(), swap);

        assert_eq!(remote.data()[0].name, "new");
        assert!(!remote.loading());
    }
}
