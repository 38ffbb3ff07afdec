//! Toast notifications behind four stable verbs plus dismiss.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToastId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Info,
    Loading,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: ToastId,
    pub kind: ToastKind,
    pub message: String,
}

pub trait Notifier: Send + Sync {
    fn success(&self, message: &str) -> ToastId;
    fn error(&self, message: &str) -> ToastId;
    fn info(&self, message: &str) -> ToastId;
    fn loading(&self, message: &str) -> ToastId;
    fn dismiss(&self, id: ToastId);
}

/// In-memory toast list. A UI shell calls [`ToastQueue::drain`] on every
/// frame to take the transient toasts; loading toasts stay until dismissed.
#[derive(Default)]
pub struct ToastQueue {
    next_id: AtomicU64,
    toasts: Mutex<Vec<Toast>>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, kind: ToastKind, message: &str) -> ToastId {
        let id = ToastId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        match self.toasts.lock() {
            Ok(mut toasts) => toasts.push(Toast {
                id,
                kind,
                message: message.to_string(),
            }),
            Err(e) => warn!(error = %e, "toast queue lock poisoned"),
        }
        id
    }

    pub fn visible(&self) -> Vec<Toast> {
        self.toasts.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Toast> {
        self.toasts.lock().ok().and_then(|t| t.last().cloned())
    }

    pub fn of_kind(&self, kind: ToastKind) -> Vec<Toast> {
        self.visible()
            .into_iter()
            .filter(|t| t.kind == kind)
            .collect()
    }

    /// Remove and return every toast except pending loading ones.
    pub fn drain(&self) -> Vec<Toast> {
        match self.toasts.lock() {
            Ok(mut toasts) => {
                let (loading, shown) = toasts
                    .drain(..)
                    .partition(|t: &Toast| t.kind == ToastKind::Loading);
                *toasts = loading;
                shown
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut toasts) = self.toasts.lock() {
            toasts.clear();
        }
    }
}

impl Notifier for ToastQueue {
    fn success(&self, message: &str) -> ToastId {
        self.push(ToastKind::Success, message)
    }

    fn error(&self, message: &str) -> ToastId {
        self.push(ToastKind::Error, message)
    }

    fn info(&self, message: &str) -> ToastId {
        self.push(ToastKind::Info, message)
    }

    fn loading(&self, message: &str) -> ToastId {
        self.push(ToastKind::Loading, message)
    }

    fn dismiss(&self, id: ToastId) {
        if let Ok(mut toasts) = self.toasts.lock() {
            toasts.retain(|t| t.id != id);
        }
    }
}

/// Notifier that only writes to the log. Used by headless runs.
#[derive(Default)]
pub struct LogNotifier {
    next_id: AtomicU64,
}

impl LogNotifier {
    fn next(&self) -> ToastId {
        ToastId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl Notifier for LogNotifier {
    fn success(&self, message: &str) -> ToastId {
        info!(toast = "success", %message);
        self.next()
    }

    fn error(&self, message: &str) -> ToastId {
        error!(toast = "error", %message);
        self.next()
    }

    fn info(&self, message: &str) -> ToastId {
        info!(toast = "info", %message);
        self.next()
    }

    fn loading(&self, message: &str) -> ToastId {
        info!(toast = "loading", %message);
        self.next()
    }

    fn dismiss(&self, _id: ToastId) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dismiss_removes_only_that_toast() {
        let q = ToastQueue::new();
        let loading = q.loading("Enviando arquivo...");
        q.success("Arquivo enviado");
        q.dismiss(loading);

        let visible = q.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].kind, ToastKind::Success);
        assert_ne!(visible[0].id, loading);
    }

    #[test]
    fn drain_takes_transient_toasts_and_keeps_loading() {
        let q = ToastQueue::new();
        let loading = q.loading("Gerando relatório...");
        for i in 0..1000 {
            q.success(&format!("Registro {i} salvo"));
        }

        let shown = q.drain();
        assert_eq!(shown.len(), 1000);
        assert!(shown.iter().all(|t| t.kind == ToastKind::Success));
        assert!(q.drain().is_empty());

        let left = q.visible();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, loading);
    }

    #[test]
    fn ids_are_unique() {
        let q = ToastQueue::new();
        let a = q.error("a");
        let b = q.info("b");
        assert_ne!(a, b);
        assert_eq!(q.of_kind(ToastKind::Error).len(), 1);
        assert_eq!(q.last().map(|t| t.message), Some("b".to_string()));
    }
}
