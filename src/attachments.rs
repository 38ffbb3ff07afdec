//! File attachments on sales, purchases and expenses.
//!
//! Blobs live in a private storage bucket under
//! `{uploader_id}/{record_id}/{uuid}-{file name}`; a row in `attachments`
//! links the storage path to the record. Viewing goes through short-lived
//! signed URLs only.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{fetch_rows, Backend, Filter, Order, Select, UploadOptions};
use crate::compression::{compress_image, CompressionSettings, Payload};
use crate::error::{AppError, AppResult};
use crate::notify::Notifier;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub const SIGNED_URL_TTL_SECS: u64 = 300;

const BUCKET: &str = "attachments";
const TABLE: &str = "attachments";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub record_type: String,
    pub record_id: i64,
    pub file_name: String,
    pub storage_path: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<i64>,
    #[serde(default)]
    pub uploaded_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// The record an attachment hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentTarget {
    pub record_type: &'static str,
    pub record_id: i64,
}

/// A file picked by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl LocalFile {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    /// Inline `data:` URL for the thumbnail shown before upload; `None`
    /// for non-images.
    pub fn preview_data_url(&self) -> Option<String> {
        self.is_image().then(|| {
            format!(
                "data:{};base64,{}",
                self.content_type,
                base64::engine::general_purpose::STANDARD.encode(&self.bytes)
            )
        })
    }
}

/// Keep ASCII letters, digits, `.`, `-` and `_`; everything else becomes
/// `_`. Storage keys reject many characters a user's file name can hold.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(|c| c == '_' || c == '.').is_empty() {
        "arquivo".to_string()
    } else {
        cleaned
    }
}

pub fn storage_path(uploader_id: &str, record_id: i64, file_name: &str) -> String {
    format!(
        "{uploader_id}/{record_id}/{}-{}",
        Uuid::new_v4(),
        sanitize_file_name(file_name)
    )
}

/// Swap the extension for `.jpg` after a PNG was re-encoded.
fn jpeg_name(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.jpg"),
        _ => format!("{file_name}.jpg"),
    }
}

pub struct AttachmentService {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
}

impl AttachmentService {
    pub fn new(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> Self {
        Self { backend, notifier }
    }

    pub async fn list(&self, target: AttachmentTarget) -> AppResult<Vec<Attachment>> {
        let query = Select::from(TABLE)
            .eq("record_type", target.record_type)
            .eq("record_id", target.record_id)
            .order("created_at", Order::Desc);
        fetch_rows(self.backend.as_ref(), &query).await
    }

    /// Validate, optionally compress, store the blob, then record the
    /// metadata row. Files over [`MAX_UPLOAD_BYTES`] are rejected before
    /// any request.
    pub async fn upload(
        &self,
        file: LocalFile,
        target: AttachmentTarget,
        uploader_id: &str,
        settings: CompressionSettings,
    ) -> AppResult<Attachment> {
        let pending = self.notifier.loading("Enviando arquivo...");
        let result = self.try_upload(file, target, uploader_id, settings).await;
        self.notifier.dismiss(pending);
        match result {
            Ok(attachment) => {
                self.notifier.success("Anexo enviado com sucesso");
                Ok(attachment)
            }
            Err(e) => {
                if !e.is_validation() {
                    warn!(record_id = target.record_id, error = %e, "attachment upload failed");
                }
                self.notifier.error(&e.user_message("Erro ao enviar anexo"));
                Err(e)
            }
        }
    }

    async fn try_upload(
        &self,
        file: LocalFile,
        target: AttachmentTarget,
        uploader_id: &str,
        settings: CompressionSettings,
    ) -> AppResult<Attachment> {
        if file.bytes.is_empty() {
            return Err(AppError::validation("O arquivo está vazio"));
        }
        if file.bytes.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::validation(format!(
                "O arquivo excede o limite de {}MB",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            )));
        }

        let original_type = file.content_type.clone();
        let payload = compress_image(
            Payload {
                bytes: file.bytes,
                content_type: file.content_type,
            },
            settings,
        )
        .await?;
        let file_name = if payload.content_type != original_type {
            jpeg_name(&file.file_name)
        } else {
            file.file_name
        };

        let path = storage_path(uploader_id, target.record_id, &file_name);
        let size = payload.bytes.len();
        self.backend
            .upload(
                BUCKET,
                &path,
                payload.bytes,
                UploadOptions {
                    content_type: payload.content_type.clone(),
                    upsert: false,
                },
            )
            .await?;

        let row = json!({
            "record_type": target.record_type,
            "record_id": target.record_id,
            "file_name": file_name,
            "storage_path": path,
            "content_type": payload.content_type,
            "size_bytes": size,
            "uploaded_by": uploader_id,
        });
        let inserted = match self.backend.insert(TABLE, row).await {
            Ok(rows) => rows,
            Err(e) => {
                // no row points at the blob; drop it
                if let Err(cleanup) = self.backend.remove(BUCKET, &[path.clone()]).await {
                    warn!(path = %path, error = %cleanup, "orphaned attachment blob");
                }
                return Err(e);
            }
        };

        let attachment: Attachment = crate::entities::first_row(TABLE, inserted)?;
        info!(path = %attachment.storage_path, size, "attachment stored");
        Ok(attachment)
    }

    /// Short-lived link for viewing.
    pub async fn signed_url(&self, attachment: &Attachment) -> AppResult<String> {
        self.backend
            .create_signed_url(BUCKET, &attachment.storage_path, SIGNED_URL_TTL_SECS)
            .await
            .inspect_err(|e| {
                self.notifier
                    .error(&e.user_message("Erro ao abrir anexo"));
            })
    }

    /// Delete the metadata row, then the blob. The two calls are not
    /// atomic: if the blob removal fails the row is already gone and the
    /// orphaned path is logged.
    pub async fn delete(&self, attachment: &Attachment) -> AppResult<()> {
        if let Err(e) = self
            .backend
            .delete(TABLE, &[Filter::eq("id", attachment.id)])
            .await
        {
            self.notifier
                .error(&e.user_message("Erro ao excluir anexo"));
            return Err(e);
        }

        if let Err(e) = self
            .backend
            .remove(BUCKET, &[attachment.storage_path.clone()])
            .await
        {
            warn!(
                path = %attachment.storage_path,
                error = %e,
                "attachment row deleted but blob removal failed"
            );
        }
        self.notifier.success("Anexo excluído");
        Ok(())
    }
}
