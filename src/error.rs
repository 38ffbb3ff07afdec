//! Error taxonomy shared by every screen.
//!
//! Validation errors are raised before any request leaves the client.
//! Backend rejections arrive as an error body instead of a panic and are
//! converted here so call sites can `?` them next to transport failures and
//! handle both in one place.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Rejected client-side; no request was sent.
    #[error("{0}")]
    Validation(String),

    /// The backend answered with an error body.
    #[error("{message}")]
    Backend {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("{0}")]
    Transport(String),

    /// A row or RPC result did not match the expected shape.
    #[error("unexpected {what} payload: {reason}")]
    Decode { what: String, reason: String },

    #[error("{0}")]
    Auth(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("local store error: {0}")]
    LocalStore(String),

    #[error("image processing failed: {0}")]
    Image(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn decode(what: impl Into<String>, reason: impl ToString) -> Self {
        AppError::Decode {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }

    /// Message to show in a toast. Validation and backend errors carry text
    /// meant for the user; everything else falls back to the localized
    /// string supplied by the screen.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            AppError::Validation(msg) | AppError::Auth(msg) => msg.clone(),
            AppError::Backend { message, .. } if !message.trim().is_empty() => message.clone(),
            _ => fallback.to_string(),
        }
    }

    /// Build a `Backend` error from a failed HTTP response body.
    ///
    /// Understands the PostgREST (`message`, `code`, `details`, `hint`),
    /// GoTrue (`error_description`, `msg`) and storage (`error`) shapes.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed = serde_json::from_str::<Value>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|json| {
                ["message", "error_description", "msg", "error"]
                    .iter()
                    .find_map(|key| json.get(*key).and_then(Value::as_str))
                    .map(|s| s.trim().to_string())
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| status_message(status));
        let code = parsed.as_ref().and_then(|json| match json.get("code") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        });

        AppError::Backend {
            status: status.as_u16(),
            code,
            message,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            return AppError::Transport("Não foi possível conectar ao servidor".into());
        }
        if err.is_timeout() {
            return AppError::Transport("O servidor demorou demais para responder".into());
        }
        if err.is_decode() {
            return AppError::decode("response", err);
        }
        AppError::Transport(format!("Erro de rede: {err}"))
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::LocalStore(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Image(err.to_string())
    }
}

/// Friendly text for a status code when the body carried no message.
fn status_message(status: StatusCode) -> String {
    match status.as_u16() {
        400 => "Requisição inválida".to_string(),
        401 => "Sessão expirada. Entre novamente.".to_string(),
        403 => "Você não tem permissão para esta operação".to_string(),
        404 => "Registro não encontrado".to_string(),
        409 => "Conflito: o registro já existe ou foi alterado".to_string(),
        s if s >= 500 => format!("Erro no servidor (HTTP {s})"),
        s => format!("Resposta inesperada do servidor (HTTP {s})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgrest_body_is_parsed() {
        let err = AppError::from_response(
            StatusCode::BAD_REQUEST,
            r#"{"code":"P0001","message":"Estoque insuficiente","details":null,"hint":null}"#,
        );
        match &err {
            AppError::Backend {
                status,
                code,
                message,
            } => {
                assert_eq!(*status, 400);
                assert_eq!(code.as_deref(), Some("P0001"));
                assert_eq!(message, "Estoque insuficiente");
            }
            other => panic!("expected backend error, got {other:?}"),
        }
        assert_eq!(err.user_message("fallback"), "Estoque insuficiente");
    }

    #[test]
    fn auth_body_uses_error_description() {
        let err = AppError::from_response(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert_eq!(err.to_string(), "Invalid login credentials");
    }

    #[test]
    fn empty_body_falls_back_to_status_text() {
        let err = AppError::from_response(StatusCode::FORBIDDEN, "");
        assert_eq!(
            err.user_message("x"),
            "Você não tem permissão para esta operação"
        );
    }

    #[test]
    fn transport_errors_use_screen_fallback() {
        let err = AppError::Transport("connection reset".into());
        assert_eq!(err.user_message("Erro ao salvar venda"), "Erro ao salvar venda");
        assert!(!err.is_validation());
        assert!(AppError::validation("x").is_validation());
    }
}
