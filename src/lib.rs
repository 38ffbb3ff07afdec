//! Back Office client core.
//!
//! Every list screen follows one pattern: a [`remote::RemoteData`] holds the
//! rows, [`filter`] and [`table`] narrow, sort and page them, and a
//! [`form::ModalForm`] creates or edits one row, after which the list is
//! re-read. [`page::ListPage`] composes the pieces; [`entities`] supplies
//! one typed row, query, form and column set per business table. All
//! persistence and business rules live in the remote backend behind
//! [`api::Backend`].

pub mod api;
pub mod attachments;
pub mod auth;
pub mod compression;
pub mod config;
pub mod context;
pub mod db;
pub mod entities;
pub mod error;
pub mod filter;
pub mod form;
pub mod logging;
pub mod money;
pub mod notify;
pub mod page;
pub mod remote;
pub mod storage;
pub mod table;

use anyhow::Context as _;
use std::sync::Arc;
use tracing::{info, warn};

pub use config::AppConfig;
pub use context::AppContext;
pub use error::{AppError, AppResult};

/// Headless entry point: logging, configuration, context and saved
/// session, then keep the session fresh until Ctrl-C and tear down.
pub async fn run() -> anyhow::Result<()> {
    let data_dir = logging::default_data_dir();
    let _log_guard = logging::init(&logging::default_log_dir()).context("initialising logging")?;
    info!(about = %logging::about(), "build info");

    let config = AppConfig::from_env().context("reading configuration")?;
    let ctx = Arc::new(
        AppContext::init(
            config,
            Arc::new(notify::LogNotifier::default()),
            Arc::new(storage::KeyringSessionStore::default()),
            Some(&data_dir),
        )
        .await
        .context("starting application context")?,
    );

    match ctx.session() {
        Some(session) => info!(
            user_id = session.user_id(),
            role = session.role.as_str(),
            theme = ctx.theme().as_str(),
            "session restored"
        ),
        None => info!(last_email = ?ctx.auth().last_email(), "no saved session"),
    }

    let refresher = ctx.spawn_session_refresh(context::SESSION_CHECK_INTERVAL);
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for shutdown signal");
    }
    refresher.abort();
    ctx.teardown();
    info!("Back office stopped");
    Ok(())
}
