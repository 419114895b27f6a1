use std::sync::Arc;

use axum::http::StatusCode;
use tracing::error;
use warbler_db::Database;

use crate::views::Views;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub secret_key: String,
    pub views: Views,
}

impl AppStateInner {
    pub fn new(db: Database, secret_key: String) -> anyhow::Result<AppState> {
        Ok(Arc::new(Self {
            db,
            secret_key,
            views: Views::new()?,
        }))
    }
}

/// Run blocking DB work off the async runtime. Only a join failure is
/// mapped here; the closure's result is handed back untouched so callers can
/// react to integrity errors.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> T + Send + 'static,
    T: Send + 'static,
{
    let st = state.clone();
    tokio::task::spawn_blocking(move || f(&st.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// Like [`blocking`], but any error from the closure is logged and becomes a 500.
pub async fn query<F, T, E>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    blocking(state, f).await?.map_err(|e| {
        error!("DB error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
