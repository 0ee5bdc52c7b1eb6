//! HTTP server: the JSON API under `/main` and the HTML pages at the root.

mod api;
mod auth;
mod origin;
mod pages;

use std::path::PathBuf;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::db::Database;
use crate::error::{Error, Result};

pub use auth::AuthUser;

#[derive(Clone)]
pub struct AppState {
    db_path: PathBuf,
    bcrypt_cost: u32,
}

impl AppState {
    pub fn new(db_path: PathBuf, bcrypt_cost: u32) -> Self {
        Self { db_path, bcrypt_cost }
    }

    /// Runs `f` against a fresh connection on the blocking pool; SQLite and
    /// bcrypt calls both block.
    async fn with_db_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Database, u32) -> Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || f(Database::connect(&db_path)?, cost))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(pages::router())
        .nest("/main", api::router())
        .with_state(state)
}

pub async fn serve(config: &ServerConfig) -> Result<()> {
    // create the schema up front so a bad path fails at start-up
    Database::connect(&config.db_path)?;
    let state = AppState::new(config.db_path.clone(), config.bcrypt_cost);
    let listener = TcpListener::bind(config.bind).await?;
    serve_on(listener, state).await
}

pub async fn serve_on(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("taskboard running on http://{addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized | Error::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::UsernameTaken(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        match status {
            StatusCode::UNAUTHORIZED => (
                status,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"taskboard\"")],
                self.to_string(),
            )
                .into_response(),
            StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %self, "request failed");
                (status, "Internal server error").into_response()
            }
            _ => (status, self.to_string()).into_response(),
        }
    }
}
