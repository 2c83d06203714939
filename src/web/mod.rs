//! The independent gift HTTP service (§4.8, §10.5).
//!
//! Runs on the async runtime's worker pool, sharing no mutable state with the core event
//! loop (§5). The only coupling is that both read the same `ConfigFile`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Local;
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ConfigFile;
use crate::error::CableClubError;

pub mod generic;
pub mod gifts;

use gifts::GiftStore;

#[derive(Clone)]
struct GiftState {
    store: Arc<RwLock<GiftStore>>,
    gifts_dir: std::path::PathBuf,
}

#[derive(Deserialize)]
struct GiftQuery {
    #[serde(default)]
    nivel: i64,
}

async fn get_gift(State(state): State<GiftState>, Query(query): Query<GiftQuery>) -> impl IntoResponse {
    let today = Local::now().date_naive();
    let store = state.store.read().await;
    match store.get_for_level(today, query.nivel) {
        Some(body) => (StatusCode::OK, body.to_string()),
        None => (StatusCode::NOT_FOUND, "no gift available".to_string()),
    }
}

async fn reload_gifts(State(state): State<GiftState>) -> impl IntoResponse {
    let new_store = GiftStore::load(&state.gifts_dir);
    let count = new_store.period_count();
    *state.store.write().await = new_store;
    info!("reloaded {count} gift periods");
    format!("reloaded {count} gift periods")
}

fn build_router(config: &ConfigFile) -> Router {
    let state = GiftState {
        store: Arc::new(RwLock::new(GiftStore::load(&config.gifts_dir))),
        gifts_dir: config.gifts_dir.clone(),
    };

    Router::new()
        .route("/gifts", get(get_gift))
        .route("/regalos", get(get_gift))
        .route("/health", get(generic::health))
        .route("/reload-gifts", get(reload_gifts))
        .with_state(state)
        .layer(SetResponseHeaderLayer::if_not_present(
            axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve the gift HTTP service, returning a handle the caller can await for a clean
/// shutdown signal to propagate.
pub async fn build_and_serve(config: ConfigFile) -> Result<JoinHandle<Result<(), std::io::Error>>, CableClubError> {
    let addr: SocketAddr = config.api_listener_address()?;
    let router = build_router(&config);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("gift HTTP service listening on {addr}");
    Ok(tokio::spawn(async move { axum::serve(listener, router).await }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_builds_without_panicking() {
        let config = ConfigFile::default();
        let _router = build_router(&config);
    }
}
