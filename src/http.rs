// src/http.rs
//
// Thin control-surface glue: one working route (`GET /stats`) over the
// registry `StreamManager` already owns. Everything else named in the
// external-interfaces section (adding/removing streams, persisting the
// list, serving static assets) stays a trait an embedder satisfies with
// their own control plane; this module doesn't try to be one.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use multiscreen_engine::StreamManager;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, std::io::Error),
    #[error("server error: {0}")]
    Runtime(std::io::Error),
}

#[derive(Clone)]
struct AppState {
    manager: Arc<StreamManager>,
}

fn build_router(manager: Arc<StreamManager>) -> Router {
    Router::new()
        .route("/stats", get(get_stats))
        .with_state(AppState { manager })
        .layer(CorsLayer::permissive())
}

async fn get_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.manager.get_all_stats();
    Json(serde_json::json!({ "streams": stats }))
}

/// Bind and serve the stats router until the process is killed. Binds to
/// loopback only; exposing this beyond the host is the embedder's call.
pub async fn serve(manager: Arc<StreamManager>, port: u16) -> Result<(), ServerError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(addr, e))?;

    let app = build_router(manager);
    axum::serve(listener, app)
        .await
        .map_err(ServerError::Runtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiscreen_core::config::ConfigSnapshot;
    use multiscreen_engine::AlertDispatcher;

    #[tokio::test]
    async fn stats_route_reports_loaded_streams() {
        let alerts = Arc::new(AlertDispatcher::new(false, "", 2000, 60));
        let manager = Arc::new(StreamManager::new(alerts, ConfigSnapshot::default()));
        manager.add_stream("a", "url://bad");

        let state = AppState {
            manager: Arc::clone(&manager),
        };
        let Json(body) = get_stats(State(state)).await;
        let streams = body.get("streams").and_then(|v| v.as_array()).unwrap();
        assert_eq!(streams.len(), 1);
        manager.stop_all();
    }
}
