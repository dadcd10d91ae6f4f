//! HTTP control API.
//!
//! A thin translation layer over core operations. Every endpoint maps
//! directly to a core call; the wire schema is JSON.
//!
//! | Route | Method | Core operation |
//! |---|---|---|
//! | `/health` | GET | `Core::health_report` |
//! | `/status` | GET | component status snapshot |
//! | `/plugins` | GET | registry listing |
//! | `/buffers` | GET | `BufferManager::buffer_status` |
//! | `/buffers/:name/flush` | POST | `BufferManager::flush(name, 0)` |
//! | `/config` | GET/PUT | `ConfigStore::get("")` / `set("")` |
//! | `/start` | POST | `Core::start` |
//! | `/stop` | POST | `Core::stop` |

use std::sync::Arc;

use anyhow::Result;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use signalpost_core::{Component, Core};

/// Build the control API router.
pub fn router(core: Arc<Core>) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/plugins", get(plugins))
        .route("/buffers", get(buffers))
        .route("/buffers/:name/flush", post(flush_buffer))
        .route("/config", get(get_config))
        .route("/config", put(put_config))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .with_state(core)
}

/// Serve the control API until the cancellation token fires.
pub async fn serve(core: Arc<Core>, addr: &str, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("cannot bind control API to {addr}: {e}"))?;
    tracing::info!(addr, "control API listening");

    axum::serve(listener, router(core))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| anyhow::anyhow!("control API server error: {e}"))
}

async fn health(State(core): State<Arc<Core>>) -> Response {
    Json(core.health_report()).into_response()
}

async fn status(State(core): State<Arc<Core>>) -> Response {
    let component_ids = [
        "core",
        "event_bus",
        "plugin_registry",
        "config_store",
        "health_monitor",
        "buffer_manager",
        "data_pipeline",
    ];
    let components: Value = component_ids
        .iter()
        .filter_map(|id| {
            core.component(id)
                .map(|c| ((*id).to_owned(), json!(c.status().to_string())))
        })
        .collect::<serde_json::Map<_, _>>()
        .into();

    Json(json!({
        "status": core.status().to_string(),
        "components": components,
    }))
    .into_response()
}

async fn plugins(State(core): State<Arc<Core>>) -> Response {
    let list: Vec<Value> = core
        .registry()
        .handles()
        .iter()
        .map(|handle| {
            json!({
                "id": handle.id(),
                "type": handle.plugin_type().to_string(),
                "status": handle.as_plugin().status().to_string(),
            })
        })
        .collect();
    Json(Value::Array(list)).into_response()
}

async fn buffers(State(core): State<Arc<Core>>) -> Response {
    Json(core.buffer_manager().buffer_status()).into_response()
}

async fn flush_buffer(State(core): State<Arc<Core>>, Path(name): Path<String>) -> Response {
    match core.buffer_manager().flush(&name, 0) {
        Some(batches) => Json(json!({"flushed": batches.len()})).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("no buffer for output '{name}'")})),
        )
            .into_response(),
    }
}

async fn get_config(State(core): State<Arc<Core>>) -> Response {
    Json(core.config_store().get("", Value::Null)).into_response()
}

async fn put_config(State(core): State<Arc<Core>>, Json(body): Json<Value>) -> Response {
    match core.config_store().set("", body) {
        Ok(()) => Json(json!({"status": "ok"})).into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

async fn start(State(core): State<Arc<Core>>) -> Response {
    match core.start().await {
        Ok(()) => Json(json!({"status": "ok"})).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

async fn stop(State(core): State<Arc<Core>>) -> Response {
    match core.stop().await {
        Ok(()) => Json(json!({"status": "ok"})).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}
