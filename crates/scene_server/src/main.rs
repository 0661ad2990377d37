use std::{fs, net::SocketAddr, path::Path, sync::Arc};

use anyhow::{anyhow, Context};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::DocumentSnapshot,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::load_settings;

struct AppState {
    scene: DocumentSnapshot,
    force_status: Option<StatusCode>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    let settings = load_settings();
    let scene = load_scene(settings.scene_path.as_deref())?;
    let force_status = settings
        .force_status
        .map(|code| {
            StatusCode::from_u16(code).map_err(|_| anyhow!("invalid forced status code {code}"))
        })
        .transpose()?;
    if let Some(status) = force_status {
        warn!(%status, "every scene request will fail with a forced status");
    }

    let app = build_router(Arc::new(AppState {
        scene,
        force_status,
    }));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "scene server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// `RUST_LOG` directives when present and valid, `info` otherwise.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Reads the scene document to serve. With no path configured the server
/// answers with an empty document.
fn load_scene(path: Option<&Path>) -> anyhow::Result<DocumentSnapshot> {
    let Some(path) = path else {
        return Ok(DocumentSnapshot::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read scene file '{}'", path.display()))?;
    let scene = DocumentSnapshot::from_json_str(&raw)
        .with_context(|| format!("scene file '{}' is not a valid document", path.display()))?;
    info!(path = %path.display(), volumes = scene.volume_count(), "scene loaded");
    Ok(scene)
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/scene", get(scene))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn scene(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DocumentSnapshot>, (StatusCode, Json<ApiError>)> {
    if let Some(status) = state.force_status {
        let code = match status {
            StatusCode::NOT_FOUND => ErrorCode::NotFound,
            StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => ErrorCode::Unavailable,
            _ => ErrorCode::Internal,
        };
        return Err((status, Json(ApiError::new(code, "scene processing failed"))));
    }
    Ok(Json(state.scene.clone()))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
