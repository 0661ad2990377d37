use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};
use clap::Parser;
use client_core::{config::DEFAULT_CONFIG_FILE, load_settings, SessionEvent, VolumeSession};
use renderer_integration::InMemoryRenderer;
use shared::{domain::JobId, protocol::ViewMode};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Overrides the scene service URL from config and environment.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long = "image")]
    images: Vec<String>,
    /// Index of a loaded image to select; repeatable.
    #[arg(long = "select")]
    selections: Vec<usize>,
    #[arg(long)]
    tool: Option<String>,
    #[arg(long)]
    active: Option<usize>,
    #[arg(long)]
    view_mode: Option<String>,
    #[arg(long)]
    view_result: bool,
    /// How long to wait for the submitted job to resolve.
    #[arg(long, default_value_t = 30_000)]
    wait_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config)?;
    if let Some(url) = args.server_url {
        settings.scene_service_url = Some(url);
    }
    let renderer = InMemoryRenderer::new();
    let session = VolumeSession::from_settings(renderer.clone(), &settings)?;
    let mut events = session.subscribe_events();

    let mut loaded = Vec::new();
    for url in &args.images {
        loaded.push(session.load_url(url).await?);
    }
    for &index in &args.selections {
        let image_id = loaded
            .get(index)
            .ok_or_else(|| anyhow!("--select {index} does not name a loaded image"))?;
        session.toggle_selection(image_id).await?;
    }

    let submitted = if args.tool.is_some() || !args.selections.is_empty() {
        match session.submit(args.tool.as_deref()).await {
            Ok(job_id) => Some(job_id),
            Err(err) => {
                warn!(error = %err, "submission rejected");
                None
            }
        }
    } else {
        None
    };

    if let Some(job_id) = &submitted {
        let wait = Duration::from_millis(args.wait_ms);
        if !wait_for_resolution(&mut events, job_id, wait).await {
            warn!(job_id = %job_id, wait_ms = args.wait_ms, "job still pending");
        }
    }

    if let Some(index) = args.active {
        if let Err(err) = session.set_active(index).await {
            warn!(error = %err, "could not change active image");
        }
    }
    if let Some(raw) = args.view_mode.as_deref() {
        let mode = raw.parse::<ViewMode>().unwrap_or_else(|err| {
            warn!(error = %err, "falling back to axial view");
            ViewMode::default()
        });
        let code = session.set_view_mode(mode).await;
        info!(%mode, code = code.0, "view mode applied");
    }
    if args.view_result {
        match &submitted {
            Some(job_id) => match session.view_result(job_id).await {
                Ok(outcome) => info!(
                    job_id = %outcome.job_id,
                    volumes = outcome.volumes_loaded,
                    "result loaded into renderer"
                ),
                Err(err) => warn!(error = %err, "could not view result"),
            },
            None => warn!("--view-result given but no job was submitted"),
        }
    }

    info!(
        volumes = renderer.volumes().len(),
        redraws = renderer.redraw_count(),
        "renderer state"
    );
    println!("{}", serde_json::to_string_pretty(&session.history().await)?);
    Ok(())
}

/// `RUST_LOG` directives when present and valid, `info` otherwise.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

async fn wait_for_resolution(
    events: &mut broadcast::Receiver<SessionEvent>,
    job_id: &JobId,
    wait: Duration,
) -> bool {
    let resolved = async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::JobResolved { job_id: id, .. }) if &id == job_id => return true,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    };
    tokio::time::timeout(wait, resolved).await.unwrap_or(false)
}
