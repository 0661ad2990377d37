//! Job submission and asynchronous resolution.
//!
//! `submit` validates, snapshots the renderer and records a pending job
//! before returning. The fetch runs on its own task and reports back with a
//! [`JobResolution`] message; a single mutator task owns applying those
//! messages to the history, so concurrent resolutions never race on it.

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use renderer_integration::{RendererAdapter, RendererHandle};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{Image, JobId},
    protocol::DocumentSnapshot,
};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::{
    error::{ResolutionError, ValidationError},
    jobs::{JobHistory, JobOutcome, JobRecord, ResolveEffect},
    scene_source::SceneSource,
    tools::ToolCatalog,
    SessionEvent,
};

/// How far submission-time pruning of unselected volumes reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneScope {
    /// Unselected volumes are removed from the live renderer before the
    /// snapshot is taken.
    #[default]
    Renderer,
    /// The renderer keeps every volume; only the submitted snapshot is
    /// filtered down to the selection.
    SnapshotOnly,
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorOptions {
    pub tools: ToolCatalog,
    pub prune_scope: PruneScope,
    pub resolution_timeout: Option<Duration>,
}

/// Outcome of one job, delivered to the history mutator.
#[derive(Debug)]
pub struct JobResolution {
    pub job_id: JobId,
    pub outcome: JobOutcome,
}

pub struct JobOrchestrator {
    renderer: RendererHandle,
    scene_source: Arc<dyn SceneSource>,
    options: OrchestratorOptions,
    history: Arc<RwLock<JobHistory>>,
    resolutions: mpsc::UnboundedSender<JobResolution>,
    events: broadcast::Sender<SessionEvent>,
}

impl JobOrchestrator {
    /// Must be called from within a tokio runtime; the history mutator task
    /// is spawned here.
    pub fn new(
        renderer: RendererHandle,
        scene_source: Arc<dyn SceneSource>,
        options: OrchestratorOptions,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let history = Arc::new(RwLock::new(JobHistory::new()));
        let (resolutions, inbox) = mpsc::unbounded_channel();
        tokio::spawn(apply_resolutions(
            inbox,
            Arc::clone(&history),
            events.clone(),
        ));
        Self {
            renderer,
            scene_source,
            options,
            history,
            resolutions,
            events,
        }
    }

    pub fn tools(&self) -> &ToolCatalog {
        &self.options.tools
    }

    pub fn prune_scope(&self) -> PruneScope {
        self.options.prune_scope
    }

    /// Submits the selected entries of `images` to `tool_id`. `images` is the
    /// full registry list; only its unselected entries are eligible for
    /// pruning, so renderer volumes the registry does not track are kept.
    pub async fn submit(
        &self,
        images: &[Image],
        tool_id: Option<&str>,
    ) -> Result<JobId, ValidationError> {
        let selected = images.iter().filter(|image| image.selected).count();
        if selected == 0 {
            return Err(ValidationError::NoImagesSelected);
        }
        let tool_name = self.options.tools.resolve(tool_id)?.name.clone();

        let submitted_snapshot = self.snapshot_for_submission(images).await;
        let record = JobRecord::pending(tool_name.clone(), submitted_snapshot);
        let job_id = record.id.clone();
        self.history.write().await.prepend(record);

        info!(
            job_id = %job_id,
            tool = %tool_name,
            images = selected,
            "job submitted"
        );
        let _ = self.events.send(SessionEvent::JobSubmitted {
            job_id: job_id.clone(),
            tool_name,
        });

        self.spawn_resolution(job_id.clone());
        Ok(job_id)
    }

    async fn snapshot_for_submission(&self, images: &[Image]) -> DocumentSnapshot {
        let unselected: Vec<&Image> = images.iter().filter(|image| !image.selected).collect();
        let mut renderer = self.renderer.lock().await;
        match self.options.prune_scope {
            PruneScope::Renderer => {
                prune_unselected(&mut **renderer, &unselected);
                renderer.json()
            }
            PruneScope::SnapshotOnly => {
                let mut snapshot = renderer.json();
                snapshot.image_options_array.retain(|options| {
                    !unselected
                        .iter()
                        .any(|image| options.refers_to(image.id.as_str(), &image.name))
                });
                snapshot
            }
        }
    }

    fn spawn_resolution(&self, job_id: JobId) {
        let scene_source = Arc::clone(&self.scene_source);
        let resolutions = self.resolutions.clone();
        let timeout = self.options.resolution_timeout;
        tokio::spawn(async move {
            let outcome = resolve_job(scene_source.as_ref(), timeout).await;
            match &outcome {
                Ok(scene) => debug!(
                    job_id = %job_id,
                    volumes = scene.volume_count(),
                    "processed scene received"
                ),
                Err(err) => warn!(job_id = %job_id, error = %err, "job resolution failed"),
            }
            if resolutions.send(JobResolution { job_id, outcome }).is_err() {
                warn!("history mutator stopped; dropping job resolution");
            }
        });
    }

    /// Removes one record, whatever its status. Returns whether it existed.
    pub async fn delete_record(&self, job_id: &JobId) -> bool {
        let removed = self.history.write().await.remove(job_id).is_some();
        if removed {
            debug!(job_id = %job_id, "job record deleted");
            let _ = self.events.send(SessionEvent::JobDeleted {
                job_id: job_id.clone(),
            });
        }
        removed
    }

    pub async fn clear_all(&self) -> usize {
        let removed = self.history.write().await.clear();
        debug!(removed, "job history cleared");
        let _ = self.events.send(SessionEvent::HistoryCleared { removed });
        removed
    }

    /// Current history, most recent first.
    pub async fn history(&self) -> Vec<JobRecord> {
        self.history.read().await.to_vec()
    }

    pub async fn record(&self, job_id: &JobId) -> Option<JobRecord> {
        self.history.read().await.get(job_id).cloned()
    }
}

fn prune_unselected(renderer: &mut dyn RendererAdapter, unselected: &[&Image]) {
    let mut indices: Vec<usize> = unselected
        .iter()
        .filter_map(|image| renderer.volume_index_by_id(&image.id))
        .collect();
    // Highest index first so earlier indices stay valid.
    indices.sort_unstable_by(|a, b| b.cmp(a));
    indices.dedup();

    let mut pruned = 0usize;
    for index in indices {
        match renderer.remove_volume_by_index(index) {
            Ok(volume) => {
                pruned += 1;
                debug!(volume_id = %volume.id, "pruned unselected volume before submission");
            }
            Err(err) => warn!(index, error = %err, "failed to prune unselected volume"),
        }
    }
    if pruned > 0 {
        renderer.update_gl_volume();
    }
}

async fn resolve_job(
    scene_source: &dyn SceneSource,
    timeout: Option<Duration>,
) -> JobOutcome {
    let fetch = AssertUnwindSafe(scene_source.fetch_scene()).catch_unwind();
    let fetched = match timeout {
        Some(limit) => match tokio::time::timeout(limit, fetch).await {
            Ok(fetched) => fetched,
            Err(_) => {
                return Err(ResolutionError::TimedOut(
                    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                ))
            }
        },
        None => fetch.await,
    };
    fetched.unwrap_or(Err(ResolutionError::Aborted))
}

async fn apply_resolutions(
    mut inbox: mpsc::UnboundedReceiver<JobResolution>,
    history: Arc<RwLock<JobHistory>>,
    events: broadcast::Sender<SessionEvent>,
) {
    while let Some(JobResolution { job_id, outcome }) = inbox.recv().await {
        let effect = history.write().await.resolve(&job_id, outcome);
        match effect {
            ResolveEffect::Applied(status) => {
                info!(job_id = %job_id, %status, "job resolved");
                let _ = events.send(SessionEvent::JobResolved { job_id, status });
            }
            ResolveEffect::AlreadyResolved(status) => {
                warn!(job_id = %job_id, %status, "ignoring second resolution for job");
            }
            ResolveEffect::UnknownJob => {
                debug!(job_id = %job_id, "job was deleted before it resolved");
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
