use std::sync::Arc;

use renderer_integration::{RendererAdapter, RendererHandle, Volume};
use shared::{
    domain::{Image, ImageId, JobId, JobStatus},
    protocol::{SliceTypeCode, ViewMode},
};
use tokio::sync::{broadcast, Mutex};
use tracing::info;

pub mod config;
pub mod error;
pub mod jobs;
pub mod orchestrator;
pub mod registry;
pub mod result_applier;
pub mod scene_source;
pub mod tools;
pub mod visibility;

pub use config::{load_settings, SessionSettings};
pub use error::{
    RegistryError, ResolutionError, SessionError, ValidationError, ViewError, VisibilityError,
};
pub use jobs::{JobRecord, JobState};
pub use orchestrator::{JobOrchestrator, OrchestratorOptions, PruneScope};
pub use result_applier::{ResultApplier, ViewOutcome};
pub use scene_source::{HttpSceneSource, MissingSceneSource, SceneSource};
pub use tools::{ToolCatalog, ToolSpec};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ImageLoaded {
        image_id: ImageId,
        name: String,
    },
    SelectionChanged {
        image_id: ImageId,
        selected: bool,
    },
    JobSubmitted {
        job_id: JobId,
        tool_name: String,
    },
    JobResolved {
        job_id: JobId,
        status: JobStatus,
    },
    JobDeleted {
        job_id: JobId,
    },
    HistoryCleared {
        removed: usize,
    },
    ActiveVolumeChanged {
        index: usize,
    },
    ViewModeChanged {
        mode: ViewMode,
        code: SliceTypeCode,
    },
    ResultLoaded {
        job_id: JobId,
        volumes: usize,
    },
}

/// One viewer session: the renderer handle plus every component that acts on
/// it. Construct it once and share it by reference.
pub struct VolumeSession {
    renderer: RendererHandle,
    registry: Mutex<registry::ImageRegistry>,
    visibility: Mutex<visibility::VisibilityController>,
    orchestrator: JobOrchestrator,
    applier: ResultApplier,
    events: broadcast::Sender<SessionEvent>,
}

impl VolumeSession {
    /// A session with no processing service; every submitted job fails.
    ///
    /// Must be called from within a tokio runtime, see [`JobOrchestrator::new`].
    pub fn new(renderer: impl RendererAdapter + 'static) -> Self {
        Self::new_with_dependencies(
            RendererHandle::new(renderer),
            Arc::new(MissingSceneSource),
            OrchestratorOptions::default(),
        )
    }

    /// Wires an HTTP scene source when `settings` names a service URL.
    ///
    /// Must be called from within a tokio runtime, see [`JobOrchestrator::new`].
    pub fn from_settings(
        renderer: impl RendererAdapter + 'static,
        settings: &SessionSettings,
    ) -> anyhow::Result<Self> {
        let scene_source: Arc<dyn SceneSource> = match settings.scene_service_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Arc::new(HttpSceneSource::new(url)?),
            _ => Arc::new(MissingSceneSource),
        };
        Ok(Self::new_with_dependencies(
            RendererHandle::new(renderer),
            scene_source,
            OrchestratorOptions {
                tools: settings.tool_catalog(),
                prune_scope: settings.prune_scope,
                resolution_timeout: settings.resolution_timeout(),
            },
        ))
    }

    /// Must be called from within a tokio runtime, see [`JobOrchestrator::new`].
    pub fn new_with_dependencies(
        renderer: RendererHandle,
        scene_source: Arc<dyn SceneSource>,
        options: OrchestratorOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            orchestrator: JobOrchestrator::new(
                renderer.clone(),
                scene_source,
                options,
                events.clone(),
            ),
            applier: ResultApplier::new(renderer.clone(), events.clone()),
            renderer,
            registry: Mutex::new(registry::ImageRegistry::new()),
            visibility: Mutex::new(visibility::VisibilityController::new()),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn renderer(&self) -> &RendererHandle {
        &self.renderer
    }

    pub fn tools(&self) -> &ToolCatalog {
        self.orchestrator.tools()
    }

    /// Hands a finished volume to the renderer and records it as an image.
    pub async fn load_volume(&self, volume: Volume) -> Result<ImageId, SessionError> {
        let mut registry = self.registry.lock().await;
        if registry.get(&volume.id).is_some() {
            return Err(RegistryError::DuplicateId(volume.id).into());
        }
        let image = Image::new(volume.id.clone(), volume.name.clone());
        self.renderer.lock().await.add_volume(volume);
        registry.add(image.clone())?;

        info!(image_id = %image.id, name = %image.name, "image loaded");
        let _ = self.events.send(SessionEvent::ImageLoaded {
            image_id: image.id.clone(),
            name: image.name,
        });
        Ok(image.id)
    }

    /// Ingests a file reference, see [`Volume::from_url`].
    pub async fn load_url(&self, url: &str) -> Result<ImageId, SessionError> {
        let volume = Volume::from_url(url).map_err(|err| SessionError::Ingest(err.to_string()))?;
        self.load_volume(volume).await
    }

    pub async fn images(&self) -> Vec<Image> {
        self.registry.lock().await.images().to_vec()
    }

    pub async fn toggle_selection(&self, image_id: &ImageId) -> Result<bool, SessionError> {
        let selected = self.registry.lock().await.toggle_selection(image_id)?;
        let _ = self.events.send(SessionEvent::SelectionChanged {
            image_id: image_id.clone(),
            selected,
        });
        Ok(selected)
    }

    /// Submits the currently selected images to `tool_id`.
    pub async fn submit(&self, tool_id: Option<&str>) -> Result<JobId, SessionError> {
        let images = self.registry.lock().await.images().to_vec();
        Ok(self.orchestrator.submit(&images, tool_id).await?)
    }

    pub async fn set_active(&self, index: usize) -> Result<(), SessionError> {
        let registry = self.registry.lock().await;
        let mut visibility = self.visibility.lock().await;
        let mut renderer = self.renderer.lock().await;
        visibility.set_active(&mut **renderer, registry.images(), index)?;
        let _ = self.events.send(SessionEvent::ActiveVolumeChanged { index });
        Ok(())
    }

    pub async fn active_index(&self) -> Option<usize> {
        self.visibility.lock().await.active()
    }

    pub async fn set_view_mode(&self, mode: ViewMode) -> SliceTypeCode {
        let mut visibility = self.visibility.lock().await;
        let mut renderer = self.renderer.lock().await;
        let code = visibility.set_view_mode(&mut **renderer, mode);
        let _ = self.events.send(SessionEvent::ViewModeChanged { mode, code });
        code
    }

    pub async fn view_result(&self, job_id: &JobId) -> Result<ViewOutcome, SessionError> {
        let record = self
            .orchestrator
            .record(job_id)
            .await
            .ok_or_else(|| ViewError::UnknownJob(job_id.clone()))?;
        Ok(self.applier.view_result(&record).await?)
    }

    pub async fn delete_record(&self, job_id: &JobId) -> bool {
        self.orchestrator.delete_record(job_id).await
    }

    pub async fn clear_history(&self) -> usize {
        self.orchestrator.clear_all().await
    }

    pub async fn history(&self) -> Vec<JobRecord> {
        self.orchestrator.history().await
    }

    pub async fn record(&self, job_id: &JobId) -> Option<JobRecord> {
        self.orchestrator.record(job_id).await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
