use std::{
    path::Path,
    sync::{Arc, Mutex as StdMutex, MutexGuard},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::ImageId,
    protocol::{DocumentSnapshot, ImageOptions, SliceTypeCode},
};
use tokio::sync::{Mutex, MutexGuard as AsyncMutexGuard};
use tracing::debug;
use url::Url;

/// A volume as the rendering engine holds it once loading has finished.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    pub id: ImageId,
    pub name: String,
    pub options: ImageOptions,
}

impl Volume {
    /// Ingests a file reference, assigning the renderer-side id.
    pub fn from_url(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(anyhow!("volume url must not be empty"));
        }
        let name = display_name_for(raw)
            .ok_or_else(|| anyhow!("cannot derive a volume name from '{raw}'"))?;
        let id = ImageId(uuid::Uuid::new_v4().to_string());
        Ok(Self {
            options: ImageOptions {
                id: Some(id.0.clone()),
                name: Some(name.clone()),
                url: Some(raw.to_string()),
                opacity: Some(1.0),
                ..ImageOptions::default()
            },
            id,
            name,
        })
    }

    fn from_options(options: ImageOptions, ordinal: usize) -> Self {
        let id = options
            .id
            .clone()
            .map(ImageId)
            .unwrap_or_else(|| ImageId(uuid::Uuid::new_v4().to_string()));
        let name = options
            .name
            .clone()
            .or_else(|| options.url.as_deref().and_then(display_name_for))
            .unwrap_or_else(|| format!("volume-{ordinal}"));
        Self {
            options: ImageOptions {
                id: Some(id.0.clone()),
                name: Some(name.clone()),
                ..options
            },
            id,
            name,
        }
    }
}

fn display_name_for(raw: &str) -> Option<String> {
    if let Ok(parsed) = Url::parse(raw) {
        if parsed.scheme().len() > 1 {
            return parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|segment| !segment.is_empty())
                .map(str::to_string);
        }
    }
    Path::new(raw)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Boundary to the volume-rendering engine.
#[async_trait]
pub trait RendererAdapter: Send {
    fn add_volume(&mut self, volume: Volume);
    fn remove_volume_by_index(&mut self, index: usize) -> Result<Volume>;
    fn set_opacity(&mut self, volume_index: usize, value: f32) -> Result<()>;
    fn update_gl_volume(&mut self);
    fn volume_index_by_id(&self, id: &ImageId) -> Option<usize>;
    fn volume_ids(&self) -> Vec<ImageId>;
    fn set_slice_type(&mut self, code: SliceTypeCode);
    async fn load_volumes(&mut self, options: Vec<ImageOptions>) -> Result<()>;
    fn json(&self) -> DocumentSnapshot;
}

/// The one renderer instance of a session.
///
/// Every mutation goes through [`RendererHandle::lock`], so visibility
/// updates, submission pruning and result loading never interleave.
#[derive(Clone)]
pub struct RendererHandle {
    inner: Arc<Mutex<Box<dyn RendererAdapter>>>,
}

impl RendererHandle {
    pub fn new(renderer: impl RendererAdapter + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(renderer))),
        }
    }

    pub async fn lock(&self) -> AsyncMutexGuard<'_, Box<dyn RendererAdapter>> {
        self.inner.lock().await
    }
}

#[derive(Debug, Default)]
struct InMemoryState {
    volumes: Vec<Volume>,
    slice_type: Option<SliceTypeCode>,
    redraws: usize,
    load_calls: Vec<usize>,
    fail_loads_with: Option<String>,
}

/// Headless renderer that keeps volume state in memory.
///
/// Clones share state, so a caller can hand one clone to a session and keep
/// another to inspect what the session did.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRenderer {
    state: Arc<StdMutex<InMemoryState>>,
}

impl InMemoryRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `load_volumes` call fail with `message`.
    pub fn failing_loads(message: impl Into<String>) -> Self {
        let renderer = Self::default();
        renderer.state().fail_loads_with = Some(message.into());
        renderer
    }

    fn state(&self) -> MutexGuard<'_, InMemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn volumes(&self) -> Vec<Volume> {
        self.state().volumes.clone()
    }

    pub fn opacity_of(&self, id: &ImageId) -> Option<f32> {
        self.state()
            .volumes
            .iter()
            .find(|volume| &volume.id == id)
            .and_then(|volume| volume.options.opacity)
    }

    pub fn slice_type(&self) -> Option<SliceTypeCode> {
        self.state().slice_type
    }

    pub fn redraw_count(&self) -> usize {
        self.state().redraws
    }

    /// Number of volumes passed to each `load_volumes` call, in call order.
    pub fn load_calls(&self) -> Vec<usize> {
        self.state().load_calls.clone()
    }
}

#[async_trait]
impl RendererAdapter for InMemoryRenderer {
    fn add_volume(&mut self, volume: Volume) {
        debug!(volume_id = %volume.id, name = %volume.name, "renderer: add volume");
        self.state().volumes.push(volume);
    }

    fn remove_volume_by_index(&mut self, index: usize) -> Result<Volume> {
        let mut state = self.state();
        if index >= state.volumes.len() {
            return Err(anyhow!(
                "volume index {index} out of range for {} volumes",
                state.volumes.len()
            ));
        }
        Ok(state.volumes.remove(index))
    }

    fn set_opacity(&mut self, volume_index: usize, value: f32) -> Result<()> {
        let mut state = self.state();
        let volume = state
            .volumes
            .get_mut(volume_index)
            .ok_or_else(|| anyhow!("no volume at index {volume_index}"))?;
        volume.options.opacity = Some(value);
        Ok(())
    }

    fn update_gl_volume(&mut self) {
        self.state().redraws += 1;
    }

    fn volume_index_by_id(&self, id: &ImageId) -> Option<usize> {
        self.state()
            .volumes
            .iter()
            .position(|volume| &volume.id == id)
    }

    fn volume_ids(&self) -> Vec<ImageId> {
        self.state()
            .volumes
            .iter()
            .map(|volume| volume.id.clone())
            .collect()
    }

    fn set_slice_type(&mut self, code: SliceTypeCode) {
        self.state().slice_type = Some(code);
    }

    async fn load_volumes(&mut self, options: Vec<ImageOptions>) -> Result<()> {
        let mut state = self.state();
        state.load_calls.push(options.len());
        if let Some(message) = &state.fail_loads_with {
            return Err(anyhow!(message.clone()));
        }
        state.volumes = options
            .into_iter()
            .enumerate()
            .map(|(ordinal, options)| Volume::from_options(options, ordinal))
            .collect();
        state.redraws += 1;
        Ok(())
    }

    fn json(&self) -> DocumentSnapshot {
        DocumentSnapshot::new(
            self.state()
                .volumes
                .iter()
                .map(|volume| volume.options.clone())
                .collect(),
        )
    }
}
