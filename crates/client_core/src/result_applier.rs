use renderer_integration::RendererHandle;
use shared::domain::JobId;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{error::ViewError, jobs::JobRecord, SessionEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewOutcome {
    pub job_id: JobId,
    pub volumes_loaded: usize,
}

/// Pushes a finished job's scene into the renderer.
pub struct ResultApplier {
    renderer: RendererHandle,
    events: broadcast::Sender<SessionEvent>,
}

impl ResultApplier {
    pub fn new(renderer: RendererHandle, events: broadcast::Sender<SessionEvent>) -> Self {
        Self { renderer, events }
    }

    pub async fn view_result(&self, record: &JobRecord) -> Result<ViewOutcome, ViewError> {
        if let Some(error) = record.error() {
            warn!(job_id = %record.id, %error, "job reported an error");
        }
        let Some(result) = record.result() else {
            return Err(ViewError::NoResult {
                job_id: record.id.clone(),
                status: record.status(),
                error: record.error().map(str::to_string),
            });
        };
        if !result.has_volumes() {
            return Err(ViewError::EmptyResult(record.id.clone()));
        }

        let options = result.image_options_array.clone();
        let volumes_loaded = options.len();
        self.renderer
            .lock()
            .await
            .load_volumes(options)
            .await
            .map_err(|err| ViewError::Load {
                job_id: record.id.clone(),
                message: err.to_string(),
            })?;

        info!(job_id = %record.id, volumes = volumes_loaded, "job result loaded");
        let _ = self.events.send(SessionEvent::ResultLoaded {
            job_id: record.id.clone(),
            volumes: volumes_loaded,
        });
        Ok(ViewOutcome {
            job_id: record.id.clone(),
            volumes_loaded,
        })
    }
}
