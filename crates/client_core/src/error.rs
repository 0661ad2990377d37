use shared::domain::{ImageId, JobId, JobStatus};
use thiserror::Error;

/// Submission rejected before any state changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("select at least one image before submitting")]
    NoImagesSelected,
    #[error("choose a processing tool before submitting")]
    NoToolSelected,
    #[error("unknown processing tool '{0}'")]
    UnknownTool(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("image {0} is not registered")]
    NotFound(ImageId),
    #[error("image {0} is already registered")]
    DuplicateId(ImageId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VisibilityError {
    #[error("image index {index} out of range for {len} loaded images")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Failure while resolving a submitted job. Only ever stored on the job
/// record as text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("network error: {0}")]
    Network(String),
    #[error("could not parse processed scene: {0}")]
    ResultParse(String),
    #[error("no response from processing service after {0} ms")]
    TimedOut(u64),
    #[error("processing request aborted unexpectedly")]
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error("job {0} does not exist")]
    UnknownJob(JobId),
    #[error("job {job_id} has no result to view (status: {status})")]
    NoResult {
        job_id: JobId,
        status: JobStatus,
        error: Option<String>,
    },
    #[error("job {0} returned a scene without volumes")]
    EmptyResult(JobId),
    #[error("renderer failed to load result of job {job_id}: {message}")]
    Load { job_id: JobId, message: String },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Visibility(#[from] VisibilityError),
    #[error(transparent)]
    View(#[from] ViewError),
    #[error("failed to ingest volume: {0}")]
    Ingest(String),
}
