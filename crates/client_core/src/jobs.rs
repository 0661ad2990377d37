//! Job records and the submission history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{JobId, JobStatus},
    protocol::DocumentSnapshot,
};

use crate::error::ResolutionError;

pub type JobOutcome = Result<DocumentSnapshot, ResolutionError>;

/// Where a job is in its lifecycle. A result only exists on `Completed` and an
/// error only on `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Completed { result: DocumentSnapshot },
    Failed { error: String },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Pending => JobStatus::Pending,
            JobState::Completed { .. } => JobStatus::Completed,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub submitted_snapshot: DocumentSnapshot,
    #[serde(flatten)]
    state: JobState,
}

impl JobRecord {
    pub fn pending(tool_name: impl Into<String>, submitted_snapshot: DocumentSnapshot) -> Self {
        Self {
            id: JobId::generate(),
            timestamp: Utc::now(),
            tool_name: tool_name.into(),
            submitted_snapshot,
            state: JobState::Pending,
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn result(&self) -> Option<&DocumentSnapshot> {
        match &self.state {
            JobState::Completed { result } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, JobState::Pending)
    }

    /// Moves a pending record to its terminal state. Terminal records are
    /// left alone and report the status they already hold.
    fn resolve(&mut self, outcome: JobOutcome) -> Result<JobStatus, JobStatus> {
        if !self.is_pending() {
            return Err(self.status());
        }
        self.state = match outcome {
            Ok(result) => JobState::Completed { result },
            Err(err) => JobState::Failed {
                error: err.to_string(),
            },
        };
        Ok(self.status())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveEffect {
    Applied(JobStatus),
    AlreadyResolved(JobStatus),
    UnknownJob,
}

/// Submitted jobs, most recent first. Order is fixed when a record is
/// prepended; resolution only rewrites the record's state in place.
#[derive(Debug, Default)]
pub struct JobHistory {
    records: VecDeque<JobRecord>,
}

impl JobHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prepend(&mut self, record: JobRecord) {
        self.records.push_front(record);
    }

    pub fn resolve(&mut self, job_id: &JobId, outcome: JobOutcome) -> ResolveEffect {
        let Some(record) = self.records.iter_mut().find(|record| &record.id == job_id) else {
            return ResolveEffect::UnknownJob;
        };
        match record.resolve(outcome) {
            Ok(status) => ResolveEffect::Applied(status),
            Err(status) => ResolveEffect::AlreadyResolved(status),
        }
    }

    pub fn remove(&mut self, job_id: &JobId) -> Option<JobRecord> {
        let index = self.records.iter().position(|record| &record.id == job_id)?;
        self.records.remove(index)
    }

    /// Drops every record and returns how many there were.
    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }

    pub fn get(&self, job_id: &JobId) -> Option<&JobRecord> {
        self.records.iter().find(|record| &record.id == job_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &JobRecord> {
        self.records.iter()
    }

    pub fn to_vec(&self) -> Vec<JobRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/jobs_tests.rs"]
mod tests;
