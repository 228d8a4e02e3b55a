// Job Domain Model

use crate::domain::command::{ObdCommand, ObdResponse};
use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Job ID, assigned by the gateway in enqueue order
pub type JobId = u64;

/// Job State
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    New,
    Running,
    Finished,
    ExecutionError,
    QueueError,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::New => write!(f, "NEW"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Finished => write!(f, "FINISHED"),
            JobState::ExecutionError => write!(f, "EXECUTION_ERROR"),
            JobState::QueueError => write!(f, "QUEUE_ERROR"),
        }
    }
}

/// A diagnostic command waiting to run against the adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObdCommandJob {
    /// None until the gateway queues the job
    pub id: Option<JobId>,
    pub command: ObdCommand,
    pub state: JobState,

    pub result: Option<ObdResponse>,
    pub error: Option<String>,

    pub queued_at: Option<i64>, // epoch ms
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl ObdCommandJob {
    pub fn new(command: ObdCommand) -> Self {
        Self {
            id: None,
            command,
            state: JobState::New,
            result: None,
            error: None,
            queued_at: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Transition to Running state with explicit timestamp
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.state != JobState::New {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: JobState::Running.to_string(),
            });
        }
        self.state = JobState::Running;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Transition to Finished state, keeping the adapter response
    pub fn finish(&mut self, response: ObdResponse, now_millis: i64) -> Result<()> {
        if self.state != JobState::Running {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: JobState::Finished.to_string(),
            });
        }
        self.state = JobState::Finished;
        self.result = Some(response);
        self.finished_at = Some(now_millis);
        Ok(())
    }

    /// Mark as failed during execution
    pub fn fail_execution(&mut self, message: impl Into<String>, now_millis: i64) {
        self.state = JobState::ExecutionError;
        self.error = Some(message.into());
        self.finished_at = Some(now_millis);
    }

    /// Mark as rejected by the queue
    pub fn fail_queue(&mut self, message: impl Into<String>, now_millis: i64) {
        self.state = JobState::QueueError;
        self.error = Some(message.into());
        self.finished_at = Some(now_millis);
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            JobState::Finished | JobState::ExecutionError | JobState::QueueError
        )
    }

    pub fn view(&self) -> JobView {
        JobView::from(self)
    }
}

/// Flat, serializable snapshot of a job for listeners and API clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: Option<JobId>,
    pub name: String,
    pub command: String,
    pub state: JobState,
    pub value: Option<String>,
    pub data: Vec<u8>,
    pub error: Option<String>,
    pub queued_at: Option<i64>,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl From<&ObdCommandJob> for JobView {
    fn from(job: &ObdCommandJob) -> Self {
        Self {
            job_id: job.id,
            name: job.command.name.clone(),
            command: job.command.raw.clone(),
            state: job.state,
            value: job.result.as_ref().map(ObdResponse::formatted),
            data: job
                .result
                .as_ref()
                .map(|r| r.data.clone())
                .unwrap_or_default(),
            error: job.error.clone(),
            queued_at: job.queued_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}
