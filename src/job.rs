//! Job lifecycle types.
//!
//! A job is one unit of work destined for a single agent. Its status only
//! ever moves forward: queued → dispatched → completed | failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a relayed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Dispatched,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Outcome reported by an agent for a dispatched job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Error,
}

impl JobOutcome {
    /// Parse the wire form ("success" | "error", case-insensitive).
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "success" => Some(JobOutcome::Success),
            "error" => Some(JobOutcome::Error),
            _ => None,
        }
    }

    /// The terminal status this outcome maps to.
    pub fn terminal_status(self) -> JobStatus {
        match self {
            JobOutcome::Success => JobStatus::Completed,
            JobOutcome::Error => JobStatus::Failed,
        }
    }
}

/// One unit of work destined for a specific agent.
///
/// Owned exclusively by the store; everything handed to callers is a clone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub agent_id: String,
    /// Closed tag mapped by the agent to exactly one local operation.
    pub kind: String,
    /// Opaque key/value map, passed through without interpretation.
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Structured value on success; never populated together with `error`.
    pub result: Option<serde_json::Value>,
    /// Descriptive string on failure.
    pub error: Option<String>,
}
