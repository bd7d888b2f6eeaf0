//! In-memory job and agent state.
//!
//! Responsibilities:
//! 1. Per-agent FIFO queues of jobs awaiting dispatch
//! 2. At-most-once dispatch (queued → dispatched under one lock)
//! 3. Result correlation with ownership checks
//! 4. Agent liveness records (last_seen, declared metadata)
//!
//! Every operation takes one store-wide lock for its entire duration. This
//! serializes all access; job volume is bounded by control-plane command
//! rates, so the throughput ceiling is acceptable. No operation performs
//! I/O while holding the lock. State is not persisted — a restart loses all
//! queued and in-flight history.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::job::{Job, JobOutcome, JobStatus};

/// Errors surfaced by store operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("job {job_id} does not belong to agent {agent_id}")]
    NotOwner { job_id: String, agent_id: String },
}

/// Liveness record for one agent, created or overwritten on heartbeat/poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub last_seen: DateTime<Utc>,
    pub version: Option<String>,
    pub hostname: Option<String>,
    pub local_backend_url: Option<String>,
}

/// One row of the agent listing; queue_depth is derived, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub last_seen: DateTime<Utc>,
    pub version: Option<String>,
    pub hostname: Option<String>,
    pub local_backend_url: Option<String>,
    pub queue_depth: usize,
}

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<String, Job>,
    /// Per-agent FIFO of job ids awaiting dispatch. Entries are removed when
    /// drained to empty, so an absent key means an empty queue.
    queues: HashMap<String, VecDeque<String>>,
    /// BTreeMap keeps the agent listing sorted by id.
    agents: BTreeMap<String, AgentRecord>,
}

impl StoreInner {
    /// Bump last_seen for an agent, creating a bare record if none exists.
    /// Declared metadata is left untouched.
    fn mark_seen(&mut self, agent_id: &str, now: DateTime<Utc>) {
        self.agents
            .entry(agent_id.to_string())
            .and_modify(|record| record.last_seen = now)
            .or_insert(AgentRecord {
                last_seen: now,
                version: None,
                hostname: None,
                local_backend_url: None,
            });
    }
}

/// Authoritative in-memory state for jobs, agent records, and queues.
///
/// Constructed explicitly and shared behind an `Arc`; never accessed through
/// ambient globals.
pub struct JobStore {
    inner: Mutex<StoreInner>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// Create a queued job for an agent and append it to that agent's queue.
    ///
    /// The agent is not required to exist or to be alive; jobs for an agent
    /// that never polls simply stay queued.
    pub fn enqueue(&self, agent_id: &str, kind: &str, payload: serde_json::Value) -> Job {
        let job = Job {
            job_id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            kind: kind.to_string(),
            payload,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            dispatched_at: None,
            finished_at: None,
            result: None,
            error: None,
        };

        let mut inner = self.inner.lock();
        inner
            .queues
            .entry(agent_id.to_string())
            .or_default()
            .push_back(job.job_id.clone());
        inner.jobs.insert(job.job_id.clone(), job.clone());

        debug!("Enqueued job {} (kind={}) for {}", job.job_id, kind, agent_id);
        job
    }

    /// Snapshot of a job by id.
    pub fn get(&self, job_id: &str) -> Result<Job, StoreError> {
        let inner = self.inner.lock();
        inner
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))
    }

    /// Pop up to `max_count` jobs from the front of an agent's queue and
    /// atomically mark them dispatched.
    ///
    /// Oldest first. A popped id whose job is missing or no longer queued is
    /// skipped silently; that cannot happen while the store is the single
    /// writer, and a poll must not fail over it. Polling also refreshes the
    /// agent's last_seen, even when the queue is empty.
    pub fn dispatch(&self, agent_id: &str, max_count: usize) -> Vec<Job> {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        let popped: Vec<String> = match inner.queues.get_mut(agent_id) {
            Some(queue) => {
                let take = max_count.min(queue.len());
                queue.drain(..take).collect()
            }
            None => Vec::new(),
        };

        // Reclaim the queue entry once drained.
        if inner.queues.get(agent_id).is_some_and(|q| q.is_empty()) {
            inner.queues.remove(agent_id);
        }

        let mut dispatched = Vec::with_capacity(popped.len());
        for job_id in popped {
            let Some(job) = inner.jobs.get_mut(&job_id) else {
                continue;
            };
            if job.status != JobStatus::Queued {
                continue;
            }
            job.status = JobStatus::Dispatched;
            job.dispatched_at = Some(now);
            dispatched.push(job.clone());
        }

        inner.mark_seen(agent_id, now);

        if !dispatched.is_empty() {
            debug!("Dispatched {} job(s) to {}", dispatched.len(), agent_id);
        }
        dispatched
    }

    /// Record the terminal outcome an agent reports for a job it owns.
    ///
    /// Stores result or error exclusively and stamps the finished timestamp.
    /// A repeated call on an already-terminal job overwrites the terminal
    /// state; that is an accepted simplification, not a guarantee. Reporting
    /// also refreshes the agent's last_seen.
    pub fn record_result(
        &self,
        agent_id: &str,
        job_id: &str,
        outcome: JobOutcome,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<Job, StoreError> {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;

        if job.agent_id != agent_id {
            return Err(StoreError::NotOwner {
                job_id: job_id.to_string(),
                agent_id: agent_id.to_string(),
            });
        }

        job.status = outcome.terminal_status();
        job.finished_at = Some(now);
        match outcome {
            JobOutcome::Success => {
                job.result = result;
                job.error = None;
            }
            JobOutcome::Error => {
                job.result = None;
                job.error = error;
            }
        }
        let snapshot = job.clone();

        inner.mark_seen(agent_id, now);

        debug!("Recorded {:?} for job {} from {}", snapshot.status, job_id, agent_id);
        Ok(snapshot)
    }

    /// Upsert an agent's heartbeat metadata, updating last_seen
    /// unconditionally. Declared fields overwrite the previous record.
    pub fn touch(
        &self,
        agent_id: &str,
        version: Option<String>,
        hostname: Option<String>,
        local_backend_url: Option<String>,
    ) {
        let mut inner = self.inner.lock();
        inner.agents.insert(
            agent_id.to_string(),
            AgentRecord {
                last_seen: Utc::now(),
                version,
                hostname,
                local_backend_url,
            },
        );
    }

    /// All known agents, sorted by id, with live queue depths.
    pub fn list_agents(&self) -> Vec<AgentSummary> {
        let inner = self.inner.lock();
        inner
            .agents
            .iter()
            .map(|(agent_id, record)| AgentSummary {
                agent_id: agent_id.clone(),
                last_seen: record.last_seen,
                version: record.version.clone(),
                hostname: record.hostname.clone(),
                local_backend_url: record.local_backend_url.clone(),
                queue_depth: inner.queues.get(agent_id).map_or(0, VecDeque::len),
            })
            .collect()
    }

    /// Current number of jobs awaiting dispatch for an agent.
    pub fn queue_depth(&self, agent_id: &str) -> usize {
        let inner = self.inner.lock();
        inner.queues.get(agent_id).map_or(0, VecDeque::len)
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
