//! Agent runtime: the pull side of the relay.
//!
//! One indefinitely-running loop per agent process:
//! 1. Heartbeat when due (every 15s), carrying version/hostname/local url
//! 2. Poll the coordinator for up to N jobs
//! 3. Execute each job in order against the local command surface
//! 4. Report exactly one result per job
//!
//! A job dispatched to this agent is never redelivered, even if its result
//! cannot be reported — at-most-once from the relay's perspective. Every
//! per-iteration error is caught at the loop boundary, logged, and followed
//! by a bounded sleep; the process never exits on a transient fault.

pub mod client;
pub mod executor;

use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::AgentSettings;
use crate::job::Job;
use crate::server::{HeartbeatRequest, JobResultRequest};
use client::CoordinatorClient;
use executor::LocalExecutor;

/// Time between successful heartbeats.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Floor for the post-error sleep so a tight failure loop cannot spin.
const MIN_ERROR_BACKOFF: Duration = Duration::from_secs(2);

pub struct AgentRuntime {
    settings: AgentSettings,
    client: CoordinatorClient,
    executor: LocalExecutor,
}

impl AgentRuntime {
    pub fn new(settings: AgentSettings) -> Result<Self> {
        let settings = settings.normalized();
        let client = CoordinatorClient::new(
            &settings.cloud_base_url,
            &settings.agent_id,
            settings.shared_secret.clone(),
            settings.request_timeout,
        )?;
        let executor = LocalExecutor::new(&settings.local_backend_url, settings.request_timeout)?;
        Ok(Self {
            settings,
            client,
            executor,
        })
    }

    /// Run forever. Sleeps between empty polls; drains backlog without
    /// sleeping when jobs were returned.
    pub async fn run(&self) {
        info!(
            "Agent {} starting: cloud={} local={}",
            self.settings.agent_id, self.settings.cloud_base_url, self.settings.local_backend_url
        );

        let mut last_heartbeat: Option<Instant> = None;
        loop {
            match self.run_once(&mut last_heartbeat).await {
                Ok(0) => tokio::time::sleep(self.settings.poll_interval).await,
                Ok(count) => debug!("Processed {} job(s), polling again immediately", count),
                Err(e) => {
                    error!("Agent loop error: {:#}", e);
                    tokio::time::sleep(self.settings.poll_interval.max(MIN_ERROR_BACKOFF)).await;
                }
            }
        }
    }

    /// One loop iteration: heartbeat if due, poll, execute, report.
    ///
    /// Returns the number of jobs the poll handed over. Public so tests and
    /// embedders can drive the loop step by step.
    pub async fn run_once(&self, last_heartbeat: &mut Option<Instant>) -> Result<usize> {
        let heartbeat_due = last_heartbeat.map_or(true, |t| t.elapsed() >= HEARTBEAT_INTERVAL);
        if heartbeat_due {
            match self.client.heartbeat(&self.heartbeat_body()).await {
                Ok(()) => *last_heartbeat = Some(Instant::now()),
                // Non-fatal: the poll still runs this iteration.
                Err(e) => warn!("Heartbeat failed: {:#}", e),
            }
        }

        let jobs = self.client.poll(self.settings.max_jobs_per_poll).await?;
        for job in &jobs {
            self.handle_job(job).await;
        }
        Ok(jobs.len())
    }

    fn heartbeat_body(&self) -> HeartbeatRequest {
        HeartbeatRequest {
            version: Some(self.settings.version.clone()),
            hostname: self.settings.hostname.clone(),
            local_backend_url: Some(self.settings.local_backend_url.clone()),
        }
    }

    /// Execute one job and report its outcome. Execution failure becomes the
    /// job's error string; it never escapes this method.
    async fn handle_job(&self, job: &Job) {
        let report = match self.executor.execute(job).await {
            Ok(output) => {
                info!("Completed job {} (kind={})", job.job_id, job.kind);
                JobResultRequest {
                    status: "success".to_string(),
                    result: serde_json::to_value(&output).ok(),
                    error: None,
                }
            }
            Err(e) => {
                warn!("Job {} failed: {:#}", job.job_id, e);
                JobResultRequest {
                    status: "error".to_string(),
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        };

        // At-most-once: a report that cannot be delivered is logged for
        // operator reconciliation, not retried.
        if let Err(e) = self.client.submit_result(&job.job_id, &report).await {
            error!(
                "Could not report {} outcome for job {}: {:#}",
                report.status, job.job_id, e
            );
        }
    }
}
