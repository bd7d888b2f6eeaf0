//! HTTP client for the coordinator's agent-facing API.

use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::job::Job;
use crate::server::{HeartbeatRequest, JobResultRequest, PollRequest, PollResponse};

/// Thin reqwest wrapper for heartbeat / poll / result calls.
///
/// The shared secret, when set, is sent as the x-agent-token header on every
/// request. All requests carry one process-wide timeout so a stuck
/// coordinator cannot wedge the agent loop.
pub struct CoordinatorClient {
    base_url: String,
    agent_id: String,
    shared_secret: Option<String>,
    http: reqwest::Client,
}

impl CoordinatorClient {
    pub fn new(
        base_url: &str,
        agent_id: &str,
        shared_secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent_id: agent_id.to_string(),
            shared_secret,
            http,
        })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.post(format!("{}{}", self.base_url, path));
        if let Some(secret) = &self.shared_secret {
            builder = builder.header("x-agent-token", secret);
        }
        builder
    }

    /// Declare liveness and local metadata to the coordinator.
    pub async fn heartbeat(&self, body: &HeartbeatRequest) -> Result<()> {
        let resp = self
            .post(&format!("/api/agent/{}/heartbeat", self.agent_id))
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(anyhow!("Heartbeat failed: {}", resp.status()));
        }
        Ok(())
    }

    /// Ask for up to `max_jobs` queued jobs; dispatched jobs are returned
    /// oldest first and will not be redelivered.
    pub async fn poll(&self, max_jobs: u32) -> Result<Vec<Job>> {
        let resp = self
            .post(&format!("/api/agent/{}/poll", self.agent_id))
            .json(&PollRequest {
                max_jobs: Some(max_jobs),
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(anyhow!("Poll failed: {}", resp.status()));
        }

        let body: PollResponse = resp.json().await?;
        Ok(body.jobs)
    }

    /// Report the terminal outcome for one dispatched job.
    pub async fn submit_result(&self, job_id: &str, report: &JobResultRequest) -> Result<()> {
        let resp = self
            .post(&format!(
                "/api/agent/{}/jobs/{}/result",
                self.agent_id, job_id
            ))
            .json(report)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(anyhow!("Result submission failed: {}", resp.status()));
        }
        Ok(())
    }
}
