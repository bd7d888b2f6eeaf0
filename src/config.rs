//! Relay configuration.
//!
//! Two independent surfaces: the coordinator's auth settings and the agent
//! process settings. Both binaries collect these from flags/environment and
//! hand them to the library — nothing in here reads the environment itself.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of jobs an agent asks for per poll.
pub const DEFAULT_MAX_JOBS_PER_POLL: u32 = 5;

/// Hard cap on jobs per poll, matching the coordinator's validation bound.
pub const MAX_JOBS_PER_POLL_LIMIT: u32 = 50;

/// Coordinator settings: the two credential classes and the enforcement
/// toggle. Empty or whitespace-only secrets are normalized to unset so a
/// blank environment variable cannot silently disable a credential check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    pub cloud_api_key: Option<String>,
    pub agent_shared_secret: Option<String>,
    /// When true (the default), a missing secret fails its whole class
    /// closed instead of letting calls through.
    pub auth_required: bool,
}

impl RelaySettings {
    pub fn new(
        cloud_api_key: Option<String>,
        agent_shared_secret: Option<String>,
        auth_required: bool,
    ) -> Self {
        Self {
            cloud_api_key: normalize_secret(cloud_api_key),
            agent_shared_secret: normalize_secret(agent_shared_secret),
            auth_required,
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            cloud_api_key: None,
            agent_shared_secret: None,
            auth_required: true,
        }
    }
}

fn normalize_secret(secret: Option<String>) -> Option<String> {
    secret
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Settings for one agent process.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Coordinator base url, without trailing slash.
    pub cloud_base_url: String,
    /// Stable identity for this agent across its lifetime.
    pub agent_id: String,
    /// Shared secret sent as x-agent-token; omitted when unset.
    pub shared_secret: Option<String>,
    /// Local command surface base url, without trailing slash.
    pub local_backend_url: String,
    /// Declared in heartbeats.
    pub version: String,
    /// Declared in heartbeats.
    pub hostname: Option<String>,
    /// Sleep between polls that return no work.
    pub poll_interval: Duration,
    pub max_jobs_per_poll: u32,
    /// Timeout applied to every coordinator and local request.
    pub request_timeout: Duration,
}

impl AgentSettings {
    pub fn new(cloud_base_url: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            cloud_base_url: cloud_base_url.into(),
            agent_id: agent_id.into(),
            shared_secret: None,
            local_backend_url: "http://127.0.0.1:8000".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            hostname: None,
            poll_interval: Duration::from_secs(2),
            max_jobs_per_poll: DEFAULT_MAX_JOBS_PER_POLL,
            request_timeout: Duration::from_secs(20),
        }
    }

    /// Trim trailing slashes off urls, drop blank secrets, and clamp the
    /// poll batch size into the coordinator's accepted range.
    pub fn normalized(mut self) -> Self {
        self.cloud_base_url = self.cloud_base_url.trim_end_matches('/').to_string();
        self.local_backend_url = self.local_backend_url.trim_end_matches('/').to_string();
        self.shared_secret = normalize_secret(self.shared_secret);
        self.max_jobs_per_poll = self.max_jobs_per_poll.clamp(1, MAX_JOBS_PER_POLL_LIMIT);
        self
    }
}
