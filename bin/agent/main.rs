//! Relay Agent
//!
//! Runs on-site next to the display-control backend. Polls the cloud
//! coordinator for jobs, executes them locally, and reports results.

use anyhow::{bail, Result};
use clap::Parser;
use signage_relay::{AgentRuntime, AgentSettings};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "relay-agent")]
#[command(about = "On-site agent for the display-control job relay")]
struct Args {
    /// Coordinator base url
    #[arg(long, env = "CLOUD_BASE_URL")]
    cloud_base_url: String,

    /// Agent identity; defaults to the machine hostname
    #[arg(long, env = "AGENT_ID")]
    agent_id: Option<String>,

    /// Shared secret sent as x-agent-token
    #[arg(long, env = "AGENT_SHARED_SECRET", hide_env_values = true)]
    shared_secret: Option<String>,

    /// Local display-control backend base url
    #[arg(long, default_value = "http://127.0.0.1:8000", env = "LOCAL_BACKEND_URL")]
    local_backend_url: String,

    /// Sleep between polls that return no jobs
    #[arg(long, default_value_t = 2.0, env = "AGENT_POLL_INTERVAL_SECONDS")]
    poll_interval_seconds: f64,

    /// Jobs requested per poll (1-50)
    #[arg(long, default_value_t = 5, env = "AGENT_MAX_JOBS_PER_POLL")]
    max_jobs_per_poll: u32,

    /// Timeout for coordinator and local backend requests
    #[arg(long, default_value_t = 20.0, env = "AGENT_REQUEST_TIMEOUT_SECONDS")]
    request_timeout_seconds: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("signage_relay=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let machine_hostname = hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().trim().to_string())
        .filter(|h| !h.is_empty());

    let (agent_id, id_source) = match args.agent_id.map(|id| id.trim().to_string()) {
        Some(id) if !id.is_empty() => (id, "env"),
        _ => match machine_hostname.clone() {
            Some(host) => (host, "hostname"),
            None => bail!("AGENT_ID is unset and the machine hostname could not be determined"),
        },
    };

    info!("Agent id: {} (source={})", agent_id, id_source);

    let mut settings = AgentSettings::new(args.cloud_base_url, agent_id);
    settings.shared_secret = args.shared_secret;
    settings.local_backend_url = args.local_backend_url;
    settings.hostname = machine_hostname;
    settings.poll_interval = Duration::from_secs_f64(args.poll_interval_seconds.max(0.1));
    settings.max_jobs_per_poll = args.max_jobs_per_poll;
    settings.request_timeout = Duration::from_secs_f64(args.request_timeout_seconds.max(1.0));

    let runtime = AgentRuntime::new(settings)?;
    runtime.run().await;

    Ok(())
}
