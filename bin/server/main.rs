//! Relay Server
//!
//! Runs the cloud coordinator: accepts jobs from cloud callers and hands
//! them to polling agents.

use anyhow::Result;
use clap::Parser;
use signage_relay::{run_server, JobStore, RelaySettings, RelayState};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(about = "Cloud coordinator for display-control agents")]
struct Args {
    /// Server host
    #[arg(long, default_value = "0.0.0.0", env = "RELAY_HOST")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "8080", env = "RELAY_PORT")]
    port: u16,

    /// API key required from cloud callers (x-api-key header)
    #[arg(long, env = "CLOUD_API_KEY", hide_env_values = true)]
    cloud_api_key: Option<String>,

    /// Shared secret required from agents (x-agent-token header)
    #[arg(long, env = "AGENT_SHARED_SECRET", hide_env_values = true)]
    agent_shared_secret: Option<String>,

    /// Fail closed when a required secret is not configured
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "REMOTE_AUTH_REQUIRED"
    )]
    auth_required: bool,
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

    let settings = RelaySettings::new(
        args.cloud_api_key,
        args.agent_shared_secret,
        args.auth_required,
    );

    info!("Starting relay server");
    info!("  Cloud API key configured: {}", settings.cloud_api_key.is_some());
    info!(
        "  Agent shared secret configured: {}",
        settings.agent_shared_secret.is_some()
    );
    info!("  Auth required: {}", settings.auth_required);

    if settings.auth_required
        && (settings.cloud_api_key.is_none() || settings.agent_shared_secret.is_none())
    {
        warn!("A required secret is unset; the affected API class will return 503 until configured");
    }

    let state = Arc::new(RelayState::new(JobStore::new(), settings));

    run_server(state, &args.host, args.port).await
}
