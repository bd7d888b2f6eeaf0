//! Signage Relay
//!
//! Relays control jobs from a cloud coordinator to pull-based agents that
//! sit behind NAT/firewalls and cannot be reached directly. Jobs are queued
//! per agent (FIFO), dispatched at most once when the agent polls, and
//! correlated back when the agent reports the outcome.
//!
//! ## Module Structure
//!
//! - `job`: job lifecycle types (status, outcome)
//! - `store`: authoritative in-memory state under one store-wide lock
//! - `auth`: two-tier credential checks (cloud API key, agent shared secret)
//! - `config`: coordinator and agent settings
//! - `server`: coordinator HTTP API (axum)
//! - `agent`: agent runtime — heartbeat, poll, execute, report

pub mod agent;
pub mod auth;
pub mod config;
pub mod job;
pub mod server;
pub mod store;

pub use agent::client::CoordinatorClient;
pub use agent::executor::{ExecutionError, ExecutionOutput, JobKind, LocalExecutor};
pub use agent::AgentRuntime;
pub use auth::{check_credential, AuthOutcome, CredentialClass};
pub use config::{AgentSettings, RelaySettings};
pub use job::{Job, JobOutcome, JobStatus};
pub use server::{router, run_server, ApiError, RelayState};
pub use store::{AgentRecord, AgentSummary, JobStore, StoreError};
