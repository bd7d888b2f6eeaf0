//! Job execution against the local command surface.
//!
//! The local command surface is the already-existing display-control backend
//! running next to the agent. It is treated as a black box reachable over
//! HTTP; this module only maps each job kind onto exactly one of its
//! operations and captures the response. Job kinds are a closed enumeration:
//! anything unrecognized fails that job cleanly instead of guessing.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::job::Job;

/// Closed set of operations an agent can perform locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// "tv" — send a power command to a display.
    Power,
    /// "test" — run a connectivity probe against a display.
    Connectivity,
    /// "probe" — discover the display's control port.
    Probe,
    /// "mdc_execute" — execute a named protocol command with operation + args.
    ProtocolCommand,
    /// "local_http" — issue an arbitrary request to the local backend.
    LocalHttp,
}

impl JobKind {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "tv" => Some(JobKind::Power),
            "test" => Some(JobKind::Connectivity),
            "probe" => Some(JobKind::Probe),
            "mdc_execute" => Some(JobKind::ProtocolCommand),
            "local_http" => Some(JobKind::LocalHttp),
            _ => None,
        }
    }
}

/// Failure executing one job. Always captured into the job's error string,
/// never propagated out of the poll/execute step.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("unsupported job kind: {0}")]
    UnsupportedKind(String),
    #[error("{0}")]
    InvalidPayload(String),
    #[error("local backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("local backend HTTP {status}: {body}")]
    LocalFailure { status: u16, body: Value },
}

/// Structured success payload recorded as the job's result.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutput {
    pub http_status: u16,
    pub data: Value,
}

/// Client for the local command surface.
pub struct LocalExecutor {
    base_url: String,
    http: reqwest::Client,
}

impl LocalExecutor {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Execute one job against the local backend.
    pub async fn execute(&self, job: &Job) -> Result<ExecutionOutput, ExecutionError> {
        let kind = JobKind::parse(&job.kind)
            .ok_or_else(|| ExecutionError::UnsupportedKind(job.kind.clone()))?;

        let empty = serde_json::Map::new();
        let payload = job.payload.as_object().unwrap_or(&empty);

        let request = match kind {
            JobKind::Power => {
                let ip = require_str(payload, "ip")?;
                let command = require_str(payload, "command")?.to_lowercase();
                if command != "on" && command != "off" {
                    return Err(ExecutionError::InvalidPayload(
                        "tv payload requires ip and command=on|off".to_string(),
                    ));
                }
                self.http
                    .get(format!("{}/api/tv/{}/{}", self.base_url, ip, command))
                    .query(&display_params(payload))
            }
            JobKind::Connectivity => {
                let ip = require_str(payload, "ip")?;
                self.http
                    .get(format!("{}/api/test/{}", self.base_url, ip))
                    .query(&display_params(payload))
            }
            JobKind::Probe => {
                let ip = require_str(payload, "ip")?;
                let display_id = int_field(payload, "display_id", 0);
                let timeout = payload
                    .get("timeout")
                    .and_then(Value::as_f64)
                    .unwrap_or(1.5);
                self.http
                    .get(format!("{}/api/probe/{}", self.base_url, ip))
                    .query(&[
                        ("display_id", display_id.to_string()),
                        ("timeout", timeout.to_string()),
                    ])
            }
            JobKind::ProtocolCommand => {
                // The local backend validates command/operation/args itself.
                self.http
                    .post(format!("{}/api/mdc/execute", self.base_url))
                    .json(&job.payload)
            }
            JobKind::LocalHttp => self.build_local_http(payload)?,
        };

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let data: Value =
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text));

        if status.is_client_error() || status.is_server_error() {
            return Err(ExecutionError::LocalFailure {
                status: status.as_u16(),
                body: data,
            });
        }

        Ok(ExecutionOutput {
            http_status: status.as_u16(),
            data,
        })
    }

    fn build_local_http(
        &self,
        payload: &serde_json::Map<String, Value>,
    ) -> Result<reqwest::RequestBuilder, ExecutionError> {
        let method_tag = payload
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .trim()
            .to_uppercase();
        let method = reqwest::Method::from_bytes(method_tag.as_bytes())
            .map_err(|_| ExecutionError::InvalidPayload(format!("invalid method: {method_tag}")))?;

        let path = payload
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or("/health")
            .trim()
            .to_string();
        if !path.starts_with('/') {
            return Err(ExecutionError::InvalidPayload(
                "local_http payload path must start with '/'".to_string(),
            ));
        }

        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));

        if let Some(params) = payload.get("params").and_then(Value::as_object) {
            let pairs: Vec<(String, String)> = params
                .iter()
                .map(|(k, v)| (k.clone(), query_value(v)))
                .collect();
            builder = builder.query(&pairs);
        }
        if let Some(body) = payload.get("json") {
            builder = builder.json(body);
        }

        Ok(builder)
    }
}

fn require_str<'a>(
    payload: &'a serde_json::Map<String, Value>,
    field: &str,
) -> Result<&'a str, ExecutionError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ExecutionError::InvalidPayload(format!("payload requires {field}")))
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn int_field(payload: &serde_json::Map<String, Value>, field: &str, default: i64) -> i64 {
    payload.get(field).and_then(Value::as_i64).unwrap_or(default)
}

/// Shared display addressing parameters for the tv/test kinds.
fn display_params(payload: &serde_json::Map<String, Value>) -> Vec<(String, String)> {
    let protocol = payload
        .get("protocol")
        .and_then(Value::as_str)
        .unwrap_or("AUTO");
    vec![
        ("display_id".to_string(), int_field(payload, "display_id", 0).to_string()),
        ("port".to_string(), int_field(payload, "port", 1515).to_string()),
        ("protocol".to_string(), protocol.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing_is_closed() {
        assert_eq!(JobKind::parse("tv"), Some(JobKind::Power));
        assert_eq!(JobKind::parse(" TEST "), Some(JobKind::Connectivity));
        assert_eq!(JobKind::parse("probe"), Some(JobKind::Probe));
        assert_eq!(JobKind::parse("mdc_execute"), Some(JobKind::ProtocolCommand));
        assert_eq!(JobKind::parse("local_http"), Some(JobKind::LocalHttp));
        assert_eq!(JobKind::parse("reboot"), None);
        assert_eq!(JobKind::parse(""), None);
    }

    #[test]
    fn test_display_params_defaults() {
        let payload = serde_json::Map::new();
        let params = display_params(&payload);
        assert!(params.contains(&("display_id".to_string(), "0".to_string())));
        assert!(params.contains(&("port".to_string(), "1515".to_string())));
        assert!(params.contains(&("protocol".to_string(), "AUTO".to_string())));
    }
}
