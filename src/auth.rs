//! Two-tier credential checks.
//!
//! Cloud callers (enqueue, status, list) authenticate with an API key;
//! agents (heartbeat, poll, result) authenticate with a shared secret. Each
//! class is checked independently before any business logic runs. A check
//! has three outcomes rather than two: when enforcement is on and the secret
//! was never configured, the class is misconfigured and every call fails
//! closed — authorization is never inferred from the absence of a header.

/// Which credential class gates an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialClass {
    Cloud,
    Agent,
}

impl CredentialClass {
    /// Header the caller supplies the credential in.
    pub fn header(&self) -> &'static str {
        match self {
            CredentialClass::Cloud => "x-api-key",
            CredentialClass::Agent => "x-agent-token",
        }
    }
}

/// Result of evaluating a credential against its configured secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Authorized,
    Unauthorized,
    /// Enforcement is on but the secret is unset in configuration.
    Misconfigured,
}

/// Evaluate one credential class.
///
/// If the secret is configured, the supplied value must match exactly —
/// even when enforcement is off. If it is unconfigured, the call passes
/// only when enforcement is off.
pub fn check_credential(
    configured: Option<&str>,
    supplied: Option<&str>,
    required: bool,
) -> AuthOutcome {
    match configured {
        None if required => AuthOutcome::Misconfigured,
        None => AuthOutcome::Authorized,
        Some(secret) => {
            if supplied == Some(secret) {
                AuthOutcome::Authorized
            } else {
                AuthOutcome::Unauthorized
            }
        }
    }
}
