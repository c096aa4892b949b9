//! Error types for the Envoy AI Gateway installer CLI.
//!
//! This module defines the top-level error taxonomy surfaced to operators.
//! Upstream lookup and download failures have their own enums in
//! [`crate::upstream`]; they stay scoped to a single upstream and are only
//! folded into [`InstallerError`] as aggregate counts.

use crate::config::ConfigError;
use thiserror::Error;

/// Errors that can occur while installing or inspecting the gateway stack.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// A required external executable is not on `PATH`.
    #[error("required tool {tool} not found on PATH")]
    ToolMissing {
        /// Name of the missing executable.
        tool: String,
    },

    /// An external command did not finish within its time budget.
    #[error("{command} timed out after {timeout_secs} seconds")]
    CommandTimeout {
        /// The command line that was running.
        command: String,
        /// The timeout that elapsed.
        timeout_secs: u64,
    },

    /// The Kubernetes cluster could not be reached.
    #[error("kubernetes cluster unreachable: {reason}; check your kubeconfig")]
    ClusterUnreachable {
        /// Output of the failed connectivity probe.
        reason: String,
    },

    /// A package-manager operation failed outside an install step.
    #[error("helm {operation} failed: {message}")]
    Helm {
        /// The helm operation that failed (repo add, uninstall, ...).
        operation: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// Uninstalling a previous release failed for a reason other than the
    /// release being absent.
    #[error("cleanup of release {release} in {namespace} failed: {message}")]
    Cleanup {
        /// Release name.
        release: String,
        /// Namespace of the release.
        namespace: String,
        /// Description of the failure.
        message: String,
    },

    /// An install step failed; later steps were not attempted.
    #[error("install step {step} failed: {reason}")]
    StepFailed {
        /// Name of the step that failed.
        step: String,
        /// Description of the failure.
        reason: String,
    },

    /// One or more upstreams could not be resolved and fetched.
    #[error("upstream chart staging failed for {failed} of {total} upstream(s)")]
    UpstreamsFailed {
        /// Number of failed upstreams.
        failed: usize,
        /// Number of upstreams processed.
        total: usize,
    },

    /// One or more required health probes failed.
    #[error("system health check failed: {failed} required check(s) unhealthy")]
    Unhealthy {
        /// Number of required probes that were unhealthy.
        failed: usize,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The logging subscriber could not be installed.
    #[error("failed to initialise logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Test stub received an unexpected or mismatched command invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

/// Result type alias using [`InstallerError`].
pub type Result<T> = std::result::Result<T, InstallerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_missing_names_the_tool() {
        let err = InstallerError::ToolMissing {
            tool: "helm".to_owned(),
        };
        assert!(err.to_string().contains("helm"));
    }

    #[test]
    fn step_failed_includes_step_and_reason() {
        let err = InstallerError::StepFailed {
            step: "aieg-crd".to_owned(),
            reason: "chart not found".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aieg-crd"));
        assert!(msg.contains("chart not found"));
    }

    #[test]
    fn cleanup_error_includes_release_and_namespace() {
        let err = InstallerError::Cleanup {
            release: "eg".to_owned(),
            namespace: "envoy-gateway-system".to_owned(),
            message: "connection refused".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("eg"));
        assert!(msg.contains("envoy-gateway-system"));
    }

    #[test]
    fn upstreams_failed_reports_counts() {
        let err = InstallerError::UpstreamsFailed {
            failed: 1,
            total: 4,
        };
        assert!(err.to_string().contains("1 of 4"));
    }
}
