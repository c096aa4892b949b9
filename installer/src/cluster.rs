//! Read-only cluster probes through `kubectl`.

use crate::command::{CommandExecutor, failure_message};
use crate::error::{InstallerError, Result};
use std::time::Duration;

/// Name of the cluster client executable.
pub const KUBECTL: &str = "kubectl";

/// Time budget for a single `kubectl` probe.
pub const KUBECTL_TIMEOUT: Duration = Duration::from_secs(30);

/// Label selector identifying the optional Redis deployment.
pub const REDIS_SELECTOR: &str = "app=redis";

/// Thin wrapper over `kubectl` for the probes the installer needs.
pub struct Kubectl<'a> {
    executor: &'a dyn CommandExecutor,
}

impl<'a> Kubectl<'a> {
    /// Creates a wrapper running through `executor`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self { executor }
    }

    /// Returns the first line of `kubectl version --client`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::ToolMissing`] when kubectl is absent and
    /// [`InstallerError::StepFailed`] when it exits unsuccessfully.
    pub fn client_version(&self) -> Result<String> {
        let output = self.executor.run(KUBECTL, &["version", "--client"])?;
        if !output.status.success() {
            return Err(InstallerError::StepFailed {
                step: "kubectl version".to_owned(),
                reason: failure_message(&output),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_owned())
    }

    /// Checks that the API server answers `kubectl cluster-info`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::ClusterUnreachable`] when it does not.
    pub fn ensure_reachable(&self) -> Result<()> {
        let output = self.executor.run(KUBECTL, &["cluster-info"])?;
        if output.status.success() {
            Ok(())
        } else {
            Err(InstallerError::ClusterUnreachable {
                reason: failure_message(&output),
            })
        }
    }

    /// Returns whether `namespace` exists.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::ClusterUnreachable`] when kubectl fails for
    /// any reason other than the namespace being absent.
    pub fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let output = self.executor.run(KUBECTL, &["get", "namespace", namespace])?;
        if output.status.success() {
            return Ok(true);
        }
        let message = failure_message(&output);
        if message.contains("NotFound") || message.to_ascii_lowercase().contains("not found") {
            Ok(false)
        } else {
            Err(InstallerError::ClusterUnreachable { reason: message })
        }
    }

    /// Returns the name of the first pod in `namespace` matching `selector`.
    ///
    /// # Errors
    ///
    /// Propagates executor failures; a failing query yields `Ok(None)`.
    pub fn first_pod(&self, namespace: &str, selector: &str) -> Result<Option<String>> {
        let output = self.executor.run(
            KUBECTL,
            &[
                "get",
                "pod",
                "-n",
                namespace,
                "-l",
                selector,
                "-o",
                "jsonpath={.items[0].metadata.name}",
            ],
        )?;
        if !output.status.success() {
            log::debug!("pod query failed: {}", failure_message(&output));
            return Ok(None);
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        Ok(Some(name).filter(|pod| !pod.is_empty()))
    }
}
