//! System health checks for the `doctor` command.
//!
//! Every probe runs regardless of earlier failures so the operator sees the
//! complete picture in one pass.

use crate::cluster::{Kubectl, REDIS_SELECTOR};
use crate::error::InstallerError;
use crate::helm::Helm;
use crate::output::write_line;
use std::fmt;
use std::io::Write;

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    /// The prerequisite is present; carries a detail such as a version.
    Healthy(String),
    /// The prerequisite is missing or broken; carries the reason.
    Unhealthy(String),
    /// The resource does not exist yet, which is acceptable; carries a note
    /// such as "will be created during installation".
    Absent(String),
}

impl ProbeStatus {
    /// Returns `true` unless the probe is [`ProbeStatus::Unhealthy`].
    #[must_use]
    pub const fn is_acceptable(&self) -> bool {
        !matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy(detail) => write!(f, "OK       {detail}"),
            Self::Unhealthy(reason) => write!(f, "FAILED   {reason}"),
            Self::Absent(note) => write!(f, "ABSENT   {note}"),
        }
    }
}

/// A named probe and its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// Operator-facing probe name.
    pub name: String,
    /// Whether the probe counts toward overall health.
    pub required: bool,
    /// The outcome.
    pub status: ProbeStatus,
}

impl Probe {
    fn required(name: impl Into<String>, status: ProbeStatus) -> Self {
        Self {
            name: name.into(),
            required: true,
            status,
        }
    }

    fn optional(name: impl Into<String>, status: ProbeStatus) -> Self {
        Self {
            name: name.into(),
            required: false,
            status,
        }
    }
}

/// Outcome of every probe, in the order they ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// All probes.
    pub probes: Vec<Probe>,
}

impl HealthReport {
    /// Number of required probes that are unhealthy.
    #[must_use]
    pub fn failed_required(&self) -> usize {
        self.probes
            .iter()
            .filter(|probe| probe.required && !probe.status.is_acceptable())
            .count()
    }

    /// Returns `true` when every required probe is acceptable.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.failed_required() == 0
    }

    /// Converts the verdict into a result for exit-code mapping.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Unhealthy`] when a required probe failed.
    pub fn into_result(self) -> crate::error::Result<Self> {
        match self.failed_required() {
            0 => Ok(self),
            failed => Err(InstallerError::Unhealthy { failed }),
        }
    }
}

/// Namespaces the doctor inspects.
#[derive(Debug, Clone, Copy)]
pub struct DoctorTargets<'a> {
    /// Envoy Gateway namespace.
    pub namespace_gateway: &'a str,
    /// AI Gateway namespace (also searched for Redis).
    pub namespace_ai: &'a str,
}

/// Run every probe.
#[must_use]
pub fn run_doctor(kubectl: &Kubectl<'_>, helm: &Helm<'_>, targets: DoctorTargets<'_>) -> HealthReport {
    let mut probes = vec![
        Probe::required("kubectl", tool_status(kubectl.client_version())),
        Probe::required("helm", tool_status(helm.version())),
        Probe::required(
            "kubernetes cluster",
            match kubectl.ensure_reachable() {
                Ok(()) => ProbeStatus::Healthy("connected".to_owned()),
                Err(err) => ProbeStatus::Unhealthy(err.to_string()),
            },
        ),
    ];

    for namespace in [targets.namespace_gateway, targets.namespace_ai] {
        let status = match kubectl.namespace_exists(namespace) {
            Ok(true) => ProbeStatus::Healthy("exists".to_owned()),
            Ok(false) => ProbeStatus::Absent("will be created during installation".to_owned()),
            Err(err) => ProbeStatus::Unhealthy(err.to_string()),
        };
        probes.push(Probe::required(format!("namespace {namespace}"), status));
    }

    let redis = match kubectl.first_pod(targets.namespace_ai, REDIS_SELECTOR) {
        Ok(Some(pod)) => ProbeStatus::Healthy(format!("pod {pod}")),
        Ok(None) => ProbeStatus::Absent("optional; install with --with-redis".to_owned()),
        Err(err) => ProbeStatus::Absent(format!("not detected ({err})")),
    };
    probes.push(Probe::optional("redis", redis));

    for probe in &probes {
        if probe.status.is_acceptable() {
            log::debug!("probe {}: {}", probe.name, probe.status);
        } else {
            log::warn!("probe {}: {}", probe.name, probe.status);
        }
    }
    HealthReport { probes }
}

fn tool_status(result: crate::error::Result<String>) -> ProbeStatus {
    match result {
        Ok(version) => ProbeStatus::Healthy(version),
        Err(err) => ProbeStatus::Unhealthy(err.to_string()),
    }
}

/// Write the report as an aligned table followed by a verdict line.
pub fn write_report(report: &HealthReport, out: &mut dyn Write) {
    write_line(out, "System health check");
    write_line(out, "");
    for probe in &report.probes {
        let suffix = if probe.required { "" } else { " (optional)" };
        write_line(
            out,
            format!("  {:<40} {}{suffix}", probe.name, probe.status),
        );
    }
    write_line(out, "");
    if report.is_healthy() {
        write_line(out, "All checks passed; ready to install.");
    } else {
        write_line(
            out,
            format!(
                "{} required check(s) failed; address the issues above.",
                report.failed_required()
            ),
        );
    }
}
