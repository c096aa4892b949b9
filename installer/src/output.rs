//! Output formatting for the installer CLI.
//!
//! Operator-facing progress goes through [`write_line`], which ignores write
//! failures so that a closed pipe never aborts an install half way through.
//! Diagnostics go through the `log` facade instead.

use crate::helm::HelmOutcome;
use camino::Utf8Path;
use std::fmt::Display;
use std::io::Write;

/// Write `message` followed by a newline, ignoring failures.
pub fn write_line(out: &mut dyn Write, message: impl Display) {
    if writeln!(out, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}

/// Configuration summary printed before an install starts.
///
/// # Example
///
/// ```
/// use envoy_ai_installer::output::InstallBanner;
///
/// let banner = InstallBanner {
///     namespace_gateway: "envoy-gateway-system",
///     namespace_ai: "envoy-ai-gateway-system",
///     chart_registry: "oci://docker.io/envoyproxy",
///     chart_version: Some("v0.0.0-latest"),
///     dry_run: true,
///     skip_clean: false,
///     with_redis: false,
///     stage_charts: false,
/// };
///
/// let text = banner.display_text();
/// assert!(text.contains("Dry run:             true"));
/// assert!(text.contains("envoy-ai-gateway-system"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct InstallBanner<'a> {
    /// Envoy Gateway namespace.
    pub namespace_gateway: &'a str,
    /// AI Gateway namespace.
    pub namespace_ai: &'a str,
    /// Chart registry.
    pub chart_registry: &'a str,
    /// Chart version pin.
    pub chart_version: Option<&'a str>,
    /// Simulate mode.
    pub dry_run: bool,
    /// Cleanup disabled.
    pub skip_clean: bool,
    /// Redis step enabled.
    pub with_redis: bool,
    /// Upstream charts staged locally.
    pub stage_charts: bool,
}

impl InstallBanner<'_> {
    /// Format the banner for display.
    #[must_use]
    pub fn display_text(&self) -> String {
        [
            "Envoy AI Gateway installer".to_owned(),
            format!("  Namespace (gateway): {}", self.namespace_gateway),
            format!("  Namespace (AI):      {}", self.namespace_ai),
            format!("  Chart registry:      {}", self.chart_registry),
            format!(
                "  Chart version:       {}",
                self.chart_version.unwrap_or("(unpinned)")
            ),
            format!("  Dry run:             {}", self.dry_run),
            format!("  Skip clean:          {}", self.skip_clean),
            format!("  With Redis:          {}", self.with_redis),
            format!("  Stage charts:        {}", self.stage_charts),
        ]
        .join("\n")
    }
}

/// Progress line for a numbered step, e.g. `Step 2/4: Install Envoy Gateway`.
#[must_use]
pub fn step_heading(index: usize, total: usize, label: &str) -> String {
    format!("Step {index}/{total}: {label}")
}

/// Describe a helm outcome for the operator.
#[must_use]
pub fn outcome_line(outcome: &HelmOutcome) -> String {
    match outcome {
        HelmOutcome::Applied => "  done".to_owned(),
        HelmOutcome::Planned(description) => format!("  {description}"),
    }
}

/// Closing message after an install.
#[must_use]
pub fn completion_message(dry_run: bool, namespace_gateway: &str) -> String {
    if dry_run {
        "Dry run complete; no changes were made. Re-run without --dry-run to install.".to_owned()
    } else {
        format!("Installation complete. Verify with: kubectl get pods -n {namespace_gateway}")
    }
}

/// Closing message after a successful sync.
#[must_use]
pub fn sync_summary(staged: usize, total: usize, dest: &Utf8Path) -> String {
    let noun = if total == 1 { "upstream" } else { "upstreams" };
    format!("Staged {staged} of {total} {noun} into {dest}")
}
