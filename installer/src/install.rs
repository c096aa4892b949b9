//! Install orchestration.
//!
//! An install is a cleanup pass followed by an ordered list of
//! [`InstallStep`]s. Steps run strictly in order; the first failure aborts the
//! rest, which stay [`StepState::Pending`]. Nothing is rolled back and nothing
//! is retried.
//!
//! With chart staging enabled, the upstream pipeline runs before any cluster
//! mutation and an upstream failure aborts the install outright.

use crate::cluster::Kubectl;
use crate::config::Config;
use crate::error::{InstallerError, Result};
use crate::helm::{Helm, HelmOutcome, InstallOptions, UninstallOutcome};
use crate::output::{outcome_line, step_heading, write_line};
use crate::upstream::fetch::{ArtifactFetcher, ContentKind};
use crate::upstream::lookup::ReleaseSource;
use crate::upstream::reference::{UPSTREAM_GATEWAY, UpstreamRef};
use crate::upstream::sync::{SyncPlan, SyncReport, sync_upstreams};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::io::Write;

/// Release name of Envoy Gateway.
pub const RELEASE_GATEWAY: &str = "eg";
/// Release name of the AI Gateway CRDs.
pub const RELEASE_AI_CRDS: &str = "aieg-crd";
/// Release name of the AI Gateway controller.
pub const RELEASE_AI: &str = "aieg";
/// Release name of the optional Redis deployment.
pub const RELEASE_REDIS: &str = "envoy-redis";

/// Envoy Gateway chart, relative to the registry.
pub const CHART_GATEWAY: &str = "gateway-helm";
/// AI Gateway CRD chart, relative to the registry.
pub const CHART_AI_CRDS: &str = "ai-gateway-crds-helm";
/// AI Gateway controller chart, relative to the registry.
pub const CHART_AI: &str = "ai-gateway-helm";

/// Envoy Gateway values published alongside the AI Gateway.
pub const OFFICIAL_GATEWAY_VALUES_URL: &str =
    "https://raw.githubusercontent.com/envoyproxy/ai-gateway/main/manifests/envoy-gateway-values.yaml";

/// Helm repository providing the Redis chart.
pub const BITNAMI_REPO: (&str, &str) = ("bitnami", "https://charts.bitnami.com/bitnami");
/// Redis chart reference.
pub const REDIS_CHART: &str = "bitnami/redis";

/// Lifecycle of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepState {
    /// Not attempted yet.
    Pending,
    /// In progress.
    Running,
    /// Completed, or planned in simulate mode.
    Succeeded,
    /// Failed with the given reason.
    Failed(String),
}

/// A repository command that must run before a step's install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoCommand {
    /// `helm repo add NAME URL --force-update`.
    Add {
        /// Repository alias.
        name: String,
        /// Repository URL.
        url: String,
    },
    /// `helm repo update`.
    Update,
}

/// One `helm upgrade --install` and its prerequisites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStep {
    /// Operator-facing label.
    pub label: &'static str,
    /// Release name.
    pub release: &'static str,
    /// Chart reference or local archive path.
    pub chart: String,
    /// Install parameters.
    pub options: InstallOptions,
    /// Upstream project whose staged archive may replace [`Self::chart`].
    pub upstream_project: Option<&'static str>,
    /// Repository commands to run first.
    pub repo_commands: Vec<RepoCommand>,
    /// Current state.
    pub state: StepState,
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} <- {} in {})",
            self.label, self.release, self.chart, self.options.namespace
        )
    }
}

/// Everything an install needs to know, resolved from configuration and
/// command-line flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSettings {
    /// Envoy Gateway namespace.
    pub namespace_gateway: String,
    /// AI Gateway namespace.
    pub namespace_ai: String,
    /// Skip the cleanup pass.
    pub skip_clean: bool,
    /// Describe mutating helm calls instead of running them.
    pub dry_run: bool,
    /// Pass `--dry-run --debug` to helm.
    pub server_dry_run: bool,
    /// Extra values files for the gateway and controller steps.
    pub values_extra: Vec<Utf8PathBuf>,
    /// Chart registry.
    pub chart_registry: String,
    /// Chart version pin.
    pub chart_version: Option<String>,
    /// Append the Redis step.
    pub with_redis: bool,
    /// Stage upstream charts before installing.
    pub stage_charts: bool,
    /// Upstreams to stage.
    pub upstreams: Vec<UpstreamRef>,
    /// Web base for source-archive fallbacks.
    pub web_base: String,
    /// Where the official gateway values file is fetched from.
    pub gateway_values_url: String,
}

impl InstallSettings {
    /// Derive install settings from `config` and the install-only flags.
    #[must_use]
    pub fn from_config(
        config: &Config,
        with_redis: bool,
        stage_charts: bool,
        server_dry_run: bool,
    ) -> Self {
        Self {
            namespace_gateway: config.namespace_gateway.clone(),
            namespace_ai: config.namespace_ai.clone(),
            skip_clean: config.skip_clean,
            dry_run: config.dry_run,
            server_dry_run,
            values_extra: config.values_extra.clone(),
            chart_registry: config.chart_registry.clone(),
            chart_version: config.chart_version.clone(),
            with_redis,
            stage_charts,
            upstreams: config.upstreams.clone(),
            web_base: config.github_web_url.clone(),
            gateway_values_url: OFFICIAL_GATEWAY_VALUES_URL.to_owned(),
        }
    }
}

/// Ordered cleanup targets and install steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    /// `(release, namespace)` pairs to uninstall first.
    pub cleanup: Vec<(&'static str, String)>,
    /// Install steps in execution order.
    pub steps: Vec<InstallStep>,
}

impl InstallPlan {
    /// Build the plan. `gateway_values` is the fetched official values file,
    /// if it could be retrieved.
    #[must_use]
    pub fn build(settings: &InstallSettings, gateway_values: Option<Utf8PathBuf>) -> Self {
        let cleanup = if settings.skip_clean {
            Vec::new()
        } else {
            vec![
                (RELEASE_GATEWAY, settings.namespace_gateway.clone()),
                (RELEASE_AI_CRDS, settings.namespace_ai.clone()),
                (RELEASE_AI, settings.namespace_ai.clone()),
            ]
        };

        let registry = settings.chart_registry.trim_end_matches('/');
        let pinned = |namespace: &str, values: Vec<Utf8PathBuf>| InstallOptions {
            namespace: namespace.to_owned(),
            version: settings.chart_version.clone(),
            values,
            server_dry_run: settings.server_dry_run,
        };

        let mut gateway_values_files: Vec<Utf8PathBuf> = gateway_values.into_iter().collect();
        gateway_values_files.extend(settings.values_extra.iter().cloned());

        let mut steps = vec![
            InstallStep {
                label: "Install Envoy Gateway",
                release: RELEASE_GATEWAY,
                chart: format!("{registry}/{CHART_GATEWAY}"),
                options: pinned(&settings.namespace_gateway, gateway_values_files),
                upstream_project: Some(UPSTREAM_GATEWAY),
                repo_commands: Vec::new(),
                state: StepState::Pending,
            },
            InstallStep {
                label: "Install Envoy AI Gateway CRDs",
                release: RELEASE_AI_CRDS,
                chart: format!("{registry}/{CHART_AI_CRDS}"),
                options: pinned(&settings.namespace_ai, Vec::new()),
                upstream_project: Some(CHART_AI_CRDS),
                repo_commands: Vec::new(),
                state: StepState::Pending,
            },
            InstallStep {
                label: "Install Envoy AI Gateway controller",
                release: RELEASE_AI,
                chart: format!("{registry}/{CHART_AI}"),
                options: pinned(&settings.namespace_ai, settings.values_extra.clone()),
                upstream_project: Some(CHART_AI),
                repo_commands: Vec::new(),
                state: StepState::Pending,
            },
        ];

        if settings.with_redis {
            let (name, url) = BITNAMI_REPO;
            steps.push(InstallStep {
                label: "Install Redis for rate limiting",
                release: RELEASE_REDIS,
                chart: REDIS_CHART.to_owned(),
                options: InstallOptions {
                    namespace: settings.namespace_ai.clone(),
                    version: None,
                    values: Vec::new(),
                    server_dry_run: settings.server_dry_run,
                },
                upstream_project: None,
                repo_commands: vec![
                    RepoCommand::Add {
                        name: name.to_owned(),
                        url: url.to_owned(),
                    },
                    RepoCommand::Update,
                ],
                state: StepState::Pending,
            });
        }

        Self { cleanup, steps }
    }

    /// Point steps at locally staged chart archives.
    ///
    /// Only assets named as charts are substituted; binary tarballs and
    /// source-archive fallbacks leave the registry reference in place. Local
    /// archives are installed without a version pin.
    pub fn apply_staged(&mut self, report: &SyncReport) {
        for step in &mut self.steps {
            let Some(project) = step.upstream_project else {
                continue;
            };
            let staged = report
                .outcomes()
                .iter()
                .find(|outcome| outcome.upstream.project() == project)
                .and_then(|outcome| outcome.result.as_ref().ok());
            match staged {
                Some(chart) if chart.artifact.is_packaged_chart() => {
                    step.chart = chart.fetch.path.display().to_string();
                    step.options.version = None;
                    log::info!("{}: using staged chart {}", step.release, step.chart);
                }
                Some(chart) => log::info!(
                    "{}: staged {} is not a packaged chart; keeping {}",
                    step.release,
                    chart.artifact.filename,
                    step.chart
                ),
                None => {}
            }
        }
    }

    /// Number of steps that succeeded.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.state == StepState::Succeeded)
            .count()
    }
}

/// Uninstall previous releases.
///
/// Releases that do not exist are reported and skipped.
///
/// # Errors
///
/// Returns [`InstallerError::Cleanup`] for any other uninstall failure; later
/// releases are not attempted.
pub fn run_cleanup(
    cleanup: &[(&'static str, String)],
    helm: &Helm<'_>,
    out: &mut dyn Write,
) -> Result<Vec<UninstallOutcome>> {
    let mut outcomes = Vec::with_capacity(cleanup.len());
    for (release, namespace) in cleanup {
        let outcome = helm.uninstall(release, namespace)?;
        match &outcome {
            UninstallOutcome::Removed => write_line(out, format!("  removed {release}")),
            UninstallOutcome::NotFound => {
                write_line(out, format!("  {release} was not previously installed"));
            }
            UninstallOutcome::Planned(description) => write_line(out, format!("  {description}")),
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

/// Run the cleanup pass and every step in order.
///
/// # Errors
///
/// Returns the cleanup error, or [`InstallerError::StepFailed`] for the first
/// step that fails.
pub fn execute_plan(plan: &mut InstallPlan, helm: &Helm<'_>, out: &mut dyn Write) -> Result<()> {
    let total = plan.steps.len() + usize::from(!plan.cleanup.is_empty());
    let mut index = 0;

    if !plan.cleanup.is_empty() {
        index += 1;
        write_line(out, step_heading(index, total, "Clean previous installations"));
        run_cleanup(&plan.cleanup, helm, out)?;
    }

    for step in &mut plan.steps {
        index += 1;
        write_line(out, step_heading(index, total, step.label));
        step.state = StepState::Running;
        log::info!("running step {step}");

        match run_step(step, helm) {
            Ok(outcome) => {
                step.state = StepState::Succeeded;
                write_line(out, outcome_line(&outcome));
            }
            Err(err) => {
                let reason = err.to_string();
                log::error!("step {} failed: {reason}", step.label);
                step.state = StepState::Failed(reason.clone());
                return Err(InstallerError::StepFailed {
                    step: step.label.to_owned(),
                    reason,
                });
            }
        }
    }
    Ok(())
}

fn run_step(step: &InstallStep, helm: &Helm<'_>) -> Result<HelmOutcome> {
    for command in &step.repo_commands {
        let outcome = match command {
            RepoCommand::Add { name, url } => helm.repo_add(name, url)?,
            RepoCommand::Update => helm.repo_update()?,
        };
        if let HelmOutcome::Planned(description) = outcome {
            log::debug!("planned {description}");
        }
    }
    helm.upgrade_install(step.release, &step.chart, &step.options)
}

/// Collaborators of a full install run.
pub struct InstallDeps<'a> {
    /// Package manager.
    pub helm: &'a Helm<'a>,
    /// Cluster client.
    pub kubectl: &'a Kubectl<'a>,
    /// Release lookups for chart staging.
    pub releases: &'a dyn ReleaseSource,
    /// Downloads for staging and the official values file.
    pub fetcher: &'a dyn ArtifactFetcher,
}

/// Pre-flight, optional staging, values retrieval, cleanup, and install.
///
/// Returns the executed plan so callers can inspect step states.
///
/// # Errors
///
/// Returns [`InstallerError::ToolMissing`] when helm is absent,
/// [`InstallerError::ClusterUnreachable`] when the cluster cannot be reached
/// outside simulate mode, [`InstallerError::UpstreamsFailed`] when staging
/// fails, and cleanup or step errors from [`execute_plan`].
pub fn run_install(
    settings: &InstallSettings,
    deps: &InstallDeps<'_>,
    out: &mut dyn Write,
) -> Result<InstallPlan> {
    let helm_version = deps.helm.version()?;
    log::info!("using helm {helm_version}");
    if settings.dry_run {
        log::info!("simulate mode; skipping cluster reachability check");
    } else {
        deps.kubectl.ensure_reachable()?;
    }

    let workdir = tempfile::Builder::new()
        .prefix("envoy-ai-installer-")
        .tempdir()?;
    let workdir_path = Utf8Path::from_path(workdir.path()).ok_or_else(|| {
        InstallerError::Io(std::io::Error::other("temporary directory is not valid UTF-8"))
    })?;

    let staged = if settings.stage_charts {
        Some(stage_charts(settings, deps, workdir_path, out)?)
    } else {
        None
    };

    let gateway_values = fetch_gateway_values(settings, deps.fetcher, workdir_path);
    let mut plan = InstallPlan::build(settings, gateway_values);
    if let Some(report) = &staged {
        plan.apply_staged(report);
    }

    execute_plan(&mut plan, deps.helm, out)?;
    Ok(plan)
}

fn stage_charts(
    settings: &InstallSettings,
    deps: &InstallDeps<'_>,
    workdir: &Utf8Path,
    out: &mut dyn Write,
) -> Result<SyncReport> {
    let dest = workdir.join("charts");
    std::fs::create_dir_all(&dest)?;
    write_line(out, format!("Staging upstream charts into {dest}"));

    let plan = SyncPlan {
        upstreams: &settings.upstreams,
        dest: dest.as_std_path(),
        web_base: &settings.web_base,
    };
    let report = sync_upstreams(&plan, deps.releases, deps.fetcher);
    for outcome in report.outcomes() {
        write_line(out, format!("  {outcome}"));
    }

    if report.is_success() {
        Ok(report)
    } else {
        Err(InstallerError::UpstreamsFailed {
            failed: report.failures(),
            total: report.outcomes().len(),
        })
    }
}

fn fetch_gateway_values(
    settings: &InstallSettings,
    fetcher: &dyn ArtifactFetcher,
    workdir: &Utf8Path,
) -> Option<Utf8PathBuf> {
    let dest = workdir.join("envoy-gateway-values.yaml");
    match fetcher.fetch(&settings.gateway_values_url, dest.as_std_path(), ContentKind::Any) {
        Ok(_) => Some(dest),
        Err(err) => {
            log::warn!("could not fetch official Envoy Gateway values; continuing without: {err}");
            None
        }
    }
}

#[cfg(test)]
#[path = "install_tests.rs"]
mod tests;
