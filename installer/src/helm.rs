//! Package-manager invocations.
//!
//! [`Helm`] turns install intents into `helm` command lines and runs them
//! through a [`CommandExecutor`]. In simulate mode every mutating call is
//! replaced by a `[DRY-RUN] helm ...` description; read-only calls such as
//! `helm version` still run.

use crate::command::{CommandExecutor, command_line, failure_message};
use crate::error::{InstallerError, Result};
use camino::Utf8PathBuf;
use std::process::Output;

/// Name of the package-manager executable.
pub const HELM: &str = "helm";

/// Prefix of simulated command descriptions.
pub const DRY_RUN_PREFIX: &str = "[DRY-RUN]";

/// What happened to a mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelmOutcome {
    /// The command ran and succeeded.
    Applied,
    /// Simulate mode: the command was described, not run.
    Planned(String),
}

/// What happened to an uninstall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallOutcome {
    /// The release existed and was removed.
    Removed,
    /// The release did not exist.
    NotFound,
    /// Simulate mode: the command was described, not run.
    Planned(String),
}

/// Parameters of `helm upgrade --install`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Target namespace; created if missing.
    pub namespace: String,
    /// Chart version pin.
    pub version: Option<String>,
    /// Values files, applied in order.
    pub values: Vec<Utf8PathBuf>,
    /// Ask helm itself to render without applying (`--dry-run --debug`).
    pub server_dry_run: bool,
}

/// Build the argument list for `helm upgrade --install`.
///
/// # Examples
///
/// ```
/// use camino::Utf8PathBuf;
/// use envoy_ai_installer::helm::{InstallOptions, upgrade_install_args};
///
/// let options = InstallOptions {
///     namespace: "envoy-gateway-system".to_owned(),
///     version: Some("v0.0.0-latest".to_owned()),
///     values: vec![Utf8PathBuf::from("extra.yaml")],
///     server_dry_run: false,
/// };
/// assert_eq!(
///     upgrade_install_args("eg", "oci://docker.io/envoyproxy/gateway-helm", &options).join(" "),
///     "upgrade --install eg oci://docker.io/envoyproxy/gateway-helm -n envoy-gateway-system \
///      --create-namespace --version v0.0.0-latest -f extra.yaml"
/// );
/// ```
#[must_use]
pub fn upgrade_install_args(release: &str, chart: &str, options: &InstallOptions) -> Vec<String> {
    let mut args: Vec<String> = [
        "upgrade",
        "--install",
        release,
        chart,
        "-n",
        options.namespace.as_str(),
        "--create-namespace",
    ]
    .iter()
    .map(|arg| (*arg).to_owned())
    .collect();

    if let Some(version) = &options.version {
        args.push("--version".to_owned());
        args.push(version.clone());
    }
    for values in &options.values {
        args.push("-f".to_owned());
        args.push(values.to_string());
    }
    if options.server_dry_run {
        args.push("--dry-run".to_owned());
        args.push("--debug".to_owned());
    }
    args
}

/// Marker helm prints when uninstalling a release that does not exist.
const RELEASE_NOT_FOUND: &str = "release: not found";

/// Returns `true` when helm's error output says the release does not exist.
///
/// Other "not found" failures (a missing kubeconfig, an unknown context) do
/// not match.
///
/// ```
/// use envoy_ai_installer::helm::is_release_not_found;
///
/// assert!(is_release_not_found(
///     "Error: uninstall: Release not loaded: eg: release: not found"
/// ));
/// assert!(!is_release_not_found("Error: kubeconfig file not found"));
/// ```
#[must_use]
pub fn is_release_not_found(message: &str) -> bool {
    message.to_ascii_lowercase().contains(RELEASE_NOT_FOUND)
}

/// Runs `helm` through an executor, honouring simulate mode.
pub struct Helm<'a> {
    executor: &'a dyn CommandExecutor,
    dry_run: bool,
}

impl<'a> Helm<'a> {
    /// Creates a wrapper; with `dry_run` set, mutating calls are only
    /// described.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, dry_run: bool) -> Self {
        Self { executor, dry_run }
    }

    /// `helm repo add NAME URL --force-update`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Helm`] when helm exits unsuccessfully.
    pub fn repo_add(&self, name: &str, url: &str) -> Result<HelmOutcome> {
        self.mutate("repo add", &["repo", "add", name, url, "--force-update"])
    }

    /// `helm repo update`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Helm`] when helm exits unsuccessfully.
    pub fn repo_update(&self) -> Result<HelmOutcome> {
        self.mutate("repo update", &["repo", "update"])
    }

    /// `helm upgrade --install RELEASE CHART ...`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Helm`] when helm exits unsuccessfully.
    pub fn upgrade_install(
        &self,
        release: &str,
        chart: &str,
        options: &InstallOptions,
    ) -> Result<HelmOutcome> {
        let args = upgrade_install_args(release, chart, options);
        let borrowed: Vec<&str> = args.iter().map(String::as_str).collect();
        self.mutate("upgrade --install", &borrowed)
    }

    /// `helm uninstall RELEASE -n NAMESPACE`.
    ///
    /// A missing release is reported as [`UninstallOutcome::NotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Cleanup`] for any other failure.
    pub fn uninstall(&self, release: &str, namespace: &str) -> Result<UninstallOutcome> {
        let args = ["uninstall", release, "-n", namespace];
        if self.dry_run {
            return Ok(UninstallOutcome::Planned(describe(&args)));
        }

        let output = self.executor.run(HELM, &args)?;
        if output.status.success() {
            log::info!("uninstalled {release} from {namespace}");
            return Ok(UninstallOutcome::Removed);
        }

        let message = failure_message(&output);
        if is_release_not_found(&message) {
            log::info!("{release} was not installed in {namespace}");
            Ok(UninstallOutcome::NotFound)
        } else {
            Err(InstallerError::Cleanup {
                release: release.to_owned(),
                namespace: namespace.to_owned(),
                message,
            })
        }
    }

    /// `helm version --short`; runs even in simulate mode.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::ToolMissing`] when helm is absent and
    /// [`InstallerError::Helm`] when it exits unsuccessfully.
    pub fn version(&self) -> Result<String> {
        let output = self.executor.run(HELM, &["version", "--short"])?;
        let checked = check("version", &output)?;
        Ok(String::from_utf8_lossy(&checked.stdout).trim().to_owned())
    }

    fn mutate(&self, operation: &'static str, args: &[&str]) -> Result<HelmOutcome> {
        if self.dry_run {
            return Ok(HelmOutcome::Planned(describe(args)));
        }
        let output = self.executor.run(HELM, args)?;
        check(operation, &output)?;
        log::debug!("{} succeeded", command_line(HELM, args));
        Ok(HelmOutcome::Applied)
    }
}

fn describe(args: &[&str]) -> String {
    let description = format!("{DRY_RUN_PREFIX} {}", command_line(HELM, args));
    log::info!("{description}");
    description
}

fn check<'o>(operation: &'static str, output: &'o Output) -> Result<&'o Output> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(InstallerError::Helm {
            operation,
            message: failure_message(output),
        })
    }
}
