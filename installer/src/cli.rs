//! CLI argument definitions for the Envoy AI Gateway installer.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use crate::config::{CliOverrides, split_values_list};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Install Envoy Gateway and the Envoy AI Gateway extension.
#[derive(Parser, Debug)]
#[command(name = "envoy-ai-installer")]
#[command(version, about)]
#[command(long_about = concat!(
    "Install Envoy Gateway and the Envoy AI Gateway extension into the current ",
    "Kubernetes cluster.\n\n",
    "The installer removes previous releases, then installs Envoy Gateway, the AI ",
    "Gateway CRDs, and the AI Gateway controller in order, optionally followed by ",
    "Redis for rate limiting. Charts can be staged from the latest upstream ",
    "releases first with --stage-charts.\n\n",
    "Settings are read from ~/.envoy-ai-installer/config.toml, then EAIG_* ",
    "environment variables, then these flags.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Preview an install without touching the cluster:\n",
    "    $ envoy-ai-installer --dry-run install\n\n",
    "  Install with extra values and Redis:\n",
    "    $ envoy-ai-installer install --values-extra ratelimit.yaml,tls.yaml --with-redis\n\n",
    "  Check prerequisites:\n",
    "    $ envoy-ai-installer doctor\n\n",
    "  Stage the latest upstream charts:\n",
    "    $ envoy-ai-installer sync --dest ./charts\n",
))]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file [default: ~/.envoy-ai-installer/config.toml].
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Describe every mutating helm call instead of running it.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Do not uninstall previous releases before installing.
    #[arg(long, global = true)]
    pub skip_clean: bool,

    /// Increase diagnostic output on stderr (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbose: u8,

    /// Only report errors on stderr.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Namespace for Envoy Gateway.
    #[arg(long, global = true, value_name = "NS")]
    pub namespace_gateway: Option<String>,

    /// Namespace for the AI Gateway and Redis.
    #[arg(long, global = true, value_name = "NS")]
    pub namespace_ai: Option<String>,

    /// Append diagnostics to this file [default: platform data directory].
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<Utf8PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Clean previous releases and install the gateway stack.
    Install(InstallArgs),

    /// Show installer, helm, and latest upstream versions.
    Version,

    /// Check prerequisites and cluster state.
    Doctor,

    /// Stage the latest chart of every tracked upstream.
    Sync(SyncArgs),
}

/// Arguments for the install command.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallArgs {
    /// Extra values files, comma separated, applied after the defaults.
    #[arg(long, value_name = "FILES", value_delimiter = ',')]
    pub values_extra: Vec<Utf8PathBuf>,

    /// Also install Redis for rate limiting.
    #[arg(long)]
    pub with_redis: bool,

    /// Chart registry to install from.
    #[arg(long, value_name = "URL")]
    pub chart_repo: Option<String>,

    /// Stage charts from the latest upstream releases before installing.
    #[arg(long)]
    pub stage_charts: bool,

    /// Pass --dry-run --debug to helm so the server renders without applying.
    #[arg(long)]
    pub server_dry_run: bool,
}

impl InstallArgs {
    /// Returns `--values-extra` entries trimmed, with blank entries dropped.
    ///
    /// Matches the handling of `values_extra` in the configuration file and
    /// `EAIG_VALUES_EXTRA`.
    #[must_use]
    pub fn values_files(&self) -> Vec<Utf8PathBuf> {
        self.values_extra
            .iter()
            .flat_map(|entry| split_values_list(entry.as_str()))
            .collect()
    }
}

/// Arguments for the sync command.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncArgs {
    /// Staging directory [default: ./charts].
    #[arg(long, value_name = "DIR", default_value = "charts")]
    pub dest: Utf8PathBuf,
}

impl Cli {
    /// Returns the install arguments when the install command was given.
    #[must_use]
    pub const fn install_args(&self) -> Option<&InstallArgs> {
        match &self.command {
            Command::Install(args) => Some(args),
            Command::Version | Command::Doctor | Command::Sync(_) => None,
        }
    }

    /// Collects the flags that override configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use clap::Parser;
    /// use envoy_ai_installer::cli::Cli;
    ///
    /// let cli = Cli::parse_from([
    ///     "envoy-ai-installer",
    ///     "--namespace-ai",
    ///     "ai",
    ///     "install",
    ///     "--values-extra",
    ///     "a.yaml,b.yaml",
    /// ]);
    /// let overrides = cli.to_overrides();
    /// assert_eq!(overrides.namespace_ai.as_deref(), Some("ai"));
    /// assert_eq!(overrides.values_extra.len(), 2);
    /// ```
    #[must_use]
    pub fn to_overrides(&self) -> CliOverrides {
        let install = self.install_args();
        CliOverrides {
            namespace_gateway: self.namespace_gateway.clone(),
            namespace_ai: self.namespace_ai.clone(),
            skip_clean: self.skip_clean,
            dry_run: self.dry_run,
            values_extra: install
                .map(InstallArgs::values_files)
                .unwrap_or_default(),
            chart_registry: install.and_then(|args| args.chart_repo.clone()),
            log_file: self.log_file.clone(),
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
