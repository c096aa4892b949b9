//! Layered configuration.
//!
//! Settings are resolved once, in `main`, with the precedence
//! defaults < TOML file < environment < command-line flags, and the resulting
//! [`Config`] is passed down explicitly. Nothing below this module reads the
//! process environment.

use crate::retry::{RetryPolicy, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};
use crate::upstream::lookup::DEFAULT_API_BASE;
use crate::upstream::reference::{UpstreamRef, default_upstreams};
use crate::upstream::resolver::DEFAULT_WEB_BASE;
use crate::upstream::transport::DEFAULT_REQUEST_TIMEOUT;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Default namespace for Envoy Gateway.
pub const DEFAULT_NAMESPACE_GATEWAY: &str = "envoy-gateway-system";

/// Default namespace for the AI Gateway releases.
pub const DEFAULT_NAMESPACE_AI: &str = "envoy-ai-gateway-system";

/// Default OCI registry holding the Envoy charts.
pub const DEFAULT_CHART_REGISTRY: &str = "oci://docker.io/envoyproxy";

/// Default chart version pin for the Envoy charts.
pub const DEFAULT_CHART_VERSION: &str = "v0.0.0-latest";

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "EAIG_";

/// Errors arising while assembling the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("configuration file {path} does not exist")]
    MissingFile {
        /// The requested path.
        path: Utf8PathBuf,
    },

    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        /// The file being read.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for the expected schema.
    #[error("invalid configuration file {path}: {message}")]
    Parse {
        /// The file being parsed.
        path: Utf8PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// An environment override could not be interpreted.
    #[error("invalid value {value:?} for environment variable {name}")]
    InvalidEnv {
        /// The variable name.
        name: String,
        /// The rejected value.
        value: String,
    },

    /// A resolved setting is unusable.
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        /// The setting name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Delay schedule selector as written in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Doubling delays.
    Exponential,
    /// Constant delays.
    Fixed,
}

/// `[network]` table of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkFile {
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Attempts per lookup or download, including the first.
    pub max_attempts: Option<u32>,
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: Option<u64>,
    /// Upper bound for any delay, in milliseconds.
    pub max_backoff_ms: Option<u64>,
    /// Delay schedule.
    pub backoff: Option<BackoffKind>,
}

/// Contents of the optional TOML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Namespace for Envoy Gateway.
    pub namespace_gateway: Option<String>,
    /// Namespace for the AI Gateway releases.
    pub namespace_ai: Option<String>,
    /// Skip the cleanup pass.
    pub skip_clean: Option<bool>,
    /// Simulate mutating package-manager calls.
    pub dry_run: Option<bool>,
    /// Additional values files.
    pub values_extra: Option<Vec<Utf8PathBuf>>,
    /// Registry the Envoy charts are installed from.
    pub chart_registry: Option<String>,
    /// Version pin for the Envoy charts; empty disables pinning.
    pub chart_version: Option<String>,
    /// Release-hosting API base URL.
    pub github_api_url: Option<String>,
    /// Release-hosting web base URL.
    pub github_web_url: Option<String>,
    /// Upstream projects to track.
    pub upstreams: Option<Vec<UpstreamRef>>,
    /// Network tuning.
    pub network: NetworkFile,
    /// Log file location.
    pub log_file: Option<Utf8PathBuf>,
}

impl FileConfig {
    /// Parse a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document is invalid.
    pub fn parse(text: &str, path: &Utf8Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Load the configuration file.
    ///
    /// An `explicit` path must exist. Without one, `default_path` is used if
    /// it exists and an empty configuration otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFile`] for a missing explicit path, and
    /// read or parse errors for an unusable file.
    pub fn load(
        explicit: Option<&Utf8Path>,
        default_path: Option<&Utf8Path>,
    ) -> Result<Self, ConfigError> {
        let path = match (explicit, default_path) {
            (Some(path), _) => {
                if !path.exists() {
                    return Err(ConfigError::MissingFile {
                        path: path.to_path_buf(),
                    });
                }
                path
            }
            (None, Some(path)) if path.exists() => path,
            (None, _) => return Ok(Self::default()),
        };

        log::debug!("loading configuration from {path}");
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }
}

/// Environment overrides, captured once at start-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// `EAIG_NAMESPACE_GATEWAY`.
    pub namespace_gateway: Option<String>,
    /// `EAIG_NAMESPACE_AI`.
    pub namespace_ai: Option<String>,
    /// `EAIG_SKIP_CLEAN`.
    pub skip_clean: Option<bool>,
    /// `EAIG_DRY_RUN`.
    pub dry_run: Option<bool>,
    /// `EAIG_VALUES_EXTRA`, comma separated.
    pub values_extra: Option<Vec<Utf8PathBuf>>,
    /// `EAIG_GITHUB_TOKEN`, falling back to `GITHUB_TOKEN`.
    pub github_token: Option<String>,
}

impl EnvOverrides {
    /// Capture overrides from the current process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for an unparseable boolean.
    pub fn from_process() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Capture overrides through `lookup`.
    ///
    /// Blank values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for an unparseable boolean.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}")).filter(|value| !value.trim().is_empty())
        };
        let read_bool = |suffix: &str| {
            read(suffix)
                .map(|value| {
                    parse_bool(&value).ok_or_else(|| ConfigError::InvalidEnv {
                        name: format!("{ENV_PREFIX}{suffix}"),
                        value,
                    })
                })
                .transpose()
        };

        Ok(Self {
            namespace_gateway: read("NAMESPACE_GATEWAY").map(|ns| ns.trim().to_owned()),
            namespace_ai: read("NAMESPACE_AI").map(|ns| ns.trim().to_owned()),
            skip_clean: read_bool("SKIP_CLEAN")?,
            dry_run: read_bool("DRY_RUN")?,
            values_extra: read("VALUES_EXTRA").map(|list| split_values_list(&list)),
            github_token: read("GITHUB_TOKEN")
                .or_else(|| lookup("GITHUB_TOKEN").filter(|value| !value.trim().is_empty())),
        })
    }
}

/// Command-line overrides; flags that were not given are `None` or `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    /// `--namespace-gateway`.
    pub namespace_gateway: Option<String>,
    /// `--namespace-ai`.
    pub namespace_ai: Option<String>,
    /// `--skip-clean`.
    pub skip_clean: bool,
    /// `--dry-run`.
    pub dry_run: bool,
    /// `--values-extra`.
    pub values_extra: Vec<Utf8PathBuf>,
    /// `--chart-repo`.
    pub chart_registry: Option<String>,
    /// `--log-file`.
    pub log_file: Option<Utf8PathBuf>,
}

/// Network behaviour shared by release lookups and downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkSettings {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry policy.
    pub retry: RetryPolicy,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl NetworkSettings {
    fn from_file(file: &NetworkFile) -> Result<Self, ConfigError> {
        let timeout = file
            .timeout_secs
            .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs);
        if timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "network.timeout_secs",
                reason: "must be greater than zero".to_owned(),
            });
        }

        let attempts = file.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "network.max_attempts",
                reason: "must be at least 1".to_owned(),
            });
        }

        let initial = file
            .initial_backoff_ms
            .map_or(DEFAULT_INITIAL_DELAY, Duration::from_millis);
        let max = file
            .max_backoff_ms
            .map_or(DEFAULT_MAX_DELAY, Duration::from_millis);
        if max < initial {
            return Err(ConfigError::Invalid {
                field: "network.max_backoff_ms",
                reason: "must not be smaller than network.initial_backoff_ms".to_owned(),
            });
        }

        let retry = match file.backoff.unwrap_or(BackoffKind::Exponential) {
            BackoffKind::Exponential => RetryPolicy::exponential(attempts, initial, max),
            BackoffKind::Fixed => RetryPolicy::fixed(attempts, initial),
        };
        Ok(Self { timeout, retry })
    }
}

/// Fully resolved installer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Namespace for Envoy Gateway.
    pub namespace_gateway: String,
    /// Namespace for the AI Gateway releases.
    pub namespace_ai: String,
    /// Skip the cleanup pass.
    pub skip_clean: bool,
    /// Simulate mutating package-manager calls.
    pub dry_run: bool,
    /// Additional values files, applied to the gateway and controller steps.
    pub values_extra: Vec<Utf8PathBuf>,
    /// Registry the Envoy charts are installed from.
    pub chart_registry: String,
    /// Version pin for the Envoy charts.
    pub chart_version: Option<String>,
    /// Release-hosting API base URL.
    pub github_api_url: String,
    /// Release-hosting web base URL.
    pub github_web_url: String,
    /// API token for release lookups.
    pub github_token: Option<String>,
    /// Upstream projects to track.
    pub upstreams: Vec<UpstreamRef>,
    /// Network tuning.
    pub network: NetworkSettings,
    /// Log file location; `None` selects the platform default.
    pub log_file: Option<Utf8PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace_gateway: DEFAULT_NAMESPACE_GATEWAY.to_owned(),
            namespace_ai: DEFAULT_NAMESPACE_AI.to_owned(),
            skip_clean: false,
            dry_run: false,
            values_extra: Vec::new(),
            chart_registry: DEFAULT_CHART_REGISTRY.to_owned(),
            chart_version: Some(DEFAULT_CHART_VERSION.to_owned()),
            github_api_url: DEFAULT_API_BASE.to_owned(),
            github_web_url: DEFAULT_WEB_BASE.to_owned(),
            github_token: None,
            upstreams: default_upstreams(),
            network: NetworkSettings::default(),
            log_file: None,
        }
    }
}

impl Config {
    /// Merge the three override layers over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a resolved setting is unusable.
    ///
    /// # Examples
    ///
    /// ```
    /// use envoy_ai_installer::config::{CliOverrides, Config, EnvOverrides, FileConfig};
    ///
    /// let file = FileConfig {
    ///     namespace_ai: Some("from-file".to_owned()),
    ///     ..FileConfig::default()
    /// };
    /// let env = EnvOverrides {
    ///     namespace_ai: Some("from-env".to_owned()),
    ///     ..EnvOverrides::default()
    /// };
    /// let config = Config::resolve(file, env, &CliOverrides::default())?;
    /// assert_eq!(config.namespace_ai, "from-env");
    /// # Ok::<(), envoy_ai_installer::config::ConfigError>(())
    /// ```
    pub fn resolve(
        file: FileConfig,
        env: EnvOverrides,
        cli: &CliOverrides,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let network = NetworkSettings::from_file(&file.network)?;

        let values_extra = if cli.values_extra.is_empty() {
            env.values_extra
                .or(file.values_extra)
                .unwrap_or_default()
        } else {
            cli.values_extra.clone()
        };

        let chart_version = match file.chart_version {
            Some(version) if version.trim().is_empty() => None,
            Some(version) => Some(version),
            None => defaults.chart_version,
        };

        let config = Self {
            namespace_gateway: cli
                .namespace_gateway
                .clone()
                .or(env.namespace_gateway)
                .or(file.namespace_gateway)
                .unwrap_or(defaults.namespace_gateway),
            namespace_ai: cli
                .namespace_ai
                .clone()
                .or(env.namespace_ai)
                .or(file.namespace_ai)
                .unwrap_or(defaults.namespace_ai),
            skip_clean: cli.skip_clean
                || env.skip_clean.or(file.skip_clean).unwrap_or(false),
            dry_run: cli.dry_run || env.dry_run.or(file.dry_run).unwrap_or(false),
            values_extra,
            chart_registry: cli
                .chart_registry
                .clone()
                .or(file.chart_registry)
                .unwrap_or(defaults.chart_registry),
            chart_version,
            github_api_url: file.github_api_url.unwrap_or(defaults.github_api_url),
            github_web_url: file.github_web_url.unwrap_or(defaults.github_web_url),
            github_token: env.github_token,
            upstreams: file.upstreams.unwrap_or(defaults.upstreams),
            network,
            log_file: cli.log_file.clone().or(file.log_file),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, namespace) in [
            ("namespace_gateway", &self.namespace_gateway),
            ("namespace_ai", &self.namespace_ai),
        ] {
            if namespace.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "namespace must not be empty".to_owned(),
                });
            }
        }
        if self.chart_registry.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "chart_registry",
                reason: "registry must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

/// Split a comma-separated values-file list, dropping blank entries.
///
/// # Examples
///
/// ```
/// use envoy_ai_installer::config::split_values_list;
///
/// let files = split_values_list(" a.yaml, ,b.yaml ");
/// assert_eq!(files, vec!["a.yaml", "b.yaml"]);
/// ```
#[must_use]
pub fn split_values_list(list: &str) -> Vec<Utf8PathBuf> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(Utf8PathBuf::from)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
