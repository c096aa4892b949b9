//! Envoy AI Gateway installer CLI entrypoint.
//!
//! This binary installs Envoy Gateway and the Envoy AI Gateway extension into
//! the current cluster, checks prerequisites, reports versions, and stages
//! upstream charts.

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use envoy_ai_installer::cli::{Cli, Command, InstallArgs, SyncArgs};
use envoy_ai_installer::cluster::{KUBECTL_TIMEOUT, Kubectl};
use envoy_ai_installer::command::{DEFAULT_COMMAND_TIMEOUT, SystemCommandExecutor};
use envoy_ai_installer::config::{Config, EnvOverrides, FileConfig};
use envoy_ai_installer::dirs::{BaseDirs, SystemBaseDirs, default_config_path, default_log_path};
use envoy_ai_installer::doctor::{DoctorTargets, run_doctor, write_report};
use envoy_ai_installer::error::{InstallerError, Result};
use envoy_ai_installer::helm::Helm;
use envoy_ai_installer::install::{InstallDeps, InstallSettings, run_install};
use envoy_ai_installer::logging;
use envoy_ai_installer::output::{InstallBanner, completion_message, write_line};
use envoy_ai_installer::retry::ThreadSleeper;
use envoy_ai_installer::stamp::sync_and_stamp;
use envoy_ai_installer::upstream::{GithubReleases, HttpFetcher, UreqTransport};
use envoy_ai_installer::version::collect_versions;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stdout);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, out: &mut dyn Write) -> Result<()> {
    let dirs = SystemBaseDirs;
    let level = logging::stderr_level(cli.quiet, cli.verbose);
    let config = load_config_and_logging(cli, &dirs, |path| Ok(logging::init(path, level)?))?;
    log::debug!(
        "resolved configuration: gateway namespace {}, ai namespace {}, registry {}, dry run {}",
        config.namespace_gateway,
        config.namespace_ai,
        config.chart_registry,
        config.dry_run
    );

    let helm_executor = SystemCommandExecutor::new(DEFAULT_COMMAND_TIMEOUT);
    let kubectl_executor = SystemCommandExecutor::new(KUBECTL_TIMEOUT);
    let helm = Helm::new(&helm_executor, config.dry_run);
    let kubectl = Kubectl::new(&kubectl_executor);

    let transport = UreqTransport::new(config.network.timeout);
    let sleeper = ThreadSleeper;
    let releases = GithubReleases::new(&transport, &sleeper, &config.github_api_url)
        .with_token(config.github_token.clone())
        .with_policy(config.network.retry);
    let fetcher = HttpFetcher::new(&transport, &sleeper).with_policy(config.network.retry);

    match &cli.command {
        Command::Install(args) => {
            let deps = InstallDeps {
                helm: &helm,
                kubectl: &kubectl,
                releases: &releases,
                fetcher: &fetcher,
            };
            install(args, &config, &deps, out)
        }
        Command::Version => {
            let report = collect_versions(&helm, &releases, &config.upstreams);
            write_line(out, report.display_text());
            Ok(())
        }
        Command::Doctor => {
            let report = run_doctor(
                &kubectl,
                &helm,
                DoctorTargets {
                    namespace_gateway: &config.namespace_gateway,
                    namespace_ai: &config.namespace_ai,
                },
            );
            write_report(&report, out);
            report.into_result().map(|_| ())
        }
        Command::Sync(args) => sync(args, &config, &releases, &fetcher, out),
    }
}

/// Resolve the configuration and install logging.
///
/// Logging is installed even when the configuration cannot be loaded, from
/// `--log-file` or the default location, so the failure reaches the log file.
fn load_config_and_logging(
    cli: &Cli,
    dirs: &dyn BaseDirs,
    init_logging: impl FnOnce(Option<&Utf8Path>) -> Result<()>,
) -> Result<Config> {
    match load_config(cli, dirs) {
        Ok(config) => {
            init_logging(log_file_path(config.log_file.clone(), dirs).as_deref())?;
            Ok(config)
        }
        Err(err) => {
            init_logging(log_file_path(cli.log_file.clone(), dirs).as_deref())?;
            Err(err)
        }
    }
}

fn log_file_path(configured: Option<Utf8PathBuf>, dirs: &dyn BaseDirs) -> Option<Utf8PathBuf> {
    configured
        .or_else(|| default_log_path(dirs).and_then(|path| Utf8PathBuf::from_path_buf(path).ok()))
}

fn load_config(cli: &Cli, dirs: &dyn BaseDirs) -> Result<Config> {
    let default_path =
        default_config_path(dirs).and_then(|path| Utf8PathBuf::from_path_buf(path).ok());
    let file = FileConfig::load(cli.config.as_deref(), default_path.as_deref())?;
    let env = EnvOverrides::from_process()?;
    Ok(Config::resolve(file, env, &cli.to_overrides())?)
}

fn install(
    args: &InstallArgs,
    config: &Config,
    deps: &InstallDeps<'_>,
    out: &mut dyn Write,
) -> Result<()> {
    let settings = InstallSettings::from_config(
        config,
        args.with_redis,
        args.stage_charts,
        args.server_dry_run,
    );
    let banner = InstallBanner {
        namespace_gateway: &settings.namespace_gateway,
        namespace_ai: &settings.namespace_ai,
        chart_registry: &settings.chart_registry,
        chart_version: settings.chart_version.as_deref(),
        dry_run: settings.dry_run,
        skip_clean: settings.skip_clean,
        with_redis: settings.with_redis,
        stage_charts: settings.stage_charts,
    };
    write_line(out, banner.display_text());
    write_line(out, "");

    let plan = run_install(&settings, deps, out)?;
    log::info!("{} install step(s) completed", plan.succeeded());
    write_line(
        out,
        completion_message(settings.dry_run, &settings.namespace_gateway),
    );
    Ok(())
}

fn sync(
    args: &SyncArgs,
    config: &Config,
    releases: &GithubReleases<'_>,
    fetcher: &HttpFetcher<'_>,
    out: &mut dyn Write,
) -> Result<()> {
    let dest: &Utf8Path = &args.dest;
    sync_and_stamp(
        &config.upstreams,
        dest,
        &config.github_web_url,
        releases,
        fetcher,
        out,
    )
    .map(|_| ())
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            log::error!(target: logging::FILE_ONLY_TARGET, "{err}");
            write_line(stderr, format!("error: {err}"));
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    struct FixedDirs(PathBuf);

    impl BaseDirs for FixedDirs {
        fn home_dir(&self) -> Option<PathBuf> {
            Some(self.0.clone())
        }

        fn installer_data_dir(&self) -> Option<PathBuf> {
            Some(self.0.join("data"))
        }
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("envoy-ai-installer").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn logging_is_installed_before_a_config_error_is_returned() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dirs = FixedDirs(dir.path().to_path_buf());
        let cli = parse(&[
            "--config",
            "/nonexistent/eaig/config.toml",
            "--log-file",
            "/var/tmp/eaig/installer.log",
            "doctor",
        ]);

        let mut initialised_with = None;
        let result = load_config_and_logging(&cli, &dirs, |path| {
            initialised_with = Some(path.map(Utf8Path::to_path_buf));
            Ok(())
        });

        assert!(matches!(result, Err(InstallerError::Config(_))));
        assert_eq!(
            initialised_with,
            Some(Some(Utf8PathBuf::from("/var/tmp/eaig/installer.log")))
        );
    }

    #[test]
    fn config_errors_without_a_log_flag_use_the_default_log_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dirs = FixedDirs(dir.path().to_path_buf());
        let cli = parse(&["--config", "/nonexistent/eaig/config.toml", "doctor"]);

        let mut initialised_with = None;
        let result = load_config_and_logging(&cli, &dirs, |path| {
            initialised_with = path.map(Utf8Path::to_path_buf);
            Ok(())
        });

        assert!(result.is_err());
        let expected = Utf8PathBuf::from_path_buf(dir.path().join("data/envoy-ai-installer.log"))
            .expect("utf-8 tempdir");
        assert_eq!(initialised_with, Some(expected));
    }

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[rstest]
    #[case::tool(
        InstallerError::ToolMissing { tool: "helm".to_owned() },
        "helm"
    )]
    #[case::unhealthy(InstallerError::Unhealthy { failed: 2 }, "2")]
    #[case::upstreams(InstallerError::UpstreamsFailed { failed: 1, total: 4 }, "1 of 4")]
    fn exit_code_for_run_result_prints_error_and_returns_one(
        #[case] err: InstallerError,
        #[case] expected: &str,
    ) {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.starts_with("error: "));
        assert!(stderr_text.contains(expected));
    }
}
