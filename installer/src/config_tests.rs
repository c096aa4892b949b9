//! Unit tests for configuration layering.

use super::*;
use crate::retry::Backoff;
use rstest::rstest;
use tempfile::TempDir;

fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).expect("utf-8 temp path")
}

#[test]
fn defaults_match_the_published_layout() {
    let config = Config::resolve(
        FileConfig::default(),
        EnvOverrides::default(),
        &CliOverrides::default(),
    )
    .expect("defaults are valid");

    assert_eq!(config.namespace_gateway, "envoy-gateway-system");
    assert_eq!(config.namespace_ai, "envoy-ai-gateway-system");
    assert_eq!(config.chart_registry, "oci://docker.io/envoyproxy");
    assert_eq!(config.chart_version.as_deref(), Some("v0.0.0-latest"));
    assert_eq!(config.upstreams.len(), 4);
    assert!(!config.dry_run);
    assert!(!config.skip_clean);
    assert_eq!(config.network.retry, RetryPolicy::default());
}

#[test]
fn cli_beats_env_beats_file() {
    let file = FileConfig {
        namespace_gateway: Some("file-gw".to_owned()),
        namespace_ai: Some("file-ai".to_owned()),
        values_extra: Some(vec![Utf8PathBuf::from("file.yaml")]),
        ..FileConfig::default()
    };
    let env = EnvOverrides {
        namespace_gateway: Some("env-gw".to_owned()),
        namespace_ai: Some("env-ai".to_owned()),
        values_extra: Some(vec![Utf8PathBuf::from("env.yaml")]),
        ..EnvOverrides::default()
    };
    let cli = CliOverrides {
        namespace_gateway: Some("cli-gw".to_owned()),
        ..CliOverrides::default()
    };

    let config = Config::resolve(file, env, &cli).expect("valid");

    assert_eq!(config.namespace_gateway, "cli-gw");
    assert_eq!(config.namespace_ai, "env-ai");
    assert_eq!(config.values_extra, vec![Utf8PathBuf::from("env.yaml")]);
}

#[test]
fn cli_flags_can_only_enable_booleans() {
    let file = FileConfig {
        dry_run: Some(true),
        ..FileConfig::default()
    };
    let env = EnvOverrides {
        skip_clean: Some(true),
        ..EnvOverrides::default()
    };

    let config = Config::resolve(file, env, &CliOverrides::default()).expect("valid");

    assert!(config.dry_run);
    assert!(config.skip_clean);
}

#[test]
fn blank_chart_version_disables_pinning() {
    let file = FileConfig {
        chart_version: Some(String::new()),
        ..FileConfig::default()
    };

    let config =
        Config::resolve(file, EnvOverrides::default(), &CliOverrides::default()).expect("valid");

    assert!(config.chart_version.is_none());
}

#[test]
fn empty_namespace_is_rejected() {
    let cli = CliOverrides {
        namespace_ai: Some("  ".to_owned()),
        ..CliOverrides::default()
    };

    let err = Config::resolve(FileConfig::default(), EnvOverrides::default(), &cli)
        .expect_err("blank namespace");

    assert!(matches!(err, ConfigError::Invalid { field: "namespace_ai", .. }));
}

#[test]
fn file_parses_every_documented_key() {
    let text = r#"
namespace_gateway = "gw"
namespace_ai = "ai"
skip_clean = true
dry_run = false
values_extra = ["one.yaml", "two.yaml"]
chart_registry = "oci://registry.example/envoy"
chart_version = "v1.2.3"
github_api_url = "https://ghe.example/api/v3"
github_web_url = "https://ghe.example"
log_file = "/var/log/eaig.log"

[[upstreams]]
owner = "acme"
project = "widget"

[network]
timeout_secs = 5
max_attempts = 4
initial_backoff_ms = 200
max_backoff_ms = 800
backoff = "fixed"
"#;

    let file = FileConfig::parse(text, Utf8Path::new("config.toml")).expect("valid file");
    let config =
        Config::resolve(file, EnvOverrides::default(), &CliOverrides::default()).expect("valid");

    assert_eq!(config.upstreams, vec![UpstreamRef::new("acme", "widget")]);
    assert_eq!(config.chart_version.as_deref(), Some("v1.2.3"));
    assert_eq!(config.network.timeout, Duration::from_secs(5));
    assert_eq!(config.network.retry.max_attempts(), 4);
    assert_eq!(config.network.retry.backoff(), Backoff::Fixed);
    assert_eq!(config.network.retry.delay_after(3), Duration::from_millis(200));
    assert_eq!(config.log_file, Some(Utf8PathBuf::from("/var/log/eaig.log")));
}

#[rstest]
#[case::top_level("verbose = true")]
#[case::network("[network]\nretries = 2")]
#[case::upstream("[[upstreams]]\nowner = \"a\"\nproject = \"b\"\nurl = \"x\"")]
fn unknown_keys_are_rejected(#[case] text: &str) {
    let err = FileConfig::parse(text, Utf8Path::new("config.toml")).expect_err("unknown key");
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[rstest]
#[case::zero_attempts("[network]\nmax_attempts = 0", "network.max_attempts")]
#[case::zero_timeout("[network]\ntimeout_secs = 0", "network.timeout_secs")]
#[case::inverted_backoff(
    "[network]\ninitial_backoff_ms = 500\nmax_backoff_ms = 100",
    "network.max_backoff_ms"
)]
fn unusable_network_settings_are_rejected(#[case] text: &str, #[case] expected: &str) {
    let file = FileConfig::parse(text, Utf8Path::new("config.toml")).expect("parses");
    let err = Config::resolve(file, EnvOverrides::default(), &CliOverrides::default())
        .expect_err("invalid network settings");
    assert!(matches!(err, ConfigError::Invalid { field, .. } if field == expected));
}

#[test]
fn missing_default_file_yields_empty_config() {
    let dir = TempDir::new().expect("temp dir");
    let absent = utf8(&dir.path().join("config.toml"));

    let file = FileConfig::load(None, Some(&absent)).expect("absent default is fine");

    assert_eq!(file, FileConfig::default());
}

#[test]
fn missing_explicit_file_is_an_error() {
    let dir = TempDir::new().expect("temp dir");
    let absent = utf8(&dir.path().join("custom.toml"));

    let err = FileConfig::load(Some(&absent), None).expect_err("explicit file must exist");

    assert!(matches!(err, ConfigError::MissingFile { .. }));
}

#[test]
fn explicit_file_wins_over_default() {
    let dir = TempDir::new().expect("temp dir");
    let explicit = utf8(&dir.path().join("custom.toml"));
    let default = utf8(&dir.path().join("config.toml"));
    std::fs::write(&explicit, "namespace_ai = \"custom\"").expect("write");
    std::fs::write(&default, "namespace_ai = \"default\"").expect("write");

    let file = FileConfig::load(Some(&explicit), Some(&default)).expect("loads");

    assert_eq!(file.namespace_ai.as_deref(), Some("custom"));
}

#[test]
fn environment_is_captured_from_the_process() {
    temp_env::with_vars(
        [
            ("EAIG_NAMESPACE_GATEWAY", Some("env-gw")),
            ("EAIG_DRY_RUN", Some("TRUE")),
            ("EAIG_SKIP_CLEAN", Some("0")),
            ("EAIG_VALUES_EXTRA", Some("a.yaml, b.yaml")),
            ("EAIG_GITHUB_TOKEN", None),
            ("GITHUB_TOKEN", Some("fallback-token")),
        ],
        || {
            let env = EnvOverrides::from_process().expect("valid environment");
            assert_eq!(env.namespace_gateway.as_deref(), Some("env-gw"));
            assert_eq!(env.dry_run, Some(true));
            assert_eq!(env.skip_clean, Some(false));
            assert_eq!(
                env.values_extra,
                Some(vec![Utf8PathBuf::from("a.yaml"), Utf8PathBuf::from("b.yaml")])
            );
            assert_eq!(env.github_token.as_deref(), Some("fallback-token"));
        },
    );
}

#[test]
fn prefixed_token_wins_over_generic_token() {
    temp_env::with_vars(
        [
            ("EAIG_GITHUB_TOKEN", Some("scoped")),
            ("GITHUB_TOKEN", Some("generic")),
        ],
        || {
            let env = EnvOverrides::from_process().expect("valid environment");
            assert_eq!(env.github_token.as_deref(), Some("scoped"));
        },
    );
}

#[test]
fn malformed_boolean_is_reported() {
    temp_env::with_var("EAIG_SKIP_CLEAN", Some("maybe"), || {
        let err = EnvOverrides::from_process().expect_err("invalid boolean");
        assert!(matches!(
            err,
            ConfigError::InvalidEnv { ref name, ref value }
                if name == "EAIG_SKIP_CLEAN" && value == "maybe"
        ));
    });
}

#[test]
fn blank_variables_are_ignored() {
    let env = EnvOverrides::from_lookup(|name| {
        (name == "EAIG_NAMESPACE_AI").then(|| "   ".to_owned())
    })
    .expect("valid");
    assert!(env.namespace_ai.is_none());
}
