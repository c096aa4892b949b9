//! The `version` report: build metadata, the local helm, and the latest
//! release of every configured upstream.
//!
//! Lookup failures are shown inline; the report itself never fails.

use crate::helm::Helm;
use crate::upstream::lookup::ReleaseSource;
use crate::upstream::reference::UpstreamRef;
use std::fmt;

/// Build metadata baked into the binary.
///
/// The commit and build time come from the `EAIG_GIT_COMMIT` and
/// `EAIG_BUILD_TIME` environment variables at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    /// Crate version.
    pub version: &'static str,
    /// Source commit, or `unknown`.
    pub git_commit: &'static str,
    /// Build timestamp, or `unknown`.
    pub build_time: &'static str,
}

impl BuildInfo {
    /// Metadata of the running binary.
    #[must_use]
    pub const fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            git_commit: or_unknown(option_env!("EAIG_GIT_COMMIT")),
            build_time: or_unknown(option_env!("EAIG_BUILD_TIME")),
        }
    }
}

const fn or_unknown(value: Option<&'static str>) -> &'static str {
    match value {
        Some(text) => text,
        None => "unknown",
    }
}

/// Latest known release of one upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamVersion {
    /// The latest tag.
    Latest(String),
    /// Why the lookup failed.
    Unavailable(String),
}

impl fmt::Display for UpstreamVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest(tag) => f.write_str(tag),
            Self::Unavailable(reason) => write!(f, "unavailable ({reason})"),
        }
    }
}

/// Everything `version` prints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionReport {
    /// This binary.
    pub build: BuildInfo,
    /// `helm version --short`, or why it could not be read.
    pub helm: UpstreamVersion,
    /// Upstreams in configuration order.
    pub upstreams: Vec<(UpstreamRef, UpstreamVersion)>,
}

impl VersionReport {
    /// Format the report for display.
    #[must_use]
    pub fn display_text(&self) -> String {
        let mut lines = vec![
            format!("envoy-ai-installer {}", self.build.version),
            format!("  Git commit: {}", self.build.git_commit),
            format!("  Built:      {}", self.build.build_time),
            format!("  Helm:       {}", self.helm),
        ];
        if !self.upstreams.is_empty() {
            lines.push(String::new());
            lines.push("Upstream releases:".to_owned());
            lines.extend(
                self.upstreams
                    .iter()
                    .map(|(upstream, version)| format!("  {upstream}: {version}")),
            );
        }
        lines.join("\n")
    }
}

/// Gather the report.
#[must_use]
pub fn collect_versions(
    helm: &Helm<'_>,
    releases: &dyn ReleaseSource,
    upstreams: &[UpstreamRef],
) -> VersionReport {
    let helm_version = match helm.version() {
        Ok(version) => UpstreamVersion::Latest(version),
        Err(err) => UpstreamVersion::Unavailable(err.to_string()),
    };

    let upstream_versions = upstreams
        .iter()
        .map(|upstream| {
            let version = match releases.latest_release(upstream) {
                Ok(release) => UpstreamVersion::Latest(release.tag),
                Err(err) => {
                    log::warn!("version lookup for {upstream} failed: {err}");
                    UpstreamVersion::Unavailable(err.to_string())
                }
            };
            (upstream.clone(), version)
        })
        .collect();

    VersionReport {
        build: BuildInfo::current(),
        helm: helm_version,
        upstreams: upstream_versions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InstallerError;
    use crate::test_utils::{ExpectedCall, StubExecutor, output_with_stdout};
    use crate::upstream::lookup::{LookupError, MockReleaseSource};
    use crate::upstream::release::ReleaseInfo;
    use mockall::predicate::eq;

    #[test]
    fn build_info_falls_back_to_unknown() {
        let info = BuildInfo::current();
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert!(!info.git_commit.is_empty());
    }

    #[test]
    fn failed_lookups_are_reported_inline() {
        let gateway = UpstreamRef::new("envoyproxy", "gateway");
        let ai = UpstreamRef::new("envoyproxy", "ai-gateway");
        let executor = StubExecutor::new(vec![ExpectedCall::new(
            "helm",
            &["version", "--short"],
            Ok(output_with_stdout("v3.15.2\n")),
        )]);
        let mut releases = MockReleaseSource::new();
        releases
            .expect_latest_release()
            .with(eq(gateway.clone()))
            .returning(|_| {
                Ok(ReleaseInfo {
                    tag: "v1.4.0".to_owned(),
                    assets: Vec::new(),
                })
            });
        releases
            .expect_latest_release()
            .with(eq(ai.clone()))
            .returning(|upstream| {
                Err(LookupError::NotFound {
                    upstream: upstream.to_string(),
                })
            });

        let report = collect_versions(
            &Helm::new(&executor, false),
            &releases,
            &[gateway, ai],
        );
        let text = report.display_text();

        assert!(text.contains("Helm:       v3.15.2"));
        assert!(text.contains("envoyproxy/gateway: v1.4.0"));
        assert!(text.contains("envoyproxy/ai-gateway: unavailable ("));
    }

    #[test]
    fn missing_helm_does_not_abort_the_report() {
        let executor = StubExecutor::new(vec![ExpectedCall::new(
            "helm",
            &["version", "--short"],
            Err(InstallerError::ToolMissing {
                tool: "helm".to_owned(),
            }),
        )]);
        let releases = MockReleaseSource::new();

        let report = collect_versions(&Helm::new(&executor, false), &releases, &[]);

        assert!(matches!(report.helm, UpstreamVersion::Unavailable(_)));
        assert!(!report.display_text().contains("Upstream releases"));
    }
}
