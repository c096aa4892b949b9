//! Chart archive selection for a resolved release.
//!
//! The resolver is pure: it never touches the network. The first asset whose
//! name contains a chart keyword wins; otherwise the source archive for the
//! tag is synthesised from the configured owner and project, never from
//! anything embedded in the release payload.

use crate::upstream::reference::UpstreamRef;
use crate::upstream::release::ReleaseInfo;
use thiserror::Error;

/// Case-insensitive substrings that mark an asset as a chart archive.
pub const CHART_KEYWORDS: [&str; 4] = ["helm", "chart", ".tgz", "tar.gz"];

/// Case-insensitive substrings that name an asset as a packaged chart.
///
/// Narrower than [`CHART_KEYWORDS`]: a bare `.tgz` or `tar.gz` asset may be a
/// binary tarball rather than a chart.
pub const PACKAGED_CHART_KEYWORDS: [&str; 2] = ["helm", "chart"];

/// Public GitHub web endpoint used for source-archive URLs.
pub const DEFAULT_WEB_BASE: &str = "https://github.com";

/// Where a resolved URL came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    /// A release asset matched a chart keyword.
    Asset {
        /// Name of the matching asset.
        name: String,
    },
    /// No asset matched; the tag's source archive is used instead.
    SourceArchive,
}

/// The single download chosen for an upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    /// URL to download.
    pub url: String,
    /// Local file name, `{project}-{tag}.{ext}`.
    pub filename: String,
    /// Provenance of [`Self::url`].
    pub source: ArtifactSource,
}

impl ResolvedArtifact {
    /// Returns `true` when the artefact is a packaged chart rather than a
    /// source snapshot.
    #[must_use]
    pub const fn is_chart_asset(&self) -> bool {
        matches!(self.source, ArtifactSource::Asset { .. })
    }

    /// Returns `true` when the artefact is a release asset whose name marks
    /// it as a chart, so it can be handed to the package manager directly.
    #[must_use]
    pub fn is_packaged_chart(&self) -> bool {
        match &self.source {
            ArtifactSource::Asset { name } => {
                let lower = name.to_lowercase();
                PACKAGED_CHART_KEYWORDS
                    .iter()
                    .any(|keyword| lower.contains(keyword))
            }
            ArtifactSource::SourceArchive => false,
        }
    }
}

/// Errors arising from artefact resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The release has no tag, so neither a filename nor a fallback URL can
    /// be derived.
    #[error("release of {upstream} has no tag; cannot resolve a chart archive")]
    NoAssetAndNoTag {
        /// The upstream being resolved.
        upstream: String,
    },
}

/// Pick the download URL and local filename for `release`.
///
/// # Errors
///
/// Returns [`ResolveError::NoAssetAndNoTag`] if the release tag is empty.
///
/// # Examples
///
/// ```
/// use envoy_ai_installer::upstream::UpstreamRef;
/// use envoy_ai_installer::upstream::release::{AssetRef, ReleaseInfo};
/// use envoy_ai_installer::upstream::resolver::{resolve_artifact, DEFAULT_WEB_BASE};
///
/// let upstream = UpstreamRef::new("acme", "widget");
/// let release = ReleaseInfo {
///     tag: "v2.3.1".to_owned(),
///     assets: vec![AssetRef::new("widget-v2.3.1.tgz", "https://x/widget.tgz")],
/// };
/// let artifact = resolve_artifact(&release, &upstream, DEFAULT_WEB_BASE)?;
/// assert_eq!(artifact.url, "https://x/widget.tgz");
/// assert_eq!(artifact.filename, "widget-v2.3.1.tgz");
/// # Ok::<(), envoy_ai_installer::upstream::resolver::ResolveError>(())
/// ```
pub fn resolve_artifact(
    release: &ReleaseInfo,
    upstream: &UpstreamRef,
    web_base: &str,
) -> Result<ResolvedArtifact, ResolveError> {
    let tag = release.tag.trim();
    if tag.is_empty() {
        return Err(ResolveError::NoAssetAndNoTag {
            upstream: upstream.to_string(),
        });
    }

    let (url, source) = match release.assets.iter().find(|asset| is_chart_name(&asset.name)) {
        Some(asset) => (
            asset.download_url.clone(),
            ArtifactSource::Asset {
                name: asset.name.clone(),
            },
        ),
        None => (
            source_archive_url(web_base, upstream, tag),
            ArtifactSource::SourceArchive,
        ),
    };

    let filename = artifact_filename(upstream.project(), tag, &url);
    Ok(ResolvedArtifact {
        url,
        filename,
        source,
    })
}

/// Returns `true` if `name` contains any chart keyword, ignoring case.
#[must_use]
pub fn is_chart_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    CHART_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Build the source-archive URL for `tag` under the configured repository.
#[must_use]
pub fn source_archive_url(web_base: &str, upstream: &UpstreamRef, tag: &str) -> String {
    format!(
        "{}/{}/{}/archive/refs/tags/{tag}.tar.gz",
        web_base.trim_end_matches('/'),
        upstream.owner(),
        upstream.project()
    )
}

/// Derive `{project}-{tag}.{ext}`; `ext` follows a `.tar.gz` URL suffix and is
/// `tgz` otherwise.
#[must_use]
pub fn artifact_filename(project: &str, tag: &str, url: &str) -> String {
    let extension = if url.ends_with(".tar.gz") {
        "tar.gz"
    } else {
        "tgz"
    };
    format!("{project}-{tag}.{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::release::AssetRef;
    use rstest::{fixture, rstest};

    #[fixture]
    fn widget() -> UpstreamRef {
        UpstreamRef::new("acme", "widget")
    }

    fn release(tag: &str, assets: Vec<AssetRef>) -> ReleaseInfo {
        ReleaseInfo {
            tag: tag.to_owned(),
            assets,
        }
    }

    #[rstest]
    fn matching_asset_is_selected(widget: UpstreamRef) {
        let release = release(
            "v2.3.1",
            vec![AssetRef::new("widget-v2.3.1.tgz", "https://x/widget.tgz")],
        );

        let artifact = resolve_artifact(&release, &widget, DEFAULT_WEB_BASE).expect("resolves");

        assert_eq!(artifact.url, "https://x/widget.tgz");
        assert_eq!(artifact.filename, "widget-v2.3.1.tgz");
        assert!(artifact.is_chart_asset());
    }

    #[rstest]
    #[case::helm_chart("widget-helm-v2.3.1.tgz", true)]
    #[case::chart_keyword("Widget-Chart.tar.gz", true)]
    #[case::binary_tarball("widget_linux_amd64.tar.gz", false)]
    #[case::bare_tgz("widget-v2.3.1.tgz", false)]
    fn only_chart_named_assets_are_packaged_charts(
        widget: UpstreamRef,
        #[case] asset: &str,
        #[case] expected: bool,
    ) {
        let release = release("v2.3.1", vec![AssetRef::new(asset, "https://x/asset")]);

        let artifact = resolve_artifact(&release, &widget, DEFAULT_WEB_BASE).expect("resolves");

        assert!(artifact.is_chart_asset());
        assert_eq!(artifact.is_packaged_chart(), expected);
    }

    #[rstest]
    fn source_archive_is_never_a_packaged_chart(widget: UpstreamRef) {
        let artifact =
            resolve_artifact(&release("v2.3.1", Vec::new()), &widget, DEFAULT_WEB_BASE)
                .expect("resolves");

        assert!(!artifact.is_packaged_chart());
    }

    #[rstest]
    fn empty_asset_list_falls_back_to_source_archive(widget: UpstreamRef) {
        let artifact =
            resolve_artifact(&release("v2.3.1", Vec::new()), &widget, DEFAULT_WEB_BASE)
                .expect("resolves");

        assert_eq!(
            artifact.url,
            "https://github.com/acme/widget/archive/refs/tags/v2.3.1.tar.gz"
        );
        assert_eq!(artifact.filename, "widget-v2.3.1.tar.gz");
        assert_eq!(artifact.source, ArtifactSource::SourceArchive);
    }

    #[rstest]
    #[case::lower("widget-chart.zip")]
    #[case::upper("WIDGET-CHART.zip")]
    #[case::mixed("Widget-Chart-Bundle")]
    fn chart_keyword_wins_regardless_of_case(widget: UpstreamRef, #[case] name: &str) {
        let release = release(
            "v1",
            vec![
                AssetRef::new("checksums.txt", "https://x/checksums.txt"),
                AssetRef::new(name, "https://x/chart-asset"),
            ],
        );

        let artifact = resolve_artifact(&release, &widget, DEFAULT_WEB_BASE).expect("resolves");

        assert_eq!(artifact.url, "https://x/chart-asset");
        assert!(artifact.is_chart_asset());
    }

    #[rstest]
    fn first_match_in_host_order_wins(widget: UpstreamRef) {
        let release = release(
            "v1",
            vec![
                AssetRef::new("widget-helm.tgz", "https://x/first.tgz"),
                AssetRef::new("widget-chart.tgz", "https://x/second.tgz"),
            ],
        );

        let artifact = resolve_artifact(&release, &widget, DEFAULT_WEB_BASE).expect("resolves");

        assert_eq!(artifact.url, "https://x/first.tgz");
        assert_eq!(
            artifact.source,
            ArtifactSource::Asset {
                name: "widget-helm.tgz".to_owned()
            }
        );
    }

    #[rstest]
    fn non_matching_assets_fall_back_to_configured_ref(widget: UpstreamRef) {
        let release = release(
            "v9",
            vec![
                AssetRef::new("fork-binary-linux-amd64", "https://github.com/fork/other/bin"),
                AssetRef::new("checksums.txt", "https://github.com/fork/other/sums"),
            ],
        );

        let artifact = resolve_artifact(&release, &widget, DEFAULT_WEB_BASE).expect("resolves");

        assert_eq!(
            artifact.url,
            "https://github.com/acme/widget/archive/refs/tags/v9.tar.gz"
        );
        assert!(!artifact.url.contains("fork"));
    }

    #[rstest]
    fn tar_gz_asset_keeps_tar_gz_extension(widget: UpstreamRef) {
        let release = release(
            "v1.0.0",
            vec![AssetRef::new("widget.tar.gz", "https://x/widget.tar.gz")],
        );

        let artifact = resolve_artifact(&release, &widget, DEFAULT_WEB_BASE).expect("resolves");

        assert_eq!(artifact.filename, "widget-v1.0.0.tar.gz");
    }

    #[rstest]
    fn web_base_trailing_slash_is_ignored(widget: UpstreamRef) {
        assert_eq!(
            source_archive_url("https://ghe.example/", &widget, "v1"),
            "https://ghe.example/acme/widget/archive/refs/tags/v1.tar.gz"
        );
    }

    #[rstest]
    fn empty_tag_is_rejected(widget: UpstreamRef) {
        let release = release(
            "",
            vec![AssetRef::new("widget.tgz", "https://x/widget.tgz")],
        );

        let err = resolve_artifact(&release, &widget, DEFAULT_WEB_BASE).expect_err("no tag");

        assert_eq!(
            err,
            ResolveError::NoAssetAndNoTag {
                upstream: "acme/widget".to_owned()
            }
        );
    }
}
