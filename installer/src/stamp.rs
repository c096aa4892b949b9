//! Resolution stamp written after a fully successful sync.
//!
//! The stamp is a small values document, `upstream-values.json`, whose only
//! field records when upstreams were last resolved. It is replaced
//! atomically so readers never observe a partial write.

use crate::error::{InstallerError, Result};
use crate::output::{sync_summary, write_line};
use crate::upstream::fetch::ArtifactFetcher;
use crate::upstream::lookup::ReleaseSource;
use crate::upstream::reference::UpstreamRef;
use crate::upstream::sync::{SyncPlan, SyncReport, sync_upstreams};
use camino::Utf8Path;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// File name of the stamp inside the staging directory.
pub const STAMP_FILE_NAME: &str = "upstream-values.json";

/// Contents of the stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionStamp {
    /// RFC 3339 time of the last fully successful resolution.
    pub last_resolved_at: String,
}

impl ResolutionStamp {
    /// A stamp for `at`.
    #[must_use]
    pub fn at(at: DateTime<Utc>) -> Self {
        Self {
            last_resolved_at: at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Overwrite `dir/upstream-values.json` with `stamp`.
///
/// # Errors
///
/// Returns an I/O error when the directory cannot be written.
pub fn write_stamp(dir: &Path, stamp: &ResolutionStamp) -> io::Result<PathBuf> {
    let path = dir.join(STAMP_FILE_NAME);
    let json = serde_json::to_string_pretty(stamp).map_err(io::Error::other)?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(json.as_bytes())?;
    file.write_all(b"\n")?;
    file.as_file().sync_all()?;
    file.persist(&path).map_err(|err| err.error)?;

    log::debug!("wrote resolution stamp {}", path.display());
    Ok(path)
}

/// Read a previously written stamp, if any.
///
/// # Errors
///
/// Returns an I/O error for unreadable or malformed stamps; a missing file is
/// `Ok(None)`.
pub fn read_stamp(dir: &Path) -> io::Result<Option<ResolutionStamp>> {
    let path = dir.join(STAMP_FILE_NAME);
    match std::fs::read_to_string(&path) {
        Ok(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Standalone sync: stage every upstream into `dest`, print one line per
/// upstream, and stamp `dest` when all of them succeeded.
///
/// # Errors
///
/// Returns [`InstallerError::UpstreamsFailed`] when any upstream failed (no
/// stamp is written) and I/O errors from creating `dest` or the stamp.
pub fn sync_and_stamp(
    upstreams: &[UpstreamRef],
    dest: &Utf8Path,
    web_base: &str,
    releases: &dyn ReleaseSource,
    fetcher: &dyn ArtifactFetcher,
    out: &mut dyn Write,
) -> Result<SyncReport> {
    std::fs::create_dir_all(dest)?;
    let plan = SyncPlan {
        upstreams,
        dest: dest.as_std_path(),
        web_base,
    };
    let report = sync_upstreams(&plan, releases, fetcher);
    for outcome in report.outcomes() {
        write_line(out, outcome);
    }

    if !report.is_success() {
        return Err(InstallerError::UpstreamsFailed {
            failed: report.failures(),
            total: report.outcomes().len(),
        });
    }
    write_stamp(dest.as_std_path(), &ResolutionStamp::at(Utc::now()))?;
    write_line(
        out,
        sync_summary(report.successes(), report.outcomes().len(), dest),
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::fetch::{FetchResult, MockArtifactFetcher};
    use crate::upstream::lookup::{LookupError, MockReleaseSource};
    use crate::upstream::release::{AssetRef, ReleaseInfo};
    use crate::upstream::resolver::DEFAULT_WEB_BASE;
    use chrono::TimeZone;
    use mockall::predicate::eq;

    fn stamp(day: u32) -> ResolutionStamp {
        ResolutionStamp::at(
            Utc.with_ymd_and_hms(2025, 6, day, 8, 0, 0)
                .single()
                .expect("valid timestamp"),
        )
    }

    #[test]
    fn stamp_uses_the_camel_case_field_name() {
        let json = serde_json::to_string(&stamp(1)).expect("serialise");
        assert_eq!(json, r#"{"lastResolvedAt":"2025-06-01T08:00:00Z"}"#);
    }

    #[test]
    fn writing_twice_overwrites_in_place() {
        let dir = tempfile::tempdir().expect("tempdir");

        write_stamp(dir.path(), &stamp(1)).expect("first write");
        let path = write_stamp(dir.path(), &stamp(2)).expect("second write");

        assert_eq!(path, dir.path().join(STAMP_FILE_NAME));
        assert_eq!(read_stamp(dir.path()).expect("read"), Some(stamp(2)));
        let entries = std::fs::read_dir(dir.path()).expect("list").count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn missing_stamp_reads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(read_stamp(dir.path()).expect("read"), None);
    }

    #[test]
    fn malformed_stamp_is_invalid_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(STAMP_FILE_NAME), "{oops").expect("write");

        let err = read_stamp(dir.path()).expect_err("malformed");

        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    fn fetched(path: &Path) -> FetchResult {
        FetchResult {
            path: path.to_path_buf(),
            size: 10,
            content_type: Some("application/gzip".to_owned()),
            content_type_accepted: true,
            attempts: 1,
            sha256: "11".repeat(32),
        }
    }

    #[test]
    fn full_success_writes_the_stamp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = Utf8Path::from_path(dir.path()).expect("utf-8").join("charts");
        let widget = UpstreamRef::new("acme", "widget");
        let mut releases = MockReleaseSource::new();
        releases.expect_latest_release().returning(|_| {
            Ok(ReleaseInfo {
                tag: "v2.3.1".to_owned(),
                assets: vec![AssetRef::new("widget-chart-v2.3.1.tgz", "https://x/widget.tgz")],
            })
        });
        let mut fetcher = MockArtifactFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_, dest, _| Ok(fetched(dest)));
        let mut out = Vec::new();

        let report = sync_and_stamp(
            &[widget],
            &dest,
            DEFAULT_WEB_BASE,
            &releases,
            &fetcher,
            &mut out,
        )
        .expect("sync succeeds");

        assert_eq!(report.successes(), 1);
        assert!(read_stamp(dest.as_std_path()).expect("read").is_some());
        let text = String::from_utf8(out).expect("utf-8");
        assert!(text.contains("ok     acme/widget v2.3.1"));
        assert!(text.contains("Staged 1 of 1 upstream into"));
    }

    #[test]
    fn partial_failure_leaves_no_stamp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = Utf8Path::from_path(dir.path()).expect("utf-8");
        let alpha = UpstreamRef::new("acme", "alpha");
        let beta = UpstreamRef::new("acme", "beta");
        let mut releases = MockReleaseSource::new();
        releases
            .expect_latest_release()
            .with(eq(alpha.clone()))
            .returning(|_| {
                Ok(ReleaseInfo {
                    tag: "v1.0.0".to_owned(),
                    assets: vec![AssetRef::new("alpha-helm.tgz", "https://x/alpha-helm.tgz")],
                })
            });
        releases
            .expect_latest_release()
            .with(eq(beta.clone()))
            .returning(|upstream| {
                Err(LookupError::NotFound {
                    upstream: upstream.to_string(),
                })
            });
        let mut fetcher = MockArtifactFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_, dest, _| Ok(fetched(dest)));
        let mut out = Vec::new();

        let err = sync_and_stamp(
            &[alpha, beta],
            dest,
            DEFAULT_WEB_BASE,
            &releases,
            &fetcher,
            &mut out,
        )
        .expect_err("one upstream fails");

        assert!(matches!(err, InstallerError::UpstreamsFailed { failed: 1, total: 2 }));
        assert_eq!(read_stamp(dest.as_std_path()).expect("read"), None);
        assert!(String::from_utf8(out).expect("utf-8").contains("FAILED acme/beta"));
    }
}
