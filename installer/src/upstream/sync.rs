//! Multi-upstream staging: lookup, resolve, and fetch per upstream.
//!
//! Upstreams are processed one after another and independently. A failure is
//! recorded against its upstream and processing continues with the next one;
//! the caller decides what the aggregate means via [`SyncReport`].

use crate::upstream::fetch::{ArtifactFetcher, ContentKind, FetchError, FetchResult};
use crate::upstream::lookup::{LookupError, ReleaseSource};
use crate::upstream::reference::UpstreamRef;
use crate::upstream::resolver::{ResolveError, ResolvedArtifact, resolve_artifact};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// A chart archive downloaded for one upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedChart {
    /// Release tag the archive belongs to.
    pub tag: String,
    /// The URL and filename that were chosen.
    pub artifact: ResolvedArtifact,
    /// The validated local file.
    pub fetch: FetchResult,
}

/// Why an upstream could not be staged.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The latest release could not be determined.
    #[error(transparent)]
    Lookup(#[from] LookupError),
    /// No download URL could be derived.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// The download failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Result of processing a single upstream.
#[derive(Debug)]
pub struct UpstreamOutcome {
    /// The upstream that was processed.
    pub upstream: UpstreamRef,
    /// The staged chart, or why staging failed.
    pub result: Result<StagedChart, SyncError>,
}

impl fmt::Display for UpstreamOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(staged) => write!(
                f,
                "ok     {} {} -> {}",
                self.upstream,
                staged.tag,
                staged.fetch.path.display()
            ),
            Err(err) => write!(f, "FAILED {}: {err}", self.upstream),
        }
    }
}

/// Inputs of a staging run.
#[derive(Debug, Clone, Copy)]
pub struct SyncPlan<'a> {
    /// Upstreams to process, in order.
    pub upstreams: &'a [UpstreamRef],
    /// Directory that receives the archives.
    pub dest: &'a Path,
    /// Web base used for source-archive fallbacks.
    pub web_base: &'a str,
}

/// Aggregate outcome of a staging run.
#[derive(Debug, Default)]
pub struct SyncReport {
    outcomes: Vec<UpstreamOutcome>,
}

impl SyncReport {
    /// Returns the per-upstream outcomes in processing order.
    #[must_use]
    pub fn outcomes(&self) -> &[UpstreamOutcome] {
        &self.outcomes
    }

    /// Number of upstreams staged successfully.
    #[must_use]
    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Number of upstreams that failed.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.outcomes.len() - self.successes()
    }

    /// Returns `true` when every upstream was staged.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }

    /// Process exit status for the run: `0` only if every upstream succeeded.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_success())
    }

    /// Returns the staged chart for `upstream`, if it succeeded.
    #[must_use]
    pub fn staged_for(&self, upstream: &UpstreamRef) -> Option<&StagedChart> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.upstream == *upstream)
            .and_then(|outcome| outcome.result.as_ref().ok())
    }
}

/// Stage the latest chart archive of every upstream in `plan`.
///
/// Never fails as a whole; inspect the returned report.
pub fn sync_upstreams(
    plan: &SyncPlan<'_>,
    releases: &dyn ReleaseSource,
    fetcher: &dyn ArtifactFetcher,
) -> SyncReport {
    let outcomes = plan
        .upstreams
        .iter()
        .map(|upstream| {
            let result = stage_one(plan, upstream, releases, fetcher);
            if let Err(err) = &result {
                log::error!("{upstream}: {err}");
            }
            UpstreamOutcome {
                upstream: upstream.clone(),
                result,
            }
        })
        .collect();

    let report = SyncReport { outcomes };
    log::info!(
        "staged {} of {} upstream(s)",
        report.successes(),
        report.outcomes.len()
    );
    report
}

fn stage_one(
    plan: &SyncPlan<'_>,
    upstream: &UpstreamRef,
    releases: &dyn ReleaseSource,
    fetcher: &dyn ArtifactFetcher,
) -> Result<StagedChart, SyncError> {
    let release = releases.latest_release(upstream)?;
    let artifact = resolve_artifact(&release, upstream, plan.web_base)?;
    if !artifact.is_chart_asset() {
        log::warn!(
            "{upstream}: no chart asset in {}; using source archive {}",
            release.tag,
            artifact.url
        );
    }

    let dest = plan.dest.join(&artifact.filename);
    let fetch = fetcher.fetch(&artifact.url, &dest, ContentKind::Archive)?;
    Ok(StagedChart {
        tag: release.tag,
        artifact,
        fetch,
    })
}
