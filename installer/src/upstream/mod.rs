//! Upstream release resolution and chart staging.
//!
//! The pipeline runs leaves first: [`lookup`] asks the release host for the
//! latest release, [`resolver`] picks a chart archive (or the tag's source
//! archive), [`fetch`] downloads it with retries, and [`sync`] drives the
//! three for every configured upstream.

pub mod fetch;
pub mod lookup;
pub mod reference;
pub mod release;
pub mod resolver;
pub mod sync;
pub mod transport;

pub use fetch::{ArtifactFetcher, ContentKind, FetchError, FetchResult, HttpFetcher};
pub use lookup::{GithubReleases, LookupError, ReleaseSource};
pub use reference::{UpstreamRef, default_upstreams};
pub use release::{AssetRef, ReleaseInfo};
pub use resolver::{ArtifactSource, ResolvedArtifact, resolve_artifact};
pub use sync::{StagedChart, SyncError, SyncPlan, SyncReport, UpstreamOutcome, sync_upstreams};
pub use transport::{HttpResponse, HttpTransport, TransportError, UreqTransport};
