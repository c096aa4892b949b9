//! Latest-release lookup against the GitHub REST API.

use crate::retry::{RetryPolicy, Sleeper};
use crate::upstream::reference::UpstreamRef;
use crate::upstream::release::{ReleaseInfo, parse_release};
use crate::upstream::transport::{HttpResponse, HttpTransport};
use thiserror::Error;

/// Public GitHub API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("envoy-ai-installer/", env!("CARGO_PKG_VERSION"));

/// Typed failures of a release lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The repository is unknown or has no published release.
    #[error("no published release found for {upstream}")]
    NotFound {
        /// The upstream that was queried.
        upstream: String,
    },

    /// The host throttled the request.
    #[error("release query for {upstream} was rate limited (HTTP {status})")]
    RateLimited {
        /// The upstream that was queried.
        upstream: String,
        /// Status code returned by the host.
        status: u16,
    },

    /// The host refused the request for another reason (auth, server error).
    #[error("release query for {upstream} was rejected with HTTP {status}")]
    Rejected {
        /// The upstream that was queried.
        upstream: String,
        /// Status code returned by the host.
        status: u16,
    },

    /// No response was received, or the body could not be read.
    #[error("network error querying {upstream}: {reason}")]
    Transient {
        /// The upstream that was queried.
        upstream: String,
        /// Description of the failure.
        reason: String,
    },

    /// The payload does not match the expected schema.
    #[error("malformed release payload for {upstream}: {reason}")]
    Malformed {
        /// The upstream that was queried.
        upstream: String,
        /// Description of the schema violation.
        reason: String,
    },
}

impl LookupError {
    /// Returns `true` when another attempt might succeed.
    ///
    /// A missing release or a malformed payload will not change on retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Rejected { .. } | Self::Transient { .. }
        )
    }
}

/// Source of latest-release metadata.
#[cfg_attr(test, mockall::automock)]
pub trait ReleaseSource {
    /// Returns the most recent published release of `upstream`.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] describing why no release could be obtained.
    fn latest_release(&self, upstream: &UpstreamRef) -> Result<ReleaseInfo, LookupError>;
}

/// Release lookups against a GitHub-compatible API with bounded retries.
pub struct GithubReleases<'a> {
    transport: &'a dyn HttpTransport,
    sleeper: &'a dyn Sleeper,
    api_base: String,
    token: Option<String>,
    policy: RetryPolicy,
}

impl<'a> GithubReleases<'a> {
    /// Creates a client for `api_base` using the default retry policy and no
    /// credentials.
    #[must_use]
    pub fn new(transport: &'a dyn HttpTransport, sleeper: &'a dyn Sleeper, api_base: &str) -> Self {
        Self {
            transport,
            sleeper,
            api_base: api_base.trim_end_matches('/').to_owned(),
            token: None,
            policy: RetryPolicy::default(),
        }
    }

    /// Sends `Authorization: Bearer <token>` with every query.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|value| !value.trim().is_empty());
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the "latest release" endpoint for `upstream`.
    ///
    /// # Examples
    ///
    /// ```
    /// use envoy_ai_installer::retry::ThreadSleeper;
    /// use envoy_ai_installer::upstream::UpstreamRef;
    /// use envoy_ai_installer::upstream::lookup::GithubReleases;
    /// use envoy_ai_installer::upstream::transport::UreqTransport;
    ///
    /// let transport = UreqTransport::default();
    /// let releases = GithubReleases::new(&transport, &ThreadSleeper, "https://api.github.com/");
    /// assert_eq!(
    ///     releases.latest_release_url(&UpstreamRef::new("envoyproxy", "gateway")),
    ///     "https://api.github.com/repos/envoyproxy/gateway/releases/latest"
    /// );
    /// ```
    #[must_use]
    pub fn latest_release_url(&self, upstream: &UpstreamRef) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base,
            upstream.owner(),
            upstream.project()
        )
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Accept", "application/vnd.github+json".to_owned()),
            ("User-Agent", USER_AGENT.to_owned()),
        ];
        if let Some(token) = &self.token {
            headers.push(("Authorization", format!("Bearer {token}")));
        }
        headers
    }

    fn query_once(&self, upstream: &UpstreamRef) -> Result<ReleaseInfo, LookupError> {
        let url = self.latest_release_url(upstream);
        log::debug!("querying {url}");
        let response = self
            .transport
            .get(&url, &self.headers())
            .map_err(|err| LookupError::Transient {
                upstream: upstream.to_string(),
                reason: err.to_string(),
            })?;

        classify_status(&response, upstream)?;

        let body = response.into_text().map_err(|err| {
            let upstream = upstream.to_string();
            let reason = err.to_string();
            if err.kind() == std::io::ErrorKind::InvalidData {
                LookupError::Malformed { upstream, reason }
            } else {
                LookupError::Transient { upstream, reason }
            }
        })?;

        parse_release(&body).map_err(|err| LookupError::Malformed {
            upstream: upstream.to_string(),
            reason: err.to_string(),
        })
    }
}

impl ReleaseSource for GithubReleases<'_> {
    fn latest_release(&self, upstream: &UpstreamRef) -> Result<ReleaseInfo, LookupError> {
        let release = self.policy.run(
            self.sleeper,
            |_attempt| self.query_once(upstream),
            LookupError::is_retryable,
        )?;
        log::info!("{upstream}: latest release is {}", release.tag);
        Ok(release)
    }
}

/// Map a non-2xx response to the matching [`LookupError`].
fn classify_status(response: &HttpResponse, upstream: &UpstreamRef) -> Result<(), LookupError> {
    if response.is_success() {
        return Ok(());
    }

    let status = response.status;
    let upstream = upstream.to_string();
    let quota_exhausted = response.header("x-ratelimit-remaining") == Some("0");

    Err(match status {
        404 => LookupError::NotFound { upstream },
        429 => LookupError::RateLimited { upstream, status },
        403 if quota_exhausted => LookupError::RateLimited { upstream, status },
        _ => LookupError::Rejected { upstream, status },
    })
}

#[cfg(test)]
#[path = "lookup_tests.rs"]
mod tests;
