//! Artefact download with retry and post-download validation.
//!
//! Bodies are streamed into a temporary file created next to the destination
//! and persisted only once the download is complete and non-empty, so a failed
//! attempt never leaves a partial file at the destination path.

use crate::retry::{RetryPolicy, Sleeper};
use crate::upstream::transport::HttpTransport;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// MIME types accepted for chart archives.
///
/// `application/octet-stream` is what GitHub serves for release assets.
pub const ACCEPTED_ARCHIVE_TYPES: [&str; 7] = [
    "application/gzip",
    "application/x-gzip",
    "application/x-tar",
    "application/x-gtar",
    "application/x-compressed",
    "application/x-compressed-tar",
    "application/octet-stream",
];

const USER_AGENT: &str = concat!("envoy-ai-installer/", env!("CARGO_PKG_VERSION"));
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// What kind of payload a download is expected to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// A gzip or tar compatible chart archive.
    Archive,
    /// Any payload; the declared content type is not checked.
    Any,
}

impl ContentKind {
    /// Returns `true` when `content_type` is acceptable for this kind.
    ///
    /// A missing content type is never acceptable for archives.
    #[must_use]
    pub fn accepts(self, content_type: Option<&str>) -> bool {
        match self {
            Self::Any => true,
            Self::Archive => {
                content_type.is_some_and(|mime| ACCEPTED_ARCHIVE_TYPES.contains(&mime))
            }
        }
    }
}

/// A validated local copy of a downloaded artefact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Where the file was written.
    pub path: PathBuf,
    /// File size in bytes; never zero.
    pub size: u64,
    /// Content type declared by the server.
    pub content_type: Option<String>,
    /// Whether the declared content type was in the accepted set.
    pub content_type_accepted: bool,
    /// Number of attempts used, including the successful one.
    pub attempts: u32,
    /// Lower-case hex SHA-256 digest of the file.
    pub sha256: String,
}

/// Reasons a download failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// No response was received, or the body stream broke mid-transfer.
    #[error("connection error fetching {url}: {reason}")]
    Connection {
        /// The URL being fetched.
        url: String,
        /// Description of the failure.
        reason: String,
    },

    /// The server answered with a non-2xx status.
    #[error("fetching {url} returned HTTP {status}")]
    NonSuccessStatus {
        /// The URL being fetched.
        url: String,
        /// Status code received.
        status: u16,
    },

    /// The server answered successfully but sent no bytes.
    #[error("download from {url} produced an empty file")]
    EmptyFile {
        /// The URL being fetched.
        url: String,
    },

    /// The destination could not be written.
    #[error("cannot write {path}: {source}")]
    Io {
        /// Destination path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Returns `true` for failures worth another attempt.
    ///
    /// Local filesystem errors will not be fixed by waiting.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }
}

/// Downloads artefacts to local paths.
#[cfg_attr(test, mockall::automock)]
pub trait ArtifactFetcher {
    /// Downloads `url` to `dest`.
    ///
    /// # Errors
    ///
    /// Returns the last [`FetchError`] seen once retries are exhausted.
    fn fetch(&self, url: &str, dest: &Path, kind: ContentKind) -> Result<FetchResult, FetchError>;
}

/// [`ArtifactFetcher`] over an [`HttpTransport`] with bounded retries.
pub struct HttpFetcher<'a> {
    transport: &'a dyn HttpTransport,
    sleeper: &'a dyn Sleeper,
    policy: RetryPolicy,
}

impl<'a> HttpFetcher<'a> {
    /// Creates a fetcher with the default retry policy.
    #[must_use]
    pub fn new(transport: &'a dyn HttpTransport, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            transport,
            sleeper,
            policy: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn fetch_once(
        &self,
        url: &str,
        dest: &Path,
        kind: ContentKind,
        attempt: u32,
    ) -> Result<FetchResult, FetchError> {
        let response = self
            .transport
            .get(url, &[("User-Agent", USER_AGENT.to_owned())])
            .map_err(|err| FetchError::Connection {
                url: url.to_owned(),
                reason: err.reason,
            })?;

        if !response.is_success() {
            return Err(FetchError::NonSuccessStatus {
                url: url.to_owned(),
                status: response.status,
            });
        }

        let content_type = response.content_type();
        let content_type_accepted = kind.accepts(content_type.as_deref());
        if !content_type_accepted {
            log::warn!(
                "unexpected content type {} for {url}; continuing",
                content_type.as_deref().unwrap_or("<none>")
            );
        }

        let dir = parent_dir(dest);
        std::fs::create_dir_all(dir).map_err(|source| io_error(dest, source))?;
        let mut staged =
            tempfile::NamedTempFile::new_in(dir).map_err(|source| io_error(dest, source))?;

        let (size, sha256) = stream_body(response.body, staged.as_file_mut(), url, dest)?;
        if size == 0 {
            return Err(FetchError::EmptyFile {
                url: url.to_owned(),
            });
        }

        staged
            .persist(dest)
            .map_err(|err| io_error(dest, err.error))?;

        Ok(FetchResult {
            path: dest.to_path_buf(),
            size,
            content_type,
            content_type_accepted,
            attempts: attempt,
            sha256,
        })
    }
}

impl ArtifactFetcher for HttpFetcher<'_> {
    fn fetch(&self, url: &str, dest: &Path, kind: ContentKind) -> Result<FetchResult, FetchError> {
        log::debug!("fetching {url} -> {}", dest.display());
        let result = self.policy.run(
            self.sleeper,
            |attempt| self.fetch_once(url, dest, kind, attempt),
            FetchError::is_retryable,
        )?;
        log::info!(
            "fetched {url} ({} bytes, sha256 {}) to {}",
            result.size,
            result.sha256,
            result.path.display()
        );
        Ok(result)
    }
}

fn parent_dir(dest: &Path) -> &Path {
    match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn io_error(dest: &Path, source: std::io::Error) -> FetchError {
    FetchError::Io {
        path: dest.to_path_buf(),
        source,
    }
}

/// Copy `body` into `sink`, returning the byte count and hex digest.
///
/// Read failures are connection errors; write failures are local I/O errors.
fn stream_body(
    mut body: Box<dyn Read>,
    sink: &mut std::fs::File,
    url: &str,
    dest: &Path,
) -> Result<(u64, String), FetchError> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; COPY_BUFFER_SIZE];
    let mut size = 0_u64;

    loop {
        let read = match body.read(&mut buffer) {
            Ok(0) => break,
            Ok(count) => count,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(FetchError::Connection {
                    url: url.to_owned(),
                    reason: err.to_string(),
                });
            }
        };
        let chunk = buffer.get(..read).unwrap_or_default();
        sink.write_all(chunk)
            .map_err(|source| io_error(dest, source))?;
        hasher.update(chunk);
        size += read as u64;
    }

    sink.flush().map_err(|source| io_error(dest, source))?;
    let digest = hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect();
    Ok((size, digest))
}

#[cfg(test)]
#[path = "fetch_tests.rs"]
mod tests;
