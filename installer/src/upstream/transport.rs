//! HTTP transport seam for release queries and downloads.
//!
//! Status codes are returned to the caller rather than turned into errors so
//! that the lookup layer can tell "not found" from "rate limited" and the
//! fetcher can report the exact status it gave up on.

use std::fmt;
use std::io::Read;
use std::time::Duration;

/// Network timeout applied to every request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A received HTTP response whose body has not been read yet.
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers with lower-cased names.
    pub headers: Vec<(String, String)>,
    /// Response body stream.
    pub body: Box<dyn Read>,
}

impl HttpResponse {
    /// Creates a response with the given status and in-memory body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Box::new(std::io::Cursor::new(body.into())),
        }
    }

    /// Adds a header, lower-casing its name.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push((name.to_ascii_lowercase(), value.to_owned()));
        self
    }

    /// Returns the first value of the named header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        let wanted = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == wanted)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the declared MIME type without parameters, lower-cased.
    ///
    /// # Examples
    ///
    /// ```
    /// use envoy_ai_installer::upstream::transport::HttpResponse;
    ///
    /// let response = HttpResponse::new(200, Vec::new())
    ///     .with_header("Content-Type", "Application/GZIP; charset=binary");
    /// assert_eq!(response.content_type().as_deref(), Some("application/gzip"));
    /// ```
    #[must_use]
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .and_then(|value| value.split(';').next())
            .map(|mime| mime.trim().to_ascii_lowercase())
            .filter(|mime| !mime.is_empty())
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Reads the whole body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the stream fails or is not valid UTF-8.
    pub fn into_text(mut self) -> std::io::Result<String> {
        let mut text = String::new();
        self.body.read_to_string(&mut text)?;
        Ok(text)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// The request never produced a response (DNS, connect, TLS, timeout).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("request to {url} failed: {reason}")]
pub struct TransportError {
    /// The URL that was requested.
    pub url: String,
    /// A human-readable description of the failure.
    pub reason: String,
}

/// Performs blocking `GET` requests.
pub trait HttpTransport {
    /// Sends a `GET` request with the given extra headers.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response was received.
    fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by a `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Creates a transport whose requests give up after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl HttpTransport for UreqTransport {
    fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse, TransportError> {
        let mut request = self.agent.get(url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = request.call().map_err(|err| TransportError {
            url: url.to_owned(),
            reason: err.to_string(),
        })?;

        let status = response.status().as_u16();
        let response_headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|text| (name.as_str().to_owned(), text.to_owned()))
            })
            .collect();

        Ok(HttpResponse {
            status,
            headers: response_headers,
            body: Box::new(response.into_body().into_reader()),
        })
    }
}
