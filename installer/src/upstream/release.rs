//! Release metadata returned by the release-hosting API.
//!
//! Only the fields the installer consumes are modelled: the tag and, per
//! asset, its name, direct download URL, and declared content type. Anything
//! else in the payload (including repository metadata) is ignored.

use serde::Deserialize;
use thiserror::Error;

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    /// File name as published.
    pub name: String,
    /// Direct download URL.
    pub download_url: String,
    /// Declared MIME type, when the host reports one.
    pub content_type: Option<String>,
}

impl AssetRef {
    /// Creates an asset without a declared content type.
    #[must_use]
    pub fn new(name: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            download_url: download_url.into(),
            content_type: None,
        }
    }
}

/// The latest published release of an upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Tag or version string. Never empty when produced by [`parse_release`].
    pub tag: String,
    /// Assets in the order the host listed them.
    pub assets: Vec<AssetRef>,
}

/// Errors arising while decoding a release payload.
#[derive(Debug, Error)]
pub enum ReleaseParseError {
    /// The payload is not JSON of the expected shape.
    #[error("invalid release JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload has no usable tag.
    #[error("release has no tag_name")]
    MissingTag,
}

#[derive(Deserialize)]
struct ReleasePayload {
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    assets: Vec<AssetPayload>,
}

#[derive(Deserialize)]
struct AssetPayload {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    content_type: Option<String>,
}

/// Decode a "latest release" JSON document.
///
/// # Errors
///
/// Returns [`ReleaseParseError::Json`] when the document does not match the
/// schema and [`ReleaseParseError::MissingTag`] when `tag_name` is absent or
/// blank.
///
/// # Examples
///
/// ```
/// use envoy_ai_installer::upstream::release::parse_release;
///
/// let json = r#"{"tag_name": "v1.2.0", "assets": [
///     {"name": "gateway-helm-v1.2.0.tgz",
///      "browser_download_url": "https://example.test/gateway-helm-v1.2.0.tgz"}
/// ]}"#;
/// let release = parse_release(json)?;
/// assert_eq!(release.tag, "v1.2.0");
/// assert_eq!(release.assets.len(), 1);
/// # Ok::<(), envoy_ai_installer::upstream::release::ReleaseParseError>(())
/// ```
pub fn parse_release(json: &str) -> Result<ReleaseInfo, ReleaseParseError> {
    let payload: ReleasePayload = serde_json::from_str(json)?;
    let tag = payload
        .tag_name
        .map(|tag| tag.trim().to_owned())
        .filter(|tag| !tag.is_empty())
        .ok_or(ReleaseParseError::MissingTag)?;

    let assets = payload
        .assets
        .into_iter()
        .map(|asset| AssetRef {
            name: asset.name,
            download_url: asset.browser_download_url,
            content_type: asset.content_type.filter(|ct| !ct.is_empty()),
        })
        .collect();

    Ok(ReleaseInfo { tag, assets })
}
