//! Upstream project identity.

use serde::Deserialize;
use std::fmt;

/// Upstream project publishing Envoy Gateway.
pub const UPSTREAM_GATEWAY: &str = "gateway";

/// A releasing project identified by owner and project name.
///
/// # Examples
///
/// ```
/// use envoy_ai_installer::upstream::UpstreamRef;
///
/// let upstream = UpstreamRef::new("envoyproxy", "gateway");
/// assert_eq!(upstream.to_string(), "envoyproxy/gateway");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamRef {
    owner: String,
    project: String,
}

impl UpstreamRef {
    /// Creates a reference from owner and project names.
    #[must_use]
    pub fn new(owner: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            project: project.into(),
        }
    }

    /// Returns the owning account or organisation.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns the project (repository) name.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }
}

impl fmt::Display for UpstreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.project)
    }
}

/// The upstream projects tracked when no override is configured.
#[must_use]
pub fn default_upstreams() -> Vec<UpstreamRef> {
    [
        UPSTREAM_GATEWAY,
        "ai-gateway-helm",
        "ai-gateway-crds-helm",
        "ai-gateway",
    ]
    .into_iter()
    .map(|project| UpstreamRef::new("envoyproxy", project))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_upstreams_are_all_envoyproxy_projects() {
        let upstreams = default_upstreams();
        assert_eq!(upstreams.len(), 4);
        assert!(upstreams.iter().all(|u| u.owner() == "envoyproxy"));
        assert!(upstreams.contains(&UpstreamRef::new("envoyproxy", "gateway")));
    }

    #[test]
    fn deserialises_from_toml_table() {
        let upstream: UpstreamRef =
            toml::from_str("owner = \"acme\"\nproject = \"widget\"\n").expect("valid table");
        assert_eq!(upstream, UpstreamRef::new("acme", "widget"));
    }
}
