//! Envoy AI Gateway installer library.
//!
//! This crate provides the core functionality for installing Envoy Gateway and
//! the Envoy AI Gateway extension with `helm`, checking cluster prerequisites,
//! and staging charts from the latest upstream releases. It is used by the
//! `envoy-ai-installer` CLI binary and can be consumed programmatically for
//! testing or custom installation workflows.
//!
//! # Modules
//!
//! - [`cli`] - Command-line argument definitions
//! - [`cluster`] - Read-only cluster probes through `kubectl`
//! - [`command`] - External command execution with timeouts
//! - [`config`] - Layered configuration: defaults, file, environment, flags
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`doctor`] - System health checks
//! - [`error`] - Semantic error types
//! - [`helm`] - Package-manager invocations and simulate mode
//! - [`install`] - Cleanup and ordered install orchestration
//! - [`logging`] - `log` backend writing the append-only log file
//! - [`output`] - Operator-facing progress formatting
//! - [`retry`] - Bounded retries with backoff
//! - [`stamp`] - Resolution stamp for staged charts
//! - [`upstream`] - Release lookup, artifact resolution, and downloads
//! - [`version`] - Version reporting

pub mod cli;
pub mod cluster;
pub mod command;
pub mod config;
pub mod dirs;
pub mod doctor;
pub mod error;
pub mod helm;
pub mod install;
pub mod logging;
pub mod output;
pub mod retry;
pub mod stamp;
pub mod upstream;
pub mod version;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
