//! Platform directory lookup.
//!
//! Directory resolution sits behind [`BaseDirs`] so that configuration and
//! log paths can be tested without touching the real home directory.

use std::path::PathBuf;

/// Name of the per-user settings directory under the home directory.
pub const SETTINGS_DIR_NAME: &str = ".envoy-ai-installer";

/// Source of the per-user directories the installer reads and writes.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// The user's home directory.
    fn home_dir(&self) -> Option<PathBuf>;

    /// The installer's data directory (log file location).
    fn installer_data_dir(&self) -> Option<PathBuf>;
}

/// [`BaseDirs`] backed by the platform conventions from `directories-next`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBaseDirs;

impl BaseDirs for SystemBaseDirs {
    fn home_dir(&self) -> Option<PathBuf> {
        directories_next::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
    }

    fn installer_data_dir(&self) -> Option<PathBuf> {
        directories_next::ProjectDirs::from("", "", "envoy-ai-installer")
            .map(|dirs| dirs.data_dir().to_path_buf())
    }
}

/// Returns `<home>/.envoy-ai-installer/config.toml`.
#[must_use]
pub fn default_config_path(dirs: &dyn BaseDirs) -> Option<PathBuf> {
    dirs.home_dir()
        .map(|home| home.join(SETTINGS_DIR_NAME).join("config.toml"))
}

/// Returns `<data_dir>/envoy-ai-installer.log`.
#[must_use]
pub fn default_log_path(dirs: &dyn BaseDirs) -> Option<PathBuf> {
    dirs.installer_data_dir()
        .map(|data| data.join("envoy-ai-installer.log"))
}
