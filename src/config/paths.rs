//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings + API key):
//!   Linux:   ~/.config/voice-robot/
//!   macOS:   ~/Library/Application Support/voice-robot/
//!
//! Data dir (debug recordings):
//!   Linux:   ~/.local/share/voice-robot/recordings/
//!   macOS:   ~/Library/Application Support/voice-robot/recordings/

use std::path::{Path, PathBuf};

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml` and `api-key.txt`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Default location of the cloud API key.
    pub api_key_file: PathBuf,
    /// Default directory for `recording_<secs>.wav` files.
    pub recordings_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-robot";

    /// Resolves all paths using the `dirs` crate, falling back to the current
    /// directory when the platform has no standard location.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);
        Self::from_dirs(config_dir, data_dir)
    }

    /// Everything under one root; used for tests and portable installs.
    pub fn rooted(root: &Path) -> Self {
        Self::from_dirs(root.join("config"), root.join("data"))
    }

    fn from_dirs(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            settings_file: config_dir.join("settings.toml"),
            api_key_file: config_dir.join("api-key.txt"),
            recordings_dir: data_dir.join("recordings"),
            config_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths
            .api_key_file
            .file_name()
            .is_some_and(|n| n == "api-key.txt"));
        assert!(paths.recordings_dir.ends_with("voice-robot/recordings"));
    }

    #[test]
    fn rooted_paths_stay_under_root() {
        let root = Path::new("/tmp/robot");
        let paths = AppPaths::rooted(root);
        assert!(paths.settings_file.starts_with(root));
        assert!(paths.recordings_dir.starts_with(root));
    }
}
