//! Cross-platform path resolution.
//!
//! Default locations for fleetcheck's configuration, descriptors, caches and
//! the asset-id registry. Every path can be overridden in the config file.

use std::path::PathBuf;

const APP_DIR: &str = "fleetcheck";

/// Returns the fleetcheck configuration directory.
///
/// - Linux: `~/.config/fleetcheck/`
/// - macOS: `~/Library/Application Support/fleetcheck/`
/// - Windows: `%APPDATA%\fleetcheck\`
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Returns the default descriptor directory, `<config dir>/descriptors`.
pub fn descriptors_dir() -> PathBuf {
    config_dir().join("descriptors")
}

/// Returns the path to the cache directory.
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(APP_DIR)
}

/// Returns the default asset-id registry file.
pub fn asset_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("assets.txt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_namespaced() {
        assert!(config_dir().ends_with("fleetcheck"));
        assert!(descriptors_dir().ends_with("fleetcheck/descriptors"));
        assert!(cache_dir().ends_with("fleetcheck"));
        assert!(asset_file().ends_with("fleetcheck/assets.txt"));
    }
}
