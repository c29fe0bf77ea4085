//! Standard locations of sdrflow files

use std::path::PathBuf;

/// Per-user configuration directory
///
/// Returns: `$XDG_CONFIG_HOME/sdrflow` (or the platform equivalent),
/// falling back to `./sdrflow`
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sdrflow")
}

/// Default path of `filename` inside [`config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    config_dir().join(filename)
}
