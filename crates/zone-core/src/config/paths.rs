//! Standard locations for Zone configuration files

use std::path::PathBuf;

/// Get the default configuration directory
///
/// Returns: `$XDG_CONFIG_HOME/zone` (or `./zone` when no config dir exists)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("zone")
}

/// Get the default path for a named config file inside [`default_config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_ends_with_zone() {
        assert!(default_config_dir().ends_with("zone"));
    }

    #[test]
    fn test_config_path_includes_filename() {
        assert!(default_config_path("engine.yaml").ends_with("zone/engine.yaml"));
    }
}
