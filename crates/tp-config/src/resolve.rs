//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → environment variables → XDG path → system path.
//! Unlike most settings there is no built-in default: a run needs tables.

use std::path::{Path, PathBuf};

/// Where the run configuration file was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/tabular-partitions/.
    SystemConfig,

    /// Nothing found.
    #[default]
    NotFound,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::NotFound => write!(f, "not found"),
        }
    }
}

/// Discovered run configuration path.
#[derive(Debug, Clone, Default)]
pub struct ConfigLocation {
    /// Path to the run configuration (or None if not found).
    pub path: Option<PathBuf>,

    /// Where the path came from (for diagnostics).
    pub source: ConfigSource,
}

/// Environment variable names.
const ENV_CONFIG_PATH: &str = "TP_CONFIG";
const ENV_CONFIG_DIR: &str = "TP_CONFIG_DIR";

/// Standard config file name.
const RUN_CONFIG_FILENAME: &str = "run.json";

/// Application name for XDG directories.
const APP_NAME: &str = "tabular-partitions";

/// Resolve the run configuration path.
///
/// Resolution order:
/// 1. Explicit CLI path. Returned even when missing so the caller reports
///    the path the user asked for.
/// 2. TP_CONFIG environment variable (direct path)
/// 3. TP_CONFIG_DIR environment variable + run.json
/// 4. XDG config directory (~/.config/tabular-partitions/run.json)
/// 5. System config (/etc/tabular-partitions/run.json)
pub fn resolve_config(cli_path: Option<&Path>) -> ConfigLocation {
    if let Some(path) = cli_path {
        return ConfigLocation {
            path: Some(path.to_path_buf()),
            source: ConfigSource::CliArgument,
        };
    }

    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return ConfigLocation {
                path: Some(path),
                source: ConfigSource::Environment,
            };
        }
    }

    if let Ok(config_dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = PathBuf::from(config_dir).join(RUN_CONFIG_FILENAME);
        if path.exists() {
            return ConfigLocation {
                path: Some(path),
                source: ConfigSource::Environment,
            };
        }
    }

    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(RUN_CONFIG_FILENAME);
        if path.exists() {
            return ConfigLocation {
                path: Some(path),
                source: ConfigSource::XdgConfig,
            };
        }
    }

    let system_path = system_config_dir().join(RUN_CONFIG_FILENAME);
    if system_path.exists() {
        return ConfigLocation {
            path: Some(system_path),
            source: ConfigSource::SystemConfig,
        };
    }

    ConfigLocation::default()
}

/// Get the XDG config directory for tabular-partitions.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_source_display() {
        assert_eq!(format!("{}", ConfigSource::CliArgument), "CLI argument");
        assert_eq!(
            format!("{}", ConfigSource::Environment),
            "environment variable"
        );
        assert_eq!(format!("{}", ConfigSource::XdgConfig), "XDG config");
        assert_eq!(format!("{}", ConfigSource::SystemConfig), "system config");
        assert_eq!(format!("{}", ConfigSource::NotFound), "not found");
    }

    #[test]
    fn test_cli_path_wins_even_when_missing() {
        let location = resolve_config(Some(Path::new("/nonexistent/run.json")));
        assert_eq!(location.source, ConfigSource::CliArgument);
        assert_eq!(location.path, Some(PathBuf::from("/nonexistent/run.json")));
    }

    #[test]
    fn test_xdg_config_dir() {
        if let Some(dir) = xdg_config_dir() {
            assert!(dir.ends_with(APP_NAME));
        }
    }

    #[test]
    fn test_system_config_dir() {
        assert_eq!(
            system_config_dir(),
            PathBuf::from("/etc/tabular-partitions")
        );
    }
}
