//! Configuration loading and config file resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where a configuration path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// `--config` command-line argument
    CommandLine,
    /// Environment variable
    Environment,
    /// OS-dependent compiled default
    Default,
}

/// Resolved configuration file path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPath {
    pub path: PathBuf,
    pub origin: ConfigOrigin,
}

impl ConfigPath {
    /// A path named explicitly by the user must exist; resolved ones may not
    pub fn is_explicit(&self) -> bool {
        self.origin == ConfigOrigin::CommandLine
    }
}

/// Logging section shared by every tracker config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset (e.g. "info", "debug")
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Config file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. OS-dependent compiled default (fallback)
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    app_name: &str,
) -> ConfigPath {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return ConfigPath {
            path: path.to_path_buf(),
            origin: ConfigOrigin::CommandLine,
        };
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return ConfigPath {
                path: PathBuf::from(path),
                origin: ConfigOrigin::Environment,
            };
        }
    }

    // Priority 3: OS-dependent compiled default
    ConfigPath {
        path: default_config_path(app_name),
        origin: ConfigOrigin::Default,
    }
}

/// Get OS-dependent default config file path
///
/// - Linux: ~/.config/<app>/config.toml
/// - macOS: ~/Library/Application Support/<app>/config.toml
/// - Windows: %APPDATA%\<app>\config.toml
pub fn default_config_path(app_name: &str) -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(app_name).join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(format!("./{}.toml", app_name)))
}

/// A parsed config file and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig<T> {
    pub value: T,
    pub source: ConfigPath,
    /// No file existed at `source`; `value` is `T::default()`
    pub used_defaults: bool,
}

/// Load and parse a TOML config file
///
/// A missing file is not fatal unless the path was named explicitly: the
/// loader warns and falls back to `T::default()`, flagging the result with
/// `used_defaults`. A file that exists but does not parse is always an error.
pub fn load_toml_config<T>(config_path: &ConfigPath) -> Result<LoadedConfig<T>>
where
    T: DeserializeOwned + Default,
{
    let path = &config_path.path;

    if !path.exists() {
        if config_path.is_explicit() {
            return Err(Error::NotFound(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(LoadedConfig {
            value: T::default(),
            source: config_path.clone(),
            used_defaults: true,
        });
    }

    let content = std::fs::read_to_string(path)?;
    let value = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    info!("Loaded TOML configuration from {}", path.display());
    Ok(LoadedConfig {
        value,
        source: config_path.clone(),
        used_defaults: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const TEST_ENV: &str = "MAGNET_COMMON_TEST_CONFIG";

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct SampleConfig {
        name: String,
        logging: LoggingConfig,
    }

    #[test]
    #[serial]
    fn test_cli_argument_wins() {
        std::env::set_var(TEST_ENV, "/tmp/from-env.toml");
        let resolved = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")), TEST_ENV, "app");
        std::env::remove_var(TEST_ENV);

        assert_eq!(resolved.path, PathBuf::from("/tmp/from-cli.toml"));
        assert_eq!(resolved.origin, ConfigOrigin::CommandLine);
        assert!(resolved.is_explicit());
    }

    #[test]
    #[serial]
    fn test_environment_beats_default() {
        std::env::set_var(TEST_ENV, "/tmp/from-env.toml");
        let resolved = resolve_config_path(None, TEST_ENV, "app");
        std::env::remove_var(TEST_ENV);

        assert_eq!(resolved.path, PathBuf::from("/tmp/from-env.toml"));
        assert_eq!(resolved.origin, ConfigOrigin::Environment);
        assert!(!resolved.is_explicit());
    }

    #[test]
    #[serial]
    fn test_falls_back_to_default_path() {
        std::env::remove_var(TEST_ENV);
        let resolved = resolve_config_path(None, TEST_ENV, "magnet-tracker");

        assert_eq!(resolved.origin, ConfigOrigin::Default);
        assert!(resolved.path.ends_with("config.toml"));
    }

    #[test]
    fn test_missing_default_file_uses_defaults() {
        let config_path = ConfigPath {
            path: PathBuf::from("/nonexistent/magnet/config.toml"),
            origin: ConfigOrigin::Default,
        };
        let loaded: LoadedConfig<SampleConfig> = load_toml_config(&config_path).unwrap();
        assert!(loaded.used_defaults, "fallback is reported to the caller");
        assert_eq!(loaded.source, config_path);
        assert_eq!(loaded.value, SampleConfig::default());
        assert_eq!(loaded.value.logging.level, "info");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let config_path = ConfigPath {
            path: PathBuf::from("/nonexistent/magnet/config.toml"),
            origin: ConfigOrigin::CommandLine,
        };
        let result: Result<LoadedConfig<SampleConfig>> = load_toml_config(&config_path);
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_parses_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"fridge\"\n[logging]\nlevel = \"debug\"").unwrap();

        let config_path = ConfigPath {
            path: file.path().to_path_buf(),
            origin: ConfigOrigin::CommandLine,
        };
        let loaded: LoadedConfig<SampleConfig> = load_toml_config(&config_path).unwrap();
        assert!(!loaded.used_defaults);
        assert_eq!(loaded.value.name, "fridge");
        assert_eq!(loaded.value.logging.level, "debug");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = [unterminated").unwrap();

        let config_path = ConfigPath {
            path: file.path().to_path_buf(),
            origin: ConfigOrigin::Environment,
        };
        let result: Result<LoadedConfig<SampleConfig>> = load_toml_config(&config_path);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
