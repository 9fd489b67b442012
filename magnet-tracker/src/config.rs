//! magnet-tracker configuration
//!
//! Bootstrap settings loaded once from TOML at startup:
//! - `resource_group`: reference resource group handed to the pattern loader
//! - `event_bus_capacity`: broadcast buffer for tracker notifications
//! - `[logging]`: default log filter when RUST_LOG is unset
//! - `[[references]]`: catalog seed entries (built-in catalog when absent)
//!
//! File resolution: `--config` > `MAGNET_TRACKER_CONFIG` > platform config dir.

use crate::catalog::{ReferenceCatalog, ReferenceInfo};
use crate::error::{Error, Result};
use magnet_common::config::{load_toml_config, resolve_config_path, LoadedConfig, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "MAGNET_TRACKER_CONFIG";

/// Directory name under the platform config dir
pub const APP_NAME: &str = "magnet-tracker";

pub const DEFAULT_RESOURCE_GROUP: &str = "FridgeMagnets";

pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 100;

/// Catalog seed entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub details: String,
}

/// Tracker bootstrap configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub resource_group: String,
    pub event_bus_capacity: usize,
    pub logging: LoggingConfig,
    pub references: Vec<ReferenceEntry>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            resource_group: DEFAULT_RESOURCE_GROUP.to_string(),
            event_bus_capacity: DEFAULT_EVENT_BUS_CAPACITY,
            logging: LoggingConfig::default(),
            references: Vec::new(),
        }
    }
}

impl TrackerConfig {
    /// Resolve, load and validate the config file
    ///
    /// The result records the resolved path and whether built-in defaults
    /// were used because no file existed there.
    pub fn load(cli_path: Option<&Path>) -> Result<LoadedConfig<Self>> {
        let config_path = resolve_config_path(cli_path, CONFIG_ENV_VAR, APP_NAME);
        let loaded: LoadedConfig<TrackerConfig> = load_toml_config(&config_path)?;
        loaded.value.validate()?;

        info!(
            resource_group = %loaded.value.resource_group,
            references = loaded.value.references.len(),
            defaults = loaded.used_defaults,
            "Tracker configuration ready"
        );
        Ok(loaded)
    }

    /// Reject settings the tracker cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.resource_group.trim().is_empty() {
            return Err(Error::Config("resource_group must not be empty".to_string()));
        }
        if self.event_bus_capacity == 0 {
            return Err(Error::Config(
                "event_bus_capacity must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.references {
            if entry.name.trim().is_empty() {
                return Err(Error::Config("reference name must not be empty".to_string()));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate reference entry: {}",
                    entry.name
                )));
            }
        }
        Ok(())
    }

    /// Catalog seeded from `[[references]]`, or the built-in one
    pub fn catalog(&self) -> ReferenceCatalog {
        if self.references.is_empty() {
            return ReferenceCatalog::with_defaults();
        }
        ReferenceCatalog::from_entries(self.references.iter().map(|entry| {
            (
                entry.name.clone(),
                ReferenceInfo::new(entry.title.clone(), entry.details.clone()),
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magnet_common::config::ConfigOrigin;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.resource_group, "FridgeMagnets");
        assert_eq!(config.event_bus_capacity, 100);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.catalog().len(), 4);
    }

    #[test]
    #[serial]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
event_bus_capacity = 8

[[references]]
name = "espresso"
title = "Espresso Magnet"
details = "Pin morning notes."

[[references]]
name = "matcha"
title = "Matcha Magnet"
"#
        )
        .unwrap();

        let loaded = TrackerConfig::load(Some(file.path())).unwrap();
        assert!(!loaded.used_defaults);
        let config = loaded.value;
        assert_eq!(config.resource_group, "FridgeMagnets");
        assert_eq!(config.event_bus_capacity, 8);

        let catalog = config.catalog();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.info("espresso").title, "Espresso Magnet");
        assert_eq!(catalog.info("matcha").details, "");
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = TrackerConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(
            result,
            Err(Error::Common(magnet_common::Error::NotFound(_)))
        ));
    }

    #[test]
    #[serial]
    fn test_missing_env_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var(CONFIG_ENV_VAR, dir.path().join("absent.toml"));
        let result = TrackerConfig::load(None);
        std::env::remove_var(CONFIG_ENV_VAR);

        let loaded = result.unwrap();
        assert!(loaded.used_defaults, "fallback is reported to the caller");
        assert_eq!(loaded.source.origin, ConfigOrigin::Environment);
        assert_eq!(loaded.value, TrackerConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let empty_group = TrackerConfig {
            resource_group: " ".to_string(),
            ..TrackerConfig::default()
        };
        assert!(matches!(empty_group.validate(), Err(Error::Config(_))));

        let zero_capacity = TrackerConfig {
            event_bus_capacity: 0,
            ..TrackerConfig::default()
        };
        assert!(matches!(zero_capacity.validate(), Err(Error::Config(_))));

        let entry = ReferenceEntry {
            name: "espresso".to_string(),
            title: "Espresso".to_string(),
            details: String::new(),
        };
        let duplicate = TrackerConfig {
            references: vec![entry.clone(), entry],
            ..TrackerConfig::default()
        };
        assert!(matches!(duplicate.validate(), Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_unparsable_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "event_bus_capacity = \"many\"").unwrap();
        assert!(matches!(
            TrackerConfig::load(Some(file.path())),
            Err(Error::Common(magnet_common::Error::Config(_)))
        ));
    }
}
