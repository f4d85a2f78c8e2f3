use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::model::default_theme;
use crate::rates::BNR_FEED_URL;

/// Which entity carries rate, VAT, currency and the numbering prefix.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PricingOwner {
    #[default]
    Project,
    Client,
}

/// What deleting a project does to the records that reference it.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectDeletion {
    /// Keep invoices and billed timecards, drop unbilled timecards.
    #[default]
    KeepHistory,
    /// Drop every invoice and timecard of the project.
    Cascade,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppSettings {
    pub data_root: String,
    #[serde(default)]
    pub pricing_owner: PricingOwner,
    #[serde(default)]
    pub project_deletion: ProjectDeletion,
    #[serde(default = "default_feed_url")]
    pub rate_feed_url: String,
    #[serde(default = "default_theme")]
    pub default_theme: String,
}

fn default_feed_url() -> String {
    BNR_FEED_URL.to_string()
}

impl AppSettings {
    pub fn new(data_root: &str) -> Self {
        AppSettings {
            data_root: data_root.to_string(),
            pricing_owner: PricingOwner::default(),
            project_deletion: ProjectDeletion::default(),
            rate_feed_url: default_feed_url(),
            default_theme: default_theme(),
        }
    }

    pub fn root(&self) -> PathBuf {
        PathBuf::from(expand_home_dir(&self.data_root))
    }

    pub fn store_path(&self) -> PathBuf {
        self.root().join("store.json")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root().join("output")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root().join("templates")
    }
}

pub fn config_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("com", "timecard-invoicer", "app") {
        let config_dir = proj_dirs.config_dir();
        if !config_dir.exists() {
            fs::create_dir_all(config_dir).ok();
        }
        return config_dir.join("settings.toml");
    }
    PathBuf::from("settings.toml")
}

/// `Ok(None)` when no settings were saved yet.
pub fn load_settings(path: &Path) -> Result<Option<AppSettings>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let settings = toml::from_str(&content)?;
    debug!(path = %path.display(), "loaded settings");
    Ok(Some(settings))
}

pub fn save_settings(settings: &AppSettings, path: &Path) -> Result<()> {
    let toml_str = toml::to_string_pretty(settings)?;
    fs::write(path, toml_str)?;
    Ok(())
}

pub fn expand_home_dir(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(base_dirs) = BaseDirs::new() {
            let home = base_dirs.home_dir().to_string_lossy();
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_first_run() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_settings(&dir.path().join("settings.toml")).unwrap(), None);
    }

    #[test]
    fn old_settings_file_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "data_root = \"/srv/billing\"\n").unwrap();

        let settings = load_settings(&path).unwrap().unwrap();
        assert_eq!(settings.pricing_owner, PricingOwner::Project);
        assert_eq!(settings.project_deletion, ProjectDeletion::KeepHistory);
        assert_eq!(settings.rate_feed_url, BNR_FEED_URL);
        assert_eq!(settings.store_path(), PathBuf::from("/srv/billing/store.json"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut settings = AppSettings::new("~/Documents/Business");
        settings.pricing_owner = PricingOwner::Client;
        settings.project_deletion = ProjectDeletion::Cascade;
        save_settings(&settings, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("pricing_owner = \"client\""));
        assert_eq!(load_settings(&path).unwrap(), Some(settings));
    }
}
