//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `hourbook.toml` files.

use crate::providers::ProviderKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "hourbook.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Harvest integration.
    #[serde(default)]
    pub harvest: HarvestConfig,

    /// Toggl integration.
    #[serde(default)]
    pub toggl: TogglConfig,

    /// Email delivery.
    #[serde(default)]
    pub email: EmailConfig,

    /// Trial notifications.
    #[serde(default)]
    pub trial: TrialConfig,

    /// Weekly report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Path of the JSON data store.
    #[serde(default = "default_data_file")]
    pub data_file: String,

    /// Time-tracking providers to import from.
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderKind>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            providers: default_providers(),
        }
    }
}

fn default_data_file() -> String {
    "hourbook.json".to_string()
}

fn default_providers() -> Vec<ProviderKind> {
    vec![ProviderKind::Harvest, ProviderKind::Toggl]
}

/// Harvest OAuth and API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// OAuth client id.
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret.
    #[serde(default)]
    pub client_secret: String,

    /// Harvest v2 API base URL.
    #[serde(default = "default_harvest_api_url")]
    pub api_url: String,

    /// Harvest ID service (OAuth, accounts).
    #[serde(default = "default_harvest_id_url")]
    pub id_url: String,

    /// Refresh access tokens older than this many hours.
    #[serde(default = "default_refresh_after_hours")]
    pub refresh_after_hours: i64,

    /// How far back to import time entries.
    #[serde(default = "default_lookback_weeks")]
    pub lookback_weeks: i64,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_url: default_harvest_api_url(),
            id_url: default_harvest_id_url(),
            refresh_after_hours: default_refresh_after_hours(),
            lookback_weeks: default_lookback_weeks(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_harvest_api_url() -> String {
    "https://api.harvestapp.com/v2".to_string()
}

fn default_harvest_id_url() -> String {
    "https://id.getharvest.com".to_string()
}

fn default_refresh_after_hours() -> i64 {
    24 * 7 // access tokens live 14 days
}

fn default_lookback_weeks() -> i64 {
    52
}

fn default_timeout() -> u64 {
    60
}

/// Toggl API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TogglConfig {
    /// Toggl Track API base URL.
    #[serde(default = "default_toggl_api_url")]
    pub api_url: String,

    /// Toggl Reports API base URL.
    #[serde(default = "default_toggl_reports_url")]
    pub reports_url: String,

    /// How far back to import time entries.
    #[serde(default = "default_lookback_weeks")]
    pub lookback_weeks: i64,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for TogglConfig {
    fn default() -> Self {
        Self {
            api_url: default_toggl_api_url(),
            reports_url: default_toggl_reports_url(),
            lookback_weeks: default_lookback_weeks(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_toggl_api_url() -> String {
    "https://api.track.toggl.com/api/v9".to_string()
}

fn default_toggl_reports_url() -> String {
    "https://api.track.toggl.com/reports/api/v2".to_string()
}

/// Email delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// SendGrid API base URL.
    #[serde(default = "default_email_api_url")]
    pub api_url: String,

    /// SendGrid API key. Usually supplied through `SENDGRID_API_KEY`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    #[serde(default = "default_from_email")]
    pub from_email: String,

    #[serde(default = "default_from_name")]
    pub from_name: String,

    #[serde(default = "default_from_email")]
    pub reply_to: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Template used for the weekly progress email.
    #[serde(default = "default_weekly_template")]
    pub weekly_progress_template: String,

    /// Template used when a trial is about to end.
    #[serde(default = "default_almost_expired_template")]
    pub trial_almost_expired_template: String,

    /// Template used when a trial has ended.
    #[serde(default = "default_expired_template")]
    pub trial_expired_template: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: default_email_api_url(),
            api_key: String::new(),
            from_email: default_from_email(),
            from_name: default_from_name(),
            reply_to: default_from_email(),
            timeout_seconds: default_timeout(),
            weekly_progress_template: default_weekly_template(),
            trial_almost_expired_template: default_almost_expired_template(),
            trial_expired_template: default_expired_template(),
        }
    }
}

fn default_email_api_url() -> String {
    "https://api.sendgrid.com".to_string()
}

fn default_from_email() -> String {
    "team@hourbook.app".to_string()
}

fn default_from_name() -> String {
    "Hourbook".to_string()
}

fn default_weekly_template() -> String {
    "weekly-progress".to_string()
}

fn default_almost_expired_template() -> String {
    "trial-almost-expired".to_string()
}

fn default_expired_template() -> String {
    "trial-expired".to_string()
}

/// Trial lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialConfig {
    /// Warn this many days before the trial ends.
    #[serde(default = "default_warning_days")]
    pub warning_days: i64,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            warning_days: default_warning_days(),
        }
    }
}

fn default_warning_days() -> i64 {
    3
}

/// Weekly report settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Number of weeks shown in the hours chart (0 shows all).
    #[serde(default = "default_chart_weeks")]
    pub chart_weeks: usize,

    /// Include archived projects in the report.
    #[serde(default)]
    pub include_archived: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            chart_weeks: default_chart_weeks(),
            include_archived: false,
        }
    }
}

fn default_chart_weeks() -> usize {
    8
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments (and their env fallbacks) take precedence over config
    /// file settings, but only when they were actually provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data) = args.data {
            self.general.data_file = data.display().to_string();
        }

        if let Some(ref providers) = args.providers {
            self.general.providers = providers.clone();
        }

        // Secrets
        if let Some(ref client_id) = args.harvest_client_id {
            self.harvest.client_id = client_id.clone();
        }
        if let Some(ref client_secret) = args.harvest_client_secret {
            self.harvest.client_secret = client_secret.clone();
        }
        if let Some(ref api_key) = args.sendgrid_api_key {
            self.email.api_key = api_key.clone();
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.data_file, "hourbook.json");
        assert_eq!(config.trial.warning_days, 3);
        assert_eq!(config.report.chart_weeks, 8);
        assert_eq!(config.harvest.lookback_weeks, 52);
        assert!(config.general.providers.contains(&ProviderKind::Toggl));
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
data_file = "/var/lib/hourbook/data.json"
providers = ["harvest"]

[harvest]
client_id = "abc"
refresh_after_hours = 48

[email]
from_email = "andrew@example.com"
weekly_progress_template = "d-weekly"

[report]
chart_weeks = 12
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.data_file, "/var/lib/hourbook/data.json");
        assert_eq!(config.general.providers, vec![ProviderKind::Harvest]);
        assert_eq!(config.harvest.client_id, "abc");
        assert_eq!(config.harvest.refresh_after_hours, 48);
        assert_eq!(config.harvest.api_url, "https://api.harvestapp.com/v2");
        assert_eq!(config.email.from_email, "andrew@example.com");
        assert_eq!(config.email.reply_to, "team@hourbook.app");
        assert_eq!(config.email.weekly_progress_template, "d-weekly");
        assert_eq!(config.report.chart_weeks, 12);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[trial]\nwarning_days = 5\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.trial.warning_days, 5);
        assert_eq!(config.report.chart_weeks, 8);

        assert!(Config::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[harvest]"));
        assert!(toml_str.contains("[email]"));
        assert!(!toml_str.contains("api_key"));
    }
}
