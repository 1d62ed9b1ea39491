//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::providers::ProviderKind;
use clap::Parser;
use std::path::PathBuf;

/// Hourbook - estimated vs. actual hours, imported and reported
///
/// Runs the periodic jobs of the hours tracker against a JSON data store.
/// Each job is meant to be triggered by cron at most once per interval.
///
/// Examples:
///   hourbook refresh-tokens
///   hourbook import-hours --data /var/lib/hourbook/data.json
///   hourbook weekly-progress --dry-run --output preview.md
///   hourbook --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Job to run
    #[arg(value_enum, required_unless_present = "init_config")]
    pub job: Option<Job>,

    /// Path to the JSON data store
    ///
    /// Overrides `general.data_file` from the config file.
    #[arg(short, long, value_name = "FILE", env = "HOURBOOK_DATA")]
    pub data: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for hourbook.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Providers to import from (comma-separated)
    ///
    /// Example: --providers harvest,toggl
    #[arg(long, value_name = "PROVIDERS", value_delimiter = ',')]
    pub providers: Option<Vec<ProviderKind>>,

    /// Harvest OAuth client id
    #[arg(long, env = "HARVEST_CLIENT_ID", hide_env_values = true)]
    pub harvest_client_id: Option<String>,

    /// Harvest OAuth client secret
    #[arg(long, env = "HARVEST_CLIENT_SECRET", hide_env_values = true)]
    pub harvest_client_secret: Option<String>,

    /// SendGrid API key
    #[arg(long, env = "SENDGRID_API_KEY", hide_env_values = true)]
    pub sendgrid_api_key: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: log emails instead of sending them and leave the store untouched
    #[arg(long)]
    pub dry_run: bool,

    /// Also write the weekly reports to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Format for --output (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Generate a default hourbook.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// The scheduler entrypoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Job {
    /// Refresh stale Harvest OAuth tokens
    RefreshTokens,
    /// Warn about and end expiring trials
    ExpireTrials,
    /// Import actual hours from Harvest and Toggl
    ImportHours,
    /// Record weekly history and email progress reports
    WeeklyProgress,
    /// Run every job in order
    All,
}

/// Output format for the report preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Job {
    /// Whether the job delivers email.
    pub fn sends_email(self) -> bool {
        matches!(self, Job::ExpireTrials | Job::WeeklyProgress | Job::All)
    }

    /// Whether this run includes `other`.
    pub fn includes(self, other: Job) -> bool {
        self == Job::All || self == other
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref providers) = self.providers {
            if providers.is_empty() {
                return Err("At least one provider must be given to --providers".to_string());
            }
        }

        if self.output.is_some() && !matches!(self.job, Some(Job::WeeklyProgress | Job::All)) {
            return Err("--output only applies to the weekly-progress job".to_string());
        }

        if let Some(ref data) = self.data {
            if data.is_dir() {
                return Err(format!("Data path is a directory: {}", data.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            job: Some(Job::ImportHours),
            data: None,
            config: None,
            providers: None,
            harvest_client_id: None,
            harvest_client_secret: None,
            sendgrid_api_key: None,
            verbose: false,
            quiet: false,
            dry_run: false,
            output: None,
            format: OutputFormat::Markdown,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_job_and_providers() {
        let args = Args::try_parse_from([
            "hourbook",
            "weekly-progress",
            "--providers",
            "harvest,toggl",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(args.job, Some(Job::WeeklyProgress));
        assert_eq!(
            args.providers,
            Some(vec![ProviderKind::Harvest, ProviderKind::Toggl])
        );
        assert!(args.dry_run);
    }

    #[test]
    fn test_job_required_without_init_config() {
        assert!(Args::try_parse_from(["hourbook"]).is_err());
        assert!(Args::try_parse_from(["hourbook", "--init-config"]).is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_output_needs_weekly_job() {
        let mut args = make_args();
        args.output = Some(PathBuf::from("preview.md"));
        assert!(args.validate().is_err());

        args.job = Some(Job::WeeklyProgress);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_job_selection() {
        assert!(Job::All.includes(Job::ImportHours));
        assert!(Job::ImportHours.includes(Job::ImportHours));
        assert!(!Job::ImportHours.includes(Job::WeeklyProgress));

        assert!(Job::ExpireTrials.sends_email());
        assert!(!Job::RefreshTokens.sends_email());
        assert!(!Job::ImportHours.sends_email());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
