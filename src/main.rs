//! Hourbook - estimated vs. actual hours for client projects
//!
//! Batch jobs for an hours tracker: refresh Harvest tokens, end expired
//! trials, import actual hours from Harvest and Toggl, and email weekly
//! progress reports. Meant to be run from cron.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, data file, provider setup, email delivery)

mod analysis;
mod cli;
mod config;
mod email;
mod jobs;
mod models;
mod providers;
mod report;
mod store;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cli::{Args, Job, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use email::{LogMailer, Mailer, SendGridMailer};
use jobs::ImportStats;
use providers::{HarvestProvider, ProviderKind, TogglProvider};
use report::WeeklyReport;
use std::path::{Path, PathBuf};
use std::time::Instant;
use store::Store;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("Hourbook v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Job failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default hourbook.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to set providers, email templates and trial windows.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the requested job against the data file. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    let Some(job) = args.job else {
        anyhow::bail!("No job given");
    };

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    // Load the data file
    let data_path = PathBuf::from(&config.general.data_file);
    let mut store = Store::load(&data_path)?;
    info!(
        "Loaded {} users, {} teams, {} projects from {}",
        store.users.len(),
        store.teams.len(),
        store.projects.len(),
        data_path.display()
    );

    let now = Utc::now();
    let show_progress = !args.quiet;

    let outcome = if args.dry_run || !job.sends_email() {
        if args.dry_run {
            println!("🔍 Dry run: emails are logged, the data file is left untouched.");
        }
        run_job(job, &mut store, &config, &LogMailer, now, show_progress).await
    } else {
        let mailer = SendGridMailer::new(config.email.clone())
            .context("Email delivery is not configured")?;
        run_job(job, &mut store, &config, &mailer, now, show_progress).await
    };

    // Changes made before a failure are saved too.
    if args.dry_run {
        debug!("Dry run, not saving {}", data_path.display());
    } else {
        store.notifications.purge(now);
        store.save(&data_path)?;
        info!("Saved {}", data_path.display());
    }

    let reports = outcome?;

    // Write the report preview
    if let Some(ref output_path) = args.output {
        let output = match args.format {
            OutputFormat::Json => report::generate_json_report(&reports)?,
            OutputFormat::Markdown => report::generate_markdown_report(&reports),
        };

        std::fs::write(output_path, &output)
            .with_context(|| format!("Failed to write reports to {}", output_path.display()))?;
        println!("📝 Reports written to: {}", output_path.display());
    }

    println!(
        "\n✅ {:?} finished in {:.1}s",
        job,
        start_time.elapsed().as_secs_f64()
    );

    Ok(0)
}

/// Run one job, or every job in order for `Job::All`.
///
/// Returns the weekly reports that were sent, if the weekly job ran.
async fn run_job<M: Mailer>(
    job: Job,
    store: &mut Store,
    config: &Config,
    mailer: &M,
    now: DateTime<Utc>,
    show_progress: bool,
) -> Result<Vec<WeeklyReport>> {
    let mut reports = Vec::new();

    if job.includes(Job::RefreshTokens) {
        println!("🔑 Refreshing Harvest tokens...");
        let harvest = HarvestProvider::new(config.harvest.clone())?;
        let stats = jobs::refresh_provider_tokens(store, &harvest, now).await;
        println!(
            "   {} refreshed | {} still fresh | {} cleared",
            stats.refreshed, stats.fresh, stats.cleared
        );
    }

    if job.includes(Job::ExpireTrials) {
        println!("⏳ Checking trials...");
        let stats = jobs::expire_trials(store, config, mailer, now).await?;
        println!("   {} warned | {} expired", stats.warned, stats.expired);
    }

    if job.includes(Job::ImportHours) {
        println!("📥 Importing actual hours...");
        let stats = import_hours(store, config, now, show_progress).await?;
        println!(
            "   {} projects updated | {} skipped | {} failed",
            stats.updated, stats.skipped, stats.failed
        );
    }

    if job.includes(Job::WeeklyProgress) {
        println!("📊 Sending weekly progress reports...");
        reports = jobs::send_weekly_progress_reports(store, config, mailer, now).await?;
        println!("   {} reports sent", reports.len());
    }

    Ok(reports)
}

/// Import from every configured provider in turn.
async fn import_hours(
    store: &mut Store,
    config: &Config,
    now: DateTime<Utc>,
    show_progress: bool,
) -> Result<ImportStats> {
    let mut total = ImportStats::default();

    for kind in &config.general.providers {
        let stats = match kind {
            ProviderKind::Harvest => {
                let provider = HarvestProvider::new(config.harvest.clone())?;
                jobs::import_actual_hours(store, &provider, now, show_progress).await
            }
            ProviderKind::Toggl => {
                let provider = TogglProvider::new(config.toggl.clone())?;
                jobs::import_actual_hours(store, &provider, now, show_progress).await
            }
        };
        total.add(stats);
    }

    Ok(total)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
