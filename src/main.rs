use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use chrono::Utc;
use clap::Parser;
use usage_reports::{
    chart::BitmapChartRenderer,
    config::{self, ReportsConfig},
    db::postgres::PostgresUsageSource,
    directory::LdapDirectory,
    jobs::UsageReportJob,
    mail::SmtpTransport,
    observability,
    services::RecipientFilter,
};

const DEFAULT_CONFIG_PATH: &str = "usage-reports.toml";

/// CLI arguments for the usage report job
#[derive(Parser, Debug)]
#[command(version, about = "Monthly storage usage reports", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./usage-reports.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Build and send this month's reports (default)
    Run {
        /// Directory of opt-out lists (overrides report.exclusion_dir)
        #[arg(long)]
        exclusion_dir: Option<PathBuf>,
        /// Assemble reports and log them without sending any mail
        #[arg(long)]
        dry_run: bool,
    },
    /// Initialize a new configuration file
    Init {
        /// Path to create the config file (defaults to ./usage-reports.toml)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    match args.command {
        Some(Command::Init { output, force }) => run_init(output.or(args.config), force),
        Some(Command::Run {
            exclusion_dir,
            dry_run,
        }) => run_reports(args.config, exclusion_dir, dry_run).await,
        None => run_reports(args.config, None, false).await,
    }
}

/// Write the default configuration file.
fn run_init(output: Option<PathBuf>, force: bool) -> ExitCode {
    let output_path = output.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        return ExitCode::FAILURE;
    }

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        return ExitCode::FAILURE;
    }

    if let Err(e) = std::fs::write(&output_path, config::default_config_toml()) {
        eprintln!("Failed to write config file: {}", e);
        return ExitCode::FAILURE;
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("Set USAGE_DB_PASSWORD and LDAP_PASSWORD, then preview with:");
    println!("  usage-reports run --dry-run --config {}", output_path.display());
    ExitCode::SUCCESS
}

fn load_config(path: &Path) -> Option<ReportsConfig> {
    match ReportsConfig::from_file(path) {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            None
        }
    }
}

/// Run the report job once.
async fn run_reports(
    config_path: Option<PathBuf>,
    exclusion_dir: Option<PathBuf>,
    dry_run: bool,
) -> ExitCode {
    let config_path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let Some(mut config) = load_config(&config_path) else {
        return ExitCode::FAILURE;
    };
    if dry_run {
        config.mail.dry_run = true;
    }

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let filter =
        match RecipientFilter::from_config(&config.mail, &config.report, exclusion_dir.as_deref())
        {
            Ok(filter) => filter,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load exclusion lists");
                return ExitCode::FAILURE;
            }
        };

    let renderer = match BitmapChartRenderer::from_config(&config.report.chart) {
        Ok(renderer) => renderer,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize chart renderer");
            return ExitCode::FAILURE;
        }
    };

    let job = UsageReportJob::new(
        &config,
        Arc::new(PostgresUsageSource::new(config.database.clone())),
        Arc::new(LdapDirectory::new(config.directory.clone())),
        Arc::new(SmtpTransport::from_config(&config.mail)),
        Arc::new(renderer),
        filter,
    );

    match job.run(Utc::now()).await {
        Ok(summary) => {
            if summary.has_failures() && !summary.admin_notified && !config.mail.dry_run {
                tracing::warn!("Run finished with failures and the administrative summary was not delivered");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Usage report run aborted");
            ExitCode::FAILURE
        }
    }
}
