use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use api_ingress::ApiIngress;
use axum::Router;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use db::{ConnectOpts, DbHandle};
use membership::model::{BillingRunReport, RunOutcome};
use membership::Membership;
use mimalloc::MiMalloc;
use runtime::{AppConfig, AppConfigProvider, Overrides};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

mod shutdown;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Membership Server - consent gating and monthly invoicing
#[derive(Parser)]
#[command(name = "membership-server")]
#[command(about = "Membership Server - consent gating and monthly invoicing")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use an in-memory database
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Check configuration
    Check,
    /// Run monthly invoicing once and print the report as JSON
    GenerateInvoices {
        /// Run date (YYYY-MM-DD); defaults to today on the display calendar
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_overrides(&Overrides {
        port: cli.port,
        verbose: cli.verbose,
        mock: cli.mock,
    });

    let logging_config = config.logging.as_ref().cloned().unwrap_or_default();
    runtime::logging::init_logging_from_config(&logging_config, Path::new(&config.server.home_dir));
    tracing::info!(home_dir = %config.server.home_dir, "Membership Server starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config).await,
        Commands::Check => check_config(config),
        Commands::GenerateInvoices { date } => generate_invoices(config, date).await,
    }
}

/// Open the configured database; relative SQLite paths resolve under `home_dir`.
async fn connect_db(config: &AppConfig) -> Result<DbHandle> {
    let db_config = config
        .database
        .as_ref()
        .ok_or_else(|| anyhow!("Database configuration is required (set `database.url` or pass --mock)"))?;

    let raw = db_config.url.trim();
    if raw.is_empty() {
        return Err(anyhow!("Database URL not configured"));
    }
    let dsn = db::absolutize_sqlite_dsn(raw, Path::new(&config.server.home_dir))?;

    let opts = ConnectOpts {
        max_conns: db_config.max_conns,
        acquire_timeout: Some(Duration::from_secs(5)),
        sqlite_busy_timeout: db_config
            .busy_timeout_ms
            .map(|ms| Duration::from_millis(u64::from(ms))),
        create_sqlite_dirs: true,
    };

    tracing::info!("Connecting to database: {}", dsn);
    Ok(DbHandle::connect(&dsn, opts).await?)
}

async fn run_server(config: AppConfig) -> Result<()> {
    tracing::info!("Initializing modules...");
    let provider = AppConfigProvider::new(config.clone());

    let db = connect_db(&config).await?;
    let membership = Membership::init(&provider, &db).await?;

    let mut ingress = ApiIngress::from_provider(&provider)?;
    if config.server.timeout_sec > 0 {
        ingress = ingress.with_request_timeout(config.server.timeout_sec);
    }

    let router = ingress.build_router(membership.register_rest(Router::new()), Membership::openapi());
    let addr = ingress.resolve_bind_addr(&config.bind_addr())?;

    let cancel = CancellationToken::new();
    shutdown::cancel_on_signal(cancel.clone());

    let served = ingress.serve(addr, router, cancel).await;
    db.close().await;
    tracing::info!("Membership Server stopped");
    served
}

fn check_config(config: AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    let provider = AppConfigProvider::new(config.clone());

    let ingress = ApiIngress::from_provider(&provider)?;
    ingress.resolve_bind_addr(&config.bind_addr())?;
    Membership::validate_config(&provider)?;
    if let Some(db_config) = &config.database {
        db::absolutize_sqlite_dsn(db_config.url.trim(), Path::new(&config.server.home_dir))?;
    }

    tracing::info!("Configuration is valid");
    println!("Configuration check passed");
    println!("{}", config.to_yaml()?);
    Ok(())
}

async fn generate_invoices(config: AppConfig, date: Option<NaiveDate>) -> Result<()> {
    let provider = AppConfigProvider::new(config.clone());
    let db = connect_db(&config).await?;
    let membership = Membership::init(&provider, &db).await?;

    let client = membership.client();
    let run_date = date.unwrap_or_else(|| client.today());
    tracing::info!(%run_date, "Running monthly invoicing");

    let report = client.run_monthly_billing(run_date).await;
    db.close().await;
    let report = report.map_err(|e| anyhow!("monthly invoicing failed: {e}"))?;

    println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
    Ok(())
}

fn report_json(report: &BillingRunReport) -> Value {
    let results: Vec<Value> = report
        .results
        .iter()
        .map(|r| match &r.outcome {
            RunOutcome::Created { invoice_number } => {
                json!({ "userId": r.user_id, "status": "created", "invoiceNumber": invoice_number })
            }
            RunOutcome::Skipped(reason) => {
                json!({ "userId": r.user_id, "status": "skipped", "reason": reason.as_str() })
            }
            RunOutcome::Failed { error } => {
                json!({ "userId": r.user_id, "status": "failed", "error": error })
            }
        })
        .collect();

    json!({
        "runDate": report.run_date.to_string(),
        "results": results,
        "overdueMarked": report.overdue_marked,
    })
}
