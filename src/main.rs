use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

// Use library instead of local modules
use customer_warehouse::{
    completeness, init_logging, load_csv, recent_batches, run_batch, setup_warehouse,
    LoaderConfig,
};

#[derive(Parser)]
#[command(name = "customer-warehouse", version, about = "Reconcile enriched customers into the warehouse")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the warehouse tables
    Init {
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Load one CSV of enriched customers as a single batch
    Load {
        csv: PathBuf,

        #[arg(long)]
        db: Option<PathBuf>,

        /// TOML loader config
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the batch result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Completeness metrics and recent batches
    Report {
        #[arg(long)]
        db: Option<PathBuf>,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() -> ExitCode {
    init_logging();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Init { db } => {
            let config = resolve_config(None, db)?;
            run_init(&config.database_path)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Load { csv, db, config, json } => {
            let config = resolve_config(config.as_deref(), db)?;
            run_load(&config, &csv, json)
        }
        Command::Report { db, limit } => {
            let config = resolve_config(None, db)?;
            run_report(&config.database_path, limit)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// File (if any) < WAREHOUSE_DB < --db
fn resolve_config(file: Option<&Path>, db: Option<PathBuf>) -> Result<LoaderConfig> {
    let mut config = match file {
        Some(path) => LoaderConfig::from_file(path)?,
        None => LoaderConfig::default(),
    }
    .with_env_overrides();

    if let Some(db) = db {
        config.database_path = db;
    }

    Ok(config)
}

fn run_init(db_path: &Path) -> Result<()> {
    println!("🔧 Creating warehouse tables...");
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    setup_warehouse(&conn).context("Failed to create warehouse tables")?;
    println!("✓ customer_enriched (main data table)");
    println!("✓ enrichment_audit (processing audit trail)");
    Ok(())
}

fn run_load(config: &LoaderConfig, csv_path: &Path, json: bool) -> Result<ExitCode> {
    println!("📂 Loading CSV...");
    let records = load_csv(csv_path)?;
    println!("✓ Loaded {} customer records", records.len());

    let result = run_batch(config, &records)
        .with_context(|| format!("Failed to open warehouse {}", config.database_path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        println!("Batch ID:           {}", result.batch_id);
        println!("Total records:      {}", result.total_records);
        println!("Successful inserts: {}", result.successful_inserts);
        println!("Successful updates: {}", result.successful_updates);
        println!("Failed records:     {}", result.failed_records);
        println!("Processing time:    {:.2} seconds", result.processing_time);

        if !result.errors.is_empty() {
            println!("\nErrors encountered:");
            for error in &result.errors {
                println!("  ⚠️  {}", error);
            }
        }
        for warning in &result.warnings {
            println!("  ⚠️  {}", warning);
        }
    }

    if result.committed {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("❌ Batch was not committed");
        Ok(ExitCode::FAILURE)
    }
}

fn run_report(db_path: &Path, limit: usize) -> Result<()> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;

    let report = completeness(&conn)?;
    println!("✅ {}", report.summary());

    println!("\n✅ Recent Processing Batches:");
    for entry in recent_batches(&conn, limit)? {
        println!("   {}", entry.summary());
    }

    Ok(())
}
