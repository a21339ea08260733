//! mssql-pg-catalog CLI - catalog-driven MSSQL to PostgreSQL table migration.

use clap::{Parser, Subcommand};
use mssql_pg_catalog::{
    plan_table, reset_table, CatalogStore, Config, MappingSettings, MemoryCatalog, MigrateError,
    MigrationOutcome, MigrationSettings, MssqlSource, PgCatalog, PgTarget, SourceDatabase,
    TableMigrator, TargetDatabase,
};
use serde_json::json;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "mssql-pg-catalog")]
#[command(about = "Catalog-driven MSSQL to PostgreSQL table migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate one or more tables recorded in the catalog
    Migrate {
        /// Table to migrate as schema.name (repeatable)
        #[arg(long = "table", required = true)]
        tables: Vec<String>,

        /// Re-run tables that are completed, failed or stuck in progress
        #[arg(long)]
        force: bool,
    },

    /// Print the DDL plan for a table without executing anything
    Plan {
        /// Table to plan as schema.name
        #[arg(long)]
        table: String,

        /// Read the catalog from a JSON snapshot instead of the database
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Reset a table's migration status to pending
    Reset {
        /// Table to reset as schema.name
        #[arg(long)]
        table: String,
    },

    /// Report indexes whose stored table differs from their lineage
    CheckLineage,

    /// Test catalog, source and target connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    match cli.command {
        Commands::Migrate { ref tables, force } => {
            let targets = tables
                .iter()
                .map(|t| split_table(t))
                .collect::<Result<Vec<_>, _>>()?;
            let config = load_config(&cli.config)?;
            let migrator = TableMigrator::connect(&config).await?;

            let mut outcomes = Vec::with_capacity(targets.len());
            for (schema, name) in targets {
                outcomes.push(migrate_one(&migrator, &schema, &name, force).await);
            }
            let failed = outcomes.iter().filter(|o| !o.success).count();

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&outcomes)?);
            } else {
                println!("\nMigration finished:");
                for outcome in &outcomes {
                    let state = if outcome.skipped {
                        "SKIPPED"
                    } else if outcome.success {
                        "OK"
                    } else {
                        "FAILED"
                    };
                    println!(
                        "  {:<8} {} ({} rows, {:.2}s)",
                        state,
                        outcome.table,
                        outcome.rows_migrated,
                        outcome.duration.as_secs_f64()
                    );
                    if let Some(ref err) = outcome.error {
                        println!("           {}", err);
                    }
                }
                println!("  Tables: {}/{}", outcomes.len() - failed, outcomes.len());
            }

            if failed > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Plan {
            ref table,
            ref snapshot,
        } => {
            let (schema, name) = split_table(table)?;
            let plan = match snapshot {
                Some(path) => {
                    let catalog = MemoryCatalog::load(path)?;
                    info!("Loaded catalog snapshot from {:?}", path);
                    let (settings, mapping) = optional_settings(&cli.config)?;
                    plan_table(&catalog, &schema, &name, &settings, &mapping).await?
                }
                None => {
                    let config = load_config(&cli.config)?;
                    let catalog = PgCatalog::connect(&config.catalog).await?;
                    plan_table(&catalog, &schema, &name, &config.migration, &config.mapping)
                        .await?
                }
            };

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!("-- Plan for {} ({})", plan.qualified_name, plan.status);
                for issue in &plan.issues {
                    println!("-- issue: {}", issue);
                }
                for problem in &plan.problems {
                    println!("-- problem: {}", problem);
                }
                for statement in &plan.statements {
                    println!("{};\n", statement);
                }
            }
        }

        Commands::Reset { ref table } => {
            let (schema, name) = split_table(table)?;
            let config = load_config(&cli.config)?;
            let catalog = PgCatalog::connect(&config.catalog).await?;
            let update = reset_table(&catalog, &schema, &name).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&update)?);
            } else {
                println!("{}.{} reset to {}", schema, name, update.status);
            }
        }

        Commands::CheckLineage => {
            let config = load_config(&cli.config)?;
            let catalog = PgCatalog::connect(&config.catalog).await?;
            let drift = catalog.index_lineage_drift().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&drift)?);
            } else if drift.is_empty() {
                println!("Index lineage is consistent");
            } else {
                println!("Index lineage drift:");
                for d in &drift {
                    println!(
                        "  {} (id {}): stored table {}, lineage table {}",
                        d.index_name,
                        d.index_id,
                        display_id(d.stored_table_id),
                        display_id(d.lineage_table_id)
                    );
                }
            }
            if !drift.is_empty() {
                warn!("{} index rows disagree with their lineage", drift.len());
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::HealthCheck => {
            let config = load_config(&cli.config)?;
            let checks = vec![
                probe("catalog", config.catalog.label(), async {
                    PgCatalog::connect(&config.catalog).await?.ping().await
                })
                .await,
                probe("source", config.source.label(), async {
                    MssqlSource::connect(&config.source).await?.ping().await
                })
                .await,
                probe("target", config.target.label(), async {
                    PgTarget::connect(&config.target).await?.ping().await
                })
                .await,
            ];
            let healthy = checks.iter().all(|c| c.error.is_none());

            if cli.output_json {
                let report: Vec<_> = checks
                    .iter()
                    .map(|c| {
                        json!({
                            "name": c.name,
                            "endpoint": c.endpoint,
                            "connected": c.error.is_none(),
                            "latency_ms": c.latency_ms,
                            "error": c.error,
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "healthy": healthy, "checks": report }))?
                );
            } else {
                println!("Health Check Results:");
                for c in &checks {
                    println!(
                        "  {:<8} {}: {} ({}ms)",
                        c.name,
                        c.endpoint,
                        if c.error.is_none() { "OK" } else { "FAILED" },
                        c.latency_ms
                    );
                    if let Some(ref err) = c.error {
                        println!("    Error: {}", err);
                    }
                }
                println!(
                    "\n  Overall: {}",
                    if healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !healthy {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Migrate one table; errors become a failed outcome so the batch continues.
async fn migrate_one(
    migrator: &TableMigrator,
    schema: &str,
    name: &str,
    force: bool,
) -> MigrationOutcome {
    let started = Instant::now();
    match migrator.migrate(schema, name, force).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{}.{}: {}", schema, name, e);
            MigrationOutcome::failed(format!("{}.{}", schema, name), started, e.to_string(), None)
        }
    }
}

struct Check {
    name: &'static str,
    endpoint: String,
    latency_ms: u128,
    error: Option<String>,
}

async fn probe<F>(name: &'static str, endpoint: String, check: F) -> Check
where
    F: Future<Output = Result<(), MigrateError>>,
{
    let started = Instant::now();
    let error = check.await.err().map(|e| e.to_string());
    Check {
        name,
        endpoint,
        latency_ms: started.elapsed().as_millis(),
        error,
    }
}

fn load_config(path: &Path) -> Result<Config, MigrateError> {
    if !path.exists() {
        return Err(MigrateError::Config(format!(
            "configuration file not found: {}",
            path.display()
        )));
    }
    let config = Config::load(path)?;
    info!("Loaded configuration from {:?}", path);
    Ok(config)
}

/// Settings for offline planning; defaults when no config file is present.
fn optional_settings(path: &Path) -> Result<(MigrationSettings, MappingSettings), MigrateError> {
    if path.exists() {
        let config = load_config(path)?;
        Ok((config.migration, config.mapping))
    } else {
        Ok((MigrationSettings::default(), MappingSettings::default()))
    }
}

fn split_table(arg: &str) -> Result<(String, String), MigrateError> {
    match arg.split_once('.') {
        Some((schema, name)) if !schema.is_empty() && !name.is_empty() => {
            Ok((schema.to_string(), name.to_string()))
        }
        _ => Err(MigrateError::Config(format!(
            "table must be given as schema.name, got '{}'",
            arg
        ))),
    }
}

fn display_id(id: Option<i64>) -> String {
    id.map(|i| i.to_string()).unwrap_or_else(|| "none".to_string())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json stays parseable.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
