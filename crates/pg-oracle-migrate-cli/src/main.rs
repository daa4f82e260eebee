//! pg-oracle-migrate CLI - PostgreSQL/Oracle to Oracle migration.

use clap::{Parser, Subcommand};
use pg_oracle_migrate::script::{self, RunOptions};
use pg_oracle_migrate::{Config, MigrateError, Orchestrator, OracleWriter, Phase, ProfileStore};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "pg-oracle-migrate")]
#[command(about = "PostgreSQL/Oracle to Oracle schema and data migration")]
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
    /// Run migration phases
    Run {
        /// Phase to run: schema, data, sequences, keys, legacy, indexes or all
        #[arg(long, default_value = "all")]
        phase: String,

        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override source schema
        #[arg(long)]
        source_schema: Option<String>,

        /// Override target schema
        #[arg(long)]
        target_schema: Option<String>,
    },

    /// Execute a slash-separated SQL/PL-SQL script against an Oracle profile
    Script {
        /// Script file
        file: PathBuf,

        /// List the blocks without connecting
        #[arg(long)]
        dry_run: bool,

        /// Keep going after a failed block (the run still rolls back)
        #[arg(long)]
        continue_on_error: bool,

        /// Connection profile name [default: the store's default profile]
        #[arg(long)]
        profile: Option<String>,
    },

    /// Print the resolved table copy order
    Order,

    /// Validate row counts between source and target
    Validate,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

/// Returns `Ok(false)` when the command ran but reported errors.
async fn run() -> Result<bool, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    // Scripts connect through a profile and need no run configuration.
    if let Commands::Script {
        file,
        dry_run,
        continue_on_error,
        profile,
    } = &cli.command
    {
        let opts = RunOptions {
            continue_on_error: *continue_on_error,
            dry_run: *dry_run,
        };
        return run_script(file, opts, profile.as_deref(), cli.output_json).await;
    }

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Script { .. } => unreachable!(), // Handled above
        Commands::Run {
            phase,
            batch_size,
            source_schema,
            target_schema,
        } => {
            let phase: Phase = phase.parse()?;

            // Apply overrides
            if let Some(schema) = source_schema {
                config.source.schema = Some(schema);
            }
            if let Some(schema) = target_schema {
                config.target.schema = Some(schema);
            }
            if let Some(n) = batch_size {
                config.migration.batch_size = n;
            }
            config.validate()?;

            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.run(phase).await;
            orchestrator.close().await;
            let result = result?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\n{}", result.render_text());
            }
            Ok(result.is_success())
        }

        Commands::Order => {
            let orchestrator = Orchestrator::new(config).await?;
            let plan = orchestrator.resolve_order().await;
            orchestrator.close().await;
            let plan = plan?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!("Copy order ({} tables):", plan.order.len());
                for (i, table) in plan.order.tables.iter().enumerate() {
                    println!("  {:>3}. {}", i + 1, table);
                }
                if !plan.order.missing.is_empty() {
                    println!("\nListed but not in source: {}", plan.order.missing.join(", "));
                }
                if !plan.order.skipped.is_empty() {
                    println!("Not in the order, skipped: {}", plan.order.skipped.join(", "));
                }
                if !plan.order.cyclic.is_empty() {
                    println!("On a foreign-key cycle: {}", plan.order.cyclic.join(", "));
                }
                if !plan.violations.is_empty() {
                    println!("\nForeign-key violations:");
                    for v in &plan.violations {
                        println!("  {}", v);
                    }
                }
            }
            Ok(plan.violations.is_empty())
        }

        Commands::Validate => {
            let orchestrator = Orchestrator::new(config).await?;
            let report = orchestrator.validate().await;
            orchestrator.close().await;
            let report = report?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.render_text());
            }
            Ok(report.is_success())
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await?;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source ({}): {} ({}ms)",
                    result.source_type,
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (oracle): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            Ok(result.healthy)
        }
    }
}

async fn run_script(
    file: &Path,
    opts: RunOptions,
    profile: Option<&str>,
    output_json: bool,
) -> Result<bool, MigrateError> {
    let text = std::fs::read_to_string(file)?;
    let blocks = script::parse(&text);
    info!("Parsed {} blocks from {:?}", blocks.len(), file);

    let report = if opts.dry_run {
        script::dry_run(&blocks)
    } else {
        let store = ProfileStore::load_default()?;
        let params = store.get(profile)?.connect_params()?;
        let session = OracleWriter::new(&params).await?;
        let report = script::execute(&session, &blocks, opts).await;
        pg_oracle_migrate::TargetWriter::close(&session).await;
        report?
    };

    if output_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.render_text());
    }
    Ok(report.is_success())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

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

    Ok(())
}
