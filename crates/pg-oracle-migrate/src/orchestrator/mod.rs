//! Migration orchestrator - phase sequencing.
//!
//! A full run is: schema, data, sequences, keys, legacy-id drop, indexes.
//! Each phase folds its units into a [`PhaseSummary`]; only phase-fatal
//! errors (connection or catalog failures) end the run early.

use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::{Config, OrderMode};
use crate::core::schema::Table;
use crate::core::traits::{SourceReader, TargetWriter};
use crate::ddl;
use crate::drivers::{create_reader, create_writer};
use crate::error::{MigrateError, Result};
use crate::keys::KeyMigrator;
use crate::order::{check_order, OrderViolation, TableOrder};
use crate::report::{render_phase, DataReport, PhaseSummary, UnitOutcome};
use crate::sequence;
use crate::transfer::{TransferConfig, TransferEngine};

/// A migration phase, or `All` for the full sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Schema,
    Data,
    Sequences,
    Keys,
    Legacy,
    Indexes,
    All,
}

impl Phase {
    /// The concrete phases this selection runs, in order.
    pub fn steps(self) -> &'static [Phase] {
        const ALL: &[Phase] = &[
            Phase::Schema,
            Phase::Data,
            Phase::Sequences,
            Phase::Keys,
            Phase::Legacy,
            Phase::Indexes,
        ];
        match self {
            Phase::All => ALL,
            Phase::Schema => &ALL[0..1],
            Phase::Data => &ALL[1..2],
            Phase::Sequences => &ALL[2..3],
            Phase::Keys => &ALL[3..4],
            Phase::Legacy => &ALL[4..5],
            Phase::Indexes => &ALL[5..6],
        }
    }

    /// Whether the phase works on the source table list.
    fn needs_tables(self) -> bool {
        matches!(self, Phase::Schema | Phase::Data)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Phase::Schema => "schema",
            Phase::Data => "data",
            Phase::Sequences => "sequences",
            Phase::Keys => "keys",
            Phase::Legacy => "legacy",
            Phase::Indexes => "indexes",
            Phase::All => "all",
        })
    }
}

impl FromStr for Phase {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "schema" => Ok(Phase::Schema),
            "data" => Ok(Phase::Data),
            "sequences" => Ok(Phase::Sequences),
            "keys" => Ok(Phase::Keys),
            "legacy" | "legacy-ids" => Ok(Phase::Legacy),
            "indexes" => Ok(Phase::Indexes),
            "all" => Ok(Phase::All),
            other => Err(MigrateError::Config(format!(
                "Unknown phase '{}'. Expected schema, data, sequences, keys, legacy, indexes or all",
                other
            ))),
        }
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Requested phase.
    pub phase: Phase,

    /// Final status: "completed" or "completed_with_errors".
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    pub source_schema: String,
    pub target_schema: String,

    /// Tables in copy order.
    pub table_order: Vec<String>,

    /// Total rows committed on the target.
    pub rows_transferred: i64,

    /// Per-table copy statistics, present when the data phase ran.
    pub data: Option<DataReport>,

    /// Per-unit outcomes of every other phase, in run order.
    pub phases: Vec<PhaseSummary>,
}

impl MigrationResult {
    /// True when no unit of any phase failed and every row arrived.
    pub fn is_success(&self) -> bool {
        self.data.as_ref().map_or(true, |d| d.is_success())
            && self.phases.iter().all(|p| !p.has_failures())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Text report: each phase summary, then the data table.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for phase in &self.phases {
            out.push_str(&render_phase(phase));
            out.push('\n');
        }
        if let Some(data) = &self.data {
            out.push_str(&data.render_text());
        }
        let _ = writeln!(
            out,
            "Run {} ({}) finished in {:.2}s: {}",
            self.run_id, self.phase, self.duration_seconds, self.status
        );
        out
    }
}

/// Source and target row counts for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountCheck {
    pub table: String,
    pub source_count: i64,
    /// `None` when the target table could not be counted.
    pub target_count: Option<i64>,
}

impl CountCheck {
    pub fn matches(&self) -> bool {
        self.target_count == Some(self.source_count)
    }
}

/// Row-count comparison over every table in copy order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub tables: Vec<CountCheck>,
}

impl ValidationReport {
    pub fn mismatches(&self) -> usize {
        self.tables.iter().filter(|t| !t.matches()).count()
    }

    pub fn is_success(&self) -> bool {
        self.mismatches() == 0
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<26} | {:>8} | {:>8} | Status", "Table Name", "Source", "Target");
        let _ = writeln!(out, "{}", "-".repeat(60));
        for t in &self.tables {
            let target = t
                .target_count
                .map_or_else(|| "-".to_string(), |c| c.to_string());
            let status = if t.matches() { "OK" } else { "MISMATCH" };
            let _ = writeln!(
                out,
                "{:<26} | {:>8} | {:>8} | {}",
                t.table, t.source_count, target, status
            );
        }
        let _ = writeln!(
            out,
            "{} tables, {} mismatched",
            self.tables.len(),
            self.mismatches()
        );
        out
    }
}

/// Connectivity of both endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_type: String,
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// The resolved copy order with any foreign-key violations it contains.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPlan {
    pub order: TableOrder,
    pub violations: Vec<OrderViolation>,
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceReader>,
    source_schema: String,
    target: Arc<dyn TargetWriter>,
    target_schema: String,
}

impl Orchestrator {
    /// Connect both endpoints described by the configuration.
    pub async fn new(config: Config) -> Result<Self> {
        let profiles = config.profile_store()?;
        let source = create_reader(&config.source, profiles.as_ref()).await?;
        let target = create_writer(&config.target, profiles.as_ref()).await?;

        if source.reader.db_type() == "oracle"
            && source.schema.eq_ignore_ascii_case(&target.schema)
        {
            return Err(MigrateError::Config(format!(
                "source and target resolve to the same schema '{}'",
                target.schema
            )));
        }

        Ok(Self::with_endpoints(
            config,
            source.reader,
            source.schema,
            target.writer,
            target.schema,
        ))
    }

    /// Build an orchestrator over already connected endpoints.
    pub fn with_endpoints(
        config: Config,
        source: Arc<dyn SourceReader>,
        source_schema: impl Into<String>,
        target: Arc<dyn TargetWriter>,
        target_schema: impl Into<String>,
    ) -> Self {
        Self {
            config,
            source,
            source_schema: source_schema.into(),
            target,
            target_schema: target_schema.into(),
        }
    }

    pub fn source_schema(&self) -> &str {
        &self.source_schema
    }

    pub fn target_schema(&self) -> &str {
        &self.target_schema
    }

    /// Resolve the copy order for the source tables.
    fn order_tables(&self, tables: &[Table]) -> TableOrder {
        let migration = &self.config.migration;
        match self.config.order_mode() {
            OrderMode::Explicit => {
                let available: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();
                TableOrder::explicit(&migration.table_order, &available)
            }
            OrderMode::ForeignKeys => {
                TableOrder::resolve_with_foreign_keys(tables, &migration.table_order)
            }
        }
    }

    /// Extract the source schema and return its tables in copy order.
    pub async fn ordered_tables(&self) -> Result<(Vec<Table>, TableOrder)> {
        let mut tables = self.source.extract_schema(&self.source_schema).await?;
        info!(
            "Found {} tables in source schema {}",
            tables.len(),
            self.source_schema
        );

        let order = self.order_tables(&tables);
        order.apply_ranks(&mut tables);

        let mut ordered = Vec::with_capacity(order.len());
        for name in &order.tables {
            if let Some(pos) = tables.iter().position(|t| &t.name == name) {
                ordered.push(tables.swap_remove(pos));
            }
        }
        Ok((ordered, order))
    }

    /// Resolve the order and check it against the source foreign keys.
    pub async fn resolve_order(&self) -> Result<OrderPlan> {
        let tables = self.source.extract_schema(&self.source_schema).await?;
        let order = self.order_tables(&tables);
        let violations = check_order(&order.tables, &tables);
        for v in &violations {
            warn!("Order violation: {}", v);
        }
        Ok(OrderPlan { order, violations })
    }

    /// Run one phase, or all of them.
    pub async fn run(&self, phase: Phase) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let start = Instant::now();
        info!(
            "Starting run {} (phase: {}) {} -> {}",
            run_id, phase, self.source_schema, self.target_schema
        );

        let steps = phase.steps();
        let (tables, order) = if steps.iter().any(|s| s.needs_tables()) {
            self.ordered_tables().await?
        } else {
            (Vec::new(), TableOrder::default())
        };

        let mut phases = Vec::new();
        let mut data = None;
        let mut rows_transferred = 0;

        for step in steps {
            info!("Phase {}: starting", step);
            match step {
                Phase::Schema => {
                    if self.config.migration.create_tables {
                        phases.push(
                            ddl::create_tables(
                                self.source.as_ref(),
                                self.target.as_ref(),
                                &tables,
                                &self.source_schema,
                                &self.target_schema,
                            )
                            .await,
                        );
                    } else {
                        info!("Table creation disabled, skipping");
                    }
                }
                Phase::Data => {
                    let engine = TransferEngine::new(
                        self.source.clone(),
                        self.target.clone(),
                        TransferConfig {
                            batch_size: self.config.migration.batch_size,
                            row_fallback: self.config.migration.row_fallback,
                        },
                    );
                    let report = engine.copy_tables(&tables).await?;
                    rows_transferred = engine.rows_transferred();
                    data = Some(report);
                }
                Phase::Sequences => {
                    phases.push(
                        sequence::synthesize(
                            self.target.as_ref(),
                            &self.config.migration.sequences,
                            &self.config.migration.id_column,
                        )
                        .await?,
                    );
                    if self.source.db_type() == "oracle" && self.config.migration.copy_sequences {
                        let mut replicated = sequence::replicate(
                            self.source.as_ref(),
                            self.target.as_ref(),
                            &self.source_schema,
                        )
                        .await?;
                        replicated.phase = "source-sequences".to_string();
                        phases.push(replicated);
                    }
                }
                Phase::Keys => {
                    let migrator =
                        KeyMigrator::new(self.target.as_ref(), &self.config.migration.id_column);
                    phases.push(migrator.convert_all(&self.config.migration.key_conversions).await);
                }
                Phase::Legacy => phases.push(self.drop_legacy_ids().await?),
                Phase::Indexes => {
                    if self.config.migration.copy_indexes {
                        let indexes = self.source.list_custom_indexes(&self.source_schema).await?;
                        info!("Found {} custom indexes", indexes.len());
                        phases.push(
                            ddl::create_indexes(
                                self.source.as_ref(),
                                self.target.as_ref(),
                                &indexes,
                                &self.source_schema,
                                &self.target_schema,
                            )
                            .await,
                        );
                    } else {
                        info!("Index copy disabled, skipping");
                    }
                }
                Phase::All => {}
            }
        }

        let completed_at = Utc::now();
        let mut result = MigrationResult {
            run_id,
            phase,
            status: String::new(),
            duration_seconds: start.elapsed().as_secs_f64(),
            started_at,
            completed_at,
            source_schema: self.source_schema.clone(),
            target_schema: self.target_schema.clone(),
            table_order: order.tables,
            rows_transferred,
            data,
            phases,
        };
        result.status = if result.is_success() {
            "completed".to_string()
        } else {
            "completed_with_errors".to_string()
        };
        info!(
            "Run {} {} in {:.2}s ({} rows)",
            result.run_id, result.status, result.duration_seconds, result.rows_transferred
        );
        Ok(result)
    }

    /// Legacy-id drop. An unmet precondition becomes a failed unit so the
    /// rest of a full run still reports.
    async fn drop_legacy_ids(&self) -> Result<PhaseSummary> {
        let migrator = KeyMigrator::new(self.target.as_ref(), &self.config.migration.id_column);
        match migrator
            .drop_legacy_columns(
                &self.config.migration.legacy_id_tables,
                &self.config.migration.key_conversions,
            )
            .await
        {
            Ok(summary) => Ok(summary),
            Err(MigrateError::Precondition(message)) => {
                error!("Legacy id drop refused: {}", message);
                let mut summary = PhaseSummary::new("legacy-ids");
                summary.record("precondition", UnitOutcome::failed(message));
                Ok(summary)
            }
            Err(e) => Err(e),
        }
    }

    /// Compare source and target row counts for every table in copy order.
    pub async fn validate(&self) -> Result<ValidationReport> {
        let (tables, _) = self.ordered_tables().await?;
        let mut report = ValidationReport::default();

        for table in &tables {
            let source_count = self
                .source
                .get_row_count(&table.schema, &table.name)
                .await?;
            let target_count = match self.target.get_row_count(&table.name.to_uppercase()).await {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!("{}: cannot count target rows: {}", table.name, e.summary());
                    None
                }
            };

            let check = CountCheck {
                table: table.name.clone(),
                source_count,
                target_count,
            };
            if check.matches() {
                info!("{}: {} rows (match)", table.name, source_count);
            } else {
                warn!(
                    "{}: source={} target={} (MISMATCH)",
                    table.name,
                    source_count,
                    target_count.map_or_else(|| "?".to_string(), |c| c.to_string())
                );
            }
            report.tables.push(check);
        }

        Ok(report)
    }

    /// Test both connections and time each round-trip.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();
        let source = self.source.test_connection().await;
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target = self.target.test_connection().await;
        let target_latency_ms = start.elapsed().as_millis() as u64;

        Ok(HealthCheckResult {
            source_type: self.source.db_type().to_string(),
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.as_ref().err().map(|e| e.summary()),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.as_ref().err().map(|e| e.summary()),
            healthy: source.is_ok() && target.is_ok(),
        })
    }

    /// Close both connections.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_steps() {
        assert_eq!(Phase::All.steps().len(), 6);
        assert_eq!(Phase::All.steps()[0], Phase::Schema);
        assert_eq!(Phase::All.steps()[5], Phase::Indexes);
        assert_eq!(Phase::Keys.steps(), &[Phase::Keys]);
    }

    #[test]
    fn test_phase_parse() {
        assert_eq!("DATA".parse::<Phase>().unwrap(), Phase::Data);
        assert_eq!("legacy-ids".parse::<Phase>().unwrap(), Phase::Legacy);
        assert!("copy".parse::<Phase>().is_err());
        assert_eq!(Phase::Sequences.to_string(), "sequences");
    }

    #[test]
    fn test_validation_report() {
        let report = ValidationReport {
            tables: vec![
                CountCheck {
                    table: "lots".into(),
                    source_count: 10,
                    target_count: Some(10),
                },
                CountCheck {
                    table: "parts".into(),
                    source_count: 5,
                    target_count: None,
                },
            ],
        };
        assert_eq!(report.mismatches(), 1);
        assert!(!report.is_success());
        assert!(report.render_text().contains("MISMATCH"));
    }

    #[test]
    fn test_result_success_requires_clean_phases() {
        let mut keys = PhaseSummary::new("keys");
        keys.record("lots", UnitOutcome::Success);
        let mut result = MigrationResult {
            run_id: "r".into(),
            phase: Phase::Keys,
            status: "completed".into(),
            duration_seconds: 0.0,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            source_schema: "public".into(),
            target_schema: "MES".into(),
            table_order: Vec::new(),
            rows_transferred: 0,
            data: None,
            phases: vec![keys],
        };
        assert!(result.is_success());

        result.phases[0].record("parts", UnitOutcome::failed("ORA-00942"));
        assert!(!result.is_success());
        assert!(result.to_json().unwrap().contains("\"phase\": \"keys\""));
    }
}
