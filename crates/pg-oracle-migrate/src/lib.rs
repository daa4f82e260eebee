//! # pg-oracle-migrate
//!
//! Schema and data migration from PostgreSQL (or another Oracle schema) to
//! Oracle.
//!
//! A run moves through these phases, each reporting per-unit outcomes:
//!
//! - **schema**: extract table DDL, strip storage clauses, create on target
//! - **data**: batched copy in foreign-key-safe order with type coercion
//! - **sequences**: create sequences starting past the current max id
//! - **keys**: convert string/UUID `ID` columns to sequence-backed `NUMBER`
//! - **legacy**: drop obsolete `ID` columns once every conversion is done
//! - **indexes**: recreate custom indexes
//!
//! Flat SQL*Plus-style scripts can also be run block by block with
//! [`script::execute`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use pg_oracle_migrate::{Config, Orchestrator, Phase};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run(Phase::All).await?;
//!     println!("{}", result.render_text());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod ddl;
pub mod drivers;
pub mod error;
pub mod keys;
pub mod orchestrator;
pub mod order;
pub mod report;
pub mod script;
pub mod sequence;
pub mod transfer;
pub mod typemap;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, OrderMode, ProfileStore, SourceConfig, TargetConfig};
pub use core::{Batch, Column, ReadOptions, Row, ScriptSession, SourceReader, SqlValue, Table, TargetWriter};
pub use drivers::{OracleReader, OracleWriter, PostgresReader};
pub use error::{MigrateError, Result};
pub use keys::{KeyConversion, KeyMigrator, KeyOutcome};
pub use orchestrator::{HealthCheckResult, MigrationResult, Orchestrator, Phase, ValidationReport};
pub use order::TableOrder;
pub use report::{DataReport, PhaseSummary, TableStats, TableStatus, UnitOutcome};
pub use script::{RunOptions, ScriptBlock, ScriptReport};
pub use transfer::{TransferConfig, TransferEngine};
