//! Database driver implementations.
//!
//! - [`postgres`]: PostgreSQL source
//! - [`oracle`]: Oracle source, target and script session
//! - [`common`]: shared utilities (TLS)
//!
//! Drivers are picked from the configured database type string; the rest of
//! the crate only sees `SourceReader`, `TargetWriter` and `ScriptSession`.

pub mod common;
pub mod oracle;
pub mod postgres;

pub use self::oracle::{OracleConnection, OracleReader, OracleWriter};
pub use common::SslMode;
pub use postgres::PostgresReader;

use std::sync::Arc;

use crate::config::{ProfileStore, SourceConfig, TargetConfig};
use crate::core::traits::SourceReader;
use crate::error::{MigrateError, Result};

/// Supported source engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Postgres,
    Oracle,
}

/// Normalize a configured database type string.
pub fn normalize_db_type(db_type: &str) -> Result<SourceKind> {
    match db_type.to_lowercase().as_str() {
        "postgres" | "postgresql" | "pg" => Ok(SourceKind::Postgres),
        "oracle" | "ora" => Ok(SourceKind::Oracle),
        other => Err(MigrateError::Config(format!(
            "Unknown database type: '{}'. Supported types: postgres, oracle",
            other
        ))),
    }
}

/// A connected source and the schema to read from.
pub struct SourceEndpoint {
    pub reader: Arc<dyn SourceReader>,
    pub schema: String,
}

/// A connected target and the schema it writes into.
pub struct TargetEndpoint {
    pub writer: Arc<OracleWriter>,
    pub schema: String,
}

/// Connect the configured source.
pub async fn create_reader(
    config: &SourceConfig,
    profiles: Option<&ProfileStore>,
) -> Result<SourceEndpoint> {
    match normalize_db_type(&config.r#type)? {
        SourceKind::Postgres => {
            let reader = PostgresReader::new(config).await?;
            Ok(SourceEndpoint {
                reader: Arc::new(reader),
                schema: config.schema_name(None),
            })
        }
        SourceKind::Oracle => {
            let params = config.oracle_params(profiles)?;
            let reader = OracleReader::new(&params).await?;
            let schema = config.schema_name(Some(reader.user()));
            Ok(SourceEndpoint {
                reader: Arc::new(reader),
                schema,
            })
        }
    }
}

/// Connect the Oracle target.
pub async fn create_writer(
    config: &TargetConfig,
    profiles: Option<&ProfileStore>,
) -> Result<TargetEndpoint> {
    let params = config.oracle_params(profiles)?;
    let writer = OracleWriter::new(&params).await?;
    let schema = config.schema_name(&params);
    Ok(TargetEndpoint {
        writer: Arc::new(writer),
        schema,
    })
}
