//! Configuration type definitions.

use serde::{Deserialize, Serialize};

use crate::keys::{default_key_conversions, default_legacy_id_tables, KeyConversion, DEFAULT_ID_COLUMN};
use crate::sequence::{default_sequences, SequenceSpec};
use crate::transfer::DEFAULT_BATCH_SIZE;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (PostgreSQL or Oracle).
    pub source: SourceConfig,

    /// Target database configuration (Oracle).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database configuration.
///
/// Connection details are given inline or taken from a named profile in the
/// profile store. Inline values override the profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database type: "postgres" or "oracle".
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Profile name in the profile store (Oracle sources only).
    #[serde(default)]
    pub profile: Option<String>,

    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default: 5432 for PostgreSQL, 1521 for Oracle).
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name (PostgreSQL).
    #[serde(default)]
    pub database: String,

    /// Oracle service name.
    #[serde(default)]
    pub service_name: Option<String>,

    /// Oracle SID, used when no service name is set.
    #[serde(default)]
    pub sid: Option<String>,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Source schema (default: "public" for PostgreSQL, the user for Oracle).
    #[serde(default)]
    pub schema: Option<String>,

    /// SSL mode for PostgreSQL (default: "prefer").
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,

    /// Connect as SYSDBA (Oracle).
    #[serde(default)]
    pub sysdba: bool,
}

/// Target Oracle database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type (always "oracle").
    #[serde(default = "default_oracle")]
    pub r#type: String,

    /// Profile name in the profile store. Falls back to the store's default
    /// profile when no inline host is given.
    #[serde(default)]
    pub profile: Option<String>,

    #[serde(default)]
    pub host: String,

    /// Listener port (default: 1521).
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub service_name: Option<String>,

    #[serde(default)]
    pub sid: Option<String>,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Target schema (default: the connecting user).
    #[serde(default)]
    pub schema: Option<String>,

    #[serde(default)]
    pub sysdba: bool,
}

/// How the copy order is decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderMode {
    /// Use `table_order` as given.
    #[default]
    Explicit,
    /// Derive the order from foreign keys, using `table_order` as tie-break.
    ForeignKeys,
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per insert batch (default: 500).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Unset means explicit for a PostgreSQL source and foreign keys for an
    /// Oracle source, which copies every table the source owns.
    #[serde(default)]
    pub order_mode: Option<OrderMode>,

    /// Explicit table order. Defaults to the built-in MES order.
    #[serde(default = "crate::order::default_table_order")]
    pub table_order: Vec<String>,

    /// Sequences to synthesize after the data copy.
    #[serde(default = "default_sequences")]
    pub sequences: Vec<SequenceSpec>,

    /// Tables whose identifier column becomes NUMBER.
    #[serde(default = "default_key_conversions")]
    pub key_conversions: Vec<KeyConversion>,

    /// Tables whose legacy identifier column is dropped.
    #[serde(default = "default_legacy_id_tables")]
    pub legacy_id_tables: Vec<String>,

    /// Identifier column name (default: "ID").
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Create target tables before copying (default: true).
    #[serde(default = "default_true")]
    pub create_tables: bool,

    /// Copy custom indexes after the data (default: true).
    #[serde(default = "default_true")]
    pub copy_indexes: bool,

    /// Replicate source sequences when the source is Oracle (default: true).
    #[serde(default = "default_true")]
    pub copy_sequences: bool,

    /// Retry a failed batch row by row (default: false).
    #[serde(default)]
    pub row_fallback: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            order_mode: None,
            table_order: crate::order::default_table_order(),
            sequences: default_sequences(),
            key_conversions: default_key_conversions(),
            legacy_id_tables: default_legacy_id_tables(),
            id_column: default_id_column(),
            create_tables: true,
            copy_indexes: true,
            copy_sequences: true,
            row_fallback: false,
        }
    }
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_oracle() -> String {
    "oracle".to_string()
}

fn default_prefer() -> String {
    "prefer".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_id_column() -> String {
    DEFAULT_ID_COLUMN.to_string()
}

fn default_true() -> bool {
    true
}

/// Resolved Oracle connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleConnectParams {
    pub user: String,
    pub password: String,
    /// Easy Connect string or a full descriptor when connecting by SID.
    pub connect_string: String,
    pub sysdba: bool,
}

impl OracleConnectParams {
    /// Build a connect string from host, port and either a service name or
    /// a SID. Service names take precedence.
    pub fn connect_string(
        host: &str,
        port: u16,
        service_name: Option<&str>,
        sid: Option<&str>,
    ) -> Option<String> {
        match (service_name, sid) {
            (Some(service), _) => Some(format!("//{}:{}/{}", host, port, service)),
            (None, Some(sid)) => Some(format!(
                "(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST={})(PORT={}))(CONNECT_DATA=(SID={})))",
                host, port, sid
            )),
            (None, None) => None,
        }
    }
}

/// Default Oracle listener port.
pub const ORACLE_DEFAULT_PORT: u16 = 1521;

/// Default PostgreSQL port.
pub const POSTGRES_DEFAULT_PORT: u16 = 5432;
