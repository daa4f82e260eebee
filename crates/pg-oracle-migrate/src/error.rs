//! Error types for the migration library.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Oracle "name is already used by an existing object".
pub const ORA_NAME_IN_USE: u32 = 955;

/// Oracle "such column list already indexed".
pub const ORA_COLUMNS_ALREADY_INDEXED: u32 = 1408;

static ORA_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ORA-(\d{5})").expect("valid ORA code pattern"));

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, unknown profile, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// PostgreSQL source connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] tokio_postgres::Error),

    /// Oracle connection or statement error.
    ///
    /// `code` holds the numeric part of the `ORA-NNNNN` code when the driver
    /// reported one.
    #[error("Oracle error: {message}")]
    Target { code: Option<u32>, message: String },

    /// Metadata catalog lookup failed
    #[error("Catalog query failed for {object}: {message}")]
    Catalog { object: String, message: String },

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// DDL extraction or execution failed for an object
    #[error("DDL failed for {object}: {message}")]
    Ddl { object: String, message: String },

    /// Surrogate-key conversion failed at a given step
    #[error("Key migration failed for {table} at {step}: {message}")]
    KeyMigration {
        table: String,
        step: String,
        message: String,
    },

    /// A phase precondition does not hold
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Script parsing or execution error
    #[error("Script error: {0}")]
    Script(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<oracle::Error> for MigrateError {
    fn from(err: oracle::Error) -> Self {
        MigrateError::oracle(err.to_string())
    }
}

impl MigrateError {
    /// Create an Oracle error from a driver message, extracting the ORA code.
    pub fn oracle(message: impl Into<String>) -> Self {
        let message = message.into();
        let code = ORA_CODE
            .captures(&message)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());
        MigrateError::Target { code, message }
    }

    /// Create a Catalog error
    pub fn catalog(object: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Catalog {
            object: object.into(),
            message: message.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Ddl error
    pub fn ddl(object: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Ddl {
            object: object.into(),
            message: message.into(),
        }
    }

    /// The Oracle error number, if this is a driver error that carried one.
    pub fn ora_code(&self) -> Option<u32> {
        match self {
            MigrateError::Target { code, .. } => *code,
            _ => None,
        }
    }

    /// True when the target reported that the object being created already exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self.ora_code(),
            Some(ORA_NAME_IN_USE) | Some(ORA_COLUMNS_ALREADY_INDEXED)
        )
    }

    /// First line of the error message, for compact report entries.
    pub fn summary(&self) -> String {
        self.to_string().lines().next().unwrap_or_default().to_string()
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Precondition(_) => 3,
            MigrateError::Script(_) => 4,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_code_extracted() {
        let err = MigrateError::oracle("ORA-00955: name is already used by an existing object");
        assert_eq!(err.ora_code(), Some(955));
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_index_already_exists() {
        let err = MigrateError::oracle("ORA-01408: such column list already indexed");
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_other_oracle_error_is_not_benign() {
        let err = MigrateError::oracle("ORA-00942: table or view does not exist");
        assert_eq!(err.ora_code(), Some(942));
        assert!(!err.is_already_exists());
    }

    #[test]
    fn test_no_code() {
        let err = MigrateError::oracle("DPI-1047: Cannot locate a 64-bit Oracle Client library");
        assert_eq!(err.ora_code(), None);
        assert!(!MigrateError::Config("x".into()).is_already_exists());
    }

    #[test]
    fn test_summary_is_first_line() {
        let err = MigrateError::oracle("ORA-01400: cannot insert NULL\nHelp: https://docs");
        assert_eq!(err.summary(), "Oracle error: ORA-01400: cannot insert NULL");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("bad".into()).exit_code(), 2);
        assert_eq!(MigrateError::Precondition("no".into()).exit_code(), 3);
        assert_eq!(MigrateError::transfer("T", "boom").exit_code(), 1);
    }
}
