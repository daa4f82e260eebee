//! Configuration validation.

use super::{Config, OrderMode};
use crate::core::identifier::oracle_name;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    let source_type = config.source.r#type.to_lowercase();
    match source_type.as_str() {
        "postgres" | "postgresql" | "pg" => {
            if config.source.host.is_empty() {
                return Err(MigrateError::Config("source.host is required".into()));
            }
            if config.source.database.is_empty() {
                return Err(MigrateError::Config("source.database is required".into()));
            }
            if config.source.user.is_empty() {
                return Err(MigrateError::Config("source.user is required".into()));
            }
        }
        "oracle" => {
            if !config.source.host.is_empty()
                && config.source.service_name.is_none()
                && config.source.sid.is_none()
            {
                return Err(MigrateError::Config(
                    "source.service_name or source.sid is required".into(),
                ));
            }
        }
        other => {
            return Err(MigrateError::Config(format!(
                "source.type must be 'postgres' or 'oracle', got '{}'",
                other
            )));
        }
    }

    // Target validation
    if !config.target.r#type.eq_ignore_ascii_case("oracle") {
        return Err(MigrateError::Config(format!(
            "target.type must be 'oracle', got '{}'",
            config.target.r#type
        )));
    }
    if !config.target.host.is_empty() {
        if config.target.user.is_empty() {
            return Err(MigrateError::Config("target.user is required".into()));
        }
        if config.target.service_name.is_none() && config.target.sid.is_none() {
            return Err(MigrateError::Config(
                "target.service_name or target.sid is required".into(),
            ));
        }
    }

    // Oracle to Oracle within one schema would copy a table onto itself
    if config.source.is_oracle()
        && config.source.host == config.target.host
        && config.source.profile == config.target.profile
        && config.source.schema.is_some()
        && config.source.schema == config.target.schema
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same schema".into(),
        ));
    }

    // Migration config validation
    let migration = &config.migration;
    if migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if config.order_mode() == OrderMode::Explicit && migration.table_order.is_empty() {
        return Err(MigrateError::Config(
            "migration.table_order must not be empty in explicit order mode".into(),
        ));
    }
    oracle_name(&migration.id_column)
        .map_err(|e| MigrateError::Config(format!("migration.id_column: {}", e)))?;
    for conversion in &migration.key_conversions {
        oracle_name(&conversion.table)
            .and_then(|_| oracle_name(&conversion.sequence))
            .map_err(|e| MigrateError::Config(format!("migration.key_conversions: {}", e)))?;
    }
    for spec in &migration.sequences {
        oracle_name(&spec.name)
            .and_then(|_| oracle_name(&spec.table))
            .map_err(|e| MigrateError::Config(format!("migration.sequences: {}", e)))?;
    }

    Ok(())
}
