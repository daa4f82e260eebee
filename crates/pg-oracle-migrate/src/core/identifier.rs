//! Identifier validation and quoting for dynamically built SQL.
//!
//! Table, column and constraint names cannot be bound as parameters, so every
//! statement that embeds one goes through these helpers. Oracle folds unquoted
//! names to upper case; destination names are therefore upper-cased before
//! quoting.

use crate::error::{MigrateError, Result};

/// Oracle 12.2+ identifier limit in bytes.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty names, names containing NUL bytes, and
/// names longer than the Oracle limit.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// True for names Oracle accepts unquoted: a letter followed by letters,
/// digits, `_`, `$` or `#`.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '#'))
}

/// Quote a PostgreSQL identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Qualify a PostgreSQL table name with schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Quote an Oracle identifier exactly as given.
///
/// Oracle has no escape for `"` inside a quoted identifier, so names
/// containing one are rejected.
pub fn quote_oracle(name: &str) -> Result<String> {
    validate_identifier(name)?;
    if name.contains('"') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Oracle identifier contains a double quote: {:?}",
            name
        )));
    }
    Ok(format!("\"{}\"", name))
}

/// Render a destination name: upper-cased and validated.
///
/// Plain names are emitted bare (Oracle folds them to upper case anyway);
/// anything else is quoted.
pub fn oracle_name(name: &str) -> Result<String> {
    let upper = name.to_uppercase();
    if is_plain_identifier(&upper) {
        validate_identifier(&upper)?;
        Ok(upper)
    } else {
        quote_oracle(&upper)
    }
}

/// Escape a string for use inside a single-quoted SQL literal.
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("ITEMS").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("ITEMS\0").is_err());
        assert!(validate_identifier(&"A".repeat(129)).is_err());
    }

    #[test]
    fn test_quote_pg() {
        assert_eq!(quote_pg("items").unwrap(), "\"items\"");
        assert_eq!(quote_pg("a\"b").unwrap(), "\"a\"\"b\"");
        assert_eq!(qualify_pg("public", "items").unwrap(), "\"public\".\"items\"");
    }

    #[test]
    fn test_quote_oracle_rejects_embedded_quote() {
        assert_eq!(quote_oracle("PK_ITEMS").unwrap(), "\"PK_ITEMS\"");
        assert!(quote_oracle("PK\"ITEMS").is_err());
    }

    #[test]
    fn test_oracle_name() {
        assert_eq!(oracle_name("stock_transactions").unwrap(), "STOCK_TRANSACTIONS");
        assert_eq!(oracle_name("SEQ_LOT#1").unwrap(), "SEQ_LOT#1");
        assert_eq!(oracle_name("order lines").unwrap(), "\"ORDER LINES\"");
        assert_eq!(oracle_name("1st").unwrap(), "\"1ST\"");
    }

    #[test]
    fn test_sql_literal() {
        assert_eq!(sql_literal("O'Brien"), "'O''Brien'");
    }
}
