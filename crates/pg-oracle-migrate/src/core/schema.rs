//! Schema and metadata types for tables, columns, keys and sequences.
//!
//! These types provide an engine-agnostic view of the catalog used by the
//! order resolver, the DDL synthesizer and the copier.

use serde::{Deserialize, Serialize};

/// Table metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    /// Schema (PostgreSQL) or owner (Oracle) name.
    pub schema: String,

    /// Table name as reported by the source catalog.
    pub name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<Column>,

    /// Primary key column names.
    pub primary_key: Vec<String>,

    /// Foreign key constraints.
    pub foreign_keys: Vec<ForeignKey>,

    /// Position in the copy order; referenced tables always rank lower.
    #[serde(default)]
    pub rank: usize,
}

impl Table {
    /// Create a table with no columns or constraints.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Find a column by name, ignoring case.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Names of other tables this table references.
    ///
    /// Self references are excluded since they never constrain copy order.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
        self.foreign_keys
            .iter()
            .map(|fk| fk.ref_table.as_str())
            .filter(move |t| !t.eq_ignore_ascii_case(&self.name))
    }
}

/// Column metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Data type as the owning engine names it (e.g. "uuid", "VARCHAR2").
    pub data_type: String,

    /// Maximum length for character and binary types (-1 for unbounded).
    pub max_length: i32,

    /// Numeric precision.
    pub precision: i32,

    /// Numeric scale.
    pub scale: i32,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,
}

impl Column {
    /// Create a nullable column with no size information.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            ..Default::default()
        }
    }

    /// True when the column is an Oracle NUMBER (or a PostgreSQL integer type).
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.data_type.to_ascii_lowercase().as_str(),
            "number" | "integer" | "smallint" | "int2" | "int4" | "int8" | "bigint" | "numeric"
        )
    }
}

/// Foreign key metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,

    /// Referencing column names.
    pub columns: Vec<String>,

    /// Referenced table name.
    pub ref_table: String,

    /// Referenced column names.
    pub ref_columns: Vec<String>,
}

/// Kind of table constraint the key migrator cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    Primary,
    Unique,
}

impl ConstraintKind {
    /// Oracle `USER_CONSTRAINTS.CONSTRAINT_TYPE` code.
    pub fn oracle_code(self) -> &'static str {
        match self {
            ConstraintKind::Primary => "P",
            ConstraintKind::Unique => "U",
        }
    }
}

/// Sequence definition.
///
/// `min_value` and `max_value` are 128-bit because Oracle's default
/// maximum (28 nines) does not fit in an `i64`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceDef {
    /// Sequence name.
    pub name: String,

    /// Table whose identifier column the sequence feeds, when known.
    pub table: Option<String>,

    /// First value handed out.
    pub start: i64,

    /// Increment between values.
    pub increment: i64,

    pub min_value: Option<i128>,

    pub max_value: Option<i128>,

    /// Cache size; `None` means NOCACHE.
    pub cache: Option<u32>,

    /// Whether the sequence wraps around at its bounds.
    pub cycle: bool,
}

impl SequenceDef {
    /// A synthesized sequence: increment 1, NOCACHE, NOCYCLE.
    pub fn synthesized(name: impl Into<String>, table: impl Into<String>, start: i64) -> Self {
        Self {
            name: name.into(),
            table: Some(table.into()),
            start,
            increment: 1,
            min_value: None,
            max_value: None,
            cache: None,
            cycle: false,
        }
    }

    /// Render the `CREATE SEQUENCE` statement.
    pub fn create_sql(&self) -> String {
        let mut sql = format!(
            "CREATE SEQUENCE {} START WITH {} INCREMENT BY {}",
            self.name, self.start, self.increment
        );
        if let Some(min) = self.min_value {
            sql.push_str(&format!(" MINVALUE {}", min));
        }
        if let Some(max) = self.max_value {
            sql.push_str(&format!(" MAXVALUE {}", max));
        }
        match self.cache {
            Some(n) if n > 1 => sql.push_str(&format!(" CACHE {}", n)),
            _ => sql.push_str(" NOCACHE"),
        }
        sql.push_str(if self.cycle { " CYCLE" } else { " NOCYCLE" });
        sql
    }
}

/// A user index that is not backing a primary or unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRef {
    /// Index name.
    pub name: String,

    /// Table the index belongs to.
    pub table: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_full_name() {
        let table = Table::new("public", "items");
        assert_eq!(table.full_name(), "public.items");
        assert!(!table.has_pk());
    }

    #[test]
    fn test_column_lookup_ignores_case() {
        let mut table = Table::new("public", "items");
        table.columns.push(Column::new("item_code", "varchar"));
        assert!(table.column("ITEM_CODE").is_some());
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn test_referenced_tables_skip_self() {
        let mut table = Table::new("public", "departments");
        table.foreign_keys.push(ForeignKey {
            name: "fk_parent".into(),
            columns: vec!["parent_id".into()],
            ref_table: "departments".into(),
            ref_columns: vec!["id".into()],
        });
        table.foreign_keys.push(ForeignKey {
            name: "fk_factory".into(),
            columns: vec!["factory_id".into()],
            ref_table: "factories".into(),
            ref_columns: vec!["id".into()],
        });
        let refs: Vec<&str> = table.referenced_tables().collect();
        assert_eq!(refs, vec!["factories"]);
    }

    #[test]
    fn test_is_numeric() {
        assert!(Column::new("ID", "NUMBER").is_numeric());
        assert!(Column::new("id", "bigint").is_numeric());
        assert!(!Column::new("ID", "VARCHAR2").is_numeric());
        assert!(!Column::new("id", "uuid").is_numeric());
    }

    #[test]
    fn test_synthesized_sequence_sql() {
        let seq = SequenceDef::synthesized("SEQ_ITEMS", "ITEMS", 848);
        assert_eq!(
            seq.create_sql(),
            "CREATE SEQUENCE SEQ_ITEMS START WITH 848 INCREMENT BY 1 NOCACHE NOCYCLE"
        );
    }

    #[test]
    fn test_replicated_sequence_sql() {
        let seq = SequenceDef {
            name: "SEQ_ORDERS".into(),
            table: None,
            start: 1001,
            increment: 1,
            min_value: Some(1),
            max_value: Some(9_999_999_999_999_999_999_999_999_999),
            cache: Some(20),
            cycle: false,
        };
        assert_eq!(
            seq.create_sql(),
            "CREATE SEQUENCE SEQ_ORDERS START WITH 1001 INCREMENT BY 1 MINVALUE 1 \
             MAXVALUE 9999999999999999999999999999 CACHE 20 NOCYCLE"
        );
    }
}
