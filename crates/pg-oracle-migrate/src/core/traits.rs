//! Core traits for the migration engine.
//!
//! - [`SourceReader`]: reads catalog metadata, DDL and rows from the source
//! - [`TargetWriter`]: inspects and writes the Oracle destination
//! - [`ScriptSession`]: executes script blocks and captures `DBMS_OUTPUT`
//!
//! Every phase talks to the databases only through these traits, so the
//! engine can be exercised against in-memory fakes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

use super::schema::{Column, ConstraintKind, IndexRef, SequenceDef, Table};
use super::value::{Batch, Row, SqlValue};

/// Options for reading rows from a table.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Columns to read, in output order.
    pub columns: Vec<String>,
    /// Source data types, parallel to `columns`. Readers use them to pick a
    /// decodable projection; empty means "as stored".
    pub column_types: Vec<String>,
    /// Columns that define the stable read order (primary key).
    pub order_by: Vec<String>,
    /// Number of rows per batch.
    pub batch_size: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            schema: String::new(),
            table: String::new(),
            columns: Vec::new(),
            column_types: Vec::new(),
            order_by: Vec::new(),
            batch_size: 500,
        }
    }
}

/// Read schema and data from a source database.
///
/// # Streaming
///
/// [`read_table`](SourceReader::read_table) returns a bounded channel; the
/// reader fills it from a background task so the copier applies backpressure
/// simply by not receiving.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// List base tables with columns, primary key and foreign keys loaded.
    async fn extract_schema(&self, schema: &str) -> Result<Vec<Table>>;

    /// Get the row count for a table.
    async fn get_row_count(&self, schema: &str, table: &str) -> Result<i64>;

    /// Start streaming rows from a table in `order_by` order.
    ///
    /// The final batch has `is_last` set. A read failure is delivered as an
    /// `Err` item and ends the stream.
    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Batch>>;

    /// DDL text that recreates `table` on Oracle (uncleaned).
    async fn table_ddl(&self, table: &Table) -> Result<String>;

    /// Sequences owned by the source schema. Engines without Oracle-style
    /// sequences report none.
    async fn list_sequences(&self, _schema: &str) -> Result<Vec<SequenceDef>> {
        Ok(Vec::new())
    }

    /// Normal, non-system indexes that do not back a PK/UNIQUE constraint.
    async fn list_custom_indexes(&self, _schema: &str) -> Result<Vec<IndexRef>> {
        Ok(Vec::new())
    }

    /// DDL text for one index (uncleaned).
    async fn index_ddl(&self, _schema: &str, index: &IndexRef) -> Result<String> {
        Err(crate::error::MigrateError::ddl(
            &index.name,
            format!("{} source does not export index DDL", self.db_type()),
        ))
    }

    /// Verify the connection answers a trivial query.
    async fn test_connection(&self) -> Result<()>;

    /// Get the database type identifier ("postgres" or "oracle").
    fn db_type(&self) -> &str;

    /// Close the connection.
    async fn close(&self);
}

/// Inspect and write the Oracle destination.
///
/// All names are destination names (upper case). The writer never commits
/// on its own; callers decide transaction boundaries.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    // ===== Catalog =====

    /// Names of all tables owned by the connected user.
    async fn table_names(&self) -> Result<Vec<String>>;

    /// Columns of a destination table in column-id order. Empty when the
    /// table does not exist.
    async fn table_columns(&self, table: &str) -> Result<Vec<Column>>;

    /// Get the row count for a table.
    async fn get_row_count(&self, table: &str) -> Result<i64>;

    /// Names of all sequences owned by the connected user.
    async fn sequence_names(&self) -> Result<Vec<String>>;

    /// Names of the constraints of one kind on a table.
    async fn constraint_names(&self, table: &str, kind: ConstraintKind) -> Result<Vec<String>>;

    /// Columns of the table's primary key, in position order.
    async fn primary_key_columns(&self, table: &str) -> Result<Vec<String>>;

    /// `MAX(column)` for a table; `None` when the table is empty.
    async fn max_value(&self, table: &str, column: &str) -> Result<Option<SqlValue<'static>>>;

    // ===== Data and DDL =====

    /// Insert rows with one array-DML round trip.
    ///
    /// `columns` carries the destination types used for binding; every row
    /// has exactly one value per column.
    async fn insert_batch(&self, table: &str, columns: &[Column], rows: Vec<Row>) -> Result<u64>;

    /// Execute a single statement with no result set.
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Commit the current transaction.
    async fn commit(&self) -> Result<()>;

    /// Roll back the current transaction.
    async fn rollback(&self) -> Result<()>;

    /// Verify the connection answers a trivial query.
    async fn test_connection(&self) -> Result<()>;

    /// Get the database type identifier.
    fn db_type(&self) -> &str;

    /// Close the connection.
    async fn close(&self);
}

/// One interactive session for the script runner.
#[async_trait]
pub trait ScriptSession: Send + Sync {
    /// Enable `DBMS_OUTPUT` capture with the given buffer size.
    async fn enable_output(&self, buffer_size: u32) -> Result<()>;

    /// Execute one SQL statement or PL/SQL block.
    async fn execute_block(&self, text: &str) -> Result<()>;

    /// Drain the lines buffered by `DBMS_OUTPUT.PUT_LINE`.
    async fn read_output(&self) -> Result<Vec<String>>;

    /// Commit the session transaction.
    async fn commit(&self) -> Result<()>;

    /// Roll back the session transaction.
    async fn rollback(&self) -> Result<()>;
}
