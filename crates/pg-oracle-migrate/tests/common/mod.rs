//! In-memory source, target and script session used by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use pg_oracle_migrate::core::schema::{Column, ConstraintKind, ForeignKey, IndexRef, Table};
use pg_oracle_migrate::core::traits::{ReadOptions, ScriptSession, SourceReader, TargetWriter};
use pg_oracle_migrate::core::value::{Batch, Row, SqlValue};
use pg_oracle_migrate::error::{MigrateError, Result};
use tokio::sync::mpsc;

pub fn int_row(id: i64, name: &str) -> Row {
    vec![SqlValue::I64(id), SqlValue::text_owned(name.to_string())]
}

/// A source table `name (id int8 PK, name varchar)` with optional FK parents.
pub fn source_table(name: &str, parents: &[&str]) -> Table {
    let mut t = Table::new("public", name);
    let mut id = Column::new("id", "int8");
    id.is_nullable = false;
    t.columns.push(id);
    t.columns.push(Column::new("name", "varchar"));
    t.primary_key.push("id".into());
    for p in parents {
        t.foreign_keys.push(ForeignKey {
            name: format!("fk_{}_{}", name, p),
            columns: vec![format!("{}_id", p)],
            ref_table: p.to_string(),
            ref_columns: vec!["id".into()],
        });
    }
    t
}

/// Destination columns matching [`source_table`].
pub fn dest_columns() -> Vec<Column> {
    vec![Column::new("ID", "NUMBER"), Column::new("NAME", "VARCHAR2")]
}

// =============================================================================
// Source
// =============================================================================

#[derive(Default)]
pub struct FakeSource {
    pub tables: Vec<Table>,
    pub rows: HashMap<String, Vec<Row>>,
    pub ddl: HashMap<String, String>,
    pub indexes: Vec<IndexRef>,
    pub reads: Mutex<Vec<String>>,
    /// Ids of rows the reader fails to decode; they arrive as rejected.
    pub undecodable: HashSet<i64>,
    pub last_read: Mutex<Option<ReadOptions>>,
}

impl FakeSource {
    pub fn with_table(mut self, table: Table, rows: Vec<Row>) -> Self {
        self.rows.insert(table.name.clone(), rows);
        self.tables.push(table);
        self
    }

    pub fn read_order(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceReader for FakeSource {
    async fn extract_schema(&self, _schema: &str) -> Result<Vec<Table>> {
        Ok(self.tables.clone())
    }

    async fn get_row_count(&self, _schema: &str, table: &str) -> Result<i64> {
        Ok(self.rows.get(table).map_or(0, |r| r.len() as i64))
    }

    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Batch>> {
        self.reads.lock().unwrap().push(opts.table.clone());
        *self.last_read.lock().unwrap() = Some(opts.clone());
        let rows = self.rows.get(&opts.table).cloned().unwrap_or_default();
        let chunks: Vec<Vec<Row>> = rows.chunks(opts.batch_size).map(|c| c.to_vec()).collect();

        let (tx, rx) = mpsc::channel(chunks.len() + 1);
        let n = chunks.len();
        if n == 0 {
            let _ = tx.try_send(Ok(Batch::empty_final()));
        }
        for (i, chunk) in chunks.into_iter().enumerate() {
            let (bad, good): (Vec<Row>, Vec<Row>) = chunk
                .into_iter()
                .partition(|r| r[0].as_i64().is_some_and(|id| self.undecodable.contains(&id)));
            let batch = Batch::new(good).with_rejected(bad.len());
            let batch = if i + 1 == n { batch.mark_final() } else { batch };
            let _ = tx.try_send(Ok(batch));
        }
        rx
    }

    async fn table_ddl(&self, table: &Table) -> Result<String> {
        self.ddl
            .get(&table.name)
            .cloned()
            .ok_or_else(|| MigrateError::ddl(&table.name, "no DDL"))
    }

    async fn list_custom_indexes(&self, _schema: &str) -> Result<Vec<IndexRef>> {
        Ok(self.indexes.clone())
    }

    async fn index_ddl(&self, _schema: &str, index: &IndexRef) -> Result<String> {
        self.ddl
            .get(&index.name)
            .cloned()
            .ok_or_else(|| MigrateError::ddl(&index.name, "no DDL"))
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {}
}

// =============================================================================
// Target
// =============================================================================

#[derive(Default)]
pub struct TargetState {
    /// Destination columns per table.
    pub columns: HashMap<String, Vec<Column>>,
    /// Committed rows per table.
    pub committed: HashMap<String, Vec<Row>>,
    /// Inserted but not yet committed.
    pub pending: Vec<(String, Vec<Row>)>,
    /// Tables in the order rows first arrived.
    pub insert_order: Vec<String>,
    pub insert_calls: usize,
    /// 1-based `insert_batch` calls that fail.
    pub fail_insert_calls: HashSet<usize>,
    /// Any batch containing this id fails.
    pub poison_id: Option<i64>,
    /// Every statement passed to `execute`, in order.
    pub executed: Vec<String>,
    /// Statements containing one of these fragments fail with the given error.
    pub fail_sql: Vec<(String, String)>,
    pub sequences: Vec<String>,
    pub max_values: HashMap<String, SqlValue<'static>>,
    pub row_counts: HashMap<String, i64>,
    pub constraints: HashMap<(String, &'static str), Vec<String>>,
    pub primary_keys: HashMap<String, Vec<String>>,
    pub commits: usize,
    pub rollbacks: usize,
}

#[derive(Default)]
pub struct FakeTarget {
    pub state: Mutex<TargetState>,
}

impl FakeTarget {
    pub fn with_table(self, name: &str, columns: Vec<Column>) -> Self {
        self.state
            .lock()
            .unwrap()
            .columns
            .insert(name.to_string(), columns);
        self
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, TargetState> {
        self.state.lock().unwrap()
    }

    pub fn fail_on(&self, fragment: &str, error: &str) {
        self.state()
            .fail_sql
            .push((fragment.to_string(), error.to_string()));
    }

    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    pub fn committed_rows(&self, table: &str) -> usize {
        self.state().committed.get(table).map_or(0, |r| r.len())
    }
}

#[async_trait]
impl TargetWriter for FakeTarget {
    async fn table_names(&self) -> Result<Vec<String>> {
        Ok(self.state().columns.keys().cloned().collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<Column>> {
        Ok(self.state().columns.get(table).cloned().unwrap_or_default())
    }

    async fn get_row_count(&self, table: &str) -> Result<i64> {
        let state = self.state();
        if let Some(n) = state.row_counts.get(table) {
            return Ok(*n);
        }
        if !state.columns.contains_key(table) {
            return Err(MigrateError::oracle("ORA-00942: table or view does not exist"));
        }
        Ok(state.committed.get(table).map_or(0, |r| r.len() as i64))
    }

    async fn sequence_names(&self) -> Result<Vec<String>> {
        Ok(self.state().sequences.clone())
    }

    async fn constraint_names(&self, table: &str, kind: ConstraintKind) -> Result<Vec<String>> {
        Ok(self
            .state()
            .constraints
            .get(&(table.to_string(), kind.oracle_code()))
            .cloned()
            .unwrap_or_default())
    }

    async fn primary_key_columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .state()
            .primary_keys
            .get(table)
            .cloned()
            .unwrap_or_default())
    }

    async fn max_value(&self, table: &str, _column: &str) -> Result<Option<SqlValue<'static>>> {
        Ok(self.state().max_values.get(table).cloned())
    }

    async fn insert_batch(&self, table: &str, _columns: &[Column], rows: Vec<Row>) -> Result<u64> {
        let mut state = self.state();
        state.insert_calls += 1;
        let call = state.insert_calls;
        if state.fail_insert_calls.contains(&call) {
            return Err(MigrateError::oracle("ORA-01400: cannot insert NULL"));
        }
        if let Some(poison) = state.poison_id {
            if rows.iter().any(|r| r[0].as_i64() == Some(poison)) {
                return Err(MigrateError::oracle("ORA-12899: value too large for column"));
            }
        }
        if !state.insert_order.iter().any(|t| t == table) {
            state.insert_order.push(table.to_string());
        }
        let n = rows.len() as u64;
        state.pending.push((table.to_string(), rows));
        Ok(n)
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let mut state = self.state();
        state.executed.push(sql.to_string());
        if let Some((_, err)) = state.fail_sql.iter().find(|(f, _)| sql.contains(f.as_str())) {
            return Err(MigrateError::oracle(err.clone()));
        }
        if let Some(rest) = sql.strip_prefix("CREATE SEQUENCE ") {
            if let Some(name) = rest.split_whitespace().next() {
                state.sequences.push(name.to_string());
            }
        }
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.state();
        state.commits += 1;
        let pending = std::mem::take(&mut state.pending);
        for (table, rows) in pending {
            state.committed.entry(table).or_default().extend(rows);
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut state = self.state();
        state.rollbacks += 1;
        state.pending.clear();
        Ok(())
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "oracle"
    }

    async fn close(&self) {}
}

// =============================================================================
// Script session
// =============================================================================

#[derive(Default)]
pub struct SessionState {
    pub executed: Vec<String>,
    pub fail_on: Vec<String>,
    /// Output lines produced by blocks containing the key fragment.
    pub output: Vec<(String, Vec<String>)>,
    pub buffered: Vec<String>,
    pub enabled: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

#[derive(Default)]
pub struct FakeSession {
    pub state: Mutex<SessionState>,
}

impl FakeSession {
    pub fn failing_on(fragment: &str) -> Self {
        let session = Self::default();
        session.state().fail_on.push(fragment.to_string());
        session
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl ScriptSession for FakeSession {
    async fn enable_output(&self, _buffer_size: u32) -> Result<()> {
        self.state().enabled += 1;
        Ok(())
    }

    async fn execute_block(&self, text: &str) -> Result<()> {
        let mut state = self.state();
        state.executed.push(text.to_string());
        if state.fail_on.iter().any(|f| text.contains(f.as_str())) {
            return Err(MigrateError::Script(
                "ORA-00942: table or view does not exist".to_string(),
            ));
        }
        let lines: Vec<String> = state
            .output
            .iter()
            .filter(|(key, _)| text.contains(key.as_str()))
            .flat_map(|(_, lines)| lines.clone())
            .collect();
        state.buffered.extend(lines);
        Ok(())
    }

    async fn read_output(&self) -> Result<Vec<String>> {
        Ok(std::mem::take(&mut self.state().buffered))
    }

    async fn commit(&self) -> Result<()> {
        self.state().commits += 1;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.state().rollbacks += 1;
        Ok(())
    }
}
