//! Batch data copier.
//!
//! Rows are streamed from the source in primary-key order, regrouped into
//! fixed-size batches, mapped onto the destination columns and written with
//! one array insert per batch. Each successful batch is committed on its
//! own, so an interrupted run leaves a committed prefix of every table.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::core::schema::{Column, Table};
use crate::core::traits::{ReadOptions, SourceReader, TargetWriter};
use crate::core::value::{Row, SqlNullType, SqlValue};
use crate::error::{MigrateError, Result};
use crate::report::{DataReport, TableStats};
use crate::typemap::convert;

/// Default rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Copier configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Rows per insert batch.
    pub batch_size: usize,
    /// Retry a failed batch one row at a time instead of abandoning it.
    pub row_fallback: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            row_fallback: false,
        }
    }
}

/// How one destination column is filled.
#[derive(Debug, Clone)]
struct ColumnSlot {
    /// Index into the source row, if the source has the column.
    source_idx: Option<usize>,
    /// Source type used by the converter.
    source_type: String,
}

/// Map destination columns onto source columns, ignoring case.
///
/// Destination columns without a source counterpart receive NULL.
fn plan_columns(source: &Table, dest: &[Column]) -> Vec<ColumnSlot> {
    dest.iter()
        .map(|d| {
            let idx = source
                .columns
                .iter()
                .position(|s| s.name.eq_ignore_ascii_case(&d.name));
            match idx {
                Some(i) => ColumnSlot {
                    source_idx: Some(i),
                    source_type: source.columns[i].data_type.clone(),
                },
                None => ColumnSlot {
                    source_idx: None,
                    source_type: d.data_type.clone(),
                },
            }
        })
        .collect()
}

/// Reshape one source row into destination order, converting each cell.
fn map_row(mut row: Row, slots: &[ColumnSlot]) -> Row {
    slots
        .iter()
        .map(|slot| match slot.source_idx {
            Some(i) if i < row.len() => {
                let value = std::mem::replace(&mut row[i], SqlValue::Null(SqlNullType::String));
                convert(value, &slot.source_type)
            }
            _ => SqlValue::Null(SqlNullType::String),
        })
        .collect()
}

/// Moves table data from a source to the Oracle target.
pub struct TransferEngine {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    config: TransferConfig,
    rows_transferred: AtomicI64,
}

impl TransferEngine {
    /// Create a new transfer engine. A zero batch size is treated as 1.
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        mut config: TransferConfig,
    ) -> Self {
        config.batch_size = config.batch_size.max(1);
        Self {
            source,
            target,
            config,
            rows_transferred: AtomicI64::new(0),
        }
    }

    /// Total rows committed by this engine so far.
    pub fn rows_transferred(&self) -> i64 {
        self.rows_transferred.load(Ordering::Relaxed)
    }

    /// Copy one table.
    ///
    /// Batch failures are counted, not returned. An `Err` means the source
    /// could not be read or a catalog lookup failed, which ends the phase.
    pub async fn copy_table(&self, table: &Table) -> Result<TableStats> {
        let start = Instant::now();
        let dest_name = table.name.to_uppercase();

        let source_count = self
            .source
            .get_row_count(&table.schema, &table.name)
            .await
            .map_err(|e| MigrateError::transfer(&table.name, e.to_string()))?;
        info!("{}: {} source rows", table.name, source_count);

        if source_count == 0 {
            info!("{}: no data, skipping", table.name);
            return Ok(TableStats::empty(&table.name));
        }

        let dest_cols = self
            .target
            .table_columns(&dest_name)
            .await
            .map_err(|e| MigrateError::transfer(&table.name, e.to_string()))?;
        if dest_cols.is_empty() {
            warn!("{}: table does not exist on the target", table.name);
            return Ok(TableStats::new(&table.name, source_count, 0, source_count));
        }

        let slots = plan_columns(table, &dest_cols);
        for col in &table.columns {
            if !dest_cols.iter().any(|d| d.name.eq_ignore_ascii_case(&col.name)) {
                debug!("{}.{}: no destination column, dropped", table.name, col.name);
            }
        }

        if !table.has_pk() {
            warn!("{}: no primary key, read order is not guaranteed", table.name);
        }

        let opts = ReadOptions {
            schema: table.schema.clone(),
            table: table.name.clone(),
            columns: table.column_names(),
            column_types: table.columns.iter().map(|c| c.data_type.clone()).collect(),
            order_by: table.primary_key.clone(),
            batch_size: self.config.batch_size,
        };
        let mut rx = self.source.read_table(opts);

        let mut copied = 0i64;
        let mut errors = 0i64;
        let mut pending: Vec<Row> = Vec::with_capacity(self.config.batch_size);

        while let Some(item) = rx.recv().await {
            let batch = item.map_err(|e| MigrateError::transfer(&table.name, e.to_string()))?;
            let is_last = batch.is_last;
            if batch.rejected > 0 {
                warn!("{}: {} source rows could not be decoded", table.name, batch.rejected);
                errors += batch.rejected as i64;
            }
            pending.extend(batch.rows.into_iter().map(|r| map_row(r, &slots)));

            while pending.len() >= self.config.batch_size {
                let chunk: Vec<Row> = pending.drain(..self.config.batch_size).collect();
                let (ok, failed) = self.write_batch(&dest_name, &dest_cols, chunk).await;
                copied += ok;
                errors += failed;
                debug!("{}: {}/{}", table.name, copied + errors, source_count);
            }

            if is_last {
                break;
            }
        }

        if !pending.is_empty() {
            let chunk = std::mem::take(&mut pending);
            let (ok, failed) = self.write_batch(&dest_name, &dest_cols, chunk).await;
            copied += ok;
            errors += failed;
        }

        info!(
            "{}: {} rows copied, {} errors in {:.2}s",
            table.name,
            copied,
            errors,
            start.elapsed().as_secs_f64()
        );
        Ok(TableStats::new(&table.name, source_count, copied, errors))
    }

    /// Insert and commit one batch. Returns (copied, failed).
    async fn write_batch(&self, dest: &str, columns: &[Column], rows: Vec<Row>) -> (i64, i64) {
        let n = rows.len() as i64;
        let retry = self.config.row_fallback.then(|| rows.clone());

        match self.insert_and_commit(dest, columns, rows).await {
            Ok(()) => {
                self.rows_transferred.fetch_add(n, Ordering::Relaxed);
                (n, 0)
            }
            Err(e) => {
                warn!("{}: batch of {} rows failed: {}", dest, n, e.summary());
                self.rollback_quietly(dest).await;
                match retry {
                    Some(rows) => self.write_rows_individually(dest, columns, rows).await,
                    None => (0, n),
                }
            }
        }
    }

    async fn write_rows_individually(
        &self,
        dest: &str,
        columns: &[Column],
        rows: Vec<Row>,
    ) -> (i64, i64) {
        let mut copied = 0i64;
        let mut failed = 0i64;
        for row in rows {
            match self.insert_and_commit(dest, columns, vec![row]).await {
                Ok(()) => copied += 1,
                Err(e) => {
                    debug!("{}: row failed: {}", dest, e.summary());
                    self.rollback_quietly(dest).await;
                    failed += 1;
                }
            }
        }
        self.rows_transferred.fetch_add(copied, Ordering::Relaxed);
        info!("{}: row fallback recovered {} of {} rows", dest, copied, copied + failed);
        (copied, failed)
    }

    async fn insert_and_commit(&self, dest: &str, columns: &[Column], rows: Vec<Row>) -> Result<()> {
        self.target.insert_batch(dest, columns, rows).await?;
        self.target.commit().await
    }

    async fn rollback_quietly(&self, dest: &str) {
        if let Err(e) = self.target.rollback().await {
            warn!("{}: rollback after failed batch also failed: {}", dest, e.summary());
        }
    }

    /// Copy tables in the given order.
    ///
    /// Stops at the first phase-fatal error; per-table failures are in the
    /// returned statistics.
    pub async fn copy_tables(&self, tables: &[Table]) -> Result<DataReport> {
        let mut report = DataReport::default();
        for table in tables {
            let stats = self.copy_table(table).await?;
            report.push(stats);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_table() -> Table {
        let mut t = Table::new("public", "lots");
        t.columns.push(Column::new("id", "uuid"));
        t.columns.push(Column::new("lot_no", "varchar"));
        t.columns.push(Column::new("is_hold", "boolean"));
        t.columns.push(Column::new("legacy_flag", "text"));
        t
    }

    fn dest_columns() -> Vec<Column> {
        vec![
            Column::new("ID", "VARCHAR2"),
            Column::new("LOT_NO", "VARCHAR2"),
            Column::new("IS_HOLD", "NUMBER"),
            Column::new("CREATED_BY", "VARCHAR2"),
        ]
    }

    #[test]
    fn test_plan_columns_case_folds() {
        let slots = plan_columns(&source_table(), &dest_columns());
        assert_eq!(slots[0].source_idx, Some(0));
        assert_eq!(slots[2].source_idx, Some(2));
        assert_eq!(slots[2].source_type, "boolean");
        assert_eq!(slots[3].source_idx, None);
    }

    #[test]
    fn test_map_row_converts_and_fills_null() {
        let slots = plan_columns(&source_table(), &dest_columns());
        let row = vec![
            SqlValue::from("a1"),
            SqlValue::from("LOT-1"),
            SqlValue::Bool(true),
            SqlValue::from("dropped"),
        ];
        let mapped = map_row(row, &slots);
        assert_eq!(mapped.len(), 4);
        assert_eq!(mapped[0], SqlValue::from("a1"));
        assert_eq!(mapped[2], SqlValue::I16(1));
        assert!(mapped[3].is_null());
    }
}
