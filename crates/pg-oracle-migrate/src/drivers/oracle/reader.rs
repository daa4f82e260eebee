//! Oracle source reader for schema-to-schema copies.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::value::read_value;
use super::{catalog_name, OracleConnection};
use crate::config::OracleConnectParams;
use crate::core::identifier::{oracle_name, quote_oracle};
use crate::core::schema::{Column, ForeignKey, IndexRef, SequenceDef, Table};
use crate::core::traits::{ReadOptions, SourceReader};
use crate::core::value::{Batch, Row};
use crate::error::{MigrateError, Result};

const TABLES_QUERY: &str = "SELECT table_name FROM all_tables WHERE owner = :1 ORDER BY table_name";

const COLUMNS_QUERY: &str = r#"
    SELECT table_name, column_name, data_type,
           NVL(char_length, 0), NVL(data_precision, 0), NVL(data_scale, 0),
           nullable, column_id
    FROM all_tab_columns
    WHERE owner = :1
    ORDER BY table_name, column_id
"#;

const PRIMARY_KEYS_QUERY: &str = r#"
    SELECT c.table_name, cc.column_name
    FROM all_constraints c
    JOIN all_cons_columns cc
      ON cc.owner = c.owner AND cc.constraint_name = c.constraint_name
    WHERE c.owner = :1 AND c.constraint_type = 'P'
    ORDER BY c.table_name, cc.position
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT c.table_name, c.constraint_name, cc.column_name,
           rc.table_name, rcc.column_name
    FROM all_constraints c
    JOIN all_cons_columns cc
      ON cc.owner = c.owner AND cc.constraint_name = c.constraint_name
    JOIN all_constraints rc
      ON rc.owner = c.r_owner AND rc.constraint_name = c.r_constraint_name
    JOIN all_cons_columns rcc
      ON rcc.owner = rc.owner AND rcc.constraint_name = rc.constraint_name
     AND rcc.position = cc.position
    WHERE c.owner = :1 AND c.constraint_type = 'R'
    ORDER BY c.table_name, c.constraint_name, cc.position
"#;

const SEQUENCES_QUERY: &str = r#"
    SELECT sequence_name, TO_CHAR(min_value), TO_CHAR(max_value), increment_by,
           cache_size, cycle_flag, last_number
    FROM all_sequences
    WHERE sequence_owner = :1
    ORDER BY sequence_name
"#;

const CUSTOM_INDEXES_QUERY: &str = r#"
    SELECT index_name, table_name
    FROM all_indexes
    WHERE owner = :1
      AND index_type = 'NORMAL'
      AND index_name NOT LIKE 'SYS\_%' ESCAPE '\'
      AND index_name NOT IN (
          SELECT constraint_name FROM all_constraints
          WHERE owner = :2 AND constraint_type IN ('P', 'U')
      )
    ORDER BY table_name, index_name
"#;

/// Oracle source reader implementation.
pub struct OracleReader {
    conn: OracleConnection,
}

impl OracleReader {
    pub async fn new(params: &OracleConnectParams) -> Result<Self> {
        Ok(Self {
            conn: OracleConnection::connect(params).await?,
        })
    }

    /// The connected user, used as the default source schema.
    pub fn user(&self) -> &str {
        self.conn.user()
    }

    async fn metadata_ddl(&self, kind: &'static str, schema: &str, name: &str) -> Result<String> {
        let owner = catalog_name(schema);
        let object = catalog_name(name);
        self.conn
            .with_conn(move |conn| {
                conn.query_row_as::<String>(
                    "SELECT DBMS_METADATA.GET_DDL(:1, :2, :3) FROM DUAL",
                    &[&kind, &object, &owner],
                )
                .map_err(|e| MigrateError::ddl(&object, e.to_string()))
            })
            .await
    }
}

#[async_trait]
impl SourceReader for OracleReader {
    async fn extract_schema(&self, schema: &str) -> Result<Vec<Table>> {
        let owner = catalog_name(schema);
        let tables = self
            .conn
            .with_conn(move |conn| {
                let catalog_err = |e: oracle::Error| MigrateError::catalog(&owner, e.to_string());

                let mut tables: Vec<Table> = Vec::new();
                let mut index: HashMap<String, usize> = HashMap::new();
                for row in conn.query_as::<String>(TABLES_QUERY, &[&owner]).map_err(catalog_err)? {
                    let name = row.map_err(catalog_err)?;
                    index.insert(name.clone(), tables.len());
                    tables.push(Table::new(owner.clone(), name));
                }

                let columns = conn
                    .query_as::<(String, String, String, i32, i32, i32, String, i32)>(
                        COLUMNS_QUERY,
                        &[&owner],
                    )
                    .map_err(catalog_err)?;
                for row in columns {
                    let (table, name, data_type, len, precision, scale, nullable, pos) =
                        row.map_err(catalog_err)?;
                    if let Some(&i) = index.get(&table) {
                        tables[i].columns.push(Column {
                            name,
                            data_type,
                            max_length: len,
                            precision,
                            scale,
                            is_nullable: nullable == "Y",
                            ordinal_pos: pos,
                        });
                    }
                }

                for row in conn
                    .query_as::<(String, String)>(PRIMARY_KEYS_QUERY, &[&owner])
                    .map_err(catalog_err)?
                {
                    let (table, column) = row.map_err(catalog_err)?;
                    if let Some(&i) = index.get(&table) {
                        tables[i].primary_key.push(column);
                    }
                }

                let fks = conn
                    .query_as::<(String, String, String, String, String)>(
                        FOREIGN_KEYS_QUERY,
                        &[&owner],
                    )
                    .map_err(catalog_err)?;
                for row in fks {
                    let (table, name, column, ref_table, ref_column) = row.map_err(catalog_err)?;
                    let Some(&i) = index.get(&table) else { continue };
                    let fks = &mut tables[i].foreign_keys;
                    match fks.iter_mut().find(|fk| fk.name == name) {
                        Some(fk) => {
                            fk.columns.push(column);
                            fk.ref_columns.push(ref_column);
                        }
                        None => fks.push(ForeignKey {
                            name,
                            columns: vec![column],
                            ref_table,
                            ref_columns: vec![ref_column],
                        }),
                    }
                }

                Ok(tables)
            })
            .await?;

        info!("Extracted {} tables from schema '{}'", tables.len(), schema);
        Ok(tables)
    }

    async fn get_row_count(&self, schema: &str, table: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}.{}",
            oracle_name(&catalog_name(schema))?,
            oracle_name(&catalog_name(table))?
        );
        self.conn
            .with_conn(move |conn| Ok(conn.query_row_as::<i64>(&sql, &[])?))
            .await
    }

    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(4);
        let conn = self.conn.clone();

        tokio::spawn(async move {
            let err_tx = tx.clone();
            let result = conn
                .with_conn(move |conn| read_table_blocking(conn, &opts, &tx))
                .await;
            if let Err(e) = result {
                let _ = err_tx.send(Err(e)).await;
            }
        });

        rx
    }

    async fn table_ddl(&self, table: &Table) -> Result<String> {
        self.metadata_ddl("TABLE", &table.schema, &table.name).await
    }

    async fn list_sequences(&self, schema: &str) -> Result<Vec<SequenceDef>> {
        let owner = catalog_name(schema);
        self.conn
            .with_conn(move |conn| {
                let rows = conn.query_as::<(String, String, String, i64, i64, String, String)>(
                    SEQUENCES_QUERY,
                    &[&owner],
                )?;
                let mut defs = Vec::new();
                for row in rows {
                    let (name, min, max, increment, cache, cycle, last) = row?;
                    let start = match last.parse::<i64>() {
                        Ok(v) => v,
                        Err(_) => {
                            warn!("Sequence {}: last_number {} out of range, skipped", name, last);
                            continue;
                        }
                    };
                    defs.push(SequenceDef {
                        name,
                        table: None,
                        start,
                        increment,
                        min_value: min.parse().ok(),
                        max_value: max.parse().ok(),
                        cache: u32::try_from(cache).ok().filter(|c| *c > 0),
                        cycle: cycle == "Y",
                    });
                }
                Ok(defs)
            })
            .await
    }

    async fn list_custom_indexes(&self, schema: &str) -> Result<Vec<IndexRef>> {
        let owner = catalog_name(schema);
        self.conn
            .with_conn(move |conn| {
                let mut indexes = Vec::new();
                for row in conn.query_as::<(String, String)>(CUSTOM_INDEXES_QUERY, &[&owner, &owner])? {
                    let (name, table) = row?;
                    indexes.push(IndexRef { name, table });
                }
                Ok(indexes)
            })
            .await
    }

    async fn index_ddl(&self, schema: &str, index: &IndexRef) -> Result<String> {
        self.metadata_ddl("INDEX", schema, &index.name).await
    }

    async fn test_connection(&self) -> Result<()> {
        self.conn
            .with_conn(|conn| Ok(conn.ping()?))
            .await
    }

    fn db_type(&self) -> &str {
        "oracle"
    }

    async fn close(&self) {
        self.conn.close().await;
    }
}

/// Ordered SELECT for one table. Column names are catalog names, quoted
/// as stored.
fn build_select(opts: &ReadOptions) -> Result<String> {
    let cols = opts
        .columns
        .iter()
        .map(|c| quote_oracle(c))
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    let mut sql = format!(
        "SELECT {} FROM {}.{}",
        cols,
        oracle_name(&catalog_name(&opts.schema))?,
        oracle_name(&catalog_name(&opts.table))?
    );
    if !opts.order_by.is_empty() {
        let order = opts
            .order_by
            .iter()
            .map(|c| quote_oracle(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        sql.push_str(" ORDER BY ");
        sql.push_str(&order);
    }
    Ok(sql)
}

/// Stream a table on the blocking thread, sending batches as they fill.
fn read_table_blocking(
    conn: &oracle::Connection,
    opts: &ReadOptions,
    tx: &mpsc::Sender<Result<Batch>>,
) -> Result<()> {
    let sql = build_select(opts)?;
    debug!("Read query: {}", sql);

    let mut stmt = conn.statement(&sql).fetch_array_size(opts.batch_size as u32).build()?;
    let result_set = stmt.query(&[])?;
    let types: Vec<_> = result_set
        .column_info()
        .iter()
        .map(|c| c.oracle_type().clone())
        .collect();

    let mut rows: Vec<Row> = Vec::with_capacity(opts.batch_size);
    for row in result_set {
        let row = row?;
        let values = types
            .iter()
            .enumerate()
            .map(|(i, ty)| read_value(&row, i, ty))
            .collect::<Result<Row>>()?;
        rows.push(values);

        if rows.len() >= opts.batch_size {
            let batch = Batch::new(std::mem::replace(&mut rows, Vec::with_capacity(opts.batch_size)));
            if tx.blocking_send(Ok(batch)).is_err() {
                return Ok(());
            }
        }
    }

    let _ = tx.blocking_send(Ok(Batch::new(rows).mark_final()));
    Ok(())
}
