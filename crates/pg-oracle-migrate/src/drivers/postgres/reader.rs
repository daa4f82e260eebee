//! PostgreSQL source reader implementation.
//!
//! One client connection, used sequentially. Rows are streamed with
//! `query_raw` in primary-key order and regrouped into batches.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_postgres::types::FromSql;
use tokio_postgres::{Client, Config as PgConfig};
use tracing::{debug, info, warn};

use crate::config::{SourceConfig, POSTGRES_DEFAULT_PORT};
use crate::core::identifier::{qualify_pg, quote_pg};
use crate::core::schema::{Column, ForeignKey, Table};
use crate::core::traits::{ReadOptions, SourceReader};
use crate::core::value::{Batch, Row, SqlNullType, SqlValue};
use crate::ddl::synthesize_table_ddl;
use crate::drivers::common::{tls, SslMode};
use crate::error::{MigrateError, Result};

/// PostgreSQL source reader implementation.
pub struct PostgresReader {
    client: Arc<Client>,
}

impl PostgresReader {
    /// Connect using the source configuration.
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        let port = config.port.unwrap_or(POSTGRES_DEFAULT_PORT);
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("pg-oracle-migrate");

        let ssl_mode = SslMode::parse(&config.ssl_mode)?;
        let client = tls::connect(&pg_config, ssl_mode).await?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL source: {}:{}/{}",
            config.host, port, config.database
        );

        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Load columns for a table.
    async fn load_columns(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT
                column_name,
                udt_name,
                COALESCE(character_maximum_length, 0)::int4,
                COALESCE(numeric_precision, 0)::int4,
                COALESCE(numeric_scale, 0)::int4,
                is_nullable = 'YES',
                ordinal_position::int4
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;

        let rows = self
            .client
            .query(query, &[&table.schema, &table.name])
            .await?;

        for row in rows {
            table.columns.push(Column {
                name: row.get(0),
                data_type: row.get(1),
                max_length: row.get(2),
                precision: row.get(3),
                scale: row.get(4),
                is_nullable: row.get(5),
                ordinal_pos: row.get(6),
            });
        }

        debug!(
            "Loaded {} columns for {}",
            table.columns.len(),
            table.full_name()
        );
        Ok(())
    }

    /// Load primary key for a table.
    async fn load_primary_key(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT a.attname
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid
            WHERE n.nspname = $1
              AND t.relname = $2
              AND c.contype = 'p'
              AND a.attnum = ANY(c.conkey)
            ORDER BY array_position(c.conkey, a.attnum)
        "#;

        let rows = self
            .client
            .query(query, &[&table.schema, &table.name])
            .await?;
        table.primary_key = rows.iter().map(|r| r.get::<_, String>(0)).collect();

        debug!(
            "Primary key for {}: {:?}",
            table.full_name(),
            table.primary_key
        );
        Ok(())
    }

    /// Load every foreign key in the schema, keyed by owning table.
    async fn load_foreign_keys(&self, schema: &str) -> Result<HashMap<String, Vec<ForeignKey>>> {
        let query = r#"
            SELECT
                t.relname AS table_name,
                c.conname AS fk_name,
                array_agg(a.attname::text ORDER BY array_position(c.conkey, a.attnum)) AS columns,
                rt.relname AS ref_table,
                array_agg(ra.attname::text ORDER BY array_position(c.confkey, ra.attnum)) AS ref_columns
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(c.conkey)
            JOIN pg_catalog.pg_attribute ra ON ra.attrelid = rt.oid AND ra.attnum = ANY(c.confkey)
            WHERE n.nspname = $1
              AND c.contype = 'f'
            GROUP BY t.relname, c.conname, rt.relname
            ORDER BY t.relname, c.conname
        "#;

        let rows = self.client.query(query, &[&schema]).await?;

        let mut by_table: HashMap<String, Vec<ForeignKey>> = HashMap::new();
        for row in rows {
            by_table
                .entry(row.get::<_, String>(0))
                .or_default()
                .push(ForeignKey {
                    name: row.get(1),
                    columns: row.get(2),
                    ref_table: row.get(3),
                    ref_columns: row.get(4),
                });
        }
        Ok(by_table)
    }
}

#[async_trait]
impl SourceReader for PostgresReader {
    async fn extract_schema(&self, schema: &str) -> Result<Vec<Table>> {
        let query = r#"
            SELECT table_schema, table_name
            FROM information_schema.tables
            WHERE table_type = 'BASE TABLE'
              AND table_schema = $1
            ORDER BY table_name
        "#;

        let rows = self
            .client
            .query(query, &[&schema])
            .await
            .map_err(|e| MigrateError::catalog(schema, e.to_string()))?;
        let mut foreign_keys = self.load_foreign_keys(schema).await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let mut table = Table::new(row.get::<_, String>(0), row.get::<_, String>(1));
            self.load_columns(&mut table).await?;
            self.load_primary_key(&mut table).await?;
            table.foreign_keys = foreign_keys.remove(&table.name).unwrap_or_default();
            tables.push(table);
        }

        info!("Extracted {} tables from schema '{}'", tables.len(), schema);
        Ok(tables)
    }

    async fn get_row_count(&self, schema: &str, table: &str) -> Result<i64> {
        let query = format!("SELECT COUNT(*)::int8 FROM {}", qualify_pg(schema, table)?);
        let row = self.client.query_one(&query, &[]).await?;
        Ok(row.get::<_, i64>(0))
    }

    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(4);
        let client = self.client.clone();

        tokio::spawn(async move {
            if let Err(e) = read_table_internal(client, opts, tx.clone()).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    async fn table_ddl(&self, table: &Table) -> Result<String> {
        synthesize_table_ddl(table)
    }

    async fn test_connection(&self) -> Result<()> {
        self.client.simple_query("SELECT 1").await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        // The connection task ends when the client is dropped.
    }
}

/// Types decoded directly by [`convert_pg_row_value`]. Anything else is
/// selected as `::text` so it arrives as a string instead of failing to
/// decode.
const NATIVE_TYPES: &[&str] = &[
    "bool", "int2", "int4", "int8", "float4", "float8", "uuid", "timestamp", "timestamptz",
    "date", "time", "bytea", "numeric", "json", "jsonb", "text", "varchar", "bpchar", "name",
    "_text", "_varchar", "_bpchar", "_int2", "_int4", "_int8", "_bool", "_float8",
];

fn decodes_natively(udt_name: &str) -> bool {
    NATIVE_TYPES.contains(&udt_name)
}

/// Projection for one column: the column itself, or a text cast for types
/// without a native decoder.
fn select_expr(column: &str, udt_name: Option<&str>) -> Result<String> {
    let quoted = quote_pg(column)?;
    Ok(match udt_name {
        Some(t) if !decodes_natively(t) => format!("{q}::text AS {q}", q = quoted),
        _ => quoted,
    })
}

/// Build the ordered SELECT for one table.
fn build_select(opts: &ReadOptions) -> Result<String> {
    let cols = opts
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| select_expr(c, opts.column_types.get(i).map(String::as_str)))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let mut sql = format!("SELECT {} FROM {}", cols, qualify_pg(&opts.schema, &opts.table)?);
    if !opts.order_by.is_empty() {
        let order = opts
            .order_by
            .iter()
            .map(|c| quote_pg(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        sql.push_str(" ORDER BY ");
        sql.push_str(&order);
    }
    Ok(sql)
}

/// Stream table rows into batches.
///
/// A row with a cell that cannot be decoded is left out of the batch and
/// counted in [`Batch::rejected`]; it never turns into NULLs.
async fn read_table_internal(
    client: Arc<Client>,
    opts: ReadOptions,
    tx: mpsc::Sender<Result<Batch>>,
) -> Result<()> {
    let sql = build_select(&opts)?;
    debug!("Read query: {}", sql);

    let stream = client
        .query_raw(sql.as_str(), std::iter::empty::<&str>())
        .await
        .map_err(|e| MigrateError::transfer(&opts.table, format!("starting read: {}", e)))?;
    tokio::pin!(stream);

    let mut rows: Vec<Row> = Vec::with_capacity(opts.batch_size);
    let mut rejected = 0usize;
    while let Some(item) = stream.next().await {
        let row = item.map_err(|e| MigrateError::transfer(&opts.table, format!("reading row: {}", e)))?;
        let values = row
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                convert_pg_row_value(&row, idx, col.type_().name()).map_err(|e| {
                    format!("column {} ({}): {}", col.name(), col.type_().name(), e)
                })
            })
            .collect::<std::result::Result<Row, String>>();

        match values {
            Ok(values) => rows.push(values),
            Err(e) => {
                warn!("{}: row rejected, {}", opts.table, e);
                rejected += 1;
            }
        }

        if rows.len() + rejected >= opts.batch_size {
            let batch = Batch::new(std::mem::replace(&mut rows, Vec::with_capacity(opts.batch_size)))
                .with_rejected(std::mem::take(&mut rejected));
            if tx.send(Ok(batch)).await.is_err() {
                warn!("{}: reader stopped, receiver dropped", opts.table);
                return Ok(());
            }
        }
    }

    let _ = tx
        .send(Ok(Batch::new(rows).with_rejected(rejected).mark_final()))
        .await;
    Ok(())
}

type Decoded = std::result::Result<SqlValue<'static>, tokio_postgres::Error>;

/// Read one nullable cell.
fn get_value<'a, T, F>(row: &'a tokio_postgres::Row, idx: usize, null: SqlNullType, wrap: F) -> Decoded
where
    T: FromSql<'a>,
    F: FnOnce(T) -> SqlValue<'static>,
{
    Ok(match row.try_get::<_, Option<T>>(idx)? {
        Some(v) => wrap(v),
        None => SqlValue::Null(null),
    })
}

/// Read a PostgreSQL array as a JSON array.
fn get_array<'a, T>(row: &'a tokio_postgres::Row, idx: usize) -> Decoded
where
    T: FromSql<'a> + Into<serde_json::Value>,
{
    get_value(row, idx, SqlNullType::Json, |items: Vec<Option<T>>| {
        SqlValue::Json(serde_json::Value::Array(
            items
                .into_iter()
                .map(|v| v.map(Into::into).unwrap_or(serde_json::Value::Null))
                .collect(),
        ))
    })
}

/// Convert a PostgreSQL row value to SqlValue.
fn convert_pg_row_value(row: &tokio_postgres::Row, idx: usize, data_type: &str) -> Decoded {
    match data_type {
        "bool" => get_value(row, idx, SqlNullType::Bool, SqlValue::Bool),
        "int2" => get_value(row, idx, SqlNullType::I16, SqlValue::I16),
        "int4" => get_value(row, idx, SqlNullType::I32, SqlValue::I32),
        "int8" => get_value(row, idx, SqlNullType::I64, SqlValue::I64),
        "float4" => get_value(row, idx, SqlNullType::F32, SqlValue::F32),
        "float8" => get_value(row, idx, SqlNullType::F64, SqlValue::F64),
        "uuid" => get_value(row, idx, SqlNullType::Uuid, SqlValue::Uuid),
        "timestamp" => get_value(row, idx, SqlNullType::DateTime, SqlValue::DateTime),
        "timestamptz" => get_value(
            row,
            idx,
            SqlNullType::DateTimeOffset,
            |v: chrono::DateTime<chrono::Utc>| SqlValue::DateTimeOffset(v.fixed_offset()),
        ),
        "date" => get_value(row, idx, SqlNullType::Date, SqlValue::Date),
        "time" => get_value(row, idx, SqlNullType::Time, SqlValue::Time),
        "bytea" => get_value(row, idx, SqlNullType::Bytes, |b: Vec<u8>| {
            SqlValue::Bytes(Cow::Owned(b))
        }),
        "numeric" => get_value(row, idx, SqlNullType::Decimal, SqlValue::Decimal),
        "json" | "jsonb" => get_value(row, idx, SqlNullType::Json, SqlValue::Json),
        "_text" | "_varchar" | "_bpchar" => get_array::<String>(row, idx),
        "_int2" => get_array::<i16>(row, idx),
        "_int4" => get_array::<i32>(row, idx),
        "_int8" => get_array::<i64>(row, idx),
        "_bool" => get_array::<bool>(row, idx),
        "_float8" => get_array::<f64>(row, idx),
        _ => get_value(row, idx, SqlNullType::String, |s: String| {
            SqlValue::Text(Cow::Owned(s))
        }),
    }
}
