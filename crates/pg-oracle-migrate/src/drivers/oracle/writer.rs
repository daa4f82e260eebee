//! Oracle target writer and script session.

use async_trait::async_trait;
use oracle::sql_type::{OracleType, ToSql};
use tracing::debug;

use super::value::{bind_type, to_bind};
use super::{catalog_name, OracleConnection};
use crate::config::OracleConnectParams;
use crate::core::identifier::{oracle_name, quote_oracle};
use crate::core::schema::{Column, ConstraintKind};
use crate::core::traits::{ScriptSession, TargetWriter};
use crate::core::value::{Row, SqlValue};
use crate::error::{MigrateError, Result};

const COLUMNS_QUERY: &str = r#"
    SELECT column_name, data_type,
           NVL(char_length, 0), NVL(data_precision, 0), NVL(data_scale, 0),
           nullable, column_id
    FROM user_tab_columns
    WHERE table_name = :1
    ORDER BY column_id
"#;

const PRIMARY_KEY_QUERY: &str = r#"
    SELECT cc.column_name
    FROM user_constraints c
    JOIN user_cons_columns cc ON cc.constraint_name = c.constraint_name
    WHERE c.table_name = :1 AND c.constraint_type = 'P'
    ORDER BY cc.position
"#;

/// Largest line `DBMS_OUTPUT.GET_LINE` returns.
const OUTPUT_LINE_MAX: u32 = 32767;

/// Oracle target writer implementation.
pub struct OracleWriter {
    conn: OracleConnection,
}

impl OracleWriter {
    pub async fn new(params: &OracleConnectParams) -> Result<Self> {
        Ok(Self {
            conn: OracleConnection::connect(params).await?,
        })
    }

    /// The connected user, used as the default target schema.
    pub fn user(&self) -> &str {
        self.conn.user()
    }

    async fn query_strings(&self, sql: &'static str, params: Vec<String>) -> Result<Vec<String>> {
        self.conn
            .with_conn(move |conn| {
                let binds: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
                let mut out = Vec::new();
                for row in conn.query_as::<String>(sql, &binds)? {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }
}

/// `INSERT INTO T ("A", "B") VALUES (:1, :2)`.
///
/// Column names come from the destination catalog and are quoted as stored,
/// which keeps reserved words and mixed-case names valid.
fn build_insert(table: &str, columns: &[Column]) -> Result<String> {
    let names = columns
        .iter()
        .map(|c| quote_oracle(&c.name))
        .collect::<Result<Vec<_>>>()?;
    let binds = (1..=columns.len())
        .map(|i| format!(":{}", i))
        .collect::<Vec<_>>();
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        oracle_name(&catalog_name(table))?,
        names.join(", "),
        binds.join(", ")
    ))
}

#[async_trait]
impl TargetWriter for OracleWriter {
    async fn table_names(&self) -> Result<Vec<String>> {
        self.query_strings("SELECT table_name FROM user_tables ORDER BY table_name", Vec::new())
            .await
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<Column>> {
        let name = catalog_name(table);
        self.conn
            .with_conn(move |conn| {
                let rows = conn
                    .query_as::<(String, String, i32, i32, i32, String, i32)>(COLUMNS_QUERY, &[&name])
                    .map_err(|e| MigrateError::catalog(&name, e.to_string()))?;
                let mut columns = Vec::new();
                for row in rows {
                    let (col, data_type, len, precision, scale, nullable, pos) =
                        row.map_err(|e| MigrateError::catalog(&name, e.to_string()))?;
                    columns.push(Column {
                        name: col,
                        data_type,
                        max_length: len,
                        precision,
                        scale,
                        is_nullable: nullable == "Y",
                        ordinal_pos: pos,
                    });
                }
                Ok(columns)
            })
            .await
    }

    async fn get_row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", oracle_name(&catalog_name(table))?);
        self.conn
            .with_conn(move |conn| Ok(conn.query_row_as::<i64>(&sql, &[])?))
            .await
    }

    async fn sequence_names(&self) -> Result<Vec<String>> {
        self.query_strings("SELECT sequence_name FROM user_sequences", Vec::new())
            .await
    }

    async fn constraint_names(&self, table: &str, kind: ConstraintKind) -> Result<Vec<String>> {
        self.query_strings(
            "SELECT constraint_name FROM user_constraints \
             WHERE table_name = :1 AND constraint_type = :2",
            vec![catalog_name(table), kind.oracle_code().to_string()],
        )
        .await
    }

    async fn primary_key_columns(&self, table: &str) -> Result<Vec<String>> {
        self.query_strings(PRIMARY_KEY_QUERY, vec![catalog_name(table)])
            .await
    }

    async fn max_value(&self, table: &str, column: &str) -> Result<Option<SqlValue<'static>>> {
        let sql = format!(
            "SELECT TO_CHAR(MAX({})) FROM {}",
            oracle_name(&catalog_name(column))?,
            oracle_name(&catalog_name(table))?
        );
        let max = self
            .conn
            .with_conn(move |conn| Ok(conn.query_row_as::<Option<String>>(&sql, &[])?))
            .await?;
        Ok(max.map(|s| match s.parse::<i64>() {
            Ok(v) => SqlValue::I64(v),
            Err(_) => SqlValue::text_owned(s),
        }))
    }

    async fn insert_batch(&self, table: &str, columns: &[Column], rows: Vec<Row>) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = build_insert(table, columns)?;
        let types: Vec<Option<OracleType>> = columns.iter().map(bind_type).collect();
        let n = rows.len();

        self.conn
            .with_conn(move |conn| {
                let mut batch = conn.batch(&sql, n).build()?;
                for (i, ty) in types.iter().enumerate() {
                    if let Some(ty) = ty {
                        batch.set_type(i + 1, ty)?;
                    }
                }
                for row in &rows {
                    let values: Vec<Box<dyn ToSql>> = row.iter().map(to_bind).collect();
                    let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
                    batch.append_row(&refs)?;
                }
                batch.execute()?;
                Ok(n as u64)
            })
            .await
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        debug!("Executing: {}", sql);
        let sql = sql.to_string();
        self.conn
            .with_conn(move |conn| {
                conn.execute(&sql, &[])?;
                Ok(())
            })
            .await
    }

    async fn commit(&self) -> Result<()> {
        self.conn.with_conn(|conn| Ok(conn.commit()?)).await
    }

    async fn rollback(&self) -> Result<()> {
        self.conn.with_conn(|conn| Ok(conn.rollback()?)).await
    }

    async fn test_connection(&self) -> Result<()> {
        self.conn
            .with_conn(|conn| {
                conn.query_row_as::<i64>("SELECT 1 FROM DUAL", &[])?;
                Ok(())
            })
            .await
    }

    fn db_type(&self) -> &str {
        "oracle"
    }

    async fn close(&self) {
        self.conn.close().await;
    }
}

#[async_trait]
impl ScriptSession for OracleWriter {
    async fn enable_output(&self, buffer_size: u32) -> Result<()> {
        self.conn
            .with_conn(move |conn| {
                conn.execute("BEGIN DBMS_OUTPUT.ENABLE(:1); END;", &[&buffer_size])?;
                Ok(())
            })
            .await
    }

    async fn execute_block(&self, text: &str) -> Result<()> {
        let text = text.to_string();
        self.conn
            .with_conn(move |conn| {
                conn.execute(&text, &[])
                    .map_err(|e| MigrateError::Script(e.to_string()))?;
                Ok(())
            })
            .await
    }

    async fn read_output(&self) -> Result<Vec<String>> {
        self.conn
            .with_conn(|conn| {
                let mut stmt = conn
                    .statement("BEGIN DBMS_OUTPUT.GET_LINE(:1, :2); END;")
                    .build()?;
                let mut lines = Vec::new();
                loop {
                    stmt.execute(&[&OracleType::Varchar2(OUTPUT_LINE_MAX), &OracleType::Number(0, 0)])?;
                    let status: i32 = stmt.bind_value(2)?;
                    if status != 0 {
                        break;
                    }
                    let line: Option<String> = stmt.bind_value(1)?;
                    lines.push(line.unwrap_or_default());
                }
                Ok(lines)
            })
            .await
    }

    async fn commit(&self) -> Result<()> {
        TargetWriter::commit(self).await
    }

    async fn rollback(&self) -> Result<()> {
        TargetWriter::rollback(self).await
    }
}
