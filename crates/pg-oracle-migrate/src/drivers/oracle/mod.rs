//! Oracle driver.
//!
//! The `oracle` crate is blocking, so every call runs on
//! `tokio::task::spawn_blocking` against one connection guarded by an async
//! mutex. Calls are serialized; there is no pooling.
//!
//! - [`OracleReader`]: source reader for Oracle-to-Oracle copies
//! - [`OracleWriter`]: target writer and script session

mod reader;
mod value;
mod writer;

pub use reader::OracleReader;
pub use writer::OracleWriter;

use std::sync::Arc;

use oracle::{Connection, Connector, Privilege};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::OracleConnectParams;
use crate::error::{MigrateError, Result};

/// A shared handle to one Oracle connection.
#[derive(Clone)]
pub struct OracleConnection {
    conn: Arc<Mutex<Connection>>,
    user: String,
}

impl OracleConnection {
    /// Open a connection.
    pub async fn connect(params: &OracleConnectParams) -> Result<Self> {
        let params = params.clone();
        let connect_string = params.connect_string.clone();
        let (conn, user) = tokio::task::spawn_blocking(move || -> Result<(Connection, String)> {
            let mut connector =
                Connector::new(&params.user, &params.password, &params.connect_string);
            if params.sysdba {
                connector.privilege(Privilege::Sysdba);
            }
            let conn = connector.connect()?;
            let user = conn.query_row_as::<String>("SELECT USER FROM DUAL", &[])?;
            Ok((conn, user.to_uppercase()))
        })
        .await
        .map_err(|e| MigrateError::oracle(format!("connection task failed: {}", e)))??;
        info!("Connected to Oracle: {}@{}", user, connect_string);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            user,
        })
    }

    /// The connected user (upper case), which is also the default schema.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Run a closure against the connection on the blocking pool.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.blocking_lock();
            f(&guard)
        })
        .await
        .map_err(|e| MigrateError::oracle(format!("Oracle worker task failed: {}", e)))?
    }

    /// Close the session.
    pub async fn close(&self) {
        let _ = self
            .with_conn(|conn| conn.close().map_err(MigrateError::from))
            .await;
    }
}

/// Strip the quotes `oracle_name` adds, giving the catalog spelling.
pub(crate) fn catalog_name(name: &str) -> String {
    match name.strip_prefix('"').and_then(|n| n.strip_suffix('"')) {
        Some(inner) => inner.to_string(),
        None => name.to_uppercase(),
    }
}
