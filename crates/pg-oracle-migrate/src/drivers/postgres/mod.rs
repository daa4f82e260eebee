//! PostgreSQL driver.
//!
//! - [`PostgresReader`]: source reader for PostgreSQL databases

mod reader;

pub use reader::PostgresReader;
