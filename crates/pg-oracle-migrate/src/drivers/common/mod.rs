//! Utilities shared by the drivers.
//!
//! - [`tls`]: TLS setup for the PostgreSQL source

pub mod tls;

pub use tls::SslMode;
