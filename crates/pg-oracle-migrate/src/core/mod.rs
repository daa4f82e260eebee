//! Core abstractions shared by every phase.
//!
//! - [`schema`]: table, column, key and sequence metadata
//! - [`value`]: SQL values moved between engines
//! - [`traits`]: reader, writer and script-session traits
//! - [`identifier`]: identifier validation and quoting

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{Column, ConstraintKind, ForeignKey, IndexRef, SequenceDef, Table};
pub use traits::{ReadOptions, ScriptSession, SourceReader, TargetWriter};
pub use value::{Batch, Row, SqlNullType, SqlValue};
