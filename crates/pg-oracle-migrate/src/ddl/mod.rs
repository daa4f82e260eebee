//! DDL extraction, cleaning and application.
//!
//! Oracle sources hand out `DBMS_METADATA` text full of physical attributes
//! (tablespaces, storage blocks, logging modes) that do not transfer between
//! instances. [`clean_ddl`] strips those and retargets the schema qualifier;
//! it never touches column, constraint or index structure.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::core::identifier::{oracle_name, quote_oracle};
use crate::core::schema::{IndexRef, Table};
use crate::core::traits::{SourceReader, TargetWriter};
use crate::error::Result;
use crate::report::{PhaseSummary, UnitOutcome};
use crate::typemap::map_type;

/// Kind of object a DDL document creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlKind {
    Table,
    Index,
}

impl std::fmt::Display for DdlKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DdlKind::Table => "TABLE",
            DdlKind::Index => "INDEX",
        })
    }
}

/// One `CREATE` statement ready for the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdlDocument {
    pub kind: DdlKind,
    pub name: String,
    pub text: String,
}

impl DdlDocument {
    pub fn new(kind: DdlKind, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            text: text.into(),
        }
    }
}

fn re(pattern: &str) -> Regex {
    // Patterns are literals in this module; a bad one is a programming error.
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid DDL pattern {pattern}: {e}"))
}

/// Placeholder delimiter for masked quoted text. Never appears in DDL.
const MASK: char = '\u{1}';

/// Physical attributes removed from extracted DDL, applied in order.
///
/// They run over masked text, so quoted identifiers and string literals
/// show up only as `\u{1}N\u{1}` placeholders and cannot match.
static STRIP_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bTABLESPACE\s+(\x01\d+\x01|\w+)",
        r"(?i)\bSEGMENT\s+CREATION\s+\w+",
        r"(?i)\b(PCTFREE|PCTUSED|INITRANS|MAXTRANS)\s+\d+",
        r"(?i)\bSTORAGE\s*\([^)]*\)",
        r"(?i)\b(NO)?LOGGING\b",
        r"(?i)\bNOCOMPRESS\b",
        r"(?i)\bCOMPRESS(\s+(BASIC|FOR\s+\w+(\s+\w+)?|\d+))?\b",
        r"(?i)\bNOCACHE\b",
        r"(?i)\b(NO)?PARALLEL(\s+\d+)?\b",
        r"(?i)\b(NO)?MONITORING\b",
        r"(?i)\bCOMPUTE\s+STATISTICS\b",
    ]
    .iter()
    .map(|p| re(p))
    .collect()
});

static EMPTY_USING_INDEX: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\bUSING\s+INDEX\s+ENABLE\b"));
static TRAILING_SPACE: LazyLock<Regex> = LazyLock::new(|| re(r"[ \t]+\n"));
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| re(r"\n\s*\n\s*\n"));
static QUALIFIER: LazyLock<Regex> = LazyLock::new(|| re(r"\x01(\d+)\x01\s*\."));
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| re(r"\x01(\d+)\x01"));

/// Replace every `"..."` identifier and `'...'` literal with a numbered
/// placeholder. An unterminated quote runs to the end of the text.
fn mask_quoted(ddl: &str) -> (String, Vec<String>) {
    let mut masked = String::with_capacity(ddl.len());
    let mut quoted = Vec::new();
    let mut chars = ddl.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '"' && c != '\'' {
            masked.push(c);
            continue;
        }
        let mut token = String::from(c);
        while let Some(next) = chars.next() {
            token.push(next);
            if next == c {
                // '' inside a literal is an escaped quote
                if c == '\'' && chars.peek() == Some(&'\'') {
                    if let Some(escaped) = chars.next() {
                        token.push(escaped);
                    }
                    continue;
                }
                break;
            }
        }
        masked.push(MASK);
        masked.push_str(&quoted.len().to_string());
        masked.push(MASK);
        quoted.push(token);
    }
    (masked, quoted)
}

fn unmask(masked: &str, quoted: &[String]) -> String {
    PLACEHOLDER
        .replace_all(masked, |caps: &regex::Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| quoted.get(i))
                .cloned()
                .unwrap_or_default()
        })
        .into_owned()
}

/// Strip physical attributes and retarget `"SRC".` to `"DST".`.
///
/// Only text outside quotes is rewritten. Applying it twice gives the same
/// text as applying it once.
pub fn clean_ddl(ddl: &str, source_schema: &str, target_schema: &str) -> String {
    let (mut text, mut quoted) = mask_quoted(ddl);

    if !source_schema.is_empty() && source_schema != target_schema {
        let source = format!("\"{}\"", source_schema);
        let qualifiers: Vec<usize> = QUALIFIER
            .captures_iter(&text)
            .filter_map(|caps| caps[1].parse().ok())
            .collect();
        for i in qualifiers {
            if quoted.get(i) == Some(&source) {
                quoted[i] = format!("\"{}\"", target_schema);
            }
        }
    }

    for pattern in STRIP_PATTERNS.iter() {
        text = pattern.replace_all(&text, "").into_owned();
    }

    text = EMPTY_USING_INDEX.replace_all(&text, "ENABLE").into_owned();
    text = TRAILING_SPACE.replace_all(&text, "\n").into_owned();
    text = BLANK_RUNS.replace_all(&text, "\n\n").into_owned();
    unmask(text.trim(), &quoted)
}

/// Build Oracle `CREATE TABLE` text from a PostgreSQL catalog entry.
pub fn synthesize_table_ddl(table: &Table) -> Result<String> {
    let table_name = oracle_name(&table.name)?;
    let mut lines = Vec::with_capacity(table.columns.len() + 1);

    for col in &table.columns {
        let mapping = map_type(&col.data_type, col.max_length, col.precision, col.scale);
        if let Some(warning) = &mapping.warning {
            warn!("{}.{}: {}", table.name, col.name, warning);
        }
        let mut line = format!(
            "  {} {}",
            quote_oracle(&col.name.to_uppercase())?,
            mapping.target_type
        );
        if !col.is_nullable {
            line.push_str(" NOT NULL");
        }
        lines.push(line);
    }

    if table.has_pk() {
        let pk_cols = table
            .primary_key
            .iter()
            .map(|c| quote_oracle(&c.to_uppercase()))
            .collect::<Result<Vec<_>>>()?;
        lines.push(format!(
            "  CONSTRAINT {} PRIMARY KEY ({})",
            oracle_name(&format!("PK_{}", table.name))?,
            pk_cols.join(", ")
        ));
    }

    Ok(format!("CREATE TABLE {} (\n{}\n)", table_name, lines.join(",\n")))
}

/// Extract and clean the DDL for one table.
pub async fn extract_table_ddl(
    source: &dyn SourceReader,
    table: &Table,
    source_schema: &str,
    target_schema: &str,
) -> Result<DdlDocument> {
    let raw = source.table_ddl(table).await?;
    Ok(DdlDocument::new(
        DdlKind::Table,
        &table.name,
        clean_ddl(&raw, source_schema, target_schema),
    ))
}

/// Execute a document on the target. An existing object counts as skipped.
pub async fn apply_ddl(target: &dyn TargetWriter, doc: &DdlDocument) -> UnitOutcome {
    debug!("Applying {} DDL for {}:\n{}", doc.kind, doc.name, doc.text);
    match target.execute(&doc.text).await {
        Ok(()) => UnitOutcome::Success,
        Err(e) if e.is_already_exists() => UnitOutcome::skipped("already exists"),
        Err(e) => UnitOutcome::failed(e.summary()),
    }
}

/// Create every table on the target, one unit per table.
pub async fn create_tables(
    source: &dyn SourceReader,
    target: &dyn TargetWriter,
    tables: &[Table],
    source_schema: &str,
    target_schema: &str,
) -> PhaseSummary {
    let mut summary = PhaseSummary::new("schema");
    for table in tables {
        let outcome = match extract_table_ddl(source, table, source_schema, target_schema).await {
            Ok(doc) => apply_ddl(target, &doc).await,
            Err(e) => UnitOutcome::failed(e.summary()),
        };
        log_outcome(DdlKind::Table, &table.name, &outcome);
        summary.record(&table.name, outcome);
    }
    info!(
        "Tables: {} created, {} already present, {} failed",
        summary.succeeded, summary.skipped, summary.failed
    );
    summary
}

/// Recreate custom indexes from the source on the target.
pub async fn create_indexes(
    source: &dyn SourceReader,
    target: &dyn TargetWriter,
    indexes: &[IndexRef],
    source_schema: &str,
    target_schema: &str,
) -> PhaseSummary {
    let mut summary = PhaseSummary::new("indexes");
    for index in indexes {
        let outcome = match source.index_ddl(source_schema, index).await {
            Ok(raw) => {
                let doc = DdlDocument::new(
                    DdlKind::Index,
                    &index.name,
                    clean_ddl(&raw, source_schema, target_schema),
                );
                apply_ddl(target, &doc).await
            }
            Err(e) => UnitOutcome::failed(e.summary()),
        };
        log_outcome(DdlKind::Index, &index.name, &outcome);
        summary.record(&index.name, outcome);
    }
    summary
}

fn log_outcome(kind: DdlKind, name: &str, outcome: &UnitOutcome) {
    match outcome {
        UnitOutcome::Success => info!("Created {} {}", kind, name),
        UnitOutcome::Skipped(reason) => info!("{} {} skipped: {}", kind, name, reason),
        UnitOutcome::Failed(message) => warn!("{} {} failed: {}", kind, name, message),
    }
}
