//! Runner for SQL*Plus-style migration scripts.
//!
//! A script is a sequence of SQL statements and PL/SQL blocks separated by
//! lines holding a single `/`. Client-only directives (`SET SERVEROUTPUT`,
//! `PROMPT`, `SPOOL`, ...) are dropped during parsing. Blocks run in file
//! order on one session; the run commits once at the end if every block
//! succeeded and rolls back otherwise.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::traits::ScriptSession;
use crate::error::Result;

/// `DBMS_OUTPUT` buffer requested before each block.
pub const OUTPUT_BUFFER_SIZE: u32 = 1_000_000;

/// Maximum preview length in characters.
const PREVIEW_CHARS: usize = 100;

/// Leading keywords of client directives that never reach the server.
const DIRECTIVES: &[&str] = &[
    "SET SERVEROUTPUT",
    "SET DEFINE",
    "SET ECHO",
    "SET FEEDBACK",
    "SET VERIFY",
    "SET TIMING",
    "SET LINESIZE",
    "SET PAGESIZE",
    "PROMPT",
    "SPOOL",
];

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid comment pattern"));
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--[^\n]*").expect("valid comment pattern"));
static PLSQL_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(BEGIN|DECLARE|CREATE\s+(OR\s+REPLACE\s+)?(EDITIONABLE\s+|NONEDITIONABLE\s+)?(PROCEDURE|FUNCTION|PACKAGE|TRIGGER|TYPE)\b)",
    )
    .expect("valid PL/SQL pattern")
});

/// What a block is, which decides how it is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// A single SQL statement (trailing `;` removed).
    Sql,
    /// An anonymous block or stored-unit definition (sent verbatim).
    PlSql,
    /// A bare `COMMIT`.
    Commit,
}

/// One executable block of a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptBlock {
    /// 1-based position among executable blocks.
    pub index: usize,
    pub kind: BlockKind,
    pub text: String,
}

impl ScriptBlock {
    /// First line of the block, at most 100 characters.
    pub fn preview(&self) -> String {
        self.text
            .lines()
            .next()
            .unwrap_or_default()
            .chars()
            .take(PREVIEW_CHARS)
            .collect()
    }
}

fn is_directive(line: &str) -> bool {
    let upper = line.trim().to_uppercase();
    DIRECTIVES.iter().any(|d| {
        upper == *d
            || upper
                .strip_prefix(d)
                .is_some_and(|rest| rest.starts_with(char::is_whitespace))
    })
}

fn is_comment_only(text: &str) -> bool {
    let without_blocks = BLOCK_COMMENT.replace_all(text, "");
    LINE_COMMENT.replace_all(&without_blocks, "").trim().is_empty()
}

/// Text with leading comments removed, used to classify a block.
fn code_start(text: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(text, "");
    LINE_COMMENT
        .replace_all(&without_blocks, "")
        .trim_start()
        .to_string()
}

fn classify(text: &str) -> BlockKind {
    let code = code_start(text);
    let upper = code.trim().to_uppercase();
    if upper == "COMMIT" || upper == "COMMIT;" {
        BlockKind::Commit
    } else if PLSQL_START.is_match(&code) {
        BlockKind::PlSql
    } else {
        BlockKind::Sql
    }
}

fn finish_block(lines: &mut Vec<&str>, blocks: &mut Vec<ScriptBlock>) {
    let text = lines.join("\n").trim().to_string();
    lines.clear();
    if text.is_empty() || is_comment_only(&text) {
        return;
    }

    let kind = classify(&text);
    let text = match kind {
        BlockKind::Sql => text.trim_end_matches(';').trim_end().to_string(),
        BlockKind::PlSql | BlockKind::Commit => text,
    };
    blocks.push(ScriptBlock {
        index: blocks.len() + 1,
        kind,
        text,
    });
}

/// Split a script into executable blocks.
pub fn parse(script: &str) -> Vec<ScriptBlock> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in script.lines() {
        if line.trim_end() == "/" {
            finish_block(&mut current, &mut blocks);
        } else if !is_directive(line) {
            current.push(line);
        }
    }
    finish_block(&mut current, &mut blocks);

    debug!("Parsed {} executable blocks", blocks.len());
    blocks
}

/// Options for [`execute`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Keep running after a failed block. The run still rolls back.
    pub continue_on_error: bool,
    /// List the blocks without touching the session.
    pub dry_run: bool,
}

/// Status of one block after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum BlockStatus {
    Ok,
    Failed(String),
    /// Not executed because it was never reached.
    NotAttempted,
    /// Not executed on purpose (e.g. a COMMIT after a failure).
    Skipped(String),
    /// Listed by a dry run.
    DryRun,
}

impl BlockStatus {
    pub fn label(&self) -> &'static str {
        match self {
            BlockStatus::Ok => "OK",
            BlockStatus::Failed(_) => "FAILED",
            BlockStatus::NotAttempted => "NOT ATTEMPTED",
            BlockStatus::Skipped(_) => "SKIPPED",
            BlockStatus::DryRun => "DRY-RUN",
        }
    }
}

/// Result of one block.
#[derive(Debug, Clone, Serialize)]
pub struct BlockResult {
    pub index: usize,
    pub kind: BlockKind,
    pub preview: String,
    pub status: BlockStatus,
    /// Lines captured from `DBMS_OUTPUT`.
    pub output: Vec<String>,
}

/// Result of a whole script run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScriptReport {
    pub blocks: Vec<BlockResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub committed: bool,
    pub rolled_back: bool,
    pub dry_run: bool,
}

impl ScriptReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn status_of(&self, index: usize) -> Option<&BlockStatus> {
        self.blocks.iter().find(|b| b.index == index).map(|b| &b.status)
    }

    /// Human-readable run log.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        if self.dry_run {
            let _ = writeln!(out, "[DRY-RUN MODE - No DB changes]");
        }
        for block in &self.blocks {
            let _ = writeln!(
                out,
                "  [{}] Block {}: {}",
                block.status.label(),
                block.index,
                block.preview
            );
            for line in &block.output {
                let _ = writeln!(out, "       > {}", line);
            }
            if let BlockStatus::Failed(message) = &block.status {
                let _ = writeln!(out, "        Error: {}", message);
            }
        }
        if self.dry_run {
            let _ = writeln!(out, "\nTotal: {} blocks", self.blocks.len());
        } else if self.is_success() {
            let _ = writeln!(out, "\n=== Migration Complete: {} blocks OK ===", self.succeeded);
        } else {
            let _ = writeln!(
                out,
                "\n=== Migration FAILED: {} OK, {} FAILED (rolled back) ===",
                self.succeeded, self.failed
            );
        }
        out
    }
}

/// Run one non-commit block: enable output, execute, drain output.
async fn run_block(session: &dyn ScriptSession, block: &ScriptBlock) -> Result<Vec<String>> {
    session.enable_output(OUTPUT_BUFFER_SIZE).await?;
    session.execute_block(&block.text).await?;
    session.read_output().await
}

/// List blocks without a session.
pub fn dry_run(blocks: &[ScriptBlock]) -> ScriptReport {
    ScriptReport {
        blocks: blocks
            .iter()
            .map(|b| BlockResult {
                index: b.index,
                kind: b.kind,
                preview: b.preview(),
                status: BlockStatus::DryRun,
                output: Vec::new(),
            })
            .collect(),
        dry_run: true,
        ..Default::default()
    }
}

/// Execute parsed blocks in order on one session.
///
/// Errors inside a block are recorded in the report. Only a failing final
/// commit or rollback is returned as `Err`.
pub async fn execute(
    session: &dyn ScriptSession,
    blocks: &[ScriptBlock],
    opts: RunOptions,
) -> Result<ScriptReport> {
    if opts.dry_run {
        return Ok(dry_run(blocks));
    }
    let mut report = ScriptReport::default();

    let mut stopped = false;
    for block in blocks {
        let mut result = BlockResult {
            index: block.index,
            kind: block.kind,
            preview: block.preview(),
            status: BlockStatus::NotAttempted,
            output: Vec::new(),
        };

        if stopped {
            report.blocks.push(result);
            continue;
        }

        result.status = match block.kind {
            BlockKind::Commit if report.failed > 0 => {
                warn!("Block {}: COMMIT skipped after a failed block", block.index);
                BlockStatus::Skipped("earlier block failed".to_string())
            }
            BlockKind::Commit => match session.commit().await {
                Ok(()) => BlockStatus::Ok,
                Err(e) => BlockStatus::Failed(e.summary()),
            },
            BlockKind::Sql | BlockKind::PlSql => match run_block(session, block).await {
                Ok(output) => {
                    result.output = output;
                    BlockStatus::Ok
                }
                Err(e) => BlockStatus::Failed(e.summary()),
            },
        };

        match &result.status {
            BlockStatus::Ok => {
                report.succeeded += 1;
                info!("[OK] Block {}: {}", block.index, result.preview);
            }
            BlockStatus::Failed(message) => {
                report.failed += 1;
                warn!("[ERR] Block {}: {}: {}", block.index, result.preview, message);
                if !opts.continue_on_error {
                    warn!("Stopped at block {}", block.index);
                    stopped = true;
                }
            }
            _ => {}
        }
        report.blocks.push(result);
    }

    if report.failed == 0 {
        session.commit().await?;
        report.committed = true;
    } else {
        session.rollback().await?;
        report.rolled_back = true;
    }

    Ok(report)
}
