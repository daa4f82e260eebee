//! Run statistics and outcome aggregation.
//!
//! Every phase reduces its work to per-unit outcomes (a table, a sequence,
//! a constraint, a script block) and folds them into a [`PhaseSummary`].
//! Nothing propagates past a unit boundary except phase-fatal errors.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Status column of the data report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TableStatus {
    Ok,
    Warn,
    Skip,
}

impl std::fmt::Display for TableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TableStatus::Ok => "OK",
            TableStatus::Warn => "WARN",
            TableStatus::Skip => "SKIP",
        })
    }
}

/// Per-table copy statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub table: String,
    pub source_count: i64,
    pub target_count: i64,
    pub error_count: i64,
    /// Set when the table was not copied because the source was empty.
    #[serde(default)]
    pub skipped: bool,
}

impl TableStats {
    pub fn new(table: impl Into<String>, source_count: i64, target_count: i64, error_count: i64) -> Self {
        Self {
            table: table.into(),
            source_count,
            target_count,
            error_count,
            skipped: false,
        }
    }

    /// An empty source table: `(0, 0, 0)`, status SKIP.
    pub fn empty(table: impl Into<String>) -> Self {
        Self {
            skipped: true,
            ..Self::new(table, 0, 0, 0)
        }
    }

    /// OK when every row arrived without errors, WARN when any row failed,
    /// SKIP otherwise.
    pub fn status(&self) -> TableStatus {
        if self.skipped {
            TableStatus::Skip
        } else if self.error_count == 0 && self.source_count == self.target_count {
            TableStatus::Ok
        } else if self.error_count > 0 {
            TableStatus::Warn
        } else {
            TableStatus::Skip
        }
    }
}

/// Outcome of one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum UnitOutcome {
    Success,
    Skipped(String),
    Failed(String),
}

impl UnitOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        UnitOutcome::Skipped(reason.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        UnitOutcome::Failed(message.into())
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, UnitOutcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            UnitOutcome::Success => "OK",
            UnitOutcome::Skipped(_) => "SKIP",
            UnitOutcome::Failed(_) => "FAILED",
        }
    }
}

/// A named unit outcome as recorded in a summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitResult {
    pub unit: String,
    #[serde(flatten)]
    pub outcome: UnitOutcome,
}

/// Folded outcomes of one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase: String,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub units: Vec<UnitResult>,
}

impl PhaseSummary {
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            ..Default::default()
        }
    }

    /// Fold one outcome into the summary.
    pub fn record(&mut self, unit: impl Into<String>, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Success => self.succeeded += 1,
            UnitOutcome::Skipped(_) => self.skipped += 1,
            UnitOutcome::Failed(_) => self.failed += 1,
        }
        self.units.push(UnitResult {
            unit: unit.into(),
            outcome,
        });
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitResult> {
        self.units.iter().filter(|u| u.outcome.is_failed())
    }
}

impl FromIterator<(String, UnitOutcome)> for PhaseSummary {
    fn from_iter<I: IntoIterator<Item = (String, UnitOutcome)>>(iter: I) -> Self {
        let mut summary = PhaseSummary::default();
        for (unit, outcome) in iter {
            summary.record(unit, outcome);
        }
        summary
    }
}

/// Copy statistics for a whole run, in copy order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataReport {
    pub tables: Vec<TableStats>,
}

impl DataReport {
    pub fn push(&mut self, stats: TableStats) {
        self.tables.push(stats);
    }

    pub fn total_source(&self) -> i64 {
        self.tables.iter().map(|t| t.source_count).sum()
    }

    pub fn total_target(&self) -> i64 {
        self.tables.iter().map(|t| t.target_count).sum()
    }

    pub fn total_errors(&self) -> i64 {
        self.tables.iter().map(|t| t.error_count).sum()
    }

    pub fn is_success(&self) -> bool {
        self.total_errors() == 0
    }

    /// Render the fixed-width table printed at the end of a data run.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<26} | {:>6} | {:>6} | {:>6} | Status",
            "Table Name", "Source", "Target", "Errors"
        );
        let _ = writeln!(out, "{}", "-".repeat(70));
        for t in &self.tables {
            let _ = writeln!(
                out,
                "{:<26} | {:>6} | {:>6} | {:>6} | {}",
                t.table,
                t.source_count,
                t.target_count,
                t.error_count,
                t.status()
            );
        }
        let _ = writeln!(out, "{}", "-".repeat(70));
        let _ = writeln!(
            out,
            "{:<26} | {:>6} | {:>6} | {:>6} |",
            "TOTAL",
            self.total_source(),
            self.total_target(),
            self.total_errors()
        );
        if self.is_success() {
            let _ = writeln!(out, "[SUCCESS] Migration completed successfully!");
        } else {
            let _ = writeln!(
                out,
                "[WARNING] Migration completed with {} errors",
                self.total_errors()
            );
        }
        out
    }
}

/// Render a phase summary as one line per unit plus a count line.
pub fn render_phase(summary: &PhaseSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{}]", summary.phase);
    for unit in &summary.units {
        match &unit.outcome {
            UnitOutcome::Success => {
                let _ = writeln!(out, "  {:<40} OK", unit.unit);
            }
            UnitOutcome::Skipped(reason) => {
                let _ = writeln!(out, "  {:<40} SKIP ({})", unit.unit, reason);
            }
            UnitOutcome::Failed(message) => {
                let _ = writeln!(out, "  {:<40} FAILED: {}", unit.unit, message);
            }
        }
    }
    let _ = writeln!(
        out,
        "  {} ok, {} skipped, {} failed",
        summary.succeeded, summary.skipped, summary.failed
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_rules() {
        assert_eq!(TableStats::new("A", 10, 10, 0).status(), TableStatus::Ok);
        assert_eq!(TableStats::new("A", 1200, 700, 500).status(), TableStatus::Warn);
        assert_eq!(TableStats::empty("A").status(), TableStatus::Skip);
        assert_eq!(TableStats::new("A", 5, 3, 0).status(), TableStatus::Skip);
    }

    #[test]
    fn test_phase_fold() {
        let summary: PhaseSummary = vec![
            ("SEQ_A".to_string(), UnitOutcome::Success),
            ("SEQ_B".to_string(), UnitOutcome::skipped("exists")),
            ("SEQ_C".to_string(), UnitOutcome::failed("ORA-01031")),
        ]
        .into_iter()
        .collect();
        assert_eq!(summary.total(), 3);
        assert_eq!((summary.succeeded, summary.skipped, summary.failed), (1, 1, 1));
        assert!(summary.has_failures());
        assert_eq!(summary.failures().count(), 1);
    }

    #[test]
    fn test_render_text_totals() {
        let mut report = DataReport::default();
        report.push(TableStats::new("plants", 3, 3, 0));
        report.push(TableStats::empty("lots"));
        report.push(TableStats::new("stocks", 1200, 700, 500));
        let text = report.render_text();
        assert!(text.contains("plants                     |      3 |      3 |      0 | OK"));
        assert!(text.contains("| SKIP"));
        assert!(text.contains("TOTAL                      |   1203 |    703 |    500 |"));
        assert!(text.contains("completed with 500 errors"));
    }

    #[test]
    fn test_unit_outcome_json() {
        let unit = UnitResult {
            unit: "PK_LOTS".into(),
            outcome: UnitOutcome::skipped("already exists"),
        };
        let json = serde_json::to_value(&unit).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["detail"], "already exists");
    }
}
