// 📅 Comparative Monthly Sales (REP_S_00134)
//
// The export paginates each branch-year into two chunks:
//   chunk A → January..September (up to 9 values)
//   chunk B → October..December + Total By Year (up to 4 values)
// Both chunks are merged per (year, raw branch) into 12 months + total.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::{DiagnosticKind, ParseDiagnostic, ParsedReport, ReportKind, ReportParser};
use crate::entities::BranchRegistry;
use crate::tables::{MonthlySalesRow, Table};
use crate::tokenizer::{parse_number, split_line};

/// Cross-branch sum row; bookkeeping only, never a location.
const TOTAL_PSEUDO_BRANCH: &str = "Total";

/// Which physical page of a branch-year a data row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    /// January..September
    A,
    /// October..December + annual total
    B,
}

// ============================================================================
// LINE CLASSIFICATION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum MonthlyLine {
    Noise,
    /// Column header row naming the months of the page that follows
    ChunkHeader(Chunk),
    /// First field is a 4-digit year; may carry a branch's data too
    Year {
        year: i32,
        branch: Option<String>,
        values: Vec<f64>,
    },
    /// Empty first field, branch in the second
    Continuation { branch: String, values: Vec<f64> },
}

pub fn classify_line(line: &str) -> MonthlyLine {
    let line = line.trim();
    if line.is_empty() || line.contains("Comparative Monthly") || line.contains("Page ") {
        return MonthlyLine::Noise;
    }
    if super::is_page_stamp(line) || super::is_vendor_footer(line) {
        return MonthlyLine::Noise;
    }

    let parts = split_line(line);
    if parts.is_empty() {
        return MonthlyLine::Noise;
    }

    // Chain banner: "Stories,<report title>,..."
    if line.starts_with("Stories,") && !parts.get(1).map_or(false, |p| p.contains("Stories ")) {
        return MonthlyLine::Noise;
    }

    if line.starts_with(",,,") {
        if parts.iter().any(|p| p == "January") {
            return MonthlyLine::ChunkHeader(Chunk::A);
        }
        if parts.iter().any(|p| p == "October") {
            return MonthlyLine::ChunkHeader(Chunk::B);
        }
    }

    let branch = parts.get(1).filter(|p| !p.is_empty()).cloned();
    let values = numeric_values(&parts);

    if let Some(year) = parse_year(&parts[0]) {
        return MonthlyLine::Year {
            year,
            branch,
            values,
        };
    }

    match (parts[0].is_empty(), branch) {
        (true, Some(branch)) => MonthlyLine::Continuation { branch, values },
        _ => MonthlyLine::Noise,
    }
}

fn parse_year(field: &str) -> Option<i32> {
    if field.len() == 4 && field.chars().all(|c| c.is_ascii_digit()) {
        field.parse().ok()
    } else {
        None
    }
}

/// Numbers after the branch column; blank cells are dropped before
/// positional assignment.
fn numeric_values(parts: &[String]) -> Vec<f64> {
    parts
        .iter()
        .skip(2)
        .filter(|p| !p.is_empty())
        .map(|p| parse_number(p))
        .collect()
}

// ============================================================================
// CONTEXT
// ============================================================================

/// Carried from line to line: the current year and the chunk announced by
/// the most recent page header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyContext {
    pub year: Option<i32>,
    pub chunk: Option<Chunk>,
}

impl MonthlyContext {
    pub fn advance(&self, line: &MonthlyLine) -> MonthlyContext {
        match line {
            MonthlyLine::ChunkHeader(chunk) => MonthlyContext {
                chunk: Some(*chunk),
                ..self.clone()
            },
            MonthlyLine::Year { year, .. } => MonthlyContext {
                year: Some(*year),
                ..self.clone()
            },
            _ => self.clone(),
        }
    }

    /// (year, raw branch, values) if this line carries branch data under
    /// the already-advanced context
    pub fn data_of<'a>(&self, line: &'a MonthlyLine) -> Option<(i32, &'a str, &'a [f64])> {
        match line {
            MonthlyLine::Year {
                year,
                branch: Some(branch),
                values,
            } => Some((*year, branch.as_str(), values.as_slice())),
            MonthlyLine::Continuation { branch, values } => {
                self.year.map(|year| (year, branch.as_str(), values.as_slice()))
            }
            _ => None,
        }
    }
}

// ============================================================================
// CHUNK ASSEMBLY
// ============================================================================

/// Decide which chunk a data row is.
///
/// A page header wins. Without one, more than 4 values can only be chunk A;
/// otherwise the first row for a branch-year is taken as chunk A and later
/// ones as chunk B. Returns `(chunk, ambiguous)`.
pub fn resolve_chunk(hint: Option<Chunk>, filled_months: usize, value_count: usize) -> (Chunk, bool) {
    if let Some(chunk) = hint {
        return (chunk, false);
    }
    if value_count > 4 {
        return (Chunk::A, false);
    }
    if filled_months == 0 {
        return (Chunk::A, true);
    }
    (Chunk::B, false)
}

/// 12 month slots + total for one (year, raw branch)
#[derive(Debug, Clone, PartialEq)]
struct BranchYear {
    year: i32,
    branch_raw: String,
    slots: [f64; 13],
    seen_a: bool,
    seen_b: bool,
}

impl BranchYear {
    fn new(year: i32, branch_raw: &str) -> Self {
        BranchYear {
            year,
            branch_raw: branch_raw.to_string(),
            slots: [0.0; 13],
            seen_a: false,
            seen_b: false,
        }
    }

    fn filled_months(&self) -> usize {
        self.slots[..12].iter().filter(|v| **v != 0.0).count()
    }

    /// Write a chunk into its slots. Returns `true` when the same chunk had
    /// already been written (the later write wins).
    fn absorb(&mut self, chunk: Chunk, values: &[f64]) -> bool {
        match chunk {
            Chunk::A => {
                for (i, v) in values.iter().take(9).enumerate() {
                    self.slots[i] = *v;
                }
                std::mem::replace(&mut self.seen_a, true)
            }
            Chunk::B => {
                for (i, v) in values.iter().take(3).enumerate() {
                    self.slots[9 + i] = *v;
                }
                if let Some(total) = values.get(3) {
                    self.slots[12] = *total;
                }
                std::mem::replace(&mut self.seen_b, true)
            }
        }
    }
}

// ============================================================================
// PARSER
// ============================================================================

pub struct MonthlySalesParser {
    registry: BranchRegistry,
}

impl MonthlySalesParser {
    pub fn new() -> Self {
        Self::with_registry(BranchRegistry::new())
    }

    pub fn with_registry(registry: BranchRegistry) -> Self {
        MonthlySalesParser { registry }
    }

    fn finish_row(&self, acc: BranchYear) -> MonthlySalesRow {
        let branch = self.registry.normalize(&acc.branch_raw);
        let region = self.registry.region(&branch);

        let mut months = [0.0; 12];
        months.copy_from_slice(&acc.slots[..12]);

        let reported_total = acc.slots[12];
        let total_recomputed = reported_total == 0.0;
        let total_by_year = if total_recomputed {
            months.iter().sum()
        } else {
            reported_total
        };

        MonthlySalesRow {
            year: acc.year,
            branch,
            branch_raw: acc.branch_raw,
            region,
            months,
            total_by_year,
            total_recomputed,
        }
    }
}

impl Default for MonthlySalesParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportParser for MonthlySalesParser {
    fn kind(&self) -> ReportKind {
        ReportKind::MonthlySales
    }

    fn parse_str(&self, content: &str) -> ParsedReport {
        let mut ctx = MonthlyContext::default();
        let mut accumulators: Vec<BranchYear> = Vec::new();
        let mut index: HashMap<(i32, String), usize> = HashMap::new();
        let mut diagnostics = Vec::new();
        let mut lines_read = 0;

        for (line_idx, raw) in content.lines().enumerate() {
            lines_read += 1;
            let line_number = line_idx + 1;
            let line = classify_line(raw);
            ctx = ctx.advance(&line);

            let Some((year, branch_raw, values)) = ctx.data_of(&line) else {
                continue;
            };

            let key = (year, branch_raw.to_string());
            let slot = *index.entry(key).or_insert_with(|| {
                accumulators.push(BranchYear::new(year, branch_raw));
                accumulators.len() - 1
            });
            let acc = &mut accumulators[slot];

            let (chunk, ambiguous) = resolve_chunk(ctx.chunk, acc.filled_months(), values.len());
            if ambiguous && branch_raw != TOTAL_PSEUDO_BRANCH {
                debug!(line = line_number, branch = branch_raw, "short first chunk taken as Jan-Sep");
                diagnostics.push(ParseDiagnostic::new(
                    self.kind(),
                    line_number,
                    DiagnosticKind::AmbiguousChunk,
                    raw.trim(),
                ));
            }

            if acc.absorb(chunk, values) {
                warn!(
                    line = line_number,
                    year,
                    branch = branch_raw,
                    ?chunk,
                    "monthly chunk repeated for branch-year, later values win"
                );
                diagnostics.push(ParseDiagnostic::new(
                    self.kind(),
                    line_number,
                    DiagnosticKind::ChunkOverwrite,
                    raw.trim(),
                ));
            }
        }

        let rows: Vec<MonthlySalesRow> = accumulators
            .into_iter()
            .filter(|acc| acc.branch_raw != TOTAL_PSEUDO_BRANCH)
            .map(|acc| self.finish_row(acc))
            .collect();

        ParsedReport {
            table: Table::MonthlySales(rows),
            diagnostics,
            lines_read,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
