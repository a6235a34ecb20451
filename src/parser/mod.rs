// 🏗️ Parser Framework
// One parser per POS report; all four share the tokenizer, the branch
// roster and the noise filters below.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::entities::BranchRegistry;
use crate::tables::Table;

pub mod category;
pub mod group;
pub mod monthly;
pub mod product;

pub use category::{CategoryContext, CategorySummaryParser};
pub use group::{GroupContext, SalesByGroupParser};
pub use monthly::{Chunk, MonthlyContext, MonthlySalesParser};
pub use product::{ProductContext, ProductMarker, ProductProfitabilityParser};

// ============================================================================
// CORE TYPES
// ============================================================================

/// ReportKind - which POS export a file is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportKind {
    MonthlySales,
    ProductProfitability,
    SalesByGroup,
    CategorySummary,
}

impl ReportKind {
    pub const ALL: [ReportKind; 4] = [
        ReportKind::MonthlySales,
        ReportKind::ProductProfitability,
        ReportKind::SalesByGroup,
        ReportKind::CategorySummary,
    ];

    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            ReportKind::MonthlySales => "Monthly Sales",
            ReportKind::ProductProfitability => "Product Profitability",
            ReportKind::SalesByGroup => "Sales by Group",
            ReportKind::CategorySummary => "Category Summary",
        }
    }

    /// Report code the POS stamps into every export filename
    pub fn code(&self) -> &'static str {
        match self {
            ReportKind::MonthlySales => "REP_S_00134",
            ReportKind::ProductProfitability => "rep_s_00014",
            ReportKind::SalesByGroup => "rep_s_00191",
            ReportKind::CategorySummary => "rep_s_00673",
        }
    }

    /// Filename expected inside a report directory
    pub fn file_name(&self) -> &'static str {
        match self {
            ReportKind::MonthlySales => "REP_S_00134_SMRY.csv",
            ReportKind::ProductProfitability => "rep_s_00014_SMRY.csv",
            ReportKind::SalesByGroup => "rep_s_00191_SMRY-3.csv",
            ReportKind::CategorySummary => "rep_s_00673_SMRY.csv",
        }
    }

    /// Table name used by the cache and by downstream consumers
    pub fn table_name(&self) -> &'static str {
        match self {
            ReportKind::MonthlySales => "monthly_sales",
            ReportKind::ProductProfitability => "product_profitability",
            ReportKind::SalesByGroup => "sales_by_group",
            ReportKind::CategorySummary => "category_summary",
        }
    }

    pub fn from_table_name(name: &str) -> Option<ReportKind> {
        ReportKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.table_name() == name)
    }
}

/// What kind of degradation a parser noticed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// A marker-shaped line matched no hierarchy level; context was left unchanged
    UnrecognizedMarker,
    /// A monthly chunk landed on slots the same chunk already filled
    ChunkOverwrite,
    /// A monthly chunk arrived with no header and no filled slots to disambiguate it
    AmbiguousChunk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseDiagnostic {
    pub report: ReportKind,
    pub line_number: usize,
    pub kind: DiagnosticKind,
    pub text: String,
}

impl ParseDiagnostic {
    pub fn new(report: ReportKind, line_number: usize, kind: DiagnosticKind, text: &str) -> Self {
        ParseDiagnostic {
            report,
            line_number,
            kind,
            text: text.to_string(),
        }
    }
}

/// ParsedReport - output of parser.parse()
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReport {
    pub table: Table,
    pub diagnostics: Vec<ParseDiagnostic>,
    /// Lines seen, including noise
    pub lines_read: usize,
}

// ============================================================================
// PARSER TRAIT
// ============================================================================

/// ReportParser - one implementation per POS export.
///
/// Implementors only turn text into a table; file handling lives in the
/// provided methods so every parser releases its handle the same way.
pub trait ReportParser: Send + Sync {
    /// Which report this parser understands
    fn kind(&self) -> ReportKind;

    /// Parse the full text of a report. Never fails: noise is skipped.
    fn parse_str(&self, content: &str) -> ParsedReport;

    /// Parse from any reader (uploads, in-memory buffers).
    ///
    /// Invalid UTF-8 is replaced rather than rejected; only I/O errors fail.
    fn parse_reader(&self, reader: &mut dyn Read) -> Result<ParsedReport> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read {} report", self.kind().name()))?;

        let text = String::from_utf8_lossy(&bytes);
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        Ok(self.parse_str(text))
    }

    /// Parse a report file on disk
    fn parse(&self, file_path: &Path) -> Result<ParsedReport> {
        let mut file = File::open(file_path)
            .with_context(|| format!("Failed to open file: {}", file_path.display()))?;
        self.parse_reader(&mut file)
    }
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Detect report kind from a filename by its report code.
///
/// Matching is a case-insensitive substring test, so prefixes and suffixes
/// around the code (upload renames, "(1)" copies) do not matter.
///
/// # Examples:
/// ```
/// use pos_cleaner::parser::{detect_report, ReportKind};
/// assert_eq!(detect_report("REP_S_00134_SMRY.csv").unwrap(), ReportKind::MonthlySales);
/// assert_eq!(detect_report("march-rep_s_00673 (1).csv").unwrap(), ReportKind::CategorySummary);
/// ```
pub fn detect_report(file_name: &str) -> Result<ReportKind> {
    let lower = file_name.to_lowercase();

    ReportKind::ALL
        .iter()
        .copied()
        .find(|kind| lower.contains(&kind.code().to_lowercase()))
        .ok_or_else(|| {
            anyhow::anyhow!("Could not detect report type from filename: {}", file_name)
        })
}

/// Get the parser for a report kind, using the default branch roster
pub fn get_parser(kind: ReportKind) -> Box<dyn ReportParser> {
    get_parser_with(kind, &BranchRegistry::new())
}

/// Get the parser for a report kind with an explicit branch roster
pub fn get_parser_with(kind: ReportKind, registry: &BranchRegistry) -> Box<dyn ReportParser> {
    match kind {
        ReportKind::MonthlySales => Box::new(MonthlySalesParser::with_registry(registry.clone())),
        ReportKind::ProductProfitability => {
            Box::new(ProductProfitabilityParser::with_registry(registry.clone()))
        }
        ReportKind::SalesByGroup => Box::new(SalesByGroupParser::with_registry(registry.clone())),
        ReportKind::CategorySummary => {
            Box::new(CategorySummaryParser::with_registry(registry.clone()))
        }
    }
}

// ============================================================================
// SHARED NOISE FILTERS
// ============================================================================

static PAGE_STAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}-[A-Za-z]{3}-\d{2})").expect("valid page stamp regex"));

/// Print-date stamp at the top of each page, e.g. `22-Jan-26 ...`
pub(crate) fn is_page_stamp(line: &str) -> bool {
    PAGE_STAMP
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| NaiveDate::parse_from_str(m.as_str(), "%d-%b-%y").is_ok())
        .unwrap_or(false)
}

/// Report-tool copyright footer
pub(crate) fn is_vendor_footer(line: &str) -> bool {
    line.contains("Copyright") || line.to_lowercase().contains("omegapos")
}

/// Log and build an unrecognized-marker diagnostic.
pub(crate) fn unrecognized_marker(kind: ReportKind, line_number: usize, text: &str) -> ParseDiagnostic {
    tracing::warn!(
        report = kind.name(),
        line = line_number,
        marker = text,
        "unrecognized marker line, keeping previous context"
    );
    ParseDiagnostic::new(kind, line_number, DiagnosticKind::UnrecognizedMarker, text)
}
