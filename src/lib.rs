// POS Cleaner - Core Library
// Turns the chain's four POS report exports into clean tables for the CLI and tests

pub mod cache;
pub mod config;
pub mod data_quality;
pub mod entities;
pub mod error;
pub mod loader;
pub mod parser;
pub mod tables;
pub mod tokenizer;

// Re-export commonly used types
pub use cache::{content_key, CacheManifest, Columnar, ParquetCache};
pub use config::LoaderConfig;
pub use data_quality::{
    validate, BranchConsistency, DataQualityEngine, QualityIssue, Severity, TableSummary,
    ValidationReport,
};
pub use entities::{Branch, BranchRegistry, Region};
pub use error::LoadError;
pub use loader::{find_data_dir, load, load_uploaded, DatasetCache, Loader};
pub use parser::{
    detect_report, get_parser, get_parser_with, DiagnosticKind, ParseDiagnostic, ParsedReport,
    ReportKind, ReportParser,
};
pub use parser::{
    CategorySummaryParser, MonthlySalesParser, ProductProfitabilityParser, SalesByGroupParser,
};
pub use tables::{
    AggLevel, CategorySummaryRow, Dataset, DatasetBuilder, GroupRow, MonthlySalesRow, ProductRow,
    Table,
};
pub use tokenizer::{parse_number, split_line};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
