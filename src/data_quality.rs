// ✅ Data Quality Engine - validation pass over a loaded Dataset
//
// Checks run after parsing, never during it:
//   1. per-table summaries (rows, columns, null counts, branch coverage)
//   2. cross-file branch consistency (monthly vs category summary)
//   3. revenue and total invariants
//   4. parser diagnostics carried over as issues

use arrow::array::Array;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::cache::Columnar;
use crate::entities::BranchRegistry;
use crate::parser::{DiagnosticKind, ParseDiagnostic, ReportKind};
use crate::tables::{CategorySummaryRow, Dataset, GroupRow, MonthlySalesRow, ProductRow};

/// Absolute slack for float comparisons on currency totals
const AMOUNT_TOLERANCE: f64 = 1e-6;

// ============================================================================
// REPORT TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Table is empty or an invariant is broken
    Warning,  // Parsed, but something may be misattributed
    Info,     // Worth knowing, usually harmless
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    /// Table the issue belongs to; `None` for cross-table checks
    pub table: Option<String>,
    pub check: String,
    pub issue: String,
    pub recommendation: String,
}

impl QualityIssue {
    fn new(severity: Severity, table: Option<ReportKind>, check: &str, issue: String, recommendation: &str) -> Self {
        QualityIssue {
            severity,
            table: table.map(|k| k.table_name().to_string()),
            check: check.to_string(),
            issue,
            recommendation: recommendation.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    pub table: String,
    pub rows: usize,
    pub columns: Vec<String>,
    /// Nulls per nullable column (Branch, ServiceType, Division, ...)
    pub null_counts: BTreeMap<String, usize>,
    pub unique_branches: Vec<String>,
    /// Roster branches that never appear in this table
    pub missing_branches: Vec<String>,
    pub rows_without_branch: usize,
}

/// Monthly-sales vs category-summary branch sets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchConsistency {
    pub only_in_monthly: Vec<String>,
    pub only_in_category: Vec<String>,
}

impl BranchConsistency {
    pub fn is_consistent(&self) -> bool {
        self.only_in_monthly.is_empty() && self.only_in_category.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub tables: Vec<TableSummary>,
    pub branch_consistency: BranchConsistency,
    pub issues: Vec<QualityIssue>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ValidationReport {
    pub fn summary(&self) -> String {
        let rows: Vec<String> = self
            .tables
            .iter()
            .map(|t| format!("{}={}", t.table, t.rows))
            .collect();

        format!(
            "Rows: {}, Issues: {} ({} critical, {} warnings), Diagnostics: {}",
            rows.join(" "),
            self.issues.len(),
            self.count(Severity::Critical),
            self.count(Severity::Warning),
            self.diagnostics.len()
        )
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn has_critical_issues(&self) -> bool {
        self.count(Severity::Critical) > 0
    }

    pub fn table(&self, kind: ReportKind) -> Option<&TableSummary> {
        self.tables.iter().find(|t| t.table == kind.table_name())
    }
}

// ============================================================================
// DATA QUALITY ENGINE
// ============================================================================

pub struct DataQualityEngine {
    /// Roster the coverage checks compare against
    registry: BranchRegistry,
}

impl DataQualityEngine {
    pub fn new() -> Self {
        Self::with_registry(BranchRegistry::new())
    }

    pub fn with_registry(registry: BranchRegistry) -> Self {
        DataQualityEngine { registry }
    }

    /// Validate a dataset and generate the report
    pub fn validate(&self, dataset: &Dataset) -> ValidationReport {
        let mut issues = Vec::new();

        let tables = vec![
            self.summarize(ReportKind::MonthlySales, &dataset.monthly_sales, |r| {
                Some(r.branch.as_str())
            }),
            self.summarize(ReportKind::ProductProfitability, &dataset.product_profitability, |r| {
                r.branch.as_deref()
            }),
            self.summarize(ReportKind::SalesByGroup, &dataset.sales_by_group, |r| {
                r.branch.as_deref()
            }),
            self.summarize(ReportKind::CategorySummary, &dataset.category_summary, |r| {
                r.branch.as_deref()
            }),
        ];

        for summary in &tables {
            issues.extend(self.coverage_issues(summary));
        }

        let branch_consistency = compare_branch_sets(dataset);
        if !branch_consistency.is_consistent() {
            issues.push(QualityIssue::new(
                Severity::Warning,
                None,
                "branch_consistency",
                format!(
                    "Branch sets differ: only in monthly sales {:?}, only in category summary {:?}",
                    branch_consistency.only_in_monthly, branch_consistency.only_in_category
                ),
                "Check that both exports cover the same period and branches",
            ));
        }

        issues.extend(check_revenue_invariants(dataset));
        issues.extend(check_monthly_totals(&dataset.monthly_sales));
        issues.extend(dataset.diagnostics.iter().map(diagnostic_issue));

        issues.sort_by_key(|i| i.severity);

        ValidationReport {
            tables,
            branch_consistency,
            issues,
            diagnostics: dataset.diagnostics.clone(),
        }
    }

    fn summarize<T: Columnar>(
        &self,
        kind: ReportKind,
        rows: &[T],
        branch_of: impl Fn(&T) -> Option<&str>,
    ) -> TableSummary {
        let mut rows_without_branch = 0;
        let mut unique = BTreeSet::new();

        for row in rows {
            match branch_of(row) {
                Some(name) => {
                    unique.insert(name.to_string());
                }
                None => rows_without_branch += 1,
            }
        }

        let mut missing_branches: Vec<String> = self
            .registry
            .canonical_names()
            .into_iter()
            .filter(|name| !unique.contains(*name))
            .map(str::to_string)
            .collect();
        missing_branches.sort();

        TableSummary {
            table: kind.table_name().to_string(),
            rows: rows.len(),
            columns: T::column_names(),
            null_counts: null_counts(rows),
            unique_branches: unique.into_iter().collect(),
            missing_branches,
            rows_without_branch,
        }
    }

    fn coverage_issues(&self, summary: &TableSummary) -> Vec<QualityIssue> {
        let kind = ReportKind::from_table_name(&summary.table);
        let mut issues = Vec::new();

        if summary.rows == 0 {
            issues.push(QualityIssue::new(
                Severity::Critical,
                kind,
                "row_count",
                format!("{} is empty", summary.table),
                "Verify the export is the right report and not truncated",
            ));
            return issues;
        }

        if summary.rows_without_branch > 0 {
            issues.push(QualityIssue::new(
                Severity::Warning,
                kind,
                "branch_context",
                format!(
                    "{} rows in {} appear before any branch marker",
                    summary.rows_without_branch, summary.table
                ),
                "Look for a branch header the parser did not recognize",
            ));
        }

        let roster = self.registry.canonical_names();
        let unknown: Vec<&String> = summary
            .unique_branches
            .iter()
            .filter(|b| !roster.contains(&b.as_str()))
            .collect();
        if !unknown.is_empty() {
            issues.push(QualityIssue::new(
                Severity::Warning,
                kind,
                "branch_roster",
                format!("Branches not on the roster: {:?}", unknown),
                "Add the new spelling to the branch roster",
            ));
        }

        if !summary.missing_branches.is_empty() {
            issues.push(QualityIssue::new(
                Severity::Info,
                kind,
                "branch_coverage",
                format!(
                    "{} roster branches absent from {}",
                    summary.missing_branches.len(),
                    summary.table
                ),
                "Expected for closed or not-yet-open branches",
            ));
        }

        issues
    }
}

impl Default for DataQualityEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate with the default branch roster.
pub fn validate(dataset: &Dataset) -> ValidationReport {
    DataQualityEngine::new().validate(dataset)
}

// ============================================================================
// CHECKS
// ============================================================================

/// Null count of every nullable column, read off the columnar layout
fn null_counts<T: Columnar>(rows: &[T]) -> BTreeMap<String, usize> {
    T::fields()
        .iter()
        .zip(T::to_columns(rows))
        .filter(|(field, _)| field.is_nullable())
        .map(|(field, array)| (field.name().clone(), array.null_count()))
        .collect()
}

fn branch_set<'a>(branches: impl Iterator<Item = Option<&'a str>>) -> BTreeSet<String> {
    branches.flatten().map(str::to_string).collect()
}

fn compare_branch_sets(dataset: &Dataset) -> BranchConsistency {
    let monthly = branch_set(dataset.monthly_sales.iter().map(|r| Some(r.branch.as_str())));
    let category = branch_set(dataset.category_summary.iter().map(|r| r.branch.as_deref()));

    BranchConsistency {
        only_in_monthly: monthly.difference(&category).cloned().collect(),
        only_in_category: category.difference(&monthly).cloned().collect(),
    }
}

/// Rows flagged `must_hold` whose revenue is not cost + profit
fn revenue_breaks(rows: impl Iterator<Item = (bool, f64, f64, f64)>) -> usize {
    rows.filter(|(must_hold, revenue, cost, profit)| {
        *must_hold && (revenue - (cost + profit)).abs() > AMOUNT_TOLERANCE
    })
    .count()
}

fn check_revenue_invariants(dataset: &Dataset) -> Vec<QualityIssue> {
    let mut issues = Vec::new();

    let product = revenue_breaks(
        dataset
            .product_profitability
            .iter()
            .map(|r| (r.is_aggregate, r.true_revenue, r.total_cost, r.total_profit)),
    );
    let category = revenue_breaks(
        dataset
            .category_summary
            .iter()
            // every category row, aggregate or not
            .map(|r| (true, r.true_revenue, r.total_cost, r.total_profit)),
    );

    for (kind, broken) in [
        (ReportKind::ProductProfitability, product),
        (ReportKind::CategorySummary, category),
    ] {
        if broken > 0 {
            issues.push(QualityIssue::new(
                Severity::Critical,
                Some(kind),
                "true_revenue",
                format!("{} rows where TrueRevenue != TotalCost + TotalProfit", broken),
                "Re-run the parser; cached tables may be from an older format",
            ));
        }
    }

    issues
}

fn check_monthly_totals(rows: &[MonthlySalesRow]) -> Vec<QualityIssue> {
    let mut issues = Vec::new();

    let recomputed_broken = rows
        .iter()
        .filter(|r| r.total_recomputed && (r.total_by_year - r.month_sum()).abs() > AMOUNT_TOLERANCE)
        .count();
    if recomputed_broken > 0 {
        issues.push(QualityIssue::new(
            Severity::Critical,
            Some(ReportKind::MonthlySales),
            "recomputed_total",
            format!("{} recomputed totals differ from their month sum", recomputed_broken),
            "Re-run the parser",
        ));
    }

    // Source totals are kept as printed; a mismatch hints at a lost chunk
    let drift = rows
        .iter()
        .filter(|r| !r.total_recomputed && (r.total_by_year - r.month_sum()).abs() > 0.5)
        .count();
    if drift > 0 {
        issues.push(QualityIssue::new(
            Severity::Info,
            Some(ReportKind::MonthlySales),
            "reported_total",
            format!("{} branch-years whose reported total differs from the month sum", drift),
            "Check for a missing report page",
        ));
    }

    issues
}

fn diagnostic_issue(diagnostic: &ParseDiagnostic) -> QualityIssue {
    let (severity, check, recommendation) = match diagnostic.kind {
        DiagnosticKind::UnrecognizedMarker => (
            Severity::Warning,
            "unrecognized_marker",
            "Rows after this line kept the previous context; add the label if it is a new branch or section",
        ),
        DiagnosticKind::ChunkOverwrite => (
            Severity::Warning,
            "chunk_overwrite",
            "A report page repeated; the later values were kept",
        ),
        DiagnosticKind::AmbiguousChunk => (
            Severity::Info,
            "chunk_order",
            "Page identity was inferred from file order",
        ),
    };

    QualityIssue::new(
        severity,
        Some(diagnostic.report),
        check,
        format!("line {}: {}", diagnostic.line_number, diagnostic.text),
        recommendation,
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Region;

    fn monthly(branch: &str, months: [f64; 12], total: f64, recomputed: bool) -> MonthlySalesRow {
        MonthlySalesRow {
            year: 2025,
            branch: branch.to_string(),
            branch_raw: branch.to_string(),
            region: Region::Unknown,
            months,
            total_by_year: total,
            total_recomputed: recomputed,
        }
    }

    fn category(branch: Option<&str>, cost: f64, profit: f64, revenue: f64) -> CategorySummaryRow {
        CategorySummaryRow {
            branch_raw: branch.map(str::to_string),
            branch: branch.map(str::to_string),
            region: Region::Unknown,
            category: "FOOD".into(),
            qty: 1.0,
            total_price: revenue,
            total_cost: cost,
            cost_pct: 0.0,
            total_profit: profit,
            profit_pct: 0.0,
            true_revenue: revenue,
            is_aggregate: false,
            profit_margin: 0.0,
        }
    }

    fn product(is_aggregate: bool, cost: f64, profit: f64, revenue: f64) -> ProductRow {
        ProductRow {
            branch_raw: Some("Stories Verdun".into()),
            branch: Some("Stories Verdun".into()),
            region: Region::BeirutCentral,
            service_type: None,
            category: None,
            section: None,
            product: "Total By Section".into(),
            qty: 1.0,
            total_price: revenue,
            total_cost: cost,
            cost_pct: 0.0,
            total_profit: profit,
            profit_pct: 0.0,
            true_revenue: revenue,
            is_aggregate,
            unit_profit: 0.0,
            unit_revenue: 0.0,
            unit_cost: 0.0,
        }
    }

    fn group(branch: Option<&str>) -> GroupRow {
        GroupRow {
            branch_raw: branch.map(str::to_string),
            branch: branch.map(str::to_string),
            region: Region::Unknown,
            division: None,
            group: None,
            product: "Espresso".into(),
            barcode: "1".into(),
            qty: 1.0,
            total_amount: 1.0,
            is_aggregate: false,
            agg_level: None,
        }
    }

    fn clean_dataset() -> Dataset {
        let mut months = [0.0; 12];
        months[0] = 100.0;
        Dataset {
            monthly_sales: vec![monthly("Stories Verdun", months, 100.0, true)],
            product_profitability: vec![product(true, 40.0, 60.0, 100.0)],
            sales_by_group: vec![group(Some("Stories Verdun"))],
            category_summary: vec![category(Some("Stories Verdun"), 40.0, 60.0, 100.0)],
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn test_clean_dataset_has_no_critical_issues() {
        let report = validate(&clean_dataset());

        assert!(!report.has_critical_issues());
        assert!(report.branch_consistency.is_consistent());
        assert_eq!(report.count(Severity::Warning), 0);
        assert_eq!(report.tables.len(), 4);
    }

    #[test]
    fn test_table_summary() {
        let mut dataset = clean_dataset();
        dataset.sales_by_group.push(group(None));

        let report = validate(&dataset);
        let summary = report.table(ReportKind::SalesByGroup).unwrap();

        assert_eq!(summary.rows, 2);
        assert_eq!(summary.rows_without_branch, 1);
        assert_eq!(summary.unique_branches, vec!["Stories Verdun".to_string()]);
        assert!(summary.columns.contains(&"Barcode".to_string()));
        assert_eq!(summary.null_counts["Branch"], 1);
        assert_eq!(summary.null_counts["Division"], 2);
        assert_eq!(summary.null_counts["Group"], 2);
        assert!(!summary.null_counts.contains_key("Barcode"));
        assert!(summary.missing_branches.contains(&"Stories Zalka".to_string()));
        assert!(!summary.missing_branches.contains(&"Stories Verdun".to_string()));
        assert!(report.issues.iter().any(|i| i.check == "branch_context"));
    }

    #[test]
    fn test_null_counts_cover_context_columns() {
        let mut dataset = clean_dataset();
        let mut in_section = product(false, 1.0, 1.0, 2.0);
        in_section.service_type = Some("TABLE".into());
        in_section.category = Some("BEVERAGES".into());
        in_section.section = Some("HOT COFFEE SECTION".into());
        dataset.product_profitability.push(in_section);

        let report = validate(&dataset);
        let products = &report.table(ReportKind::ProductProfitability).unwrap().null_counts;
        assert_eq!(products["ServiceType"], 1);
        assert_eq!(products["Category"], 1);
        assert_eq!(products["Section"], 1);
        assert_eq!(products["Branch"], 0);

        let monthly = &report.table(ReportKind::MonthlySales).unwrap().null_counts;
        assert!(monthly.is_empty());

        let categories = &report.table(ReportKind::CategorySummary).unwrap().null_counts;
        assert!(!categories.contains_key("Category"));
        assert_eq!(categories["Branch"], 0);
    }

    #[test]
    fn test_empty_table_is_critical() {
        let mut dataset = clean_dataset();
        dataset.sales_by_group.clear();

        let report = validate(&dataset);
        assert!(report.has_critical_issues());
        assert_eq!(report.issues[0].check, "row_count");
    }

    #[test]
    fn test_branch_set_mismatch() {
        let mut dataset = clean_dataset();
        dataset
            .category_summary
            .push(category(Some("Stories Zalka"), 1.0, 1.0, 2.0));

        let report = validate(&dataset);
        assert_eq!(report.branch_consistency.only_in_category, vec!["Stories Zalka".to_string()]);
        assert!(report.branch_consistency.only_in_monthly.is_empty());
        assert!(report.issues.iter().any(|i| i.check == "branch_consistency"));
    }

    #[test]
    fn test_broken_revenue_invariant() {
        let mut dataset = clean_dataset();
        dataset.product_profitability.push(product(true, 40.0, 60.0, 999_999.0));
        // Non-aggregate product rows may keep a price that agrees with cost + profit
        dataset.product_profitability.push(product(false, 40.0, 60.0, 100.5));

        let report = validate(&dataset);
        let revenue: Vec<&QualityIssue> =
            report.issues.iter().filter(|i| i.check == "true_revenue").collect();

        assert_eq!(revenue.len(), 1);
        assert_eq!(revenue[0].severity, Severity::Critical);
        assert!(revenue[0].issue.starts_with("1 rows"));
    }

    #[test]
    fn test_recomputed_total_mismatch() {
        let mut dataset = clean_dataset();
        dataset.monthly_sales[0].total_by_year = 50.0;

        let report = validate(&dataset);
        assert!(report.issues.iter().any(|i| i.check == "recomputed_total"));
    }

    #[test]
    fn test_diagnostics_become_issues() {
        let mut dataset = clean_dataset();
        dataset.diagnostics.push(ParseDiagnostic::new(
            ReportKind::ProductProfitability,
            42,
            DiagnosticKind::UnrecognizedMarker,
            "Stories Tripoli",
        ));

        let report = validate(&dataset);
        let issue = report
            .issues
            .iter()
            .find(|i| i.check == "unrecognized_marker")
            .unwrap();

        assert_eq!(issue.severity, Severity::Warning);
        assert_eq!(issue.issue, "line 42: Stories Tripoli");
        assert_eq!(report.diagnostics.len(), 1);
    }

    #[test]
    fn test_unknown_branch_flagged() {
        let mut dataset = clean_dataset();
        dataset.sales_by_group.push(group(Some("Stories Tripoli")));

        let report = validate(&dataset);
        assert!(report.issues.iter().any(|i| i.check == "branch_roster"));
    }

    #[test]
    fn test_summary_line() {
        let report = validate(&clean_dataset());
        let summary = report.summary();

        assert!(summary.contains("monthly_sales=1"));
        assert!(summary.contains("0 critical"));
    }
}
