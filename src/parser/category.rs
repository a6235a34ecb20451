// 📊 Category Profit Summary (rep_s_00673)
//
// branch → category (BEVERAGES / FOOD) plus one "Total By Branch" line per
// branch, relabeled TOTAL. Price is never trusted at this grain.

use super::product::CATEGORIES;
use super::{ParsedReport, ReportKind, ReportParser};
use crate::entities::BranchRegistry;
use crate::tables::{CategorySummaryRow, Table, TOTAL_CATEGORY};
use crate::tokenizer::{parse_number, rest_is_blank, split_line};

const DATA_MIN_FIELDS: usize = 8;
const BRANCH_TOTAL_LABEL: &str = "Total By Branch";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryContext {
    /// Raw branch spelling as printed
    pub branch: Option<String>,
}

impl CategoryContext {
    pub fn with_branch(&self, branch: &str) -> CategoryContext {
        CategoryContext {
            branch: Some(branch.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryFigures {
    /// Category label, or `TOTAL` for the branch grand total
    pub category: String,
    pub qty: f64,
    pub total_price: f64,
    pub total_cost: f64,
    pub cost_pct: f64,
    pub total_profit: f64,
    pub profit_pct: f64,
    pub is_aggregate: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CategoryLine {
    Noise,
    Branch(String),
    Data(CategoryFigures),
    Unrecognized(String),
}

pub fn classify_line(line: &str, registry: &BranchRegistry) -> CategoryLine {
    let line = line.trim();
    if line.is_empty() || super::is_page_stamp(line) || super::is_vendor_footer(line) {
        return CategoryLine::Noise;
    }
    if line.starts_with("Category,Qty") || line.contains("Theoretical Profit") {
        return CategoryLine::Noise;
    }
    if line.starts_with("Stories,,,") {
        return CategoryLine::Noise;
    }

    let parts = split_line(line);
    let Some(first) = parts.first() else {
        return CategoryLine::Noise;
    };

    if registry.is_known_variant(first) {
        return CategoryLine::Branch(first.clone());
    }

    let is_aggregate = first.contains(BRANCH_TOTAL_LABEL);
    let is_category = CATEGORIES.contains(&first.as_str());

    if !is_aggregate && !is_category {
        if !first.is_empty() && rest_is_blank(&parts) {
            return CategoryLine::Unrecognized(first.clone());
        }
        return CategoryLine::Noise;
    }

    if parts.len() < DATA_MIN_FIELDS {
        return CategoryLine::Noise;
    }

    CategoryLine::Data(CategoryFigures {
        category: if is_aggregate {
            TOTAL_CATEGORY.to_string()
        } else {
            first.clone()
        },
        qty: parse_number(&parts[1]),
        total_price: parse_number(&parts[2]),
        total_cost: parse_number(&parts[4]),
        cost_pct: parse_number(&parts[5]),
        total_profit: parse_number(&parts[6]),
        profit_pct: parts.get(8).map(|p| parse_number(p)).unwrap_or(0.0),
        is_aggregate,
    })
}

pub struct CategorySummaryParser {
    registry: BranchRegistry,
}

impl CategorySummaryParser {
    pub fn new() -> Self {
        Self::with_registry(BranchRegistry::new())
    }

    pub fn with_registry(registry: BranchRegistry) -> Self {
        CategorySummaryParser { registry }
    }

    pub fn build_row(&self, ctx: &CategoryContext, figures: CategoryFigures) -> CategorySummaryRow {
        let branch = ctx.branch.as_deref().map(|raw| self.registry.normalize(raw));
        let region = self.registry.region_of(branch.as_deref());

        // The summary's price column truncates even for modest totals
        let true_revenue = figures.total_cost + figures.total_profit;
        let profit_margin = if true_revenue > 0.0 {
            figures.total_profit / true_revenue * 100.0
        } else {
            0.0
        };

        CategorySummaryRow {
            branch_raw: ctx.branch.clone(),
            branch,
            region,
            category: figures.category,
            qty: figures.qty,
            total_price: figures.total_price,
            total_cost: figures.total_cost,
            cost_pct: figures.cost_pct,
            total_profit: figures.total_profit,
            profit_pct: figures.profit_pct,
            true_revenue,
            is_aggregate: figures.is_aggregate,
            profit_margin,
        }
    }
}

impl Default for CategorySummaryParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportParser for CategorySummaryParser {
    fn kind(&self) -> ReportKind {
        ReportKind::CategorySummary
    }

    fn parse_str(&self, content: &str) -> ParsedReport {
        let mut ctx = CategoryContext::default();
        let mut rows = Vec::new();
        let mut diagnostics = Vec::new();
        let mut lines_read = 0;

        for (line_idx, raw) in content.lines().enumerate() {
            lines_read += 1;
            match classify_line(raw, &self.registry) {
                CategoryLine::Noise => {}
                CategoryLine::Branch(name) => ctx = ctx.with_branch(&name),
                CategoryLine::Data(figures) => rows.push(self.build_row(&ctx, figures)),
                CategoryLine::Unrecognized(text) => {
                    diagnostics.push(super::unrecognized_marker(self.kind(), line_idx + 1, &text));
                }
            }
        }

        ParsedReport {
            table: Table::CategorySummary(rows),
            diagnostics,
            lines_read,
        }
    }
}
