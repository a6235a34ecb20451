// 🧾 Product Profitability (rep_s_00014)
//
// Flat file, four nested levels expressed only through marker lines:
//   branch → service channel → category → section → product
// A marker resets every level below it.

use tracing::debug;

use super::{ParsedReport, ReportKind, ReportParser};
use crate::entities::BranchRegistry;
use crate::tables::{per_unit, true_revenue, ProductRow, Table};
use crate::tokenizer::{parse_number, rest_is_blank, split_line};

pub const SERVICE_TYPES: [&str; 3] = ["TAKE AWAY", "TABLE", "Toters"];
pub const CATEGORIES: [&str; 2] = ["BEVERAGES", "FOOD"];

/// Menu-grouping keywords, matched case-insensitively as substrings on
/// short lines only.
pub const SECTION_KEYWORDS: [&str; 16] = [
    "SECTION", "ROLLS", "PASTRY", "COOKIES", "CROISSANT", "YOGHURT", "DONUTS", "SANDWICHES",
    "SUBS", "OFFER", "SALADS BAR", "CARTON", "NOT USED", "HEALTHY", "POP UP", "GRAB",
];

/// Section labels recognized whatever the line length.
pub const EXACT_SECTIONS: [&str; 4] = [
    "CINNAMON ROLLS",
    "FRENCH PASTRY",
    "COFFEE PASTRY",
    "FROZEN YOGHURT",
];

/// Section headers have fewer fields than this.
const SECTION_MAX_FIELDS: usize = 3;

/// Minimum width of a product/subtotal line.
const DATA_MIN_FIELDS: usize = 8;

// ============================================================================
// CONTEXT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ProductMarker {
    Branch(String),
    ServiceType(String),
    Category(String),
    Section(String),
}

/// Current position in the hierarchy. Raw branch spelling is kept;
/// normalization happens when a row is emitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductContext {
    pub branch: Option<String>,
    pub service_type: Option<String>,
    pub category: Option<String>,
    pub section: Option<String>,
}

impl ProductContext {
    /// Apply a marker, clearing every level below it.
    pub fn apply(&self, marker: ProductMarker) -> ProductContext {
        match marker {
            ProductMarker::Branch(name) => ProductContext {
                branch: Some(name),
                ..ProductContext::default()
            },
            ProductMarker::ServiceType(name) => ProductContext {
                branch: self.branch.clone(),
                service_type: Some(name),
                category: None,
                section: None,
            },
            ProductMarker::Category(name) => ProductContext {
                category: Some(name),
                section: None,
                ..self.clone()
            },
            ProductMarker::Section(name) => ProductContext {
                section: Some(name),
                ..self.clone()
            },
        }
    }
}

// ============================================================================
// LINE CLASSIFICATION
// ============================================================================

/// Positional figures of a product or subtotal line
#[derive(Debug, Clone, PartialEq)]
pub struct ProductFigures {
    pub name: String,
    pub qty: f64,
    pub total_price: f64,
    pub total_cost: f64,
    pub cost_pct: f64,
    pub total_profit: f64,
    pub profit_pct: f64,
    pub is_aggregate: bool,
}

impl ProductFigures {
    fn is_all_zero(&self) -> bool {
        [
            self.qty,
            self.total_price,
            self.total_cost,
            self.cost_pct,
            self.total_profit,
            self.profit_pct,
        ]
        .iter()
        .all(|v| *v == 0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProductLine {
    Noise,
    Marker(ProductMarker),
    Data(ProductFigures),
    /// Marker-shaped line that matched no level
    Unrecognized(String),
}

fn is_section_header(first: &str, field_count: usize) -> bool {
    if EXACT_SECTIONS.contains(&first) {
        return true;
    }
    let upper = first.to_uppercase();
    field_count < SECTION_MAX_FIELDS && SECTION_KEYWORDS.iter().any(|k| upper.contains(k))
}

fn is_aggregate_label(first: &str) -> bool {
    first.starts_with("Total By") || first.starts_with("Total by")
}

/// Classify one raw line under the current context.
///
/// Order matters: branch, channel, category, section, then data. A data row
/// needs at least 8 fields: name, qty, price, spacer, cost, cost%, profit,
/// spacer, profit%.
pub fn classify_line(line: &str, ctx: &ProductContext, registry: &BranchRegistry) -> ProductLine {
    let line = line.trim();
    if line.is_empty() || super::is_page_stamp(line) || super::is_vendor_footer(line) {
        return ProductLine::Noise;
    }
    if line.starts_with("Product Desc,Qty") || line.contains("Theoretical Profit") {
        return ProductLine::Noise;
    }
    if line.starts_with("Stories,,,") && ctx.branch.is_none() {
        return ProductLine::Noise;
    }

    let parts = split_line(line);
    let Some(first) = parts.first() else {
        return ProductLine::Noise;
    };
    let first = first.as_str();

    if registry.is_known_variant(first) {
        return ProductLine::Marker(ProductMarker::Branch(first.to_string()));
    }
    if SERVICE_TYPES.contains(&first) {
        return ProductLine::Marker(ProductMarker::ServiceType(first.to_string()));
    }
    if CATEGORIES.contains(&first) {
        return ProductLine::Marker(ProductMarker::Category(first.to_string()));
    }
    if is_section_header(first, parts.len()) {
        return ProductLine::Marker(ProductMarker::Section(first.to_string()));
    }

    let is_aggregate = is_aggregate_label(first);
    if !is_aggregate && !first.is_empty() && rest_is_blank(&parts) {
        // Chain banner repeated on later pages
        if first == "Stories" {
            return ProductLine::Noise;
        }
        return ProductLine::Unrecognized(first.to_string());
    }

    if parts.len() < DATA_MIN_FIELDS {
        return ProductLine::Noise;
    }

    let figures = ProductFigures {
        name: first.to_string(),
        qty: parse_number(&parts[1]),
        total_price: parse_number(&parts[2]),
        total_cost: parse_number(&parts[4]),
        cost_pct: parse_number(&parts[5]),
        total_profit: parse_number(&parts[6]),
        profit_pct: parts.get(8).map(|p| parse_number(p)).unwrap_or(0.0),
        is_aggregate,
    };

    // All-zero items are noise; all-zero subtotals are real zero totals
    if figures.is_all_zero() && !figures.is_aggregate {
        return ProductLine::Noise;
    }

    ProductLine::Data(figures)
}

// ============================================================================
// PARSER
// ============================================================================

pub struct ProductProfitabilityParser {
    registry: BranchRegistry,
}

impl ProductProfitabilityParser {
    pub fn new() -> Self {
        Self::with_registry(BranchRegistry::new())
    }

    pub fn with_registry(registry: BranchRegistry) -> Self {
        ProductProfitabilityParser { registry }
    }

    /// Build the output row for a data line under `ctx`
    pub fn build_row(&self, ctx: &ProductContext, figures: ProductFigures) -> ProductRow {
        let branch = ctx.branch.as_deref().map(|raw| self.registry.normalize(raw));
        let region = self.registry.region_of(branch.as_deref());
        let revenue = true_revenue(
            figures.total_price,
            figures.total_cost,
            figures.total_profit,
            figures.is_aggregate,
        );

        ProductRow {
            branch_raw: ctx.branch.clone(),
            branch,
            region,
            service_type: ctx.service_type.clone(),
            category: ctx.category.clone(),
            section: ctx.section.clone(),
            product: figures.name,
            qty: figures.qty,
            total_price: figures.total_price,
            total_cost: figures.total_cost,
            cost_pct: figures.cost_pct,
            total_profit: figures.total_profit,
            profit_pct: figures.profit_pct,
            true_revenue: revenue,
            is_aggregate: figures.is_aggregate,
            unit_profit: per_unit(figures.total_profit, figures.qty),
            unit_revenue: per_unit(revenue, figures.qty),
            unit_cost: per_unit(figures.total_cost, figures.qty),
        }
    }
}

impl Default for ProductProfitabilityParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportParser for ProductProfitabilityParser {
    fn kind(&self) -> ReportKind {
        ReportKind::ProductProfitability
    }

    fn parse_str(&self, content: &str) -> ParsedReport {
        let mut ctx = ProductContext::default();
        let mut rows = Vec::new();
        let mut diagnostics = Vec::new();
        let mut lines_read = 0;

        for (line_idx, raw) in content.lines().enumerate() {
            lines_read += 1;
            match classify_line(raw, &ctx, &self.registry) {
                ProductLine::Noise => {}
                ProductLine::Marker(marker) => {
                    debug!(?marker, line = line_idx + 1, "product context change");
                    ctx = ctx.apply(marker);
                }
                ProductLine::Data(figures) => rows.push(self.build_row(&ctx, figures)),
                ProductLine::Unrecognized(text) => {
                    diagnostics.push(super::unrecognized_marker(self.kind(), line_idx + 1, &text));
                }
            }
        }

        ParsedReport {
            table: Table::ProductProfitability(rows),
            diagnostics,
            lines_read,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
