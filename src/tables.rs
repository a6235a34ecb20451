// 📋 Clean tables handed to downstream analysis
//
// Rows are built once per pipeline run and never mutated afterwards;
// every correction (TrueRevenue, recomputed totals) happens in the parsers.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::entities::Region;
use crate::error::LoadError;
use crate::parser::{ParseDiagnostic, ReportKind};

pub const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

/// Relative disagreement between nominal price and cost + profit beyond
/// which the price is treated as truncated.
pub const PRICE_AGREEMENT_TOLERANCE: f64 = 0.01;

// ============================================================================
// ROW TYPES
// ============================================================================

/// One branch-year of the comparative monthly sales report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySalesRow {
    #[serde(rename = "Year")]
    pub year: i32,

    #[serde(rename = "Branch")]
    pub branch: String,

    #[serde(rename = "Branch_Raw")]
    pub branch_raw: String,

    #[serde(rename = "Region")]
    pub region: Region,

    /// January..December, serialized as one column per month
    #[serde(flatten, with = "month_columns")]
    pub months: [f64; 12],

    #[serde(rename = "Total_By_Year")]
    pub total_by_year: f64,

    /// The export left the total blank/zero and it was summed from the months
    #[serde(rename = "TotalRecomputed")]
    pub total_recomputed: bool,
}

impl MonthlySalesRow {
    pub fn month_sum(&self) -> f64 {
        self.months.iter().sum()
    }
}

/// `[f64; 12]` <-> `{"January": .., .., "December": ..}`
mod month_columns {
    use super::MONTH_NAMES;
    use serde::de::{self, IgnoredAny, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(months: &[f64; 12], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(MONTH_NAMES.len()))?;
        for (name, value) in MONTH_NAMES.iter().zip(months) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[f64; 12], D::Error> {
        deserializer.deserialize_map(MonthVisitor)
    }

    struct MonthVisitor;

    impl<'de> Visitor<'de> for MonthVisitor {
        type Value = [f64; 12];

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("one numeric column per month")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut months = [None; 12];
            while let Some(key) = map.next_key::<String>()? {
                match MONTH_NAMES.iter().position(|m| *m == key) {
                    Some(idx) => months[idx] = Some(map.next_value::<f64>()?),
                    None => {
                        map.next_value::<IgnoredAny>()?;
                    }
                }
            }

            let mut values = [0.0; 12];
            for (idx, value) in months.iter().enumerate() {
                values[idx] = value.ok_or_else(|| de::Error::missing_field(MONTH_NAMES[idx]))?;
            }
            Ok(values)
        }
    }
}

/// One line of the product profitability report, item or subtotal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
    #[serde(rename = "Branch_Raw")]
    pub branch_raw: Option<String>,
    #[serde(rename = "Branch")]
    pub branch: Option<String>,
    #[serde(rename = "Region")]
    pub region: Region,
    #[serde(rename = "ServiceType")]
    pub service_type: Option<String>,
    #[serde(rename = "Category")]
    pub category: Option<String>,
    #[serde(rename = "Section")]
    pub section: Option<String>,
    #[serde(rename = "Product")]
    pub product: String,
    #[serde(rename = "Qty")]
    pub qty: f64,
    #[serde(rename = "TotalPrice")]
    pub total_price: f64,
    #[serde(rename = "TotalCost")]
    pub total_cost: f64,
    #[serde(rename = "CostPct")]
    pub cost_pct: f64,
    #[serde(rename = "TotalProfit")]
    pub total_profit: f64,
    #[serde(rename = "ProfitPct")]
    pub profit_pct: f64,
    #[serde(rename = "TrueRevenue")]
    pub true_revenue: f64,
    #[serde(rename = "IsAggregate")]
    pub is_aggregate: bool,
    #[serde(rename = "UnitProfit")]
    pub unit_profit: f64,
    #[serde(rename = "UnitRevenue")]
    pub unit_revenue: f64,
    #[serde(rename = "UnitCost")]
    pub unit_cost: f64,
}

/// Which hierarchy level a sales-by-group subtotal closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggLevel {
    Group,
    Division,
    Branch,
}

impl AggLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggLevel::Group => "Group",
            AggLevel::Division => "Division",
            AggLevel::Branch => "Branch",
        }
    }

    pub fn from_label(label: &str) -> Option<AggLevel> {
        match label {
            "Group" => Some(AggLevel::Group),
            "Division" => Some(AggLevel::Division),
            "Branch" => Some(AggLevel::Branch),
            _ => None,
        }
    }
}

/// One line of the sales-by-group report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    #[serde(rename = "Branch_Raw")]
    pub branch_raw: Option<String>,
    #[serde(rename = "Branch")]
    pub branch: Option<String>,
    #[serde(rename = "Region")]
    pub region: Region,
    #[serde(rename = "Division")]
    pub division: Option<String>,
    #[serde(rename = "Group")]
    pub group: Option<String>,
    #[serde(rename = "Product")]
    pub product: String,
    #[serde(rename = "Barcode")]
    pub barcode: String,
    #[serde(rename = "Qty")]
    pub qty: f64,
    #[serde(rename = "TotalAmount")]
    pub total_amount: f64,
    #[serde(rename = "IsAggregate")]
    pub is_aggregate: bool,
    #[serde(rename = "AggLevel")]
    pub agg_level: Option<AggLevel>,
}

/// Sentinel category for the per-branch grand total.
pub const TOTAL_CATEGORY: &str = "TOTAL";

/// One branch × category line of the category profit summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummaryRow {
    #[serde(rename = "Branch_Raw")]
    pub branch_raw: Option<String>,
    #[serde(rename = "Branch")]
    pub branch: Option<String>,
    #[serde(rename = "Region")]
    pub region: Region,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Qty")]
    pub qty: f64,
    #[serde(rename = "TotalPrice")]
    pub total_price: f64,
    #[serde(rename = "TotalCost")]
    pub total_cost: f64,
    #[serde(rename = "CostPct")]
    pub cost_pct: f64,
    #[serde(rename = "TotalProfit")]
    pub total_profit: f64,
    #[serde(rename = "ProfitPct")]
    pub profit_pct: f64,
    #[serde(rename = "TrueRevenue")]
    pub true_revenue: f64,
    #[serde(rename = "IsAggregate")]
    pub is_aggregate: bool,
    #[serde(rename = "ProfitMargin")]
    pub profit_margin: f64,
}

// ============================================================================
// REVENUE CORRECTION
// ============================================================================

/// Corrected revenue for a product-level line.
///
/// The POS truncates the nominal price column for large values; cost + profit
/// is immune. Subtotals never trust the price. Item lines keep a positive
/// price only while it agrees with cost + profit, or when cost + profit is
/// empty and the price is the only figure available.
pub fn true_revenue(total_price: f64, total_cost: f64, total_profit: f64, is_aggregate: bool) -> f64 {
    let derived = total_cost + total_profit;
    if is_aggregate || total_price <= 0.0 {
        return derived;
    }
    if derived == 0.0 {
        return total_price;
    }

    let tolerance = (derived.abs() * PRICE_AGREEMENT_TOLERANCE).max(1.0);
    if (total_price - derived).abs() <= tolerance {
        total_price
    } else {
        derived
    }
}

/// Per-unit figure, zero when nothing was sold.
pub fn per_unit(total: f64, qty: f64) -> f64 {
    if qty > 0.0 {
        total / qty
    } else {
        0.0
    }
}

// ============================================================================
// DATASET
// ============================================================================

/// The four clean tables of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub monthly_sales: Vec<MonthlySalesRow>,
    pub product_profitability: Vec<ProductRow>,
    pub sales_by_group: Vec<GroupRow>,
    pub category_summary: Vec<CategorySummaryRow>,

    /// Degraded-parse notes (unknown markers, chunk anomalies)
    #[serde(default)]
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl Dataset {
    pub fn row_counts(&self) -> [(ReportKind, usize); 4] {
        [
            (ReportKind::MonthlySales, self.monthly_sales.len()),
            (ReportKind::ProductProfitability, self.product_profitability.len()),
            (ReportKind::SalesByGroup, self.sales_by_group.len()),
            (ReportKind::CategorySummary, self.category_summary.len()),
        ]
    }
}

/// Output of a single report parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Table {
    MonthlySales(Vec<MonthlySalesRow>),
    ProductProfitability(Vec<ProductRow>),
    SalesByGroup(Vec<GroupRow>),
    CategorySummary(Vec<CategorySummaryRow>),
}

impl Table {
    pub fn kind(&self) -> ReportKind {
        match self {
            Table::MonthlySales(_) => ReportKind::MonthlySales,
            Table::ProductProfitability(_) => ReportKind::ProductProfitability,
            Table::SalesByGroup(_) => ReportKind::SalesByGroup,
            Table::CategorySummary(_) => ReportKind::CategorySummary,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Table::MonthlySales(rows) => rows.len(),
            Table::ProductProfitability(rows) => rows.len(),
            Table::SalesByGroup(rows) => rows.len(),
            Table::CategorySummary(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collects parsed tables in any order and yields a `Dataset` once all four
/// reports are present.
#[derive(Debug, Default)]
pub struct DatasetBuilder {
    monthly_sales: Option<Vec<MonthlySalesRow>>,
    product_profitability: Option<Vec<ProductRow>>,
    sales_by_group: Option<Vec<GroupRow>>,
    category_summary: Option<Vec<CategorySummaryRow>>,
    diagnostics: Vec<ParseDiagnostic>,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, kind: ReportKind) -> bool {
        match kind {
            ReportKind::MonthlySales => self.monthly_sales.is_some(),
            ReportKind::ProductProfitability => self.product_profitability.is_some(),
            ReportKind::SalesByGroup => self.sales_by_group.is_some(),
            ReportKind::CategorySummary => self.category_summary.is_some(),
        }
    }

    pub fn insert(&mut self, table: Table, diagnostics: Vec<ParseDiagnostic>) {
        match table {
            Table::MonthlySales(rows) => self.monthly_sales = Some(rows),
            Table::ProductProfitability(rows) => self.product_profitability = Some(rows),
            Table::SalesByGroup(rows) => self.sales_by_group = Some(rows),
            Table::CategorySummary(rows) => self.category_summary = Some(rows),
        }
        self.diagnostics.extend(diagnostics);
    }

    /// Reports not inserted yet, in canonical order
    pub fn missing(&self) -> Vec<ReportKind> {
        ReportKind::ALL
            .iter()
            .copied()
            .filter(|kind| !self.has(*kind))
            .collect()
    }

    /// Fails with `LoadError::MissingUpload` naming the first absent report.
    pub fn finish(self) -> Result<Dataset> {
        if let Some(kind) = self.missing().first() {
            return Err(LoadError::MissingUpload(*kind).into());
        }

        Ok(Dataset {
            monthly_sales: self.monthly_sales.unwrap_or_default(),
            product_profitability: self.product_profitability.unwrap_or_default(),
            sales_by_group: self.sales_by_group.unwrap_or_default(),
            category_summary: self.category_summary.unwrap_or_default(),
            diagnostics: self.diagnostics,
        })
    }
}
