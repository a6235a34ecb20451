// 💾 Columnar cache - Parquet files keyed by report content
//
// Layout:
//   <root>/<content_key>/monthly_sales.parquet
//   <root>/<content_key>/product_profitability.parquet
//   <root>/<content_key>/sales_by_group.parquet
//   <root>/<content_key>/category_summary.parquet
//   <root>/<content_key>/manifest.json      ← written last; marks the entry complete
//
// The key is a SHA-256 over the raw report bytes, so any edit to a source
// file lands in a fresh entry and stale tables are never served.

use anyhow::{Context, Result};
use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::entities::Region;
use crate::parser::{ParseDiagnostic, ReportKind};
use crate::tables::{
    AggLevel, CategorySummaryRow, Dataset, GroupRow, MonthlySalesRow, ProductRow, MONTH_NAMES,
};

/// Bumped whenever parsing semantics or the column layout change.
pub const CACHE_FORMAT_VERSION: &str = "1";

const MANIFEST_FILE: &str = "manifest.json";

// ============================================================================
// CONTENT KEY
// ============================================================================

/// SHA-256 over each report's name and bytes, in the order given.
pub fn content_key(inputs: &[(ReportKind, &[u8])]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(CACHE_FORMAT_VERSION.as_bytes());
    for (kind, bytes) in inputs {
        hasher.update(kind.file_name().as_bytes());
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// COLUMNAR MAPPING
// ============================================================================

/// Row type that can be laid out as one Arrow record batch.
pub trait Columnar: Sized {
    fn fields() -> Vec<Field>;

    fn to_columns(rows: &[Self]) -> Vec<ArrayRef>;

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>>;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(Self::fields()))
    }

    fn column_names() -> Vec<String> {
        Self::fields().iter().map(|f| f.name().clone()).collect()
    }
}

fn f64_col<R>(rows: &[R], f: impl Fn(&R) -> f64) -> ArrayRef {
    Arc::new(Float64Array::from_iter_values(rows.iter().map(f)))
}

fn bool_col<R>(rows: &[R], f: impl Fn(&R) -> bool) -> ArrayRef {
    Arc::new(BooleanArray::from(rows.iter().map(f).collect::<Vec<bool>>()))
}

fn str_col<R>(rows: &[R], f: impl Fn(&R) -> &str) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(rows.iter().map(f)))
}

fn opt_str_col<R>(rows: &[R], f: impl Fn(&R) -> Option<&str>) -> ArrayRef {
    Arc::new(rows.iter().map(f).collect::<StringArray>())
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .with_context(|| format!("cache column `{}` missing", name))?
        .as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("cache column `{}` has an unexpected type", name))
}

fn opt_string(arr: &StringArray, i: usize) -> Option<String> {
    if arr.is_null(i) {
        None
    } else {
        Some(arr.value(i).to_string())
    }
}

fn utf8(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Utf8, nullable)
}

fn float(name: &str) -> Field {
    Field::new(name, DataType::Float64, false)
}

fn boolean(name: &str) -> Field {
    Field::new(name, DataType::Boolean, false)
}

impl Columnar for MonthlySalesRow {
    fn fields() -> Vec<Field> {
        let mut fields = vec![
            Field::new("Year", DataType::Int32, false),
            utf8("Branch", false),
            utf8("Branch_Raw", false),
            utf8("Region", false),
        ];
        fields.extend(MONTH_NAMES.iter().map(|m| float(m)));
        fields.push(float("Total_By_Year"));
        fields.push(boolean("TotalRecomputed"));
        fields
    }

    fn to_columns(rows: &[Self]) -> Vec<ArrayRef> {
        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
            str_col(rows, |r| r.branch.as_str()),
            str_col(rows, |r| r.branch_raw.as_str()),
            str_col(rows, |r| r.region.as_str()),
        ];
        for month in 0..12 {
            columns.push(f64_col(rows, move |r| r.months[month]));
        }
        columns.push(f64_col(rows, |r| r.total_by_year));
        columns.push(bool_col(rows, |r| r.total_recomputed));
        columns
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let year = column::<Int32Array>(batch, "Year")?;
        let branch = column::<StringArray>(batch, "Branch")?;
        let branch_raw = column::<StringArray>(batch, "Branch_Raw")?;
        let region = column::<StringArray>(batch, "Region")?;
        let months = MONTH_NAMES
            .iter()
            .map(|m| column::<Float64Array>(batch, m))
            .collect::<Result<Vec<_>>>()?;
        let total = column::<Float64Array>(batch, "Total_By_Year")?;
        let recomputed = column::<BooleanArray>(batch, "TotalRecomputed")?;

        Ok((0..batch.num_rows())
            .map(|i| {
                let mut values = [0.0; 12];
                for (slot, arr) in values.iter_mut().zip(&months) {
                    *slot = arr.value(i);
                }
                MonthlySalesRow {
                    year: year.value(i),
                    branch: branch.value(i).to_string(),
                    branch_raw: branch_raw.value(i).to_string(),
                    region: Region::from_label(region.value(i)),
                    months: values,
                    total_by_year: total.value(i),
                    total_recomputed: recomputed.value(i),
                }
            })
            .collect())
    }
}

impl Columnar for ProductRow {
    fn fields() -> Vec<Field> {
        vec![
            utf8("Branch_Raw", true),
            utf8("Branch", true),
            utf8("Region", false),
            utf8("ServiceType", true),
            utf8("Category", true),
            utf8("Section", true),
            utf8("Product", false),
            float("Qty"),
            float("TotalPrice"),
            float("TotalCost"),
            float("CostPct"),
            float("TotalProfit"),
            float("ProfitPct"),
            float("TrueRevenue"),
            boolean("IsAggregate"),
            float("UnitProfit"),
            float("UnitRevenue"),
            float("UnitCost"),
        ]
    }

    fn to_columns(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            opt_str_col(rows, |r| r.branch_raw.as_deref()),
            opt_str_col(rows, |r| r.branch.as_deref()),
            str_col(rows, |r| r.region.as_str()),
            opt_str_col(rows, |r| r.service_type.as_deref()),
            opt_str_col(rows, |r| r.category.as_deref()),
            opt_str_col(rows, |r| r.section.as_deref()),
            str_col(rows, |r| r.product.as_str()),
            f64_col(rows, |r| r.qty),
            f64_col(rows, |r| r.total_price),
            f64_col(rows, |r| r.total_cost),
            f64_col(rows, |r| r.cost_pct),
            f64_col(rows, |r| r.total_profit),
            f64_col(rows, |r| r.profit_pct),
            f64_col(rows, |r| r.true_revenue),
            bool_col(rows, |r| r.is_aggregate),
            f64_col(rows, |r| r.unit_profit),
            f64_col(rows, |r| r.unit_revenue),
            f64_col(rows, |r| r.unit_cost),
        ]
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let branch_raw = column::<StringArray>(batch, "Branch_Raw")?;
        let branch = column::<StringArray>(batch, "Branch")?;
        let region = column::<StringArray>(batch, "Region")?;
        let service_type = column::<StringArray>(batch, "ServiceType")?;
        let category = column::<StringArray>(batch, "Category")?;
        let section = column::<StringArray>(batch, "Section")?;
        let product = column::<StringArray>(batch, "Product")?;
        let qty = column::<Float64Array>(batch, "Qty")?;
        let total_price = column::<Float64Array>(batch, "TotalPrice")?;
        let total_cost = column::<Float64Array>(batch, "TotalCost")?;
        let cost_pct = column::<Float64Array>(batch, "CostPct")?;
        let total_profit = column::<Float64Array>(batch, "TotalProfit")?;
        let profit_pct = column::<Float64Array>(batch, "ProfitPct")?;
        let true_revenue = column::<Float64Array>(batch, "TrueRevenue")?;
        let is_aggregate = column::<BooleanArray>(batch, "IsAggregate")?;
        let unit_profit = column::<Float64Array>(batch, "UnitProfit")?;
        let unit_revenue = column::<Float64Array>(batch, "UnitRevenue")?;
        let unit_cost = column::<Float64Array>(batch, "UnitCost")?;

        Ok((0..batch.num_rows())
            .map(|i| ProductRow {
                branch_raw: opt_string(branch_raw, i),
                branch: opt_string(branch, i),
                region: Region::from_label(region.value(i)),
                service_type: opt_string(service_type, i),
                category: opt_string(category, i),
                section: opt_string(section, i),
                product: product.value(i).to_string(),
                qty: qty.value(i),
                total_price: total_price.value(i),
                total_cost: total_cost.value(i),
                cost_pct: cost_pct.value(i),
                total_profit: total_profit.value(i),
                profit_pct: profit_pct.value(i),
                true_revenue: true_revenue.value(i),
                is_aggregate: is_aggregate.value(i),
                unit_profit: unit_profit.value(i),
                unit_revenue: unit_revenue.value(i),
                unit_cost: unit_cost.value(i),
            })
            .collect())
    }
}

impl Columnar for GroupRow {
    fn fields() -> Vec<Field> {
        vec![
            utf8("Branch_Raw", true),
            utf8("Branch", true),
            utf8("Region", false),
            utf8("Division", true),
            utf8("Group", true),
            utf8("Product", false),
            utf8("Barcode", false),
            float("Qty"),
            float("TotalAmount"),
            boolean("IsAggregate"),
            utf8("AggLevel", true),
        ]
    }

    fn to_columns(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            opt_str_col(rows, |r| r.branch_raw.as_deref()),
            opt_str_col(rows, |r| r.branch.as_deref()),
            str_col(rows, |r| r.region.as_str()),
            opt_str_col(rows, |r| r.division.as_deref()),
            opt_str_col(rows, |r| r.group.as_deref()),
            str_col(rows, |r| r.product.as_str()),
            str_col(rows, |r| r.barcode.as_str()),
            f64_col(rows, |r| r.qty),
            f64_col(rows, |r| r.total_amount),
            bool_col(rows, |r| r.is_aggregate),
            opt_str_col(rows, |r| r.agg_level.map(|l| l.as_str())),
        ]
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let branch_raw = column::<StringArray>(batch, "Branch_Raw")?;
        let branch = column::<StringArray>(batch, "Branch")?;
        let region = column::<StringArray>(batch, "Region")?;
        let division = column::<StringArray>(batch, "Division")?;
        let group = column::<StringArray>(batch, "Group")?;
        let product = column::<StringArray>(batch, "Product")?;
        let barcode = column::<StringArray>(batch, "Barcode")?;
        let qty = column::<Float64Array>(batch, "Qty")?;
        let total_amount = column::<Float64Array>(batch, "TotalAmount")?;
        let is_aggregate = column::<BooleanArray>(batch, "IsAggregate")?;
        let agg_level = column::<StringArray>(batch, "AggLevel")?;

        Ok((0..batch.num_rows())
            .map(|i| GroupRow {
                branch_raw: opt_string(branch_raw, i),
                branch: opt_string(branch, i),
                region: Region::from_label(region.value(i)),
                division: opt_string(division, i),
                group: opt_string(group, i),
                product: product.value(i).to_string(),
                barcode: barcode.value(i).to_string(),
                qty: qty.value(i),
                total_amount: total_amount.value(i),
                is_aggregate: is_aggregate.value(i),
                agg_level: opt_string(agg_level, i).and_then(|l| AggLevel::from_label(&l)),
            })
            .collect())
    }
}

impl Columnar for CategorySummaryRow {
    fn fields() -> Vec<Field> {
        vec![
            utf8("Branch_Raw", true),
            utf8("Branch", true),
            utf8("Region", false),
            utf8("Category", false),
            float("Qty"),
            float("TotalPrice"),
            float("TotalCost"),
            float("CostPct"),
            float("TotalProfit"),
            float("ProfitPct"),
            float("TrueRevenue"),
            boolean("IsAggregate"),
            float("ProfitMargin"),
        ]
    }

    fn to_columns(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            opt_str_col(rows, |r| r.branch_raw.as_deref()),
            opt_str_col(rows, |r| r.branch.as_deref()),
            str_col(rows, |r| r.region.as_str()),
            str_col(rows, |r| r.category.as_str()),
            f64_col(rows, |r| r.qty),
            f64_col(rows, |r| r.total_price),
            f64_col(rows, |r| r.total_cost),
            f64_col(rows, |r| r.cost_pct),
            f64_col(rows, |r| r.total_profit),
            f64_col(rows, |r| r.profit_pct),
            f64_col(rows, |r| r.true_revenue),
            bool_col(rows, |r| r.is_aggregate),
            f64_col(rows, |r| r.profit_margin),
        ]
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let branch_raw = column::<StringArray>(batch, "Branch_Raw")?;
        let branch = column::<StringArray>(batch, "Branch")?;
        let region = column::<StringArray>(batch, "Region")?;
        let category = column::<StringArray>(batch, "Category")?;
        let qty = column::<Float64Array>(batch, "Qty")?;
        let total_price = column::<Float64Array>(batch, "TotalPrice")?;
        let total_cost = column::<Float64Array>(batch, "TotalCost")?;
        let cost_pct = column::<Float64Array>(batch, "CostPct")?;
        let total_profit = column::<Float64Array>(batch, "TotalProfit")?;
        let profit_pct = column::<Float64Array>(batch, "ProfitPct")?;
        let true_revenue = column::<Float64Array>(batch, "TrueRevenue")?;
        let is_aggregate = column::<BooleanArray>(batch, "IsAggregate")?;
        let profit_margin = column::<Float64Array>(batch, "ProfitMargin")?;

        Ok((0..batch.num_rows())
            .map(|i| CategorySummaryRow {
                branch_raw: opt_string(branch_raw, i),
                branch: opt_string(branch, i),
                region: Region::from_label(region.value(i)),
                category: category.value(i).to_string(),
                qty: qty.value(i),
                total_price: total_price.value(i),
                total_cost: total_cost.value(i),
                cost_pct: cost_pct.value(i),
                total_profit: total_profit.value(i),
                profit_pct: profit_pct.value(i),
                true_revenue: true_revenue.value(i),
                is_aggregate: is_aggregate.value(i),
                profit_margin: profit_margin.value(i),
            })
            .collect())
    }
}

// ============================================================================
// TABLE FILES
// ============================================================================

/// Write one table to `<dir>/<table_name>.parquet` via a `.tmp` file + rename.
pub fn write_table<T: Columnar>(dir: &Path, table_name: &str, rows: &[T]) -> Result<PathBuf> {
    let final_path = dir.join(format!("{}.parquet", table_name));
    let tmp_path = dir.join(format!("{}.parquet.tmp", table_name));

    let schema = T::schema();
    let batch = RecordBatch::try_new(schema.clone(), T::to_columns(rows))
        .with_context(|| format!("building RecordBatch for `{}`", table_name))?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    if let Err(err) = write_then_rename(&tmp_path, &final_path, schema, &batch, props) {
        match fs::remove_file(&tmp_path) {
            Ok(()) => debug!(path = %tmp_path.display(), "removed partial parquet file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %tmp_path.display(), error = %e, "could not remove partial parquet file"),
        }
        return Err(err);
    }

    Ok(final_path)
}

fn write_then_rename(
    tmp_path: &Path,
    final_path: &Path,
    schema: SchemaRef,
    batch: &RecordBatch,
    props: WriterProperties,
) -> Result<()> {
    let tmp_file = File::create(tmp_path)
        .with_context(|| format!("could not create temporary file `{}`", tmp_path.display()))?;
    let mut writer = ArrowWriter::try_new(BufWriter::new(tmp_file), schema, Some(props))
        .with_context(|| format!("creating ArrowWriter for `{}`", tmp_path.display()))?;
    writer
        .write(batch)
        .with_context(|| format!("writing batch to `{}`", tmp_path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing ArrowWriter for `{}`", tmp_path.display()))?;

    fs::rename(tmp_path, final_path).with_context(|| {
        format!(
            "failed to rename `{}` to `{}`",
            tmp_path.display(),
            final_path.display()
        )
    })
}

/// Read every batch of `<dir>/<table_name>.parquet` back into rows.
pub fn read_table<T: Columnar>(dir: &Path, table_name: &str) -> Result<Vec<T>> {
    let path = dir.join(format!("{}.parquet", table_name));
    let file = File::open(&path).with_context(|| format!("failed to open `{}`", path.display()))?;

    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("failed to create RecordBatchReaderBuilder for `{}`", path.display()))?
        .build()
        .with_context(|| format!("failed to build RecordBatchReader for `{}`", path.display()))?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch =
            batch.with_context(|| format!("error reading RecordBatch from `{}`", path.display()))?;
        rows.extend(T::from_batch(&batch)?);
    }
    Ok(rows)
}

// ============================================================================
// CACHE ENTRIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheManifest {
    pub content_key: String,
    pub format_version: String,
    pub created_at: DateTime<Utc>,
    /// table name → row count
    pub row_counts: BTreeMap<String, usize>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

/// Parquet cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct ParquetCache {
    root: PathBuf,
}

impl ParquetCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ParquetCache { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Persist all four tables plus a manifest under `key`.
    pub fn write(&self, key: &str, dataset: &Dataset) -> Result<PathBuf> {
        let dir = self.entry_dir(key);
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create cache dir `{}`", dir.display()))?;

        write_table(&dir, ReportKind::MonthlySales.table_name(), &dataset.monthly_sales)?;
        write_table(
            &dir,
            ReportKind::ProductProfitability.table_name(),
            &dataset.product_profitability,
        )?;
        write_table(&dir, ReportKind::SalesByGroup.table_name(), &dataset.sales_by_group)?;
        write_table(&dir, ReportKind::CategorySummary.table_name(), &dataset.category_summary)?;

        let manifest = CacheManifest {
            content_key: key.to_string(),
            format_version: CACHE_FORMAT_VERSION.to_string(),
            created_at: Utc::now(),
            row_counts: dataset
                .row_counts()
                .iter()
                .map(|(kind, n)| (kind.table_name().to_string(), *n))
                .collect(),
            diagnostics: dataset.diagnostics.clone(),
        };

        let tmp_path = dir.join(format!("{}.tmp", MANIFEST_FILE));
        let final_path = dir.join(MANIFEST_FILE);
        let tmp = File::create(&tmp_path)
            .with_context(|| format!("could not create `{}`", tmp_path.display()))?;
        let mut writer = BufWriter::new(tmp);
        serde_json::to_writer_pretty(&mut writer, &manifest).context("serializing cache manifest")?;
        writer.flush().context("flushing cache manifest")?;
        fs::rename(&tmp_path, &final_path).with_context(|| {
            format!("renaming `{}` → `{}`", tmp_path.display(), final_path.display())
        })?;

        info!(key, dir = %dir.display(), "cached cleaned tables");
        Ok(dir)
    }

    /// Load the entry for `key`. Missing, partial or corrupt entries are errors.
    pub fn read(&self, key: &str) -> Result<Dataset> {
        let dir = self.entry_dir(key);
        let manifest_path = dir.join(MANIFEST_FILE);
        let file = File::open(&manifest_path)
            .with_context(|| format!("no cache manifest at `{}`", manifest_path.display()))?;
        let manifest: CacheManifest = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing `{}`", manifest_path.display()))?;

        if manifest.content_key != key || manifest.format_version != CACHE_FORMAT_VERSION {
            anyhow::bail!("cache manifest at `{}` does not match key {}", dir.display(), key);
        }

        let dataset = Dataset {
            monthly_sales: read_table(&dir, ReportKind::MonthlySales.table_name())?,
            product_profitability: read_table(&dir, ReportKind::ProductProfitability.table_name())?,
            sales_by_group: read_table(&dir, ReportKind::SalesByGroup.table_name())?,
            category_summary: read_table(&dir, ReportKind::CategorySummary.table_name())?,
            diagnostics: manifest.diagnostics.clone(),
        };

        for (kind, rows) in dataset.row_counts() {
            let expected = manifest.row_counts.get(kind.table_name()).copied();
            if expected != Some(rows) {
                anyhow::bail!(
                    "cache table `{}` has {} rows, manifest says {:?}",
                    kind.table_name(),
                    rows,
                    expected
                );
            }
        }

        debug!(key, "cache hit");
        Ok(dataset)
    }

    /// Like `read`, but any failure is logged and reported as a miss.
    pub fn try_read(&self, key: &str) -> Option<Dataset> {
        if !self.entry_dir(key).exists() {
            debug!(key, "cache miss");
            return None;
        }
        match self.read(key) {
            Ok(dataset) => Some(dataset),
            Err(e) => {
                warn!(key, error = %format!("{:#}", e), "unreadable cache entry, re-parsing");
                None
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
